use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

use autoai_scout::error::{AnalysisError, TransportError, ValidationError};
use autoai_scout::model::RawResponse;
use autoai_scout::schema::SchemaVariant;
use autoai_scout::session::{AnalysisSession, RetryPolicy};
use autoai_scout::transport::{AnalysisInput, AnalysisTransport, HealthStatus};
use autoai_scout::{Completion, RequestState};

type Reply = Result<RawResponse, TransportError>;

/// Transport whose replies are released by the test, one per input value.
#[derive(Default)]
struct GatedTransport {
    gates: Mutex<HashMap<String, oneshot::Receiver<Reply>>>,
    calls: AtomicUsize,
    seen: Mutex<Vec<AnalysisInput>>,
}

impl GatedTransport {
    fn gate(&self, input: &str) -> oneshot::Sender<Reply> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().insert(input.to_string(), rx);
        tx
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisTransport for GatedTransport {
    async fn submit_analysis(&self, input: &AnalysisInput) -> Result<RawResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(input.clone());
        let gate = self.gates.lock().unwrap().remove(input.value());
        match gate {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(TransportError::NetworkUnreachable("gate dropped".into()))),
            None => Err(TransportError::NetworkUnreachable("no gate".into())),
        }
    }

    async fn check_health(&self) -> Result<HealthStatus, TransportError> {
        Ok(HealthStatus(json!({"ok": true, "service": "autoai-scout"})))
    }
}

/// Transport that fails with the queued errors before answering.
struct FlakyTransport {
    failures: Mutex<Vec<TransportError>>,
    calls: AtomicUsize,
}

impl FlakyTransport {
    fn new(failures: Vec<TransportError>) -> Self {
        Self {
            failures: Mutex::new(failures),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AnalysisTransport for FlakyTransport {
    async fn submit_analysis(&self, _input: &AnalysisInput) -> Result<RawResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.failures.lock().unwrap().pop();
        match next {
            Some(e) => Err(e),
            None => Ok(json!({"summary": {"recommendation": "Kaufen"}})),
        }
    }

    async fn check_health(&self) -> Result<HealthStatus, TransportError> {
        Err(TransportError::HttpStatus(503))
    }
}

fn flat(value: u32) -> RawResponse {
    json!({"details": {"title": "VW Golf"}, "estimated_value": value})
}

fn fast_retries(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        backoff: Duration::from_millis(5),
    }
}

#[tokio::test]
async fn test_whitespace_never_reaches_transport() {
    let transport = Arc::new(GatedTransport::default());
    let session = AnalysisSession::new(transport.clone(), RetryPolicy::none());

    let result = session.submit("   ").await;
    assert!(matches!(result, Err(ValidationError::BlankInput)));
    assert_eq!(session.state(), RequestState::Idle);

    tokio::task::yield_now().await;
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_success_flow() {
    let transport = Arc::new(GatedTransport::default());
    let gate = transport.gate("https://www.autoscout24.de/angebote/1");
    let session = AnalysisSession::new(transport.clone(), RetryPolicy::none());

    let handle = session
        .submit("https://www.autoscout24.de/angebote/1")
        .await
        .unwrap();
    assert_eq!(session.state(), RequestState::Loading { request_id: 1 });

    gate.send(Ok(flat(11500))).unwrap();
    assert_eq!(handle.await.unwrap(), Completion::Applied);

    match session.state() {
        RequestState::Success { request_id, result } => {
            assert_eq!(request_id, 1);
            assert_eq!(result.variant, SchemaVariant::Flat);
        }
        other => panic!("unexpected state: {:?}", other),
    }
    assert_eq!(
        transport.seen.lock().unwrap()[0],
        AnalysisInput::Url("https://www.autoscout24.de/angebote/1".into())
    );
}

#[tokio::test]
async fn test_stale_response_is_discarded() {
    let transport = Arc::new(GatedTransport::default());
    let gate_a = transport.gate("first listing");
    let gate_b = transport.gate("second listing");
    let session = AnalysisSession::new(transport.clone(), RetryPolicy::none());

    let a = session.submit("first listing").await.unwrap();
    let b = session.submit("second listing").await.unwrap();
    assert_eq!(session.state(), RequestState::Loading { request_id: 2 });

    // A arrives late: state must not move.
    gate_a.send(Ok(flat(1))).unwrap();
    assert_eq!(a.await.unwrap(), Completion::Discarded);
    assert_eq!(session.state(), RequestState::Loading { request_id: 2 });

    gate_b.send(Ok(flat(2))).unwrap();
    assert_eq!(b.await.unwrap(), Completion::Applied);
    match session.state() {
        RequestState::Success { request_id, result } => {
            assert_eq!(request_id, 2);
            assert_eq!(
                result.valuation.as_ref().unwrap().estimated_value_eur,
                Some(2.0)
            );
        }
        other => panic!("unexpected state: {:?}", other),
    }

    let stale = session
        .diagnostics(10, Some(&["completion".to_string()]))
        .await;
    assert_eq!(stale.len(), 2);
}

#[tokio::test]
async fn test_stale_response_after_newer_success_is_discarded() {
    let transport = Arc::new(GatedTransport::default());
    let gate_a = transport.gate("a");
    let gate_b = transport.gate("b");
    let session = AnalysisSession::new(transport.clone(), RetryPolicy::none());

    let a = session.submit("a").await.unwrap();
    let b = session.submit("b").await.unwrap();

    gate_b.send(Ok(flat(2))).unwrap();
    b.await.unwrap();
    gate_a.send(Err(TransportError::HttpStatus(500))).unwrap();
    assert_eq!(a.await.unwrap(), Completion::Discarded);

    assert!(matches!(
        session.state(),
        RequestState::Success { request_id: 2, .. }
    ));
}

#[tokio::test]
async fn test_unknown_shape_becomes_failed_state() {
    let transport = Arc::new(GatedTransport::default());
    let gate = transport.gate("a");
    let session = AnalysisSession::new(transport.clone(), RetryPolicy::none());

    let handle = session.submit("a").await.unwrap();
    gate.send(Ok(json!({"foo": "bar"}))).unwrap();
    handle.await.unwrap();

    match session.state() {
        RequestState::Failed { request_id, error } => {
            assert_eq!(request_id, 1);
            assert!(matches!(error, AnalysisError::Normalize(_)));
            assert_eq!(error.raw_payload(), Some(&json!({"foo": "bar"})));
        }
        other => panic!("unexpected state: {:?}", other),
    }
}

#[tokio::test]
async fn test_cancel_then_late_response() {
    let transport = Arc::new(GatedTransport::default());
    let gate = transport.gate("a");
    let session = AnalysisSession::new(transport.clone(), RetryPolicy::none());

    let handle = session.submit("a").await.unwrap();
    assert!(session.cancel().await);
    assert_eq!(session.state(), RequestState::Idle);

    gate.send(Ok(flat(1))).unwrap();
    assert_eq!(handle.await.unwrap(), Completion::Discarded);
    assert_eq!(session.state(), RequestState::Idle);
}

#[tokio::test]
async fn test_subscribers_see_transitions() {
    let transport = Arc::new(GatedTransport::default());
    let gate = transport.gate("a");
    let session = AnalysisSession::new(transport.clone(), RetryPolicy::none());
    let mut rx = session.subscribe();

    let handle = session.submit("a").await.unwrap();
    rx.changed().await.unwrap();
    assert!(rx.borrow_and_update().is_loading());

    gate.send(Ok(flat(1))).unwrap();
    handle.await.unwrap();
    rx.changed().await.unwrap();
    assert_eq!(rx.borrow_and_update().label(), "success");
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let transport = Arc::new(FlakyTransport::new(vec![
        TransportError::HttpStatus(503),
        TransportError::NetworkUnreachable("connection refused".into()),
    ]));
    let session = AnalysisSession::new(transport.clone(), fast_retries(2));

    let handle = session.submit("Opel Astra").await.unwrap();
    assert_eq!(handle.await.unwrap(), Completion::Applied);
    assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    assert_eq!(session.state().label(), "success");

    let retries = session
        .diagnostics(10, Some(&["transport".to_string()]))
        .await;
    assert_eq!(retries.len(), 2);
}

#[tokio::test]
async fn test_retry_budget_exhausted() {
    let transport = Arc::new(FlakyTransport::new(vec![
        TransportError::HttpStatus(502),
        TransportError::HttpStatus(502),
        TransportError::HttpStatus(502),
    ]));
    let session = AnalysisSession::new(transport.clone(), fast_retries(1));

    session.submit("Opel Astra").await.unwrap().await.unwrap();
    assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        session.state(),
        RequestState::Failed {
            request_id: 1,
            error: AnalysisError::Transport(TransportError::HttpStatus(502)),
        }
    );
}

#[tokio::test]
async fn test_non_transient_failure_not_retried() {
    let transport = Arc::new(FlakyTransport::new(vec![TransportError::HttpStatus(422)]));
    let session = AnalysisSession::new(transport.clone(), fast_retries(3));

    session.submit("Opel Astra").await.unwrap().await.unwrap();
    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    assert_eq!(session.state().label(), "failed");
}

#[tokio::test]
async fn test_retry_abandoned_when_superseded() {
    let transport = Arc::new(FlakyTransport::new(vec![TransportError::HttpStatus(503)]));
    let session = AnalysisSession::new(
        transport.clone(),
        RetryPolicy {
            max_retries: 3,
            backoff: Duration::from_millis(200),
        },
    );

    let first = session.submit("first").await.unwrap();
    // Let the first attempt fail and enter backoff.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = session.submit("second").await.unwrap();

    assert_eq!(second.await.unwrap(), Completion::Applied);
    assert_eq!(first.await.unwrap(), Completion::Discarded);
    // first attempt (failed) + second submission; no retry of the first.
    assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    assert!(matches!(
        session.state(),
        RequestState::Success { request_id: 2, .. }
    ));
}

#[tokio::test]
async fn test_health_passthrough() {
    let session = AnalysisSession::new(Arc::new(GatedTransport::default()), RetryPolicy::none());
    let health = session.check_health().await.unwrap();
    assert_eq!(health.0["service"], "autoai-scout");

    let flaky = AnalysisSession::new(Arc::new(FlakyTransport::new(vec![])), RetryPolicy::none());
    assert_eq!(
        flaky.check_health().await,
        Err(TransportError::HttpStatus(503))
    );
}

#[tokio::test]
async fn test_reset_clears_result_and_drops_in_flight() {
    let transport = Arc::new(GatedTransport::default());
    let gate_a = transport.gate("a");
    let gate_b = transport.gate("b");
    let session = AnalysisSession::new(transport.clone(), RetryPolicy::none());

    let a = session.submit("a").await.unwrap();
    gate_a.send(Ok(flat(1))).unwrap();
    a.await.unwrap();
    assert_eq!(session.state().label(), "success");

    session.reset().await;
    assert_eq!(session.state(), RequestState::Idle);

    let b = session.submit("b").await.unwrap();
    session.reset().await;
    gate_b.send(Ok(flat(2))).unwrap();
    assert_eq!(b.await.unwrap(), Completion::Discarded);
    assert_eq!(session.state(), RequestState::Idle);
}

#[tokio::test]
async fn test_state_stream_yields_snapshots() {
    use tokio_stream::StreamExt;

    let transport = Arc::new(GatedTransport::default());
    let gate = transport.gate("a");
    let session = AnalysisSession::new(transport.clone(), RetryPolicy::none());
    let mut stream = session.state_stream();

    // The stream starts with the current snapshot.
    assert_eq!(stream.next().await, Some(RequestState::Idle));

    let handle = session.submit("a").await.unwrap();
    gate.send(Ok(flat(1))).unwrap();
    handle.await.unwrap();

    // Intermediate snapshots may be coalesced; the last one is what counts.
    let latest = stream.next().await.unwrap();
    assert_eq!(latest.label(), "success");
}
