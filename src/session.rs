use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_stream::wrappers::WatchStream;
use tracing::debug;

use crate::config::ClientConfig;
use crate::controller::{Completion, RequestController, RequestState};
use crate::diagnostics::DiagnosticEvent;
use crate::error::{TransportError, ValidationError};
use crate::transport::{AnalysisInput, AnalysisTransport, HealthStatus};

pub type SharedSession = Arc<AnalysisSession>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::ZERO,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff: config.retry_backoff,
        }
    }

    /// `attempt` counts failures so far, starting at 1.
    pub fn should_retry(&self, error: &TransportError, attempt: u32) -> bool {
        attempt <= self.max_retries && error.is_transient()
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// Async owner of one [`RequestController`].
///
/// Transport calls run as tokio tasks so several may be in flight; their
/// outcomes are applied under the write lock and the controller decides which
/// one counts. Every visible change is published on a watch channel, so
/// presentation code reads snapshots without touching the lock.
pub struct AnalysisSession {
    controller: RwLock<RequestController>,
    transport: Arc<dyn AnalysisTransport>,
    retry: RetryPolicy,
    state_tx: watch::Sender<RequestState>,
}

impl AnalysisSession {
    pub fn new(transport: Arc<dyn AnalysisTransport>, retry: RetryPolicy) -> SharedSession {
        let (state_tx, _) = watch::channel(RequestState::Idle);
        Arc::new(Self {
            controller: RwLock::new(RequestController::new()),
            transport,
            retry,
            state_tx,
        })
    }

    /// Accept a submission and dispatch it.
    ///
    /// Validation happens before anything is spawned; a blank input returns
    /// the error and leaves state and transport untouched. The handle resolves
    /// once the outcome has been applied or discarded.
    pub async fn submit(
        self: &Arc<Self>,
        raw_input: &str,
    ) -> Result<JoinHandle<Completion>, ValidationError> {
        let submission = {
            let mut controller = self.controller.write().await;
            let submission = controller.submit(raw_input)?;
            self.publish(&controller);
            submission
        };

        let session = Arc::clone(self);
        Ok(tokio::spawn(async move {
            session.run(submission.request_id, submission.input).await
        }))
    }

    async fn run(&self, request_id: u64, input: AnalysisInput) -> Completion {
        let mut attempt = 0;
        let outcome = loop {
            let error = match self.transport.submit_analysis(&input).await {
                Ok(raw) => break Ok(raw),
                Err(e) => e,
            };

            attempt += 1;
            if !self.retry.should_retry(&error, attempt) {
                break Err(error);
            }
            {
                let mut controller = self.controller.write().await;
                if !controller.is_current(request_id) {
                    break Err(error);
                }
                controller.note_retry(request_id, attempt, &error);
            }
            sleep(self.retry.delay(attempt)).await;
            if !self.controller.read().await.is_current(request_id) {
                debug!("Request {} superseded during backoff", request_id);
                break Err(error);
            }
        };

        let mut controller = self.controller.write().await;
        let completion = controller.complete(request_id, outcome);
        if completion == Completion::Applied {
            self.publish(&controller);
        }
        completion
    }

    pub async fn cancel(&self) -> bool {
        let mut controller = self.controller.write().await;
        let cancelled = controller.cancel();
        if cancelled {
            self.publish(&controller);
        }
        cancelled
    }

    pub async fn reset(&self) {
        let mut controller = self.controller.write().await;
        controller.reset();
        self.publish(&controller);
    }

    /// Latest published snapshot.
    pub fn state(&self) -> RequestState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RequestState> {
        self.state_tx.subscribe()
    }

    pub fn state_stream(&self) -> WatchStream<RequestState> {
        WatchStream::new(self.subscribe())
    }

    pub async fn diagnostics(&self, limit: usize, filter: Option<&[String]>) -> Vec<DiagnosticEvent> {
        self.controller.read().await.diagnostics().events(limit, filter)
    }

    /// Health probe, passed straight through to the transport.
    pub async fn check_health(&self) -> Result<HealthStatus, TransportError> {
        self.transport.check_health().await
    }

    fn publish(&self, controller: &RequestController) {
        self.state_tx.send_replace(controller.state().clone());
    }
}
