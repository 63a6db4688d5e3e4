use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::TransportError;
use crate::model::RawResponse;

/// What gets submitted. Serializes as the request body, `{"url": ...}` or
/// `{"text": ...}`. Which variant is chosen is the controller's call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisInput {
    Url(String),
    Text(String),
}

impl AnalysisInput {
    pub fn mode(&self) -> &'static str {
        match self {
            AnalysisInput::Url(_) => "url",
            AnalysisInput::Text(_) => "text",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            AnalysisInput::Url(s) | AnalysisInput::Text(s) => s,
        }
    }
}

/// Health payload, passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct HealthStatus(pub Value);

/// The HTTP contract of the analysis service.
///
/// Implementations perform exactly one exchange per call: no retries, no
/// deadline, no input validation.
#[async_trait]
pub trait AnalysisTransport: Send + Sync {
    async fn submit_analysis(&self, input: &AnalysisInput) -> Result<RawResponse, TransportError>;

    async fn check_health(&self) -> Result<HealthStatus, TransportError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
    analyze_url: String,
    health_url: String,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(4)
            .user_agent(concat!("autoai-scout/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            analyze_url: config.analyze_url(),
            health_url: config.health_url(),
        })
    }

    async fn read_json(resp: reqwest::Response) -> Result<Value, TransportError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            debug!("Analysis service answered {}: {}", status, snippet(&body));
            return Err(TransportError::HttpStatus(status.as_u16()));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| TransportError::NetworkUnreachable(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| {
            debug!(
                "Unparseable body from analysis service: {}",
                snippet(&String::from_utf8_lossy(&bytes))
            );
            TransportError::MalformedBody(e.to_string())
        })
    }
}

#[async_trait]
impl AnalysisTransport for HttpTransport {
    async fn submit_analysis(&self, input: &AnalysisInput) -> Result<RawResponse, TransportError> {
        debug!("POST {} ({} mode)", self.analyze_url, input.mode());
        let resp = self
            .client
            .post(&self.analyze_url)
            .json(input)
            .send()
            .await
            .map_err(|e| TransportError::NetworkUnreachable(e.to_string()))?;
        Self::read_json(resp).await
    }

    async fn check_health(&self) -> Result<HealthStatus, TransportError> {
        debug!("GET {}", self.health_url);
        let resp = self
            .client
            .get(&self.health_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| TransportError::NetworkUnreachable(e.to_string()))?;
        Self::read_json(resp).await.map(HealthStatus)
    }
}

/// Run `fut` under an external deadline. Expiry is reported the same way as a
/// connection that could not be established.
pub async fn with_deadline<T, F>(deadline: Duration, fut: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::NetworkUnreachable(format!(
            "no response within {:?}",
            deadline
        ))),
    }
}

/// Wraps any transport so every call is subject to [`with_deadline`].
pub struct WithDeadline<T> {
    inner: T,
    deadline: Duration,
}

impl<T> WithDeadline<T> {
    pub fn new(inner: T, deadline: Duration) -> Self {
        Self { inner, deadline }
    }
}

#[async_trait]
impl<T: AnalysisTransport> AnalysisTransport for WithDeadline<T> {
    async fn submit_analysis(&self, input: &AnalysisInput) -> Result<RawResponse, TransportError> {
        with_deadline(self.deadline, self.inner.submit_analysis(input)).await
    }

    async fn check_health(&self) -> Result<HealthStatus, TransportError> {
        with_deadline(self.deadline, self.inner.check_health()).await
    }
}

fn snippet(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
