// Request lifecycle for one analysis panel. The controller never talks to the
// network: submit() mints a ticket, the driver hands the outcome back through
// complete(), and only the request currently loading may change visible state.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::diagnostics::{DiagnosticEventKind, DiagnosticsState};
use crate::error::{AnalysisError, NormalizeError, TransportError, ValidationError};
use crate::model::{AnalysisResult, RawResponse};
use crate::normalize::normalize;
use crate::transport::AnalysisInput;

#[derive(Debug, Clone, PartialEq)]
pub enum RequestState {
    Idle,
    Loading {
        request_id: u64,
    },
    Success {
        request_id: u64,
        result: Arc<AnalysisResult>,
    },
    Failed {
        request_id: u64,
        error: AnalysisError,
    },
}

impl RequestState {
    pub fn request_id(&self) -> Option<u64> {
        match self {
            RequestState::Idle => None,
            RequestState::Loading { request_id }
            | RequestState::Success { request_id, .. }
            | RequestState::Failed { request_id, .. } => Some(*request_id),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, RequestState::Loading { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            RequestState::Idle => "idle",
            RequestState::Loading { .. } => "loading",
            RequestState::Success { .. } => "success",
            RequestState::Failed { .. } => "failed",
        }
    }
}

/// Ticket for one accepted submission; the driver sends `input` and reports
/// back with `request_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub request_id: u64,
    pub input: AnalysisInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The outcome became the visible state.
    Applied,
    /// The request had been superseded or cancelled; nothing changed.
    Discarded,
}

pub struct RequestController {
    state: RequestState,
    last_request_id: u64,
    diagnostics: DiagnosticsState,
}

impl RequestController {
    pub fn new() -> Self {
        Self {
            state: RequestState::Idle,
            last_request_id: 0,
            diagnostics: DiagnosticsState::new(),
        }
    }

    pub fn state(&self) -> &RequestState {
        &self.state
    }

    /// Most recently minted id, `None` before the first submission.
    pub fn last_request_id(&self) -> Option<u64> {
        (self.last_request_id > 0).then_some(self.last_request_id)
    }

    pub fn diagnostics(&self) -> &DiagnosticsState {
        &self.diagnostics
    }

    /// True while `request_id` is the one loading. Anything else is stale.
    pub fn is_current(&self, request_id: u64) -> bool {
        matches!(self.state, RequestState::Loading { request_id: id } if id == request_id)
    }

    /// Validate and classify `raw_input`, then move to `Loading` under a fresh id.
    ///
    /// Blank input is rejected without touching the state. Any earlier request
    /// still in flight becomes stale.
    pub fn submit(&mut self, raw_input: &str) -> Result<Submission, ValidationError> {
        let input = match classify_input(raw_input) {
            Ok(input) => input,
            Err(e) => {
                debug!("Submission rejected: {}", e);
                self.diagnostics.emit(DiagnosticEventKind::SubmissionRejected {
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };

        if let RequestState::Loading { request_id } = self.state {
            debug!("Request {} superseded", request_id);
        }

        self.last_request_id += 1;
        let request_id = self.last_request_id;
        self.state = RequestState::Loading { request_id };

        info!("Request {} submitted ({} mode)", request_id, input.mode());
        self.diagnostics.emit(DiagnosticEventKind::SubmissionStarted {
            request_id,
            mode: input.mode().to_string(),
        });

        Ok(Submission { request_id, input })
    }

    /// Hand back the transport outcome for `request_id`.
    pub fn complete(
        &mut self,
        request_id: u64,
        outcome: Result<RawResponse, TransportError>,
    ) -> Completion {
        if !self.is_current(request_id) {
            debug!(
                "Discarding stale response for request {} (state: {}, latest: {})",
                request_id,
                self.state.label(),
                self.last_request_id
            );
            self.diagnostics
                .emit(DiagnosticEventKind::StaleResponseDiscarded {
                    request_id,
                    current_request_id: self.state.request_id(),
                });
            return Completion::Discarded;
        }

        let result = outcome
            .map_err(AnalysisError::from)
            .and_then(|raw| normalize(&raw).map_err(AnalysisError::from));

        self.state = match result {
            Ok(result) => {
                info!(
                    "Request {} succeeded ({} response)",
                    request_id, result.variant
                );
                self.diagnostics.emit(DiagnosticEventKind::ResponseApplied {
                    request_id,
                    variant: result.variant,
                });
                RequestState::Success {
                    request_id,
                    result: Arc::new(result),
                }
            }
            Err(error) => {
                self.record_failure(request_id, &error);
                RequestState::Failed { request_id, error }
            }
        };

        Completion::Applied
    }

    /// Drop back to `Idle` if a request is loading. Its response will be
    /// discarded when it arrives.
    pub fn cancel(&mut self) -> bool {
        match self.state {
            RequestState::Loading { request_id } => {
                info!("Request {} cancelled", request_id);
                self.diagnostics
                    .emit(DiagnosticEventKind::RequestCancelled { request_id });
                self.state = RequestState::Idle;
                true
            }
            _ => false,
        }
    }

    /// Forget any result or error and return to `Idle`.
    pub fn reset(&mut self) {
        if self.cancel() {
            return;
        }
        self.state = RequestState::Idle;
    }

    pub fn note_retry(&mut self, request_id: u64, attempt: u32, error: &TransportError) {
        warn!(
            "Request {} attempt {} failed, retrying: {}",
            request_id, attempt, error
        );
        self.diagnostics.emit(DiagnosticEventKind::RetryScheduled {
            request_id,
            attempt,
            error: error.to_string(),
        });
    }

    fn record_failure(&mut self, request_id: u64, error: &AnalysisError) {
        match error {
            AnalysisError::Normalize(NormalizeError::UnknownShape { raw }) => {
                warn!(
                    "Request {}: analysis service returned an unrecognized shape: {}",
                    request_id, raw
                );
                self.diagnostics.emit(DiagnosticEventKind::UnknownShape {
                    request_id,
                    raw: raw.clone(),
                });
            }
            other => warn!("Request {} failed: {}", request_id, other),
        }
        self.diagnostics.emit(DiagnosticEventKind::ResponseFailed {
            request_id,
            error: error.to_string(),
        });
    }
}

impl Default for RequestController {
    fn default() -> Self {
        Self::new()
    }
}

/// Decide how an input is sent.
///
/// Anything starting with `http://` or `https://` (any case) is a link, as is a
/// bare `www.` host, which gets `https://` prepended. Everything else is a
/// free-text description.
pub fn classify_input(raw_input: &str) -> Result<AnalysisInput, ValidationError> {
    let trimmed = raw_input.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::BlankInput);
    }

    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Ok(AnalysisInput::Url(trimmed.to_string()));
    }

    if lower.starts_with("www.") && !trimmed.contains(char::is_whitespace) {
        let candidate = format!("https://{}", trimmed);
        if url::Url::parse(&candidate).is_ok_and(|u| u.host_str().is_some()) {
            return Ok(AnalysisInput::Url(candidate));
        }
    }

    Ok(AnalysisInput::Text(trimmed.to_string()))
}
