use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;

use crate::config::DIAGNOSTICS_BUFFER_SIZE;
use crate::schema::SchemaVariant;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum DiagnosticEventKind {
    // Submission lifecycle
    SubmissionStarted {
        request_id: u64,
        mode: String,
    },
    SubmissionRejected {
        reason: String,
    },
    RequestCancelled {
        request_id: u64,
    },

    // Transport
    RetryScheduled {
        request_id: u64,
        attempt: u32,
        error: String,
    },

    // Completions
    ResponseApplied {
        request_id: u64,
        variant: SchemaVariant,
    },
    ResponseFailed {
        request_id: u64,
        error: String,
    },
    StaleResponseDiscarded {
        request_id: u64,
        current_request_id: Option<u64>,
    },

    // Backend contract drift
    UnknownShape {
        request_id: u64,
        raw: Value,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: DiagnosticEventKind,
}

pub struct DiagnosticsState {
    events: VecDeque<DiagnosticEvent>,
}

impl DiagnosticsState {
    pub fn new() -> Self {
        Self {
            events: VecDeque::with_capacity(DIAGNOSTICS_BUFFER_SIZE),
        }
    }

    /// Record an event, evicting the oldest once the ring is full.
    pub fn emit(&mut self, kind: DiagnosticEventKind) {
        while self.events.len() >= DIAGNOSTICS_BUFFER_SIZE {
            self.events.pop_front();
        }
        let event = DiagnosticEvent {
            timestamp: Utc::now(),
            kind,
        };
        self.events.push_back(event);
    }

    /// Newest first. `categories` restricts the result to events whose
    /// [`DiagnosticEvent::filter_category`] is listed.
    pub fn events(&self, limit: usize, categories: Option<&[String]>) -> Vec<DiagnosticEvent> {
        self.events
            .iter()
            .rev()
            .filter(|event| {
                categories.map_or(true, |wanted| {
                    wanted.iter().any(|c| c.as_str() == event.filter_category())
                })
            })
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl Default for DiagnosticsState {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticEvent {
    pub fn filter_category(&self) -> &'static str {
        match &self.kind {
            DiagnosticEventKind::SubmissionStarted { .. }
            | DiagnosticEventKind::SubmissionRejected { .. }
            | DiagnosticEventKind::RequestCancelled { .. } => "submission",

            DiagnosticEventKind::RetryScheduled { .. } => "transport",

            DiagnosticEventKind::ResponseApplied { .. }
            | DiagnosticEventKind::ResponseFailed { .. }
            | DiagnosticEventKind::StaleResponseDiscarded { .. } => "completion",

            DiagnosticEventKind::UnknownShape { .. } => "contract",
        }
    }
}
