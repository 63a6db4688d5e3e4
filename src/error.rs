use serde_json::Value;

/// Message shown to end users for every failure kind. Structured detail stays
/// in the error value for logs.
pub const GENERIC_FAILURE_MESSAGE: &str =
    "Analysis failed. Check the link or try again later.";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Input is blank")]
    BlankInput,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("Analysis service unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("Analysis service returned HTTP {0}")]
    HttpStatus(u16),

    #[error("Malformed response body: {0}")]
    MalformedBody(String),
}

impl TransportError {
    /// Failures worth another attempt: the connection never completed, or the
    /// service signalled overload / a gateway hiccup.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::NetworkUnreachable(_) => true,
            TransportError::HttpStatus(code) => matches!(code, 429 | 500 | 502 | 503 | 504),
            TransportError::MalformedBody(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NormalizeError {
    #[error("Unrecognized response shape")]
    UnknownShape { raw: Value },

    #[error("Analysis service rejected the request: {}", .message.as_deref().unwrap_or("no reason given"))]
    Rejected { message: Option<String>, raw: Value },
}

impl NormalizeError {
    pub fn raw(&self) -> &Value {
        match self {
            NormalizeError::UnknownShape { raw } | NormalizeError::Rejected { raw, .. } => raw,
        }
    }
}

/// What a `Failed` request carries.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),
}

impl AnalysisError {
    pub fn user_message(&self) -> &'static str {
        GENERIC_FAILURE_MESSAGE
    }

    /// Raw payload behind a normalize failure, if any.
    pub fn raw_payload(&self) -> Option<&Value> {
        match self {
            AnalysisError::Transport(_) => None,
            AnalysisError::Normalize(e) => Some(e.raw()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid API URL '{url}': {source}")]
    InvalidApiUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("API URL '{0}' must use http or https")]
    UnsupportedScheme(String),
}
