// Library crate: the reconciliation core plus the pieces the binary wires up.
// main.rs only parses arguments and drives a session.

pub mod config;
pub mod controller;
pub mod diagnostics;
pub mod error;
pub mod model;
pub mod normalize;
pub mod schema;
pub mod session;
pub mod transport;

pub use controller::{classify_input, Completion, RequestController, RequestState};
pub use error::{AnalysisError, NormalizeError, TransportError, ValidationError};
pub use model::{AnalysisResult, RawResponse};
pub use normalize::normalize;
pub use session::{AnalysisSession, RetryPolicy, SharedSession};
pub use transport::{AnalysisInput, AnalysisTransport, HealthStatus, HttpTransport};
