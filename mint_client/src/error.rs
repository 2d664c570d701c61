use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum MintApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("Invalid mint request: {0}")]
    RequestError(String),
    #[error("Invalid mint response: {0}")]
    ResponseError(String),
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    /// The mint understood the request and refused it. `proof` is the mint's reply body, verbatim.
    #[error("The mint rejected the request. Status {status}")]
    Rejected { status: u16, proof: Value },
    #[error("The mint at {url} could not be reached: {reason}")]
    Unreachable { url: String, reason: String },
}

impl MintApiError {
    /// Transient failures are worth retrying. A rejection never is.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }
}
