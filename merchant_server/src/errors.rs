use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use log::error;
use merchant_engine::{ErrorKind, MerchantError};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("{0}")]
    Merchant(#[from] MerchantError),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Could not read request path: {0}")]
    InvalidRequestPath(String),
    #[error("Could not read query parameters: {0}")]
    InvalidQuery(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
}

impl ServerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Merchant(e) => e.kind(),
            Self::InvalidRequestBody(_) | Self::InvalidRequestPath(_) | Self::InvalidQuery(_) => ErrorKind::BadRequest,
            Self::InitializeError(_) | Self::IOError(_) | Self::ConfigurationError(_) => ErrorKind::DbHard,
        }
    }
}

/// The HTTP status every error kind is reported with.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    use ErrorKind::*;
    match kind {
        BadRequest | ParameterMalformed | ParameterMissing | CurrencyMismatch | MintNotTrusted => {
            StatusCode::BAD_REQUEST
        },
        InstanceUnknown | InstanceHasNoWire | ContractNotFound | ProductNotFound => StatusCode::NOT_FOUND,
        InstanceConflict | OrderAlreadyExists | AlreadyClaimed | OrderNotClaimed | AlreadyPaid | MintRejected |
        OrderAborted | RefundExceedsPayment | RefundInconsistentAmount | OrderUnpaid | ProductConflict => {
            StatusCode::CONFLICT
        },
        PartialPayment => StatusCode::PAYMENT_REQUIRED,
        CoinSignatureInvalid => StatusCode::FORBIDDEN,
        MintUnreachable => StatusCode::GATEWAY_TIMEOUT,
        DeadlineExceeded | RefundNotPermittedAfterDeadline | InventoryInsufficient => StatusCode::GONE,
        DbSoft | DbHard | SignatureInvariantFailure => StatusCode::INTERNAL_SERVER_ERROR,
        FailedDependency => StatusCode::FAILED_DEPENDENCY,
        TransferPending => StatusCode::ACCEPTED,
    }
}

/// The JSON body shared by every error reply.
pub fn error_body(kind: ErrorKind, hint: &str, detail: Option<Value>) -> Value {
    let mut body = json!({ "code": kind.code(), "error": kind.name(), "hint": hint });
    if let Some(detail) = detail {
        body["detail"] = detail;
    }
    body
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        status_for(self.kind())
    }

    fn error_response(&self) -> HttpResponse {
        let (hint, detail) = match self {
            Self::Merchant(e) => (e.to_string(), e.detail()),
            Self::InvalidRequestBody(_) | Self::InvalidRequestPath(_) | Self::InvalidQuery(_) => {
                (self.to_string(), None)
            },
            _ => {
                error!("💻️ Internal server error: {self}");
                ("Internal server error".to_string(), None)
            },
        };
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(error_body(self.kind(), &hint, detail).to_string())
    }
}
