use crate::response::Redirect;
use crate::validation::StatusError;
use thiserror::Error;

/// Crate-level error returned by the request transformer and response writer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// One or more parameters failed to decode or validate.
    #[error("{0}")]
    BadRequest(StatusError),

    #[error("UNMATCHED TRANSFORMER: bound to {expected}, got {actual}")]
    UnmatchedTransformer {
        expected: &'static str,
        actual: &'static str,
    },

    /// A redirect travelling through the error channel.
    #[error("REDIRECT: {} {}", .0.status, .0.location)]
    Redirect(Redirect),

    #[error("CODEC ERROR: {0}")]
    Codec(#[from] crate::codec::CodecError),

    #[error("COMPILE ERROR: {0}")]
    Compile(#[from] crate::validation::CompileError),

    #[error("VALUE ERROR: {0}")]
    Value(#[from] crate::reflect::ValueError),

    #[error("HTTP ERROR: {code} - {message}")]
    Http { code: String, message: String },

    #[error("SYSTEM ERROR: {code} - {message}")]
    Internal { code: String, message: String },
}

impl TransportError {
    pub fn http(code: &str, message: impl Into<String>) -> Self {
        Self::Http {
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn internal(code: &str, message: impl Into<String>) -> Self {
        Self::Internal {
            code: code.to_string(),
            message: message.into(),
        }
    }

    /// HTTP status this error maps to when written as a response.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest(err) => err.code,
            Self::Redirect(redirect) => redirect.status.as_u16(),
            Self::Http { code, .. } if code == error_codes::BODY_TOO_LARGE => 413,
            Self::Http { .. } => 400,
            _ => 500,
        }
    }
}

impl From<StatusError> for TransportError {
    fn from(err: StatusError) -> Self {
        Self::BadRequest(err)
    }
}

/// **STANDARDIZED ERROR CODES**
pub mod error_codes {
    pub const INVALID_URL: &str = "COURIER_HTTP_INVALID_URL";
    pub const INVALID_HEADER: &str = "COURIER_HTTP_INVALID_HEADER";
    pub const INVALID_METHOD: &str = "COURIER_HTTP_INVALID_METHOD";
    pub const BODY_TOO_LARGE: &str = "COURIER_HTTP_BODY_TOO_LARGE";
    pub const BODY_READ: &str = "COURIER_HTTP_BODY_READ";
    pub const BUILD_FAILED: &str = "COURIER_SYSTEM_BUILD_FAILED";
}
