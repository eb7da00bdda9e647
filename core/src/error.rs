use serde_json::Value;
use thiserror::Error;

/// Fault taxonomy for everything below the dispatcher. Nothing here may
/// terminate the process; the dispatcher converts each variant into an
/// error-flagged tool result and keeps serving.
#[derive(Debug, Error)]
pub enum DoorayError {
    /// Remote HTTP 401. Startup token absence is handled separately by the
    /// server binary and never reaches this variant.
    #[error("Invalid or expired API token")]
    Authentication,

    /// Remote-reported failure: a non-2xx HTTP status, or an HTTP 200 whose
    /// envelope header carries `success: false`.
    #[error("{message}")]
    Remote {
        message: String,
        status_code: Option<u16>,
        raw_body: Option<Value>,
    },

    /// Input rejected before any remote call was attempted.
    #[error("{}", .messages.join(", "))]
    Validation { messages: Vec<String> },

    /// Network-level failure: connect error, timeout, or an unexpected
    /// non-redirect status in the two-step transfer protocol.
    #[error("{message}")]
    Transport { message: String },

    /// Local filesystem fault in an upload/download handler.
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl DoorayError {
    pub fn remote(message: impl Into<String>) -> Self {
        DoorayError::Remote {
            message: message.into(),
            status_code: None,
            raw_body: None,
        }
    }

    pub fn remote_status(
        status_code: u16,
        message: impl Into<String>,
        raw_body: Option<Value>,
    ) -> Self {
        DoorayError::Remote {
            message: message.into(),
            status_code: Some(status_code),
            raw_body,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        DoorayError::Transport {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        DoorayError::Validation {
            messages: vec![message.into()],
        }
    }

    /// True when the fault was produced locally and no request went out.
    pub fn is_local(&self) -> bool {
        matches!(self, DoorayError::Validation { .. } | DoorayError::Io(_))
    }
}
