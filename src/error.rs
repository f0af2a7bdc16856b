use std::fmt;

use serde::Serialize;

/// Structured error type for the relay. Transport, protocol and translation
/// failures each get their own code so callers can branch on them instead of
/// matching message text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "code", content = "detail")]
pub enum AppError {
    // Transport
    BufferFull { buffer: String },
    PayloadTooLarge { len: usize },
    EmptyPayload,
    ConnectFailed { message: String },
    NotConnected,
    // Wire
    Protocol { message: String },
    // Translation
    Parse { message: String, raw_output: String },
    Validation { message: String },
    // Execution
    Execution { message: String },
    Timeout { what: String },
    DuplicateAction { action: String },
    NotFound { what: String },
    // Ambient
    Api { message: String },
    Io { message: String },
    Settings { message: String },
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BufferFull { buffer } => write!(f, "The {buffer} buffer is full!"),
            AppError::PayloadTooLarge { len } => write!(
                f,
                "Payload of {len} bytes exceeds the {} byte frame limit",
                crate::transport::frame::MAX_PAYLOAD_LEN
            ),
            AppError::EmptyPayload => write!(f, "Cannot send an empty payload"),
            AppError::ConnectFailed { message } => write!(f, "Connection failed: {message}"),
            AppError::NotConnected => write!(f, "Not connected"),
            AppError::Protocol { message } => write!(f, "Protocol error: {message}"),
            AppError::Parse {
                message,
                raw_output,
            } => write!(f, "{message}\nRaw output:\n{raw_output}"),
            AppError::Validation { message } => write!(f, "Validation failed: {message}"),
            AppError::Execution { message } => write!(f, "{message}"),
            AppError::Timeout { what } => write!(f, "Timeout waiting for {what}"),
            AppError::DuplicateAction { action } => {
                write!(f, "Action '{action}' is registered more than once")
            }
            AppError::NotFound { what } => write!(f, "{what} not found"),
            AppError::Api { message } => write!(f, "API error: {message}"),
            AppError::Io { message } => write!(f, "I/O error: {message}"),
            AppError::Settings { message } => write!(f, "Settings error: {message}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Io {
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Protocol {
            message: e.to_string(),
        }
    }
}

impl From<crate::project::StoreError> for AppError {
    fn from(e: crate::project::StoreError) -> Self {
        match e {
            crate::project::StoreError::Io(io_err) => AppError::Io {
                message: io_err.to_string(),
            },
            crate::project::StoreError::Json(json_err) => AppError::Settings {
                message: json_err.to_string(),
            },
        }
    }
}

impl From<AppError> for String {
    fn from(e: AppError) -> String {
        e.to_string()
    }
}

impl From<String> for AppError {
    fn from(s: String) -> Self {
        AppError::Execution { message: s }
    }
}

impl From<&str> for AppError {
    fn from(s: &str) -> Self {
        AppError::Execution {
            message: s.to_string(),
        }
    }
}
