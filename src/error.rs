//! Error types shared across the session and engine layers.
//!
//! Only lookup errors ever reach callers as hard failures. Routing errors are
//! logged and the intent is dropped; navigation failures become error pages;
//! cleanup failures are logged and swallowed.

use thiserror::Error;
use uuid::Uuid;

/// Registry lookups that violate the caller contract (check first, then ask).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("there is no active session")]
    NoCurrentSession,

    #[error("there is no session with UUID {0}")]
    UnknownSession(Uuid),
}

/// Reasons an inbound launch intent was ignored.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntentError {
    #[error("intent was relaunched from history")]
    LaunchedFromHistory,

    #[error("process is restoring saved state")]
    RestoringState,

    #[error("view intent carries no URL")]
    MissingUrl,

    #[error("share intent carries no text")]
    MissingText,

    #[error("unsupported intent action `{0}`")]
    UnsupportedAction(String),
}

/// Failures inside an engine backend or while translating its events.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("{kind} hit target must carry a URL")]
    InvalidHitTarget { kind: &'static str },

    #[error("renderer failed to {operation}: {message}")]
    Renderer {
        operation: &'static str,
        message: String,
    },

    #[error("no renderer available for the {0} backend")]
    BackendUnavailable(&'static str),
}

impl EngineError {
    pub fn renderer(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Renderer {
            operation,
            message: message.into(),
        }
    }
}

/// Download hand-off failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownloadError {
    #[error("downloads are only supported over http(s), got `{0}`")]
    UnsupportedScheme(String),

    #[error("download queue rejected `{url}`: {reason}")]
    Rejected { url: String, reason: String },

    #[error("pending download state is invalid: {0}")]
    InvalidState(String),
}
