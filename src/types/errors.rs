//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation and provide
//! clear error messages with context.
//!
//! Queue overflow is deliberately absent: dropping the oldest queued message
//! is a warning-level recoverable condition, never an error surfaced to the
//! sender. Resource-limit breaches are advisory state on the monitor, not
//! errors either.

use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the Concourse shell.
#[derive(Error, Debug)]
pub enum Error {
    /// Named app has no registry record at all.
    #[error("app not found: {0}")]
    AppNotFound(String),

    /// Strict-mode launch collided with a live instance.
    #[error("app already running: {0}")]
    AppAlreadyRunning(String),

    /// close/focus on an absent or already-terminal instance.
    #[error("app not running: {0}")]
    AppNotRunning(String),

    /// Invalid lifecycle state transition.
    #[error("state transition error: {0}")]
    StateTransition(String),

    /// Request deadline elapsed with no response.
    #[error("request timeout: {0}")]
    RequestTimeout(String),

    /// Request target closed while the request was pending.
    #[error("request cancelled: {0}")]
    RequestCancelled(String),

    /// Internal errors (closed channels, bus plumbing).
    #[error("internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// Convenience constructors
impl Error {
    pub fn app_not_found(msg: impl Into<String>) -> Self {
        Self::AppNotFound(msg.into())
    }

    pub fn app_already_running(msg: impl Into<String>) -> Self {
        Self::AppAlreadyRunning(msg.into())
    }

    pub fn app_not_running(msg: impl Into<String>) -> Self {
        Self::AppNotRunning(msg.into())
    }

    pub fn state_transition(msg: impl Into<String>) -> Self {
        Self::StateTransition(msg.into())
    }

    pub fn request_timeout(msg: impl Into<String>) -> Self {
        Self::RequestTimeout(msg.into())
    }

    pub fn request_cancelled(msg: impl Into<String>) -> Self {
        Self::RequestCancelled(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True for `RequestTimeout`.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::RequestTimeout(_))
    }

    /// True for `RequestCancelled`.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::RequestCancelled(_))
    }
}
