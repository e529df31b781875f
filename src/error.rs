use thiserror::Error;

use crate::engine::stage::Stage;

/// Closed set of failures surfaced by the dispatch core. Transport-level
/// errors never escape as raw `reqwest` errors; they are folded into
/// `Transient` (or treated as refresh failure inside the session layer).
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The token pair is gone or unusable and one refresh cycle already
    /// failed. The caller decides whether this forces a logout.
    #[error("session expired")]
    ExpiredSession,

    /// Another driver won the accept race. An expected concurrent outcome,
    /// not a fault.
    #[error("order already taken")]
    Conflict,

    /// Rejected locally before any request was sent.
    #[error("invalid stage transition: {from} -> {to}")]
    InvalidTransition { from: Stage, to: Stage },

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for DispatchError {
    fn from(err: reqwest::Error) -> Self {
        DispatchError::Transient(err.to_string())
    }
}
