//! Error types shared across the engine.
//!
//! I/O-level failures bubble up to the engine, which transitions the
//! lifecycle to ERROR and terminates. Logic-level anomalies (insufficient
//! funds, near-duplicate buys, a lagging REST view) are handled locally
//! and never surface here.

use crate::core::state_machine::State;
use thiserror::Error;

/// Unified error type for the grid engine.
#[derive(Debug, Error)]
pub enum Error {
    /// A lifecycle transition that the state machine does not allow.
    /// Always a programming error.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidTransition { from: State, to: State },

    /// Credentials rejected or API key permissions missing. Fatal at init.
    #[error("authentication: {0}")]
    Auth(String),

    /// The upstream exchange reported an error for a request.
    #[error("exchange: {0}")]
    Exchange(String),

    /// Cancel targeted an order the exchange no longer knows. Callers
    /// treat this as already-canceled.
    #[error("unknown order '{0}'")]
    UnknownOrder(String),

    /// The exchange could not be reached or is not online.
    #[error("upstream unavailable: {0}")]
    Unavailable(String),

    /// Invalid configuration or input.
    #[error("validation: {0}")]
    Validation(String),

    /// The engine is in a state in which the operation makes no sense.
    #[error("lifecycle: {0}")]
    Lifecycle(String),

    #[error(transparent)]
    Db(#[from] rusqlite::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
