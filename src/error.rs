//! Error taxonomy shared by the settlement, draw and store layers.

use std::time::Duration;
use thiserror::Error;

use crate::settlement::SettlementEndpoint;

pub type LotteryResult<T> = Result<T, LotteryError>;

#[derive(Debug, Error)]
pub enum LotteryError {
    /// Missing or blank credentials / base URL. Fatal, never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Rejected before any upstream call.
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("upstream {endpoint} error {status}: {body}")]
    Upstream {
        endpoint: SettlementEndpoint,
        status: u16,
        body: String,
    },

    #[error("settlement deadline of {}ms exceeded", .0.as_millis())]
    Timeout(Duration),

    /// Connection level failure talking to the retail API.
    #[error("upstream transport failure: {0}")]
    Transport(String),

    #[error("store {0} not found")]
    StoreNotFound(i64),

    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl LotteryError {
    /// Stable machine-readable code used in the HTTP error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            LotteryError::Configuration(_) => "configuration_error",
            LotteryError::Validation(_) => "validation_error",
            LotteryError::Upstream { .. } => "upstream_error",
            LotteryError::Timeout(_) => "timeout",
            LotteryError::Transport(_) => "transport_error",
            LotteryError::StoreNotFound(_) => "store_not_found",
            LotteryError::Persistence(_) => "persistence_error",
        }
    }
}

impl From<rusqlite::Error> for LotteryError {
    fn from(err: rusqlite::Error) -> Self {
        LotteryError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for LotteryError {
    fn from(err: serde_json::Error) -> Self {
        LotteryError::Persistence(format!("malformed stored json: {err}"))
    }
}
