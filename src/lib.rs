//! Prize Draw Backend Library
//!
//! Verifies a customer's net spend against the retail settlement API and runs weighted
//! prize draws against a finite inventory. Binaries and tests build on these modules.

pub mod api;
pub mod config;
pub mod draw;
pub mod error;
pub mod models;
pub mod settlement;
pub mod store;

pub use error::{LotteryError, LotteryResult};
