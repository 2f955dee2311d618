//! Persistence collaborators
//!
//! Prize inventory and draw history live behind two small contracts. The draw flow writes
//! both without a shared transaction, so either write may land without the other.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryLotteryStore;
pub use sqlite::SqliteLotteryStore;

use async_trait::async_trait;

use crate::error::LotteryResult;
use crate::models::{DrawRecord, StoreState};

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Past draws for one order identifier, oldest first.
    async fn get_history(&self, code: &str) -> LotteryResult<Vec<DrawRecord>>;

    async fn post_history(&self, record: &DrawRecord) -> LotteryResult<()>;
}

#[async_trait]
pub trait StoreConfigStore: Send + Sync {
    /// `StoreNotFound` when the id is unknown.
    async fn get_store(&self, id: i64) -> LotteryResult<StoreState>;

    /// Overwrite the whole store state, inventory included.
    async fn update_store(&self, state: &StoreState) -> LotteryResult<()>;
}
