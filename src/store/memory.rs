//! In-process store, for embedding and tests.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use super::{HistoryStore, StoreConfigStore};
use crate::error::{LotteryError, LotteryResult};
use crate::models::{DrawRecord, StoreState};

#[derive(Default)]
pub struct MemoryLotteryStore {
    stores: RwLock<HashMap<i64, StoreState>>,
    history: RwLock<Vec<DrawRecord>>,
}

impl MemoryLotteryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(state: StoreState) -> Self {
        let store = Self::new();
        store.stores.write().insert(state.id, state);
        store
    }

    pub fn history_len(&self) -> usize {
        self.history.read().len()
    }
}

#[async_trait]
impl StoreConfigStore for MemoryLotteryStore {
    async fn get_store(&self, id: i64) -> LotteryResult<StoreState> {
        self.stores
            .read()
            .get(&id)
            .cloned()
            .ok_or(LotteryError::StoreNotFound(id))
    }

    async fn update_store(&self, state: &StoreState) -> LotteryResult<()> {
        self.stores.write().insert(state.id, state.clone());
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for MemoryLotteryStore {
    async fn get_history(&self, code: &str) -> LotteryResult<Vec<DrawRecord>> {
        Ok(self
            .history
            .read()
            .iter()
            .filter(|r| r.code == code)
            .cloned()
            .collect())
    }

    async fn post_history(&self, record: &DrawRecord) -> LotteryResult<()> {
        self.history.write().push(record.clone());
        Ok(())
    }
}
