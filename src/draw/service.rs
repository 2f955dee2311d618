//! Draw attempt orchestration
//!
//! verify spend -> lock store -> reload store -> eligibility -> draw -> persist.
//! Draws against one store id are serialized here; the engine itself holds no locks.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::engine::DrawEngine;
use crate::error::{LotteryError, LotteryResult};
use crate::models::{DrawRecord, PrizeInventory, StoreState};
use crate::settlement::client::{civil_now, validate_order_id};
use crate::settlement::SpendSource;
use crate::store::{HistoryStore, StoreConfigStore};

/// Terminal states of one attempt. Only `Won` mutates anything.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DrawAttempt {
    Won(DrawReceipt),
    /// The identifier has no order records at all.
    NoPurchaseHistory,
    /// Every draw the spend entitles to has been used.
    AlreadyExhausted {
        net_spend: f64,
        allowed: u32,
        used: u32,
    },
    PoolExhausted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrawReceipt {
    pub prize_name: String,
    pub net_spend: f64,
    pub draws_allowed: u32,
    /// Including this draw.
    pub draws_used: u32,
    pub remaining_inventory: PrizeInventory,
    pub record: DrawRecord,
}

impl DrawReceipt {
    pub fn draws_remaining(&self) -> u32 {
        self.draws_allowed.saturating_sub(self.draws_used)
    }
}

pub struct DrawService {
    spend: Arc<dyn SpendSource>,
    stores: Arc<dyn StoreConfigStore>,
    history: Arc<dyn HistoryStore>,
    engine: DrawEngine,
    rng: Mutex<StdRng>,
    store_locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl DrawService {
    pub fn new(
        spend: Arc<dyn SpendSource>,
        stores: Arc<dyn StoreConfigStore>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self::with_rng(spend, stores, history, StdRng::from_entropy())
    }

    pub fn with_rng(
        spend: Arc<dyn SpendSource>,
        stores: Arc<dyn StoreConfigStore>,
        history: Arc<dyn HistoryStore>,
        rng: StdRng,
    ) -> Self {
        Self {
            spend,
            stores,
            history,
            engine: DrawEngine::new(),
            rng: Mutex::new(rng),
            store_locks: Mutex::new(HashMap::new()),
        }
    }

    fn store_lock(&self, store_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        self.store_locks.lock().entry(store_id).or_default().clone()
    }

    /// Names to roll while an attempt is in flight.
    pub async fn candidate_names(&self, store_id: i64, limit: usize) -> LotteryResult<Vec<String>> {
        Ok(self.stores.get_store(store_id).await?.inventory.candidate_names(limit))
    }

    pub async fn attempt(&self, code: &str, store_id: i64) -> LotteryResult<DrawAttempt> {
        let code = validate_order_id(code)?;

        let Some(spend) = self.spend.net_spend(code).await? else {
            info!(code = %code, "draw refused: no purchase history");
            return Ok(DrawAttempt::NoPurchaseHistory);
        };

        let lock = self.store_lock(store_id);
        let _guard = lock.lock().await;

        let store = self.stores.get_store(store_id).await?;
        if !(store.min_spend.is_finite() && store.min_spend > 0.0) {
            return Err(LotteryError::Validation(format!(
                "store {} has invalid min_spend {}",
                store.id, store.min_spend
            )));
        }

        let allowed = store.draws_allowed(spend.net_amount);
        let used = u32::try_from(self.history.get_history(code).await?.len()).unwrap_or(u32::MAX);
        if used >= allowed {
            info!(code = %code, allowed, used, net = spend.net_amount, "draw refused: already exhausted");
            return Ok(DrawAttempt::AlreadyExhausted {
                net_spend: spend.net_amount,
                allowed,
                used,
            });
        }

        let outcome = {
            let mut rng = self.rng.lock();
            self.engine.draw(&store.inventory, &mut *rng)
        };
        let Some(outcome) = outcome else {
            warn!(store_id, "draw refused: prize pool exhausted");
            return Ok(DrawAttempt::PoolExhausted);
        };

        let updated = StoreState {
            inventory: outcome.updated_inventory.clone(),
            ..store
        };
        let record = DrawRecord {
            code: code.to_string(),
            store_id: updated.id,
            store_name: updated.name.clone(),
            prize_name: outcome.selected.name.clone(),
            spent: spend.net_amount,
            created_at: civil_now(),
        };

        // No shared transaction: either write can land without the other.
        let (store_res, history_res) = tokio::join!(
            self.stores.update_store(&updated),
            self.history.post_history(&record)
        );
        if let Err(e) = &store_res {
            error!(store_id, code = %code, error = %e, "inventory update failed");
        }
        if let Err(e) = &history_res {
            error!(store_id, code = %code, error = %e, "history append failed");
        }
        store_res.and(history_res).map_err(|e| {
            LotteryError::Persistence(format!("{e}; please retry or contact support"))
        })?;

        info!(
            code = %code,
            store_id,
            prize = %record.prize_name,
            draw = used + 1,
            allowed,
            "🎁 prize drawn"
        );

        Ok(DrawAttempt::Won(DrawReceipt {
            prize_name: record.prize_name.clone(),
            net_spend: spend.net_amount,
            draws_allowed: allowed,
            draws_used: used + 1,
            remaining_inventory: outcome.updated_inventory,
            record,
        }))
    }
}
