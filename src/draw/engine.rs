//! Weighted prize draw
//!
//! Each entry's chance is its share of the remaining pool. Pure: the input inventory is
//! never touched, the caller persists the returned one.

use rand::Rng;
use tracing::debug;

use crate::models::{DrawOutcome, PrizeEntry, PrizeInventory};

#[derive(Debug, Clone, Copy, Default)]
pub struct DrawEngine;

impl DrawEngine {
    pub fn new() -> Self {
        Self
    }

    /// Cumulative weights: entry `i` holds `sum(quantity[0..=i]) / total`.
    /// Empty when the pool is exhausted.
    pub fn cumulative_weights(inventory: &PrizeInventory) -> Vec<f64> {
        let total = inventory.total();
        if total == 0 {
            return Vec::new();
        }

        let mut running = 0u64;
        inventory
            .entries()
            .iter()
            .map(|entry| {
                running += entry.quantity as u64;
                running as f64 / total as f64
            })
            .collect()
    }

    /// Draw one unit using `rng`. `None` when the pool is exhausted.
    pub fn draw<R: Rng + ?Sized>(&self, inventory: &PrizeInventory, rng: &mut R) -> Option<DrawOutcome> {
        let sample: f64 = rng.gen();
        self.draw_with_sample(inventory, sample)
    }

    /// Draw with an explicit uniform sample in `[0, 1)`.
    ///
    /// The first entry whose cumulative weight is `>= sample` wins. Entries with no stock
    /// are never selected, even for a sample of exactly 0.
    pub fn draw_with_sample(&self, inventory: &PrizeInventory, sample: f64) -> Option<DrawOutcome> {
        let weights = Self::cumulative_weights(inventory);
        if weights.is_empty() {
            return None;
        }

        let r = if sample.is_finite() {
            sample.clamp(0.0, 1.0)
        } else {
            0.0
        };

        let entries = inventory.entries();
        let index = weights
            .iter()
            .zip(entries)
            .position(|(w, entry)| entry.quantity > 0 && *w >= r)
            // Rounding can leave the last bound a hair below r; fall back to the last stocked entry.
            .or_else(|| entries.iter().rposition(|e| e.quantity > 0))?;

        let mut updated = inventory.clone();
        let chosen = &mut updated.0[index];
        chosen.quantity -= 1;
        let selected = PrizeEntry::new(chosen.name.clone(), 1);

        debug!(
            prize = %selected.name,
            index,
            sample = r,
            remaining = chosen.quantity,
            "prize drawn"
        );

        Some(DrawOutcome {
            selected_index: index,
            selected,
            updated_inventory: updated,
        })
    }
}
