use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Remaining stock of one prize tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrizeEntry {
    pub name: String,
    pub quantity: u32,
}

impl PrizeEntry {
    pub fn new(name: impl Into<String>, quantity: u32) -> Self {
        Self {
            name: name.into(),
            quantity,
        }
    }
}

/// Ordered prize pool. Order only matters for building the cumulative weights.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrizeInventory(pub Vec<PrizeEntry>);

impl PrizeInventory {
    pub fn new(entries: Vec<PrizeEntry>) -> Self {
        Self(entries)
    }

    pub fn entries(&self) -> &[PrizeEntry] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total remaining draws in the pool.
    pub fn total(&self) -> u64 {
        self.0.iter().map(|e| e.quantity as u64).sum()
    }

    pub fn is_exhausted(&self) -> bool {
        self.total() == 0
    }

    /// Names shown while a draw is rolling.
    pub fn candidate_names(&self, limit: usize) -> Vec<String> {
        self.0.iter().take(limit).map(|e| e.name.clone()).collect()
    }
}

impl From<Vec<PrizeEntry>> for PrizeInventory {
    fn from(entries: Vec<PrizeEntry>) -> Self {
        Self(entries)
    }
}

/// Net verified spend for one order identifier.
/// `net_amount` is not clamped: refunds larger than orders produce a negative value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpendResult {
    pub net_amount: f64,
    pub order_total: f64,
    pub refund_total: f64,
}

impl SpendResult {
    pub fn new(order_total: f64, refund_total: f64) -> Self {
        Self {
            net_amount: order_total - refund_total,
            order_total,
            refund_total,
        }
    }
}

/// Result of one successful draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawOutcome {
    pub selected_index: usize,
    /// The drawn unit; quantity is always 1.
    pub selected: PrizeEntry,
    pub updated_inventory: PrizeInventory,
}

impl DrawOutcome {
    pub fn selected_name(&self) -> &str {
        &self.selected.name
    }
}

/// Store configuration owned by the persistence layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreState {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub dashboard_title: String,
    /// Spend required per draw.
    pub min_spend: f64,
    pub inventory: PrizeInventory,
}

impl StoreState {
    /// Number of draws a given net spend entitles the customer to.
    pub fn draws_allowed(&self, net_spend: f64) -> u32 {
        if !(self.min_spend.is_finite() && self.min_spend > 0.0) || !net_spend.is_finite() {
            return 0;
        }
        let times = (net_spend / self.min_spend).floor();
        if times <= 0.0 {
            0
        } else {
            times.min(u32::MAX as f64) as u32
        }
    }
}

/// One past draw, appended after a successful selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawRecord {
    pub code: String,
    pub store_id: i64,
    pub store_name: String,
    pub prize_name: String,
    pub spent: f64,
    pub created_at: DateTime<FixedOffset>,
}
