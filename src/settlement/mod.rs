//! External settlement verification
//! Signs, fetches and reconciles order/refund data into one trusted spend figure.

pub mod client;
pub mod reconcile;
pub mod signer;

pub use client::{
    SettlementClient, SettlementEndpoint, SettlementRequest, SettlementResponses, SignedRequest,
    UpstreamPayload,
};
pub use reconcile::reconcile;
pub use signer::{ParamValue, SignedParameters, SigningTrace};

use async_trait::async_trait;

use crate::error::LotteryResult;
use crate::models::SpendResult;

/// Anything that can resolve an order identifier to a verified spend.
#[async_trait]
pub trait SpendSource: Send + Sync {
    /// `Ok(None)` means the identifier has no purchase history.
    async fn net_spend(&self, order_id: &str) -> LotteryResult<Option<SpendResult>>;
}
