//! Inbound tip events and the collaborator seams.
//!
//! The chat-platform SDK, the wallet and the balance endpoint are
//! external collaborators. They appear here as object-safe traits so
//! the settlement engine can be driven by fakes in tests and by thin
//! adapters in production.

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// A tip delivered by the platform glue. Amounts are in the currency's
/// smallest unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TipEvent {
    pub sender: String,
    pub receiver: String,
    pub amount: u64,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
    pub user_id: String,
    #[serde(default)]
    pub space_id: Option<String>,
}

/// One leg of a payment request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub recipient: String,
    pub amount: u64,
}

/// Outbound message delivery. `thread` groups a multi-game batch into
/// one conversation thread where the platform supports it.
pub trait Messenger: Send + Sync {
    fn send(&self, channel: &str, body: &str, thread: Option<&str>) -> Result<()>;
}

/// Payment execution. All legs are submitted as one atomic
/// multi-transfer so a partial failure cannot strand the operator fee.
/// Returns a transaction reference; any error counts as a payment
/// failure.
pub trait PaymentExecutor: Send + Sync {
    fn transfer(&self, transfers: &[Transfer]) -> Result<String>;
}

/// Live balance of an external account, in smallest units.
pub trait BalanceQuery: Send + Sync {
    fn balance(&self, account: &str) -> Result<u64>;
}
