//! Error taxonomy for the settlement path.
//!
//! Validation-class errors are recovered locally with a user-facing
//! message and no mutation; payment-class errors attempt compensation
//! before surfacing. Nothing is swallowed without at least a log line.

use reelpot_engine::EntryFeeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BotError {
    /// Every configured quote source failed. Fatal for the current
    /// request; no funds move.
    #[error("no price source returned a usable quote")]
    PriceUnavailable,

    /// Tip failed entry-fee validation. Fatal for the request; no funds
    /// move; the user is shown the required amount.
    #[error(transparent)]
    InvalidTip(#[from] EntryFeeError),

    /// The event lacks a channel or message identifier needed to reply
    /// or pay.
    #[error("event {event_id} lacks routing info needed to reply")]
    MissingRoutingInfo { event_id: String },

    /// External transfer exhausted its retries.
    #[error("payment failed after {attempts} attempt(s): {reason}")]
    PaymentFailure { attempts: u32, reason: String },

    /// A computed payout exceeded the available balance. Prevented by
    /// construction for percentage payouts; guards the external-mirror
    /// stale-balance race.
    #[error("payout {requested} exceeds pool balance {available}")]
    InsufficientPool { requested: u64, available: u64 },

    #[error("state storage error")]
    Storage(#[from] anyhow::Error),

    #[error("balance query failed for {account}")]
    BalanceQuery {
        account: String,
        #[source]
        source: anyhow::Error,
    },
}

impl BotError {
    /// Validation-class errors recover without mutating anything.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            BotError::PriceUnavailable
                | BotError::InvalidTip(_)
                | BotError::MissingRoutingInfo { .. }
        )
    }
}
