//! Pure settlement arithmetic for the Reelpot slot machine.
//!
//! Everything in this crate is integer money math over the currency's
//! smallest unit: no IO, no global state, no floating point anywhere a
//! balance is touched. The `bot` crate layers collaborators (price
//! sources, durable storage, payment execution) on top of these types.

pub mod batch;
pub mod entry_fee;
pub mod math;
pub mod payout;
pub mod reels;

pub use batch::{BatchTotals, GameResult};
pub use entry_fee::{EntryFeeError, FeeMode, Purchase};
pub use payout::{PayoutRule, PayoutTable, PayoutTableError, JACKPOT_RULE, OPERATOR_FEE_PCT};
pub use reels::{Spin, Symbol, Tier};
