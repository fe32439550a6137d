//! Entry fee sizing and tip validation.
//!
//! Two deployment modes share one type: a USD-pegged fee converted at
//! the current price with a tolerance band, and a fixed fee in native
//! units that must divide the tip exactly.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::math::{abs_diff, rounded_div};

/// Tolerance band for USD-pegged validation, as a percentage of the
/// expected amount.
pub const TOLERANCE_PCT: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FeeMode {
    /// Fixed USD fee converted to native units at the current price.
    UsdPegged { usd_cents: u64 },
    /// Fixed fee in smallest units; the tip must be an exact positive
    /// integer multiple. No price lookup, no tolerance.
    Exact { fee_units: u64 },
}

/// A validated purchase: the entry fee used and the number of games it
/// buys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Purchase {
    pub entry_fee: u64,
    pub num_games: u32,
}

#[derive(Debug, Error, PartialEq)]
pub enum EntryFeeError {
    #[error(
        "tip of {received} rejected: {num_games} game(s) at {entry_fee} per game \
         expects {expected} (tolerance {TOLERANCE_PCT}%)"
    )]
    InvalidTipAmount {
        received: u64,
        entry_fee: u64,
        num_games: u32,
        expected: u64,
    },
    #[error("tip of {received} rejected: must be a positive multiple of {entry_fee}")]
    NotExactMultiple { received: u64, entry_fee: u64 },
    #[error("tip amount must be positive")]
    EmptyTip,
    #[error("price {0} cannot convert the USD entry fee")]
    UnusablePrice(f64),
    #[error("entry fee truncates to zero smallest units at price {0}")]
    ZeroEntryFee(f64),
}

impl FeeMode {
    /// Whether sizing a purchase needs a live USD price first.
    pub fn needs_price(&self) -> bool {
        matches!(self, FeeMode::UsdPegged { .. })
    }

    /// Entry fee in smallest units. `unit_scale` is the number of
    /// smallest units per whole coin. Conversion truncates, never
    /// rounds up.
    pub fn entry_fee_units(
        &self,
        price_usd: Option<f64>,
        unit_scale: u64,
    ) -> Result<u64, EntryFeeError> {
        match *self {
            FeeMode::Exact { fee_units } => Ok(fee_units),
            FeeMode::UsdPegged { usd_cents } => {
                let price = price_usd.unwrap_or(0.0);
                if !price.is_finite() || price <= 0.0 {
                    return Err(EntryFeeError::UnusablePrice(price));
                }
                let coins = usd_cents as f64 / 100.0 / price;
                let units = (coins * unit_scale as f64).floor();
                if units < 1.0 {
                    return Err(EntryFeeError::ZeroEntryFee(price));
                }
                Ok(units as u64)
            }
        }
    }

    /// Size and validate a purchase from a received tip.
    ///
    /// USD-pegged: `num_games = round(received / fee)` floored to 1 (any
    /// nonzero tip buys at least one game), accepted only inside the
    /// tolerance band. Exact mode: the tip must divide evenly.
    /// Rejection never partially consumes the tip.
    pub fn size_purchase(&self, received: u64, entry_fee: u64) -> Result<Purchase, EntryFeeError> {
        if received == 0 {
            return Err(EntryFeeError::EmptyTip);
        }
        if entry_fee == 0 {
            return Err(EntryFeeError::ZeroEntryFee(0.0));
        }
        match self {
            FeeMode::Exact { .. } => {
                if received % entry_fee != 0 {
                    return Err(EntryFeeError::NotExactMultiple {
                        received,
                        entry_fee,
                    });
                }
                let num_games = (received / entry_fee).min(u32::MAX as u64) as u32;
                Ok(Purchase {
                    entry_fee,
                    num_games,
                })
            }
            FeeMode::UsdPegged { .. } => {
                let num_games = rounded_div(received, entry_fee)
                    .max(1)
                    .min(u32::MAX as u64) as u32;
                let expected = entry_fee.saturating_mul(num_games as u64);

                // received >= fee * (1 - tolerance)
                let floor_ok = received as u128 * 100
                    >= entry_fee as u128 * (100 - TOLERANCE_PCT) as u128;
                // |received - expected| <= tolerance * fee * num_games
                let band_ok = abs_diff(received, expected) as u128 * 100
                    <= TOLERANCE_PCT as u128 * entry_fee as u128 * num_games as u128;

                if !floor_ok || !band_ok {
                    return Err(EntryFeeError::InvalidTipAmount {
                        received,
                        entry_fee,
                        num_games,
                        expected,
                    });
                }
                Ok(Purchase {
                    entry_fee,
                    num_games,
                })
            }
        }
    }
}
