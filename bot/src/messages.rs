//! Human-readable renderings of machine results.
//!
//! Pure string building: the messenger collaborator decides where the
//! text goes.

use reelpot_engine::{BatchTotals, EntryFeeError, GameResult, Tier};

/// Render an amount in smallest units as a decimal quantity of the
/// display ticker. `unit_scale` is smallest units per whole coin.
pub fn format_amount(units: u64, unit_scale: u64, ticker: &str) -> String {
    if unit_scale <= 1 {
        return format!("{units} {ticker}");
    }
    let whole = units / unit_scale;
    let frac = units % unit_scale;
    if frac == 0 {
        return format!("{whole} {ticker}");
    }
    let width = decimal_width(unit_scale);
    let frac = format!("{frac:0width$}");
    format!("{whole}.{} {ticker}", frac.trim_end_matches('0'))
}

fn decimal_width(unit_scale: u64) -> usize {
    let mut width = 0;
    let mut n = 1u64;
    while n < unit_scale {
        n = n.saturating_mul(10);
        width += 1;
    }
    width
}

fn spin_glyphs(result: &GameResult) -> String {
    result
        .spin
        .0
        .iter()
        .map(|s| s.glyph())
        .collect::<Vec<_>>()
        .join(" ")
}

/// One message per game, in play order. The jackpot amount shown is the
/// pool as it stood when this game resolved.
pub fn game_message(
    index: u32,
    total: u32,
    result: &GameResult,
    unit_scale: u64,
    ticker: &str,
) -> String {
    let reels = spin_glyphs(result);
    let pool = format_amount(result.pool_before, unit_scale, ticker);
    let outcome = match result.tier {
        Tier::Jackpot => format!(
            "JACKPOT! All sevens! You win the whole pool: {}!",
            format_amount(result.net, unit_scale, ticker)
        ),
        Tier::Triple => format!(
            "Triple! You win {}!",
            format_amount(result.net, unit_scale, ticker)
        ),
        Tier::Pair => format!(
            "Pair! You win {}!",
            format_amount(result.net, unit_scale, ticker)
        ),
        Tier::Miss => "No win this time.".to_string(),
    };
    format!("Game {index}/{total}: {reels} — {outcome} (jackpot: {pool})")
}

/// Aggregate summary, sent only when more than one game was played.
pub fn summary_message(totals: &BatchTotals, unit_scale: u64, ticker: &str) -> String {
    format!(
        "Played {} games: total winnings {}, paid out to you {}.",
        totals.games,
        format_amount(totals.gross, unit_scale, ticker),
        format_amount(totals.net, unit_scale, ticker)
    )
}

/// Validation failure with the required amount and examples. The tip is
/// never partially consumed.
pub fn invalid_tip_message(
    err: &EntryFeeError,
    entry_fee: u64,
    unit_scale: u64,
    ticker: &str,
) -> String {
    let fee = format_amount(entry_fee, unit_scale, ticker);
    let two = format_amount(entry_fee.saturating_mul(2), unit_scale, ticker);
    format!(
        "Tip rejected: {err}. One game costs {fee}; send {fee} for 1 game, {two} for 2, and so on."
    )
}

pub fn price_unavailable_message() -> String {
    "Price feeds are unavailable right now, so this game cannot be priced. \
     Your tip was not consumed; please try again shortly."
        .to_string()
}

pub fn payment_success_message(net: u64, tx_ref: &str, unit_scale: u64, ticker: &str) -> String {
    format!(
        "Sent your winnings of {} (tx {tx_ref}). Good luck next spin!",
        format_amount(net, unit_scale, ticker)
    )
}

pub fn payment_failure_message(rolled_back: bool) -> String {
    if rolled_back {
        "Payout transfer failed; your winnings were returned to the jackpot pool. \
         Please try again or contact support."
            .to_string()
    } else {
        "Payout transfer failed. Please try again or contact support.".to_string()
    }
}

pub fn pending_credit_message(pending: u64, unit_scale: u64, ticker: &str) -> String {
    format!(
        "Your winnings were credited: {} pending. Use the claim command to cash out.",
        format_amount(pending, unit_scale, ticker)
    )
}

pub fn nothing_to_claim_message() -> String {
    "Nothing to claim.".to_string()
}

pub fn claim_paid_message(amount: u64, tx_ref: &str, unit_scale: u64, ticker: &str) -> String {
    format!(
        "Claimed {} (tx {tx_ref}).",
        format_amount(amount, unit_scale, ticker)
    )
}

pub fn claim_failed_message() -> String {
    "Claim transfer failed; your pending balance was restored. \
     Please try again or contact support."
        .to_string()
}
