//! Per-game records and batch totals for one settlement batch.

use crate::reels::{Spin, Tier};

/// Result of a single resolved game. `pool_before` is the pool snapshot
/// the payout was computed from, kept so per-game messages show the
/// jackpot as it stood when that game resolved, not the post-batch pool.
#[derive(Debug, Clone, Copy)]
pub struct GameResult {
    pub spin: Spin,
    pub tier: Tier,
    pub pool_before: u64,
    pub gross: u64,
    pub fee: u64,
    pub net: u64,
}

/// Running totals across a batch. Aggregate values are exact sums of
/// the per-game values.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchTotals {
    pub games: u32,
    pub gross: u64,
    pub fee: u64,
    pub net: u64,
}

impl BatchTotals {
    pub fn record(&mut self, game: &GameResult) {
        self.games += 1;
        self.gross += game.gross;
        self.fee += game.fee;
        self.net += game.net;
    }
}
