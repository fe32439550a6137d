//! Three-reel spinner and outcome classification.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// The fixed 8-symbol alphabet. `Seven` is the designated rare symbol:
/// three of them is the jackpot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Symbol {
    Cherry,
    Lemon,
    Orange,
    Grape,
    Bell,
    Star,
    Diamond,
    Seven,
}

impl Symbol {
    pub const ALL: [Symbol; 8] = [
        Symbol::Cherry,
        Symbol::Lemon,
        Symbol::Orange,
        Symbol::Grape,
        Symbol::Bell,
        Symbol::Star,
        Symbol::Diamond,
        Symbol::Seven,
    ];

    /// The jackpot symbol.
    pub const RARE: Symbol = Symbol::Seven;

    /// Display glyph used in chat messages.
    pub fn glyph(self) -> &'static str {
        match self {
            Symbol::Cherry => "\u{1F352}",
            Symbol::Lemon => "\u{1F34B}",
            Symbol::Orange => "\u{1F34A}",
            Symbol::Grape => "\u{1F347}",
            Symbol::Bell => "\u{1F514}",
            Symbol::Star => "\u{2B50}",
            Symbol::Diamond => "\u{1F48E}",
            Symbol::Seven => "7\u{FE0F}\u{20E3}",
        }
    }
}

/// Payout tier of a spin, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    /// All three reels show the rare symbol.
    Jackpot,
    /// All three reels equal, any other symbol.
    Triple,
    /// Exactly two of the three reels equal, any pairing of positions.
    Pair,
    /// No two reels equal.
    Miss,
}

/// One spin: three symbols drawn independently with replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spin(pub [Symbol; 3]);

impl Spin {
    /// Draw a spin from the given RNG. Display/game entropy only; the
    /// RNG is injected so tests can seed it.
    pub fn draw<R: Rng + ?Sized>(rng: &mut R) -> Spin {
        let mut reels = [Symbol::Cherry; 3];
        for reel in reels.iter_mut() {
            *reel = Symbol::ALL[rng.gen_range(0..Symbol::ALL.len())];
        }
        Spin(reels)
    }

    /// Classify the spin. All three pairwise equalities are checked for
    /// the pair tier; a "first two equal" shortcut would misclassify
    /// draws like [A, B, A].
    pub fn tier(&self) -> Tier {
        let [a, b, c] = self.0;
        if a == b && b == c {
            if a == Symbol::RARE {
                Tier::Jackpot
            } else {
                Tier::Triple
            }
        } else if a == b || b == c || a == c {
            Tier::Pair
        } else {
            Tier::Miss
        }
    }
}
