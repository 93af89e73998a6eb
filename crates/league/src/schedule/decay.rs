//! Price-decay strategies: which price each weekly tier carries.
//!
//! Tier `0` is the week the season starts and always carries the base price.
//! Higher tiers sit further before the season and carry larger discounts. A
//! strategy must be non-increasing in the tier index so prices never drop as
//! the season approaches.

use rust_decimal::Decimal;

use crate::Price;

/// Maps a tier index to the price charged from that tier's fire time onward.
pub trait PriceDecay: Send + Sync + std::fmt::Debug {
    /// Returns the price for `tier` given the season's base price.
    ///
    /// Implementations must return `base` for tier `0` and must be
    /// non-increasing in `tier`.
    fn price_for_tier(&self, tier: u32, base: Price) -> Price;
}

// ---------------------------------------------------------------------------

/// Fixed discount per tier, floored at a minimum fraction of the base price.
///
/// With `step = 0.10` and `floor = 0.50`, tiers 0..=6 are priced at
/// 100 %, 90 %, 80 %, 70 %, 60 %, 50 %, 50 % of base.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearDecay {
    step: Decimal,
    floor: Decimal,
}

impl LinearDecay {
    /// Creates a linear decay.
    ///
    /// Returns `None` unless `0 <= step <= 1` and `0 <= floor <= 1`.
    pub fn new(step: Decimal, floor: Decimal) -> Option<Self> {
        let unit = Decimal::ZERO..=Decimal::ONE;
        if unit.contains(&step) && unit.contains(&floor) {
            Some(Self { step, floor })
        } else {
            None
        }
    }

    /// Creates a linear decay from whole percentages (`10`, `50`).
    pub fn from_percentages(step_percent: u32, floor_percent: u32) -> Option<Self> {
        Self::new(
            Decimal::new(i64::from(step_percent), 2),
            Decimal::new(i64::from(floor_percent), 2),
        )
    }
}

impl Default for LinearDecay {
    fn default() -> Self {
        Self {
            step: Decimal::new(10, 2),
            floor: Decimal::new(50, 2),
        }
    }
}

impl PriceDecay for LinearDecay {
    fn price_for_tier(&self, tier: u32, base: Price) -> Price {
        if tier == 0 {
            return base;
        }
        let factor = (Decimal::ONE - self.step * Decimal::from(tier)).max(self.floor);
        base.scaled(factor)
    }
}

// ---------------------------------------------------------------------------

/// Explicit per-tier multipliers; tiers past the end of the table reuse the
/// last entry.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDecay {
    multipliers: Vec<Decimal>,
}

impl TableDecay {
    /// Creates a table decay.
    ///
    /// Returns `None` if the table is empty, does not start at exactly `1`,
    /// contains a value outside `[0, 1]`, or ever increases.
    pub fn new(multipliers: Vec<Decimal>) -> Option<Self> {
        let starts_at_base = multipliers.first() == Some(&Decimal::ONE);
        let in_range = multipliers
            .iter()
            .all(|m| (Decimal::ZERO..=Decimal::ONE).contains(m));
        let non_increasing = multipliers.windows(2).all(|w| w[1] <= w[0]);

        (starts_at_base && in_range && non_increasing).then_some(Self { multipliers })
    }
}

impl PriceDecay for TableDecay {
    fn price_for_tier(&self, tier: u32, base: Price) -> Price {
        if tier == 0 {
            return base;
        }
        let index = usize::try_from(tier)
            .unwrap_or(usize::MAX)
            .min(self.multipliers.len() - 1);
        base.scaled(self.multipliers[index])
    }
}
