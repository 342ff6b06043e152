//! The burn fee: the decaying price a bundler must beat with collected fees.
//!
//! Each block fixes a burn fee; from the moment the block lands, the price of
//! producing the next block decays linearly toward zero. Between blocks the
//! fee itself is readjusted toward a target block interval, so sustained fast
//! production raises the price and sustained slow production lowers it.

use {
    ember_types::{defs::MOTES_PER_EMBER, Currency},
    serde::{Deserialize, Serialize},
};

/// Tunables for burn-fee pricing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurnFeeConfig {
    /// Floor for the per-block burn fee, in motes.
    pub min_burn_fee: Currency,

    /// Ceiling for the per-block burn fee, in motes.
    pub max_burn_fee: Currency,

    /// How many motes the outstanding fee requirement loses per millisecond
    /// since the previous block.
    pub decay_rate_per_ms: Currency,

    /// The block spacing the readjustment steers toward, in ms.
    pub target_block_interval_ms: u64,

    /// Denominator bounding the per-block readjustment fraction. A value of
    /// 8 allows at most a 12.5 % move per block.
    pub adjustment_denominator: u64,
}

impl Default for BurnFeeConfig {
    fn default() -> Self {
        Self {
            min_burn_fee: MOTES_PER_EMBER / 50,       // 0.02 EMBER
            max_burn_fee: 100 * MOTES_PER_EMBER,      // hard ceiling
            decay_rate_per_ms: MOTES_PER_EMBER / 30_000, // full fee gone in ~30 s at 1 EMBER
            target_block_interval_ms: 30_000,
            adjustment_denominator: 8,
        }
    }
}

/// The fees a bundler still needs to beat `burn_fee` after `elapsed_ms`.
///
/// Linear decay, floored at zero; arithmetic widened to avoid overflow on
/// long idle gaps.
pub fn fees_needed(
    burn_fee: Currency,
    elapsed_ms: u64,
    decay_rate_per_ms: Currency,
) -> Currency {
    let decayed = (decay_rate_per_ms as u128)
        .saturating_mul(elapsed_ms as u128)
        .min(u64::MAX as u128) as u64;
    burn_fee.saturating_sub(decayed)
}

/// Derive the next block's burn fee from the current one and the observed
/// spacing.
///
/// ```text
/// if elapsed == target:  next = current
/// if elapsed <  target:  next = current + max(current * (target - elapsed) / target / denom, 1)
/// if elapsed >  target:  next = current - current * min(elapsed - target, target) / target / denom
/// ```
///
/// The result is clamped to `[min_burn_fee, max_burn_fee]`. The overshoot
/// when blocks run slow is capped at one full target interval so a long
/// outage moves the fee by at most one adjustment step.
pub fn next_burn_fee(current: Currency, elapsed_ms: u64, config: &BurnFeeConfig) -> Currency {
    let target = config.target_block_interval_ms;
    if target == 0 || config.adjustment_denominator == 0 {
        return clamp(current, config.min_burn_fee, config.max_burn_fee);
    }

    let next = if elapsed_ms == target {
        current
    } else if elapsed_ms < target {
        let deficit = target - elapsed_ms;
        let numerator = (current as u128).saturating_mul(deficit as u128);
        let denominator = (target as u128) * (config.adjustment_denominator as u128);
        let delta = (numerator / denominator).max(1).min(u64::MAX as u128) as u64;
        current.saturating_add(delta)
    } else {
        let excess = (elapsed_ms - target).min(target);
        let numerator = (current as u128).saturating_mul(excess as u128);
        let denominator = (target as u128) * (config.adjustment_denominator as u128);
        let delta = (numerator / denominator).min(u64::MAX as u128) as u64;
        current.saturating_sub(delta)
    };

    clamp(next, config.min_burn_fee, config.max_burn_fee)
}

#[inline]
fn clamp(value: Currency, min: Currency, max: Currency) -> Currency {
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}
