//! Tiered fee schedule mapping a gross charge amount to the processor and
//! platform cuts.
//!
//! The bands are product policy, held as data so the table can change without
//! touching call sites. Amounts are in the platform base currency; percentage
//! cuts round to 2 decimals before use.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy)]
enum FeeRule {
    /// Rate applied to the gross amount.
    Percent(Decimal),
    /// Rate applied to the gross amount plus a fixed surcharge.
    PercentPlus(Decimal, Decimal),
    Flat(Decimal),
}

#[derive(Debug, Clone, Copy)]
struct FeeBand {
    /// Inclusive upper bound of the band; `None` for the open-ended top band.
    upper: Option<Decimal>,
    processor: FeeRule,
    platform: FeeRule,
}

/// Fixed surcharge added to the processor percentage in the second band.
const PROCESSOR_SURCHARGE: u32 = 100;

fn bands() -> &'static [FeeBand] {
    static BANDS: OnceLock<Vec<FeeBand>> = OnceLock::new();
    BANDS.get_or_init(|| {
        let pct_1_5 = Decimal::new(15, 3);
        let pct_2_0 = Decimal::new(2, 2);
        let surcharge = Decimal::from(PROCESSOR_SURCHARGE);
        vec![
            FeeBand {
                upper: Some(Decimal::from(2_499u32)),
                processor: FeeRule::Percent(pct_1_5),
                platform: FeeRule::Percent(pct_2_0),
            },
            FeeBand {
                upper: Some(Decimal::from(126_666u32)),
                processor: FeeRule::PercentPlus(pct_1_5, surcharge),
                platform: FeeRule::Percent(pct_2_0),
            },
            FeeBand {
                upper: Some(Decimal::from(399_999u32)),
                processor: FeeRule::Flat(Decimal::from(2_000u32)),
                platform: FeeRule::Flat(Decimal::from(2_000u32)),
            },
            FeeBand {
                upper: Some(Decimal::from(599_999u32)),
                processor: FeeRule::Flat(Decimal::from(2_000u32)),
                platform: FeeRule::Flat(Decimal::from(3_000u32)),
            },
            FeeBand {
                upper: Some(Decimal::from(1_999_999u32)),
                processor: FeeRule::Flat(Decimal::from(2_000u32)),
                platform: FeeRule::Flat(Decimal::from(4_000u32)),
            },
            FeeBand {
                upper: Some(Decimal::from(4_999_999u32)),
                processor: FeeRule::Flat(Decimal::from(2_000u32)),
                platform: FeeRule::Flat(Decimal::from(5_500u32)),
            },
            FeeBand {
                upper: Some(Decimal::from(7_999_999u32)),
                processor: FeeRule::Flat(Decimal::from(2_000u32)),
                platform: FeeRule::Flat(Decimal::from(8_000u32)),
            },
            FeeBand {
                upper: None,
                processor: FeeRule::Flat(Decimal::from(2_000u32)),
                platform: FeeRule::Flat(Decimal::from(10_000u32)),
            },
        ]
    })
}

/// Processor and platform cuts for one gross charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeeBreakdown {
    pub processor_fee: Decimal,
    pub platform_fee: Decimal,
}

impl FeeBreakdown {
    pub const ZERO: FeeBreakdown = FeeBreakdown {
        processor_fee: Decimal::ZERO,
        platform_fee: Decimal::ZERO,
    };

    pub fn total(&self) -> Decimal {
        self.processor_fee + self.platform_fee
    }
}

fn apply(rule: FeeRule, gross: Decimal) -> Decimal {
    match rule {
        FeeRule::Percent(rate) => round_subunit(gross * rate),
        FeeRule::PercentPlus(rate, surcharge) => round_subunit(gross * rate) + surcharge,
        FeeRule::Flat(fee) => fee,
    }
}

fn round_subunit(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Computes the fee breakdown for a gross charge amount.
///
/// Malformed amounts (non-positive, or out of `Decimal` range upstream)
/// contribute zero fees rather than erroring, so callers aggregating over
/// many transactions can skip a bad record instead of aborting.
pub fn compute_fees(gross: Decimal) -> FeeBreakdown {
    if gross <= Decimal::ZERO {
        return FeeBreakdown::ZERO;
    }
    let Some(band) = bands()
        .iter()
        .find(|band| band.upper.map_or(true, |upper| gross <= upper))
    else {
        return FeeBreakdown::ZERO;
    };
    FeeBreakdown {
        processor_fee: apply(band.processor, gross),
        platform_fee: apply(band.platform, gross),
    }
}
