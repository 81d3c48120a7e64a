//! Market concentration: entropy, percentile tiers, cumulative share curves
//! and share-of-target gaps.

use serde::Serialize;

use crate::domain::fact::BrandRef;
use crate::metrics::aggregation::{compare_by_metric, percent, round_to, AggregationRow};
use crate::metrics::registry::MetricFamily;

pub const MARKET_LEADER_FROM: f64 = 0.66;
pub const CHALLENGER_FROM: f64 = 0.33;
/// Gaps smaller than this (in percentage points) count as on target.
pub const ON_TARGET_TOLERANCE: f64 = 0.5;

/// Shannon entropy in bits of the distribution described by `values`.
///
/// Values are normalised by their positive sum, so shares in percent and raw
/// volumes give the same result. Non-positive values are skipped.
pub fn shannon_entropy(values: &[f64]) -> f64 {
    let total: f64 = values.iter().copied().filter(|value| *value > 0.0).sum();
    if total <= 0.0 {
        return 0.0;
    }
    values
        .iter()
        .copied()
        .filter(|value| *value > 0.0)
        .map(|value| {
            let p = value / total;
            -p * p.log2()
        })
        .sum::<f64>()
        .max(0.0)
}

/// Entropy divided by its maximum `log2(n)`; 0 for fewer than two brands.
pub fn normalised_entropy(entropy: f64, brands: usize) -> f64 {
    if brands < 2 {
        return 0.0;
    }
    round_to(entropy / (brands as f64).log2(), 4)
}

/// Fractional rank in `[0, 1]` of every value, lowest value first.
///
/// Ties share the lowest rank. A single value ranks 1.0.
pub fn percentile_ranks(values: &[f64]) -> Vec<f64> {
    if values.len() == 1 {
        return vec![1.0];
    }
    let spread = (values.len().saturating_sub(1)) as f64;
    values
        .iter()
        .map(|value| {
            let below = values.iter().filter(|other| other.total_cmp(value).is_lt()).count();
            below as f64 / spread
        })
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketTier {
    MarketLeader,
    Challenger,
    Niche,
}

impl MarketTier {
    pub fn from_percentile(rank: f64) -> Self {
        if rank >= MARKET_LEADER_FROM {
            Self::MarketLeader
        } else if rank >= CHALLENGER_FROM {
            Self::Challenger
        } else {
            Self::Niche
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::MarketLeader => "market_leader",
            Self::Challenger => "challenger",
            Self::Niche => "niche",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CumulativeShare {
    pub brand: BrandRef,
    pub numerator: f64,
    pub share_percent: f64,
    pub cumulative_percent: f64,
}

/// Running share of the numerator total, largest brand first.
pub fn cumulative_share(rows: &[AggregationRow]) -> Vec<CumulativeShare> {
    let mut ordered: Vec<&AggregationRow> = rows.iter().collect();
    ordered.sort_by(|a, b| compare_by_metric(a, b));
    let total: f64 = ordered.iter().map(|row| row.numerator).sum();

    let mut running = 0.0;
    ordered
        .into_iter()
        .map(|row| {
            running += row.numerator;
            CumulativeShare {
                brand: row.brand.clone(),
                numerator: row.numerator,
                share_percent: percent(row.numerator, total),
                cumulative_percent: percent(running, total),
            }
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Concentration {
    pub metric: MetricFamily,
    pub brands: usize,
    pub entropy: f64,
    pub max_entropy: f64,
    pub normalised_entropy: f64,
    pub curve: Vec<CumulativeShare>,
}

/// Concentration of one scope-wide row set (one row per brand).
pub fn concentration(metric: MetricFamily, rows: &[AggregationRow]) -> Concentration {
    let curve = cumulative_share(rows);
    let volumes: Vec<f64> = curve.iter().map(|point| point.numerator).collect();
    let brands = volumes.iter().filter(|value| **value > 0.0).count();
    let entropy = round_to(shannon_entropy(&volumes), 4);
    Concentration {
        metric,
        brands,
        entropy,
        max_entropy: if brands > 0 { round_to((brands as f64).log2(), 4) } else { 0.0 },
        normalised_entropy: normalised_entropy(entropy, brands),
        curve,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    Above,
    OnTarget,
    Below,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SishGap {
    pub brand: BrandRef,
    pub sish_percent: f64,
    pub target: f64,
    pub gap: f64,
    pub status: TargetStatus,
}

/// Distance of each brand's share in shop to `target`, defaulting to an
/// equal split between the brands present.
pub fn sish_gaps(rows: &[AggregationRow], target: Option<f64>) -> Vec<SishGap> {
    if rows.is_empty() {
        return Vec::new();
    }
    let target = target.unwrap_or_else(|| round_to(100.0 / rows.len() as f64, 2));
    let mut ordered: Vec<&AggregationRow> = rows.iter().collect();
    ordered.sort_by(|a, b| compare_by_metric(a, b));
    ordered
        .into_iter()
        .map(|row| {
            let gap = round_to(row.percent - target, 2);
            let status = if gap.abs() < ON_TARGET_TOLERANCE {
                TargetStatus::OnTarget
            } else if gap > 0.0 {
                TargetStatus::Above
            } else {
                TargetStatus::Below
            };
            SishGap { brand: row.brand.clone(), sish_percent: row.percent, target, gap, status }
        })
        .collect()
}
