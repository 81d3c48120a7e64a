//! Rank brand rows by metric value and attach tier or severity labels.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;
use crate::metrics::aggregation::{compare_by_metric, AggregationRow};
use crate::metrics::concentration::{percentile_ranks, MarketTier};
use crate::metrics::registry::{MetricFamily, TierRule};

/// Alert level of a percent that is bad when high, mildest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Bands are exclusive lower bounds: exactly 50% is `high`, not `critical`.
    pub fn classify(percent: f64, critical: f64, high: f64, medium: f64) -> Self {
        if percent > critical {
            Self::Critical
        } else if percent > high {
            Self::High
        } else if percent > medium {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(ValidationError::InvalidValue {
                field: "min_severity",
                value: other.to_string(),
                expected: "low|medium|high|critical",
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Tier {
    Severity(Severity),
    Market(MarketTier),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RankedRow {
    pub rank: usize,
    #[serde(flatten)]
    pub row: AggregationRow,
    pub percentile: f64,
    pub tier: Tier,
}

/// 1-based ranks after sorting by value descending, with the aggregation
/// tie-break. Tiers follow the family's [`TierRule`].
pub fn rank(rows: &[AggregationRow], metric: MetricFamily) -> Vec<RankedRow> {
    let mut ordered = rows.to_vec();
    ordered.sort_by(compare_by_metric);
    let values: Vec<f64> = ordered.iter().map(|row| row.percent).collect();
    let percentiles = percentile_ranks(&values);

    ordered
        .into_iter()
        .zip(percentiles)
        .enumerate()
        .map(|(position, (row, percentile))| {
            let tier = match metric.definition().tier {
                TierRule::Severity { critical, high, medium } => {
                    Tier::Severity(Severity::classify(row.percent, critical, high, medium))
                }
                TierRule::Percentile => Tier::Market(MarketTier::from_percentile(percentile)),
            };
            RankedRow { rank: position + 1, row, percentile, tier }
        })
        .collect()
}

/// Out-of-stock rows at or above `minimum`, keeping their overall rank.
pub fn oos_alerts(rows: &[AggregationRow], minimum: Severity) -> Vec<RankedRow> {
    rank(rows, MetricFamily::Oos)
        .into_iter()
        .filter(|ranked| match ranked.tier {
            Tier::Severity(severity) => severity >= minimum,
            Tier::Market(_) => false,
        })
        .collect()
}
