//! Declarative definitions for every metric family.
//!
//! Numerator and denominator shapes live here and nowhere else; the
//! aggregation engine only interprets these descriptors.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::fact::VisitFact;
use crate::errors::ValidationError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricFamily {
    Nd,
    Oos,
    Wd,
    Ws,
    Sish,
    Sos,
    SishInShop,
}

impl MetricFamily {
    pub const ALL: [MetricFamily; 7] =
        [Self::Nd, Self::Oos, Self::Wd, Self::Ws, Self::Sish, Self::Sos, Self::SishInShop];

    pub fn definition(self) -> &'static MetricDefinition {
        &REGISTRY[self as usize]
    }

    pub fn key(self) -> &'static str {
        self.definition().key
    }
}

impl fmt::Display for MetricFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for MetricFamily {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|family| family.key() == normalized)
            .ok_or_else(|| ValidationError::UnknownMetric(value.trim().to_string()))
    }
}

/// Volume measured on a visit item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Measure {
    Stock,
    Sold,
}

impl Measure {
    pub fn of(self, fact: &VisitFact) -> f64 {
        match self {
            Self::Stock => fact.stock_units,
            Self::Sold => fact.sold_units,
        }
    }
}

/// Predicate on the brand's own item within a visit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemRule {
    Present,
    Absent,
    Sold,
}

impl ItemRule {
    pub fn matches(self, fact: &VisitFact) -> bool {
        match self {
            Self::Present => fact.presence_counter > 0,
            Self::Absent => fact.presence_counter == 0,
            Self::Sold => fact.sold_units > 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Numerator {
    /// Distinct visited POS where the brand's item satisfies `rule`.
    DistinctPos { rule: ItemRule },
    /// All-brand volume of the visits in which the brand's item satisfies `rule`.
    VisitVolume { measure: Measure, rule: ItemRule },
    /// The brand's own volume.
    BrandVolume { measure: Measure },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Denominator {
    /// Distinct visited POS in the group, any brand.
    VisitedPos,
    /// All-brand volume across every visit in the group.
    MarketVolume { measure: Measure },
    /// All-brand volume of the visits in which the brand's item satisfies `rule`.
    VisitVolume { measure: Measure, rule: ItemRule },
}

/// How a change between two periods is worded for a family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendWording {
    /// `up` / `down` / `stable`
    Directional,
    /// `gaining` / `losing` / `stable`
    Share,
}

/// Labelling applied by the ranking step.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum TierRule {
    /// Absolute percent bands, worst first: critical, high, medium, else low.
    Severity { critical: f64, high: f64, medium: f64 },
    /// Percentile rank within the ranked rows.
    Percentile,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetricDefinition {
    pub family: MetricFamily,
    pub key: &'static str,
    pub label: &'static str,
    pub numerator: Numerator,
    pub denominator: Denominator,
    /// Brand shares partition one pool and sum to ~100% within a group.
    pub exclusive_shares: bool,
    pub trend: TrendWording,
    pub tier: TierRule,
}

pub const OOS_SEVERITY: TierRule = TierRule::Severity { critical: 50.0, high: 30.0, medium: 15.0 };

// Indexed by `MetricFamily as usize`; keep the order of the enum.
static REGISTRY: [MetricDefinition; 7] = [
    MetricDefinition {
        family: MetricFamily::Nd,
        key: "nd",
        label: "Numeric Distribution",
        numerator: Numerator::DistinctPos { rule: ItemRule::Present },
        denominator: Denominator::VisitedPos,
        exclusive_shares: false,
        trend: TrendWording::Directional,
        tier: TierRule::Percentile,
    },
    MetricDefinition {
        family: MetricFamily::Oos,
        key: "oos",
        label: "Out of Stock",
        numerator: Numerator::DistinctPos { rule: ItemRule::Absent },
        denominator: Denominator::VisitedPos,
        exclusive_shares: false,
        trend: TrendWording::Directional,
        tier: OOS_SEVERITY,
    },
    MetricDefinition {
        family: MetricFamily::Wd,
        key: "wd",
        label: "Weighted Distribution",
        numerator: Numerator::VisitVolume { measure: Measure::Stock, rule: ItemRule::Present },
        denominator: Denominator::MarketVolume { measure: Measure::Stock },
        exclusive_shares: false,
        trend: TrendWording::Directional,
        tier: TierRule::Percentile,
    },
    MetricDefinition {
        family: MetricFamily::Ws,
        key: "ws",
        label: "Weighted Sales",
        numerator: Numerator::VisitVolume { measure: Measure::Sold, rule: ItemRule::Present },
        denominator: Denominator::MarketVolume { measure: Measure::Sold },
        exclusive_shares: false,
        trend: TrendWording::Directional,
        tier: TierRule::Percentile,
    },
    MetricDefinition {
        family: MetricFamily::Sish,
        key: "sish",
        label: "Share in Shop",
        numerator: Numerator::BrandVolume { measure: Measure::Sold },
        denominator: Denominator::MarketVolume { measure: Measure::Sold },
        exclusive_shares: true,
        trend: TrendWording::Share,
        tier: TierRule::Percentile,
    },
    MetricDefinition {
        family: MetricFamily::Sos,
        key: "sos",
        label: "Share of Stock",
        numerator: Numerator::BrandVolume { measure: Measure::Stock },
        denominator: Denominator::MarketVolume { measure: Measure::Stock },
        exclusive_shares: true,
        trend: TrendWording::Share,
        tier: TierRule::Percentile,
    },
    MetricDefinition {
        family: MetricFamily::SishInShop,
        key: "sish_in_shop",
        label: "Share in Shop (selling outlets)",
        numerator: Numerator::BrandVolume { measure: Measure::Sold },
        denominator: Denominator::VisitVolume { measure: Measure::Sold, rule: ItemRule::Sold },
        exclusive_shares: false,
        trend: TrendWording::Share,
        tier: TierRule::Percentile,
    },
];

#[cfg(test)]
mod tests {
    use super::{Denominator, MetricFamily, TierRule};
    use crate::errors::ValidationError;

    #[test]
    fn registry_order_matches_enum() {
        for family in MetricFamily::ALL {
            assert_eq!(family.definition().family, family);
        }
    }

    #[test]
    fn keys_round_trip_through_parsing() {
        for family in MetricFamily::ALL {
            assert_eq!(family.key().parse::<MetricFamily>(), Ok(family));
        }
        assert_eq!("SISH-in-shop".parse::<MetricFamily>(), Ok(MetricFamily::SishInShop));
        assert_eq!(
            "velocity".parse::<MetricFamily>(),
            Err(ValidationError::UnknownMetric("velocity".to_string()))
        );
    }

    #[test]
    fn only_share_families_use_one_exclusive_pool() {
        let exclusive: Vec<_> = MetricFamily::ALL
            .into_iter()
            .filter(|family| family.definition().exclusive_shares)
            .collect();
        assert_eq!(exclusive, vec![MetricFamily::Sish, MetricFamily::Sos]);

        for family in exclusive {
            assert!(matches!(family.definition().denominator, Denominator::MarketVolume { .. }));
        }
    }

    #[test]
    fn out_of_stock_is_ranked_by_severity() {
        assert!(matches!(MetricFamily::Oos.definition().tier, TierRule::Severity { .. }));
        assert_eq!(MetricFamily::Sish.definition().tier, TierRule::Percentile);
    }
}
