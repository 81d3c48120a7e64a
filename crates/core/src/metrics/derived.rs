//! Indices derived from aggregation rows: velocity, gap funnels and
//! two-metric quadrants.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::fact::{BrandId, BrandRef};
use crate::domain::territory::{TerritoryId, TerritoryRef};
use crate::errors::ValidationError;
use crate::metrics::aggregation::{percent, round_to, safe_ratio, AggregationRow};
use crate::metrics::registry::MetricFamily;

pub const FAST_MOVER_ABOVE: f64 = 1.1;
pub const SLOW_MOVER_BELOW: f64 = 0.9;
pub const DEFAULT_QUADRANT_THRESHOLD: f64 = 50.0;

// ---------------------------------------------------------------------------
// Velocity
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VelocityCategory {
    FastMover,
    Aligned,
    SlowMover,
}

impl VelocityCategory {
    pub fn classify(index: f64) -> Self {
        if index > FAST_MOVER_ABOVE {
            Self::FastMover
        } else if index >= SLOW_MOVER_BELOW {
            Self::Aligned
        } else {
            Self::SlowMover
        }
    }
}

/// SISH% / SOS%, three decimals. A brand with no stock share has index 0.
pub fn velocity_index(sish_percent: f64, sos_percent: f64) -> f64 {
    round_to(safe_ratio(sish_percent, sos_percent), 3)
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VelocityRow {
    pub territory: TerritoryRef,
    pub brand: BrandRef,
    pub sish_percent: f64,
    pub sos_percent: f64,
    pub velocity_index: f64,
    pub category: VelocityCategory,
}

/// Joins SISH and SOS rows of the same scope on (territory, brand).
///
/// Output follows the order of `sish`; a brand with no SOS row counts as 0%.
pub fn velocity_rows(sish: &[AggregationRow], sos: &[AggregationRow]) -> Vec<VelocityRow> {
    let stock_share = by_cell(sos);
    sish.iter()
        .map(|row| {
            let sos_percent = stock_share.get(&cell(row)).copied().unwrap_or_default();
            let index = velocity_index(row.percent, sos_percent);
            VelocityRow {
                territory: row.territory.clone(),
                brand: row.brand.clone(),
                sish_percent: row.percent,
                sos_percent,
                velocity_index: index,
                category: VelocityCategory::classify(index),
            }
        })
        .collect()
}

fn cell(row: &AggregationRow) -> (TerritoryId, BrandId) {
    (row.territory.id, row.brand.id)
}

fn by_cell(rows: &[AggregationRow]) -> HashMap<(TerritoryId, BrandId), f64> {
    rows.iter().map(|row| (cell(row), row.percent)).collect()
}

// ---------------------------------------------------------------------------
// Gap funnel
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunnelVariant {
    Nd,
    Wd,
}

impl FunnelVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nd => "nd",
            Self::Wd => "wd",
        }
    }

    pub fn family(self) -> MetricFamily {
        match self {
            Self::Nd => MetricFamily::Nd,
            Self::Wd => MetricFamily::Wd,
        }
    }
}

impl fmt::Display for FunnelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FunnelVariant {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "nd" => Ok(Self::Nd),
            "wd" => Ok(Self::Wd),
            other => Err(ValidationError::InvalidValue {
                field: "variant",
                value: other.to_string(),
                expected: "nd or wd",
            }),
        }
    }
}

/// Universe split into zone A (present), zone B (visited, brand absent) and
/// zone C (never visited).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GapFunnel {
    pub variant: FunnelVariant,
    pub present: f64,
    pub visited_gap: f64,
    pub universe_gap: f64,
    pub universe: f64,
    pub opportunity_pct: f64,
}

pub fn nd_funnel(universe_pos: u64, visited_pos: u64, nd_pos: u64) -> GapFunnel {
    // the registered universe can lag behind visits; never report negative zones
    let visited_gap = visited_pos.saturating_sub(nd_pos) as f64;
    let universe_gap = universe_pos.saturating_sub(visited_pos) as f64;
    GapFunnel {
        variant: FunnelVariant::Nd,
        present: nd_pos as f64,
        visited_gap,
        universe_gap,
        universe: universe_pos as f64,
        opportunity_pct: percent(visited_gap + universe_gap, universe_pos as f64),
    }
}

/// Volume variant. Zone C is always 0: un-visited outlets have no recorded volume.
pub fn wd_funnel(present_volume: f64, visited_volume: f64) -> GapFunnel {
    let visited_gap = (visited_volume - present_volume).max(0.0);
    GapFunnel {
        variant: FunnelVariant::Wd,
        present: present_volume,
        visited_gap,
        universe_gap: 0.0,
        universe: visited_volume,
        opportunity_pct: percent(visited_gap, visited_volume),
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BrandFunnel {
    pub brand: BrandRef,
    #[serde(flatten)]
    pub funnel: GapFunnel,
}

// ---------------------------------------------------------------------------
// Quadrants
// ---------------------------------------------------------------------------

/// Primary metric plotted against numeric distribution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuadrantPair {
    WdNd,
    WsNd,
}

impl QuadrantPair {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WdNd => "wd_nd",
            Self::WsNd => "ws_nd",
        }
    }

    pub fn primary(self) -> MetricFamily {
        match self {
            Self::WdNd => MetricFamily::Wd,
            Self::WsNd => MetricFamily::Ws,
        }
    }

    pub fn companion(self) -> MetricFamily {
        MetricFamily::Nd
    }
}

impl fmt::Display for QuadrantPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuadrantPair {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "wd_nd" => Ok(Self::WdNd),
            "ws_nd" => Ok(Self::WsNd),
            other => Err(ValidationError::InvalidValue {
                field: "pair",
                value: other.to_string(),
                expected: "wd_nd or ws_nd",
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Quadrant {
    Leader,
    VolumeFocus,
    Spread,
    Laggard,
    Niche,
    Volume,
    Underperformer,
}

impl Quadrant {
    pub fn classify(pair: QuadrantPair, primary: f64, companion: f64, threshold: f64) -> Self {
        let strong_primary = primary >= threshold;
        let strong_companion = companion >= threshold;
        match (pair, strong_primary, strong_companion) {
            (_, true, true) => Self::Leader,
            (QuadrantPair::WdNd, true, false) => Self::VolumeFocus,
            (QuadrantPair::WdNd, false, true) => Self::Spread,
            (QuadrantPair::WdNd, false, false) => Self::Laggard,
            (QuadrantPair::WsNd, true, false) => Self::Niche,
            (QuadrantPair::WsNd, false, true) => Self::Volume,
            (QuadrantPair::WsNd, false, false) => Self::Underperformer,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QuadrantRow {
    pub territory: TerritoryRef,
    pub brand: BrandRef,
    pub primary_percent: f64,
    pub companion_percent: f64,
    pub quadrant: Quadrant,
}

/// Classifies each primary row against the companion row of the same cell.
pub fn quadrant_rows(
    pair: QuadrantPair,
    primary: &[AggregationRow],
    companion: &[AggregationRow],
    threshold: f64,
) -> Vec<QuadrantRow> {
    let companion = by_cell(companion);
    primary
        .iter()
        .map(|row| {
            let companion_percent = companion.get(&cell(row)).copied().unwrap_or_default();
            QuadrantRow {
                territory: row.territory.clone(),
                brand: row.brand.clone(),
                primary_percent: row.percent,
                companion_percent,
                quadrant: Quadrant::classify(pair, row.percent, companion_percent, threshold),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{
        nd_funnel, quadrant_rows, velocity_index, velocity_rows, wd_funnel, FunnelVariant, Quadrant,
        QuadrantPair, VelocityCategory, DEFAULT_QUADRANT_THRESHOLD,
    };
    use crate::domain::territory::TerritoryLevel;
    use crate::errors::ValidationError;
    use crate::metrics::aggregation::aggregate_facts;
    use crate::metrics::registry::MetricFamily;
    use crate::testing::{fact, BRAND_X, BRAND_Y, GOMBE};

    #[test]
    fn velocity_of_twice_the_stock_share_is_a_fast_mover() {
        let index = velocity_index(50.0, 25.0);
        assert_eq!(index, 2.0);
        assert_eq!(VelocityCategory::classify(index), VelocityCategory::FastMover);
    }

    #[test]
    fn velocity_bands_are_inclusive_around_one() {
        assert_eq!(VelocityCategory::classify(1.1), VelocityCategory::Aligned);
        assert_eq!(VelocityCategory::classify(0.9), VelocityCategory::Aligned);
        assert_eq!(VelocityCategory::classify(0.899), VelocityCategory::SlowMover);
        assert_eq!(VelocityCategory::classify(1.101), VelocityCategory::FastMover);
    }

    #[test]
    fn velocity_without_stock_share_is_zero() {
        assert_eq!(velocity_index(12.0, 0.0), 0.0);
        assert_eq!(VelocityCategory::classify(0.0), VelocityCategory::SlowMover);
    }

    #[test]
    fn velocity_rows_join_share_families_per_brand() {
        let facts = vec![
            fact(1, 1, GOMBE, BRAND_X, 25.0, 1, 50.0),
            fact(1, 1, GOMBE, BRAND_Y, 75.0, 1, 50.0),
        ];
        let sish = aggregate_facts(&facts, TerritoryLevel::Commune, MetricFamily::Sish, None);
        let sos = aggregate_facts(&facts, TerritoryLevel::Commune, MetricFamily::Sos, None);

        let rows = velocity_rows(&sish, &sos);
        let x = rows.iter().find(|row| row.brand.name == BRAND_X.1).expect("x row");
        assert_eq!((x.sish_percent, x.sos_percent, x.velocity_index), (50.0, 25.0, 2.0));
        assert_eq!(x.category, VelocityCategory::FastMover);
        let y = rows.iter().find(|row| row.brand.name == BRAND_Y.1).expect("y row");
        assert_eq!(y.velocity_index, 0.667);
        assert_eq!(y.category, VelocityCategory::SlowMover);
    }

    #[test]
    fn nd_funnel_splits_universe_into_three_zones() {
        let funnel = nd_funnel(100, 70, 20);
        assert_eq!(funnel.present, 20.0);
        assert_eq!(funnel.visited_gap, 50.0);
        assert_eq!(funnel.universe_gap, 30.0);
        assert_eq!(funnel.opportunity_pct, 80.0);
    }

    #[test]
    fn nd_funnel_tolerates_stale_universe() {
        let funnel = nd_funnel(5, 8, 2);
        assert_eq!(funnel.universe_gap, 0.0);
        assert_eq!(funnel.visited_gap, 6.0);
        assert_eq!(nd_funnel(0, 0, 0).opportunity_pct, 0.0);
    }

    #[test]
    fn wd_funnel_has_no_unvisited_zone() {
        let funnel = wd_funnel(400.0, 1000.0);
        assert_eq!(funnel.variant, FunnelVariant::Wd);
        assert_eq!(funnel.visited_gap, 600.0);
        assert_eq!(funnel.universe_gap, 0.0);
        assert_eq!(funnel.opportunity_pct, 60.0);
    }

    #[test]
    fn quadrant_labels_depend_on_pair() {
        let t = DEFAULT_QUADRANT_THRESHOLD;
        assert_eq!(Quadrant::classify(QuadrantPair::WdNd, 50.0, 50.0, t), Quadrant::Leader);
        assert_eq!(Quadrant::classify(QuadrantPair::WdNd, 70.0, 10.0, t), Quadrant::VolumeFocus);
        assert_eq!(Quadrant::classify(QuadrantPair::WdNd, 10.0, 70.0, t), Quadrant::Spread);
        assert_eq!(Quadrant::classify(QuadrantPair::WdNd, 10.0, 10.0, t), Quadrant::Laggard);
        assert_eq!(Quadrant::classify(QuadrantPair::WsNd, 70.0, 10.0, t), Quadrant::Niche);
        assert_eq!(Quadrant::classify(QuadrantPair::WsNd, 10.0, 70.0, t), Quadrant::Volume);
        assert_eq!(Quadrant::classify(QuadrantPair::WsNd, 10.0, 10.0, t), Quadrant::Underperformer);
        assert_eq!(Quadrant::classify(QuadrantPair::WsNd, 30.0, 30.0, 25.0), Quadrant::Leader);
    }

    #[test]
    fn quadrant_rows_use_both_metrics_of_the_same_brand() {
        let facts = vec![
            fact(1, 1, GOMBE, BRAND_X, 100.0, 1, 0.0),
            fact(1, 1, GOMBE, BRAND_Y, 300.0, 1, 0.0),
            fact(2, 2, GOMBE, BRAND_Y, 600.0, 1, 0.0),
        ];
        let wd = aggregate_facts(&facts, TerritoryLevel::Commune, MetricFamily::Wd, None);
        let nd = aggregate_facts(&facts, TerritoryLevel::Commune, MetricFamily::Nd, None);

        let rows = quadrant_rows(QuadrantPair::WdNd, &wd, &nd, 50.0);
        let x = rows.iter().find(|row| row.brand.name == BRAND_X.1).expect("x row");
        assert_eq!((x.primary_percent, x.companion_percent), (40.0, 50.0));
        assert_eq!(x.quadrant, Quadrant::Spread);
        let y = rows.iter().find(|row| row.brand.name == BRAND_Y.1).expect("y row");
        assert_eq!(y.quadrant, Quadrant::Leader);
    }

    #[test]
    fn pair_and_variant_parsing_rejects_unknown_values() {
        assert_eq!("WS-ND".parse::<QuadrantPair>(), Ok(QuadrantPair::WsNd));
        assert_eq!(QuadrantPair::WsNd.primary(), MetricFamily::Ws);
        assert!(matches!(
            "sos_nd".parse::<QuadrantPair>(),
            Err(ValidationError::InvalidValue { field: "pair", .. })
        ));
        assert_eq!("WD".parse::<FunnelVariant>(), Ok(FunnelVariant::Wd));
        assert!("oos".parse::<FunnelVariant>().is_err());
    }
}
