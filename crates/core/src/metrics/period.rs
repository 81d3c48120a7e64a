//! Merge a current-window and a previous-window aggregation into deltas.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::fact::{BrandId, BrandRef};
use crate::domain::scope::DateWindow;
use crate::metrics::aggregation::{round_to, AggregationRow};
use crate::metrics::registry::{MetricFamily, TrendWording};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Up,
    Down,
    Gaining,
    Losing,
    Stable,
}

impl Trend {
    /// Direction of an already rounded delta, so the trend never disagrees
    /// with the delta it is reported next to.
    pub fn of_delta(delta: f64, wording: TrendWording) -> Self {
        match (delta.total_cmp(&0.0), wording) {
            _ if delta == 0.0 => Self::Stable,
            (std::cmp::Ordering::Greater, TrendWording::Directional) => Self::Up,
            (std::cmp::Ordering::Greater, TrendWording::Share) => Self::Gaining,
            (_, TrendWording::Directional) => Self::Down,
            (_, TrendWording::Share) => Self::Losing,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EvolutionRow {
    pub brand: BrandRef,
    pub current_percent: f64,
    pub previous_percent: f64,
    pub delta: f64,
    pub trend: Trend,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Evolution {
    pub metric: MetricFamily,
    pub current_window: DateWindow,
    pub previous_window: DateWindow,
    pub rows: Vec<EvolutionRow>,
}

/// One row per brand seen in either window; a brand missing from one window
/// counts as 0% there.
///
/// Both inputs are expected at a single grouping node (one row per brand).
/// `delta` is taken from the unrounded ratios and rounded once.
pub fn compare_periods(
    metric: MetricFamily,
    current: &[AggregationRow],
    previous: &[AggregationRow],
) -> Vec<EvolutionRow> {
    let mut merged: BTreeMap<BrandId, (BrandRef, Option<&AggregationRow>, Option<&AggregationRow>)> =
        BTreeMap::new();
    for row in current {
        merged.entry(row.brand.id).or_insert_with(|| (row.brand.clone(), None, None)).1 = Some(row);
    }
    for row in previous {
        merged.entry(row.brand.id).or_insert_with(|| (row.brand.clone(), None, None)).2 = Some(row);
    }

    let wording = metric.definition().trend;
    let mut rows: Vec<EvolutionRow> = merged
        .into_values()
        .map(|(brand, current, previous)| {
            let current_ratio = current.map(AggregationRow::ratio).unwrap_or_default();
            let previous_ratio = previous.map(AggregationRow::ratio).unwrap_or_default();
            let delta = round_to((current_ratio - previous_ratio) * 100.0, 2);
            // -0.0 and 0.0 compare equal; emit the positive one
            let delta = if delta == 0.0 { 0.0 } else { delta };
            EvolutionRow {
                brand,
                current_percent: current.map(|row| row.percent).unwrap_or_default(),
                previous_percent: previous.map(|row| row.percent).unwrap_or_default(),
                delta,
                trend: Trend::of_delta(delta, wording),
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        b.current_percent
            .total_cmp(&a.current_percent)
            .then_with(|| a.brand.name.cmp(&b.brand.name))
            .then_with(|| a.brand.id.cmp(&b.brand.id))
    });
    rows
}
