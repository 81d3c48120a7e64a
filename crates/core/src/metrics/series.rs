//! Monthly line-chart series computed from one fetch of the whole window.

use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::fact::{BrandId, BrandRef, VisitFact};
use crate::domain::scope::{month_start, DateWindow};
use crate::metrics::aggregation::{percent, tally_by};
use crate::metrics::ordered::OrderedIndex;
use crate::metrics::registry::MetricFamily;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub month: NaiveDate,
    pub numerator: f64,
    pub denominator: f64,
    pub percent: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BrandSeries {
    pub brand: BrandRef,
    pub points: Vec<SeriesPoint>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MonthlySeries {
    pub metric: MetricFamily,
    pub months: Vec<NaiveDate>,
    pub series: Vec<BrandSeries>,
}

/// Scope-wide metric per brand and calendar month of `window`.
///
/// Every series has one point per month in `months`; a month without facts
/// for a brand is 0. Brands appear by name.
pub fn monthly_series(
    facts: &[VisitFact],
    window: &DateWindow,
    family: MetricFamily,
    brand: Option<BrandId>,
) -> MonthlySeries {
    let definition = family.definition();
    let months = window.months();
    let groups = tally_by(facts, |fact| (month_start(fact.visited_on), ()));

    let mut names: Vec<BrandRef> = facts
        .iter()
        .filter(|fact| brand.map_or(true, |wanted| wanted == fact.brand.id))
        .map(|fact| fact.brand.clone())
        .collect();
    names.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
    let brands: OrderedIndex<BrandRef> = names.into_iter().collect();

    let mut series: Vec<BrandSeries> = brands
        .keys()
        .iter()
        .map(|brand| BrandSeries {
            brand: brand.clone(),
            points: months
                .iter()
                .map(|month| SeriesPoint { month: *month, numerator: 0.0, denominator: 0.0, percent: 0.0 })
                .collect(),
        })
        .collect();

    for (month_index, month) in months.iter().enumerate() {
        let Some((_, tally)) = groups.get(&Some(*month)) else { continue };
        for brand_tally in tally.brands() {
            let Some(position) = brands.get(&brand_tally.brand) else { continue };
            let (numerator, denominator) = tally.evaluate(definition, brand_tally);
            series[position].points[month_index] = SeriesPoint {
                month: *month,
                numerator,
                denominator,
                percent: percent(numerator, denominator),
            };
        }
    }

    MonthlySeries { metric: family, months, series }
}
