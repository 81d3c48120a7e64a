//! Group facts by (territory node, brand) and evaluate a metric definition.
//!
//! Every function here is pure: the same facts, level and family always give
//! the same rows in the same order.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::domain::fact::{BrandId, BrandRef, PosId, VisitFact, VisitId};
use crate::domain::territory::{TerritoryLevel, TerritoryRef};
use crate::metrics::registry::{
    Denominator, ItemRule, Measure, MetricDefinition, MetricFamily, Numerator,
};

/// Value emitted when a denominator is zero.
pub const UNDEFINED_PERCENT: f64 = 0.0;

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

pub fn safe_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// `numerator / denominator * 100`, rounded to two decimals, or
/// [`UNDEFINED_PERCENT`] when the denominator is not positive.
pub fn percent(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        round_to(numerator / denominator * 100.0, 2)
    } else {
        UNDEFINED_PERCENT
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AggregationRow {
    pub territory: TerritoryRef,
    pub brand: BrandRef,
    pub metric: MetricFamily,
    pub numerator: f64,
    pub denominator: f64,
    pub percent: f64,
    /// Distinct POS visited in the territory, any brand.
    pub visited_pos: u64,
    /// Visits recorded in the territory, any brand.
    pub visits: u64,
}

impl AggregationRow {
    /// Unrounded share in `[0, 1]`.
    pub fn ratio(&self) -> f64 {
        safe_ratio(self.numerator, self.denominator)
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct VisitTotals {
    stock: f64,
    sold: f64,
}

impl VisitTotals {
    fn get(&self, measure: Measure) -> f64 {
        match measure {
            Measure::Stock => self.stock,
            Measure::Sold => self.sold,
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct BrandTally {
    pub(crate) brand: BrandRef,
    present_pos: BTreeSet<PosId>,
    absent_pos: BTreeSet<PosId>,
    sold_pos: BTreeSet<PosId>,
    present_visits: BTreeSet<VisitId>,
    absent_visits: BTreeSet<VisitId>,
    sold_visits: BTreeSet<VisitId>,
    stock: f64,
    sold: f64,
}

impl BrandTally {
    fn new(brand: BrandRef) -> Self {
        Self {
            brand,
            present_pos: BTreeSet::new(),
            absent_pos: BTreeSet::new(),
            sold_pos: BTreeSet::new(),
            present_visits: BTreeSet::new(),
            absent_visits: BTreeSet::new(),
            sold_visits: BTreeSet::new(),
            stock: 0.0,
            sold: 0.0,
        }
    }

    fn add(&mut self, fact: &VisitFact) {
        self.stock += fact.stock_units;
        self.sold += fact.sold_units;
        for rule in [ItemRule::Present, ItemRule::Absent, ItemRule::Sold] {
            if rule.matches(fact) {
                self.pos_mut(rule).insert(fact.pos.id);
                self.visits_mut(rule).insert(fact.visit_id);
            }
        }
    }

    fn pos(&self, rule: ItemRule) -> &BTreeSet<PosId> {
        match rule {
            ItemRule::Present => &self.present_pos,
            ItemRule::Absent => &self.absent_pos,
            ItemRule::Sold => &self.sold_pos,
        }
    }

    fn pos_mut(&mut self, rule: ItemRule) -> &mut BTreeSet<PosId> {
        match rule {
            ItemRule::Present => &mut self.present_pos,
            ItemRule::Absent => &mut self.absent_pos,
            ItemRule::Sold => &mut self.sold_pos,
        }
    }

    fn visits(&self, rule: ItemRule) -> &BTreeSet<VisitId> {
        match rule {
            ItemRule::Present => &self.present_visits,
            ItemRule::Absent => &self.absent_visits,
            ItemRule::Sold => &self.sold_visits,
        }
    }

    fn visits_mut(&mut self, rule: ItemRule) -> &mut BTreeSet<VisitId> {
        match rule {
            ItemRule::Present => &mut self.present_visits,
            ItemRule::Absent => &mut self.absent_visits,
            ItemRule::Sold => &mut self.sold_visits,
        }
    }

    fn volume(&self, measure: Measure) -> f64 {
        match measure {
            Measure::Stock => self.stock,
            Measure::Sold => self.sold,
        }
    }
}

/// Running sums for one group of facts (a territory node or a period).
#[derive(Clone, Debug, Default)]
pub(crate) struct GroupTally {
    visited_pos: BTreeSet<PosId>,
    visits: BTreeMap<VisitId, VisitTotals>,
    stock: f64,
    sold: f64,
    brands: BTreeMap<BrandId, BrandTally>,
}

impl GroupTally {
    pub(crate) fn add(&mut self, fact: &VisitFact) {
        self.visited_pos.insert(fact.pos.id);
        let totals = self.visits.entry(fact.visit_id).or_default();
        totals.stock += fact.stock_units;
        totals.sold += fact.sold_units;
        self.stock += fact.stock_units;
        self.sold += fact.sold_units;
        self.brands
            .entry(fact.brand.id)
            .or_insert_with(|| BrandTally::new(fact.brand.clone()))
            .add(fact);
    }

    pub(crate) fn visited_pos(&self) -> u64 {
        self.visited_pos.len() as u64
    }

    pub(crate) fn visit_count(&self) -> u64 {
        self.visits.len() as u64
    }

    pub(crate) fn brands(&self) -> impl Iterator<Item = &BrandTally> {
        self.brands.values()
    }

    pub(crate) fn market_volume(&self, measure: Measure) -> f64 {
        match measure {
            Measure::Stock => self.stock,
            Measure::Sold => self.sold,
        }
    }

    fn visit_volume(&self, visits: &BTreeSet<VisitId>, measure: Measure) -> f64 {
        visits.iter().filter_map(|visit| self.visits.get(visit)).map(|totals| totals.get(measure)).sum()
    }

    /// Numerator and denominator of `definition` for one brand of this group.
    pub(crate) fn evaluate(&self, definition: &MetricDefinition, brand: &BrandTally) -> (f64, f64) {
        let numerator = match definition.numerator {
            Numerator::DistinctPos { rule } => brand.pos(rule).len() as f64,
            Numerator::VisitVolume { measure, rule } => {
                self.visit_volume(brand.visits(rule), measure)
            }
            Numerator::BrandVolume { measure } => brand.volume(measure),
        };
        let denominator = match definition.denominator {
            Denominator::VisitedPos => self.visited_pos.len() as f64,
            Denominator::MarketVolume { measure } => self.market_volume(measure),
            Denominator::VisitVolume { measure, rule } => {
                self.visit_volume(brand.visits(rule), measure)
            }
        };
        (numerator, denominator)
    }
}

/// Split facts into groups keyed by `key`, keeping one label per group.
pub(crate) fn tally_by<K, L, F>(facts: &[VisitFact], key: F) -> BTreeMap<K, (L, GroupTally)>
where
    K: Ord,
    F: Fn(&VisitFact) -> (K, L),
{
    let mut groups: BTreeMap<K, (L, GroupTally)> = BTreeMap::new();
    for fact in facts {
        let (group_key, label) = key(fact);
        groups.entry(group_key).or_insert_with(|| (label, GroupTally::default())).1.add(fact);
    }
    groups
}

/// One row per (territory node at `level`, brand) seen in `facts`.
///
/// `facts` must hold the whole market of the scope: denominators count every
/// brand. `brand` only narrows which rows are emitted.
pub fn aggregate_facts(
    facts: &[VisitFact],
    level: TerritoryLevel,
    family: MetricFamily,
    brand: Option<BrandId>,
) -> Vec<AggregationRow> {
    let definition = family.definition();
    let groups = tally_by(facts, |fact| {
        let territory = fact.territory_at(level);
        (territory.id, territory.clone())
    });

    let mut rows = Vec::new();
    for (territory, tally) in groups.into_values() {
        for brand_tally in tally.brands() {
            if brand.is_some_and(|wanted| wanted != brand_tally.brand.id) {
                continue;
            }
            let (numerator, denominator) = tally.evaluate(definition, brand_tally);
            rows.push(AggregationRow {
                territory: territory.clone(),
                brand: brand_tally.brand.clone(),
                metric: family,
                numerator,
                denominator,
                percent: percent(numerator, denominator),
                visited_pos: tally.visited_pos(),
                visits: tally.visit_count(),
            });
        }
    }

    sort_rows(&mut rows);
    rows
}

/// Metric value descending, then brand name, then brand id.
pub fn compare_by_metric(a: &AggregationRow, b: &AggregationRow) -> Ordering {
    b.percent
        .total_cmp(&a.percent)
        .then_with(|| a.brand.name.cmp(&b.brand.name))
        .then_with(|| a.brand.id.cmp(&b.brand.id))
}

/// Territory name ascending, then [`compare_by_metric`].
pub fn sort_rows(rows: &mut [AggregationRow]) {
    rows.sort_by(|a, b| {
        a.territory
            .name
            .cmp(&b.territory.name)
            .then_with(|| a.territory.id.cmp(&b.territory.id))
            .then_with(|| compare_by_metric(a, b))
    });
}

#[cfg(test)]
mod tests {
    use super::{aggregate_facts, percent, round_to, AggregationRow};
    use crate::domain::fact::BrandId;
    use crate::domain::territory::TerritoryLevel;
    use crate::metrics::registry::MetricFamily;
    use crate::testing::{fact, BRAND_X, BRAND_Y, BRAND_Z, GOMBE, LEMBA};

    fn only<'a>(rows: &'a [AggregationRow], brand: i64) -> &'a AggregationRow {
        rows.iter().find(|row| row.brand.id == BrandId(brand)).expect("brand row")
    }

    #[test]
    fn percent_uses_zero_for_empty_denominator() {
        assert_eq!(percent(5.0, 0.0), 0.0);
        assert_eq!(percent(0.0, 0.0), 0.0);
        assert_eq!(percent(1.0, 3.0), 33.33);
        assert_eq!(round_to(2.0 / 3.0, 3), 0.667);
    }

    #[test]
    fn numeric_distribution_counts_distinct_visited_pos() {
        // 10 visited POS, brand X present at 6 of them
        let mut facts = Vec::new();
        for pos in 1..=10 {
            let presence = if pos <= 6 { 2 } else { 0 };
            facts.push(fact(pos, pos, GOMBE, BRAND_X, 5.0, presence, 1.0));
            facts.push(fact(pos, pos, GOMBE, BRAND_Y, 5.0, 1, 1.0));
        }

        let rows = aggregate_facts(&facts, TerritoryLevel::Commune, MetricFamily::Nd, None);
        let x = only(&rows, BRAND_X.0);
        assert_eq!(x.numerator, 6.0);
        assert_eq!(x.denominator, 10.0);
        assert_eq!(x.percent, 60.0);
        assert_eq!(x.visited_pos, 10);

        let oos = aggregate_facts(&facts, TerritoryLevel::Commune, MetricFamily::Oos, None);
        assert_eq!(only(&oos, BRAND_X.0).percent, 40.0);
        assert_eq!(only(&oos, BRAND_Y.0).percent, 0.0);
    }

    #[test]
    fn repeated_visits_to_one_pos_count_once() {
        let facts = vec![
            fact(1, 1, GOMBE, BRAND_X, 1.0, 1, 0.0),
            fact(2, 1, GOMBE, BRAND_X, 1.0, 1, 0.0),
            fact(3, 2, GOMBE, BRAND_Y, 1.0, 1, 0.0),
        ];
        let rows = aggregate_facts(&facts, TerritoryLevel::Commune, MetricFamily::Nd, None);
        let x = only(&rows, BRAND_X.0);
        assert_eq!((x.numerator, x.denominator, x.percent), (1.0, 2.0, 50.0));
        assert_eq!(x.visits, 3);
    }

    #[test]
    fn weighted_distribution_uses_volume_of_visits_where_brand_is_present() {
        let facts = vec![
            // visit 1: X present, total visit stock 400
            fact(1, 1, GOMBE, BRAND_X, 100.0, 1, 0.0),
            fact(1, 1, GOMBE, BRAND_Y, 300.0, 1, 0.0),
            // visit 2: X absent, total visit stock 600
            fact(2, 2, GOMBE, BRAND_X, 0.0, 0, 0.0),
            fact(2, 2, GOMBE, BRAND_Y, 600.0, 1, 0.0),
        ];

        let rows = aggregate_facts(&facts, TerritoryLevel::Commune, MetricFamily::Wd, None);
        let x = only(&rows, BRAND_X.0);
        assert_eq!((x.numerator, x.denominator), (400.0, 1000.0));
        assert_eq!(x.percent, 40.0);
        assert_eq!(only(&rows, BRAND_Y.0).percent, 100.0);
    }

    #[test]
    fn weighted_sales_follows_sold_volume() {
        let facts = vec![
            fact(1, 1, GOMBE, BRAND_X, 1.0, 1, 30.0),
            fact(1, 1, GOMBE, BRAND_Y, 1.0, 1, 20.0),
            fact(2, 2, GOMBE, BRAND_Y, 1.0, 1, 50.0),
        ];
        let rows = aggregate_facts(&facts, TerritoryLevel::Commune, MetricFamily::Ws, None);
        assert_eq!(only(&rows, BRAND_X.0).percent, 50.0);
        assert_eq!(only(&rows, BRAND_Y.0).percent, 100.0);
    }

    #[test]
    fn share_families_sum_to_one_hundred_per_territory() {
        let facts = vec![
            fact(1, 1, GOMBE, BRAND_X, 10.0, 1, 7.0),
            fact(1, 1, GOMBE, BRAND_Y, 20.0, 1, 11.0),
            fact(2, 2, GOMBE, BRAND_Z, 13.0, 1, 5.0),
            fact(3, 3, LEMBA, BRAND_X, 3.0, 1, 3.0),
        ];
        for family in [MetricFamily::Sish, MetricFamily::Sos] {
            let rows = aggregate_facts(&facts, TerritoryLevel::Commune, family, None);
            let gombe: f64 =
                rows.iter().filter(|row| row.territory.name == GOMBE.1).map(|row| row.percent).sum();
            assert!((gombe - 100.0).abs() <= 0.02, "{family} shares summed to {gombe}");
            let lemba: Vec<_> = rows.iter().filter(|row| row.territory.name == LEMBA.1).collect();
            assert_eq!(lemba.len(), 1);
            assert_eq!(lemba[0].percent, 100.0);
        }
    }

    #[test]
    fn share_in_shop_only_counts_visits_where_the_brand_sold() {
        let facts = vec![
            fact(1, 1, GOMBE, BRAND_X, 1.0, 1, 10.0),
            fact(1, 1, GOMBE, BRAND_Y, 1.0, 1, 30.0),
            // X sold nothing here, so this visit is outside X's pool
            fact(2, 2, GOMBE, BRAND_X, 1.0, 1, 0.0),
            fact(2, 2, GOMBE, BRAND_Y, 1.0, 1, 60.0),
        ];
        let rows = aggregate_facts(&facts, TerritoryLevel::Commune, MetricFamily::SishInShop, None);
        let x = only(&rows, BRAND_X.0);
        assert_eq!((x.numerator, x.denominator, x.percent), (10.0, 40.0, 25.0));

        let sish = aggregate_facts(&facts, TerritoryLevel::Commune, MetricFamily::Sish, None);
        assert_eq!(only(&sish, BRAND_X.0).percent, 10.0);
    }

    #[test]
    fn zero_denominator_yields_zero_percent() {
        let facts = vec![
            fact(1, 1, GOMBE, BRAND_X, 0.0, 1, 0.0),
            fact(1, 1, GOMBE, BRAND_Y, 0.0, 0, 0.0),
        ];
        for family in MetricFamily::ALL {
            for row in aggregate_facts(&facts, TerritoryLevel::Commune, family, None) {
                assert!(row.percent.is_finite());
                assert!(row.percent >= 0.0);
                if row.denominator == 0.0 {
                    assert_eq!(row.percent, 0.0, "{family}");
                }
            }
        }
    }

    #[test]
    fn percents_stay_within_one_hundred() {
        let facts = vec![
            fact(1, 1, GOMBE, BRAND_X, 4.0, 1, 2.0),
            fact(1, 1, GOMBE, BRAND_Y, 9.0, 0, 1.0),
            fact(2, 2, LEMBA, BRAND_X, 0.5, 3, 0.0),
            fact(3, 2, LEMBA, BRAND_Z, 12.0, 1, 8.0),
        ];
        for family in MetricFamily::ALL {
            for level in [TerritoryLevel::Province, TerritoryLevel::Commune] {
                for row in aggregate_facts(&facts, level, family, None) {
                    assert!((0.0..=100.01).contains(&row.percent), "{family} {level}: {}", row.percent);
                }
            }
        }
    }

    #[test]
    fn rows_are_ordered_by_territory_then_value_then_brand_name() {
        let facts = vec![
            fact(1, 1, LEMBA, BRAND_Z, 1.0, 1, 0.0),
            fact(2, 2, GOMBE, BRAND_Y, 1.0, 1, 0.0),
            fact(2, 2, GOMBE, BRAND_X, 1.0, 1, 0.0),
            fact(3, 3, GOMBE, BRAND_Z, 1.0, 1, 0.0),
            fact(3, 3, GOMBE, BRAND_X, 1.0, 1, 0.0),
        ];
        let rows = aggregate_facts(&facts, TerritoryLevel::Commune, MetricFamily::Nd, None);
        let labels: Vec<_> =
            rows.iter().map(|row| (row.territory.name.as_str(), row.brand.name.as_str(), row.percent)).collect();

        assert_eq!(
            labels,
            vec![
                ("Gombe", "Xanto", 100.0),
                ("Gombe", "Yela", 50.0),
                ("Gombe", "Zenith", 50.0),
                ("Lemba", "Zenith", 100.0),
            ]
        );
    }

    #[test]
    fn brand_filter_narrows_rows_but_not_denominators() {
        let facts = vec![
            fact(1, 1, GOMBE, BRAND_X, 1.0, 1, 25.0),
            fact(1, 1, GOMBE, BRAND_Y, 1.0, 1, 75.0),
        ];
        let rows =
            aggregate_facts(&facts, TerritoryLevel::Commune, MetricFamily::Sish, Some(BrandId(BRAND_X.0)));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].denominator, 100.0);
        assert_eq!(rows[0].percent, 25.0);
    }

    #[test]
    fn aggregation_is_deterministic() {
        let facts = vec![
            fact(1, 1, GOMBE, BRAND_X, 1.3, 1, 0.7),
            fact(1, 1, GOMBE, BRAND_Y, 2.9, 0, 1.1),
            fact(2, 2, LEMBA, BRAND_Z, 0.4, 2, 3.3),
        ];
        for family in MetricFamily::ALL {
            let first = aggregate_facts(&facts, TerritoryLevel::Commune, family, None);
            let second = aggregate_facts(&facts, TerritoryLevel::Commune, family, None);
            assert_eq!(
                serde_json::to_string(&first).expect("serialize"),
                serde_json::to_string(&second).expect("serialize")
            );
        }
    }

    #[test]
    fn province_level_merges_communes() {
        let facts = vec![fact(1, 1, GOMBE, BRAND_X, 1.0, 1, 0.0), fact(2, 2, LEMBA, BRAND_Y, 1.0, 1, 0.0)];
        let rows = aggregate_facts(&facts, TerritoryLevel::Province, MetricFamily::Nd, None);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.territory.name == "Kinshasa" && row.percent == 50.0));
    }
}
