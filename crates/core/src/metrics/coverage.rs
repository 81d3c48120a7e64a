use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::fact::{UniverseCount, VisitFact};
use crate::domain::territory::{TerritoryLevel, TerritoryRef};
use crate::metrics::aggregation::{percent, tally_by, GroupTally};
use crate::metrics::registry::Measure;

/// Visited versus registered outlets for one territory node.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CoverageRow {
    pub territory: TerritoryRef,
    pub visits: u64,
    pub visited_pos: u64,
    pub universe_pos: u64,
    pub reach_rate: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScopeSummary {
    pub visits: u64,
    pub visited_pos: u64,
    pub universe_pos: u64,
    pub reach_rate: f64,
    pub brands_observed: u64,
    pub stock_units: f64,
    pub sold_units: f64,
}

/// Territories that were visited or hold registered outlets, by name.
pub fn coverage_rows(
    facts: &[VisitFact],
    universe: &[UniverseCount],
    level: TerritoryLevel,
) -> Vec<CoverageRow> {
    let mut rows = BTreeMap::new();
    let groups = tally_by(facts, |fact| {
        let territory = fact.territory_at(level);
        (territory.id, territory.clone())
    });
    for (id, (territory, tally)) in groups {
        rows.insert(
            id,
            CoverageRow {
                territory,
                visits: tally.visit_count(),
                visited_pos: tally.visited_pos(),
                universe_pos: 0,
                reach_rate: 0.0,
            },
        );
    }
    for count in universe {
        rows.entry(count.territory.id)
            .or_insert_with(|| CoverageRow {
                territory: count.territory.clone(),
                visits: 0,
                visited_pos: 0,
                universe_pos: 0,
                reach_rate: 0.0,
            })
            .universe_pos += count.pos_count;
    }

    let mut rows: Vec<CoverageRow> = rows
        .into_values()
        .map(|mut row| {
            row.reach_rate = percent(row.visited_pos as f64, row.universe_pos as f64);
            row
        })
        .collect();
    rows.sort_by(|a, b| {
        a.territory.name.cmp(&b.territory.name).then_with(|| a.territory.id.cmp(&b.territory.id))
    });
    rows
}

pub fn summarize(facts: &[VisitFact], universe_pos: u64) -> ScopeSummary {
    let mut tally = GroupTally::default();
    for fact in facts {
        tally.add(fact);
    }
    let visited_pos = tally.visited_pos();
    ScopeSummary {
        visits: tally.visit_count(),
        visited_pos,
        universe_pos,
        reach_rate: percent(visited_pos as f64, universe_pos as f64),
        brands_observed: tally.brands().count() as u64,
        stock_units: tally.market_volume(Measure::Stock),
        sold_units: tally.market_volume(Measure::Sold),
    }
}
