use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::fact::{BrandId, PosId, PosRef, VisitFact, VisitId};
use crate::domain::territory::TerritoryRef;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Present,
    Absent,
}

/// One brand at one visited outlet.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PosBreakdown {
    pub pos: PosRef,
    pub commune: TerritoryRef,
    pub visits: u64,
    pub present_visits: u64,
    pub last_visit: NaiveDate,
    pub last_status: PresenceStatus,
    pub stock_units: f64,
    pub sold_units: f64,
}

struct PosTally {
    pos: PosRef,
    commune: TerritoryRef,
    visits: BTreeSet<(NaiveDate, VisitId)>,
    present: BTreeSet<VisitId>,
    stock: f64,
    sold: f64,
}

/// Every outlet visited in `facts`, with the brand's record there, by POS name.
///
/// The last status reflects the most recent visit; a visit that did not
/// record the brand at all counts as absent.
pub fn pos_breakdown(facts: &[VisitFact], brand: BrandId) -> Vec<PosBreakdown> {
    let mut outlets: BTreeMap<PosId, PosTally> = BTreeMap::new();
    for fact in facts {
        let tally = outlets.entry(fact.pos.id).or_insert_with(|| PosTally {
            pos: fact.pos.clone(),
            commune: fact.territory.commune.clone(),
            visits: BTreeSet::new(),
            present: BTreeSet::new(),
            stock: 0.0,
            sold: 0.0,
        });
        tally.visits.insert((fact.visited_on, fact.visit_id));
        if fact.brand.id != brand {
            continue;
        }
        tally.stock += fact.stock_units;
        tally.sold += fact.sold_units;
        if fact.is_present() {
            tally.present.insert(fact.visit_id);
        }
    }

    let mut rows: Vec<PosBreakdown> = outlets
        .into_values()
        .filter_map(|tally| {
            let (last_visit, last_id) = tally.visits.last().copied()?;
            Some(PosBreakdown {
                last_status: if tally.present.contains(&last_id) {
                    PresenceStatus::Present
                } else {
                    PresenceStatus::Absent
                },
                pos: tally.pos,
                commune: tally.commune,
                visits: tally.visits.len() as u64,
                present_visits: tally.present.len() as u64,
                last_visit,
                stock_units: tally.stock,
                sold_units: tally.sold,
            })
        })
        .collect();
    rows.sort_by(|a, b| a.pos.name.cmp(&b.pos.name).then_with(|| a.pos.id.cmp(&b.pos.id)));
    rows
}
