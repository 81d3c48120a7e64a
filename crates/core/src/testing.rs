//! Fact builders shared by unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::fact::{BrandRef, PosId, PosRef, UniverseCount, VisitFact, VisitId};
use crate::domain::territory::{TerritoryLevel, TerritoryPath, TerritoryRef};
use crate::errors::SourceError;
use crate::source::{FactQuery, FactSource, UniverseQuery};

pub const BRAND_X: (i64, &str) = (1, "Xanto");
pub const BRAND_Y: (i64, &str) = (2, "Yela");
pub const BRAND_Z: (i64, &str) = (3, "Zenith");

pub const GOMBE: (i64, &str) = (101, "Gombe");
pub const LEMBA: (i64, &str) = (102, "Lemba");

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn path(commune: (i64, &str)) -> TerritoryPath {
    TerritoryPath {
        country: TerritoryRef::new(1, "RDC", TerritoryLevel::Country),
        province: TerritoryRef::new(2, "Kinshasa", TerritoryLevel::Province),
        area: TerritoryRef::new(3, "Funa", TerritoryLevel::Area),
        sub_area: TerritoryRef::new(4, "Funa Nord", TerritoryLevel::SubArea),
        commune: TerritoryRef::new(commune.0, commune.1, TerritoryLevel::Commune),
    }
}

/// A visit item recorded on 2024-03-10.
pub fn fact(
    visit: i64,
    pos: i64,
    commune: (i64, &str),
    brand: (i64, &str),
    stock_units: f64,
    presence_counter: i64,
    sold_units: f64,
) -> VisitFact {
    VisitFact {
        visit_id: VisitId(visit),
        pos: PosRef { id: PosId(pos), name: format!("Shop {pos:03}") },
        territory: path(commune),
        brand: BrandRef::new(brand.0, brand.1),
        visited_on: date(2024, 3, 10),
        stock_units,
        presence_counter,
        sold_units,
    }
}

pub fn on(mut fact: VisitFact, visited_on: NaiveDate) -> VisitFact {
    fact.visited_on = visited_on;
    fact
}

/// Serves a fixed fact list, filtered like a real store, and records how
/// often it was asked.
#[derive(Default)]
pub struct StaticSource {
    pub facts: Vec<VisitFact>,
    pub universe: HashMap<i64, u64>,
    pub fail_with: Option<String>,
    pub calls: Mutex<Vec<FactQuery>>,
}

impl StaticSource {
    pub fn new(facts: Vec<VisitFact>) -> Self {
        Self { facts, ..Self::default() }
    }

    pub fn with_universe(mut self, commune: i64, pos_count: u64) -> Self {
        self.universe.insert(commune, pos_count);
        self
    }

    pub fn failing(message: &str) -> Self {
        Self { fail_with: Some(message.to_string()), ..Self::default() }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or_default()
    }
}

#[async_trait]
impl FactSource for StaticSource {
    async fn visit_facts(&self, query: &FactQuery) -> Result<Vec<VisitFact>, SourceError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(query.clone());
        }
        if let Some(message) = &self.fail_with {
            return Err(SourceError::new(message.clone()));
        }
        Ok(self
            .facts
            .iter()
            .filter(|fact| query.territory.matches(&fact.territory))
            .filter(|fact| query.window.contains(fact.visited_on))
            .filter(|fact| query.brand.map_or(true, |brand| brand == fact.brand.id))
            .cloned()
            .collect())
    }

    async fn pos_universe(&self, query: &UniverseQuery) -> Result<Vec<UniverseCount>, SourceError> {
        if let Some(message) = &self.fail_with {
            return Err(SourceError::new(message.clone()));
        }
        // every commune in these fixtures shares the same ancestors
        let mut counts: Vec<UniverseCount> = Vec::new();
        for (commune, pos_count) in &self.universe {
            let territory_path = path((*commune, commune_name(*commune)));
            if !query.territory.matches(&territory_path) {
                continue;
            }
            let territory = territory_path.at(query.level).clone();
            match counts.iter_mut().find(|count| count.territory.id == territory.id) {
                Some(existing) => existing.pos_count += pos_count,
                None => counts.push(UniverseCount { territory, pos_count: *pos_count }),
            }
        }
        Ok(counts)
    }
}

fn commune_name(id: i64) -> &'static str {
    match id {
        id if id == GOMBE.0 => GOMBE.1,
        id if id == LEMBA.0 => LEMBA.1,
        _ => "Unknown",
    }
}
