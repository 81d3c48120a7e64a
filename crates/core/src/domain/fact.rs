use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::territory::{TerritoryLevel, TerritoryPath, TerritoryRef};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BrandId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PosId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VisitId(pub i64);

impl fmt::Display for BrandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BrandRef {
    pub id: BrandId,
    pub name: String,
}

impl BrandRef {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self { id: BrandId(id), name: name.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PosRef {
    pub id: PosId,
    pub name: String,
}

/// One brand line of one field visit, flattened with its parent visit.
///
/// `presence_counter > 0` means the brand was physically on the shelf;
/// `stock_units` is counted in fardes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VisitFact {
    pub visit_id: VisitId,
    pub pos: PosRef,
    pub territory: TerritoryPath,
    pub brand: BrandRef,
    pub visited_on: NaiveDate,
    pub stock_units: f64,
    pub presence_counter: i64,
    pub sold_units: f64,
}

impl VisitFact {
    pub fn is_present(&self) -> bool {
        self.presence_counter > 0
    }

    pub fn territory_at(&self, level: TerritoryLevel) -> &TerritoryRef {
        self.territory.at(level)
    }
}

/// Registered outlets of one territory node, visited or not.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniverseCount {
    pub territory: TerritoryRef,
    pub pos_count: u64,
}
