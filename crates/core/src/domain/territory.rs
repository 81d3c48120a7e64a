use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TerritoryId(pub i64);

impl fmt::Display for TerritoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Levels of the geographic tree, coarsest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerritoryLevel {
    Country,
    Province,
    Area,
    SubArea,
    Commune,
}

impl TerritoryLevel {
    pub const ALL: [TerritoryLevel; 5] =
        [Self::Country, Self::Province, Self::Area, Self::SubArea, Self::Commune];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Country => "country",
            Self::Province => "province",
            Self::Area => "area",
            Self::SubArea => "sub_area",
            Self::Commune => "commune",
        }
    }

    /// Name of the query parameter that pins a scope to one node of this level.
    pub fn scope_param(self) -> &'static str {
        match self {
            Self::Country => "country_id",
            Self::Province => "province_id",
            Self::Area => "area_id",
            Self::SubArea => "sub_area_id",
            Self::Commune => "commune_id",
        }
    }

    pub fn parent(self) -> Option<TerritoryLevel> {
        match self {
            Self::Country => None,
            Self::Province => Some(Self::Country),
            Self::Area => Some(Self::Province),
            Self::SubArea => Some(Self::Area),
            Self::Commune => Some(Self::SubArea),
        }
    }
}

impl fmt::Display for TerritoryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses the grouping levels a dashboard may request. `country` is not a
/// grouping level: a scope always sits inside exactly one country.
impl FromStr for TerritoryLevel {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "province" => Ok(Self::Province),
            "area" => Ok(Self::Area),
            "subarea" | "sub_area" | "sub-area" => Ok(Self::SubArea),
            "commune" => Ok(Self::Commune),
            other => Err(ValidationError::UnknownLevel(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TerritoryRef {
    pub id: TerritoryId,
    pub name: String,
    pub level: TerritoryLevel,
}

impl TerritoryRef {
    pub fn new(id: i64, name: impl Into<String>, level: TerritoryLevel) -> Self {
        Self { id: TerritoryId(id), name: name.into(), level }
    }
}

/// Denormalized copy of the territory chain a visit was recorded in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerritoryPath {
    pub country: TerritoryRef,
    pub province: TerritoryRef,
    pub area: TerritoryRef,
    pub sub_area: TerritoryRef,
    pub commune: TerritoryRef,
}

impl TerritoryPath {
    pub fn at(&self, level: TerritoryLevel) -> &TerritoryRef {
        match level {
            TerritoryLevel::Country => &self.country,
            TerritoryLevel::Province => &self.province,
            TerritoryLevel::Area => &self.area,
            TerritoryLevel::SubArea => &self.sub_area,
            TerritoryLevel::Commune => &self.commune,
        }
    }
}
