use std::fmt;

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::domain::fact::BrandId;
use crate::domain::territory::{TerritoryId, TerritoryLevel, TerritoryPath};
use crate::errors::ValidationError;
use crate::metrics::ranking::Severity;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Inclusive calendar window `[start, end]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError::InvertedWindow { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn length_days(&self) -> u64 {
        // start <= end is enforced by `new`
        (self.end - self.start).num_days().unsigned_abs() + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// The window of identical length that ends the day before `start`.
    pub fn previous(&self) -> Result<Self, ValidationError> {
        let out_of_range = || ValidationError::InvalidValue {
            field: "start_date",
            value: self.start.format(DATE_FORMAT).to_string(),
            expected: "a date with a representable preceding window",
        };
        let previous_end = self.start.checked_sub_days(Days::new(1)).ok_or_else(out_of_range)?;
        let previous_start = previous_end
            .checked_sub_days(Days::new(self.length_days() - 1))
            .ok_or_else(out_of_range)?;
        Ok(Self { start: previous_start, end: previous_end })
    }

    /// First day of every calendar month the window touches, in order.
    pub fn months(&self) -> Vec<NaiveDate> {
        let mut months = Vec::new();
        let mut cursor = month_start(self.start);
        let last = month_start(self.end);
        while let Some(month) = cursor {
            if Some(month) > last {
                break;
            }
            months.push(month);
            cursor = month.checked_add_months(chrono::Months::new(1));
        }
        months
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start.format(DATE_FORMAT), self.end.format(DATE_FORMAT))
    }
}

pub fn month_start(date: NaiveDate) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
}

/// Cascading geographic scope. Each narrower id is only meaningful when
/// every coarser id is set too.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TerritoryScope {
    pub country: TerritoryId,
    pub province: Option<TerritoryId>,
    pub area: Option<TerritoryId>,
    pub sub_area: Option<TerritoryId>,
    pub commune: Option<TerritoryId>,
}

impl TerritoryScope {
    pub fn country(id: i64) -> Self {
        Self { country: TerritoryId(id), province: None, area: None, sub_area: None, commune: None }
    }

    pub fn id_at(&self, level: TerritoryLevel) -> Option<TerritoryId> {
        match level {
            TerritoryLevel::Country => Some(self.country),
            TerritoryLevel::Province => self.province,
            TerritoryLevel::Area => self.area,
            TerritoryLevel::SubArea => self.sub_area,
            TerritoryLevel::Commune => self.commune,
        }
    }

    /// Deepest level pinned by this scope.
    pub fn narrowest_level(&self) -> TerritoryLevel {
        TerritoryLevel::ALL
            .into_iter()
            .rev()
            .find(|level| self.id_at(*level).is_some())
            .unwrap_or(TerritoryLevel::Country)
    }

    pub fn matches(&self, path: &TerritoryPath) -> bool {
        TerritoryLevel::ALL.into_iter().all(|level| match self.id_at(level) {
            Some(id) => path.at(level).id == id,
            None => true,
        })
    }
}

impl fmt::Display for TerritoryScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for level in TerritoryLevel::ALL {
            if let Some(id) = self.id_at(level) {
                if !first {
                    f.write_str(" ")?;
                }
                write!(f, "{}={}", level.as_str(), id)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Validated request scope. Only obtainable through [`ScopeParams::scope`]
/// or [`ScopeFilter::new`], so a value of this type never lacks the country
/// or the date window.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeFilter {
    pub territory: TerritoryScope,
    pub window: DateWindow,
    pub brand: Option<BrandId>,
}

impl ScopeFilter {
    pub fn new(territory: TerritoryScope, window: DateWindow) -> Self {
        Self { territory, window, brand: None }
    }

    pub fn with_brand(mut self, brand: BrandId) -> Self {
        self.brand = Some(brand);
        self
    }

    pub fn with_window(&self, window: DateWindow) -> Self {
        Self { territory: self.territory.clone(), window, brand: self.brand }
    }

    pub fn require_brand(&self) -> Result<BrandId, ValidationError> {
        self.brand.ok_or(ValidationError::MissingField("brand_id"))
    }
}

impl fmt::Display for ScopeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} window={}", self.territory, self.window)?;
        if let Some(brand) = self.brand {
            write!(f, " brand={brand}")?;
        }
        Ok(())
    }
}

/// Raw dashboard query parameters as they arrive from a client.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ScopeParams {
    pub country_id: Option<String>,
    pub province_id: Option<String>,
    pub area_id: Option<String>,
    pub sub_area_id: Option<String>,
    pub commune_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub brand_id: Option<String>,
    pub level: Option<String>,
    pub threshold: Option<String>,
    pub target: Option<String>,
    pub min_severity: Option<String>,
}

impl ScopeParams {
    pub fn scope(&self) -> Result<ScopeFilter, ValidationError> {
        let country = parse_id("country_id", self.country_id.as_deref())?
            .ok_or(ValidationError::MissingField("country_id"))?;
        let start = parse_date("start_date", self.start_date.as_deref())?;
        let end = parse_date("end_date", self.end_date.as_deref())?;

        let province = parse_id("province_id", self.province_id.as_deref())?;
        let area = parse_id("area_id", self.area_id.as_deref())?;
        let sub_area = parse_id("sub_area_id", self.sub_area_id.as_deref())?;
        let commune = parse_id("commune_id", self.commune_id.as_deref())?;

        let territory = TerritoryScope {
            country: TerritoryId(country),
            province: province.map(TerritoryId),
            area: area.map(TerritoryId),
            sub_area: sub_area.map(TerritoryId),
            commune: commune.map(TerritoryId),
        };
        for level in TerritoryLevel::ALL {
            let Some(parent) = level.parent() else { continue };
            if territory.id_at(level).is_some() && territory.id_at(parent).is_none() {
                return Err(ValidationError::MissingParent {
                    field: level.scope_param(),
                    parent: parent.scope_param(),
                });
            }
        }

        let window = DateWindow::new(start, end)?;
        let brand = parse_id("brand_id", self.brand_id.as_deref())?.map(BrandId);

        Ok(ScopeFilter { territory, window, brand })
    }

    pub fn level_or(&self, default: TerritoryLevel) -> Result<TerritoryLevel, ValidationError> {
        match non_empty(self.level.as_deref()) {
            Some(raw) => raw.parse(),
            None => Ok(default),
        }
    }

    pub fn threshold_or(&self, default: f64) -> Result<f64, ValidationError> {
        Ok(parse_percent("threshold", self.threshold.as_deref())?.unwrap_or(default))
    }

    pub fn target(&self) -> Result<Option<f64>, ValidationError> {
        parse_percent("target", self.target.as_deref())
    }

    pub fn min_severity_or(&self, default: Severity) -> Result<Severity, ValidationError> {
        match non_empty(self.min_severity.as_deref()) {
            Some(raw) => raw.parse(),
            None => Ok(default),
        }
    }
}

fn non_empty(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|value| !value.is_empty())
}

fn parse_id(field: &'static str, raw: Option<&str>) -> Result<Option<i64>, ValidationError> {
    non_empty(raw)
        .map(|value| {
            value.parse::<i64>().map_err(|_| ValidationError::InvalidValue {
                field,
                value: value.to_string(),
                expected: "an integer id",
            })
        })
        .transpose()
}

fn parse_date(field: &'static str, raw: Option<&str>) -> Result<NaiveDate, ValidationError> {
    let value = non_empty(raw).ok_or(ValidationError::MissingField(field))?;
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| ValidationError::InvalidValue {
        field,
        value: value.to_string(),
        expected: "a YYYY-MM-DD date",
    })
}

fn parse_percent(field: &'static str, raw: Option<&str>) -> Result<Option<f64>, ValidationError> {
    let Some(value) = non_empty(raw) else { return Ok(None) };
    match value.parse::<f64>() {
        Ok(parsed) if parsed.is_finite() && (0.0..=100.0).contains(&parsed) => Ok(Some(parsed)),
        _ => Err(ValidationError::InvalidValue {
            field,
            value: value.to_string(),
            expected: "a number between 0 and 100",
        }),
    }
}
