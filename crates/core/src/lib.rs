pub mod config;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod metrics;
pub mod source;

#[cfg(test)]
mod testing;

pub use domain::fact::{BrandId, BrandRef, PosId, PosRef, UniverseCount, VisitFact, VisitId};
pub use domain::scope::{DateWindow, ScopeFilter, ScopeParams, TerritoryScope};
pub use domain::territory::{TerritoryId, TerritoryLevel, TerritoryPath, TerritoryRef};
pub use engine::{EngineSettings, MetricsEngine};
pub use errors::{EngineError, InterfaceError, SourceError, ValidationError};
pub use metrics::{AggregationRow, MetricFamily};
pub use source::{FactQuery, FactSource, UniverseQuery};
