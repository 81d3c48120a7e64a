//! Read-only access to visit facts.
//!
//! The engine never talks to a database directly; it is handed a
//! [`FactSource`] and issues exactly one round trip per sub-query.

use async_trait::async_trait;

use crate::domain::fact::{BrandId, UniverseCount, VisitFact};
use crate::domain::scope::{DateWindow, ScopeFilter, TerritoryScope};
use crate::domain::territory::TerritoryLevel;
use crate::errors::SourceError;

/// Filter for visit facts. Soft-deleted visits and items are never returned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FactQuery {
    pub territory: TerritoryScope,
    pub window: DateWindow,
    pub brand: Option<BrandId>,
}

impl FactQuery {
    /// All brands in the scope, regardless of any brand narrowing.
    pub fn market(scope: &ScopeFilter) -> Self {
        Self { territory: scope.territory.clone(), window: scope.window, brand: None }
    }

    pub fn brand(scope: &ScopeFilter, brand: BrandId) -> Self {
        Self { territory: scope.territory.clone(), window: scope.window, brand: Some(brand) }
    }
}

/// Registered outlets in a scope, counted per node of `level`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UniverseQuery {
    pub territory: TerritoryScope,
    pub level: TerritoryLevel,
}

#[async_trait]
pub trait FactSource: Send + Sync {
    async fn visit_facts(&self, query: &FactQuery) -> Result<Vec<VisitFact>, SourceError>;

    async fn pos_universe(&self, query: &UniverseQuery) -> Result<Vec<UniverseCount>, SourceError>;
}
