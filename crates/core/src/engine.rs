//! Request-scoped entry point over a [`FactSource`].
//!
//! Every operation validates what it needs, fetches the market facts of the
//! scope in one round trip (two for period comparison, run concurrently) and
//! hands them to the pure functions under [`crate::metrics`]. The engine keeps
//! no state between calls.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::domain::fact::{UniverseCount, VisitFact};
use crate::domain::scope::ScopeFilter;
use crate::domain::territory::TerritoryLevel;
use crate::errors::{EngineError, SourceError};
use crate::metrics::aggregation::{aggregate_facts, AggregationRow};
use crate::metrics::concentration::{concentration, sish_gaps, Concentration, SishGap};
use crate::metrics::coverage::{coverage_rows, summarize, CoverageRow, ScopeSummary};
use crate::metrics::derived::{
    nd_funnel, quadrant_rows, velocity_rows, wd_funnel, BrandFunnel, FunnelVariant, QuadrantPair,
    QuadrantRow, VelocityRow, DEFAULT_QUADRANT_THRESHOLD,
};
use crate::metrics::drilldown::{pos_breakdown, PosBreakdown};
use crate::metrics::period::{compare_periods, Evolution};
use crate::metrics::pivot::{pivot, Heatmap, HeatmapCell};
use crate::metrics::ranking::{oos_alerts, rank, RankedRow, Severity};
use crate::metrics::registry::MetricFamily;
use crate::metrics::series::{monthly_series, MonthlySeries};
use crate::source::{FactQuery, FactSource, UniverseQuery};

#[derive(Clone, Debug, PartialEq)]
pub struct EngineSettings {
    pub source_timeout: Duration,
    pub quadrant_threshold: f64,
    pub default_level: TerritoryLevel,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            source_timeout: Duration::from_secs(30),
            quadrant_threshold: DEFAULT_QUADRANT_THRESHOLD,
            default_level: TerritoryLevel::Province,
        }
    }
}

#[derive(Clone)]
pub struct MetricsEngine {
    source: Arc<dyn FactSource>,
    settings: EngineSettings,
}

impl MetricsEngine {
    pub fn new(source: Arc<dyn FactSource>) -> Self {
        Self::with_settings(source, EngineSettings::default())
    }

    pub fn with_settings(source: Arc<dyn FactSource>, settings: EngineSettings) -> Self {
        Self { source, settings }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    // -----------------------------------------------------------------------
    // Fact Source access
    // -----------------------------------------------------------------------

    async fn fetch<T, F>(
        &self,
        operation: &'static str,
        scope: &ScopeFilter,
        request: F,
    ) -> Result<T, EngineError>
    where
        F: Future<Output = Result<T, SourceError>>,
    {
        let outcome = match tokio::time::timeout(self.settings.source_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::new(format!(
                "fact source did not answer within {}s",
                self.settings.source_timeout.as_secs_f64()
            ))),
        };
        outcome.map_err(|source| {
            warn!(
                event_name = "metrics.source.failed",
                operation,
                scope = %scope,
                error = %source,
                "fact source query failed"
            );
            EngineError::Source { operation, scope: scope.to_string(), source }
        })
    }

    /// Every brand's facts in the scope; brand narrowing happens afterwards.
    async fn market_facts(&self, scope: &ScopeFilter) -> Result<Vec<VisitFact>, EngineError> {
        let query = FactQuery::market(scope);
        self.fetch("visit_facts", scope, self.source.visit_facts(&query)).await
    }

    async fn universe(
        &self,
        scope: &ScopeFilter,
        level: TerritoryLevel,
    ) -> Result<Vec<UniverseCount>, EngineError> {
        let query = UniverseQuery { territory: scope.territory.clone(), level };
        self.fetch("pos_universe", scope, self.source.pos_universe(&query)).await
    }

    // -----------------------------------------------------------------------
    // Aggregation
    // -----------------------------------------------------------------------

    /// One row per (territory node at `level`, brand).
    pub async fn aggregate(
        &self,
        scope: &ScopeFilter,
        level: TerritoryLevel,
        metric: MetricFamily,
    ) -> Result<Vec<AggregationRow>, EngineError> {
        let started = Instant::now();
        let facts = self.market_facts(scope).await?;
        let rows = aggregate_facts(&facts, level, metric, scope.brand);
        completed("aggregate", scope, metric.key(), rows.len(), started);
        Ok(rows)
    }

    /// One row per brand over the whole scope, labelled with the narrowest
    /// territory the scope pins.
    pub async fn aggregate_scope(
        &self,
        scope: &ScopeFilter,
        metric: MetricFamily,
    ) -> Result<Vec<AggregationRow>, EngineError> {
        self.aggregate(scope, scope.territory.narrowest_level(), metric).await
    }

    pub async fn coverage(
        &self,
        scope: &ScopeFilter,
        level: TerritoryLevel,
    ) -> Result<Vec<CoverageRow>, EngineError> {
        let started = Instant::now();
        let (facts, universe) = tokio::try_join!(self.market_facts(scope), self.universe(scope, level))?;
        let rows = coverage_rows(&facts, &universe, level);
        completed("coverage", scope, "coverage", rows.len(), started);
        Ok(rows)
    }

    pub async fn summary(&self, scope: &ScopeFilter) -> Result<ScopeSummary, EngineError> {
        let started = Instant::now();
        let level = scope.territory.narrowest_level();
        let (facts, universe) = tokio::try_join!(self.market_facts(scope), self.universe(scope, level))?;
        let summary = summarize(&facts, universe.iter().map(|count| count.pos_count).sum());
        completed("summary", scope, "summary", 1, started);
        Ok(summary)
    }

    // -----------------------------------------------------------------------
    // Period comparison and series
    // -----------------------------------------------------------------------

    /// Current window against the preceding window of equal length.
    ///
    /// Both windows are fetched concurrently; either failure fails the call.
    pub async fn evolve(
        &self,
        scope: &ScopeFilter,
        metric: MetricFamily,
    ) -> Result<Evolution, EngineError> {
        let started = Instant::now();
        let previous_window = scope.window.previous()?;
        let previous_scope = scope.with_window(previous_window);
        let (current, previous) =
            tokio::try_join!(self.market_facts(scope), self.market_facts(&previous_scope))?;

        let level = scope.territory.narrowest_level();
        let current = aggregate_facts(&current, level, metric, scope.brand);
        let previous = aggregate_facts(&previous, level, metric, scope.brand);
        let rows = compare_periods(metric, &current, &previous);
        completed("evolve", scope, metric.key(), rows.len(), started);
        Ok(Evolution { metric, current_window: scope.window, previous_window, rows })
    }

    pub async fn series(
        &self,
        scope: &ScopeFilter,
        metric: MetricFamily,
    ) -> Result<MonthlySeries, EngineError> {
        let started = Instant::now();
        let facts = self.market_facts(scope).await?;
        let series = monthly_series(&facts, &scope.window, metric, scope.brand);
        completed("series", scope, metric.key(), series.series.len(), started);
        Ok(series)
    }

    /// Per-outlet record of the scope's brand. Requires `brand`.
    pub async fn pos_breakdown(&self, scope: &ScopeFilter) -> Result<Vec<PosBreakdown>, EngineError> {
        let brand = scope.require_brand()?;
        let started = Instant::now();
        let facts = self.market_facts(scope).await?;
        let rows = pos_breakdown(&facts, brand);
        completed("pos_breakdown", scope, "pos", rows.len(), started);
        Ok(rows)
    }

    // -----------------------------------------------------------------------
    // Derived indices
    // -----------------------------------------------------------------------

    pub async fn velocity(
        &self,
        scope: &ScopeFilter,
        level: TerritoryLevel,
    ) -> Result<Vec<VelocityRow>, EngineError> {
        let started = Instant::now();
        let facts = self.market_facts(scope).await?;
        let sish = aggregate_facts(&facts, level, MetricFamily::Sish, scope.brand);
        let sos = aggregate_facts(&facts, level, MetricFamily::Sos, scope.brand);
        let rows = velocity_rows(&sish, &sos);
        completed("velocity", scope, "velocity", rows.len(), started);
        Ok(rows)
    }

    /// `threshold` falls back to the configured quadrant threshold.
    pub async fn quadrant(
        &self,
        scope: &ScopeFilter,
        level: TerritoryLevel,
        pair: QuadrantPair,
        threshold: Option<f64>,
    ) -> Result<Vec<QuadrantRow>, EngineError> {
        let started = Instant::now();
        let threshold = threshold.unwrap_or(self.settings.quadrant_threshold);
        let facts = self.market_facts(scope).await?;
        let primary = aggregate_facts(&facts, level, pair.primary(), scope.brand);
        let companion = aggregate_facts(&facts, level, pair.companion(), scope.brand);
        let rows = quadrant_rows(pair, &primary, &companion, threshold);
        completed("quadrant", scope, pair.as_str(), rows.len(), started);
        Ok(rows)
    }

    /// Scope-wide funnel per brand.
    pub async fn funnel(
        &self,
        scope: &ScopeFilter,
        variant: FunnelVariant,
    ) -> Result<Vec<BrandFunnel>, EngineError> {
        let started = Instant::now();
        let level = scope.territory.narrowest_level();
        let funnels: Vec<BrandFunnel> = match variant {
            FunnelVariant::Nd => {
                let (facts, universe) =
                    tokio::try_join!(self.market_facts(scope), self.universe(scope, level))?;
                let universe_pos: u64 = universe.iter().map(|count| count.pos_count).sum();
                aggregate_facts(&facts, level, MetricFamily::Nd, scope.brand)
                    .into_iter()
                    .map(|row| BrandFunnel {
                        funnel: nd_funnel(universe_pos, row.visited_pos, row.numerator as u64),
                        brand: row.brand,
                    })
                    .collect()
            }
            FunnelVariant::Wd => {
                let facts = self.market_facts(scope).await?;
                aggregate_facts(&facts, level, MetricFamily::Wd, scope.brand)
                    .into_iter()
                    .map(|row| BrandFunnel {
                        funnel: wd_funnel(row.numerator, row.denominator),
                        brand: row.brand,
                    })
                    .collect()
            }
        };
        completed("funnel", scope, variant.as_str(), funnels.len(), started);
        Ok(funnels)
    }

    /// Concentration of the whole market; the scope's brand is ignored.
    pub async fn concentration(
        &self,
        scope: &ScopeFilter,
        metric: MetricFamily,
    ) -> Result<Concentration, EngineError> {
        let started = Instant::now();
        let facts = self.market_facts(scope).await?;
        let rows = aggregate_facts(&facts, scope.territory.narrowest_level(), metric, None);
        let view = concentration(metric, &rows);
        completed("concentration", scope, metric.key(), view.curve.len(), started);
        Ok(view)
    }

    /// Default target is an equal split over every brand of the market, even
    /// when the scope narrows to one brand.
    pub async fn sish_gap(
        &self,
        scope: &ScopeFilter,
        target: Option<f64>,
    ) -> Result<Vec<SishGap>, EngineError> {
        let started = Instant::now();
        let facts = self.market_facts(scope).await?;
        let rows =
            aggregate_facts(&facts, scope.territory.narrowest_level(), MetricFamily::Sish, None);
        let mut gaps = sish_gaps(&rows, target);
        if let Some(brand) = scope.brand {
            gaps.retain(|gap| gap.brand.id == brand);
        }
        completed("sish_gap", scope, "sish", gaps.len(), started);
        Ok(gaps)
    }

    // -----------------------------------------------------------------------
    // Ranking and pivots
    // -----------------------------------------------------------------------

    /// Scope-wide ranking of every brand. A scope brand keeps only its own
    /// row, with the rank it holds in the full market.
    pub async fn ranking(
        &self,
        scope: &ScopeFilter,
        metric: MetricFamily,
    ) -> Result<Vec<RankedRow>, EngineError> {
        let started = Instant::now();
        let facts = self.market_facts(scope).await?;
        let rows = aggregate_facts(&facts, scope.territory.narrowest_level(), metric, None);
        let mut ranked = rank(&rows, metric);
        if let Some(brand) = scope.brand {
            ranked.retain(|row| row.row.brand.id == brand);
        }
        completed("ranking", scope, metric.key(), ranked.len(), started);
        Ok(ranked)
    }

    pub async fn heatmap(
        &self,
        scope: &ScopeFilter,
        level: TerritoryLevel,
        metric: MetricFamily,
    ) -> Result<Heatmap, EngineError> {
        let rows = self.aggregate(scope, level, metric).await?;
        let cells: Vec<HeatmapCell> = rows.iter().map(HeatmapCell::from).collect();
        Ok(pivot(&cells))
    }

    pub async fn oos_alerts(
        &self,
        scope: &ScopeFilter,
        level: TerritoryLevel,
        minimum: Severity,
    ) -> Result<Vec<RankedRow>, EngineError> {
        let rows = self.aggregate(scope, level, MetricFamily::Oos).await?;
        Ok(oos_alerts(&rows, minimum))
    }
}

fn completed(operation: &'static str, scope: &ScopeFilter, metric: &str, rows: usize, started: Instant) {
    info!(
        event_name = "metrics.query.completed",
        operation,
        metric,
        scope = %scope,
        rows,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "metrics query completed"
    );
}
