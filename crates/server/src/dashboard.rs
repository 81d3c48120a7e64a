//! Dashboard JSON API.
//!
//! Every endpoint is a `GET` that parses [`ScopeParams`] from the query
//! string, runs one engine operation and answers with the same envelope:
//! `{status, message, data, error}`. Validation failures are 400s raised
//! before any fact is fetched; fact source failures are 500s that carry the
//! store's own message.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use brandscope_core::metrics::derived::{FunnelVariant, QuadrantPair};
use brandscope_core::metrics::ranking::Severity;
use brandscope_core::{
    EngineError, InterfaceError, MetricFamily, MetricsEngine, ScopeParams, ValidationError,
};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const CORRELATION_HEADER: &str = "x-correlation-id";

const DEFAULT_ALERT_SEVERITY: Severity = Severity::Medium;

#[derive(Clone)]
pub struct DashboardState {
    engine: Arc<MetricsEngine>,
}

impl DashboardState {
    pub fn new(engine: Arc<MetricsEngine>) -> Self {
        Self { engine }
    }
}

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub status: &'static str,
    pub message: String,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> Envelope<T> {
    fn success(message: String, data: T) -> Self {
        Self { status: "success", message, data: Some(data), error: None }
    }
}

impl Envelope<()> {
    fn failure(error: &InterfaceError) -> Self {
        Self {
            status: "error",
            message: error.user_message().to_string(),
            data: None,
            error: Some(error.detail().to_string()),
        }
    }
}

pub fn router(engine: Arc<MetricsEngine>) -> Router {
    Router::new()
        .route("/api/v1/summary", get(summary))
        .route("/api/v1/coverage", get(coverage))
        .route("/api/v1/metrics/{metric}", get(metric_rows))
        .route("/api/v1/metrics/{metric}/ranking", get(ranking))
        .route("/api/v1/metrics/{metric}/heatmap", get(heatmap))
        .route("/api/v1/metrics/{metric}/evolution", get(evolution))
        .route("/api/v1/metrics/{metric}/series", get(series))
        .route("/api/v1/metrics/{metric}/concentration", get(concentration))
        .route("/api/v1/velocity", get(velocity))
        .route("/api/v1/quadrant/{pair}", get(quadrant))
        .route("/api/v1/funnel/{variant}", get(funnel))
        .route("/api/v1/sish/gap", get(sish_gap))
        .route("/api/v1/alerts/oos", get(oos_alerts))
        .route("/api/v1/pos", get(pos_breakdown))
        .with_state(DashboardState::new(engine))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub async fn summary(
    State(state): State<DashboardState>,
    query: Result<Query<ScopeParams>, QueryRejection>,
) -> Response {
    respond("summary", async move {
        let Query(params) = query.map_err(malformed)?;
        let scope = params.scope()?;
        state.engine.summary(&scope).await
    })
    .await
}

pub async fn coverage(
    State(state): State<DashboardState>,
    query: Result<Query<ScopeParams>, QueryRejection>,
) -> Response {
    respond("coverage", async move {
        let Query(params) = query.map_err(malformed)?;
        let scope = params.scope()?;
        let level = params.level_or(state.engine.settings().default_level)?;
        state.engine.coverage(&scope, level).await
    })
    .await
}

pub async fn metric_rows(
    State(state): State<DashboardState>,
    path: Result<Path<String>, PathRejection>,
    query: Result<Query<ScopeParams>, QueryRejection>,
) -> Response {
    respond("metric_rows", async move {
        let Path(metric) = path.map_err(malformed)?;
        let Query(params) = query.map_err(malformed)?;
        let metric: MetricFamily = metric.parse()?;
        let scope = params.scope()?;
        let level = params.level_or(state.engine.settings().default_level)?;
        state.engine.aggregate(&scope, level, metric).await
    })
    .await
}

pub async fn ranking(
    State(state): State<DashboardState>,
    path: Result<Path<String>, PathRejection>,
    query: Result<Query<ScopeParams>, QueryRejection>,
) -> Response {
    respond("ranking", async move {
        let Path(metric) = path.map_err(malformed)?;
        let Query(params) = query.map_err(malformed)?;
        let metric: MetricFamily = metric.parse()?;
        let scope = params.scope()?;
        state.engine.ranking(&scope, metric).await
    })
    .await
}

pub async fn heatmap(
    State(state): State<DashboardState>,
    path: Result<Path<String>, PathRejection>,
    query: Result<Query<ScopeParams>, QueryRejection>,
) -> Response {
    respond("heatmap", async move {
        let Path(metric) = path.map_err(malformed)?;
        let Query(params) = query.map_err(malformed)?;
        let metric: MetricFamily = metric.parse()?;
        let scope = params.scope()?;
        let level = params.level_or(state.engine.settings().default_level)?;
        state.engine.heatmap(&scope, level, metric).await
    })
    .await
}

pub async fn evolution(
    State(state): State<DashboardState>,
    path: Result<Path<String>, PathRejection>,
    query: Result<Query<ScopeParams>, QueryRejection>,
) -> Response {
    respond("evolution", async move {
        let Path(metric) = path.map_err(malformed)?;
        let Query(params) = query.map_err(malformed)?;
        let metric: MetricFamily = metric.parse()?;
        let scope = params.scope()?;
        state.engine.evolve(&scope, metric).await
    })
    .await
}

pub async fn series(
    State(state): State<DashboardState>,
    path: Result<Path<String>, PathRejection>,
    query: Result<Query<ScopeParams>, QueryRejection>,
) -> Response {
    respond("series", async move {
        let Path(metric) = path.map_err(malformed)?;
        let Query(params) = query.map_err(malformed)?;
        let metric: MetricFamily = metric.parse()?;
        let scope = params.scope()?;
        state.engine.series(&scope, metric).await
    })
    .await
}

pub async fn concentration(
    State(state): State<DashboardState>,
    path: Result<Path<String>, PathRejection>,
    query: Result<Query<ScopeParams>, QueryRejection>,
) -> Response {
    respond("concentration", async move {
        let Path(metric) = path.map_err(malformed)?;
        let Query(params) = query.map_err(malformed)?;
        let metric: MetricFamily = metric.parse()?;
        let scope = params.scope()?;
        state.engine.concentration(&scope, metric).await
    })
    .await
}

pub async fn velocity(
    State(state): State<DashboardState>,
    query: Result<Query<ScopeParams>, QueryRejection>,
) -> Response {
    respond("velocity", async move {
        let Query(params) = query.map_err(malformed)?;
        let scope = params.scope()?;
        let level = params.level_or(state.engine.settings().default_level)?;
        state.engine.velocity(&scope, level).await
    })
    .await
}

pub async fn quadrant(
    State(state): State<DashboardState>,
    path: Result<Path<String>, PathRejection>,
    query: Result<Query<ScopeParams>, QueryRejection>,
) -> Response {
    respond("quadrant", async move {
        let Path(pair) = path.map_err(malformed)?;
        let Query(params) = query.map_err(malformed)?;
        let pair: QuadrantPair = pair.parse()?;
        let scope = params.scope()?;
        let level = params.level_or(state.engine.settings().default_level)?;
        let threshold = params.threshold_or(state.engine.settings().quadrant_threshold)?;
        state.engine.quadrant(&scope, level, pair, Some(threshold)).await
    })
    .await
}

pub async fn funnel(
    State(state): State<DashboardState>,
    path: Result<Path<String>, PathRejection>,
    query: Result<Query<ScopeParams>, QueryRejection>,
) -> Response {
    respond("funnel", async move {
        let Path(variant) = path.map_err(malformed)?;
        let Query(params) = query.map_err(malformed)?;
        let variant: FunnelVariant = variant.parse()?;
        let scope = params.scope()?;
        state.engine.funnel(&scope, variant).await
    })
    .await
}

pub async fn sish_gap(
    State(state): State<DashboardState>,
    query: Result<Query<ScopeParams>, QueryRejection>,
) -> Response {
    respond("sish_gap", async move {
        let Query(params) = query.map_err(malformed)?;
        let scope = params.scope()?;
        let target = params.target()?;
        state.engine.sish_gap(&scope, target).await
    })
    .await
}

pub async fn oos_alerts(
    State(state): State<DashboardState>,
    query: Result<Query<ScopeParams>, QueryRejection>,
) -> Response {
    respond("oos_alerts", async move {
        let Query(params) = query.map_err(malformed)?;
        let scope = params.scope()?;
        let level = params.level_or(state.engine.settings().default_level)?;
        let minimum = params.min_severity_or(DEFAULT_ALERT_SEVERITY)?;
        state.engine.oos_alerts(&scope, level, minimum).await
    })
    .await
}

pub async fn pos_breakdown(
    State(state): State<DashboardState>,
    query: Result<Query<ScopeParams>, QueryRejection>,
) -> Response {
    respond("pos_breakdown", async move {
        let Query(params) = query.map_err(malformed)?;
        let scope = params.scope()?;
        state.engine.pos_breakdown(&scope).await
    })
    .await
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Extractor rejections become ordinary validation failures so they get the
/// envelope and correlation header like any other 400.
fn malformed(rejection: impl std::fmt::Display) -> ValidationError {
    ValidationError::MalformedRequest(rejection.to_string())
}

/// Run `work` under a fresh correlation id and wrap its outcome.
async fn respond<T, F>(operation: &'static str, work: F) -> Response
where
    T: Serialize,
    F: Future<Output = Result<T, EngineError>>,
{
    let correlation_id = Uuid::new_v4().to_string();
    let started = Instant::now();

    match work.await {
        Ok(data) => {
            info!(
                event_name = "server.dashboard.completed",
                correlation_id = %correlation_id,
                operation,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "dashboard request completed"
            );
            let envelope = Envelope::success(format!("{operation} computed"), data);
            (StatusCode::OK, [(CORRELATION_HEADER, correlation_id)], Json(envelope)).into_response()
        }
        Err(failure) => {
            let failure = failure.into_interface(correlation_id.clone());
            let status = match &failure {
                InterfaceError::BadRequest { message, .. } => {
                    warn!(
                        event_name = "server.dashboard.rejected",
                        correlation_id = %correlation_id,
                        operation,
                        reason = %message,
                        "dashboard request rejected"
                    );
                    StatusCode::BAD_REQUEST
                }
                InterfaceError::Internal { message, .. } => {
                    error!(
                        event_name = "server.dashboard.failed",
                        correlation_id = %correlation_id,
                        operation,
                        error = %message,
                        "dashboard request failed"
                    );
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            let envelope = Envelope::failure(&failure);
            (status, [(CORRELATION_HEADER, correlation_id)], Json(envelope)).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        extract::{Path, Query, State},
        http::{Request, StatusCode},
        response::Response,
    };
    use brandscope_core::{
        BrandRef, MetricsEngine, PosId, PosRef, ScopeParams, TerritoryLevel, TerritoryPath,
        TerritoryRef, VisitFact, VisitId,
    };
    use brandscope_db::{DemoDataset, InMemoryFactSource};
    use chrono::NaiveDate;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::{funnel, metric_rows, router, DashboardState, CORRELATION_HEADER};

    fn demo_engine() -> Arc<MetricsEngine> {
        Arc::new(MetricsEngine::new(Arc::new(InMemoryFactSource::from_dataset(
            &DemoDataset::generate(),
        ))))
    }

    fn march_params() -> ScopeParams {
        ScopeParams {
            country_id: Some("1".to_string()),
            start_date: Some("2024-03-01".to_string()),
            end_date: Some("2024-03-31".to_string()),
            ..ScopeParams::default()
        }
    }

    fn gombe() -> TerritoryPath {
        TerritoryPath {
            country: TerritoryRef::new(1, "RDC", TerritoryLevel::Country),
            province: TerritoryRef::new(10, "Kinshasa", TerritoryLevel::Province),
            area: TerritoryRef::new(12, "Lukunga", TerritoryLevel::Area),
            sub_area: TerritoryRef::new(121, "Lukunga Ouest", TerritoryLevel::SubArea),
            commune: TerritoryRef::new(1211, "Gombe", TerritoryLevel::Commune),
        }
    }

    /// Ten visited shops, brand 7 present at the first six.
    async fn nd_scenario() -> Arc<MetricsEngine> {
        let source = InMemoryFactSource::new();
        let visited_on = NaiveDate::from_ymd_opt(2024, 3, 12).expect("date");
        for shop in 1..=10 {
            source
                .insert_fact(VisitFact {
                    visit_id: VisitId(shop),
                    pos: PosRef { id: PosId(shop), name: format!("Shop {shop:02}") },
                    territory: gombe(),
                    brand: BrandRef::new(7, "Aurora"),
                    visited_on,
                    stock_units: if shop <= 6 { 4.0 } else { 0.0 },
                    presence_counter: i64::from(shop <= 6),
                    sold_units: 0.0,
                })
                .await;
        }
        for shop in 1..=20 {
            source.register_pos(PosId(shop), gombe()).await;
        }
        Arc::new(MetricsEngine::new(Arc::new(source)))
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    async fn get(engine: Arc<MetricsEngine>, uri: &str) -> (StatusCode, Value) {
        let response = router(engine)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).expect("request"))
            .await
            .expect("response");
        let status = response.status();
        assert!(response.headers().contains_key(CORRELATION_HEADER));
        (status, json_body(response).await)
    }

    #[tokio::test]
    async fn metric_rows_wrap_data_in_success_envelope() {
        let response = metric_rows(
            State(DashboardState::new(nd_scenario().await)),
            Ok(Path("nd".to_string())),
            Ok(Query(ScopeParams { level: Some("commune".to_string()), ..march_params() })),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "success");
        assert!(body.get("error").is_none());
        let row = &body["data"][0];
        assert_eq!(row["numerator"], 6.0);
        assert_eq!(row["denominator"], 10.0);
        assert_eq!(row["percent"], 60.0);
    }

    #[tokio::test]
    async fn nd_funnel_splits_the_universe() {
        let response = funnel(
            State(DashboardState::new(nd_scenario().await)),
            Ok(Path("nd".to_string())),
            Ok(Query(march_params())),
        )
        .await;

        let body = json_body(response).await;
        let funnel = &body["data"][0];
        assert_eq!(funnel["present"], 6.0);
        assert_eq!(funnel["visited_gap"], 4.0);
        assert_eq!(funnel["universe_gap"], 10.0);
        assert_eq!(funnel["opportunity_pct"], 70.0);
    }

    #[tokio::test]
    async fn missing_country_is_a_bad_request() {
        let (status, body) =
            get(demo_engine(), "/api/v1/summary?start_date=2024-03-01&end_date=2024-03-31").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
        assert!(body["data"].is_null());
        assert!(body["error"].as_str().unwrap_or_default().contains("country_id"));
    }

    #[tokio::test]
    async fn unreadable_query_strings_still_get_the_envelope() {
        let duplicated = "country_id=1&country_id=2&start_date=2024-03-01&end_date=2024-03-31";
        for uri in [
            format!("/api/v1/metrics/nd?{duplicated}"),
            format!("/api/v1/summary?{duplicated}"),
            "/api/v1/metrics/%FF?country_id=1&start_date=2024-03-01&end_date=2024-03-31".to_string(),
        ] {
            let (status, body) = get(demo_engine(), &uri).await;

            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body["status"], "error");
            assert!(body["data"].is_null());
            assert!(
                body["error"].as_str().unwrap_or_default().starts_with("malformed request"),
                "{uri}: {body}"
            );
        }
    }

    #[tokio::test]
    async fn unknown_metric_and_pair_are_rejected() {
        let query = "country_id=1&start_date=2024-03-01&end_date=2024-03-31";
        let (status, _) = get(demo_engine(), &format!("/api/v1/metrics/share/ranking?{query}")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = get(demo_engine(), &format!("/api/v1/quadrant/ws_oos?{query}")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = get(demo_engine(), &format!("/api/v1/funnel/sos?{query}")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn pos_drilldown_requires_a_brand() {
        let query = "country_id=1&start_date=2024-03-01&end_date=2024-03-31";
        let (status, body) = get(demo_engine(), &format!("/api/v1/pos?{query}")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap_or_default().contains("brand_id"));

        let (status, body) = get(demo_engine(), &format!("/api/v1/pos?{query}&brand_id=1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().map(Vec::len), Some(12));
    }

    #[tokio::test]
    async fn source_failure_is_a_server_error_with_the_raw_message() {
        let source = InMemoryFactSource::new();
        source.set_failure(Some("disk I/O error")).await;
        let engine = Arc::new(MetricsEngine::new(Arc::new(source)));

        let (status, body) = get(
            engine,
            "/api/v1/metrics/wd?country_id=1&start_date=2024-03-01&end_date=2024-03-31",
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "error");
        assert_eq!(body["error"], "disk I/O error");
    }

    #[tokio::test]
    async fn every_dashboard_route_answers_on_demo_data() {
        let query = "country_id=1&start_date=2024-03-01&end_date=2024-03-31";
        let paths = [
            "/api/v1/summary",
            "/api/v1/coverage",
            "/api/v1/metrics/oos",
            "/api/v1/metrics/sish/ranking",
            "/api/v1/metrics/nd/heatmap",
            "/api/v1/metrics/wd/evolution",
            "/api/v1/metrics/sos/series",
            "/api/v1/metrics/sish_in_shop/concentration",
            "/api/v1/velocity",
            "/api/v1/quadrant/wd_nd",
            "/api/v1/quadrant/ws-nd",
            "/api/v1/funnel/wd",
            "/api/v1/sish/gap",
            "/api/v1/alerts/oos",
        ];
        for path in paths {
            let (status, body) = get(demo_engine(), &format!("{path}?{query}")).await;
            assert_eq!(status, StatusCode::OK, "{path}: {body}");
            assert_eq!(body["status"], "success", "{path}");
            assert!(!body["data"].is_null(), "{path}");
        }
    }

    #[tokio::test]
    async fn heatmap_matrix_matches_requested_level() {
        let (status, body) = get(
            demo_engine(),
            "/api/v1/metrics/nd/heatmap?country_id=1&start_date=2024-01-01&end_date=2024-03-31&level=commune",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let territories = body["data"]["territories"].as_array().map(Vec::len);
        assert_eq!(territories, Some(4));
        let brands = body["data"]["brands"].as_array().map(Vec::len).unwrap_or_default();
        let rows = body["data"]["matrix"].as_array().cloned().unwrap_or_default();
        assert_eq!(rows.len(), brands);
    }

    #[tokio::test]
    async fn inverted_window_is_rejected_before_any_fetch() {
        let source = InMemoryFactSource::new();
        source.set_failure(Some("must not be reached")).await;
        let engine = Arc::new(MetricsEngine::new(Arc::new(source)));

        let (status, body) = get(
            engine,
            "/api/v1/velocity?country_id=1&start_date=2024-03-31&end_date=2024-03-01",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_ne!(body["error"], "must not be reached");
    }
}
