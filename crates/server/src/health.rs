use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use brandscope_db::{migrations::MIGRATOR, DbPool};
use chrono::Utc;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub schema: HealthCheck,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let schema = schema_check(&state.db_pool).await;
    let ready = database.status == "ready" && schema.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "brandscope-server runtime initialized".to_string(),
        },
        database,
        schema,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

/// A negative count from the driver never counts as current.
fn migrations_current(applied: i64, expected: usize) -> bool {
    usize::try_from(applied).is_ok_and(|applied| applied >= expected)
}

/// Fact tables are only usable once every embedded migration has run.
async fn schema_check(pool: &DbPool) -> HealthCheck {
    let expected = MIGRATOR.iter().filter(|migration| migration.migration_type.is_up_migration()).count();
    let applied = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1",
    )
    .fetch_one(pool)
    .await;

    match applied {
        Ok(applied) if migrations_current(applied, expected) => HealthCheck {
            status: "ready",
            detail: format!("{applied} of {expected} migrations applied"),
        },
        Ok(applied) => HealthCheck {
            status: "degraded",
            detail: format!("{applied} of {expected} migrations applied"),
        },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("migration state unreadable: {error}") }
        }
    }
}
