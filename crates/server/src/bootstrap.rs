use std::sync::Arc;

use axum::Router;
use brandscope_core::config::{AppConfig, ConfigError, LoadOptions};
use brandscope_core::MetricsEngine;
use brandscope_db::{connect_with_settings, migrations, DbPool, SqlFactSource};
use thiserror::Error;
use tracing::info;

use crate::{dashboard, health};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub engine: Arc<MetricsEngine>,
}

impl Application {
    /// Dashboard API plus `/health`, sharing one pool.
    pub fn router(&self) -> Router {
        dashboard::router(self.engine.clone()).merge(health::router(self.db_pool.clone()))
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

#[cfg(test)]
pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        max_connections = config.database.max_connections,
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let settings = config.analytics.engine_settings();
    info!(
        event_name = "system.bootstrap.engine_ready",
        correlation_id = "bootstrap",
        default_level = %settings.default_level,
        quadrant_threshold = settings.quadrant_threshold,
        source_timeout_secs = settings.source_timeout.as_secs(),
        "metrics engine configured"
    );
    let source = Arc::new(SqlFactSource::new(db_pool.clone()));
    let engine = Arc::new(MetricsEngine::with_settings(source, settings));

    Ok(Application { config, db_pool, engine })
}
