use std::sync::Arc;

use brandscope_core::{EngineError, MetricFamily, MetricsEngine, ScopeParams};
use brandscope_db::{connect_with_settings, SqlFactSource};
use clap::{Args, ValueEnum};
use serde::Serialize;
use serde_json::Value;

use crate::commands::{prepare, CommandResult};

type Failure = (&'static str, String, u8);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ReportView {
    /// One row per territory and brand at `--level`
    #[default]
    Rows,
    /// Scope-wide ranking with tier or severity labels
    Ranking,
    /// Current window against the previous window of equal length
    Evolution,
    /// Monthly series per brand
    Series,
    /// Cumulative share and entropy
    Concentration,
}

impl ReportView {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rows => "rows",
            Self::Ranking => "ranking",
            Self::Evolution => "evolution",
            Self::Series => "series",
            Self::Concentration => "concentration",
        }
    }
}

#[derive(Clone, Debug, Default, Args)]
pub struct ReportArgs {
    #[arg(long, help = "Metric key: nd|oos|wd|ws|sish|sos|sish_in_shop")]
    pub metric: String,
    #[arg(long, value_enum, default_value_t = ReportView::Rows)]
    pub view: ReportView,
    #[arg(long, help = "Country id (required)")]
    pub country: Option<String>,
    #[arg(long)]
    pub province: Option<String>,
    #[arg(long)]
    pub area: Option<String>,
    #[arg(long = "sub-area")]
    pub sub_area: Option<String>,
    #[arg(long)]
    pub commune: Option<String>,
    #[arg(long, help = "Window start, YYYY-MM-DD")]
    pub start: Option<String>,
    #[arg(long, help = "Window end, YYYY-MM-DD")]
    pub end: Option<String>,
    #[arg(long)]
    pub brand: Option<String>,
    #[arg(long, help = "Grouping level for rows: province|area|subarea|commune")]
    pub level: Option<String>,
}

impl ReportArgs {
    fn scope_params(&self) -> ScopeParams {
        ScopeParams {
            country_id: self.country.clone(),
            province_id: self.province.clone(),
            area_id: self.area.clone(),
            sub_area_id: self.sub_area.clone(),
            commune_id: self.commune.clone(),
            start_date: self.start.clone(),
            end_date: self.end.clone(),
            brand_id: self.brand.clone(),
            level: self.level.clone(),
            ..ScopeParams::default()
        }
    }
}

pub fn run(args: ReportArgs) -> CommandResult {
    let (config, runtime) = match prepare("report") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    // reject bad input before touching the database
    let params = args.scope_params();
    let request = args.metric.parse::<MetricFamily>().and_then(|metric| {
        Ok((metric, params.scope()?, params.level_or(config.analytics.default_level)?))
    });
    let (metric, scope, level) = match request {
        Ok(request) => request,
        Err(error) => return CommandResult::failure("report", "invalid_request", error.to_string(), 7),
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        let engine = MetricsEngine::with_settings(
            Arc::new(SqlFactSource::new(pool.clone())),
            config.analytics.engine_settings(),
        );
        let data = match args.view {
            ReportView::Rows => to_json(engine.aggregate(&scope, level, metric).await),
            ReportView::Ranking => to_json(engine.ranking(&scope, metric).await),
            ReportView::Evolution => to_json(engine.evolve(&scope, metric).await),
            ReportView::Series => to_json(engine.series(&scope, metric).await),
            ReportView::Concentration => to_json(engine.concentration(&scope, metric).await),
        };

        pool.close().await;
        data
    });

    match result {
        Ok(data) => CommandResult::success_with_data(
            "report",
            format!("{} {} report for [{scope}]", metric.key(), args.view.as_str()),
            Some(data),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("report", error_class, message, exit_code)
        }
    }
}

fn to_json<T: Serialize>(outcome: Result<T, EngineError>) -> Result<Value, Failure> {
    let value = outcome.map_err(|error| match error {
        EngineError::Validation(error) => ("invalid_request", error.to_string(), 7u8),
        EngineError::Source { source, .. } => ("metrics_source", source.message, 5u8),
    })?;
    serde_json::to_value(value).map_err(|error| ("serialization", error.to_string(), 8u8))
}
