use std::process::ExitCode;

use brandscope_core::config::{AppConfig, LoadOptions, LogFormat};
use tracing_subscriber::EnvFilter;

fn init_logging() {
    // stdout carries the command payload, so diagnostics go to stderr. An
    // invalid config is reported by the command itself.
    let (level, format) = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => (config.logging.level, config.logging.format),
        Err(_) => ("warn".to_string(), LogFormat::Compact),
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(filter);

    match format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn main() -> ExitCode {
    init_logging();
    brandscope_cli::run()
}
