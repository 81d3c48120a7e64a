pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use commands::report::ReportArgs;

#[derive(Debug, Parser)]
#[command(
    name = "brandscope",
    about = "Brandscope operator CLI",
    long_about = "Operate the Brandscope metrics database: migrations, demo data, config inspection, and one-off metric reports.",
    after_help = "Examples:\n  brandscope migrate\n  brandscope seed\n  brandscope report --metric nd --country 1 --start 2024-03-01 --end 2024-03-31 --level commune"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo dataset (idempotent)")]
    Seed,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Compute one metric over a scope and print it as JSON")]
    Report(ReportArgs),
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Report(args) => commands::report::run(args),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
