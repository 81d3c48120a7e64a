use brandscope_db::{connect_with_settings, migrations, DemoDataset, SeedSummary};

use crate::commands::{prepare, CommandResult};

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("seed") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let summary = DemoDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = DemoDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let run_result: Result<SeedSummary, (&'static str, String, u8)> =
            if verification.all_present {
                Ok(summary)
            } else {
                let failed_checks = verification
                    .checks
                    .iter()
                    .filter_map(|(check, passed)| (!passed).then_some(*check))
                    .collect::<Vec<_>>();
                Err(("seed_verification", failed_checks_message(&failed_checks), 6u8))
            };

        pool.close().await;
        run_result
    });

    match result {
        Ok(summary) => CommandResult::success_with_data(
            "seed",
            format!(
                "demo dataset loaded: {} territories, {} brands, {} outlets, {} visits, {} visit items",
                summary.territories,
                summary.brands,
                summary.outlets,
                summary.visits,
                summary.visit_items
            ),
            serde_json::to_value(&summary).ok(),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn failed_checks_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}
