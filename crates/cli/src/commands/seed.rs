use itemdesk_db::{connect_with_config, migrations, SampleItemDataset, SeedResult};

use crate::commands::{prepare, CommandResult, StepFailure};

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("seed") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let seed_result = SampleItemDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = SampleItemDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let outcome: Result<SeedResult, StepFailure> = if verification.all_present {
            Ok(seed_result)
        } else {
            Err(("seed_verification", verification_failure_message(&verification.checks), 6u8))
        };

        pool.close().await;
        outcome
    });

    match result {
        Ok(seeded) => CommandResult::success("seed", summary(&seeded)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn summary(seeded: &SeedResult) -> String {
    let skipped = seeded.total - seeded.inserted.len();
    if seeded.inserted.is_empty() {
        format!("sample items already present ({skipped} skipped)")
    } else {
        format!(
            "loaded {} sample items ({}), {skipped} already present",
            seeded.inserted.len(),
            seeded.inserted.join(", ")
        )
    }
}

fn verification_failure_message(checks: &[(&'static str, bool)]) -> String {
    let failed = checks
        .iter()
        .filter_map(|(code, present)| (!present).then_some(*code))
        .collect::<Vec<_>>();
    if failed.is_empty() {
        "some sample items failed to load".to_string()
    } else {
        format!("sample items missing or altered: {}", failed.join(", "))
    }
}
