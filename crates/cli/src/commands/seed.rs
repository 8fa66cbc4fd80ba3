use crate::commands::{
    build_runtime, load_config, CommandResult, EXIT_COMMAND_FAILED, EXIT_DB_CONNECTIVITY,
    EXIT_MIGRATION,
};
use velocita_db::{connect_with_config, migrations, DemoSeedDataset, SeededContact};

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match build_runtime("seed") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DB_CONNECTIVITY))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;

        let seed_result = DemoSeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), EXIT_COMMAND_FAILED))?;

        let verification = DemoSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), EXIT_COMMAND_FAILED))?;

        let run_result: Result<Vec<SeededContact>, (&'static str, String, u8)> =
            if verification.all_present {
                Ok(seed_result.contacts_seeded)
            } else {
                let failed_checks = verification
                    .checks
                    .iter()
                    .filter_map(|(check, passed)| (!passed).then_some(*check))
                    .collect::<Vec<_>>();
                let message = verification_message(&failed_checks);
                Err(("seed_verification", message, EXIT_COMMAND_FAILED))
            };

        pool.close().await;
        run_result
    });

    match result {
        Ok(contacts) => CommandResult::success("seed", success_message(&contacts)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn success_message(contacts: &[SeededContact]) -> String {
    let lines = contacts
        .iter()
        .map(|c| format!("  - {} (owner {}): {}", c.contact_id, c.owner_id, c.description))
        .collect::<Vec<_>>();
    format!(
        "demo dataset loaded ({} contacts); run `velocita recompute` to score them:\n{}",
        contacts.len(),
        lines.join("\n")
    )
}

fn verification_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::verification_message;

    #[test]
    fn verification_error_message_targets_failed_checks() {
        let checks = [("owners", true), ("loyal-quote-count", false), ("ct-demo-fresh", false)];

        let failed_checks = checks
            .iter()
            .filter_map(|(check, passed)| (!passed).then_some(*check))
            .collect::<Vec<_>>();

        assert_eq!(
            verification_message(&failed_checks),
            "Seed verification failed for checks: loyal-quote-count, ct-demo-fresh"
        );
    }

    #[test]
    fn verification_error_message_falls_back_to_generic_when_no_labels() {
        assert_eq!(verification_message(&[]), "Some seed data failed to load");
    }
}
