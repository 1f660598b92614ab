use orderdesk_db::DemoCatalog;

use crate::commands::{connect_and_migrate, prepare, CommandResult, EXIT_SEED};

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("seed") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = connect_and_migrate(&config).await?;

        let seeded = DemoCatalog::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), EXIT_SEED));
        let verified = match seeded {
            Ok(seed_result) => DemoCatalog::verify(&pool)
                .await
                .map_err(|error| ("seed_verification", error.to_string(), EXIT_SEED))
                .and_then(|verification| {
                    if verification.all_present {
                        Ok(seed_result.products_seeded)
                    } else {
                        let message = failed_checks_message(&verification.checks);
                        Err(("seed_verification", message, EXIT_SEED))
                    }
                }),
            Err(failure) => Err(failure),
        };

        pool.close().await;
        verified
    });

    match result {
        Ok(products) => {
            let lines: Vec<String> = products.iter().map(|id| format!("  - {id}")).collect();
            let message =
                format!("demo catalog loaded ({} products):\n{}", products.len(), lines.join("\n"));
            CommandResult::success("seed", message)
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn failed_checks_message(checks: &[(&'static str, bool)]) -> String {
    let failed = checks
        .iter()
        .filter_map(|(check, passed)| (!passed).then_some(*check))
        .collect::<Vec<_>>();
    if failed.is_empty() {
        "some demo products failed to load".to_string()
    } else {
        format!("demo catalog verification failed for: {}", failed.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::failed_checks_message;

    #[test]
    fn verification_message_names_failed_products() {
        let checks = [
            ("prod-arroz-integral", true),
            ("prod-cafe-torrado", false),
            ("prod-leite-integral", false),
        ];

        assert_eq!(
            failed_checks_message(&checks),
            "demo catalog verification failed for: prod-cafe-torrado, prod-leite-integral"
        );
    }

    #[test]
    fn verification_message_falls_back_when_nothing_is_labelled() {
        let checks = [("prod-arroz-integral", true)];

        assert_eq!(failed_checks_message(&checks), "some demo products failed to load");
    }
}
