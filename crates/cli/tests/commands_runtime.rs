use std::env;
use std::sync::{Mutex, OnceLock};

use orderdesk_cli::commands::{catalog, doctor, migrate, seed};
use serde_json::Value;

const CREDENTIALS: [(&str, &str); 3] = [
    ("ORDERDESK_WHATSAPP_ACCESS_TOKEN", "EAAG-test-token"),
    ("ORDERDESK_WHATSAPP_PHONE_NUMBER_ID", "123456"),
    ("ORDERDESK_WHATSAPP_VERIFY_TOKEN", "verify-me"),
];

const NO_ENV: [(&str, &str); 0] = [];

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&with_database("sqlite::memory:"), || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_without_credentials() {
    with_env(&[("ORDERDESK_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_is_idempotent_and_catalog_lists_stock() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("orderdesk.db").display());

    with_env(&with_database(&url), || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected first seed success: {}", first.output);
        let first_payload = parse_payload(&first.output);
        assert_eq!(first_payload["command"], "seed");
        assert_eq!(first_payload["status"], "ok");
        let message = first_payload["message"].as_str().unwrap_or_default();
        assert!(message.starts_with("demo catalog loaded (7 products)"), "{message}");
        assert!(message.contains("  - prod-cafe-torrado"));

        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected second seed success");
        assert_eq!(parse_payload(&second.output)["message"], first_payload["message"]);

        let listing = catalog::run();
        assert_eq!(listing.exit_code, 0, "expected catalog success: {}", listing.output);
        let payload = parse_payload(&listing.output);
        assert_eq!(payload["command"], "catalog");
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.starts_with("7 products:"), "{message}");
        assert!(message.contains("prod-cafe-torrado: Cafe Torrado R$ 18.90 (stock 45)"));
        assert!(
            message.contains("prod-macarrao-espaguete: Macarrao Espaguete R$ 4.29 (out of stock)")
        );
    });
}

#[test]
fn catalog_on_fresh_database_points_to_seed() {
    with_env(&with_database("sqlite::memory:"), || {
        let result = catalog::run();
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert!(payload["message"].as_str().unwrap_or_default().contains("orderdesk seed"));
    });
}

#[test]
fn doctor_json_reports_readiness() {
    with_env(&with_database("sqlite::memory:"), || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 0, "expected doctor pass: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "doctor");
        assert_eq!(payload["overall_status"], "pass");
        let checks = payload["checks"].as_array().cloned().unwrap_or_default();
        let status_of = |name: &str| {
            checks
                .iter()
                .find(|check| check["name"] == name)
                .map(|check| check["status"].clone())
                .unwrap_or(Value::Null)
        };
        assert_eq!(status_of("config_validation"), "pass");
        assert_eq!(status_of("webhook_security"), "warn");
        assert_eq!(status_of("database_connectivity"), "pass");
    });
}

#[test]
fn doctor_fails_with_config_code_when_config_invalid() {
    with_env(&NO_ENV, || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "fail");
        assert_eq!(payload["checks"][1]["status"], "skipped");
    });
}

fn with_database(url: &str) -> Vec<(&'static str, String)> {
    let mut vars: Vec<(&'static str, String)> =
        CREDENTIALS.iter().map(|(key, value)| (*key, value.to_string())).collect();
    vars.push(("ORDERDESK_DATABASE_URL", url.to_string()));
    // In-memory databases are per connection.
    vars.push(("ORDERDESK_DATABASE_MAX_CONNECTIONS", "1".to_string()));
    vars
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env<V: AsRef<str>>(vars: &[(&str, V)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "ORDERDESK_DATABASE_URL",
        "ORDERDESK_DATABASE_MAX_CONNECTIONS",
        "ORDERDESK_DATABASE_TIMEOUT_SECS",
        "ORDERDESK_WHATSAPP_ACCESS_TOKEN",
        "ORDERDESK_WHATSAPP_PHONE_NUMBER_ID",
        "ORDERDESK_WHATSAPP_VERIFY_TOKEN",
        "ORDERDESK_WHATSAPP_APP_SECRET",
        "ORDERDESK_WHATSAPP_API_BASE_URL",
        "ORDERDESK_LLM_PROVIDER",
        "ORDERDESK_LLM_API_KEY",
        "ORDERDESK_LLM_BASE_URL",
        "ORDERDESK_LLM_MODEL",
        "ORDERDESK_LLM_TIMEOUT_SECS",
        "ORDERDESK_AGENT_TOOL_TIMEOUT_SECS",
        "ORDERDESK_AGENT_ORDER_RETRY_ATTEMPTS",
        "ORDERDESK_AGENT_PROGRESS_NOTICES",
        "ORDERDESK_MATCHER_THRESHOLD",
        "ORDERDESK_SERVER_BIND_ADDRESS",
        "ORDERDESK_SERVER_PORT",
        "ORDERDESK_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "ORDERDESK_LOGGING_LEVEL",
        "ORDERDESK_LOGGING_FORMAT",
        "ORDERDESK_LOG_LEVEL",
        "ORDERDESK_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value.as_ref());
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
