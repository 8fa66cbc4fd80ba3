use std::env;
use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use tempfile::TempDir;
use velocita_cli::commands::{config, doctor, migrate, recompute, seed};

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("VELOCITA_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_when_weights_do_not_sum_to_one() {
    with_env(
        &[
            ("VELOCITA_DATABASE_URL", "sqlite::memory:"),
            ("VELOCITA_METRICS_WEIGHT_MONETARY", "0.9"),
        ],
        || {
            let result = migrate::run();
            assert_eq!(result.exit_code, 2, "expected config validation failure code");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["status"], "error");
            assert_eq!(payload["error_class"], "config_validation");
            assert!(payload["message"].as_str().unwrap_or_default().contains("metrics"));
        },
    );
}

#[test]
fn seed_lists_demo_contacts_and_is_idempotent() {
    let db = TempDb::new();
    with_env(&[("VELOCITA_DATABASE_URL", db.url())], || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected first seed invocation success");
        let first_payload = parse_payload(&first.output);
        assert_eq!(first_payload["command"], "seed");
        assert_eq!(first_payload["status"], "ok");

        let message = first_payload["message"].as_str().unwrap_or_default();
        assert!(message.contains(
            "  - ct-demo-active (owner usr-alice): Prospect with one of three sent quotes accepted"
        ));
        assert!(message.contains("ct-demo-dormant (owner usr-bruno)"));

        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");
        assert_eq!(first_payload["message"], parse_payload(&second.output)["message"]);
    });
}

#[test]
fn recompute_batch_updates_every_seeded_contact() {
    let db = TempDb::new();
    with_env(&[("VELOCITA_DATABASE_URL", db.url())], || {
        assert_eq!(seed::run().exit_code, 0);

        let result = recompute::run(None, None);
        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "recompute");
        assert_eq!(payload["details"]["updated_count"], 4);
        assert_eq!(payload["details"]["failed_ids"], Value::Array(Vec::new()));
        assert_eq!(payload["details"]["cancelled"], false);
    });
}

#[test]
fn recompute_owner_scope_only_touches_that_owner() {
    let db = TempDb::new();
    with_env(&[("VELOCITA_DATABASE_URL", db.url()), ("VELOCITA_METRICS_WORKER_LIMIT", "1")], || {
        assert_eq!(seed::run().exit_code, 0);

        let result = recompute::run(None, Some("usr-alice".to_string()));
        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);
        assert_eq!(parse_payload(&result.output)["details"]["updated_count"], 2);
    });
}

#[test]
fn recompute_unknown_owner_is_not_found() {
    let db = TempDb::new();
    with_env(&[("VELOCITA_DATABASE_URL", db.url())], || {
        assert_eq!(seed::run().exit_code, 0);

        let result = recompute::run(None, Some("usr-nobody".to_string()));
        assert_eq!(result.exit_code, 7);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "not_found");
    });
}

#[test]
fn recompute_single_contact_returns_its_metrics() {
    let db = TempDb::new();
    with_env(&[("VELOCITA_DATABASE_URL", db.url())], || {
        assert_eq!(seed::run().exit_code, 0);

        let result = recompute::run(Some("ct-demo-active".to_string()), None);
        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);

        let details = &parse_payload(&result.output)["details"];
        assert_eq!(details["contact_id"], "ct-demo-active");
        assert_eq!(details["metrics"]["total_revenue"], "500.00");
        assert_eq!(details["metrics"]["conversion_rate"], 33.33);
        assert_eq!(details["sub_scores"]["frequency"], 10.0);

        let missing = recompute::run(Some("ct-ghost".to_string()), None);
        assert_eq!(missing.exit_code, 7);
        assert_eq!(parse_payload(&missing.output)["error_class"], "not_found");
    });
}

#[test]
fn doctor_flags_pending_migrations_until_migrate_runs() {
    let db = TempDb::new();
    with_env(&[("VELOCITA_DATABASE_URL", db.url())], || {
        let before: Value =
            serde_json::from_str(&doctor::run(true)).expect("doctor output should be JSON");
        assert_eq!(before["overall_status"], "fail");
        assert_eq!(check_status(&before, "database_connectivity"), "pass");
        assert_eq!(check_status(&before, "schema_migrations"), "fail");

        assert_eq!(migrate::run().exit_code, 0);

        let after: Value =
            serde_json::from_str(&doctor::run(true)).expect("doctor output should be JSON");
        assert_eq!(after["overall_status"], "pass");
        assert_eq!(check_status(&after, "scoring_policy"), "pass");
    });
}

#[test]
fn config_attributes_env_overrides() {
    with_env(&[("VELOCITA_METRICS_WORKER_LIMIT", "8")], || {
        let output = config::run();
        assert!(output.contains(
            "- metrics.worker_limit = 8 (source: env (VELOCITA_METRICS_WORKER_LIMIT))"
        ));
        assert!(output.contains("- metrics.weight_monetary = 0.4 (source: default)"));
    });
}

struct TempDb {
    _dir: TempDir,
    url: String,
}

impl TempDb {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let url = format!("sqlite://{}", dir.path().join("velocita.db").display());
        Self { _dir: dir, url }
    }

    fn url(&self) -> &str {
        &self.url
    }
}

fn check_status<'a>(report: &'a Value, name: &str) -> &'a str {
    report["checks"]
        .as_array()
        .and_then(|checks| checks.iter().find(|check| check["name"] == name))
        .and_then(|check| check["status"].as_str())
        .unwrap_or("missing")
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "VELOCITA_CONFIG",
        "VELOCITA_DATABASE_URL",
        "VELOCITA_DATABASE_MAX_CONNECTIONS",
        "VELOCITA_DATABASE_TIMEOUT_SECS",
        "VELOCITA_SERVER_BIND_ADDRESS",
        "VELOCITA_SERVER_PORT",
        "VELOCITA_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "VELOCITA_METRICS_MONETARY_DIVISOR",
        "VELOCITA_METRICS_FREQUENCY_POINTS_PER_QUOTE",
        "VELOCITA_METRICS_RECENCY_DAYS_PER_POINT",
        "VELOCITA_METRICS_WEIGHT_MONETARY",
        "VELOCITA_METRICS_WEIGHT_RECENCY",
        "VELOCITA_METRICS_WEIGHT_FREQUENCY",
        "VELOCITA_METRICS_WEIGHT_CONVERSION",
        "VELOCITA_METRICS_WORKER_LIMIT",
        "VELOCITA_METRICS_BATCH_INTERVAL_SECS",
        "VELOCITA_LOGGING_LEVEL",
        "VELOCITA_LOGGING_FORMAT",
        "VELOCITA_LOG_LEVEL",
        "VELOCITA_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
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
