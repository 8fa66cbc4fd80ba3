use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use toml::Value;
use velocita_core::config::{resolve_config_path, AppConfig, LoadOptions};

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    for (key_path, value, env_keys) in effective_values(&config) {
        let source = field_source(
            key_path,
            env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(key_path, &value, source));
    }

    lines.join("\n")
}

type ConfigRow = (&'static str, String, &'static [&'static str]);

fn effective_values(config: &AppConfig) -> Vec<ConfigRow> {
    let metrics = &config.metrics;
    vec![
        row("database.url", config.database.url.clone(), &["VELOCITA_DATABASE_URL"]),
        row(
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["VELOCITA_DATABASE_MAX_CONNECTIONS"],
        ),
        row(
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["VELOCITA_DATABASE_TIMEOUT_SECS"],
        ),
        row(
            "server.bind_address",
            config.server.bind_address.clone(),
            &["VELOCITA_SERVER_BIND_ADDRESS"],
        ),
        row("server.port", config.server.port.to_string(), &["VELOCITA_SERVER_PORT"]),
        row(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            &["VELOCITA_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        row(
            "metrics.monetary_divisor",
            metrics.monetary_divisor.to_string(),
            &["VELOCITA_METRICS_MONETARY_DIVISOR"],
        ),
        row(
            "metrics.frequency_points_per_quote",
            metrics.frequency_points_per_quote.to_string(),
            &["VELOCITA_METRICS_FREQUENCY_POINTS_PER_QUOTE"],
        ),
        row(
            "metrics.recency_days_per_point",
            metrics.recency_days_per_point.to_string(),
            &["VELOCITA_METRICS_RECENCY_DAYS_PER_POINT"],
        ),
        row(
            "metrics.weight_monetary",
            metrics.weight_monetary.to_string(),
            &["VELOCITA_METRICS_WEIGHT_MONETARY"],
        ),
        row(
            "metrics.weight_recency",
            metrics.weight_recency.to_string(),
            &["VELOCITA_METRICS_WEIGHT_RECENCY"],
        ),
        row(
            "metrics.weight_frequency",
            metrics.weight_frequency.to_string(),
            &["VELOCITA_METRICS_WEIGHT_FREQUENCY"],
        ),
        row(
            "metrics.weight_conversion",
            metrics.weight_conversion.to_string(),
            &["VELOCITA_METRICS_WEIGHT_CONVERSION"],
        ),
        row(
            "metrics.worker_limit",
            metrics.worker_limit.to_string(),
            &["VELOCITA_METRICS_WORKER_LIMIT"],
        ),
        row(
            "metrics.batch_interval_secs",
            metrics.batch_interval_secs.to_string(),
            &["VELOCITA_METRICS_BATCH_INTERVAL_SECS"],
        ),
        row(
            "logging.level",
            config.logging.level.clone(),
            &["VELOCITA_LOGGING_LEVEL", "VELOCITA_LOG_LEVEL"],
        ),
        row(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["VELOCITA_LOGGING_FORMAT", "VELOCITA_LOG_FORMAT"],
        ),
    ]
}

fn row(key: &'static str, value: String, env_keys: &'static [&'static str]) -> ConfigRow {
    (key, value, env_keys)
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("config file"));
            return format!("file ({})", file_path.display());
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use toml::Value;

    use super::{contains_path, field_source};

    #[test]
    fn nested_keys_are_found_in_config_documents() {
        let doc: Value = "[metrics]\nworker_limit = 8\n".parse().expect("toml");
        assert!(contains_path(&doc, "metrics.worker_limit"));
        assert!(!contains_path(&doc, "metrics.weight_recency"));
        assert!(!contains_path(&doc, "server.port"));
    }

    #[test]
    fn file_source_names_the_config_path() {
        let doc: Value = "[server]\nport = 9000\n".parse().expect("toml");
        let source = field_source(
            "server.port",
            &["VELOCITA_TEST_UNSET_KEY_FOR_SOURCE"],
            Some(&doc),
            Some(Path::new("velocita.toml")),
        );
        assert_eq!(source, "file (velocita.toml)");

        let fallback =
            field_source("server.bind_address", &[], Some(&doc), Some(Path::new("velocita.toml")));
        assert_eq!(fallback, "default");
    }
}
