use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metrics::{BatchOptions, ScoringPolicy, ScoringWeights, DEFAULT_WORKER_LIMIT};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct MetricsConfig {
    pub monetary_divisor: Decimal,
    pub frequency_points_per_quote: f64,
    pub recency_days_per_point: f64,
    pub weight_monetary: f64,
    pub weight_recency: f64,
    pub weight_frequency: f64,
    pub weight_conversion: f64,
    /// Upper bound on contacts recomputed concurrently by one batch.
    pub worker_limit: usize,
    /// Period of the server's background batch; zero disables it.
    pub batch_interval_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub server_port: Option<u16>,
    pub metrics_worker_limit: Option<usize>,
    pub metrics_batch_interval_secs: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for MetricsConfig {
    fn default() -> Self {
        let policy = ScoringPolicy::default();
        Self {
            monetary_divisor: policy.monetary_divisor,
            frequency_points_per_quote: policy.frequency_points_per_quote,
            recency_days_per_point: policy.recency_days_per_point,
            weight_monetary: policy.weights.monetary,
            weight_recency: policy.weights.recency,
            weight_frequency: policy.weights.frequency,
            weight_conversion: policy.weights.conversion,
            worker_limit: DEFAULT_WORKER_LIMIT,
            batch_interval_secs: 0,
        }
    }
}

impl MetricsConfig {
    pub fn scoring_policy(&self) -> ScoringPolicy {
        ScoringPolicy {
            weights: ScoringWeights {
                monetary: self.weight_monetary,
                recency: self.weight_recency,
                frequency: self.weight_frequency,
                conversion: self.weight_conversion,
            },
            monetary_divisor: self.monetary_divisor,
            frequency_points_per_quote: self.frequency_points_per_quote,
            recency_days_per_point: self.recency_days_per_point,
        }
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions { worker_limit: self.worker_limit }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://velocita.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            metrics: MetricsConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("velocita.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(metrics) = patch.metrics {
            if let Some(monetary_divisor) = metrics.monetary_divisor {
                self.metrics.monetary_divisor = monetary_divisor;
            }
            if let Some(points) = metrics.frequency_points_per_quote {
                self.metrics.frequency_points_per_quote = points;
            }
            if let Some(days) = metrics.recency_days_per_point {
                self.metrics.recency_days_per_point = days;
            }
            if let Some(weight) = metrics.weight_monetary {
                self.metrics.weight_monetary = weight;
            }
            if let Some(weight) = metrics.weight_recency {
                self.metrics.weight_recency = weight;
            }
            if let Some(weight) = metrics.weight_frequency {
                self.metrics.weight_frequency = weight;
            }
            if let Some(weight) = metrics.weight_conversion {
                self.metrics.weight_conversion = weight;
            }
            if let Some(worker_limit) = metrics.worker_limit {
                self.metrics.worker_limit = worker_limit;
            }
            if let Some(batch_interval_secs) = metrics.batch_interval_secs {
                self.metrics.batch_interval_secs = batch_interval_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("VELOCITA_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("VELOCITA_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_env("VELOCITA_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("VELOCITA_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_env("VELOCITA_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("VELOCITA_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("VELOCITA_SERVER_PORT") {
            self.server.port = parse_env("VELOCITA_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("VELOCITA_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_env("VELOCITA_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("VELOCITA_METRICS_MONETARY_DIVISOR") {
            self.metrics.monetary_divisor =
                parse_env("VELOCITA_METRICS_MONETARY_DIVISOR", &value)?;
        }
        if let Some(value) = read_env("VELOCITA_METRICS_FREQUENCY_POINTS_PER_QUOTE") {
            self.metrics.frequency_points_per_quote =
                parse_env("VELOCITA_METRICS_FREQUENCY_POINTS_PER_QUOTE", &value)?;
        }
        if let Some(value) = read_env("VELOCITA_METRICS_RECENCY_DAYS_PER_POINT") {
            self.metrics.recency_days_per_point =
                parse_env("VELOCITA_METRICS_RECENCY_DAYS_PER_POINT", &value)?;
        }
        if let Some(value) = read_env("VELOCITA_METRICS_WEIGHT_MONETARY") {
            self.metrics.weight_monetary = parse_env("VELOCITA_METRICS_WEIGHT_MONETARY", &value)?;
        }
        if let Some(value) = read_env("VELOCITA_METRICS_WEIGHT_RECENCY") {
            self.metrics.weight_recency = parse_env("VELOCITA_METRICS_WEIGHT_RECENCY", &value)?;
        }
        if let Some(value) = read_env("VELOCITA_METRICS_WEIGHT_FREQUENCY") {
            self.metrics.weight_frequency =
                parse_env("VELOCITA_METRICS_WEIGHT_FREQUENCY", &value)?;
        }
        if let Some(value) = read_env("VELOCITA_METRICS_WEIGHT_CONVERSION") {
            self.metrics.weight_conversion =
                parse_env("VELOCITA_METRICS_WEIGHT_CONVERSION", &value)?;
        }
        if let Some(value) = read_env("VELOCITA_METRICS_WORKER_LIMIT") {
            self.metrics.worker_limit = parse_env("VELOCITA_METRICS_WORKER_LIMIT", &value)?;
        }
        if let Some(value) = read_env("VELOCITA_METRICS_BATCH_INTERVAL_SECS") {
            self.metrics.batch_interval_secs =
                parse_env("VELOCITA_METRICS_BATCH_INTERVAL_SECS", &value)?;
        }

        let log_level =
            read_env("VELOCITA_LOGGING_LEVEL").or_else(|| read_env("VELOCITA_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("VELOCITA_LOGGING_FORMAT").or_else(|| read_env("VELOCITA_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(worker_limit) = overrides.metrics_worker_limit {
            self.metrics.worker_limit = worker_limit;
        }
        if let Some(batch_interval_secs) = overrides.metrics_batch_interval_secs {
            self.metrics.batch_interval_secs = batch_interval_secs;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_metrics(&self.metrics)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// First existing config file: explicit path, then `VELOCITA_CONFIG`, then the default locations.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    if let Some(path) = read_env("VELOCITA_CONFIG").map(PathBuf::from) {
        return path.exists().then_some(path);
    }

    [PathBuf::from("velocita.toml"), PathBuf::from("config/velocita.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_metrics(metrics: &MetricsConfig) -> Result<(), ConfigError> {
    if metrics.worker_limit == 0 {
        return Err(ConfigError::Validation(
            "metrics.worker_limit must be greater than zero".to_string(),
        ));
    }

    metrics
        .scoring_policy()
        .validate()
        .map_err(|error| ConfigError::Validation(format!("metrics.{error}")))
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    metrics: Option<MetricsPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct MetricsPatch {
    monetary_divisor: Option<Decimal>,
    frequency_points_per_quote: Option<f64>,
    recency_days_per_point: Option<f64>,
    weight_monetary: Option<f64>,
    weight_recency: Option<f64>,
    weight_frequency: Option<f64>,
    weight_conversion: Option<f64>,
    worker_limit: Option<usize>,
    batch_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
