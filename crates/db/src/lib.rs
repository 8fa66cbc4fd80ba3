pub mod connection;
pub mod fixtures;
pub mod metrics_store;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_config, connect_with_settings, DbPool};
pub use fixtures::{DemoSeedDataset, SeedResult, SeededContact, VerificationResult};
pub use metrics_store::{InMemoryMetricsStore, RepositoryMetricsStore, SqlMetricsStore};
