pub mod config;
pub mod domain;
pub mod errors;
pub mod metrics;

pub use domain::contact::{Contact, ContactId, ContactMetrics, Owner, OwnerId};
pub use domain::quote::{Quote, QuoteId, QuoteStatus};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use metrics::{
    classify, BatchCancellation, BatchOptions, BatchSummary, ClassifiedQuotes, FailedContact,
    MetricsRecomputeDriver, MetricsStore, RecomputeOutcome, RecomputeScope, ScoreCalculator,
    ScoreCard, ScoringPolicy, ScoringWeights, SubScores,
};
