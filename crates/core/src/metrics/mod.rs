//! Contact metrics engine
//!
//! Derives revenue, conversion, basket and value-score figures for a contact
//! from its quote history, and recomputes them across contacts in batches.
//! Metrics are never updated incrementally: each run replaces the stored
//! figures with values recomputed from the full quote list.

mod classifier;
mod driver;
mod scoring;

pub use classifier::{classify, ClassifiedQuotes};
pub use driver::{
    BatchCancellation, BatchOptions, BatchSummary, FailedContact, MetricsRecomputeDriver,
    MetricsStore, RecomputeOutcome, RecomputeScope,
};
pub use scoring::{
    ScoreCalculator, ScoreCard, ScoringPolicy, ScoringPolicyError, ScoringWeights, SubScores,
};

/// Default sub-score weights; they sum to 1.0 so the value score stays in `[0, 100]`.
pub const DEFAULT_WEIGHTS: ScoringWeights =
    ScoringWeights { monetary: 0.4, recency: 0.3, frequency: 0.2, conversion: 0.1 };

/// Every sub-score is clamped into `[0, MAX_SUB_SCORE]` before weighting.
pub const MAX_SUB_SCORE: f64 = 100.0;

pub const DEFAULT_FREQUENCY_POINTS_PER_QUOTE: f64 = 10.0;

pub const DEFAULT_RECENCY_DAYS_PER_POINT: f64 = 30.0;

/// Revenue divisor for the monetary sub-score, in currency units.
pub const DEFAULT_MONETARY_DIVISOR: i64 = 1000;

pub const DEFAULT_WORKER_LIMIT: usize = 4;
