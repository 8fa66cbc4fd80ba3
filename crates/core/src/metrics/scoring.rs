//! Per-contact metric derivation and the RFM-style value score.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::classifier::{classify, ClassifiedQuotes};
use super::{
    DEFAULT_FREQUENCY_POINTS_PER_QUOTE, DEFAULT_MONETARY_DIVISOR, DEFAULT_RECENCY_DAYS_PER_POINT,
    DEFAULT_WEIGHTS, MAX_SUB_SCORE,
};
use crate::domain::contact::ContactMetrics;
use crate::domain::quote::Quote;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;
const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Weights for the value-score components
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// Weight for monetary score (default: 0.40)
    pub monetary: f64,
    /// Weight for recency score (default: 0.30)
    pub recency: f64,
    /// Weight for frequency score (default: 0.20)
    pub frequency: f64,
    /// Weight for conversion score (default: 0.10)
    pub conversion: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        DEFAULT_WEIGHTS
    }
}

impl ScoringWeights {
    pub fn sum(&self) -> f64 {
        self.monetary + self.recency + self.frequency + self.conversion
    }
}

/// Tunable constants of the scoring formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringPolicy {
    pub weights: ScoringWeights,
    /// `monetary = min(100, revenue / monetary_divisor)`
    pub monetary_divisor: Decimal,
    /// `frequency = min(100, accepted * frequency_points_per_quote)`
    pub frequency_points_per_quote: f64,
    /// `recency = 100 - days_since_purchase / recency_days_per_point`
    pub recency_days_per_point: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            weights: DEFAULT_WEIGHTS,
            monetary_divisor: Decimal::new(DEFAULT_MONETARY_DIVISOR, 0),
            frequency_points_per_quote: DEFAULT_FREQUENCY_POINTS_PER_QUOTE,
            recency_days_per_point: DEFAULT_RECENCY_DAYS_PER_POINT,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ScoringPolicyError {
    #[error("weights must all be finite and non-negative")]
    NegativeWeight,
    #[error("weights must sum to 1.0 (got {0})")]
    WeightSum(f64),
    #[error("monetary_divisor must be greater than zero")]
    MonetaryDivisor,
    #[error("frequency_points_per_quote must be greater than zero")]
    FrequencyPoints,
    #[error("recency_days_per_point must be greater than zero")]
    RecencyDays,
}

impl ScoringPolicy {
    pub fn validate(&self) -> Result<(), ScoringPolicyError> {
        let weights = [
            self.weights.monetary,
            self.weights.recency,
            self.weights.frequency,
            self.weights.conversion,
        ];
        if weights.iter().any(|weight| !weight.is_finite() || *weight < 0.0) {
            return Err(ScoringPolicyError::NegativeWeight);
        }

        let sum = self.weights.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ScoringPolicyError::WeightSum(sum));
        }

        if self.monetary_divisor <= Decimal::ZERO {
            return Err(ScoringPolicyError::MonetaryDivisor);
        }
        if !(self.frequency_points_per_quote.is_finite() && self.frequency_points_per_quote > 0.0)
        {
            return Err(ScoringPolicyError::FrequencyPoints);
        }
        if !(self.recency_days_per_point.is_finite() && self.recency_days_per_point > 0.0) {
            return Err(ScoringPolicyError::RecencyDays);
        }

        Ok(())
    }
}

/// Component scores, each in `[0, 100]`, before weighting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub recency: f64,
    pub frequency: f64,
    pub monetary: f64,
    pub conversion: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreCard {
    pub metrics: ContactMetrics,
    pub sub_scores: SubScores,
}

/// Score calculator for contact metrics
#[derive(Debug, Clone, Default)]
pub struct ScoreCalculator {
    policy: ScoringPolicy,
}

impl ScoreCalculator {
    /// Create a new score calculator with the default policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with a custom policy
    pub fn with_policy(policy: ScoringPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    pub fn score_quotes(&self, quotes: &[Quote], now: DateTime<Utc>) -> ScoreCard {
        self.score(&classify(quotes), now)
    }

    /// Derives every metric of one contact. Total for any input: divisions are
    /// guarded by the emptiness of the partitions and revenue saturates at
    /// `Decimal::MAX` instead of overflowing.
    pub fn score(&self, classified: &ClassifiedQuotes<'_>, now: DateTime<Utc>) -> ScoreCard {
        let accepted_count = classified.accepted_count();

        let total_revenue = classified.accepted.iter().fold(Decimal::ZERO, |sum, quote| {
            sum.checked_add(quote.total).unwrap_or(Decimal::MAX)
        });

        let conversion_rate = if classified.sent.is_empty() {
            0.0
        } else {
            clamp_score(accepted_count as f64 / classified.sent_count() as f64 * 100.0)
        };

        let average_basket = if accepted_count == 0 {
            Decimal::ZERO
        } else {
            (total_revenue / Decimal::from(accepted_count))
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        };

        // ACCEPTED without a timestamp happens in imported data; such quotes
        // still count as revenue but carry no recency.
        let last_purchase_at =
            classified.accepted.iter().filter_map(|quote| quote.accepted_at).max();

        let sub_scores = SubScores {
            recency: self.recency_score(last_purchase_at, now),
            frequency: self.frequency_score(accepted_count),
            monetary: self.monetary_score(total_revenue),
            conversion: conversion_rate,
        };

        ScoreCard {
            metrics: ContactMetrics {
                total_revenue,
                conversion_rate: round_hundredths(conversion_rate),
                average_basket,
                value_score: round_hundredths(self.value_score(&sub_scores)),
                last_purchase_at,
            },
            sub_scores,
        }
    }

    /// Linear decay of one point per `recency_days_per_point` days. A purchase
    /// dated in the future scores as a purchase made now.
    pub fn recency_score(
        &self,
        last_purchase_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> f64 {
        let Some(last_purchase_at) = last_purchase_at else {
            return 0.0;
        };

        let days_since = (now - last_purchase_at).num_milliseconds() as f64 / MILLIS_PER_DAY;
        clamp_score(MAX_SUB_SCORE - days_since / self.policy.recency_days_per_point)
    }

    pub fn frequency_score(&self, accepted_count: usize) -> f64 {
        clamp_score(accepted_count as f64 * self.policy.frequency_points_per_quote)
    }

    pub fn monetary_score(&self, total_revenue: Decimal) -> f64 {
        if self.policy.monetary_divisor <= Decimal::ZERO {
            return 0.0;
        }

        let ratio = total_revenue
            .checked_div(self.policy.monetary_divisor)
            .and_then(|ratio| ratio.to_f64())
            .unwrap_or(MAX_SUB_SCORE);
        clamp_score(ratio)
    }

    pub fn value_score(&self, sub_scores: &SubScores) -> f64 {
        let weights = &self.policy.weights;
        let total = sub_scores.monetary * weights.monetary
            + sub_scores.recency * weights.recency
            + sub_scores.frequency * weights.frequency
            + sub_scores.conversion * weights.conversion;

        clamp_score(total)
    }
}

fn clamp_score(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, MAX_SUB_SCORE)
}

fn round_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
