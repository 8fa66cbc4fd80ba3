//! Contact metrics endpoints.
//!
//! - read the stored metrics of one contact
//! - recompute one contact on demand
//! - recompute every contact, optionally scoped to an owner
//! - move a quote through its lifecycle and refresh its contact

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;
use velocita_core::domain::contact::{ContactId, ContactMetrics, OwnerId};
use velocita_core::domain::quote::{QuoteId, QuoteStatus};
use velocita_core::errors::{ApplicationError, InterfaceError};
use velocita_core::metrics::{BatchCancellation, RecomputeOutcome, RecomputeScope};
use velocita_db::repositories::{ContactRepository, QuoteRepository};

use crate::bootstrap::Driver;

#[derive(Clone)]
pub struct MetricsApiState {
    driver: Driver,
}

#[derive(Debug, Serialize)]
struct ApiError {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
    correlation_id: String,
}

type ApiFailure = (StatusCode, Json<ApiError>);

#[derive(Debug, Serialize)]
pub struct ContactMetricsResponse {
    pub contact_id: ContactId,
    pub owner_id: OwnerId,
    pub metrics: ContactMetrics,
}

#[derive(Debug, Default, Deserialize)]
pub struct BatchRecomputeRequest {
    #[serde(default)]
    pub owner_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchRecomputeResponse {
    pub correlation_id: String,
    pub updated_count: usize,
    pub failed_ids: Vec<ContactId>,
    pub skipped_count: usize,
    pub cancelled: bool,
}

#[derive(Debug, Deserialize)]
pub struct QuoteStatusRequest {
    pub status: String,
}

/// `contact` is absent when the transition was stored but the contact could
/// not be recomputed; `recompute_error` then says why.
#[derive(Debug, Serialize)]
pub struct QuoteStatusResponse {
    pub quote_id: QuoteId,
    pub status: QuoteStatus,
    pub contact: Option<RecomputeOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recompute_error: Option<String>,
}

pub fn router(driver: Driver) -> Router {
    Router::new()
        .route("/api/v1/contacts/{contact_id}/metrics", get(contact_metrics))
        .route("/api/v1/contacts/{contact_id}/metrics/recompute", post(recompute_contact))
        .route("/api/v1/metrics/recompute", post(recompute_batch))
        .route("/api/v1/quotes/{quote_id}/status", post(transition_quote))
        .with_state(MetricsApiState { driver })
}

async fn contact_metrics(
    Path(contact_id): Path<String>,
    State(state): State<MetricsApiState>,
) -> Result<Json<ContactMetricsResponse>, ApiFailure> {
    let correlation_id = new_correlation_id();
    let contact = state
        .driver
        .store()
        .contacts()
        .find_by_id(&ContactId(contact_id.clone()))
        .await
        .map_err(|error| api_error(error.into(), &correlation_id))?
        .ok_or_else(|| {
            api_error(ApplicationError::not_found("contact", contact_id), &correlation_id)
        })?;

    Ok(Json(ContactMetricsResponse {
        contact_id: contact.id,
        owner_id: contact.owner_id,
        metrics: contact.metrics,
    }))
}

async fn recompute_contact(
    Path(contact_id): Path<String>,
    State(state): State<MetricsApiState>,
) -> Result<Json<RecomputeOutcome>, ApiFailure> {
    let correlation_id = new_correlation_id();
    state
        .driver
        .recompute_contact(&ContactId(contact_id), Utc::now())
        .await
        .map(Json)
        .map_err(|error| api_error(error, &correlation_id))
}

/// A request without a JSON body recomputes every contact.
async fn recompute_batch(
    State(state): State<MetricsApiState>,
    request: Option<Json<BatchRecomputeRequest>>,
) -> Result<Json<BatchRecomputeResponse>, ApiFailure> {
    let correlation_id = new_correlation_id();
    let owner_id = request.and_then(|Json(request)| request.owner_id);
    let scope = RecomputeScope::from_owner(owner_id);

    let summary = state
        .driver
        .recompute_batch(scope, Utc::now(), &BatchCancellation::new())
        .await
        .map_err(|error| api_error(error, &correlation_id))?;

    Ok(Json(BatchRecomputeResponse {
        failed_ids: summary.failed_ids(),
        correlation_id: summary.correlation_id,
        updated_count: summary.updated_count,
        skipped_count: summary.skipped_count,
        cancelled: summary.cancelled,
    }))
}

/// Persists the quote transition first; the contact recompute that follows
/// reads the new status. Once the transition is stored the request succeeds,
/// and a failed recompute is reported in the body rather than as an error
/// status, since the stored metrics catch up on the next batch.
async fn transition_quote(
    Path(quote_id): Path<String>,
    State(state): State<MetricsApiState>,
    Json(request): Json<QuoteStatusRequest>,
) -> Result<Json<QuoteStatusResponse>, ApiFailure> {
    let correlation_id = new_correlation_id();
    let next = request
        .status
        .parse::<QuoteStatus>()
        .map_err(|error| api_error(error.into(), &correlation_id))?;

    let quotes = state.driver.store().quotes();
    let mut quote = quotes
        .find_by_id(&QuoteId(quote_id.clone()))
        .await
        .map_err(|error| api_error(error.into(), &correlation_id))?
        .ok_or_else(|| api_error(ApplicationError::not_found("quote", quote_id), &correlation_id))?;

    let now = Utc::now();
    let previous = quote.status;
    quote.transition_to(next, now).map_err(|error| api_error(error.into(), &correlation_id))?;
    quotes.save(quote.clone()).await.map_err(|error| api_error(error.into(), &correlation_id))?;

    info!(
        event_name = "quote.status.transitioned",
        correlation_id = %correlation_id,
        quote_id = %quote.id,
        contact_id = %quote.contact_id,
        from = %previous,
        to = %next,
        "quote status transitioned"
    );

    let (contact, recompute_error) =
        match state.driver.recompute_contact(&quote.contact_id, now).await {
            Ok(outcome) => (Some(outcome), None),
            Err(error) => {
                warn!(
                    event_name = "quote.status.recompute_failed",
                    correlation_id = %correlation_id,
                    quote_id = %quote.id,
                    contact_id = %quote.contact_id,
                    error = %error,
                    "quote transition stored but contact metrics were not recomputed"
                );
                (None, Some(error.to_string()))
            }
        };

    Ok(Json(QuoteStatusResponse {
        quote_id: quote.id,
        status: quote.status,
        contact,
        recompute_error,
    }))
}

fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

fn api_error(error: ApplicationError, correlation_id: &str) -> ApiFailure {
    let interface = error.into_interface(correlation_id);
    let (status, detail) = match &interface {
        InterfaceError::BadRequest { message, .. } => {
            (StatusCode::BAD_REQUEST, Some(message.clone()))
        }
        InterfaceError::NotFound { message, .. } => (StatusCode::NOT_FOUND, Some(message.clone())),
        InterfaceError::ServiceUnavailable { .. } => (StatusCode::SERVICE_UNAVAILABLE, None),
        InterfaceError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, None),
    };

    if status.is_server_error() {
        warn!(
            event_name = "api.request.failed",
            correlation_id = %correlation_id,
            error = %interface,
            "metrics api request failed"
        );
    }

    (
        status,
        Json(ApiError {
            error: interface.user_message(),
            detail,
            correlation_id: interface.correlation_id().to_string(),
        }),
    )
}
