//! Ticket API handlers.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use brt_core::{Amount, CreateTicketRequest, Ticket, TicketFilter, TicketPatch, TicketStatus};

use super::middleware::AuthUser;
use super::ApiError;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for creating a ticket
#[derive(Debug, Deserialize)]
pub struct CreateTicketBody {
    #[serde(alias = "reserved_amount")]
    pub amount: Amount,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Request body for updating a ticket. Status cannot be set directly.
#[derive(Debug, Deserialize)]
pub struct UpdateTicketBody {
    #[serde(default, alias = "reserved_amount")]
    pub amount: Option<Amount>,
    /// Absent leaves the expiry alone; `null` clears it.
    #[serde(default, deserialize_with = "present")]
    pub expires_at: Option<Option<DateTime<Utc>>>,
}

/// Distinguish an explicit `null` from a missing field.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Request body for redeeming a ticket
#[derive(Debug, Deserialize)]
pub struct RedeemTicketBody {
    #[serde(alias = "brt_code", alias = "code")]
    pub reservation_code: String,
}

/// Query parameters for listing tickets
#[derive(Debug, Deserialize)]
pub struct ListTicketsParams {
    pub status: Option<String>,
    pub owner: Option<String>,
    /// Substring of the code
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Response for listing tickets
#[derive(Debug, Serialize)]
pub struct ListTicketsResponse {
    pub tickets: Vec<Ticket>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

// ============================================================================
// Handlers
// ============================================================================

/// Issue a new ticket owned by the caller
pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Ticket>), ApiError> {
    let Json(raw) = body?;
    let body: CreateTicketBody = serde_json::from_value(raw)
        .map_err(|e| ApiError::Validation(format!("invalid ticket: {}", e)))?;

    let ticket = state.tickets().create(CreateTicketRequest {
        owner_id: user_id,
        amount: body.amount,
        expires_at: body.expires_at,
    })?;

    Ok((StatusCode::CREATED, Json(ticket)))
}

/// List tickets, newest first
pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    params: Result<Query<ListTicketsParams>, QueryRejection>,
) -> Result<Json<ListTicketsResponse>, ApiError> {
    let Query(params) = params?;

    let mut filter = TicketFilter::new()
        .with_limit(params.limit.unwrap_or(TicketFilter::DEFAULT_LIMIT))
        .with_offset(params.offset.unwrap_or(0));

    if let Some(status) = params.status.as_deref().filter(|s| !s.is_empty()) {
        let status: TicketStatus = status
            .parse()
            .map_err(|_| ApiError::Validation(format!("unknown status: {}", status)))?;
        filter = filter.with_status(status);
    }
    if let Some(owner) = params.owner.filter(|o| !o.is_empty()) {
        filter = filter.with_owner(owner);
    }
    if let Some(search) = params.search.filter(|s| !s.trim().is_empty()) {
        filter = filter.with_search(search.trim());
    }

    let page = state.tickets().list(&filter)?;

    Ok(Json(ListTicketsResponse {
        tickets: page.tickets,
        total: page.total,
        limit: filter.limit,
        offset: filter.offset,
    }))
}

/// Get one of the caller's tickets
pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Ticket>, ApiError> {
    Ok(Json(state.tickets().get(&id, &user_id)?))
}

/// Change amount and/or expiry of one of the caller's active tickets
pub async fn update_ticket(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Ticket>, ApiError> {
    let Json(raw) = body?;

    if raw.get("status").is_some() {
        return Err(ApiError::Validation(
            "status cannot be changed directly".to_string(),
        ));
    }
    let body: UpdateTicketBody = serde_json::from_value(raw)
        .map_err(|e| ApiError::Validation(format!("invalid update: {}", e)))?;

    let patch = TicketPatch {
        amount: body.amount,
        expires_at: body.expires_at,
    };
    Ok(Json(state.tickets().update(&id, &user_id, patch)?))
}

/// Delete one of the caller's tickets
pub async fn delete_ticket(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Ticket>, ApiError> {
    Ok(Json(state.tickets().delete(&id, &user_id)?))
}

/// Redeem a ticket by its code
pub async fn redeem_ticket(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    body: Result<Json<RedeemTicketBody>, JsonRejection>,
) -> Result<Json<Ticket>, ApiError> {
    let Json(body) = body?;
    Ok(Json(
        state.tickets().redeem(&body.reservation_code, &user_id)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_body_distinguishes_null_from_missing() {
        let missing: UpdateTicketBody = serde_json::from_str(r#"{"amount": "5.00"}"#).unwrap();
        assert!(missing.expires_at.is_none());
        assert_eq!(missing.amount.unwrap().to_string(), "5.00");

        let cleared: UpdateTicketBody = serde_json::from_str(r#"{"expires_at": null}"#).unwrap();
        assert_eq!(cleared.expires_at, Some(None));

        let set: UpdateTicketBody =
            serde_json::from_str(r#"{"expires_at": "2030-01-01T00:00:00Z"}"#).unwrap();
        assert!(matches!(set.expires_at, Some(Some(_))));
    }

    #[test]
    fn test_create_body_accepts_numeric_amount() {
        let body: CreateTicketBody = serde_json::from_str(r#"{"amount": 50}"#).unwrap();
        assert_eq!(body.amount.to_string(), "50.00");
        assert!(body.expires_at.is_none());

        let legacy: CreateTicketBody =
            serde_json::from_str(r#"{"reserved_amount": "12.5"}"#).unwrap();
        assert_eq!(legacy.amount.to_string(), "12.50");
    }
}
