use axum::{Json, extract::State};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};

use crate::{
    error::ApiError,
    extractors::ValidQuery,
    inspector::{InspectorCursor, ListParams, list_anomalies, list_processed_events},
    state::AppState,
    types::{ListAnomaliesResponse, ListProcessedEventsResponse},
};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    limit: Option<i64>,
    before: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CursorPayload {
    at: String,
    id: String,
}

pub async fn list_processed_events_handler<S>(
    State(state): State<AppState<S>>,
    ValidQuery(query): ValidQuery<ListQuery>,
) -> Result<Json<ListProcessedEventsResponse>, ApiError> {
    let params = list_params(query)?;
    let page = list_processed_events(&state.pool, &params).await?;
    let next_before = page.next_before.as_ref().map(encode_cursor).transpose()?;

    Ok(Json(ListProcessedEventsResponse {
        events: page.items,
        next_before,
    }))
}

pub async fn list_anomalies_handler<S>(
    State(state): State<AppState<S>>,
    ValidQuery(query): ValidQuery<ListQuery>,
) -> Result<Json<ListAnomaliesResponse>, ApiError> {
    let params = list_params(query)?;
    let page = list_anomalies(&state.pool, &params).await?;
    let next_before = page.next_before.as_ref().map(encode_cursor).transpose()?;

    Ok(Json(ListAnomaliesResponse {
        anomalies: page.items,
        next_before,
    }))
}

fn list_params(query: ListQuery) -> Result<ListParams, ApiError> {
    let limit = parse_limit(query.limit)?;
    let before = match query.before {
        Some(raw) => Some(decode_cursor(&raw)?),
        None => None,
    };
    Ok(ListParams { limit, before })
}

fn parse_limit(limit: Option<i64>) -> Result<i64, ApiError> {
    let limit = limit.unwrap_or(50);
    if !(1..=200).contains(&limit) {
        return Err(ApiError::validation("limit must be between 1 and 200"));
    }
    Ok(limit)
}

fn decode_cursor(raw: &str) -> Result<InspectorCursor, ApiError> {
    let invalid = || ApiError::validation("before must be a valid cursor");
    let decoded = URL_SAFE_NO_PAD.decode(raw).map_err(|_| invalid())?;
    let payload: CursorPayload = serde_json::from_slice(&decoded).map_err(|_| invalid())?;
    chrono::DateTime::parse_from_rfc3339(&payload.at).map_err(|_| invalid())?;
    Ok(InspectorCursor {
        at: payload.at,
        id: payload.id,
    })
}

fn encode_cursor(cursor: &InspectorCursor) -> Result<String, ApiError> {
    let payload = CursorPayload {
        at: cursor.at.clone(),
        id: cursor.id.clone(),
    };
    let encoded = serde_json::to_vec(&payload)
        .map_err(|_| ApiError::Internal("failed to encode cursor".to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(encoded))
}
