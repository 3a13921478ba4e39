//! REST API handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use kolab_core::HealthStatus;
use kolab_guard::{retry_message, sanitize_text, RateLimitResult};
use kolab_presence_sdk::{presence_channel_name, PresenceRecord, PresenceSnapshot};
use kolab_reporting::config::ERROR_REPORT_BUCKET;
use kolab_reporting::delivery::send_report;
use kolab_reporting::{fingerprint, ErrorPayload};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::AppState;

/// Longest room or participant key accepted from clients.
pub const MAX_KEY_CHARS: usize = 128;

const ANONYMOUS_SESSION: &str = "anonymous";

/// Generic API response
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }

    pub fn error(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: false,
            data: None,
            error: Some(message.into()),
        })
    }

    /// Failure that still carries machine-readable detail.
    pub fn rejected(data: T, message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: false,
            data: Some(data),
            error: Some(message.into()),
        })
    }
}

// Health check
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthStatus> {
    Json(state.health())
}

pub async fn ready_check(State(state): State<Arc<AppState>>) -> Response {
    let readiness = state.readiness().await;
    let status = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(readiness)).into_response()
}

// Presence rooms
#[derive(Debug, Serialize)]
pub struct RoomResponse {
    pub room: String,
    pub online_count: usize,
    pub participants: Vec<PresenceRecord>,
}

pub async fn get_room(State(state): State<Arc<AppState>>, Path(room): Path<String>) -> Response {
    let room = sanitize_text(&room, MAX_KEY_CHARS);
    if room.is_empty() {
        return (StatusCode::BAD_REQUEST, ApiResponse::<()>::error("room is required")).into_response();
    }

    let snapshot = PresenceSnapshot::from_state(&state.hub.state(&presence_channel_name(&room)));
    let mut participants: Vec<PresenceRecord> =
        snapshot.iter().map(|(_, record)| record.clone()).collect();
    participants.sort_by(|a, b| a.participant_id.cmp(&b.participant_id));

    ApiResponse::success(RoomResponse {
        room,
        online_count: snapshot.online_count(),
        participants,
    })
    .into_response()
}

// Error reports
#[derive(Debug, Deserialize)]
pub struct ReportRequest {
    pub payload: ErrorPayload,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReportAccepted {
    pub fingerprint: String,
    pub persisted: bool,
    pub notified: bool,
}

#[derive(Debug, Serialize)]
pub struct RetryAfter {
    pub retry_after_ms: u64,
}

pub async fn submit_report(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ReportRequest>,
) -> Response {
    let mut payload = req.payload;
    let computed = fingerprint(&payload.message, &payload.url, &payload.user_agent);
    if payload.fingerprint != computed {
        debug!(
            claimed = %payload.fingerprint,
            fingerprint = %computed,
            "Replacing client-supplied fingerprint"
        );
        payload.fingerprint = computed;
    }

    let session = payload.session_id.trim();
    let key = if session.is_empty() { ANONYMOUS_SESSION } else { session };

    if let RateLimitResult::Exceeded { retry_after } = state.limits.bucket(ERROR_REPORT_BUCKET).check(key) {
        state.reports_rejected.inc();
        info!(
            session_id = %key,
            retry_after_ms = retry_after.as_millis() as u64,
            "Error report rate limited"
        );
        let body = RetryAfter {
            retry_after_ms: retry_after.as_millis() as u64,
        };
        return (
            StatusCode::TOO_MANY_REQUESTS,
            ApiResponse::rejected(body, retry_message(retry_after)),
        )
            .into_response();
    }

    let report = send_report(
        state.store.as_ref(),
        state.dispatcher.as_ref(),
        &state.reporting,
        &payload,
        req.description.as_deref(),
    )
    .await;
    state.reports_accepted.inc();

    (
        StatusCode::ACCEPTED,
        ApiResponse::success(ReportAccepted {
            fingerprint: payload.fingerprint,
            persisted: report.persisted,
            notified: report.notified,
        }),
    )
        .into_response()
}
