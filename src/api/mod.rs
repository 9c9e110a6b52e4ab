//! REST endpoints — email processing and assignment status.
//!
//! The process-email endpoint is the same pipeline the inbound worker
//! runs, exposed over HTTP for webhook-style integrations and testing.
//! Business failures come back as `success: false` with the reply text;
//! HTTP errors are reserved for storage failures and unknown routes.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::error;

use crate::pipeline::{EmailProcessor, InboundEmail};
use crate::store::Database;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn Database>,
    pub processor: Arc<EmailProcessor>,
}

/// Build the Axum router with the REST routes.
pub fn api_routes(db: Arc<dyn Database>, processor: Arc<EmailProcessor>) -> Router {
    let state = AppState { db, processor };

    Router::new()
        .route("/health", get(health))
        .route("/api/process-email", post(process_email))
        .route("/api/assignments", get(list_assignments))
        .route("/api/assignments/{code}/status", get(assignment_status))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "assignment-helper"
    }))
}

// ── Process email ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ProcessEmailRequest {
    subject: String,
    body: String,
    from_email: String,
    to_email: String,
    message_id: String,
}

async fn process_email(
    State(state): State<AppState>,
    Json(req): Json<ProcessEmailRequest>,
) -> impl IntoResponse {
    let inbound = InboundEmail {
        subject: req.subject,
        body: req.body,
        from_email: req.from_email,
        to_emails: vec![req.to_email],
        message_id: req.message_id,
    };

    match state.processor.process(&inbound).await {
        Ok(reply) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": reply.outcome.is_success(),
                "response": reply.response,
            })),
        ),
        Err(e) => {
            error!("Failed to process email: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "success": false,
                    "response": "Internal error processing email.",
                })),
            )
        }
    }
}

// ── Assignments ─────────────────────────────────────────────────────

async fn list_assignments(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.list_assignments().await {
        Ok(assignments) => (StatusCode::OK, Json(serde_json::json!(assignments))),
        Err(e) => {
            error!("Failed to list assignments: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Failed to list assignments"})),
            )
        }
    }
}

async fn assignment_status(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> impl IntoResponse {
    let assignment = match state.db.find_assignment_by_code(&code).await {
        Ok(Some(a)) => a,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({"error": format!("Assignment {code} not found")})),
            );
        }
        Err(e) => {
            error!("Failed to look up assignment {code}: {e}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Failed to look up assignment"})),
            );
        }
    };

    let submissions = match state.db.submissions_by_assignment(&assignment.id).await {
        Ok(subs) => subs,
        Err(e) => {
            error!("Failed to list submissions for {code}: {e}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Failed to list submissions"})),
            );
        }
    };

    let submission_views: Vec<serde_json::Value> = submissions
        .iter()
        .map(|s| {
            serde_json::json!({
                "student_id": s.student_id,
                "received_at": s.received_at,
                "on_time": s.on_time,
                "status": s.status,
            })
        })
        .collect();

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "code": assignment.code,
            "title": assignment.title,
            "class_id": assignment.class_id,
            "deadline_at": assignment.deadline_at.format("%Y-%m-%d %H:%M").to_string(),
            "deadline_tz": assignment.deadline_tz,
            "status": assignment.status,
            "submission_count": submission_views.len(),
            "submissions": submission_views,
        })),
    )
}
