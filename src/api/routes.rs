//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    extract::{rejection::JsonRejection, Extension, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::aggregate::Member;
use crate::domain::{MemberId, OperationContext};
use crate::error::AppError;
use crate::handlers::SignUpCommand;

use super::AppState;

/// Create the API router
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/signup", post(sign_up))
        .route("/members/:member_id", get(get_member))
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

// =========================================================================
// POST /signup
// =========================================================================

/// Register a new member. The response never carries the password.
async fn sign_up(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    payload: Result<Json<SignUpCommand>, JsonRejection>,
) -> Result<(StatusCode, Json<Member>), AppError> {
    let Json(command) = payload.map_err(|e| AppError::InvalidRequest(e.body_text()))?;

    let member = state.signup.execute(command, &context).await?;

    Ok((StatusCode::CREATED, Json(member)))
}

// =========================================================================
// GET /members/:member_id
// =========================================================================

async fn get_member(
    State(state): State<AppState>,
    Path(member_id): Path<i64>,
) -> Result<Json<Member>, AppError> {
    let member_id = MemberId::new(member_id);
    let member = state
        .members
        .find_by_id(member_id)
        .await?
        .ok_or_else(|| AppError::not_found("Member", member_id))?;

    Ok(Json(member))
}
