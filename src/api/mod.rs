//! API module
//!
//! HTTP endpoints and middleware. Only sign-up and member lookup are exposed.

pub mod middleware;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::audit::AuditLogService;
use crate::handlers::SignUpHandler;
use crate::repository::MemberRepository;

pub use routes::create_router;

/// Shared state of the HTTP layer
#[derive(Clone)]
pub struct AppState {
    pub members: Arc<dyn MemberRepository>,
    pub signup: SignUpHandler,
}

impl AppState {
    pub fn new(members: Arc<dyn MemberRepository>, audit: AuditLogService) -> Self {
        Self {
            signup: SignUpHandler::new(members.clone(), audit),
            members,
        }
    }
}

/// Build the application router with its middleware stack
pub fn build_router(state: AppState) -> Router {
    // Last added runs first: trace -> context -> logging -> handler
    create_router()
        .layer(axum::middleware::from_fn(middleware::logging_middleware))
        .layer(axum::middleware::from_fn(middleware::context_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
