// ============================
// lightnovel-backend/src/router.rs
// ============================
//! HTTP router and middleware stack.
use std::sync::Arc;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, patch, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers::{accounts, health};
use crate::middleware::{authenticate, rate_limit};
use crate::storage::Storage;
use crate::AppState;

/// Build the application router.
///
/// Layers, outermost first: CORS, request tracing, per-client rate limit,
/// and session resolution on the account routes.
pub fn create_router<S: Storage + 'static>(state: Arc<AppState<S>>) -> Router {
    let accounts = Router::new()
        .route("/register", post(accounts::register::<S>))
        .route("/login", post(accounts::login::<S>))
        .route("/logout", post(accounts::logout::<S>))
        .route("/renew", post(accounts::renew::<S>))
        .route("/changepassword", post(accounts::change_password::<S>))
        .route("/delete", post(accounts::delete_account::<S>))
        .route("/self", post(accounts::view_self::<S>))
        .route("/update", patch(accounts::update_metadata::<S>))
        .route("/{username}", get(accounts::user_view::<S>))
        .layer(from_fn_with_state(Arc::clone(&state), authenticate::<S>));

    Router::new()
        .route("/health", get(health::health))
        .nest("/api/v1/accounts", accounts)
        .layer(from_fn_with_state(Arc::clone(&state), rate_limit::<S>))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
