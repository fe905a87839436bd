// crates/backend-lib/src/middleware/auth.rs

//! Resolves the `session` field of each request body into an [`AuthState`].
//!
//! The middleware never rejects a request for lack of a session; handlers
//! that need one ask for [`CurrentSession`].

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{FromRequestParts, State},
    http::{request::Parts, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::auth::Session;
use crate::error::AppError;
use crate::storage::Storage;
use crate::AppState;

/// Largest request body buffered while looking for a session token
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Identity attached to every request
#[derive(Debug, Clone, Default)]
pub enum AuthState {
    #[default]
    Unauthenticated,
    Authenticated(Session),
}

impl AuthState {
    pub fn session(&self) -> Option<&Session> {
        match self {
            AuthState::Authenticated(session) => Some(session),
            AuthState::Unauthenticated => None,
        }
    }
}

/// The only part of a body this middleware looks at
#[derive(Debug, Deserialize)]
struct SessionField {
    #[serde(default)]
    session: Option<String>,
}

fn session_token(body: &Bytes) -> Option<String> {
    serde_json::from_slice::<SessionField>(body)
        .ok()
        .and_then(|field| field.session)
}

/// Attach an [`AuthState`] to the request, then hand it on unchanged
pub async fn authenticate<S: Storage + 'static>(
    State(state): State<Arc<AppState<S>>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return AppError::InvalidInput(format!("unreadable request body: {e}"))
                .into_response()
        },
    };

    let auth = match session_token(&bytes) {
        Some(token) => match state.auth.resolve_session(&token).await {
            Ok(Some(session)) => AuthState::Authenticated(session),
            Ok(None) => AuthState::Unauthenticated,
            Err(e) => {
                tracing::warn!(error = %e, "session lookup failed, continuing unauthenticated");
                AuthState::Unauthenticated
            },
        },
        None => AuthState::Unauthenticated,
    };

    let mut request = Request::from_parts(parts, Body::from(bytes));
    request.extensions_mut().insert(auth);
    next.run(request).await
}

impl<St: Send + Sync> FromRequestParts<St> for AuthState {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<AuthState>().cloned().unwrap_or_default())
    }
}

/// Extractor for handlers that require a live session
#[derive(Debug, Clone)]
pub struct CurrentSession(pub Session);

impl<St: Send + Sync> FromRequestParts<St> for CurrentSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<AuthState>() {
            Some(AuthState::Authenticated(session)) => Ok(CurrentSession(session.clone())),
            _ => Err(AppError::Unauthorized),
        }
    }
}
