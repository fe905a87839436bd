// ============================
// crates/backend-lib/src/handlers/accounts.rs
// ============================
//! Account and session endpoints under `/api/v1/accounts`.
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use lightnovel_common::{
    AuthCredentials, ChangePasswordRequest, DeleteAccountRequest, SessionInfo, SessionRequest,
    UpdateMetadataRequest, UserView,
};

use crate::auth::SessionToken;
use crate::error::{AppError, AppResult};
use crate::middleware::{AuthState, ClientKey, CurrentSession};
use crate::storage::Storage;
use crate::AppState;

type Shared<S> = State<Arc<AppState<S>>>;

pub async fn register<S: Storage + 'static>(
    State(state): Shared<S>,
    payload: Result<Json<AuthCredentials>, JsonRejection>,
) -> AppResult<(StatusCode, Json<SessionInfo>)> {
    let Json(credentials) = payload?;
    let info = state.auth.register(credentials).await?;
    Ok((StatusCode::CREATED, Json(info)))
}

pub async fn login<S: Storage + 'static>(
    State(state): Shared<S>,
    ClientKey(client): ClientKey,
    payload: Result<Json<AuthCredentials>, JsonRejection>,
) -> AppResult<Json<SessionInfo>> {
    let Json(credentials) = payload?;
    Ok(Json(state.auth.login(credentials, &client).await?))
}

/// Always succeeds for a well-formed token, known or not
pub async fn logout<S: Storage + 'static>(
    State(state): Shared<S>,
    payload: Result<Json<SessionRequest>, JsonRejection>,
) -> AppResult<StatusCode> {
    let Json(request) = payload?;
    state.auth.logout(&request.session).await?;
    Ok(StatusCode::OK)
}

/// A token of the wrong shape is a bad request; a well-formed unknown one is 401
pub async fn renew<S: Storage + 'static>(
    State(state): Shared<S>,
    auth: AuthState,
    payload: Result<Json<SessionRequest>, JsonRejection>,
) -> AppResult<Json<SessionInfo>> {
    let Json(request) = payload?;
    request.session.parse::<SessionToken>()?;
    let session = auth.session().ok_or(AppError::Unauthorized)?;
    Ok(Json(state.auth.renew(session).await?))
}

pub async fn change_password<S: Storage + 'static>(
    State(state): Shared<S>,
    CurrentSession(session): CurrentSession,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> AppResult<Json<SessionInfo>> {
    let Json(request) = payload?;
    let info = state
        .auth
        .change_password(&session, request.old_password, request.new_password)
        .await?;
    Ok(Json(info))
}

pub async fn delete_account<S: Storage + 'static>(
    State(state): Shared<S>,
    CurrentSession(session): CurrentSession,
    payload: Result<Json<DeleteAccountRequest>, JsonRejection>,
) -> AppResult<StatusCode> {
    let Json(request) = payload?;
    state.auth.delete_account(&session, request.password).await?;
    Ok(StatusCode::OK)
}

pub async fn view_self<S: Storage + 'static>(
    State(state): Shared<S>,
    CurrentSession(session): CurrentSession,
) -> AppResult<Json<UserView>> {
    Ok(Json(state.auth.view_self(&session).await?))
}

pub async fn update_metadata<S: Storage + 'static>(
    State(state): Shared<S>,
    CurrentSession(session): CurrentSession,
    payload: Result<Json<UpdateMetadataRequest>, JsonRejection>,
) -> AppResult<Json<UserView>> {
    let Json(request) = payload?;
    Ok(Json(
        state.auth.update_metadata(&session, request.metadata).await?,
    ))
}

pub async fn user_view<S: Storage + 'static>(
    State(state): Shared<S>,
    Path(username): Path<String>,
) -> AppResult<Json<UserView>> {
    Ok(Json(state.auth.user_view(&username).await?))
}
