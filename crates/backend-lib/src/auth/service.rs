use async_trait::async_trait;
use lightnovel_common::{AuthCredentials, SessionInfo, UserMetadata, UserView};

use super::Session;
use crate::error::AppResult;

/// Account and session operations behind the HTTP handlers.
///
/// Methods taking a [`Session`] expect one already resolved by the
/// authentication middleware.
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Create an account and log its first device in
    async fn register(&self, credentials: AuthCredentials) -> AppResult<SessionInfo>;

    /// Check credentials and open a session; `client` keys the lockout counter
    async fn login(&self, credentials: AuthCredentials, client: &str) -> AppResult<SessionInfo>;

    /// Drop a session; unknown tokens succeed
    async fn logout(&self, token: &str) -> AppResult<()>;

    /// Swap a session for a new one, invalidating the old token
    async fn renew(&self, session: &Session) -> AppResult<SessionInfo>;

    /// Map a wire token to a live session, `None` for anything unresolvable
    async fn resolve_session(&self, token: &str) -> AppResult<Option<Session>>;

    async fn change_password(
        &self,
        session: &Session,
        old_password: String,
        new_password: String,
    ) -> AppResult<SessionInfo>;

    async fn delete_account(&self, session: &Session, password: String) -> AppResult<()>;

    async fn view_self(&self, session: &Session) -> AppResult<UserView>;

    async fn user_view(&self, username: &str) -> AppResult<UserView>;

    async fn update_metadata(
        &self,
        session: &Session,
        metadata: UserMetadata,
    ) -> AppResult<UserView>;
}
