// ============================
// lightnovel-backend/src/auth/session.rs
// ============================
//! Session lifecycle with sliding expiration.
use std::{future::Future, sync::Arc, time::Duration as StdDuration};

use chrono::{Duration, Utc};
use lightnovel_common::SessionInfo;
use metrics::counter;
use tokio::task::JoinHandle;

use crate::auth::token::{AccountId, SessionToken};
use crate::error::{AppError, AppResult};
use crate::metrics::{
    SESSION_CREATED, SESSION_DELETED, SESSION_EXPIRED, SESSION_EXTENDED, STORAGE_TIMEOUT,
};
pub use crate::storage::Session;
use crate::storage::{Storage, StorageError};

/// Lifetime rules injected at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Validity window of a fresh or extended session
    pub duration: Duration,
    /// Reads extend a session once less than this much validity remains
    pub renew_threshold: Duration,
    /// Bound on single-row persistence calls
    pub op_timeout: StdDuration,
    /// Bound on the bulk expiry sweep
    pub sweep_timeout: StdDuration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            duration: Duration::days(30),
            renew_threshold: Duration::days(7),
            op_timeout: StdDuration::from_secs(60),
            sweep_timeout: StdDuration::from_secs(600),
        }
    }
}

/// Run a persistence call under a deadline
pub(crate) async fn with_timeout<T, F>(op: &'static str, limit: StdDuration, fut: F) -> AppResult<T>
where
    F: Future<Output = Result<T, StorageError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(AppError::from),
        Err(_) => {
            counter!(STORAGE_TIMEOUT, "op" => op).increment(1);
            tracing::warn!(op, timeout_ms = limit.as_millis() as u64, "storage call timed out");
            Err(AppError::Timeout(op))
        },
    }
}

/// Session manager backed by the persistence layer
pub struct SessionManager<S> {
    storage: S,
    policy: SessionPolicy,
}

impl<S: Storage> SessionManager<S> {
    /// Create a new session manager
    pub fn new(storage: S, policy: SessionPolicy) -> Self {
        Self { storage, policy }
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> AppResult<T>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        with_timeout(op, self.policy.op_timeout, fut).await
    }

    /// Issue a new session for an account and device
    pub async fn create_session(
        &self,
        account_id: AccountId,
        device_name: &str,
    ) -> AppResult<SessionInfo> {
        let session = Session {
            token: SessionToken::generate(),
            account_id,
            expires_at: Utc::now() + self.policy.duration,
            device_name: device_name.to_string(),
        };
        self.bounded("create_session", self.storage.insert_session(&session))
            .await?;

        counter!(SESSION_CREATED).increment(1);
        tracing::info!(account = %account_id, device = %session.device_name, "session created");

        Ok(SessionInfo {
            session: session.token.to_hex(),
            expired_at: session.expires_at,
        })
    }

    /// Resolve a token to a live session.
    ///
    /// Expired rows are reported as absent and removed on the spot. A session
    /// close to expiry is extended as a side effect; that write is best-effort.
    pub async fn get_session(&self, token: &SessionToken) -> AppResult<Option<Session>> {
        let Some(mut session) = self.bounded("get_session", self.storage.session(token)).await?
        else {
            return Ok(None);
        };

        let now = Utc::now();
        if session.expires_at <= now {
            if let Err(e) = self
                .bounded("delete_expired_session", self.storage.delete_session(token))
                .await
            {
                tracing::warn!(error = %e, "failed to remove expired session");
            }
            counter!(SESSION_EXPIRED).increment(1);
            return Ok(None);
        }

        if session.expires_at - now < self.policy.renew_threshold {
            let expires_at = now + self.policy.duration;
            match self
                .bounded(
                    "extend_session",
                    self.storage.set_session_expiry(token, expires_at),
                )
                .await
            {
                Ok(true) => {
                    session.expires_at = expires_at;
                    counter!(SESSION_EXTENDED).increment(1);
                    tracing::debug!(account = %session.account_id, "session extended on read");
                },
                Ok(false) => return Ok(None),
                Err(e) => tracing::warn!(error = %e, "failed to extend session"),
            }
        }

        Ok(Some(session))
    }

    /// Delete a session; deleting an unknown token is not an error
    pub async fn delete_session(&self, token: &SessionToken) -> AppResult<()> {
        self.take_session(token).await?;
        Ok(())
    }

    /// Delete a session, reporting whether this call was the one that removed it
    pub async fn take_session(&self, token: &SessionToken) -> AppResult<bool> {
        let removed = self
            .bounded("delete_session", self.storage.delete_session(token))
            .await?;
        if removed {
            counter!(SESSION_DELETED).increment(1);
        }
        Ok(removed)
    }

    /// Reset a live session's expiry to a full window
    pub async fn extend_session_lifetime(&self, token: &SessionToken) -> AppResult<Session> {
        let mut session = self
            .bounded("extend_session", self.storage.session(token))
            .await?
            .filter(|s| s.expires_at > Utc::now())
            .ok_or(AppError::SessionNotFound)?;

        let expires_at = Utc::now() + self.policy.duration;
        if !self
            .bounded(
                "extend_session",
                self.storage.set_session_expiry(token, expires_at),
            )
            .await?
        {
            return Err(AppError::SessionNotFound);
        }
        session.expires_at = expires_at;
        counter!(SESSION_EXTENDED).increment(1);
        Ok(session)
    }

    /// Remove every expired session
    pub async fn delete_expired_sessions(&self) -> AppResult<u64> {
        let removed = with_timeout(
            "delete_expired_sessions",
            self.policy.sweep_timeout,
            self.storage.delete_sessions_expired_before(Utc::now()),
        )
        .await?;
        if removed > 0 {
            counter!(SESSION_EXPIRED).increment(removed);
            tracing::info!(removed, "expired sessions swept");
        }
        Ok(removed)
    }

    /// Invalidate every session of an account
    pub async fn delete_all_sessions(&self, account_id: &AccountId) -> AppResult<u64> {
        let removed = self
            .bounded(
                "delete_all_sessions",
                self.storage.delete_sessions_for_account(account_id),
            )
            .await?;
        counter!(SESSION_DELETED).increment(removed);
        tracing::info!(account = %account_id, removed, "all sessions invalidated");
        Ok(removed)
    }
}

impl<S: Storage + 'static> SessionManager<S> {
    /// Run the expiry sweep on a fixed interval until the handle is aborted
    pub fn spawn_sweeper(self: Arc<Self>, interval: StdDuration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.delete_expired_sessions().await {
                    tracing::error!(error = %e, "expired session sweep failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn manager() -> (MemoryStorage, SessionManager<MemoryStorage>) {
        let storage = MemoryStorage::new();
        (storage.clone(), SessionManager::new(storage, SessionPolicy::default()))
    }

    async fn insert_raw(storage: &MemoryStorage, expires_in: Duration) -> Session {
        let session = Session {
            token: SessionToken::generate(),
            account_id: AccountId::generate(),
            expires_at: Utc::now() + expires_in,
            device_name: "reader".to_string(),
        };
        storage.insert_session(&session).await.unwrap();
        session
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let (_, sessions) = manager();
        let account = AccountId::generate();
        let info = sessions.create_session(account, "my phone").await.unwrap();

        assert_eq!(info.session.len(), 32);
        let remaining = info.expired_at - Utc::now();
        assert!(remaining > Duration::days(29));

        let token: SessionToken = info.session.parse().unwrap();
        let session = sessions.get_session(&token).await.unwrap().unwrap();
        assert_eq!(session.account_id, account);
        assert_eq!(session.device_name, "my phone");
        assert_eq!(session.expires_at, info.expired_at);
    }

    #[tokio::test]
    async fn test_expired_session_is_absent_without_sweep() {
        let (storage, sessions) = manager();
        let stale = insert_raw(&storage, Duration::seconds(-1)).await;

        assert!(sessions.get_session(&stale.token).await.unwrap().is_none());
        // Found-expired rows are cleaned up on read
        assert!(storage.session(&stale.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sliding_renewal_below_threshold() {
        let (storage, sessions) = manager();
        let near = insert_raw(&storage, Duration::days(1)).await;

        let session = sessions.get_session(&near.token).await.unwrap().unwrap();
        assert!(session.expires_at - Utc::now() > Duration::days(29));
        let stored = storage.session(&near.token).await.unwrap().unwrap();
        assert_eq!(stored.expires_at, session.expires_at);
    }

    #[tokio::test]
    async fn test_no_renewal_above_threshold() {
        let (storage, sessions) = manager();
        let fresh = insert_raw(&storage, Duration::days(20)).await;

        let session = sessions.get_session(&fresh.token).await.unwrap().unwrap();
        assert_eq!(session.expires_at, fresh.expires_at);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (_, sessions) = manager();
        let info = sessions
            .create_session(AccountId::generate(), "tablet")
            .await
            .unwrap();
        let token: SessionToken = info.session.parse().unwrap();

        sessions.delete_session(&token).await.unwrap();
        sessions.delete_session(&token).await.unwrap();
        assert!(sessions.get_session(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_take_session_reports_single_winner() {
        let (_, sessions) = manager();
        let info = sessions
            .create_session(AccountId::generate(), "tablet")
            .await
            .unwrap();
        let token: SessionToken = info.session.parse().unwrap();

        assert!(sessions.take_session(&token).await.unwrap());
        assert!(!sessions.take_session(&token).await.unwrap());
    }

    #[tokio::test]
    async fn test_extend_requires_live_session() {
        let (storage, sessions) = manager();
        let live = insert_raw(&storage, Duration::days(10)).await;
        let stale = insert_raw(&storage, Duration::seconds(-1)).await;

        let extended = sessions.extend_session_lifetime(&live.token).await.unwrap();
        assert!(extended.expires_at > live.expires_at);

        assert!(matches!(
            sessions.extend_session_lifetime(&stale.token).await,
            Err(AppError::SessionNotFound)
        ));
        assert!(matches!(
            sessions
                .extend_session_lifetime(&SessionToken::generate())
                .await,
            Err(AppError::SessionNotFound)
        ));
    }

    #[tokio::test]
    async fn test_delete_expired_and_all_sessions() {
        let (storage, sessions) = manager();
        let account = AccountId::generate();
        let first = sessions.create_session(account, "one").await.unwrap();
        sessions.create_session(account, "two").await.unwrap();
        insert_raw(&storage, Duration::seconds(-10)).await;
        let bystander = insert_raw(&storage, Duration::days(5)).await;

        assert_eq!(sessions.delete_expired_sessions().await.unwrap(), 1);
        assert_eq!(sessions.delete_all_sessions(&account).await.unwrap(), 2);

        let token: SessionToken = first.session.parse().unwrap();
        assert!(sessions.get_session(&token).await.unwrap().is_none());
        assert!(sessions.get_session(&bystander.token).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sweeper_removes_expired() {
        let (storage, sessions) = manager();
        let stale = insert_raw(&storage, Duration::seconds(-1)).await;

        let handle = Arc::new(sessions).spawn_sweeper(StdDuration::from_millis(10));
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        handle.abort();

        assert!(storage.session(&stale.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_timeout_surfaces_as_internal_error() {
        let result = with_timeout(
            "get_session",
            StdDuration::from_millis(10),
            std::future::pending::<Result<(), StorageError>>(),
        )
        .await;
        let err = result.unwrap_err();
        assert!(matches!(err, AppError::Timeout("get_session")));
        assert!(err.status_code().is_server_error());
    }
}
