use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use lightnovel_common::{AuthCredentials, SessionInfo, UserMetadata, UserView};
use metrics::counter;
use zeroize::Zeroizing;

use crate::auth::password::{CredentialVerifier, PasswordPolicy};
use crate::auth::rate_limit::AuthRateLimiter;
use crate::auth::session::with_timeout;
use crate::auth::token::{AccountId, SessionToken};
use crate::auth::{AuthService, Session, SessionManager};
use crate::error::{AppError, AppResult};
use crate::metrics::{
    ACCOUNT_CREATED, ACCOUNT_DELETED, AUTH_LOGIN_FAILED, AUTH_LOGIN_SUCCESS, SESSION_RENEWED,
};
use crate::storage::{Account, Storage, StorageError};
use crate::validation::{self, trim_unprintable};

pub struct DefaultAuth<S> {
    storage: S,
    sessions: Arc<SessionManager<S>>,
    verifier: Arc<dyn CredentialVerifier>,
    password_policy: PasswordPolicy,
    lockout: AuthRateLimiter,
    op_timeout: Duration,
}

impl<S: Storage> DefaultAuth<S> {
    pub fn new(
        storage: S,
        sessions: Arc<SessionManager<S>>,
        verifier: Arc<dyn CredentialVerifier>,
        password_policy: PasswordPolicy,
        lockout: AuthRateLimiter,
    ) -> Self {
        let op_timeout = sessions.policy().op_timeout;
        Self {
            storage,
            sessions,
            verifier,
            password_policy,
            lockout,
            op_timeout,
        }
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> AppResult<T>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        with_timeout(op, self.op_timeout, fut).await
    }

    async fn hash_password(&self, password: Zeroizing<String>) -> AppResult<String> {
        let verifier = Arc::clone(&self.verifier);
        Ok(tokio::task::spawn_blocking(move || verifier.hash(&password)).await??)
    }

    /// Verify against `hash`, or against the placeholder when there is none.
    /// The slow comparison runs either way.
    async fn verify_password(
        &self,
        password: Zeroizing<String>,
        hash: Option<String>,
    ) -> AppResult<bool> {
        let verifier = Arc::clone(&self.verifier);
        let found = hash.is_some();
        let matched = tokio::task::spawn_blocking(move || {
            let hash = hash
                .as_deref()
                .unwrap_or_else(|| verifier.placeholder_hash());
            verifier.verify(&password, hash)
        })
        .await?;
        Ok(found && matched)
    }

    /// The account behind an authenticated session
    async fn session_account(&self, session: &Session) -> AppResult<Account> {
        self.bounded("account_by_id", self.storage.account_by_id(&session.account_id))
            .await?
            .ok_or(AppError::Unauthorized)
    }

    async fn require_password(&self, account: &Account, password: String) -> AppResult<()> {
        if self
            .verify_password(Zeroizing::new(password), Some(account.password_hash.clone()))
            .await?
        {
            Ok(())
        } else {
            Err(AppError::InvalidCredentials)
        }
    }
}

fn user_view(account: &Account) -> UserView {
    UserView {
        id: account.id.to_hex(),
        username: account.username.clone(),
        display_name: account.display_name.clone(),
        image: account.image.clone(),
        created_at: account.created_at,
    }
}

fn map_username_conflict(err: AppError) -> AppError {
    match err {
        AppError::Storage(StorageError::UsernameTaken) => AppError::UserAlreadyExists,
        other => other,
    }
}

#[async_trait]
impl<S: Storage + 'static> AuthService for DefaultAuth<S> {
    async fn register(&self, credentials: AuthCredentials) -> AppResult<SessionInfo> {
        let credentials = validation::validate_credentials(credentials, &self.password_policy)?;

        // Fast rejection only; the store's constraint decides races
        if self
            .bounded(
                "account_by_username",
                self.storage.account_by_username(&credentials.username),
            )
            .await?
            .is_some()
        {
            return Err(AppError::UserAlreadyExists);
        }

        let password_hash = self
            .hash_password(Zeroizing::new(credentials.password))
            .await?;
        let account = Account {
            id: AccountId::generate(),
            username: credentials.username.clone(),
            password_hash,
            display_name: credentials.username,
            email: String::new(),
            image: String::new(),
            created_at: Utc::now(),
        };
        self.bounded("insert_account", self.storage.insert_account(&account))
            .await
            .map_err(map_username_conflict)?;

        counter!(ACCOUNT_CREATED).increment(1);
        tracing::info!(account = %account.id, username = %account.username, "account registered");

        self.sessions
            .create_session(account.id, &credentials.device_name)
            .await
    }

    async fn login(&self, credentials: AuthCredentials, client: &str) -> AppResult<SessionInfo> {
        if !self.lockout.check_rate_limit(client) {
            return Err(AppError::AuthRateLimited);
        }
        let credentials = validation::validate_credentials(credentials, &self.password_policy)?;

        let account = self
            .bounded(
                "account_by_username",
                self.storage.account_by_username(&credentials.username),
            )
            .await?;
        let stored_hash = account.as_ref().map(|a| a.password_hash.clone());
        let matched = self
            .verify_password(Zeroizing::new(credentials.password), stored_hash)
            .await?;

        let account = match account {
            Some(account) if matched => account,
            _ => {
                self.lockout.record_failed_attempt(client);
                counter!(AUTH_LOGIN_FAILED).increment(1);
                tracing::debug!(client, "login rejected");
                return Err(AppError::InvalidCredentials);
            },
        };

        self.lockout.record_success(client);
        counter!(AUTH_LOGIN_SUCCESS).increment(1);
        self.sessions
            .create_session(account.id, &credentials.device_name)
            .await
    }

    async fn logout(&self, token: &str) -> AppResult<()> {
        let token: SessionToken = token.parse()?;
        self.sessions.delete_session(&token).await
    }

    async fn renew(&self, session: &Session) -> AppResult<SessionInfo> {
        // Only the request that removes the old row may issue a replacement
        if !self.sessions.take_session(&session.token).await? {
            tracing::debug!(account = %session.account_id, "renewal lost to a concurrent use");
            return Err(AppError::Unauthorized);
        }

        let info = self
            .sessions
            .create_session(session.account_id, &session.device_name)
            .await
            .inspect_err(|e| {
                tracing::warn!(account = %session.account_id, error = %e, "renewal consumed the old session but issued none");
            })?;

        counter!(SESSION_RENEWED).increment(1);
        tracing::debug!(account = %session.account_id, "session renewed");
        Ok(info)
    }

    async fn resolve_session(&self, token: &str) -> AppResult<Option<Session>> {
        match token.parse::<SessionToken>() {
            Ok(token) => self.sessions.get_session(&token).await,
            Err(_) => Ok(None),
        }
    }

    async fn change_password(
        &self,
        session: &Session,
        old_password: String,
        new_password: String,
    ) -> AppResult<SessionInfo> {
        let new_password = Zeroizing::new(new_password);
        self.password_policy.check(&new_password)?;

        let account = self.session_account(session).await?;
        self.require_password(&account, old_password).await?;

        let password_hash = self.hash_password(new_password).await?;

        // Sessions go before the hash changes; a failure here leaves the old password in place
        self.sessions.delete_all_sessions(&account.id).await?;
        if !self
            .bounded(
                "update_account_password",
                self.storage
                    .update_account_password(&account.id, &password_hash),
            )
            .await?
        {
            return Err(AppError::Unauthorized);
        }

        tracing::info!(account = %account.id, "password changed");
        self.sessions
            .create_session(account.id, &session.device_name)
            .await
    }

    async fn delete_account(&self, session: &Session, password: String) -> AppResult<()> {
        let account = self.session_account(session).await?;
        self.require_password(&account, password).await?;

        self.sessions.delete_all_sessions(&account.id).await?;
        self.bounded("delete_account", self.storage.delete_account(&account.id))
            .await?;

        counter!(ACCOUNT_DELETED).increment(1);
        tracing::info!(account = %account.id, "account deleted");
        Ok(())
    }

    async fn view_self(&self, session: &Session) -> AppResult<UserView> {
        Ok(user_view(&self.session_account(session).await?))
    }

    async fn user_view(&self, username: &str) -> AppResult<UserView> {
        let username = trim_unprintable(username);
        if validation::validate_username(username).is_err() {
            return Err(AppError::NotFound("user".to_string()));
        }
        self.bounded(
            "account_by_username",
            self.storage.account_by_username(username),
        )
        .await?
        .map(|account| user_view(&account))
        .ok_or_else(|| AppError::NotFound("user".to_string()))
    }

    async fn update_metadata(
        &self,
        session: &Session,
        metadata: UserMetadata,
    ) -> AppResult<UserView> {
        let metadata = validation::validate_metadata(metadata)?;
        let updated = self
            .bounded(
                "update_account_metadata",
                self.storage
                    .update_account_metadata(&session.account_id, &metadata),
            )
            .await
            .map_err(map_username_conflict)?;
        if !updated {
            return Err(AppError::Unauthorized);
        }
        self.view_self(session).await
    }
}
