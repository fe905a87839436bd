// ============================
// lightnovel-backend/src/storage.rs
// ============================
//! Storage abstraction with in-memory and flat-file implementations.
use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use lightnovel_common::UserMetadata;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tokio::{fs as tokio_fs, io::AsyncWriteExt, sync::Mutex};

use crate::auth::token::{AccountId, SessionToken};

/// Persistence failures
#[derive(Error, Debug)]
pub enum StorageError {
    /// Uniqueness constraint on usernames
    #[error("username is already taken")]
    UsernameTaken,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// A stored account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub username: String,
    /// PHC string from the credential verifier
    pub password_hash: String,
    pub display_name: String,
    pub email: String,
    pub image: String,
    pub created_at: DateTime<Utc>,
}

/// A stored session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: SessionToken,
    pub account_id: AccountId,
    pub expires_at: DateTime<Utc>,
    pub device_name: String,
}

/// Usernames are unique regardless of case
pub fn username_key(username: &str) -> String {
    username.to_ascii_lowercase()
}

/// Trait for storage backends
#[async_trait]
pub trait Storage: Send + Sync {
    /// Insert a new account, failing with [`StorageError::UsernameTaken`] on a duplicate name
    async fn insert_account(&self, account: &Account) -> Result<(), StorageError>;

    async fn account_by_username(&self, username: &str) -> Result<Option<Account>, StorageError>;

    async fn account_by_id(&self, id: &AccountId) -> Result<Option<Account>, StorageError>;

    /// Returns `false` when the account does not exist
    async fn update_account_password(
        &self,
        id: &AccountId,
        password_hash: &str,
    ) -> Result<bool, StorageError>;

    /// Replace profile fields; a rename is subject to the username constraint
    async fn update_account_metadata(
        &self,
        id: &AccountId,
        metadata: &UserMetadata,
    ) -> Result<bool, StorageError>;

    async fn delete_account(&self, id: &AccountId) -> Result<bool, StorageError>;

    async fn insert_session(&self, session: &Session) -> Result<(), StorageError>;

    /// Fetch a session row as stored, expired or not
    async fn session(&self, token: &SessionToken) -> Result<Option<Session>, StorageError>;

    /// Returns `false` when the session does not exist
    async fn set_session_expiry(
        &self,
        token: &SessionToken,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StorageError>;

    async fn delete_session(&self, token: &SessionToken) -> Result<bool, StorageError>;

    /// Delete every session whose expiry is before `now`, returning how many went
    async fn delete_sessions_expired_before(&self, now: DateTime<Utc>)
        -> Result<u64, StorageError>;

    async fn delete_sessions_for_account(&self, id: &AccountId) -> Result<u64, StorageError>;
}

/// In-memory implementation of the Storage trait
#[derive(Clone, Default)]
pub struct MemoryStorage {
    tables: Arc<MemoryTables>,
}

#[derive(Default)]
struct MemoryTables {
    accounts: DashMap<AccountId, Account>,
    usernames: DashMap<String, AccountId>,
    sessions: DashMap<SessionToken, Session>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key` for `id`; false if another account holds it
    fn claim_username(&self, key: String, id: AccountId) -> bool {
        let holder = *self.tables.usernames.entry(key).or_insert(id);
        holder == id
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn insert_account(&self, account: &Account) -> Result<(), StorageError> {
        if !self.claim_username(username_key(&account.username), account.id) {
            return Err(StorageError::UsernameTaken);
        }
        self.tables.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn account_by_username(&self, username: &str) -> Result<Option<Account>, StorageError> {
        let id = match self.tables.usernames.get(&username_key(username)) {
            Some(id) => *id,
            None => return Ok(None),
        };
        Ok(self.tables.accounts.get(&id).map(|a| a.clone()))
    }

    async fn account_by_id(&self, id: &AccountId) -> Result<Option<Account>, StorageError> {
        Ok(self.tables.accounts.get(id).map(|a| a.clone()))
    }

    async fn update_account_password(
        &self,
        id: &AccountId,
        password_hash: &str,
    ) -> Result<bool, StorageError> {
        match self.tables.accounts.get_mut(id) {
            Some(mut account) => {
                account.password_hash = password_hash.to_string();
                Ok(true)
            },
            None => Ok(false),
        }
    }

    async fn update_account_metadata(
        &self,
        id: &AccountId,
        metadata: &UserMetadata,
    ) -> Result<bool, StorageError> {
        let old_key = match self.tables.accounts.get(id) {
            Some(account) => username_key(&account.username),
            None => return Ok(false),
        };
        let new_key = username_key(&metadata.username);
        if new_key != old_key {
            if !self.claim_username(new_key, *id) {
                return Err(StorageError::UsernameTaken);
            }
            self.tables.usernames.remove(&old_key);
        }

        match self.tables.accounts.get_mut(id) {
            Some(mut account) => {
                account.username = metadata.username.clone();
                account.display_name = metadata.display_name.clone();
                account.email = metadata.email.clone();
                account.image = metadata.image.clone();
                Ok(true)
            },
            None => Ok(false),
        }
    }

    async fn delete_account(&self, id: &AccountId) -> Result<bool, StorageError> {
        match self.tables.accounts.remove(id) {
            Some((_, account)) => {
                self.tables
                    .usernames
                    .remove_if(&username_key(&account.username), |_, holder| holder == id);
                Ok(true)
            },
            None => Ok(false),
        }
    }

    async fn insert_session(&self, session: &Session) -> Result<(), StorageError> {
        self.tables.sessions.insert(session.token, session.clone());
        Ok(())
    }

    async fn session(&self, token: &SessionToken) -> Result<Option<Session>, StorageError> {
        Ok(self.tables.sessions.get(token).map(|s| s.clone()))
    }

    async fn set_session_expiry(
        &self,
        token: &SessionToken,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        match self.tables.sessions.get_mut(token) {
            Some(mut session) => {
                session.expires_at = expires_at;
                Ok(true)
            },
            None => Ok(false),
        }
    }

    async fn delete_session(&self, token: &SessionToken) -> Result<bool, StorageError> {
        Ok(self.tables.sessions.remove(token).is_some())
    }

    async fn delete_sessions_expired_before(
        &self,
        now: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let mut removed = 0;
        self.tables.sessions.retain(|_, session| {
            let keep = session.expires_at >= now;
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }

    async fn delete_sessions_for_account(&self, id: &AccountId) -> Result<u64, StorageError> {
        let mut removed = 0;
        self.tables.sessions.retain(|_, session| {
            let keep = session.account_id != *id;
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }
}

/// Flat-file implementation of the Storage trait.
///
/// Layout under the root directory:
/// `accounts/<id>.json`, `usernames/<lowercase name>` holding the owner's id,
/// and `sessions/<token>.json`. Mutations are serialized through one lock so a
/// read-modify-write can never resurrect a row deleted concurrently.
#[derive(Clone)]
pub struct FlatFileStorage {
    root: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FlatFileStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> anyhow::Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("accounts"))?;
        fs::create_dir_all(root.join("usernames"))?;
        fs::create_dir_all(root.join("sessions"))?;
        Ok(Self {
            root,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn account_path(&self, id: &AccountId) -> PathBuf {
        self.root.join("accounts").join(format!("{}.json", id.to_hex()))
    }

    fn username_path(&self, username: &str) -> PathBuf {
        // Validated usernames are ASCII letters, so the key is a safe file name
        self.root.join("usernames").join(username_key(username))
    }

    fn session_path(&self, token: &SessionToken) -> PathBuf {
        self.root.join("sessions").join(format!("{}.json", token.to_hex()))
    }

    /// Create the username index file, failing if it already exists
    async fn claim_username(&self, username: &str, id: &AccountId) -> Result<(), StorageError> {
        let mut file = match tokio_fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.username_path(username))
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(StorageError::UsernameTaken)
            },
            Err(e) => return Err(e.into()),
        };
        file.write_all(id.to_hex().as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn release_username(&self, username: &str) -> Result<(), StorageError> {
        remove_if_exists(&self.username_path(username)).await?;
        Ok(())
    }

    async fn load_session_file(&self, path: &Path) -> Result<Option<Session>, StorageError> {
        read_json(path).await
    }

    /// Delete every session file matching `pred`
    async fn delete_sessions_where<F>(&self, pred: F) -> Result<u64, StorageError>
    where
        F: Fn(&Session) -> bool + Send + Sync,
    {
        let _guard = self.write_lock.lock().await;
        let mut removed = 0;
        let mut entries = tokio_fs::read_dir(self.root.join("sessions")).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let session = match self.load_session_file(&path).await {
                Ok(Some(session)) => session,
                Ok(None) => continue,
                Err(StorageError::Json(e)) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable session file");
                    continue;
                },
                Err(e) => return Err(e),
            };
            if pred(&session) && remove_if_exists(&path).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Read and decode a JSON file; a missing file is `None`
async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    match tokio_fs::read(path).await {
        Ok(content) => Ok(Some(serde_json::from_slice(&content)?)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write through a temporary file and rename so readers never see a torn file
async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let json = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension(format!("tmp-{}", hex::encode(rand::random::<[u8; 4]>())));
    tokio_fs::write(&tmp, json).await?;
    if let Err(e) = tokio_fs::rename(&tmp, path).await {
        let _ = tokio_fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

async fn remove_if_exists(path: &Path) -> Result<bool, io::Error> {
    match tokio_fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl Storage for FlatFileStorage {
    async fn insert_account(&self, account: &Account) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        self.claim_username(&account.username, &account.id).await?;
        if let Err(e) = write_json(&self.account_path(&account.id), account).await {
            self.release_username(&account.username).await?;
            return Err(e);
        }
        Ok(())
    }

    async fn account_by_username(&self, username: &str) -> Result<Option<Account>, StorageError> {
        let owner = match tokio_fs::read_to_string(self.username_path(username)).await {
            Ok(owner) => owner,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let owner = owner.trim();
        if owner.len() != 32 || !owner.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::Backend(format!(
                "corrupt username index for `{}`",
                username_key(username)
            )));
        }
        read_json(&self.root.join("accounts").join(format!("{owner}.json"))).await
    }

    async fn account_by_id(&self, id: &AccountId) -> Result<Option<Account>, StorageError> {
        read_json(&self.account_path(id)).await
    }

    async fn update_account_password(
        &self,
        id: &AccountId,
        password_hash: &str,
    ) -> Result<bool, StorageError> {
        let _guard = self.write_lock.lock().await;
        let path = self.account_path(id);
        let Some(mut account) = read_json::<Account>(&path).await? else {
            return Ok(false);
        };
        account.password_hash = password_hash.to_string();
        write_json(&path, &account).await?;
        Ok(true)
    }

    async fn update_account_metadata(
        &self,
        id: &AccountId,
        metadata: &UserMetadata,
    ) -> Result<bool, StorageError> {
        let _guard = self.write_lock.lock().await;
        let path = self.account_path(id);
        let Some(mut account) = read_json::<Account>(&path).await? else {
            return Ok(false);
        };

        let renamed = username_key(&account.username) != username_key(&metadata.username);
        if renamed {
            self.claim_username(&metadata.username, id).await?;
        }
        let old_username = std::mem::replace(&mut account.username, metadata.username.clone());
        account.display_name = metadata.display_name.clone();
        account.email = metadata.email.clone();
        account.image = metadata.image.clone();

        if let Err(e) = write_json(&path, &account).await {
            if renamed {
                self.release_username(&metadata.username).await?;
            }
            return Err(e);
        }
        if renamed {
            self.release_username(&old_username).await?;
        }
        Ok(true)
    }

    async fn delete_account(&self, id: &AccountId) -> Result<bool, StorageError> {
        let _guard = self.write_lock.lock().await;
        let path = self.account_path(id);
        let Some(account) = read_json::<Account>(&path).await? else {
            return Ok(false);
        };
        remove_if_exists(&path).await?;
        self.release_username(&account.username).await?;
        Ok(true)
    }

    async fn insert_session(&self, session: &Session) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        write_json(&self.session_path(&session.token), session).await
    }

    async fn session(&self, token: &SessionToken) -> Result<Option<Session>, StorageError> {
        self.load_session_file(&self.session_path(token)).await
    }

    async fn set_session_expiry(
        &self,
        token: &SessionToken,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let _guard = self.write_lock.lock().await;
        let path = self.session_path(token);
        let Some(mut session) = self.load_session_file(&path).await? else {
            return Ok(false);
        };
        session.expires_at = expires_at;
        write_json(&path, &session).await?;
        Ok(true)
    }

    async fn delete_session(&self, token: &SessionToken) -> Result<bool, StorageError> {
        let _guard = self.write_lock.lock().await;
        Ok(remove_if_exists(&self.session_path(token)).await?)
    }

    async fn delete_sessions_expired_before(
        &self,
        now: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        self.delete_sessions_where(|session| session.expires_at < now)
            .await
    }

    async fn delete_sessions_for_account(&self, id: &AccountId) -> Result<u64, StorageError> {
        let id = *id;
        self.delete_sessions_where(move |session| session.account_id == id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn account(username: &str) -> Account {
        Account {
            id: AccountId::generate(),
            username: username.to_string(),
            password_hash: "$scrypt$placeholder".to_string(),
            display_name: username.to_string(),
            email: String::new(),
            image: String::new(),
            created_at: Utc::now(),
        }
    }

    fn session(account_id: AccountId, expires_in: Duration) -> Session {
        Session {
            token: SessionToken::generate(),
            account_id,
            expires_at: Utc::now() + expires_in,
            device_name: "test device".to_string(),
        }
    }

    fn metadata(username: &str) -> UserMetadata {
        UserMetadata {
            username: username.to_string(),
            display_name: "Display".to_string(),
            email: "someone@example.com".to_string(),
            image: String::new(),
        }
    }

    /// Behaviour every backend must share
    async fn exercise_accounts<S: Storage>(storage: &S) {
        let alice = account("alice");
        storage.insert_account(&alice).await.unwrap();

        // Uniqueness is case-insensitive and enforced by the store
        let dup = account("Alice");
        assert!(matches!(
            storage.insert_account(&dup).await,
            Err(StorageError::UsernameTaken)
        ));
        assert!(storage.account_by_id(&dup.id).await.unwrap().is_none());

        let found = storage.account_by_username("ALICE").await.unwrap().unwrap();
        assert_eq!(found, alice);
        assert_eq!(storage.account_by_id(&alice.id).await.unwrap().unwrap(), alice);
        assert!(storage.account_by_username("nobody").await.unwrap().is_none());

        assert!(storage
            .update_account_password(&alice.id, "$scrypt$new")
            .await
            .unwrap());
        let found = storage.account_by_id(&alice.id).await.unwrap().unwrap();
        assert_eq!(found.password_hash, "$scrypt$new");

        // Renames free the old name and respect the constraint
        let bob = account("bob");
        storage.insert_account(&bob).await.unwrap();
        assert!(matches!(
            storage.update_account_metadata(&alice.id, &metadata("bob")).await,
            Err(StorageError::UsernameTaken)
        ));
        assert!(storage
            .update_account_metadata(&alice.id, &metadata("alicia"))
            .await
            .unwrap());
        assert!(storage.account_by_username("alice").await.unwrap().is_none());
        let renamed = storage.account_by_username("alicia").await.unwrap().unwrap();
        assert_eq!(renamed.id, alice.id);
        assert_eq!(renamed.email, "someone@example.com");
        storage.insert_account(&account("alice")).await.unwrap();

        assert!(storage.delete_account(&bob.id).await.unwrap());
        assert!(!storage.delete_account(&bob.id).await.unwrap());
        assert!(storage.account_by_username("bob").await.unwrap().is_none());
        assert!(!storage
            .update_account_password(&bob.id, "$scrypt$x")
            .await
            .unwrap());
    }

    async fn exercise_sessions<S: Storage>(storage: &S) {
        let owner = AccountId::generate();
        let other = AccountId::generate();

        let live = session(owner, Duration::days(30));
        let expired = session(owner, Duration::seconds(-5));
        let foreign = session(other, Duration::days(30));
        for s in [&live, &expired, &foreign] {
            storage.insert_session(s).await.unwrap();
        }

        assert_eq!(storage.session(&live.token).await.unwrap().unwrap(), live);
        // Stores return rows as-is; expiry policy lives in the session manager
        assert!(storage.session(&expired.token).await.unwrap().is_some());

        let later = Utc::now() + Duration::days(60);
        assert!(storage.set_session_expiry(&live.token, later).await.unwrap());
        assert_eq!(
            storage.session(&live.token).await.unwrap().unwrap().expires_at,
            later
        );
        assert!(!storage
            .set_session_expiry(&SessionToken::generate(), later)
            .await
            .unwrap());

        assert_eq!(
            storage.delete_sessions_expired_before(Utc::now()).await.unwrap(),
            1
        );
        assert!(storage.session(&expired.token).await.unwrap().is_none());

        assert_eq!(storage.delete_sessions_for_account(&owner).await.unwrap(), 1);
        assert!(storage.session(&live.token).await.unwrap().is_none());
        assert!(storage.session(&foreign.token).await.unwrap().is_some());

        assert!(storage.delete_session(&foreign.token).await.unwrap());
        assert!(!storage.delete_session(&foreign.token).await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_storage_accounts() {
        exercise_accounts(&MemoryStorage::new()).await;
    }

    #[tokio::test]
    async fn test_memory_storage_sessions() {
        exercise_sessions(&MemoryStorage::new()).await;
    }

    #[tokio::test]
    async fn test_flat_file_storage_accounts() {
        let temp_dir = TempDir::new().unwrap();
        exercise_accounts(&FlatFileStorage::new(temp_dir.path()).unwrap()).await;
    }

    #[tokio::test]
    async fn test_flat_file_storage_sessions() {
        let temp_dir = TempDir::new().unwrap();
        exercise_sessions(&FlatFileStorage::new(temp_dir.path()).unwrap()).await;
    }

    #[tokio::test]
    async fn test_flat_file_storage_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let alice = account("alice");
        let live = session(alice.id, Duration::days(1));
        {
            let storage = FlatFileStorage::new(temp_dir.path()).unwrap();
            storage.insert_account(&alice).await.unwrap();
            storage.insert_session(&live).await.unwrap();
        }

        let storage = FlatFileStorage::new(temp_dir.path()).unwrap();
        assert_eq!(
            storage.account_by_username("alice").await.unwrap().unwrap(),
            alice
        );
        assert_eq!(storage.session(&live.token).await.unwrap().unwrap(), live);
    }

    #[tokio::test]
    async fn test_concurrent_registration_single_winner() {
        let storage = MemoryStorage::new();
        let mut handles = Vec::new();
        for _ in 0..16 {
            let storage = storage.clone();
            handles.push(tokio::spawn(async move {
                storage.insert_account(&account("carol")).await.is_ok()
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
