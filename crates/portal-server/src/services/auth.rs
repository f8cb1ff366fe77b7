//! Authentication service
//!
//! Accounts and login sessions both live in the shared `StorageManager`.
//! A session id doubles as the bearer token handed to the client.

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::{Duration, Utc};
use portal_storage::{ErrorClass, StorageError, StorageManager};
use portal_types::{FederatedUser, LocalUser, Principal, Provider, Role, Session, User};
use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

const MIN_PASSWORD_LEN: usize = 8;
const MAX_USERNAME_LEN: usize = 64;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("missing or expired session")]
    Unauthenticated,

    #[error("administrator role required")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    Conflict(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Storage failures other than rejected input mean the service cannot
    /// answer right now, not that the caller is wrong.
    pub fn is_unavailable(&self) -> bool {
        match self {
            AuthError::Storage(e) => e.class() != ErrorClass::Validation,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;

/// New account details for `register`
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub username: String,
    pub password: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

pub struct AuthService {
    storage: Arc<StorageManager>,
    session_ttl: Duration,
    // Makes "name is free" and "first account" checks atomic with the insert
    accounts: Mutex<()>,
}

impl AuthService {
    pub fn new(storage: Arc<StorageManager>, session_ttl: Duration) -> Self {
        Self {
            storage,
            session_ttl,
            accounts: Mutex::new(()),
        }
    }

    /// Create a local account and log it in. The first local account
    /// becomes an administrator.
    pub async fn register(
        &self,
        registration: Registration,
        user_agent: Option<String>,
    ) -> Result<(User, Session)> {
        validate_username(&registration.username)?;
        if registration.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::InvalidInput(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        let password = registration.password.clone();
        let password_hash = blocking(move || hash_password(&password)).await??;

        let _accounts = self.accounts.lock().await;
        let username = registration.username.clone();
        let first = self
            .with_storage(move |storage| {
                if storage.get::<User>(&username)?.is_some() {
                    return Err(AuthError::Conflict(format!("user {:?}", username)));
                }
                let locals = storage.find_by_field::<User, _>("kind", "local")?;
                Ok(locals.is_empty())
            })
            .await?;

        let role = if first { Role::Admin } else { Role::Member };
        let mut local = LocalUser::new(registration.username, password_hash, role);
        local.email = registration.email.filter(|e| !e.trim().is_empty());
        local.display_name = registration.display_name.filter(|n| !n.trim().is_empty());
        let user = User::from(local);

        let stored = user.clone();
        self.with_storage(move |storage| Ok(storage.put(&stored)?))
            .await?;
        info!("Registered user {} ({})", user.principal_id(), role);

        let session = self.issue_session(user.principal_id(), user_agent).await?;
        Ok((user, session))
    }

    /// Check a username/password pair and open a new session
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        user_agent: Option<String>,
    ) -> Result<(User, Session)> {
        let key = username.to_string();
        let user = self
            .with_storage(move |storage| {
                if key.is_empty() {
                    return Ok(None);
                }
                Ok(storage.get::<User>(&key)?)
            })
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let hash = user
            .as_local()
            .map(|local| local.password_hash.clone())
            .ok_or(AuthError::InvalidCredentials)?;
        let password = password.to_string();
        if !blocking(move || verify_password(&password, &hash)).await? {
            debug!("Rejected password for {}", username);
            return Err(AuthError::InvalidCredentials);
        }

        let session = self.issue_session(user.principal_id(), user_agent).await?;
        info!("User {} logged in", user.principal_id());
        Ok((user, session))
    }

    /// Resolve a bearer token to its live session and account.
    ///
    /// An expired session is deleted when it is encountered here.
    pub async fn authenticate(&self, token: &str) -> Result<(User, Session)> {
        if token.is_empty() {
            return Err(AuthError::Unauthenticated);
        }
        let token = token.to_string();
        self.with_storage(move |storage| {
            let session = storage
                .get::<Session>(&token)?
                .ok_or(AuthError::Unauthenticated)?;
            if session.is_expired_at(Utc::now()) {
                storage.delete::<Session>(session.id())?;
                debug!("Removed expired session for {}", session.user_id);
                return Err(AuthError::Unauthenticated);
            }
            match storage.get::<User>(&session.user_id)? {
                Some(user) => Ok((user, session)),
                None => {
                    storage.delete::<Session>(session.id())?;
                    Err(AuthError::Unauthenticated)
                }
            }
        })
        .await
    }

    pub async fn logout(&self, session: &Session) -> Result<()> {
        let id = session.id().to_string();
        self.with_storage(move |storage| Ok(storage.delete::<Session>(&id)?))
            .await?;
        info!("User {} logged out", session.user_id);
        Ok(())
    }

    /// Live sessions of one account, oldest first
    pub async fn list_sessions(&self, user_id: &str) -> Result<Vec<Session>> {
        let user_id = user_id.to_string();
        self.with_storage(move |storage| {
            let now = Utc::now();
            let mut sessions: Vec<Session> = storage
                .find_by_field::<Session, _>("user_id", &user_id)?
                .into_iter()
                .filter(|s| !s.is_expired_at(now))
                .collect();
            sessions.sort_by_key(|s| s.created_at());
            Ok(sessions)
        })
        .await
    }

    /// End one session. Members may only end their own; admins any.
    pub async fn revoke_session(&self, actor: &User, session_id: &str) -> Result<()> {
        let id = session_id.to_string();
        let actor_id = actor.principal_id().to_string();
        let admin = actor.is_admin();
        self.with_storage(move |storage| {
            let session = storage
                .get::<Session>(&id)?
                .filter(|s| admin || s.user_id == actor_id)
                .ok_or_else(|| AuthError::NotFound(format!("session {:?}", id)))?;
            Ok(storage.delete::<Session>(session.id())?)
        })
        .await?;
        info!("Session revoked by {}", actor.principal_id());
        Ok(())
    }

    async fn issue_session(&self, user_id: &str, user_agent: Option<String>) -> Result<Session> {
        let mut session = Session::new(new_token(), user_id, self.session_ttl);
        if let Some(agent) = user_agent.filter(|a| !a.is_empty()) {
            session = session.with_user_agent(agent);
        }
        let stored = session.clone();
        self.with_storage(move |storage| Ok(storage.put(&stored)?))
            .await?;
        Ok(session)
    }

    async fn with_storage<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&StorageManager) -> Result<T> + Send + 'static,
    {
        on_storage(&self.storage, work).await
    }
}

/// Admin-side account management
pub struct UserDirectory {
    storage: Arc<StorageManager>,
}

impl UserDirectory {
    pub fn new(storage: Arc<StorageManager>) -> Self {
        Self { storage }
    }

    /// Accounts whose top-level `field` equals `value`.
    ///
    /// `value` is matched as a JSON string.
    pub async fn find(&self, field: &str, value: &str) -> Result<Vec<User>> {
        if field.is_empty() {
            return Err(AuthError::InvalidInput("field is required".to_string()));
        }
        let field = field.to_string();
        let value = value.to_string();
        on_storage(&self.storage, move |storage| {
            Ok(storage.find_by_field::<User, _>(&field, &value)?)
        })
        .await
    }

    pub async fn list(&self) -> Result<Vec<User>> {
        on_storage(&self.storage, |storage| Ok(storage.list::<User>()?)).await
    }

    /// Provision an account vouched for by an external provider
    pub async fn add_federated(&self, email: &str, name: &str, provider: Provider) -> Result<User> {
        if !email.contains('@') {
            return Err(AuthError::InvalidInput(format!("invalid email {:?}", email)));
        }
        let user = User::from(FederatedUser::new(
            uuid::Uuid::new_v4().to_string(),
            email,
            name,
            provider,
        ));
        let stored = user.clone();
        on_storage(&self.storage, move |storage| Ok(storage.put(&stored)?)).await?;
        info!("Provisioned federated user {}", user.principal_id());
        Ok(user)
    }

    /// Delete an account together with its sessions
    pub async fn remove(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        let revoked = on_storage(&self.storage, move |storage| {
            if storage.get::<User>(&key)?.is_none() {
                return Err(AuthError::NotFound(format!("user {:?}", key)));
            }
            let sessions = storage.find_by_field::<Session, _>("user_id", &key)?;
            for session in &sessions {
                storage.delete::<Session>(session.id())?;
            }
            storage.delete::<User>(&key)?;
            Ok(sessions.len())
        })
        .await?;
        debug!("Removed user and {} sessions", revoked);
        Ok(())
    }
}

/// Run storage work on the blocking pool
async fn on_storage<T, F>(storage: &Arc<StorageManager>, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&StorageManager) -> Result<T> + Send + 'static,
{
    let storage = storage.clone();
    blocking(move || work(&storage)).await?
}

async fn blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AuthError::Internal(format!("blocking task failed: {}", e)))
}

fn validate_username(username: &str) -> Result<()> {
    if username.is_empty() || username.len() > MAX_USERNAME_LEN {
        return Err(AuthError::InvalidInput(format!(
            "username must be 1 to {} characters",
            MAX_USERNAME_LEN
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(AuthError::InvalidInput(
            "username may only contain letters, digits, '.', '_' and '-'".to_string(),
        ));
    }
    Ok(())
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Internal(format!("failed to hash password: {}", e)))
}

fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// 256 random bits, hex encoded
fn new_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_storage::MemoryBackend;

    fn storage() -> Arc<StorageManager> {
        Arc::new(StorageManager::new(Box::new(MemoryBackend::new())))
    }

    fn registration(username: &str) -> Registration {
        Registration {
            username: username.to_string(),
            password: "correct horse".to_string(),
            email: Some(format!("{}@example.com", username)),
            display_name: None,
        }
    }

    #[tokio::test]
    async fn test_register_login_authenticate_logout() {
        let auth = AuthService::new(storage(), Duration::hours(1));

        let (user, session) = auth
            .register(registration("alice"), Some("curl/8".to_string()))
            .await
            .unwrap();
        assert_eq!(user.principal_id(), "alice");
        assert_eq!(session.user_agent.as_deref(), Some("curl/8"));
        assert_eq!(session.id().len(), 64);

        let (again, login) = auth.login("alice", "correct horse", None).await.unwrap();
        assert_eq!(again, user);
        assert_ne!(login.id(), session.id());

        let (resolved, _) = auth.authenticate(login.id()).await.unwrap();
        assert_eq!(resolved.principal_id(), "alice");
        assert_eq!(auth.list_sessions("alice").await.unwrap().len(), 2);

        auth.logout(&login).await.unwrap();
        assert!(matches!(
            auth.authenticate(login.id()).await,
            Err(AuthError::Unauthenticated)
        ));
        assert!(auth.authenticate(session.id()).await.is_ok());
    }

    #[tokio::test]
    async fn test_first_local_account_is_admin() {
        let auth = AuthService::new(storage(), Duration::hours(1));

        let (first, _) = auth.register(registration("root"), None).await.unwrap();
        let (second, _) = auth.register(registration("bob"), None).await.unwrap();

        assert_eq!(first.role(), Role::Admin);
        assert_eq!(second.role(), Role::Member);
    }

    #[tokio::test]
    async fn test_register_rejects_bad_input_and_duplicates() {
        let auth = AuthService::new(storage(), Duration::hours(1));
        auth.register(registration("alice"), None).await.unwrap();

        assert!(matches!(
            auth.register(registration("alice"), None).await,
            Err(AuthError::Conflict(_))
        ));
        assert!(matches!(
            auth.register(registration("bad name"), None).await,
            Err(AuthError::InvalidInput(_))
        ));

        let mut short = registration("carol");
        short.password = "short".to_string();
        assert!(matches!(
            auth.register(short, None).await,
            Err(AuthError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_login_rejects_wrong_password_and_unknown_user() {
        let auth = AuthService::new(storage(), Duration::hours(1));
        auth.register(registration("alice"), None).await.unwrap();

        assert!(matches!(
            auth.login("alice", "wrong password", None).await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.login("nobody", "correct horse", None).await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.login("", "correct horse", None).await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_expired_session_is_rejected_and_removed() {
        let storage = storage();
        let auth = AuthService::new(storage.clone(), Duration::hours(1));
        auth.register(registration("alice"), None).await.unwrap();

        let stale = Session::issued_at(
            "stale-token",
            "alice",
            Utc::now() - Duration::hours(2),
            Duration::hours(1),
        );
        storage.put(&stale).unwrap();

        assert!(matches!(
            auth.authenticate("stale-token").await,
            Err(AuthError::Unauthenticated)
        ));
        assert_eq!(storage.get::<Session>("stale-token").unwrap(), None);
    }

    #[tokio::test]
    async fn test_closed_storage_is_unavailable() {
        let storage = storage();
        let auth = AuthService::new(storage.clone(), Duration::hours(1));
        storage.close().unwrap();

        let err = auth.authenticate("any-token").await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_members_only_revoke_their_own_sessions() {
        let auth = AuthService::new(storage(), Duration::hours(1));
        let (admin, admin_session) = auth.register(registration("root"), None).await.unwrap();
        let (member, member_session) = auth.register(registration("bob"), None).await.unwrap();

        assert!(matches!(
            auth.revoke_session(&member, admin_session.id()).await,
            Err(AuthError::NotFound(_))
        ));
        auth.revoke_session(&admin, member_session.id()).await.unwrap();
        assert!(auth.list_sessions("bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_directory_find_provision_and_remove() {
        let storage = storage();
        let auth = AuthService::new(storage.clone(), Duration::hours(1));
        let directory = UserDirectory::new(storage.clone());

        auth.register(registration("alice"), None).await.unwrap();
        let federated = directory
            .add_federated("ada@example.com", "Ada", Provider::Github)
            .await
            .unwrap();

        let found = directory.find("email", "ada@example.com").await.unwrap();
        assert_eq!(found, vec![federated.clone()]);
        assert_eq!(directory.find("kind", "local").await.unwrap().len(), 1);
        assert_eq!(directory.list().await.unwrap().len(), 2);

        directory.remove("alice").await.unwrap();
        assert!(auth.list_sessions("alice").await.unwrap().is_empty());
        assert!(matches!(
            directory.remove("alice").await,
            Err(AuthError::NotFound(_))
        ));
    }
}
