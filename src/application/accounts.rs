//! Accounts, password checks and login sessions.

use std::sync::Arc;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::error::FieldErrors;
use crate::application::repos::{
    CreateSessionParams, CreateUserParams, RepoError, SessionsRepo, UsersRepo,
};
use crate::domain::accounts::{check_new_password, normalize_username};
use crate::domain::entities::{UserRecord, UserRef};

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "yatube_session";

const LOGIN_FAILED: &str =
    "Please enter a correct username and password. Note that both fields may be case-sensitive.";

/// Who is making the current request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Viewer {
    #[default]
    Anonymous,
    User(UserRef),
}

impl Viewer {
    pub fn user(&self) -> Option<&UserRef> {
        match self {
            Viewer::Anonymous => None,
            Viewer::User(user) => Some(user),
        }
    }

    pub fn id(&self) -> Option<i64> {
        self.user().map(|user| user.id)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Viewer::User(_))
    }
}

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("form rejected: {0}")]
    Invalid(FieldErrors),
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error("password hashing task failed")]
    Task(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, Default)]
pub struct SignupInput {
    pub username: String,
    pub password: String,
    pub password_confirmation: String,
}

/// A freshly issued session. `token` goes into the cookie and is never stored.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UsersRepo>,
    sessions: Arc<dyn SessionsRepo>,
    session_ttl: Duration,
}

impl AccountService {
    pub fn new(
        users: Arc<dyn UsersRepo>,
        sessions: Arc<dyn SessionsRepo>,
        session_ttl: Duration,
    ) -> Self {
        Self {
            users,
            sessions,
            session_ttl,
        }
    }

    /// Register a new account.
    pub async fn signup(&self, input: SignupInput) -> Result<UserRecord, AccountError> {
        let mut errors = FieldErrors::new();

        let username = match normalize_username(&input.username) {
            Ok(username) => Some(username),
            Err(err) => {
                errors.add_domain(err);
                None
            }
        };
        if let Err(err) = check_new_password(&input.password, &input.password_confirmation) {
            errors.add_domain(err);
        }

        if let Some(username) = username.as_deref()
            && self.users.find_user_by_username(username).await?.is_some()
        {
            errors.add("username", "A user with that username already exists.");
        }

        let (Some(username), true) = (username, errors.is_empty()) else {
            return Err(AccountError::Invalid(errors));
        };

        let password_hash = hash_password(input.password).await?;
        let user = self
            .users
            .create_user(CreateUserParams {
                username,
                password_hash,
            })
            .await
            .map_err(|err| match err {
                RepoError::Duplicate { .. } => AccountError::Invalid(FieldErrors::single(
                    "username",
                    "A user with that username already exists.",
                )),
                other => AccountError::Repo(other),
            })?;

        info!(
            target = "yatube::application::accounts",
            user_id = user.id,
            username = %user.username,
            "account created"
        );
        Ok(user)
    }

    /// Check credentials and open a session for the matching account.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(UserRecord, IssuedSession), AccountError> {
        let Some(user) = self.users.find_user_by_username(username.trim()).await? else {
            return Err(AccountError::Invalid(FieldErrors::single(
                FieldErrors::NON_FIELD,
                LOGIN_FAILED,
            )));
        };

        if !verify_password(password.to_string(), user.password_hash.clone()).await? {
            debug!(
                target = "yatube::application::accounts",
                user_id = user.id,
                "rejected login with wrong password"
            );
            return Err(AccountError::Invalid(FieldErrors::single(
                FieldErrors::NON_FIELD,
                LOGIN_FAILED,
            )));
        }

        let session = self.open_session(user.id).await?;
        Ok((user, session))
    }

    /// Issue a session for an already authenticated user.
    pub async fn open_session(&self, user_id: i64) -> Result<IssuedSession, AccountError> {
        let id = Uuid::new_v4();
        let secret = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        let expires_at = OffsetDateTime::now_utc() + self.session_ttl;

        self.sessions
            .create_session(CreateSessionParams {
                id,
                user_id,
                secret_hash: digest_secret(&secret),
                expires_at,
            })
            .await?;

        Ok(IssuedSession {
            token: format!("{}.{secret}", id.simple()),
            expires_at,
        })
    }

    /// Map a cookie token to its user. Unknown, tampered or expired tokens
    /// resolve to `None`.
    pub async fn resolve(&self, token: &str) -> Result<Option<UserRef>, AccountError> {
        let Some((id, secret)) = split_token(token) else {
            return Ok(None);
        };
        let Some(session) = self.sessions.find_session(id).await? else {
            return Ok(None);
        };

        let presented = digest_secret(secret);
        if !bool::from(presented.ct_eq(&session.secret_hash)) {
            return Ok(None);
        }

        if session.expires_at <= OffsetDateTime::now_utc() {
            self.sessions.delete_session(session.id).await?;
            return Ok(None);
        }

        let user = self.users.find_user_by_id(session.user_id).await?;
        Ok(user.map(|user| user.to_ref()))
    }

    /// End the session behind `token`, if it is still valid.
    pub async fn logout(&self, token: &str) -> Result<(), AccountError> {
        let Some((id, secret)) = split_token(token) else {
            return Ok(());
        };
        if let Some(session) = self.sessions.find_session(id).await?
            && bool::from(digest_secret(secret).ct_eq(&session.secret_hash))
        {
            self.sessions.delete_session(session.id).await?;
        }
        Ok(())
    }

    /// Drop sessions whose expiry has passed.
    pub async fn purge_expired_sessions(&self) -> Result<u64, AccountError> {
        let removed = self
            .sessions
            .delete_expired_sessions(OffsetDateTime::now_utc())
            .await?;
        if removed > 0 {
            info!(
                target = "yatube::application::accounts",
                removed, "purged expired sessions"
            );
        }
        Ok(removed)
    }
}

fn split_token(token: &str) -> Option<(Uuid, &str)> {
    let (id, secret) = token.split_once('.')?;
    if secret.is_empty() {
        return None;
    }
    Uuid::try_parse(id).ok().map(|id| (id, secret))
}

fn digest_secret(secret: &str) -> Vec<u8> {
    Sha256::digest(secret.as_bytes()).to_vec()
}

async fn hash_password(password: String) -> Result<String, AccountError> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| AccountError::Hashing(err.to_string()))
    })
    .await?
}

async fn verify_password(password: String, stored: String) -> Result<bool, AccountError> {
    tokio::task::spawn_blocking(move || {
        let parsed =
            PasswordHash::new(&stored).map_err(|err| AccountError::Hashing(err.to_string()))?;
        match Argon2::default().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(err) => Err(AccountError::Hashing(err.to_string())),
        }
    })
    .await?
}
