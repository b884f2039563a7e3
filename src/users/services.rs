use std::sync::Arc;

use anyhow::Context;
use axum::extract::FromRef;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        jwt::JwtKeys,
        password::{Argon2Hasher, PasswordHashing},
    },
    error::AccountError,
    state::AppState,
    users::{
        dto::{RegisterRequest, UpdateRequest},
        repo::{StoreError, UserStore},
        repo_types::{sanitize_profile, NewUser, User, UserPatch},
    },
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn checked_email(email: &str) -> Result<String, AccountError> {
    let email = normalize_email(email);
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(AccountError::Validation("Invalid email".into()));
    }
    Ok(email)
}

/// Path segments routed ahead of `/users/:roll_no`.
const RESERVED_ROLL_NOS: &[&str] = &["me", "login", "signup", "logout"];

fn checked_roll_no(roll_no: &str) -> Result<String, AccountError> {
    let roll_no = roll_no.trim();
    if roll_no.is_empty() {
        warn!("empty roll number");
        return Err(AccountError::Validation("Roll number is required".into()));
    }
    if RESERVED_ROLL_NOS.contains(&roll_no) {
        warn!(roll_no = %roll_no, "reserved roll number");
        return Err(AccountError::Validation("Roll number is reserved".into()));
    }
    Ok(roll_no.to_string())
}

/// A successful login: the record plus its freshly signed session token.
#[derive(Debug)]
pub struct Session {
    pub user: User,
    pub token: String,
}

/// Account lifecycle over a credential store and a token signer.
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn UserStore>,
    hasher: Arc<dyn PasswordHashing>,
    keys: JwtKeys,
}

impl FromRef<AppState> for AccountService {
    fn from_ref(state: &AppState) -> Self {
        state.accounts.clone()
    }
}

impl AccountService {
    pub fn new(store: Arc<dyn UserStore>, keys: JwtKeys) -> Self {
        Self::with_hasher(store, Arc::new(Argon2Hasher), keys)
    }

    pub fn with_hasher(
        store: Arc<dyn UserStore>,
        hasher: Arc<dyn PasswordHashing>,
        keys: JwtKeys,
    ) -> Self {
        Self {
            store,
            hasher,
            keys,
        }
    }

    // Argon2 is CPU-bound; keep it off the async workers.
    async fn hash(&self, plain: &str) -> Result<String, AccountError> {
        let hasher = self.hasher.clone();
        let plain = plain.to_owned();
        let digest = tokio::task::spawn_blocking(move || hasher.hash(&plain))
            .await
            .context("password hash task")??;
        Ok(digest)
    }

    async fn verify(&self, plain: &str, digest: &str) -> Result<bool, AccountError> {
        let hasher = self.hasher.clone();
        let plain = plain.to_owned();
        let digest = digest.to_owned();
        let ok = tokio::task::spawn_blocking(move || hasher.verify(&plain, &digest))
            .await
            .context("password verify task")??;
        Ok(ok)
    }

    /// Creates a record after both uniqueness checks pass. The store's own
    /// unique constraints catch registrations racing past the checks.
    pub async fn register(&self, req: RegisterRequest) -> Result<User, AccountError> {
        let email = checked_email(&req.email)?;
        let roll_no = checked_roll_no(&req.roll_no)?;

        if self.store.find_by_email(&email).await?.is_some() {
            warn!(email = %email, "signup rejected: email already exists");
            return Err(AccountError::DuplicateEmail);
        }
        if self.store.find_by_roll_no(&roll_no).await?.is_some() {
            warn!(roll_no = %roll_no, "signup rejected: roll number already exists");
            return Err(AccountError::DuplicateRollNo);
        }

        let password_hash = self.hash(&req.password).await?;
        let new_user = NewUser {
            id: Uuid::new_v4(),
            email,
            roll_no,
            password_hash,
            profile: sanitize_profile(req.profile),
        };

        let user = self.store.insert(new_user).await.map_err(|e| {
            if let StoreError::Conflict(field) = &e {
                warn!(?field, "signup rejected by unique constraint");
            }
            AccountError::from(e)
        })?;

        info!(user_id = %user.id, email = %user.email, "user registered");
        Ok(user)
    }

    /// Unknown email and wrong password fail identically.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Session, AccountError> {
        let email = normalize_email(email);

        let Some(user) = self.store.find_by_email(&email).await? else {
            // Same Argon2 cost as a wrong password; the outcome is ignored.
            let _ = self.verify(password, self.hasher.dummy_digest()).await;
            warn!(email = %email, "login unknown email");
            return Err(AccountError::InvalidCredentials);
        };

        if !self.verify(password, &user.password_hash).await? {
            warn!(email = %email, user_id = %user.id, "login invalid password");
            return Err(AccountError::InvalidCredentials);
        }

        let token = self.keys.sign(user.id)?;
        info!(user_id = %user.id, email = %user.email, "user logged in");
        Ok(Session { user, token })
    }

    /// Applies `req` to the record owned by `roll_no`. `Ok(None)` when no
    /// record matches.
    pub async fn update_by_roll_no(
        &self,
        roll_no: &str,
        req: UpdateRequest,
    ) -> Result<Option<User>, AccountError> {
        let email = req.email.as_deref().map(checked_email).transpose()?;
        let new_roll_no = req.roll_no.as_deref().map(checked_roll_no).transpose()?;
        let password_hash = match req.password.as_deref() {
            Some(plain) => Some(self.hash(plain).await?),
            None => None,
        };
        let patch = UserPatch {
            email,
            roll_no: new_roll_no,
            password_hash,
            profile: sanitize_profile(req.profile),
        };

        let updated = self
            .store
            .update_by_roll_no(roll_no, patch)
            .await
            .map_err(|e| {
                if let StoreError::Conflict(field) = &e {
                    warn!(roll_no = %roll_no, ?field, "update rejected by unique constraint");
                }
                AccountError::from(e)
            })?;

        match &updated {
            Some(user) => info!(roll_no = %roll_no, user_id = %user.id, "user updated"),
            None => warn!(roll_no = %roll_no, "update matched no user"),
        }
        Ok(updated)
    }

    pub async fn delete_by_roll_no(&self, roll_no: &str) -> Result<User, AccountError> {
        let Some(user) = self.store.delete_by_roll_no(roll_no).await? else {
            warn!(roll_no = %roll_no, "delete failed: user doesn't exist");
            return Err(AccountError::NotFound);
        };
        info!(roll_no = %roll_no, user_id = %user.id, "user deleted");
        Ok(user)
    }

    pub async fn fetch_by_roll_no(&self, roll_no: &str) -> Result<User, AccountError> {
        let Some(user) = self.store.find_by_roll_no(roll_no).await? else {
            warn!(roll_no = %roll_no, "fetch failed: user doesn't exist");
            return Err(AccountError::NotFound);
        };
        info!(roll_no = %roll_no, "user retrieved");
        Ok(user)
    }

    pub async fn fetch_by_id(&self, id: Uuid) -> Result<User, AccountError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or(AccountError::NotFound)
    }

    /// Sessions are client-held; ending one only tells the client to drop the
    /// cookie, the token stays valid until it expires.
    pub fn end_session(&self, user_id: Option<Uuid>) {
        match user_id {
            Some(id) => info!(user_id = %id, "user logged out"),
            None => info!(user_id = "unknown", "user logged out"),
        }
    }
}
