use std::sync::Arc;

use anyhow::Context;
use axum::extract::FromRef;
use lazy_static::lazy_static;
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use regex::Regex;
use tracing::{info, warn};

use super::{
    dto::{LoginRequest, PublicUser, RegisterRequest, Session, UpdateProfileRequest},
    errors::AuthError,
    jwt::JwtKeys,
    oauth::FederatedIdentity,
    password::PasswordHasher,
};
use crate::{
    state::AppState,
    users::{Email, NewUser, User, UserStore, UserUpdate},
};

const MIN_PASSWORD_LEN: usize = 6;
const PLACEHOLDER_PASSWORD_LEN: usize = 32;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Present and non-blank; returns the trimmed value.
fn required_trimmed<'a>(
    field: &'static str,
    label: &str,
    value: Option<&'a str>,
) -> Result<&'a str, AuthError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AuthError::validation(field, format!("{label} is required")))
}

/// Present and non-empty; passwords are never trimmed.
fn required_password(value: Option<&str>) -> Result<&str, AuthError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AuthError::validation("password", "Password is required"))
}

fn valid_email(raw: &str) -> Result<Email, AuthError> {
    let email = Email::normalize(raw);
    if !is_valid_email(email.as_str()) {
        return Err(AuthError::validation(
            "email",
            "Please enter a valid email address",
        ));
    }
    Ok(email)
}

fn check_password_len(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::validation(
            "password",
            format!("Password must be at least {MIN_PASSWORD_LEN} characters long"),
        ));
    }
    Ok(())
}

/// Fallback display name for federated users without one: the email's local part.
fn name_from_email(email: &Email) -> String {
    email
        .as_str()
        .split('@')
        .next()
        .unwrap_or_default()
        .to_string()
}

fn placeholder_password() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(PLACEHOLDER_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

/// Register / login / federated sign-in and account self-service.
/// Stateless: everything it knows lives in the `UserStore`.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    hasher: PasswordHasher,
    keys: JwtKeys,
}

impl FromRef<AppState> for AuthService {
    fn from_ref(state: &AppState) -> Self {
        Self::new(state.users.clone(), state.hasher.clone(), state.keys.clone())
    }
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>, hasher: PasswordHasher, keys: JwtKeys) -> Self {
        Self {
            users,
            hasher,
            keys,
        }
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<Session, AuthError> {
        let name = required_trimmed("name", "Name", req.name.as_deref())?;
        let raw_email = required_trimmed("email", "Email", req.email.as_deref())?;
        let password = required_password(req.password.as_deref())?;
        let email = valid_email(raw_email)?;
        check_password_len(password)?;

        if self.users.find_by_email(&email).await?.is_some() {
            warn!(email = %email, "email already registered");
            return Err(AuthError::DuplicateEmail);
        }

        let password_hash = self.hash_password(password.to_string()).await?;
        // A concurrent registration can slip past the check above; the store's
        // unique constraint reports it as DuplicateEmail.
        let user = self
            .users
            .create(NewUser {
                name: name.to_string(),
                email,
                password_hash,
            })
            .await?;

        info!(user_id = user.id, email = %user.email, "user registered");
        self.session_for(user)
    }

    pub async fn login(&self, req: LoginRequest) -> Result<Session, AuthError> {
        let raw_email = required_trimmed("email", "Email", req.email.as_deref())?;
        let password = required_password(req.password.as_deref())?;
        let email = Email::normalize(raw_email);

        let Some(user) = self.users.find_by_email(&email).await? else {
            warn!(email = %email, "login unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        if !self
            .verify_password(password.to_string(), user.password.clone())
            .await?
        {
            warn!(user_id = user.id, "login invalid password");
            return Err(AuthError::InvalidCredentials);
        }

        info!(user_id = user.id, email = %user.email, "user logged in");
        self.session_for(user)
    }

    /// Finds or provisions the user behind a federated identity. Provisioned users
    /// get a random placeholder password nobody knows.
    pub async fn oauth_sign_in(&self, identity: FederatedIdentity) -> Result<Session, AuthError> {
        let raw_email = required_trimmed("email", "Email", identity.email.as_deref())?;
        let email = valid_email(raw_email)?;

        if let Some(user) = self.users.find_by_email(&email).await? {
            info!(provider = ?identity.provider, user_id = user.id, "federated sign-in");
            return self.session_for(user);
        }

        let name = identity
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| name_from_email(&email));
        let password_hash = self.hash_password(placeholder_password()).await?;
        let (user, created) = self
            .users
            .find_or_provision(NewUser {
                name,
                email,
                password_hash,
            })
            .await?;

        info!(provider = ?identity.provider, user_id = user.id, created, "federated sign-in");
        self.session_for(user)
    }

    pub async fn current_user(&self, user_id: i64) -> Result<PublicUser, AuthError> {
        self.users
            .find_by_id(user_id)
            .await?
            .map(PublicUser::from)
            .ok_or(AuthError::UserNotFound)
    }

    pub async fn update_profile(
        &self,
        user_id: i64,
        req: UpdateProfileRequest,
    ) -> Result<PublicUser, AuthError> {
        let mut changes = UserUpdate::default();
        if let Some(name) = req.name.as_deref() {
            let name = name.trim();
            if name.is_empty() {
                return Err(AuthError::validation("name", "Name cannot be empty"));
            }
            changes.name = Some(name.to_string());
        }
        if let Some(raw_email) = req.email.as_deref() {
            changes.email = Some(valid_email(raw_email)?);
        }
        if let Some(password) = req.password {
            check_password_len(&password)?;
            changes.password_hash = Some(self.hash_password(password).await?);
        }
        if changes.is_empty() {
            return Err(AuthError::validation("body", "No fields to update"));
        }

        let user = self
            .users
            .update(user_id, changes)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        info!(user_id, "profile updated");
        Ok(user.into())
    }

    pub async fn delete_account(&self, user_id: i64) -> Result<(), AuthError> {
        if !self.users.delete(user_id).await? {
            return Err(AuthError::UserNotFound);
        }
        info!(user_id, "account deleted");
        Ok(())
    }

    fn session_for(&self, user: User) -> Result<Session, AuthError> {
        let token = self.keys.issue(user.id, &user.email)?;
        Ok(Session {
            user: user.into(),
            token,
        })
    }

    async fn hash_password(&self, plain: String) -> Result<String, AuthError> {
        let hasher = self.hasher.clone();
        let hash = tokio::task::spawn_blocking(move || hasher.hash(&plain))
            .await
            .context("password hashing task")??;
        Ok(hash)
    }

    async fn verify_password(&self, plain: String, hash: String) -> Result<bool, AuthError> {
        let hasher = self.hasher.clone();
        let ok = tokio::task::spawn_blocking(move || hasher.verify(&plain, &hash))
            .await
            .context("password verification task")?;
        Ok(ok)
    }
}
