use axum::{
    extract::{rejection::JsonRejection, FromRef, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use tracing::{instrument, warn};

use super::{
    dto::{
        AuthResponse, LoginRequest, MessageResponse, PublicUser, RegisterRequest,
        UpdateProfileRequest,
    },
    errors::AuthError,
    extractors::AuthUser,
    oauth::{has_federation_secret, FederatedIdentity},
    services::AuthService,
};
use crate::state::AppState;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

pub fn federation_routes() -> Router<AppState> {
    Router::new().route("/auth/oauth/callback", post(oauth_callback))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me).patch(update_me).delete(delete_me))
}

#[instrument(skip(auth, payload))]
pub async fn register(
    State(auth): State<AuthService>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, AuthError> {
    let Json(payload) = payload?;
    let session = auth.register(payload).await?;
    Ok(Json(session.into_auth_response("User registered successfully")))
}

#[instrument(skip(auth, payload))]
pub async fn login(
    State(auth): State<AuthService>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, AuthError> {
    let Json(payload) = payload?;
    let session = auth.login(payload).await?;
    Ok(Json(session.into_auth_response("Login successful")))
}

/// Called by the provider adapter once it has verified the user with Google/Facebook.
#[instrument(skip(state, headers, payload))]
pub async fn oauth_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<FederatedIdentity>, JsonRejection>,
) -> Result<Json<AuthResponse>, AuthError> {
    let Some(expected) = state.config.federation_secret.as_deref() else {
        return Err(AuthError::Unauthenticated);
    };
    if !has_federation_secret(&headers, expected) {
        warn!("federation callback with missing or wrong secret");
        return Err(AuthError::Unauthenticated);
    }

    let Json(payload) = payload?;
    let session = AuthService::from_ref(&state).oauth_sign_in(payload).await?;
    Ok(Json(session.into_auth_response("Login successful")))
}

#[instrument(skip(auth))]
pub async fn get_me(
    State(auth): State<AuthService>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, AuthError> {
    Ok(Json(auth.current_user(user_id).await?))
}

#[instrument(skip(auth, payload))]
pub async fn update_me(
    State(auth): State<AuthService>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Result<Json<PublicUser>, AuthError> {
    let Json(payload) = payload?;
    Ok(Json(auth.update_profile(user_id, payload).await?))
}

#[instrument(skip(auth))]
pub async fn delete_me(
    State(auth): State<AuthService>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<MessageResponse>, AuthError> {
    auth.delete_account(user_id).await?;
    Ok(Json(MessageResponse {
        message: "Account deleted".into(),
    }))
}
