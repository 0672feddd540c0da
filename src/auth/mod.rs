use axum::Router;

use crate::{config::AppConfig, state::AppState};

pub mod claims;
pub mod dto;
pub mod errors;
pub(crate) mod extractors;
pub mod handlers;
pub mod jwt;
pub mod oauth;
pub mod password;
pub mod services;

pub use errors::AuthError;
pub use services::AuthService;

/// The federation callback only exists when a federation secret is configured.
pub fn router(config: &AppConfig) -> Router<AppState> {
    let router = Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::me_routes());
    if config.federation_secret.is_some() {
        router.merge(handlers::federation_routes())
    } else {
        router
    }
}
