use std::sync::Arc;

use crate::{
    auth::{jwt::JwtKeys, password::PasswordHasher},
    config::AppConfig,
    users::UserStore,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub hasher: PasswordHasher,
    pub keys: JwtKeys,
}

impl AppState {
    pub fn from_parts(config: Arc<AppConfig>, users: Arc<dyn UserStore>) -> anyhow::Result<Self> {
        let hasher = PasswordHasher::new(&config.hash)?;
        let keys = JwtKeys::new(&config.jwt);
        Ok(Self {
            config,
            users,
            hasher,
            keys,
        })
    }

    /// In-memory store, cheap hashing, development defaults.
    #[cfg(test)]
    pub fn fake() -> Self {
        Self::fake_with(|_| None)
    }

    /// Like [`AppState::fake`] but with extra config keys.
    #[cfg(test)]
    pub fn fake_with<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        use crate::{config::HashConfig, users::memory::MemoryUserStore};

        let mut config = AppConfig::from_lookup(|key| match key {
            "JWT_SECRET" => Some("test".into()),
            other => lookup(other),
        })
        .expect("test config");
        config.hash = HashConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        };

        Self::from_parts(Arc::new(config), Arc::new(MemoryUserStore::new()))
            .expect("test state")
    }
}
