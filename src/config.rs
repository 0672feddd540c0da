use std::time::Duration;

use anyhow::{bail, Context};

const DEV_JWT_SECRET: &str = "authflow-dev-secret-change-me";
/// Roughly 100 years.
const MAX_JWT_TTL_MINUTES: i64 = 60 * 24 * 366 * 100;

/// Deployment mode. Production tightens TLS, CORS and log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

/// Where the database lives: a connection string or discrete fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseSource {
    Url(String),
    Parts {
        host: String,
        port: u16,
        name: String,
        user: String,
        password: String,
    },
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub source: DatabaseSource,
    pub pool_max: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub require_tls: bool,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub ttl_minutes: i64,
}

/// Argon2 cost parameters.
#[derive(Debug, Clone, Copy)]
pub struct HashConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            memory_kib: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
            parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub host: String,
    pub port: u16,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub hash: HashConfig,
    pub cors_allowed_origin: Option<String>,
    pub federation_secret: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// True when no `JWT_SECRET` was given and the development fallback is in use.
    pub fn uses_dev_jwt_secret(&self) -> bool {
        self.jwt.secret == DEV_JWT_SECRET
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let environment = match var("APP_ENV").as_deref().map(str::to_ascii_lowercase) {
            None => Environment::Development,
            Some(v) if v == "development" || v == "dev" => Environment::Development,
            Some(v) if v == "production" || v == "prod" => Environment::Production,
            Some(other) => bail!("APP_ENV must be development or production, got {other:?}"),
        };
        let production = environment.is_production();

        let source = match var("DATABASE_URL") {
            Some(url) => DatabaseSource::Url(url),
            None => DatabaseSource::Parts {
                host: var("DB_HOST").unwrap_or_else(|| "localhost".into()),
                port: parse_or(&var, "DB_PORT", 5432)?,
                name: var("DB_NAME").unwrap_or_else(|| "authflow_db".into()),
                user: var("DB_USER").unwrap_or_else(|| "username".into()),
                password: var("DB_PASSWORD").unwrap_or_else(|| "password".into()),
            },
        };

        let database = DatabaseConfig {
            source,
            pool_max: parse_or(&var, "DB_POOL_MAX", 1)?,
            acquire_timeout: Duration::from_millis(parse_or(&var, "DB_ACQUIRE_TIMEOUT_MS", 2_000)?),
            idle_timeout: Duration::from_millis(parse_or(&var, "DB_IDLE_TIMEOUT_MS", 30_000)?),
            max_retries: parse_or(&var, "DB_MAX_RETRIES", 2)?,
            retry_base_delay: Duration::from_millis(parse_or(&var, "DB_RETRY_BASE_MS", 100)?),
            require_tls: production,
        };
        if database.pool_max == 0 {
            bail!("DB_POOL_MAX must be at least 1");
        }

        let secret = match var("JWT_SECRET") {
            Some(secret) => secret,
            None if production => bail!("JWT_SECRET is required when APP_ENV=production"),
            None => DEV_JWT_SECRET.to_string(),
        };
        let jwt = JwtConfig {
            secret,
            issuer: var("JWT_ISSUER").unwrap_or_else(|| "authflow-app".into()),
            ttl_minutes: parse_or(&var, "JWT_TTL_MINUTES", 60 * 24 * 7)?,
        };
        if jwt.ttl_minutes <= 0 || jwt.ttl_minutes > MAX_JWT_TTL_MINUTES {
            bail!("JWT_TTL_MINUTES must be between 1 and {MAX_JWT_TTL_MINUTES}");
        }

        let defaults = HashConfig::default();
        let hash = HashConfig {
            memory_kib: parse_or(&var, "HASH_MEMORY_KIB", defaults.memory_kib)?,
            iterations: parse_or(&var, "HASH_ITERATIONS", defaults.iterations)?,
            parallelism: parse_or(&var, "HASH_PARALLELISM", defaults.parallelism)?,
        };

        let cors_allowed_origin = var("CORS_ALLOWED_ORIGIN");
        if production && cors_allowed_origin.is_none() {
            bail!("CORS_ALLOWED_ORIGIN is required when APP_ENV=production");
        }

        Ok(Self {
            environment,
            host: var("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&var, "APP_PORT", 8080)?,
            database,
            jwt,
            hash,
            cors_allowed_origin,
            federation_secret: var("OAUTH_FEDERATION_SECRET"),
        })
    }
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_to_development_with_discrete_database_fields() {
        let cfg = config_from(&[]).expect("defaults should load");
        assert_eq!(cfg.environment, Environment::Development);
        assert_eq!(
            cfg.database.source,
            DatabaseSource::Parts {
                host: "localhost".into(),
                port: 5432,
                name: "authflow_db".into(),
                user: "username".into(),
                password: "password".into(),
            }
        );
        assert_eq!(cfg.database.pool_max, 1);
        assert_eq!(cfg.database.max_retries, 2);
        assert_eq!(cfg.database.acquire_timeout, Duration::from_secs(2));
        assert!(!cfg.database.require_tls);
        assert_eq!(cfg.jwt.issuer, "authflow-app");
        assert_eq!(cfg.jwt.ttl_minutes, 10_080);
        assert_eq!(cfg.jwt.secret, DEV_JWT_SECRET);
        assert!(cfg.uses_dev_jwt_secret());
        assert!(cfg.federation_secret.is_none());
    }

    #[test]
    fn database_url_wins_over_discrete_fields() {
        let cfg = config_from(&[
            ("DATABASE_URL", "postgres://u:p@db:5432/auth"),
            ("DB_HOST", "ignored"),
        ])
        .unwrap();
        assert_eq!(
            cfg.database.source,
            DatabaseSource::Url("postgres://u:p@db:5432/auth".into())
        );
    }

    #[test]
    fn production_requires_secret_and_origin() {
        let err = config_from(&[("APP_ENV", "production")]).unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));

        let err = config_from(&[("APP_ENV", "production"), ("JWT_SECRET", "s3cret")]).unwrap_err();
        assert!(err.to_string().contains("CORS_ALLOWED_ORIGIN"));

        let cfg = config_from(&[
            ("APP_ENV", "production"),
            ("JWT_SECRET", "s3cret"),
            ("CORS_ALLOWED_ORIGIN", "https://authflow.example.com"),
        ])
        .unwrap();
        assert!(cfg.database.require_tls);
        assert_eq!(cfg.jwt.secret, "s3cret");
    }

    #[test]
    fn rejects_garbage_numbers_and_unknown_environment() {
        let err = config_from(&[("DB_POOL_MAX", "lots")]).unwrap_err();
        assert!(err.to_string().contains("DB_POOL_MAX"));

        let err = config_from(&[("APP_ENV", "staging")]).unwrap_err();
        assert!(err.to_string().contains("APP_ENV"));

        assert!(config_from(&[("DB_POOL_MAX", "0")]).is_err());
    }

    #[test]
    fn explicit_secret_is_not_the_dev_fallback() {
        let cfg = config_from(&[("JWT_SECRET", "s3cret")]).unwrap();
        assert!(!cfg.uses_dev_jwt_secret());
    }

    #[test]
    fn token_lifetime_is_bounded() {
        assert!(config_from(&[("JWT_TTL_MINUTES", "0")]).is_err());
        let err = config_from(&[("JWT_TTL_MINUTES", "1000000000000")]).unwrap_err();
        assert!(err.to_string().contains("JWT_TTL_MINUTES"));
        let cfg = config_from(&[("JWT_TTL_MINUTES", "52704000")]).unwrap();
        assert_eq!(cfg.jwt.ttl_minutes, MAX_JWT_TTL_MINUTES);
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let cfg = config_from(&[("JWT_ISSUER", "  "), ("APP_PORT", "")]).unwrap();
        assert_eq!(cfg.jwt.issuer, "authflow-app");
        assert_eq!(cfg.port, 8080);
    }
}
