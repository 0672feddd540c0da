use std::{fmt, time::Instant};

use sqlx::{
    postgres::{PgArguments, PgConnectOptions, PgPoolOptions, PgRow, PgSslMode},
    query::Query,
    Connection, FromRow, PgPool, Postgres,
};
use tracing::{debug, error, info, warn};

use crate::config::{DatabaseConfig, DatabaseSource};

mod error;
mod retry;

pub use error::DbError;
pub use retry::{with_retry, Attempted, RetryPolicy};

/// A named SQL statement. The name is what gets logged instead of the SQL text.
#[derive(Debug, Clone, Copy)]
pub struct Statement {
    pub name: &'static str,
    pub sql: &'static str,
}

const PING: Statement = Statement {
    name: "ping",
    sql: "SELECT 1",
};

/// Bind parameter for [`ConnectionManager::execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    Int(i64),
    Text(String),
    NullableText(Option<String>),
}

impl From<i64> for Param {
    fn from(v: i64) -> Self {
        Param::Int(v)
    }
}

impl From<&str> for Param {
    fn from(v: &str) -> Self {
        Param::Text(v.to_string())
    }
}

impl From<String> for Param {
    fn from(v: String) -> Self {
        Param::Text(v)
    }
}

impl From<Option<String>> for Param {
    fn from(v: Option<String>) -> Self {
        Param::NullableText(v)
    }
}

/// Rows returned by a statement.
#[derive(Default)]
pub struct RowSet {
    rows: Vec<PgRow>,
}

impl fmt::Debug for RowSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowSet").field("rows", &self.rows.len()).finish()
    }
}

impl RowSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first_as<T>(&self) -> Result<Option<T>, DbError>
    where
        T: for<'r> FromRow<'r, PgRow>,
    {
        self.rows
            .first()
            .map(|row| T::from_row(row))
            .transpose()
            .map_err(DbError::from)
    }
}

/// Pooled Postgres access with retry on transient failures.
///
/// Built once at startup with [`ConnectionManager::connect`], cloned into whatever
/// needs the database, and drained with [`ConnectionManager::close`] on shutdown.
#[derive(Clone)]
pub struct ConnectionManager {
    pool: PgPool,
    retry: RetryPolicy,
    verbose: bool,
}

impl ConnectionManager {
    /// Creates the pool. Connections are opened lazily on first use.
    pub fn connect(cfg: &DatabaseConfig, verbose: bool) -> Result<Self, DbError> {
        let options = connect_options(cfg)?;
        let pool = PgPoolOptions::new()
            .max_connections(cfg.pool_max)
            .acquire_timeout(cfg.acquire_timeout)
            .idle_timeout(Some(cfg.idle_timeout))
            .connect_lazy_with(options);
        let retry = RetryPolicy {
            max_retries: cfg.max_retries,
            base_delay: cfg.retry_base_delay,
        };
        Ok(Self::from_pool(pool, retry, verbose))
    }

    pub fn from_pool(pool: PgPool, retry: RetryPolicy, verbose: bool) -> Self {
        Self {
            pool,
            retry,
            verbose,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs `stmt` with `params`, retrying transient failures on fresh connections.
    pub async fn execute(&self, stmt: Statement, params: &[Param]) -> Result<RowSet, DbError> {
        let started = Instant::now();
        let result = with_retry(&self.retry, |_| self.run_once(stmt, params)).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(Attempted { value, attempts }) => {
                let rows = value.len();
                if self.verbose {
                    info!(
                        statement = stmt.name,
                        duration_ms,
                        rows,
                        attempts,
                        "executed statement"
                    );
                } else if attempts > 1 {
                    warn!(
                        statement = stmt.name,
                        duration_ms,
                        rows,
                        attempts,
                        "statement succeeded after retry"
                    );
                } else {
                    debug!(
                        statement = stmt.name,
                        duration_ms,
                        rows,
                        attempts,
                        "executed statement"
                    );
                }
                Ok(value)
            }
            Err(e) => {
                match &e {
                    DbError::ExhaustedRetries { attempts, .. } => error!(
                        statement = stmt.name,
                        duration_ms,
                        attempts,
                        error = %e,
                        "statement failed"
                    ),
                    _ => warn!(statement = stmt.name, duration_ms, error = %e, "statement failed"),
                }
                Err(e)
            }
        }
    }

    /// Single acquire/run/release cycle. A connection that failed transiently is
    /// closed instead of going back to the pool.
    async fn run_once(&self, stmt: Statement, params: &[Param]) -> Result<RowSet, DbError> {
        let mut conn = self.pool.acquire().await?;
        let result = bind_all(stmt.sql, params).fetch_all(&mut *conn).await;
        match result {
            Ok(rows) => Ok(RowSet { rows }),
            Err(e) => {
                let e = DbError::from(e);
                if e.is_transient() {
                    if let Err(close_err) = conn.detach().close().await {
                        debug!(error = %close_err, "closing failed connection");
                    }
                }
                Err(e)
            }
        }
    }

    /// Connection test: `SELECT 1` through the retry envelope.
    pub async fn ping(&self) -> Result<(), DbError> {
        self.execute(PING, &[]).await.map(|_| ())
    }

    /// Waits for leased connections to come back, then closes the pool.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("database pool closed");
    }
}

fn bind_all<'q>(sql: &'q str, params: &'q [Param]) -> Query<'q, Postgres, PgArguments> {
    params.iter().fold(sqlx::query(sql), |q, p| match p {
        Param::Int(v) => q.bind(*v),
        Param::Text(v) => q.bind(v.as_str()),
        Param::NullableText(v) => q.bind(v.as_deref()),
    })
}

fn connect_options(cfg: &DatabaseConfig) -> Result<PgConnectOptions, DbError> {
    let options = match &cfg.source {
        DatabaseSource::Url(url) => url.parse::<PgConnectOptions>()?,
        DatabaseSource::Parts {
            host,
            port,
            name,
            user,
            password,
        } => PgConnectOptions::new()
            .host(host)
            .port(*port)
            .database(name)
            .username(user)
            .password(password),
    };
    Ok(if cfg.require_tls {
        options.ssl_mode(PgSslMode::Require)
    } else {
        options
    })
}
