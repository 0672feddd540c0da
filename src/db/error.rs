use std::io::ErrorKind;

use thiserror::Error;

/// Failure of a statement run through the connection manager.
#[derive(Debug, Error)]
pub enum DbError {
    /// Plausibly fixed by retrying on a fresh connection.
    #[error("transient database error: {0}")]
    Transient(#[source] sqlx::Error),

    #[error("database error: {0}")]
    Permanent(#[source] sqlx::Error),

    #[error("database unavailable after {attempts} attempts: {source}")]
    ExhaustedRetries {
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },
}

impl DbError {
    pub fn is_transient(&self) -> bool {
        matches!(self, DbError::Transient(_))
    }

    /// True for a unique-constraint violation (SQLSTATE 23505).
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DbError::Permanent(sqlx::Error::Database(e)) => e.code().as_deref() == Some("23505"),
            _ => false,
        }
    }
}

impl From<sqlx::Error> for DbError {
    fn from(e: sqlx::Error) -> Self {
        if is_transient(&e) {
            DbError::Transient(e)
        } else {
            DbError::Permanent(e)
        }
    }
}

fn is_transient(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Io(io) => matches!(
            io.kind(),
            ErrorKind::ConnectionReset
                | ErrorKind::ConnectionRefused
                | ErrorKind::ConnectionAborted
                | ErrorKind::NotConnected
                | ErrorKind::BrokenPipe
                | ErrorKind::TimedOut
                | ErrorKind::UnexpectedEof
                | ErrorKind::Interrupted
        ),
        sqlx::Error::PoolTimedOut | sqlx::Error::WorkerCrashed | sqlx::Error::Protocol(_) => true,
        sqlx::Error::Database(db) => db.code().as_deref().is_some_and(is_transient_sqlstate),
        _ => false,
    }
}

/// Connection exceptions, server shutdown/startup and serialization conflicts.
pub(crate) fn is_transient_sqlstate(code: &str) -> bool {
    code.starts_with("08") || matches!(code, "57P01" | "57P02" | "57P03" | "40001" | "40P01")
}
