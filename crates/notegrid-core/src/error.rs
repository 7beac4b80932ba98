//! Error types for the local database layer

use thiserror::Error;

/// Result type alias using notegrid-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while opening or migrating the local cache database
#[derive(Error, Debug)]
pub enum Error {
    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
