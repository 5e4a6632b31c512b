//! Fatal server errors.
//!
//! Anything in here stops the process before (or instead of) serving.
//! Per-message problems are [`shared::ProtocolError`]s and never end up here.

use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("can't read config {path}: {source}")]
    ConfigIo { path: PathBuf, source: io::Error },

    #[error("invalid config: {0}")]
    Config(String),

    #[error("can't access user database {path}: {source}")]
    DatabaseIo { path: PathBuf, source: io::Error },

    #[error("malformed user database {path}, line {line}: expected `login:password`")]
    DatabaseFormat { path: PathBuf, line: usize },

    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    #[error("can't listen on {addr}: {source}")]
    Bind { addr: String, source: io::Error },
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;
