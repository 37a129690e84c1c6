use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("authentication required")]
    Authentication,

    #[error("{0}")]
    Authorization(String),

    #[error("{0}")]
    Validation(String),

    #[error("version already exists")]
    VersionExists,

    #[error("payload too large")]
    PayloadTooLarge,

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("not found")]
    NotFound,

    #[error("identity provider error: {0}")]
    Provider(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
