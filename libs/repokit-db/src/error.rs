use paging_core::PageError;
use sea_orm::DbErr;
use thiserror::Error;

/// Errors surfaced by repositories and the paginator.
///
/// Nothing here is logged or retried by the crate; every variant goes straight back to
/// the caller.
#[derive(Debug, Error)]
pub enum RepoError {
    /// A caller-supplied argument is out of range (`page_index`, `page_size`).
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The entity targeted by `update`/`delete` does not exist.
    #[error("{entity} with key {key} not found")]
    NotFound { entity: String, key: String },

    /// The entity mapping has no usable single-column primary key.
    #[error("cannot resolve primary key of `{entity}`: {reason}")]
    PrimaryKeyResolution { entity: String, reason: &'static str },

    /// The operation was cancelled through its cancellation token.
    #[error("operation cancelled")]
    Cancelled,

    /// Failure reported by the underlying store, passed through unmodified.
    #[error(transparent)]
    Store(#[from] DbErr),
}

impl From<PageError> for RepoError {
    fn from(err: PageError) -> Self {
        match err {
            PageError::InvalidArgument(name) => RepoError::InvalidArgument(name),
        }
    }
}

pub type RepoResult<T> = std::result::Result<T, RepoError>;
