//! Storage-agnostic paging primitives.
//!
//! This crate holds the pieces of offset pagination that do not touch a database:
//! request validation ([`PageRequest`]), the detached result snapshot ([`PagedResult`])
//! and the parser for eager-load directives ([`IncludePaths`]). The SeaORM side lives
//! in `repokit-db`.

pub mod include;
pub mod page;

pub use include::IncludePaths;
pub use page::{total_pages, PageRequest, PagedResult};

use thiserror::Error;

/// Errors raised while validating paging input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PageError {
    /// The named argument is out of its accepted range.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

pub type Result<T> = std::result::Result<T, PageError>;
