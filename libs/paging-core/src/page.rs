use serde::Serialize;

use crate::{PageError, Result};

/// Largest OFFSET/LIMIT the stores accept (signed 64-bit in SQL engines).
const MAX_OFFSET: u64 = i64::MAX as u64;

/// A validated 1-based page request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    page_index: u64,
    page_size: u64,
}

impl PageRequest {
    /// Validate a page request.
    ///
    /// Fails with `InvalidArgument("page_index")` when `page_index < 1` or when the
    /// resulting offset cannot be expressed, and with `InvalidArgument("page_size")`
    /// when `page_size < 1`.
    pub fn new(page_index: u64, page_size: u64) -> Result<Self> {
        if page_index < 1 {
            return Err(PageError::InvalidArgument("page_index"));
        }
        if page_size < 1 {
            return Err(PageError::InvalidArgument("page_size"));
        }
        match (page_index - 1).checked_mul(page_size) {
            Some(offset) if offset <= MAX_OFFSET => Ok(Self {
                page_index,
                page_size,
            }),
            _ => Err(PageError::InvalidArgument("page_index")),
        }
    }

    pub fn page_index(&self) -> u64 {
        self.page_index
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Number of rows to skip before the requested page.
    pub fn offset(&self) -> u64 {
        (self.page_index - 1) * self.page_size
    }

    /// Maximum number of rows on the requested page, capped at what a store LIMIT
    /// accepts. `page_size` itself is left as requested.
    pub fn limit(&self) -> u64 {
        self.page_size.min(MAX_OFFSET)
    }
}

/// `ceil(total_count / page_size)`, 0 for an empty set.
///
/// `page_size` must be non-zero; [`PageRequest`] guarantees it.
pub fn total_pages(total_count: u64, page_size: u64) -> u64 {
    if total_count == 0 {
        0
    } else {
        total_count.div_ceil(page_size)
    }
}

/// One page of results together with the counts it was sliced from.
///
/// A `PagedResult` is a detached snapshot: it keeps no handle to the query or the
/// connection that produced it. It can only be built from a finished evaluation via
/// [`PagedResult::new`], and its paging metadata is read-only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PagedResult<T> {
    page_index: u64,
    page_size: u64,
    total_count: u64,
    total_pages: u64,
    items: Vec<T>,
}

impl<T> PagedResult<T> {
    /// Assemble a page from the slice and the count observed for `request`.
    pub fn new(items: Vec<T>, total_count: u64, request: PageRequest) -> Self {
        Self {
            page_index: request.page_index(),
            page_size: request.page_size(),
            total_count,
            total_pages: total_pages(total_count, request.page_size()),
            items,
        }
    }

    pub fn page_index(&self) -> u64 {
        self.page_index
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn total_pages(&self) -> u64 {
        self.total_pages
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_previous_page(&self) -> bool {
        self.page_index > 1
    }

    pub fn has_next_page(&self) -> bool {
        self.page_index < self.total_pages
    }

    /// Map items while keeping the paging metadata (model -> DTO convenience).
    pub fn map_items<U>(self, f: impl FnMut(T) -> U) -> PagedResult<U> {
        PagedResult {
            page_index: self.page_index,
            page_size: self.page_size,
            total_count: self.total_count,
            total_pages: self.total_pages,
            items: self.items.into_iter().map(f).collect(),
        }
    }
}
