//! Offset pagination over any [`PageSource`].

use async_trait::async_trait;
use paging_core::{PageRequest, PagedResult};
use sea_orm::{ConnectionTrait, DbErr, EntityTrait, PaginatorTrait, QuerySelect};
use tokio_util::sync::CancellationToken;

use crate::cancel;
use crate::entity::{entity_name, Include};
use crate::error::RepoResult;
use crate::query::ComposedQuery;

/// Something that can count its rows and hand out an `offset`/`limit` slice.
///
/// Each call is one store round-trip. Nothing ties the two calls together: rows written
/// between `count` and `fetch` are visible to `fetch` only.
#[async_trait]
pub trait PageSource: Send + Sync {
    type Item: Send;

    async fn count(&self) -> Result<u64, DbErr>;

    async fn fetch(&self, offset: u64, limit: u64) -> Result<Vec<Self::Item>, DbErr>;
}

/// A composed query bound to a connection.
///
/// `fetch` also runs the query's include directives against the fetched slice, one
/// loader call per path.
pub struct SelectSource<'a, E: EntityTrait, C> {
    query: ComposedQuery<E>,
    conn: &'a C,
}

impl<'a, E: EntityTrait, C> SelectSource<'a, E, C> {
    pub fn new(query: ComposedQuery<E>, conn: &'a C) -> Self {
        Self { query, conn }
    }

    pub fn query(&self) -> &ComposedQuery<E> {
        &self.query
    }
}

impl<'a, E, C> SelectSource<'a, E, C>
where
    E: Include,
    C: ConnectionTrait + Send + Sync,
{
    /// Fetch every matching row, then run includes.
    pub async fn fetch_all(&self) -> Result<Vec<E::Model>, DbErr> {
        let mut rows = self.query.select().clone().all(self.conn).await?;
        self.load_includes(&mut rows).await?;
        Ok(rows)
    }

    /// Fetch at most one row, then run includes on it.
    pub async fn fetch_one(&self) -> Result<Option<E::Model>, DbErr> {
        let row = self.query.select().clone().one(self.conn).await?;
        let mut rows: Vec<E::Model> = row.into_iter().collect();
        self.load_includes(&mut rows).await?;
        Ok(rows.pop())
    }

    /// Every loader runs, even on an empty slice, so an unknown path fails the same
    /// way whatever the query matched.
    async fn load_includes(&self, rows: &mut [E::Model]) -> Result<(), DbErr> {
        for path in self.query.includes().iter() {
            tracing::trace!(entity = %entity_name::<E>(), path, rows = rows.len(), "loading include");
            E::include(path, rows, self.conn).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl<'a, E, C> PageSource for SelectSource<'a, E, C>
where
    E: Include,
    E::Model: Sync,
    C: ConnectionTrait + Send + Sync,
{
    type Item = E::Model;

    async fn count(&self) -> Result<u64, DbErr> {
        PaginatorTrait::count(self.query.select().clone(), self.conn).await
    }

    async fn fetch(&self, offset: u64, limit: u64) -> Result<Vec<E::Model>, DbErr> {
        let mut rows = self
            .query
            .select()
            .clone()
            .offset(offset)
            .limit(limit)
            .all(self.conn)
            .await?;
        self.load_includes(&mut rows).await?;
        Ok(rows)
    }
}

/// Offset paginator: one count round-trip, then one bounded fetch round-trip.
pub struct Paginator;

impl Paginator {
    /// Return page `page_index` (1-based) of `page_size` items from `source`.
    ///
    /// Arguments are validated before any round-trip. A page past the end yields no
    /// items with `total_pages` computed normally. The two round-trips are not atomic.
    pub async fn paginate<S>(
        source: &S,
        page_index: u64,
        page_size: u64,
        cancel: Option<&CancellationToken>,
    ) -> RepoResult<PagedResult<S::Item>>
    where
        S: PageSource + ?Sized,
    {
        let request = PageRequest::new(page_index, page_size)?;

        let total_count = cancel::run(cancel, source.count()).await?;
        let items = cancel::run(cancel, source.fetch(request.offset(), request.limit())).await?;

        tracing::debug!(
            page_index,
            page_size,
            total_count,
            items = items.len(),
            "page fetched"
        );
        Ok(PagedResult::new(items, total_count, request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RepoError;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory source over `0..n`; optional rows appended between count and fetch.
    struct VecSource {
        rows: Mutex<Vec<u32>>,
        grow_after_count: Vec<u32>,
        calls: AtomicUsize,
    }

    impl VecSource {
        fn new(n: u32) -> Self {
            Self {
                rows: Mutex::new((1..=n).collect()),
                grow_after_count: Vec::new(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PageSource for VecSource {
        type Item = u32;

        async fn count(&self) -> Result<u64, DbErr> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut rows = self.rows.lock();
            let total = rows.len() as u64;
            rows.extend(self.grow_after_count.iter().copied());
            Ok(total)
        }

        async fn fetch(&self, offset: u64, limit: u64) -> Result<Vec<u32>, DbErr> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let rows = self.rows.lock();
            Ok(rows
                .iter()
                .skip(offset as usize)
                .take(limit as usize)
                .copied()
                .collect())
        }
    }

    struct StuckSource;

    #[async_trait]
    impl PageSource for StuckSource {
        type Item = ();

        async fn count(&self) -> Result<u64, DbErr> {
            std::future::pending().await
        }

        async fn fetch(&self, _offset: u64, _limit: u64) -> Result<Vec<()>, DbErr> {
            Ok(Vec::new())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl PageSource for FailingSource {
        type Item = ();

        async fn count(&self) -> Result<u64, DbErr> {
            Ok(3)
        }

        async fn fetch(&self, _offset: u64, _limit: u64) -> Result<Vec<()>, DbErr> {
            Err(DbErr::Custom("connection reset".into()))
        }
    }

    #[tokio::test]
    async fn test_pages_of_ten_rows() {
        let src = VecSource::new(10);

        let first = Paginator::paginate(&src, 1, 5, None).await.unwrap();
        assert_eq!(first.items(), &[1, 2, 3, 4, 5]);
        assert_eq!(first.total_count(), 10);
        assert_eq!(first.total_pages(), 2);
        assert!(first.has_next_page());
        assert!(!first.has_previous_page());

        let second = Paginator::paginate(&src, 2, 5, None).await.unwrap();
        assert_eq!(second.items(), &[6, 7, 8, 9, 10]);
        assert!(!second.has_next_page());
    }

    #[tokio::test]
    async fn test_last_page_is_short() {
        let src = VecSource::new(7);
        let page = Paginator::paginate(&src, 3, 3, None).await.unwrap();
        assert_eq!(page.items(), &[7]);
        assert_eq!(page.total_pages(), 3);
    }

    #[tokio::test]
    async fn test_page_beyond_last_is_empty() {
        let src = VecSource::new(4);
        let page = Paginator::paginate(&src, 9, 2, None).await.unwrap();
        assert!(page.is_empty());
        assert_eq!(page.page_index(), 9);
        assert_eq!(page.total_count(), 4);
        assert_eq!(page.total_pages(), 2);
    }

    #[tokio::test]
    async fn test_empty_source() {
        let src = VecSource::new(0);
        let page = Paginator::paginate(&src, 1, 10, None).await.unwrap();
        assert!(page.is_empty());
        assert_eq!(page.total_count(), 0);
        assert_eq!(page.total_pages(), 0);
        assert!(!page.has_next_page());
    }

    #[tokio::test]
    async fn test_invalid_arguments_fail_before_any_round_trip() {
        let src = VecSource::new(3);

        let err = Paginator::paginate(&src, 0, 5, None).await.unwrap_err();
        assert!(matches!(err, RepoError::InvalidArgument("page_index")));

        let err = Paginator::paginate(&src, 1, 0, None).await.unwrap_err();
        assert!(matches!(err, RepoError::InvalidArgument("page_size")));

        let err = Paginator::paginate(&src, u64::MAX, u64::MAX, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::InvalidArgument(_)));

        assert_eq!(src.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_count_fetch_window_is_not_masked() {
        let mut src = VecSource::new(10);
        src.grow_after_count = vec![11, 12, 13];

        let page = Paginator::paginate(&src, 2, 8, None).await.unwrap();
        // Count saw 10 rows; the fetch saw 13.
        assert_eq!(page.total_count(), 10);
        assert_eq!(page.total_pages(), 2);
        assert_eq!(page.items(), &[9, 10, 11, 12, 13]);
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let err = Paginator::paginate(&FailingSource, 1, 2, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::Store(DbErr::Custom(ref m)) if m == "connection reset"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let src = VecSource::new(3);
        let token = CancellationToken::new();
        token.cancel();

        let err = Paginator::paginate(&src, 1, 2, Some(&token))
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::Cancelled));
        assert_eq!(src.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancelled_during_count() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = Paginator::paginate(&StuckSource, 1, 2, Some(&token))
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::Cancelled));
    }
}
