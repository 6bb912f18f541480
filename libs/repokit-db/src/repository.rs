//! Entity-agnostic repository: retrieval, pagination and a staged unit of work.

use std::sync::OnceLock;

use paging_core::{IncludePaths, PagedResult};
use parking_lot::Mutex;
use sea_orm::sea_query::IntoCondition;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, IntoActiveModel, Iterable,
    ModelTrait, PaginatorTrait, QueryFilter, TransactionTrait,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cancel;
use crate::entity::{entity_name, resolve_key_column, Include, KeyedEntity};
use crate::error::{RepoError, RepoResult};
use crate::paginator::{Paginator, SelectSource};
use crate::query::{ComposedQuery, QueryComposer, QueryOptions};

/// Options for single-entity lookups.
#[derive(Clone, Debug, Default)]
pub struct LookupOptions {
    pub include: IncludePaths,
    pub cancel: Option<CancellationToken>,
}

impl LookupOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include(mut self, paths: &str) -> Self {
        self.include.extend_from(paths);
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Options for `add`, `update` and `delete`.
///
/// With `persist_now` the call commits every pending change, its own included, before
/// returning.
#[derive(Clone, Debug, Default)]
pub struct WriteOptions {
    pub persist_now: bool,
    pub cancel: Option<CancellationToken>,
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn persist_now(mut self) -> Self {
        self.persist_now = true;
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

enum PendingChange<E: KeyedEntity> {
    Insert(E::Model),
    Update(E::Key, E::Model),
    Delete(E::Key),
}

/// Generic repository for entity `E` over connection `C`.
///
/// `C` is usually a pooled `DatabaseConnection`; wrapping a `DatabaseTransaction` makes
/// every read and commit of the repository part of that outer transaction, which the
/// caller finishes after [`Repository::into_inner`].
///
/// Writes are staged in memory and applied by [`Repository::commit`] in one store
/// transaction, in staging order.
pub struct Repository<E: KeyedEntity, C> {
    conn: C,
    key_column: OnceLock<E::Column>,
    pending: Mutex<Vec<PendingChange<E>>>,
}

impl<E: KeyedEntity, C> Repository<E, C> {
    pub fn new(conn: C) -> Self {
        Self {
            conn,
            key_column: OnceLock::new(),
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    /// Unwrap the connection. Pending changes are discarded.
    pub fn into_inner(self) -> C {
        self.conn
    }

    /// Number of staged changes not yet committed.
    pub fn pending_changes(&self) -> usize {
        self.pending.lock().len()
    }

    /// Drop every staged change without touching the store; returns how many were dropped.
    pub fn discard_pending(&self) -> usize {
        let dropped = std::mem::take(&mut *self.pending.lock()).len();
        if dropped > 0 {
            debug!(entity = %entity_name::<E>(), dropped, "discarded pending changes");
        }
        dropped
    }

    fn key_column(&self) -> RepoResult<E::Column> {
        if let Some(col) = self.key_column.get() {
            return Ok(*col);
        }
        let col = resolve_key_column::<E>()?;
        let _ = self.key_column.set(col);
        Ok(col)
    }

    fn stage(&self, change: PendingChange<E>) {
        self.pending.lock().push(change);
    }
}

impl<E, C> Repository<E, C>
where
    E: KeyedEntity + Include,
    E::Model: Sync + IntoActiveModel<E::ActiveModel>,
    C: ConnectionTrait + TransactionTrait + Send + Sync,
{
    /// Every row matching `options`, with includes loaded.
    pub async fn get_all(&self, options: QueryOptions<E>) -> RepoResult<Vec<E::Model>> {
        let query = QueryComposer::compose(E::find(), &options);
        let source = SelectSource::new(query, &self.conn);
        let rows = cancel::run(options.cancel.as_ref(), source.fetch_all()).await?;
        debug!(entity = %entity_name::<E>(), rows = rows.len(), "get_all");
        Ok(rows)
    }

    /// One page of the rows matching `options`.
    ///
    /// Count and fetch are separate round-trips; see
    /// [`get_paginated_consistent`](Self::get_paginated_consistent) for a single snapshot.
    pub async fn get_paginated(
        &self,
        page_index: u64,
        page_size: u64,
        options: QueryOptions<E>,
    ) -> RepoResult<PagedResult<E::Model>> {
        let query = QueryComposer::compose(E::find(), &options);
        let source = SelectSource::new(query, &self.conn);
        Paginator::paginate(&source, page_index, page_size, options.cancel.as_ref()).await
    }

    /// Like [`get_paginated`](Self::get_paginated), with count and fetch in one
    /// store transaction opened and closed by this call.
    pub async fn get_paginated_consistent(
        &self,
        page_index: u64,
        page_size: u64,
        options: QueryOptions<E>,
    ) -> RepoResult<PagedResult<E::Model>> {
        // Validate before opening a transaction.
        paging_core::PageRequest::new(page_index, page_size)?;

        let cancel = options.cancel.as_ref();
        let query = QueryComposer::compose(E::find(), &options);
        let txn = cancel::run(cancel, self.conn.begin()).await?;
        let page = {
            let source = SelectSource::new(query, &txn);
            Paginator::paginate(&source, page_index, page_size, cancel).await?
        };
        cancel::run(cancel, txn.commit()).await?;
        Ok(page)
    }

    /// Number of rows matching `filter`.
    pub async fn count(
        &self,
        filter: Option<Condition>,
        cancel: Option<&CancellationToken>,
    ) -> RepoResult<u64> {
        let query = QueryComposer::apply_filter(ComposedQuery::new(E::find()), filter);
        let (select, _) = query.into_parts();
        cancel::run(cancel, select.count(&self.conn)).await
    }

    /// Look up by primary key.
    pub async fn get_by_id(
        &self,
        id: E::Key,
        options: LookupOptions,
    ) -> RepoResult<Option<E::Model>> {
        let col = self.key_column()?;
        self.fetch_first(col.eq(id).into_condition(), options).await
    }

    /// First row matching `predicate`, or `None`.
    ///
    /// When several rows match, which one is returned is store-defined.
    pub async fn get_single_matching<F: IntoCondition>(
        &self,
        predicate: F,
        options: LookupOptions,
    ) -> RepoResult<Option<E::Model>> {
        self.fetch_first(predicate.into_condition(), options).await
    }

    async fn fetch_first(
        &self,
        predicate: Condition,
        options: LookupOptions,
    ) -> RepoResult<Option<E::Model>> {
        let query = QueryComposer::apply_filter(ComposedQuery::new(E::find()), Some(predicate));
        let query = QueryComposer::apply_includes(query, &options.include);
        let source = SelectSource::new(query, &self.conn);
        cancel::run(options.cancel.as_ref(), source.fetch_one()).await
    }

    /// Stage an insert. Returns the staged model.
    pub async fn add(&self, model: E::Model, options: WriteOptions) -> RepoResult<E::Model> {
        debug!(entity = %entity_name::<E>(), key = ?E::key_of(&model), "staging insert");
        self.stage(PendingChange::Insert(model.clone()));
        if options.persist_now {
            self.commit(options.cancel.as_ref()).await?;
        }
        Ok(model)
    }

    /// Stage an update of an existing row.
    ///
    /// Fails `NotFound` when no row has the model's key at call time.
    pub async fn update(&self, model: E::Model, options: WriteOptions) -> RepoResult<()> {
        let key = E::key_of(&model);
        self.ensure_exists(&key, options.cancel.as_ref()).await?;
        debug!(entity = %entity_name::<E>(), key = ?key, "staging update");
        self.stage(PendingChange::Update(key, model));
        if options.persist_now {
            self.commit(options.cancel.as_ref()).await?;
        }
        Ok(())
    }

    /// Stage the removal of the row with key `id`.
    ///
    /// Fails `NotFound` when no such row exists at call time.
    pub async fn delete(&self, id: E::Key, options: WriteOptions) -> RepoResult<()> {
        self.ensure_exists(&id, options.cancel.as_ref()).await?;
        debug!(entity = %entity_name::<E>(), key = ?id, "staging delete");
        self.stage(PendingChange::Delete(id));
        if options.persist_now {
            self.commit(options.cancel.as_ref()).await?;
        }
        Ok(())
    }

    /// Apply every pending change in one store transaction; returns rows affected.
    ///
    /// All or nothing: on failure or cancellation the transaction is rolled back and the
    /// changes stay pending. An update or delete that no longer matches a row fails
    /// `NotFound`; that change keeps failing every later commit until it is dropped with
    /// [`discard_pending`](Self::discard_pending).
    pub async fn commit(&self, cancel: Option<&CancellationToken>) -> RepoResult<u64> {
        let changes = std::mem::take(&mut *self.pending.lock());
        if changes.is_empty() {
            return Ok(0);
        }

        let col = match self.key_column() {
            Ok(col) => col,
            Err(err) => {
                self.restore(changes);
                return Err(err);
            }
        };

        match cancel::run_repo(cancel, self.apply(col, &changes)).await {
            Ok(affected) => {
                debug!(
                    entity = %entity_name::<E>(),
                    changes = changes.len(),
                    affected,
                    "committed"
                );
                Ok(affected)
            }
            Err(err) => {
                self.restore(changes);
                Err(err)
            }
        }
    }

    async fn apply(&self, col: E::Column, changes: &[PendingChange<E>]) -> RepoResult<u64> {
        let txn = self.conn.begin().await?;
        match Self::apply_in(&txn, col, changes).await {
            Ok(affected) => {
                txn.commit().await?;
                Ok(affected)
            }
            Err(err) => {
                // The original failure wins over a failed rollback.
                let _ = txn.rollback().await;
                Err(err)
            }
        }
    }

    async fn apply_in<T: ConnectionTrait>(
        txn: &T,
        col: E::Column,
        changes: &[PendingChange<E>],
    ) -> RepoResult<u64> {
        let mut affected = 0;
        for change in changes {
            match change {
                PendingChange::Insert(model) => {
                    let am = active_model_of::<E>(model);
                    affected += E::insert(am).exec_without_returning(txn).await?;
                }
                PendingChange::Update(key, model) => {
                    let mut am = active_model_of::<E>(model);
                    am.not_set(col);
                    let res = E::update_many()
                        .set(am)
                        .filter(col.eq(key.clone()))
                        .exec(txn)
                        .await?;
                    if res.rows_affected == 0 {
                        return Err(not_found::<E>(key));
                    }
                    affected += res.rows_affected;
                }
                PendingChange::Delete(key) => {
                    let res = E::delete_many()
                        .filter(col.eq(key.clone()))
                        .exec(txn)
                        .await?;
                    if res.rows_affected == 0 {
                        return Err(not_found::<E>(key));
                    }
                    affected += res.rows_affected;
                }
            }
        }
        Ok(affected)
    }

    async fn ensure_exists(
        &self,
        key: &E::Key,
        cancel: Option<&CancellationToken>,
    ) -> RepoResult<()> {
        let col = self.key_column()?;
        let found = cancel::run(
            cancel,
            E::find().filter(col.eq(key.clone())).count(&self.conn),
        )
        .await?;
        if found == 0 {
            return Err(not_found::<E>(key));
        }
        Ok(())
    }

    fn restore(&self, mut changes: Vec<PendingChange<E>>) {
        let mut pending = self.pending.lock();
        changes.append(&mut pending);
        *pending = changes;
    }
}

/// Active model with every column `Set` from `model`.
fn active_model_of<E: EntityTrait>(model: &E::Model) -> E::ActiveModel {
    let mut am = <E::ActiveModel as ActiveModelTrait>::default();
    for col in E::Column::iter() {
        am.set(col, model.get(col));
    }
    am
}

fn not_found<E: KeyedEntity>(key: &E::Key) -> RepoError {
    RepoError::NotFound {
        entity: entity_name::<E>(),
        key: format!("{key:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_options_builder() {
        let opts = LookupOptions::new().include("posts, posts").include("tags");
        assert_eq!(opts.include.iter().collect::<Vec<_>>(), vec!["posts", "tags"]);
        assert!(opts.cancel.is_none());
    }

    #[test]
    fn test_write_options_defaults() {
        let opts = WriteOptions::default();
        assert!(!opts.persist_now);
        assert!(opts.cancel.is_none());

        let token = CancellationToken::new();
        let opts = WriteOptions::new().persist_now().cancel_token(token.clone());
        assert!(opts.persist_now);
        token.cancel();
        assert!(opts.cancel.unwrap().is_cancelled());
    }
}
