//! Query composition: filter → include → order over a SeaORM `Select<E>`.

use std::fmt;
use std::sync::Arc;

use paging_core::IncludePaths;
use sea_orm::sea_query::IntoCondition;
use sea_orm::{Condition, EntityTrait, QueryFilter, Select};
use tokio_util::sync::CancellationToken;

/// Ordering function: receives the filtered query and returns it with ordering imposed.
pub type OrderFn<E> = Arc<dyn Fn(Select<E>) -> Select<E> + Send + Sync>;

/// Options recognized by list and page queries.
///
/// | Field      | Default | Meaning                                      |
/// |------------|---------|----------------------------------------------|
/// | `filter`   | none    | row predicate                                 |
/// | `order_by` | none    | ordering function; none = store-defined order |
/// | `include`  | empty   | relation paths to eager-load                  |
/// | `cancel`   | none    | cancellation token for every round-trip       |
///
/// Without `order_by`, row order across repeated identical queries is whatever the
/// store returns; stable pagination needs an explicit ordering.
pub struct QueryOptions<E: EntityTrait> {
    pub filter: Option<Condition>,
    pub order_by: Option<OrderFn<E>>,
    pub include: IncludePaths,
    pub cancel: Option<CancellationToken>,
}

impl<E: EntityTrait> Default for QueryOptions<E> {
    fn default() -> Self {
        Self {
            filter: None,
            order_by: None,
            include: IncludePaths::none(),
            cancel: None,
        }
    }
}

impl<E: EntityTrait> Clone for QueryOptions<E> {
    fn clone(&self) -> Self {
        Self {
            filter: self.filter.clone(),
            order_by: self.order_by.clone(),
            include: self.include.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<E: EntityTrait> fmt::Debug for QueryOptions<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryOptions")
            .field("filter", &self.filter)
            .field("order_by", &self.order_by.as_ref().map(|_| "<fn>"))
            .field("include", &self.include)
            .field("cancel", &self.cancel.as_ref().map(|t| t.is_cancelled()))
            .finish()
    }
}

impl<E: EntityTrait> QueryOptions<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict rows; repeated calls are AND-ed together.
    pub fn filter<F: IntoCondition>(mut self, predicate: F) -> Self {
        let next = predicate.into_condition();
        self.filter = Some(match self.filter.take() {
            Some(prev) => Condition::all().add(prev).add(next),
            None => next,
        });
        self
    }

    /// Set the ordering function (replaces a previous one).
    pub fn order_by<F>(mut self, order: F) -> Self
    where
        F: Fn(Select<E>) -> Select<E> + Send + Sync + 'static,
    {
        self.order_by = Some(Arc::new(order));
        self
    }

    /// Add comma-separated include paths.
    pub fn include(mut self, paths: &str) -> Self {
        self.include.extend_from(paths);
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// A composed, not yet executed query: the SeaORM select plus include directives.
///
/// Cheap to clone and reusable; composer steps return new values.
#[derive(Clone, Debug)]
pub struct ComposedQuery<E: EntityTrait> {
    select: Select<E>,
    includes: IncludePaths,
}

impl<E: EntityTrait> ComposedQuery<E> {
    pub fn new(base: Select<E>) -> Self {
        Self {
            select: base,
            includes: IncludePaths::none(),
        }
    }

    pub fn select(&self) -> &Select<E> {
        &self.select
    }

    pub fn includes(&self) -> &IncludePaths {
        &self.includes
    }

    pub fn into_parts(self) -> (Select<E>, IncludePaths) {
        (self.select, self.includes)
    }
}

/// Builds [`ComposedQuery`] values in a fixed order: filter, then include, then order.
///
/// Ordering comes last so an ordering function always sees the filtered shape of the
/// query, whatever order the options were set in.
pub struct QueryComposer;

impl QueryComposer {
    /// Compose `base` with `options`.
    pub fn compose<E: EntityTrait>(base: Select<E>, options: &QueryOptions<E>) -> ComposedQuery<E> {
        let query = ComposedQuery::new(base);
        let query = Self::apply_filter(query, options.filter.clone());
        let query = Self::apply_includes(query, &options.include);
        Self::apply_order(query, options.order_by.as_ref())
    }

    /// Restrict rows to `predicate`; `None` returns the query unchanged.
    pub fn apply_filter<E: EntityTrait>(
        query: ComposedQuery<E>,
        predicate: Option<Condition>,
    ) -> ComposedQuery<E> {
        match predicate {
            Some(cond) => ComposedQuery {
                select: query.select.filter(cond),
                includes: query.includes,
            },
            None => query,
        }
    }

    /// Attach include directives; an empty set returns the query unchanged.
    pub fn apply_includes<E: EntityTrait>(
        mut query: ComposedQuery<E>,
        paths: &IncludePaths,
    ) -> ComposedQuery<E> {
        for path in paths.iter() {
            query.includes.extend_from(path);
        }
        query
    }

    /// Impose ordering; `None` returns the query unchanged.
    pub fn apply_order<E: EntityTrait>(
        query: ComposedQuery<E>,
        order: Option<&OrderFn<E>>,
    ) -> ComposedQuery<E> {
        match order {
            Some(order) => ComposedQuery {
                select: order(query.select),
                includes: query.includes,
            },
            None => query,
        }
    }
}
