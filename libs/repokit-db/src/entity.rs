//! Traits an entity implements to be served by a [`Repository`](crate::Repository).

use async_trait::async_trait;
use sea_orm::{
    ConnectionTrait, DbErr, EntityTrait, Iterable, PrimaryKeyToColumn,
};

use crate::error::{RepoError, RepoResult};

/// Explicit primary-key accessor.
///
/// The key column itself comes from the entity's SeaORM primary key definition; this
/// trait only states the key type and how to read it from a model.
///
/// ```ignore
/// impl KeyedEntity for author::Entity {
///     type Key = i64;
///     fn key_of(model: &author::Model) -> i64 { model.id }
/// }
/// ```
pub trait KeyedEntity: EntityTrait {
    type Key: Into<sea_orm::Value> + Clone + std::fmt::Debug + Send + Sync + 'static;

    fn key_of(model: &Self::Model) -> Self::Key;
}

/// Eager loading of related data named by include paths.
///
/// The repository calls [`Include::include`] once per path, after the primary rows of a
/// query have been fetched, so loaders can batch one query per relation. Implementations
/// store the loaded data on the models (typically `#[sea_orm(ignore)]` fields).
///
/// Loaders are called even when no rows were fetched: they must reject unknown paths
/// regardless of `rows`, and may skip their query when `rows` is empty.
///
/// The default implementation knows no paths and reports every one as a store error,
/// which is what an entity without relations wants.
#[async_trait]
pub trait Include: EntityTrait {
    async fn include<C>(path: &str, rows: &mut [Self::Model], conn: &C) -> Result<(), DbErr>
    where
        C: ConnectionTrait + Send + Sync,
    {
        let _ = (rows, conn);
        Err(unknown_include::<Self>(path))
    }
}

/// Store error for an include path the entity does not know.
pub fn unknown_include<E: EntityTrait>(path: &str) -> DbErr {
    DbErr::Custom(format!(
        "unknown include path `{path}` for `{}`",
        entity_name::<E>()
    ))
}

pub(crate) fn entity_name<E: EntityTrait>() -> String {
    E::default().table_name().to_owned()
}

/// Resolve the single primary-key column of `E`.
pub(crate) fn resolve_key_column<E: EntityTrait>() -> RepoResult<E::Column> {
    let mut keys = E::PrimaryKey::iter();
    match (keys.next(), keys.next()) {
        (Some(pk), None) => Ok(pk.into_column()),
        (None, _) => Err(RepoError::PrimaryKeyResolution {
            entity: entity_name::<E>(),
            reason: "entity declares no primary key",
        }),
        (Some(_), Some(_)) => Err(RepoError::PrimaryKeyResolution {
            entity: entity_name::<E>(),
            reason: "composite primary keys are not supported",
        }),
    }
}
