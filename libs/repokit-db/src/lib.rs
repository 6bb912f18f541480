#![cfg_attr(
    not(any(feature = "pg", feature = "mysql", feature = "sqlite")),
    allow(
        unused_imports,
        unused_variables,
        dead_code,
        unreachable_code,
        unused_lifetimes
    )
)]

//! RepoKit database crate.
//!
//! Generic entity repositories over SeaORM: entity-agnostic CRUD with a staged
//! unit of work, filtered/ordered retrieval and offset pagination. The query side is
//! split in two parts:
//!
//! - [`QueryComposer`] turns a base `Select<E>` plus [`QueryOptions`] into a
//!   [`ComposedQuery`], always in the order filter → include → order.
//! - [`Paginator`] runs a count round-trip and a bounded fetch round-trip against a
//!   [`PageSource`] and assembles a detached [`PagedResult`].
//!
//! The crate also owns the connection handle ([`DbHandle`]) that builds an SQLx pool
//! and a SeaORM connection over it.
//!
//! # Features
//! - `pg`, `mysql`, `sqlite`: enable SQLx/SeaORM backends (`sqlite` by default)
//!
//! # Example
//! ```rust,no_run
//! # mod author {
//! #     use sea_orm::entity::prelude::*;
//! #     #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
//! #     #[sea_orm(table_name = "authors")]
//! #     pub struct Model {
//! #         #[sea_orm(primary_key, auto_increment = false)]
//! #         pub id: i64,
//! #         pub name: String,
//! #     }
//! #     #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
//! #     pub enum Relation {}
//! #     impl ActiveModelBehavior for ActiveModel {}
//! #     impl repokit_db::KeyedEntity for Entity {
//! #         type Key = i64;
//! #         fn key_of(model: &Model) -> i64 { model.id }
//! #     }
//! #     impl repokit_db::Include for Entity {}
//! # }
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     use repokit_db::{ConnectOpts, DbHandle, QueryOptions, Repository};
//!     use sea_orm::{ColumnTrait, QueryOrder};
//!
//!     let db = DbHandle::connect("sqlite::memory:", ConnectOpts::default()).await?;
//!     let repo = Repository::<author::Entity, _>::new(db.sea());
//!
//!     let page = repo
//!         .get_paginated(
//!             1,
//!             20,
//!             QueryOptions::new()
//!                 .filter(author::Column::Name.contains("ann"))
//!                 .order_by(|q| q.order_by_asc(author::Column::Id)),
//!         )
//!         .await?;
//!     println!("{} of {}", page.items().len(), page.total_count());
//!     Ok(())
//! }
//! ```

// Core modules
pub mod cancel;
pub mod entity;
pub mod error;
pub mod paginator;
pub mod query;
pub mod repository;

pub use entity::{Include, KeyedEntity};
pub use error::{RepoError, RepoResult};
pub use paginator::{PageSource, Paginator, SelectSource};
pub use query::{ComposedQuery, OrderFn, QueryComposer, QueryOptions};
pub use repository::{LookupOptions, Repository, WriteOptions};

pub use paging_core::{IncludePaths, PageRequest, PagedResult};
pub use tokio_util::sync::CancellationToken;

use std::time::Duration;

#[cfg(feature = "mysql")]
use sqlx::{mysql::MySqlPoolOptions, MySqlPool};
#[cfg(feature = "pg")]
use sqlx::{postgres::PgPoolOptions, PgPool};
#[cfg(feature = "sqlite")]
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use sea_orm::DatabaseConnection;
#[cfg(feature = "mysql")]
use sea_orm::SqlxMySqlConnector;
#[cfg(feature = "pg")]
use sea_orm::SqlxPostgresConnector;
#[cfg(feature = "sqlite")]
use sea_orm::SqlxSqliteConnector;

use thiserror::Error;

/// Library-local result type for connection handling.
pub type Result<T> = std::result::Result<T, DbError>;

/// Typed error for the DB handle and helpers.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Unknown DSN: {0}")]
    UnknownDsn(String),

    #[error("Feature not enabled: {0}")]
    FeatureDisabled(&'static str),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Sea(#[from] sea_orm::DbErr),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Supported engines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DbEngine {
    Postgres,
    MySql,
    Sqlite,
}

/// Connection options.
/// Covers the common sqlx pool knobs; each driver applies the subset it supports.
#[derive(Clone, Debug)]
pub struct ConnectOpts {
    /// Maximum number of connections in the pool.
    pub max_conns: Option<u32>,
    /// Minimum number of connections in the pool.
    pub min_conns: Option<u32>,
    /// Timeout to acquire a connection from the pool.
    pub acquire_timeout: Option<Duration>,
    /// Idle timeout before a connection is closed.
    pub idle_timeout: Option<Duration>,
    /// SQLite busy timeout (ignored by other engines and by in-memory databases).
    pub sqlite_busy_timeout: Duration,
    /// For SQLite file DSNs, create parent directories if missing.
    pub create_sqlite_dirs: bool,
}

impl Default for ConnectOpts {
    fn default() -> Self {
        Self {
            max_conns: Some(10),
            min_conns: None,
            acquire_timeout: Some(Duration::from_secs(30)),
            idle_timeout: None,
            sqlite_busy_timeout: Duration::from_millis(DEFAULT_SQLITE_BUSY_TIMEOUT_MS),
            create_sqlite_dirs: true,
        }
    }
}

/// One concrete sqlx pool.
#[derive(Clone, Debug)]
enum DbPool {
    #[cfg(feature = "pg")]
    Postgres(PgPool),
    #[cfg(feature = "mysql")]
    MySql(MySqlPool),
    #[cfg(feature = "sqlite")]
    Sqlite(SqlitePool),
}

/// Main handle: an SQLx pool plus the SeaORM connection wrapping it.
#[derive(Debug)]
pub struct DbHandle {
    engine: DbEngine,
    pool: DbPool,
    dsn: String,
    sea: DatabaseConnection,
}

const DEFAULT_SQLITE_BUSY_TIMEOUT_MS: u64 = 5000;

impl DbHandle {
    /// Detect engine by DSN.
    ///
    /// Note: we only check scheme prefixes and don't mutate the tail (credentials etc.).
    pub fn detect(dsn: &str) -> Result<DbEngine> {
        // Trim only leading spaces/newlines to be forgiving with env files.
        let s = dsn.trim_start();

        if s.starts_with("postgres://") || s.starts_with("postgresql://") {
            Ok(DbEngine::Postgres)
        } else if s.starts_with("mysql://") {
            Ok(DbEngine::MySql)
        } else if s.starts_with("sqlite:") {
            Ok(DbEngine::Sqlite)
        } else {
            Err(DbError::UnknownDsn(redact_credentials_in_dsn(Some(dsn))))
        }
    }

    /// Connect and build handle.
    pub async fn connect(dsn: &str, opts: ConnectOpts) -> Result<Self> {
        let engine = Self::detect(dsn)?;
        tracing::debug!(
            engine = ?engine,
            dsn = %redact_credentials_in_dsn(Some(dsn)),
            "connecting database"
        );
        match engine {
            #[cfg(feature = "pg")]
            DbEngine::Postgres => {
                let mut o = PgPoolOptions::new();
                if let Some(n) = opts.max_conns {
                    o = o.max_connections(n);
                }
                if let Some(n) = opts.min_conns {
                    o = o.min_connections(n);
                }
                if let Some(t) = opts.acquire_timeout {
                    o = o.acquire_timeout(t);
                }
                if let Some(t) = opts.idle_timeout {
                    o = o.idle_timeout(t);
                }
                let pool = o.connect(dsn).await?;
                let sea = SqlxPostgresConnector::from_sqlx_postgres_pool(pool.clone());
                Ok(Self {
                    engine,
                    pool: DbPool::Postgres(pool),
                    dsn: dsn.to_string(),
                    sea,
                })
            }
            #[cfg(feature = "mysql")]
            DbEngine::MySql => {
                let mut o = MySqlPoolOptions::new();
                if let Some(n) = opts.max_conns {
                    o = o.max_connections(n);
                }
                if let Some(n) = opts.min_conns {
                    o = o.min_connections(n);
                }
                if let Some(t) = opts.acquire_timeout {
                    o = o.acquire_timeout(t);
                }
                if let Some(t) = opts.idle_timeout {
                    o = o.idle_timeout(t);
                }
                let pool = o.connect(dsn).await?;
                let sea = SqlxMySqlConnector::from_sqlx_mysql_pool(pool.clone());
                Ok(Self {
                    engine,
                    pool: DbPool::MySql(pool),
                    dsn: dsn.to_string(),
                    sea,
                })
            }
            #[cfg(feature = "sqlite")]
            DbEngine::Sqlite => {
                let dsn = prepare_sqlite_path(dsn, opts.create_sqlite_dirs)?;
                let in_memory = is_sqlite_memory(&dsn);

                let mut o = SqlitePoolOptions::new();
                // Every in-memory connection is its own database; keep a single one.
                if in_memory {
                    o = o.max_connections(1).min_connections(1);
                } else {
                    if let Some(n) = opts.max_conns {
                        o = o.max_connections(n);
                    }
                    if let Some(n) = opts.min_conns {
                        o = o.min_connections(n);
                    }
                }
                if let Some(t) = opts.acquire_timeout {
                    o = o.acquire_timeout(t);
                }
                if !in_memory {
                    if let Some(t) = opts.idle_timeout {
                        o = o.idle_timeout(t);
                    }
                }

                let busy_timeout_ms = opts.sqlite_busy_timeout.as_millis() as i64;
                o = o.after_connect(move |conn, _meta| {
                    Box::pin(async move {
                        if in_memory {
                            sqlx::query("PRAGMA journal_mode = DELETE")
                                .execute(&mut *conn)
                                .await?;
                        } else {
                            sqlx::query("PRAGMA journal_mode = WAL")
                                .execute(&mut *conn)
                                .await?;
                            let stmt = format!("PRAGMA busy_timeout = {busy_timeout_ms}");
                            sqlx::query(&stmt).execute(&mut *conn).await?;
                        }
                        sqlx::query("PRAGMA synchronous = NORMAL")
                            .execute(&mut *conn)
                            .await?;
                        sqlx::query("PRAGMA foreign_keys = ON")
                            .execute(&mut *conn)
                            .await?;
                        Ok(())
                    })
                });

                let pool = o.connect(&dsn).await?;
                let sea = SqlxSqliteConnector::from_sqlx_sqlite_pool(pool.clone());

                Ok(Self {
                    engine,
                    pool: DbPool::Sqlite(pool),
                    dsn,
                    sea,
                })
            }
            #[cfg(not(feature = "pg"))]
            DbEngine::Postgres => Err(DbError::FeatureDisabled("PostgreSQL feature not enabled")),
            #[cfg(not(feature = "mysql"))]
            DbEngine::MySql => Err(DbError::FeatureDisabled("MySQL feature not enabled")),
            #[cfg(not(feature = "sqlite"))]
            DbEngine::Sqlite => Err(DbError::FeatureDisabled("SQLite feature not enabled")),
        }
    }

    /// Graceful pool close. (Dropping the pool also closes it; this just makes it explicit.)
    pub async fn close(self) {
        match self.pool {
            #[cfg(feature = "pg")]
            DbPool::Postgres(p) => p.close().await,
            #[cfg(feature = "mysql")]
            DbPool::MySql(p) => p.close().await,
            #[cfg(feature = "sqlite")]
            DbPool::Sqlite(p) => p.close().await,
        }
    }

    /// Get the backend.
    pub fn engine(&self) -> DbEngine {
        self.engine
    }

    /// Get the DSN used for this connection.
    pub fn dsn(&self) -> &str {
        &self.dsn
    }

    /// Get SeaORM connection (clone; cheap handle).
    pub fn sea(&self) -> DatabaseConnection {
        self.sea.clone()
    }
}

/// Mask the password part of a DSN so it can be logged.
pub fn redact_credentials_in_dsn(dsn: Option<&str>) -> String {
    match dsn {
        Some(dsn) if dsn.contains('@') => {
            if let Ok(mut parsed) = url::Url::parse(dsn) {
                if parsed.password().is_some() {
                    let _ = parsed.set_password(Some("***"));
                }
                parsed.to_string()
            } else {
                "***".to_string()
            }
        }
        Some(dsn) => dsn.to_string(),
        None => "none".to_string(),
    }
}

// ===================== helpers =====================

fn is_sqlite_memory(dsn: &str) -> bool {
    dsn.contains(":memory:") || dsn.contains("mode=memory")
}

#[cfg(feature = "sqlite")]
fn prepare_sqlite_path(dsn: &str, create_dirs: bool) -> Result<String> {
    // Only try to create directories for plain file paths; ignore :memory: cases.
    if !create_dirs || is_sqlite_memory(dsn) {
        return Ok(dsn.to_string());
    }

    // Handles "sqlite:/path" and "sqlite://path". URI forms like "sqlite:file:memdb?..."
    // have no filesystem dir to create.
    let raw = if let Some(rest) = dsn.strip_prefix("sqlite://") {
        rest
    } else if let Some(rest) = dsn.strip_prefix("sqlite:") {
        rest
    } else {
        dsn
    };
    let path = raw.split_once('?').map_or(raw, |(p, _)| p);

    if !path.starts_with("file:") {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                // One-time blocking call during startup; acceptable for setup paths.
                std::fs::create_dir_all(parent)?;
            }
        }
    }

    Ok(dsn.to_string())
}
