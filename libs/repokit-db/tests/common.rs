#![allow(dead_code)]
//! Fixture entities (authors with posts) and an in-memory store.

use anyhow::Result;
use repokit_db::{ConnectOpts, DbHandle, Repository};
use sea_orm::{ConnectionTrait, DatabaseConnection};

pub mod author {
    use async_trait::async_trait;
    use repokit_db::entity::unknown_include;
    use repokit_db::{Include, KeyedEntity};
    use sea_orm::entity::prelude::*;
    use sea_orm::{ConnectionTrait, QueryOrder};

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "authors")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: i64,
        pub name: String,
        pub email: String,
        #[sea_orm(ignore)]
        pub posts: Vec<super::post::Model>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(has_many = "super::post::Entity")]
        Posts,
    }

    impl Related<super::post::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Posts.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}

    impl KeyedEntity for Entity {
        type Key = i64;

        fn key_of(model: &Model) -> i64 {
            model.id
        }
    }

    #[async_trait]
    impl Include for Entity {
        async fn include<C>(path: &str, rows: &mut [Model], conn: &C) -> Result<(), DbErr>
        where
            C: ConnectionTrait + Send + Sync,
        {
            match path {
                "posts" => {
                    if rows.is_empty() {
                        return Ok(());
                    }
                    let ids: Vec<i64> = rows.iter().map(|a| a.id).collect();
                    let posts = super::post::Entity::find()
                        .filter(super::post::Column::AuthorId.is_in(ids))
                        .order_by_asc(super::post::Column::Id)
                        .all(conn)
                        .await?;
                    for row in rows.iter_mut() {
                        row.posts = posts
                            .iter()
                            .filter(|p| p.author_id == row.id)
                            .cloned()
                            .collect();
                    }
                    Ok(())
                }
                other => Err(unknown_include::<Self>(other)),
            }
        }
    }

    pub fn new(id: i64, name: &str) -> Model {
        Model {
            id,
            name: name.to_owned(),
            email: format!("{}@example.com", name.to_lowercase()),
            posts: Vec::new(),
        }
    }
}

pub mod post {
    use repokit_db::{Include, KeyedEntity};
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "posts")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: i64,
        pub author_id: i64,
        pub title: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(
            belongs_to = "super::author::Entity",
            from = "Column::AuthorId",
            to = "super::author::Column::Id",
            on_delete = "Cascade"
        )]
        Author,
    }

    impl Related<super::author::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Author.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}

    impl KeyedEntity for Entity {
        type Key = i64;

        fn key_of(model: &Model) -> i64 {
            model.id
        }
    }

    impl Include for Entity {}
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS authors (
        id INTEGER PRIMARY KEY NOT NULL,
        name TEXT NOT NULL,
        email TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS posts (
        id INTEGER PRIMARY KEY NOT NULL,
        author_id INTEGER NOT NULL REFERENCES authors(id) ON DELETE CASCADE,
        title TEXT NOT NULL
    )",
];

pub async fn create_schema(conn: &DatabaseConnection) -> Result<()> {
    for stmt in SCHEMA {
        conn.execute_unprepared(stmt).await?;
    }
    Ok(())
}

/// Fresh in-memory database with the fixture schema.
pub async fn memory_db() -> Result<DatabaseConnection> {
    connect("sqlite::memory:").await
}

pub async fn connect(dsn: &str) -> Result<DatabaseConnection> {
    let db = DbHandle::connect(dsn, ConnectOpts::default()).await?;
    let conn = db.sea();
    create_schema(&conn).await?;
    Ok(conn)
}

/// Insert authors `1..=n` named `author-01`, `author-02`, ...
pub async fn seed_authors(conn: &DatabaseConnection, n: i64) -> Result<()> {
    let repo = Repository::<author::Entity, _>::new(conn.clone());
    for id in 1..=n {
        repo.add(author::new(id, &format!("author-{id:02}")), Default::default())
            .await?;
    }
    repo.commit(None).await?;
    Ok(())
}

/// Give author `author_id` posts with the given ids.
pub async fn seed_posts(conn: &DatabaseConnection, author_id: i64, ids: &[i64]) -> Result<()> {
    let repo = Repository::<post::Entity, _>::new(conn.clone());
    for &id in ids {
        let model = post::Model {
            id,
            author_id,
            title: format!("post {id}"),
        };
        repo.add(model, Default::default()).await?;
    }
    repo.commit(None).await?;
    Ok(())
}
