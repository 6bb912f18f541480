//! Demo schema: authors and their posts.

use anyhow::Result;
use sea_orm::{ConnectionTrait, DatabaseConnection, Schema};

pub mod author {
    use async_trait::async_trait;
    use repokit_db::entity::unknown_include;
    use repokit_db::{Include, KeyedEntity};
    use sea_orm::entity::prelude::*;
    use sea_orm::{ConnectionTrait, QueryOrder};
    use serde::Serialize;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
    #[sea_orm(table_name = "authors")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: i64,
        pub name: String,
        pub email: String,
        #[sea_orm(ignore)]
        #[serde(skip_serializing_if = "Vec::is_empty")]
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
}

pub mod post {
    use repokit_db::{Include, KeyedEntity};
    use sea_orm::entity::prelude::*;
    use serde::Serialize;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
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

/// Create the demo tables when missing.
pub async fn ensure_schema(conn: &DatabaseConnection) -> Result<()> {
    let backend = conn.get_database_backend();
    let schema = Schema::new(backend);

    let mut authors = schema.create_table_from_entity(author::Entity);
    authors.if_not_exists();
    conn.execute(backend.build(&authors)).await?;

    let mut posts = schema.create_table_from_entity(post::Entity);
    posts.if_not_exists();
    conn.execute(backend.build(&posts)).await?;
    Ok(())
}
