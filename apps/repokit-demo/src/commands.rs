use anyhow::{bail, Result};
use clap::Args;
use repokit_db::{
    CancellationToken, LookupOptions, QueryOptions, Repository, WriteOptions,
};
use sea_orm::{ColumnTrait, DatabaseConnection, QueryOrder};
use serde_json::json;

use crate::entities::{author, post};

/// Shared state for one command run.
pub struct App {
    pub conn: DatabaseConnection,
    pub cancel: CancellationToken,
    pub default_page_size: u64,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// 1-based page number
    #[arg(long, default_value_t = 1)]
    pub page: u64,

    /// Items per page (defaults to paging.default_page_size)
    #[arg(long)]
    pub page_size: Option<u64>,

    /// Only authors whose name contains this text
    #[arg(long)]
    pub name_contains: Option<String>,

    /// Comma-separated relations to load (e.g. "posts")
    #[arg(long)]
    pub include: Option<String>,

    /// Newest first
    #[arg(long)]
    pub desc: bool,

    /// Count and fetch inside one transaction
    #[arg(long)]
    pub consistent: bool,
}

impl App {
    fn authors(&self) -> Repository<author::Entity, DatabaseConnection> {
        Repository::new(self.conn.clone())
    }

    fn posts(&self) -> Repository<post::Entity, DatabaseConnection> {
        Repository::new(self.conn.clone())
    }

    pub async fn seed(&self, authors: u64, posts_per_author: u64) -> Result<()> {
        let author_repo = self.authors();
        let post_repo = self.posts();

        let last_author = author_repo
            .get_paginated(
                1,
                1,
                QueryOptions::new()
                    .order_by(|q| q.order_by_desc(author::Column::Id))
                    .cancel_token(self.cancel.clone()),
            )
            .await?
            .into_items()
            .first()
            .map_or(0, |a| a.id);
        let last_post = post_repo
            .get_paginated(
                1,
                1,
                QueryOptions::new()
                    .order_by(|q| q.order_by_desc(post::Column::Id))
                    .cancel_token(self.cancel.clone()),
            )
            .await?
            .into_items()
            .first()
            .map_or(0, |p| p.id);

        let mut post_id = last_post;
        for n in 1..=authors as i64 {
            let id = last_author + n;
            author_repo
                .add(
                    author::Model {
                        id,
                        name: format!("Author {id}"),
                        email: format!("author{id}@example.com"),
                        posts: Vec::new(),
                    },
                    WriteOptions::default(),
                )
                .await?;
            for k in 1..=posts_per_author {
                post_id += 1;
                post_repo
                    .add(
                        post::Model {
                            id: post_id,
                            author_id: id,
                            title: format!("Post {k} by author {id}"),
                        },
                        WriteOptions::default(),
                    )
                    .await?;
            }
        }

        // Authors first: posts reference them.
        let added_authors = author_repo.commit(Some(&self.cancel)).await?;
        let added_posts = post_repo.commit(Some(&self.cancel)).await?;
        tracing::info!(added_authors, added_posts, "seeded");

        println!(
            "{}",
            json!({ "authors": added_authors, "posts": added_posts })
        );
        Ok(())
    }

    pub async fn list(&self, args: ListArgs) -> Result<()> {
        let page_size = args.page_size.unwrap_or(self.default_page_size);

        let mut opts = QueryOptions::<author::Entity>::new().cancel_token(self.cancel.clone());
        if let Some(needle) = &args.name_contains {
            opts = opts.filter(author::Column::Name.contains(needle.as_str()));
        }
        if let Some(include) = &args.include {
            opts = opts.include(include);
        }
        opts = if args.desc {
            opts.order_by(|q| q.order_by_desc(author::Column::Id))
        } else {
            opts.order_by(|q| q.order_by_asc(author::Column::Id))
        };

        let repo = self.authors();
        let page = if args.consistent {
            repo.get_paginated_consistent(args.page, page_size, opts)
                .await?
        } else {
            repo.get_paginated(args.page, page_size, opts).await?
        };
        println!("{}", serde_json::to_string_pretty(&page)?);
        Ok(())
    }

    pub async fn get(&self, id: i64, include: Option<&str>) -> Result<()> {
        let mut opts = LookupOptions::new().cancel_token(self.cancel.clone());
        if let Some(include) = include {
            opts = opts.include(include);
        }
        match self.authors().get_by_id(id, opts).await? {
            Some(found) => println!("{}", serde_json::to_string_pretty(&found)?),
            None => bail!("author {id} not found"),
        }
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        self.authors()
            .delete(
                id,
                WriteOptions::new()
                    .persist_now()
                    .cancel_token(self.cancel.clone()),
            )
            .await?;
        println!("{}", json!({ "deleted": id }));
        Ok(())
    }
}
