//! `SQLite` node store for TreePages.
//!
//! This crate provides [`SqliteStore`], an implementation of the
//! [`NodeStore`](tp_store::NodeStore) trait backed by a single `pages` table.
//! It handles:
//!
//! - Schema creation on open (`CREATE TABLE IF NOT EXISTS`)
//! - One transaction per batch, rolled back on any failing row
//! - Decoding rows into [`PageNode`](tp_store::PageNode) with strict checks
//!
//! # Example
//!
//! ```ignore
//! use std::path::Path;
//! use tp_store::NodeStore;
//! use tp_store_sqlite::SqliteStore;
//!
//! let store = SqliteStore::open(Path::new("treepages.db")).await?;
//! for node in store.list_ordered().await? {
//!     println!("{} {}", node.url(), node.title);
//! }
//! ```

mod row;

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use tp_store::{
    BoundsUpdate, NodeDraft, NodeId, NodeStore, PageContent, PageNode, SlugUpdate, StoreError,
    StoreErrorKind,
};

use row::{COLUMNS, PageRow, format_timestamp, now};

/// Backend identifier for error messages.
pub(crate) const BACKEND: &str = "Sqlite";

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    parent_id INTEGER,
    tree_id INTEGER NOT NULL,
    lft INTEGER NOT NULL,
    rgt INTEGER NOT NULL,
    depth INTEGER NOT NULL,
    title TEXT NOT NULL,
    body TEXT NOT NULL DEFAULT '',
    status INTEGER NOT NULL DEFAULT 0,
    template TEXT NOT NULL DEFAULT '',
    comments_enabled INTEGER NOT NULL DEFAULT 0,
    login_required INTEGER NOT NULL DEFAULT 0,
    slug_override TEXT,
    slug TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_pages_tree_lft ON pages(tree_id, lft);
CREATE INDEX IF NOT EXISTS idx_pages_slug ON pages(slug);
CREATE INDEX IF NOT EXISTS idx_pages_slug_override ON pages(slug_override);
";

/// Map a sqlx error onto a store error kind.
fn sqlx_error(e: sqlx::Error) -> StoreError {
    let kind = match &e {
        sqlx::Error::RowNotFound => StoreErrorKind::NotFound,
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            StoreErrorKind::Unavailable
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => StoreErrorKind::InvalidData,
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreErrorKind::Conflict,
        _ => StoreErrorKind::Other,
    };
    StoreError::new(kind).with_backend(BACKEND).with_source(e)
}

fn not_found(id: NodeId) -> StoreError {
    StoreError::not_found(id).with_backend(BACKEND)
}

/// Node store backed by an `SQLite` database.
///
/// Nodes are kept in one `pages` table; ancestry is not enforced with a
/// foreign key because batches rewrite parents in arbitrary row order.
pub struct SqliteStore {
    pool: SqlitePool,
    reads: AtomicU64,
}

impl SqliteStore {
    /// Open (or create) a database file and ensure the schema exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the file cannot be opened or the schema
    /// cannot be created.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(sqlx_error)?;
        tracing::info!(path = %path.display(), "Opened SQLite store");
        Self::with_pool(pool).await
    }

    /// Open a private in-memory database.
    ///
    /// The pool holds exactly one connection that never expires, since every
    /// `SQLite` memory connection is its own database.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the schema cannot be created.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new().in_memory(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(sqlx_error)?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .map_err(sqlx_error)?;
        Ok(Self {
            pool,
            reads: AtomicU64::new(0),
        })
    }

    /// Close the pool, waiting for connections to finish.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn count_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    async fn fetch(tx: &mut Transaction<'_, Sqlite>, id: NodeId) -> Result<PageNode, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM pages WHERE id = ?");
        let row: Option<PageRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(sqlx_error)?;
        row.ok_or_else(|| not_found(id))?.try_into()
    }

    async fn apply_bounds(
        tx: &mut Transaction<'_, Sqlite>,
        updates: &[BoundsUpdate],
        updated_at: &str,
    ) -> Result<(), StoreError> {
        for update in updates {
            let result = sqlx::query(
                "UPDATE pages SET parent_id = ?, tree_id = ?, lft = ?, rgt = ?, depth = ?, \
                 updated_at = ? WHERE id = ?",
            )
            .bind(update.parent_id)
            .bind(update.tree_id)
            .bind(update.lft)
            .bind(update.rgt)
            .bind(update.depth)
            .bind(updated_at)
            .bind(update.id)
            .execute(&mut **tx)
            .await
            .map_err(sqlx_error)?;

            if result.rows_affected() == 0 {
                return Err(not_found(update.id));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl NodeStore for SqliteStore {
    async fn list_ordered(&self) -> Result<Vec<PageNode>, StoreError> {
        self.count_read();
        let sql = format!("SELECT {COLUMNS} FROM pages ORDER BY tree_id, lft");
        let rows: Vec<PageRow> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error)?;
        rows.into_iter().map(PageNode::try_from).collect()
    }

    async fn get(&self, id: NodeId) -> Result<PageNode, StoreError> {
        self.count_read();
        let sql = format!("SELECT {COLUMNS} FROM pages WHERE id = ?");
        let row: Option<PageRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_error)?;
        row.ok_or_else(|| not_found(id))?.try_into()
    }

    async fn insert(
        &self,
        draft: &NodeDraft,
        shifts: &[BoundsUpdate],
    ) -> Result<PageNode, StoreError> {
        let now = now();
        let stamp = format_timestamp(now);
        let mut tx = self.pool.begin().await.map_err(sqlx_error)?;

        if let Some(parent) = draft.parent_id {
            let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM pages WHERE id = ?")
                .bind(parent)
                .fetch_optional(&mut *tx)
                .await
                .map_err(sqlx_error)?;
            if exists.is_none() {
                return Err(not_found(parent));
            }
        }

        Self::apply_bounds(&mut tx, shifts, &stamp).await?;

        let content = &draft.content;
        let result = sqlx::query(
            "INSERT INTO pages (parent_id, tree_id, lft, rgt, depth, title, body, status, \
             template, comments_enabled, login_required, slug_override, slug, created_at, \
             updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(draft.parent_id)
        .bind(draft.tree_id)
        .bind(draft.lft)
        .bind(draft.rgt)
        .bind(draft.depth)
        .bind(&content.title)
        .bind(&content.body)
        .bind(content.status.as_i64())
        .bind(&content.template)
        .bind(content.comments_enabled)
        .bind(content.login_required)
        .bind(content.slug_override.as_deref())
        .bind(&draft.slug)
        .bind(&stamp)
        .bind(&stamp)
        .execute(&mut *tx)
        .await
        .map_err(sqlx_error)?;

        tx.commit().await.map_err(sqlx_error)?;

        let id = result.last_insert_rowid();
        tracing::debug!(id, tree_id = draft.tree_id, shifted = shifts.len(), "Inserted node");

        Ok(PageNode {
            id,
            parent_id: draft.parent_id,
            tree_id: draft.tree_id,
            lft: draft.lft,
            rgt: draft.rgt,
            depth: draft.depth,
            title: content.title.clone(),
            body: content.body.clone(),
            status: content.status,
            template: content.template.clone(),
            comments_enabled: content.comments_enabled,
            login_required: content.login_required,
            slug_override: content.slug_override.clone(),
            slug: draft.slug.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn update_bounds(&self, updates: &[BoundsUpdate]) -> Result<(), StoreError> {
        if updates.is_empty() {
            return Ok(());
        }
        let stamp = format_timestamp(now());
        let mut tx = self.pool.begin().await.map_err(sqlx_error)?;
        Self::apply_bounds(&mut tx, updates, &stamp).await?;
        tx.commit().await.map_err(sqlx_error)?;
        tracing::debug!(rows = updates.len(), "Rewrote bounds");
        Ok(())
    }

    async fn update_slugs(&self, updates: &[SlugUpdate]) -> Result<(), StoreError> {
        if updates.is_empty() {
            return Ok(());
        }
        let stamp = format_timestamp(now());
        let mut tx = self.pool.begin().await.map_err(sqlx_error)?;
        for update in updates {
            let result = sqlx::query("UPDATE pages SET slug = ?, updated_at = ? WHERE id = ?")
                .bind(&update.slug)
                .bind(&stamp)
                .bind(update.id)
                .execute(&mut *tx)
                .await
                .map_err(sqlx_error)?;
            if result.rows_affected() == 0 {
                return Err(not_found(update.id));
            }
        }
        tx.commit().await.map_err(sqlx_error)?;
        tracing::debug!(rows = updates.len(), "Rewrote slugs");
        Ok(())
    }

    async fn update_content(
        &self,
        id: NodeId,
        content: &PageContent,
    ) -> Result<PageNode, StoreError> {
        let stamp = format_timestamp(now());
        let mut tx = self.pool.begin().await.map_err(sqlx_error)?;
        let result = sqlx::query(
            "UPDATE pages SET title = ?, body = ?, status = ?, template = ?, \
             comments_enabled = ?, login_required = ?, slug_override = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(&content.title)
        .bind(&content.body)
        .bind(content.status.as_i64())
        .bind(&content.template)
        .bind(content.comments_enabled)
        .bind(content.login_required)
        .bind(content.slug_override.as_deref())
        .bind(&stamp)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }
        let node = Self::fetch(&mut tx, id).await?;
        tx.commit().await.map_err(sqlx_error)?;
        Ok(node)
    }

    async fn remove(&self, ids: &[NodeId], shifts: &[BoundsUpdate]) -> Result<(), StoreError> {
        let stamp = format_timestamp(now());
        let mut tx = self.pool.begin().await.map_err(sqlx_error)?;
        for &id in ids {
            let result = sqlx::query("DELETE FROM pages WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(sqlx_error)?;
            if result.rows_affected() == 0 {
                return Err(not_found(id));
            }
        }
        Self::apply_bounds(&mut tx, shifts, &stamp).await?;
        tx.commit().await.map_err(sqlx_error)?;
        tracing::debug!(removed = ids.len(), shifted = shifts.len(), "Removed nodes");
        Ok(())
    }

    fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }
}
