//! In-memory node store.
//!
//! Provides [`MemoryStore`], used for tests and for running the server
//! without a database file.

use std::collections::BTreeMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;

use crate::node::{BoundsUpdate, NodeDraft, NodeId, PageContent, PageNode, SlugUpdate};
use crate::storage::{NodeStore, StoreError};

/// Backend identifier for error messages.
const BACKEND: &str = "Memory";

#[derive(Debug, Default)]
struct Inner {
    nodes: BTreeMap<NodeId, PageNode>,
    next_id: NodeId,
}

impl Inner {
    /// Fail with `NotFound` for the first id that is not stored.
    fn require<'a>(&self, mut ids: impl Iterator<Item = &'a NodeId>) -> Result<(), StoreError> {
        match ids.find(|id| !self.nodes.contains_key(id)) {
            Some(&id) => Err(StoreError::not_found(id).with_backend(BACKEND)),
            None => Ok(()),
        }
    }

    fn apply_bounds(&mut self, updates: &[BoundsUpdate]) {
        let now = Utc::now();
        for update in updates {
            if let Some(node) = self.nodes.get_mut(&update.id) {
                node.apply_bounds(update);
                node.updated_at = now;
            }
        }
    }
}

/// Node store kept in process memory.
///
/// Reads clone the rows under a read lock, so every snapshot is consistent.
/// Batches are validated before any row changes and applied under one
/// write lock, so a failed batch leaves the store untouched.
///
/// # Example
///
/// ```ignore
/// use tp_store::{MemoryStore, NodeStore};
///
/// let store = MemoryStore::new();
/// let nodes = store.list_ordered().await?;
/// assert!(nodes.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    reads: AtomicU64,
}

impl MemoryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding the given rows as-is.
    ///
    /// Ids are kept; new inserts continue after the largest id.
    #[must_use]
    pub fn from_nodes(nodes: impl IntoIterator<Item = PageNode>) -> Self {
        let nodes: BTreeMap<NodeId, PageNode> = nodes.into_iter().map(|n| (n.id, n)).collect();
        let next_id = nodes.keys().next_back().copied().unwrap_or(0);
        Self {
            inner: RwLock::new(Inner { nodes, next_id }),
            reads: AtomicU64::new(0),
        }
    }

    fn count_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl NodeStore for MemoryStore {
    async fn list_ordered(&self) -> Result<Vec<PageNode>, StoreError> {
        self.count_read();
        let mut nodes: Vec<PageNode> = self.inner.read().unwrap().nodes.values().cloned().collect();
        nodes.sort_by_key(|n| (n.tree_id, n.lft));
        Ok(nodes)
    }

    async fn get(&self, id: NodeId) -> Result<PageNode, StoreError> {
        self.count_read();
        self.inner
            .read()
            .unwrap()
            .nodes
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(id).with_backend(BACKEND))
    }

    async fn insert(
        &self,
        draft: &NodeDraft,
        shifts: &[BoundsUpdate],
    ) -> Result<PageNode, StoreError> {
        let mut inner = self.inner.write().unwrap();
        inner.require(shifts.iter().map(|u| &u.id))?;
        if let Some(parent) = draft.parent_id {
            inner.require(std::iter::once(&parent))?;
        }

        inner.apply_bounds(shifts);

        inner.next_id += 1;
        let now = Utc::now();
        let node = PageNode {
            id: inner.next_id,
            parent_id: draft.parent_id,
            tree_id: draft.tree_id,
            lft: draft.lft,
            rgt: draft.rgt,
            depth: draft.depth,
            title: draft.content.title.clone(),
            body: draft.content.body.clone(),
            status: draft.content.status,
            template: draft.content.template.clone(),
            comments_enabled: draft.content.comments_enabled,
            login_required: draft.content.login_required,
            slug_override: draft.content.slug_override.clone(),
            slug: draft.slug.clone(),
            created_at: now,
            updated_at: now,
        };
        inner.nodes.insert(node.id, node.clone());
        tracing::debug!(id = node.id, tree_id = node.tree_id, "Inserted node");
        Ok(node)
    }

    async fn update_bounds(&self, updates: &[BoundsUpdate]) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        inner.require(updates.iter().map(|u| &u.id))?;
        inner.apply_bounds(updates);
        Ok(())
    }

    async fn update_slugs(&self, updates: &[SlugUpdate]) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        inner.require(updates.iter().map(|u| &u.id))?;
        let now = Utc::now();
        for update in updates {
            if let Some(node) = inner.nodes.get_mut(&update.id) {
                node.slug.clone_from(&update.slug);
                node.updated_at = now;
            }
        }
        Ok(())
    }

    async fn update_content(
        &self,
        id: NodeId,
        content: &PageContent,
    ) -> Result<PageNode, StoreError> {
        let mut inner = self.inner.write().unwrap();
        let node = inner
            .nodes
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(id).with_backend(BACKEND))?;
        node.apply_content(content);
        node.updated_at = Utc::now();
        Ok(node.clone())
    }

    async fn remove(&self, ids: &[NodeId], shifts: &[BoundsUpdate]) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        inner.require(ids.iter())?;
        inner.require(shifts.iter().map(|u| &u.id))?;

        for id in ids {
            inner.nodes.remove(id);
        }
        inner.apply_bounds(shifts);
        tracing::debug!(removed = ids.len(), shifted = shifts.len(), "Removed nodes");
        Ok(())
    }

    fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }
}
