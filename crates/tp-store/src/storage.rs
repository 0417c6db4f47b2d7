//! Node store trait and error types.
//!
//! Provides the core [`NodeStore`] trait for persisting page nodes with
//! their nested-set coordinates, along with [`StoreError`] for unified error
//! handling across backends.
//!
//! # Atomicity
//!
//! Every mutating method takes a whole batch. A backend applies a batch
//! all-or-nothing: when any row fails, no row of the batch is persisted.
//! Bound rewrites and slug rewrites are separate batches so that a failed
//! slug write never rolls back committed bounds.

use async_trait::async_trait;

use crate::node::{BoundsUpdate, NodeDraft, NodeId, PageContent, PageNode, SlugUpdate};

/// Semantic error categories.
#[derive(Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum StoreErrorKind {
    /// Node does not exist.
    NotFound,
    /// Batch conflicts with current state (e.g., duplicate id).
    Conflict,
    /// Persisted data could not be decoded.
    InvalidData,
    /// Backend is temporarily unavailable.
    Unavailable,
    /// Other/unknown error category.
    Other,
}

/// Store error with semantic kind and backend-specific source.
#[derive(Debug)]
pub struct StoreError {
    /// Semantic error category.
    pub kind: StoreErrorKind,
    /// Node context (if applicable).
    pub node: Option<NodeId>,
    /// Backend identifier (e.g., "Memory", "Sqlite").
    pub backend: Option<&'static str>,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl StoreError {
    /// Create a new store error.
    #[must_use]
    pub fn new(kind: StoreErrorKind) -> Self {
        Self {
            kind,
            node: None,
            backend: None,
            source: None,
        }
    }

    /// Attach node context.
    #[must_use]
    pub fn with_node(mut self, id: NodeId) -> Self {
        self.node = Some(id);
        self
    }

    /// Attach backend identifier.
    #[must_use]
    pub fn with_backend(mut self, backend: &'static str) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Attach the underlying error source.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Downcast the source error to a concrete type.
    #[must_use]
    pub fn downcast_source<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.source.as_ref()?.downcast_ref()
    }

    /// Create a not found error for a node.
    #[must_use]
    pub fn not_found(id: NodeId) -> Self {
        Self::new(StoreErrorKind::NotFound).with_node(id)
    }

    /// True if the error means the node does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind == StoreErrorKind::NotFound
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Format: "[Backend] Kind: message (node: 42)"
        if let Some(backend) = self.backend {
            write!(f, "[{backend}] ")?;
        }

        let kind_str = match self.kind {
            StoreErrorKind::NotFound => "Not found",
            StoreErrorKind::Conflict => "Conflict",
            StoreErrorKind::InvalidData => "Invalid data",
            StoreErrorKind::Unavailable => "Unavailable",
            StoreErrorKind::Other => "Error",
        };

        write!(f, "{kind_str}")?;

        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }

        if let Some(id) = self.node {
            write!(f, " (node: {id})")?;
        }

        Ok(())
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|s| s.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Persistence for page nodes and their nested-set coordinates.
///
/// The store does no tree arithmetic. Callers compute complete batches
/// (see `tp-tree`) and the store applies them atomically.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Return every node ordered by `(tree_id, lft)`.
    ///
    /// The ordering is a pre-order traversal of each tree. The result is a
    /// single consistent snapshot, read in one round trip.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend cannot be read.
    async fn list_ordered(&self) -> Result<Vec<PageNode>, StoreError>;

    /// Get a node by id.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreErrorKind::NotFound`] error for an unknown id.
    async fn get(&self, id: NodeId) -> Result<PageNode, StoreError>;

    /// Insert a node and apply the bound shifts that open its gap.
    ///
    /// Returns the stored node with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if any shifted node is unknown or the write
    /// fails. Nothing is persisted in that case.
    async fn insert(
        &self,
        draft: &NodeDraft,
        shifts: &[BoundsUpdate],
    ) -> Result<PageNode, StoreError>;

    /// Rewrite structural coordinates of many nodes at once.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if any node is unknown or the write fails.
    /// Nothing is persisted in that case.
    async fn update_bounds(&self, updates: &[BoundsUpdate]) -> Result<(), StoreError>;

    /// Rewrite derived slugs of many nodes at once.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if any node is unknown or the write fails.
    async fn update_slugs(&self, updates: &[SlugUpdate]) -> Result<(), StoreError>;

    /// Rewrite the content fields of one node.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreErrorKind::NotFound`] error for an unknown id.
    async fn update_content(&self, id: NodeId, content: &PageContent)
    -> Result<PageNode, StoreError>;

    /// Delete nodes and apply the bound shifts that close the gap.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if any node is unknown or the write fails.
    /// Nothing is persisted in that case.
    async fn remove(&self, ids: &[NodeId], shifts: &[BoundsUpdate]) -> Result<(), StoreError>;

    /// Number of read round trips served so far.
    fn reads(&self) -> u64;
}
