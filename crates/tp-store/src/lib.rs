//! Node store abstraction for TreePages.
//!
//! This crate provides the [`NodeStore`] trait for persisting page nodes
//! together with their nested-set coordinates. This enables:
//!
//! - **Unit testing** without a database
//! - **Backend flexibility** (in-memory, `SQLite`)
//! - **Clean separation** between tree arithmetic and I/O
//!
//! # Architecture
//!
//! The crate provides:
//! - [`PageNode`] and the batch records [`BoundsUpdate`], [`SlugUpdate`], [`NodeDraft`]
//! - [`NodeStore`] trait with atomic batch methods
//! - [`MemoryStore`] implementation with copy-on-read snapshots
//!
//! The tree logic that computes batches lives in `tp-tree`.

mod memory;
mod node;
mod storage;

pub use memory::MemoryStore;
pub use node::{
    BoundsUpdate, NodeDraft, NodeId, PageContent, PageNode, PageStatus, ParseStatusError,
    SlugUpdate, TreeId,
};
pub use storage::{NodeStore, StoreError, StoreErrorKind};
