//! Nested-set page tree engine for TreePages.
//!
//! This crate provides:
//! - [`TreeIndex`]: the materialized forest built from one store snapshot
//! - Move, insert and delete planners producing atomic [`BoundsUpdate`] batches
//! - Slug derivation and navigation rendering
//! - [`TreeAdminService`]: the administration surface with per-tree write
//!   locks and a cached read snapshot
//!
//! # Quick Start
//!
//! ```no_run
//! # async fn run() -> Result<(), tp_tree::TreeError> {
//! use std::sync::Arc;
//! use tp_store::{MemoryStore, PageStatus};
//! use tp_tree::{MovePosition, TreeAdminService, navigation};
//!
//! let service = TreeAdminService::new(Arc::new(MemoryStore::new()));
//!
//! // Move page 4 right after page 2
//! service.move_node(4, 2, MovePosition::RightOf).await?;
//!
//! // Render navigation from the cached snapshot
//! let html = service
//!     .render_navigation(PageStatus::NAVIGATION, &[], navigation::default_template)
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! [`BoundsUpdate`]: tp_store::BoundsUpdate

mod delete;
mod error;
mod index;
mod lock;
mod moves;
pub mod navigation;
mod service;
pub mod slug;
#[cfg(test)]
mod testing;

pub use delete::{DeletePlan, DeletePolicy, ParsePolicyError, plan_delete};
pub use error::TreeError;
pub use index::{Breadcrumb, MAX_DEPTH, StructureEntry, TreeIndex, TreeStructure};
pub use lock::{TreeLocks, WriteGuard};
pub use moves::{
    Direction, InsertPlan, MovePlan, MovePosition, ParseDirectionError, ParsePositionError, plan_insert, plan_move,
    resolve_direction,
};
pub use navigation::{ManualEntry, NavContext, NavItem, NavKind};
pub use service::{DeleteOutcome, MoveOutcome, PageForm, Resolution, ResolvedPage, TreeAdminService};
