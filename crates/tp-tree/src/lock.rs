//! Per-tree write locks.
//!
//! Ordinary writes hold the global lock shared plus one mutex per tree they
//! touch, taken in ascending tree id order. Writes that create, remove, or
//! renumber trees hold the global lock exclusively.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tp_store::TreeId;

/// Write serialization for the node table.
#[derive(Debug, Default)]
pub struct TreeLocks {
    global: RwLock<()>,
    trees: Mutex<HashMap<TreeId, Arc<AsyncMutex<()>>>>,
}

/// Held write access. Released on drop.
#[derive(Debug)]
pub enum WriteGuard<'a> {
    /// Shared global lock plus the listed trees.
    Trees {
        /// Locked tree ids.
        trees: BTreeSet<TreeId>,
        _global: RwLockReadGuard<'a, ()>,
        _held: Vec<OwnedMutexGuard<()>>,
    },
    /// Exclusive access to every tree.
    All(RwLockWriteGuard<'a, ()>),
}

impl WriteGuard<'_> {
    /// True if the guard allows rewriting every tree in `touched`.
    #[must_use]
    pub fn covers(&self, touched: &BTreeSet<TreeId>) -> bool {
        match self {
            Self::Trees { trees, .. } => touched.is_subset(trees),
            Self::All(_) => true,
        }
    }

    /// True if the guard excludes every other writer.
    #[must_use]
    pub fn is_exclusive(&self) -> bool {
        matches!(self, Self::All(_))
    }
}

impl TreeLocks {
    /// Create an unlocked set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn tree_mutex(&self, tree: TreeId) -> Arc<AsyncMutex<()>> {
        let mut trees = self.trees.lock().unwrap();
        Arc::clone(trees.entry(tree).or_default())
    }

    /// Lock the listed trees for an ordinary write.
    pub async fn lock_trees(&self, trees: BTreeSet<TreeId>) -> WriteGuard<'_> {
        let global = self.global.read().await;
        let mut held = Vec::with_capacity(trees.len());
        // BTreeSet iterates in ascending order.
        for &tree in &trees {
            held.push(self.tree_mutex(tree).lock_owned().await);
        }
        WriteGuard::Trees {
            trees,
            _global: global,
            _held: held,
        }
    }

    /// Lock every tree exclusively.
    ///
    /// Drops the per-tree mutexes nobody holds, so ids of trees that were
    /// deleted or renumbered away do not accumulate.
    pub async fn lock_all(&self) -> WriteGuard<'_> {
        let global = self.global.write().await;
        self.trees.lock().unwrap().retain(|_, mutex| Arc::strong_count(mutex) > 1);
        WriteGuard::All(global)
    }
}
