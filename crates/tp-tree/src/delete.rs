//! Delete planner.
//!
//! Computes which rows disappear and how the remaining bounds close up.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tp_store::{BoundsUpdate, NodeId, PageNode, TreeId};

use crate::error::TreeError;
use crate::index::TreeIndex;

/// What happens to the children of a deleted node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletePolicy {
    /// Refuse to delete a node that has children.
    #[default]
    Reject,
    /// Delete the whole subtree.
    Cascade,
    /// Delete the node only and promote its children into its place.
    Reparent,
}

/// Error returned when a policy string is not recognized.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown delete policy: {0}")]
pub struct ParsePolicyError(String);

impl FromStr for DeletePolicy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reject" => Ok(Self::Reject),
            "cascade" => Ok(Self::Cascade),
            "reparent" => Ok(Self::Reparent),
            _ => Err(ParsePolicyError(s.to_owned())),
        }
    }
}

impl fmt::Display for DeletePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Reject => "reject",
            Self::Cascade => "cascade",
            Self::Reparent => "reparent",
        })
    }
}

/// Rows to remove and bounds to rewrite for one delete.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeletePlan {
    /// Removed node ids, the deleted node first.
    pub removed: Vec<NodeId>,
    /// Surviving rows whose coordinates change.
    pub updates: Vec<BoundsUpdate>,
    /// Promoted children whose subtrees need new slugs.
    pub reslug_roots: Vec<NodeId>,
    /// Tree ids (before the change) whose rows are removed or rewritten.
    pub touched_trees: BTreeSet<TreeId>,
}

/// Plan deleting `id` under `policy`.
///
/// # Errors
///
/// Returns [`TreeError::NotFound`] for unknown ids and
/// [`TreeError::HasChildren`] when `policy` is [`DeletePolicy::Reject`] and
/// the node has children.
pub fn plan_delete(index: &TreeIndex, id: NodeId, policy: DeletePolicy) -> Result<DeletePlan, TreeError> {
    let node = index.require(id)?;
    let children = index.children(id);

    match policy {
        DeletePolicy::Reject if !children.is_empty() => Err(TreeError::HasChildren(id)),
        DeletePolicy::Reparent if !children.is_empty() => Ok(plan_reparent(index, node, &children)),
        _ => Ok(plan_cascade(index, node)),
    }
}

fn plan_cascade(index: &TreeIndex, node: &PageNode) -> DeletePlan {
    let removed: Vec<NodeId> = std::iter::once(node.id)
        .chain(index.descendants(node.id).iter().map(|d| d.id))
        .collect();
    let (r, w) = (node.rgt, node.width());
    let drops_tree = node.parent_id.is_none();

    let changes = changed(index, &removed, |row| {
        if row.tree_id == node.tree_id {
            if row.lft > r {
                row.lft -= w;
            }
            if row.rgt > r {
                row.rgt -= w;
            }
        } else if drops_tree && row.tree_id > node.tree_id {
            row.tree_id -= 1;
        }
    });

    finish(node, removed, changes, Vec::new())
}

fn plan_reparent(index: &TreeIndex, node: &PageNode, children: &[&PageNode]) -> DeletePlan {
    let removed = vec![node.id];
    let reslug_roots: Vec<NodeId> = children.iter().map(|c| c.id).collect();
    let (l, r) = (node.lft, node.rgt);

    let changes = if node.parent_id.is_some() {
        changed(index, &removed, |row| {
            if row.tree_id != node.tree_id {
                return;
            }
            if row.lft > l && row.rgt < r {
                row.lft -= 1;
                row.rgt -= 1;
                row.depth -= 1;
                if row.parent_id == Some(node.id) {
                    row.parent_id = node.parent_id;
                }
                return;
            }
            if row.lft > r {
                row.lft -= 2;
            }
            if row.rgt > r {
                row.rgt -= 2;
            }
        })
    } else {
        // Each child becomes its own tree where the root's tree was.
        let spans: Vec<(i64, i64)> = children.iter().map(|c| (c.lft, c.rgt)).collect();
        let extra_trees = TreeId::try_from(spans.len()).unwrap_or(TreeId::MAX) - 1;
        changed(index, &removed, |row| {
            if row.tree_id > node.tree_id {
                row.tree_id += extra_trees;
                return;
            }
            if row.tree_id != node.tree_id {
                return;
            }
            if let Some((i, &(cl, _))) = (0..)
                .zip(&spans)
                .find(|&(_, &(cl, cr))| row.lft >= cl && row.rgt <= cr)
            {
                row.tree_id = node.tree_id + i;
                row.lft -= cl - 1;
                row.rgt -= cl - 1;
                row.depth -= 1;
                if row.parent_id == Some(node.id) {
                    row.parent_id = None;
                }
            }
        })
    };

    finish(node, removed, changes, reslug_roots)
}

/// Surviving rows changed by `shift`, with the tree ids they had before.
struct Changes {
    updates: Vec<BoundsUpdate>,
    trees: BTreeSet<TreeId>,
}

/// Apply `shift` to every surviving row and keep the ones that changed.
fn changed(index: &TreeIndex, removed: &[NodeId], mut shift: impl FnMut(&mut BoundsUpdate)) -> Changes {
    let removed: HashSet<NodeId> = removed.iter().copied().collect();
    let mut changes = Changes {
        updates: Vec::new(),
        trees: BTreeSet::new(),
    };
    for node in index.iter().filter(|n| !removed.contains(&n.id)) {
        let before = node.bounds();
        let mut after = before;
        shift(&mut after);
        if after != before {
            changes.trees.insert(before.tree_id);
            changes.updates.push(after);
        }
    }
    changes
}

fn finish(node: &PageNode, removed: Vec<NodeId>, changes: Changes, reslug_roots: Vec<NodeId>) -> DeletePlan {
    let mut touched_trees = changes.trees;
    touched_trees.insert(node.tree_id);
    tracing::debug!(
        node = node.id,
        removed = removed.len(),
        updates = changes.updates.len(),
        "Planned delete"
    );
    DeletePlan {
        removed,
        updates: changes.updates,
        reslug_roots,
        touched_trees,
    }
}
