//! Move engine.
//!
//! Plans nested-set renumbering for moves and inserts against an in-memory
//! [`TreeIndex`]. Planning never touches storage: the resulting
//! [`BoundsUpdate`] batch is handed to the store as one atomic write.
//!
//! A move of a subtree N of width `w = rgt - lft + 1`:
//!
//! 1. detaches N, shifting every later bound of its tree down by `w` (a
//!    detached root removes its tree and later tree ids close up);
//! 2. computes the insertion point from the target's detached coordinates;
//! 3. opens a gap of `w` at the insertion point, or a new tree when the
//!    target is a root and the position is a sibling one;
//! 4. places N at the gap, keeping relative offsets and depths.
//!
//! Only rows whose coordinates actually change are emitted.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tp_store::{BoundsUpdate, NodeId, PageNode, TreeId};

use crate::error::TreeError;
use crate::index::TreeIndex;

/// Placement relative to a target node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MovePosition {
    /// Immediately before the target, as its sibling.
    LeftOf,
    /// Immediately after the target, as its sibling.
    RightOf,
    /// First child of the target.
    FirstChildOf,
    /// Last child of the target.
    LastChildOf,
}

impl MovePosition {
    fn is_child(self) -> bool {
        matches!(self, Self::FirstChildOf | Self::LastChildOf)
    }
}

/// Error returned when a position string is not recognized.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown move position: {0}")]
pub struct ParsePositionError(String);

impl FromStr for MovePosition {
    type Err = ParsePositionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" | "left-of" => Ok(Self::LeftOf),
            "right" | "right-of" => Ok(Self::RightOf),
            "first-child" | "first-child-of" => Ok(Self::FirstChildOf),
            "last-child" | "last-child-of" => Ok(Self::LastChildOf),
            _ => Err(ParsePositionError(s.to_owned())),
        }
    }
}

impl fmt::Display for MovePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LeftOf => "left",
            Self::RightOf => "right",
            Self::FirstChildOf => "first-child",
            Self::LastChildOf => "last-child",
        })
    }
}

/// Admin arrow action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Swap with the previous sibling.
    Up,
    /// Swap with the next sibling.
    Down,
    /// Outdent: become the sibling after the parent.
    Left,
    /// Indent: become the first child of the previous sibling.
    Right,
}

/// Error returned when a direction string is not recognized.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown direction: {0}")]
pub struct ParseDirectionError(String);

impl FromStr for Direction {
    type Err = ParseDirectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            _ => Err(ParseDirectionError(s.to_owned())),
        }
    }
}

/// Resolve an arrow action into a target and position.
///
/// Returns `Ok(None)` when the action has no target (no previous sibling,
/// no parent, ...). That is a no-op, not an error.
///
/// # Errors
///
/// Returns [`TreeError::NotFound`] for unknown ids.
pub fn resolve_direction(
    index: &TreeIndex,
    id: NodeId,
    direction: Direction,
) -> Result<Option<(NodeId, MovePosition)>, TreeError> {
    index.require(id)?;
    let resolved = match direction {
        Direction::Up => index.previous_sibling(id).map(|t| (t.id, MovePosition::LeftOf)),
        Direction::Down => index.next_sibling(id).map(|t| (t.id, MovePosition::RightOf)),
        Direction::Left => index.parent(id).map(|t| (t.id, MovePosition::RightOf)),
        Direction::Right => index
            .previous_sibling(id)
            .map(|t| (t.id, MovePosition::FirstChildOf)),
    };
    Ok(resolved)
}

/// Bound rewrites for one structural change.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MovePlan {
    /// Rows whose coordinates change.
    pub updates: Vec<BoundsUpdate>,
    /// Moved subtree in pre-order, starting with the moved node.
    pub moved: Vec<NodeId>,
    /// Tree ids (before the change) whose rows are rewritten.
    pub touched_trees: BTreeSet<TreeId>,
}

impl MovePlan {
    /// True if nothing changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}

/// Plan moving `id` (with its subtree) relative to `target`.
///
/// # Errors
///
/// Returns [`TreeError::NotFound`] for unknown ids and
/// [`TreeError::InvalidMove`] if the target is the node itself or one of
/// its descendants.
pub fn plan_move(
    index: &TreeIndex,
    id: NodeId,
    target: NodeId,
    position: MovePosition,
) -> Result<MovePlan, TreeError> {
    let node = index.require(id)?;
    let target_node = index.require(target)?;

    if target == id {
        return Err(TreeError::InvalidMove {
            node: id,
            target,
            reason: "target is the node itself",
        });
    }
    if node.contains(target_node) {
        return Err(TreeError::InvalidMove {
            node: id,
            target,
            reason: "target is a descendant of the node",
        });
    }

    // Working copy of every row's coordinates, in index order.
    let original: Vec<BoundsUpdate> = index.iter().map(PageNode::bounds).collect();
    let mut rows = original.clone();
    let position_of: HashMap<NodeId, usize> =
        rows.iter().enumerate().map(|(i, r)| (r.id, i)).collect();

    let (l, r, w) = (node.lft, node.rgt, node.width());
    let source_tree = node.tree_id;
    let detached_root = node.parent_id.is_none();
    let moved: Vec<usize> = (0..rows.len())
        .filter(|&i| rows[i].tree_id == source_tree && rows[i].lft >= l && rows[i].rgt <= r)
        .collect();
    let is_moved = {
        let mut flags = vec![false; rows.len()];
        for &i in &moved {
            flags[i] = true;
        }
        flags
    };

    // 1. Detach.
    for (i, row) in rows.iter_mut().enumerate() {
        if is_moved[i] {
            continue;
        }
        if row.tree_id == source_tree {
            if row.lft > r {
                row.lft -= w;
            }
            if row.rgt > r {
                row.rgt -= w;
            }
        } else if detached_root && row.tree_id > source_tree {
            row.tree_id -= 1;
        }
    }

    // 2. Insertion point from the detached target.
    let t = rows[position_of[&target]];
    let (tree, point, parent, base_depth) = match position {
        MovePosition::FirstChildOf => (t.tree_id, t.lft + 1, Some(t.id), t.depth + 1),
        MovePosition::LastChildOf => (t.tree_id, t.rgt, Some(t.id), t.depth + 1),
        MovePosition::LeftOf if t.parent_id.is_none() => (t.tree_id, 1, None, 0),
        MovePosition::RightOf if t.parent_id.is_none() => (t.tree_id + 1, 1, None, 0),
        MovePosition::LeftOf => (t.tree_id, t.lft, t.parent_id, t.depth),
        MovePosition::RightOf => (t.tree_id, t.rgt + 1, t.parent_id, t.depth),
    };
    let new_tree = !position.is_child() && t.parent_id.is_none();

    // 3. Open the gap (or make room for a new tree).
    for (i, row) in rows.iter_mut().enumerate() {
        if is_moved[i] {
            continue;
        }
        if new_tree {
            if row.tree_id >= tree {
                row.tree_id += 1;
            }
        } else if row.tree_id == tree {
            if row.lft >= point {
                row.lft += w;
            }
            if row.rgt >= point {
                row.rgt += w;
            }
        }
    }

    // 4. Place the subtree.
    let offset = point - l;
    let depth_offset = base_depth - node.depth;
    for &i in &moved {
        let row = &mut rows[i];
        row.tree_id = tree;
        row.lft += offset;
        row.rgt += offset;
        row.depth += depth_offset;
        if row.id == id {
            row.parent_id = parent;
        }
    }

    let mut plan = MovePlan {
        moved: moved.iter().map(|&i| rows[i].id).collect(),
        ..MovePlan::default()
    };
    for (before, after) in original.iter().zip(&rows) {
        if before != after {
            plan.touched_trees.insert(before.tree_id);
            plan.updates.push(*after);
        }
    }

    tracing::debug!(
        node = id,
        target,
        %position,
        updates = plan.updates.len(),
        "Planned move"
    );
    Ok(plan)
}

/// Coordinates and bound shifts for a new node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InsertPlan {
    /// Parent of the new node.
    pub parent_id: Option<NodeId>,
    /// Tree the node joins (or creates).
    pub tree_id: TreeId,
    /// Left bound.
    pub lft: i64,
    /// Right bound.
    pub rgt: i64,
    /// Depth.
    pub depth: i64,
    /// Existing rows shifted to open the gap.
    pub shifts: Vec<BoundsUpdate>,
    /// Tree ids whose rows are rewritten or created.
    pub touched_trees: BTreeSet<TreeId>,
}

/// Plan inserting a node as the last child of `parent`, or as a new tree
/// after the last one.
///
/// # Errors
///
/// Returns [`TreeError::NotFound`] for an unknown parent.
pub fn plan_insert(index: &TreeIndex, parent: Option<NodeId>) -> Result<InsertPlan, TreeError> {
    let Some(parent_id) = parent else {
        let tree_id = index.roots().last().map_or(1, |r| r.tree_id + 1);
        return Ok(InsertPlan {
            parent_id: None,
            tree_id,
            lft: 1,
            rgt: 2,
            depth: 0,
            shifts: Vec::new(),
            touched_trees: BTreeSet::from([tree_id]),
        });
    };

    let p = index.require(parent_id)?;
    let point = p.rgt;
    let shifts = index
        .iter()
        .filter(|n| n.tree_id == p.tree_id && n.rgt >= point)
        .map(|n| {
            let mut update = n.bounds();
            if update.lft >= point {
                update.lft += 2;
            }
            update.rgt += 2;
            update
        })
        .collect();

    Ok(InsertPlan {
        parent_id: Some(parent_id),
        tree_id: p.tree_id,
        lft: point,
        rgt: point + 1,
        depth: p.depth + 1,
        shifts,
        touched_trees: BTreeSet::from([p.tree_id]),
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use super::*;
    use crate::testing::{forest, id_of, index, shape};

    /// Apply a move and return the new index, checking invariants.
    fn apply(idx: &TreeIndex, node: &str, target: &str, position: MovePosition) -> TreeIndex {
        let plan = plan_move(idx, id_of(idx, node), id_of(idx, target), position).unwrap();
        let next = idx.rebuild(&[], &plan.updates, &[]).unwrap();
        next.check_invariants().unwrap();
        next
    }

    #[test]
    fn test_position_parsing() {
        assert_eq!("left".parse(), Ok(MovePosition::LeftOf));
        assert_eq!("last-child".parse(), Ok(MovePosition::LastChildOf));
        assert_eq!("first-child-of".parse(), Ok(MovePosition::FirstChildOf));
        assert_eq!("right-of".parse(), Ok(MovePosition::RightOf));
        assert!("inside".parse::<MovePosition>().is_err());
    }

    #[test]
    fn test_direction_parsing() {
        assert_eq!("up".parse(), Ok(Direction::Up));
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn test_move_right_of_sibling_parent() {
        // A(B(D), C): D becomes the sibling between B and C.
        let idx = index("A\n  B\n    D\n  C");

        let next = apply(&idx, "D", "B", MovePosition::RightOf);
        let d = next.get(id_of(&next, "D")).unwrap();

        assert_eq!(shape(&next), "A(B,D,C)");
        assert_eq!((d.lft, d.rgt, d.depth), (4, 5, 1));
        assert_eq!(d.parent_id, Some(id_of(&next, "A")));
    }

    #[test]
    fn test_move_into_descendant_is_invalid() {
        let idx = index("A\n  B\n    D\n  C");

        let err = plan_move(&idx, id_of(&idx, "A"), id_of(&idx, "D"), MovePosition::FirstChildOf)
            .unwrap_err();

        assert!(matches!(err, TreeError::InvalidMove { .. }));
    }

    #[test]
    fn test_move_onto_self_is_invalid() {
        let idx = index("A\n  B");
        let b = id_of(&idx, "B");

        assert!(matches!(
            plan_move(&idx, b, b, MovePosition::LeftOf),
            Err(TreeError::InvalidMove { .. })
        ));
    }

    #[test]
    fn test_move_unknown_ids() {
        let idx = index("A");

        assert!(matches!(
            plan_move(&idx, 1, 9, MovePosition::LeftOf),
            Err(TreeError::NotFound(9))
        ));
        assert!(matches!(
            plan_move(&idx, 9, 1, MovePosition::LeftOf),
            Err(TreeError::NotFound(9))
        ));
    }

    #[test]
    fn test_move_subtree_keeps_shape_and_depth() {
        let idx = index("A\n  B\n    D\n      E\n  C");

        let next = apply(&idx, "B", "C", MovePosition::LastChildOf);
        let e = next.get(id_of(&next, "E")).unwrap();

        assert_eq!(shape(&next), "A(C(B(D(E))))");
        assert_eq!(e.depth, 4);
    }

    #[test]
    fn test_move_first_child_and_left_of() {
        let idx = index("A\n  B\n  C\n  D");

        let next = apply(&idx, "D", "A", MovePosition::FirstChildOf);
        assert_eq!(shape(&next), "A(D,B,C)");

        let next = apply(&next, "B", "C", MovePosition::LeftOf);
        assert_eq!(shape(&next), "A(D,B,C)");

        let next = apply(&next, "C", "D", MovePosition::LeftOf);
        assert_eq!(shape(&next), "A(C,D,B)");
    }

    #[test]
    fn test_move_across_trees() {
        let idx = index("A\n  B\nC\n  D");

        let next = apply(&idx, "B", "D", MovePosition::FirstChildOf);

        assert_eq!(shape(&next), "A C(D(B))");
        assert_eq!(next.get(id_of(&next, "B")).unwrap().tree_id, 2);
    }

    #[test]
    fn test_move_root_into_other_tree_closes_tree_ids() {
        let idx = index("A\nB\n  X\nC");

        let next = apply(&idx, "A", "X", MovePosition::LastChildOf);

        assert_eq!(shape(&next), "B(X(A)) C");
        assert_eq!(next.get(id_of(&next, "C")).unwrap().tree_id, 2);
    }

    #[test]
    fn test_move_right_of_root_creates_tree() {
        let idx = index("A\n  B\nC");

        let next = apply(&idx, "B", "A", MovePosition::RightOf);

        assert_eq!(shape(&next), "A B C");
        let b = next.get(id_of(&next, "B")).unwrap();
        assert_eq!((b.tree_id, b.lft, b.rgt, b.depth, b.parent_id), (2, 1, 2, 0, None));
    }

    #[test]
    fn test_move_left_of_root_reorders_trees() {
        let idx = index("A\nB\nC\n  D");

        let next = apply(&idx, "C", "A", MovePosition::LeftOf);

        assert_eq!(shape(&next), "C(D) A B");
    }

    #[test]
    fn test_outdent_to_right_of_parent() {
        let idx = index("A\n  B\n    D\n  C");
        let d = id_of(&idx, "D");

        let (target, position) = resolve_direction(&idx, d, Direction::Left).unwrap().unwrap();
        let plan = plan_move(&idx, d, target, position).unwrap();
        let next = idx.rebuild(&[], &plan.updates, &[]).unwrap();

        assert_eq!(shape(&next), "A(B,D,C)");
    }

    #[test]
    fn test_indent_into_previous_sibling() {
        let idx = index("A\n  B\n    X\n  C");
        let c = id_of(&idx, "C");

        let (target, position) = resolve_direction(&idx, c, Direction::Right).unwrap().unwrap();
        let plan = plan_move(&idx, c, target, position).unwrap();
        let next = idx.rebuild(&[], &plan.updates, &[]).unwrap();

        assert_eq!(shape(&next), "A(B(C,X))");
    }

    #[test]
    fn test_up_on_first_child_has_no_target() {
        let idx = index("A\n  B\n  C");

        assert_eq!(resolve_direction(&idx, id_of(&idx, "B"), Direction::Up).unwrap(), None);
        assert_eq!(resolve_direction(&idx, id_of(&idx, "C"), Direction::Down).unwrap(), None);
        assert_eq!(resolve_direction(&idx, id_of(&idx, "A"), Direction::Left).unwrap(), None);
    }

    #[test]
    fn test_up_and_down_swap_siblings() {
        let idx = index("A\n  B\n  C\n  D");
        let c = id_of(&idx, "C");

        let (target, position) = resolve_direction(&idx, c, Direction::Up).unwrap().unwrap();
        let next = idx
            .rebuild(&[], &plan_move(&idx, c, target, position).unwrap().updates, &[])
            .unwrap();
        assert_eq!(shape(&next), "A(C,B,D)");

        let (target, position) = resolve_direction(&next, c, Direction::Down).unwrap().unwrap();
        let back = next
            .rebuild(&[], &plan_move(&next, c, target, position).unwrap().updates, &[])
            .unwrap();
        assert_eq!(shape(&back), "A(B,C,D)");
    }

    #[test]
    fn test_noop_move_emits_nothing() {
        let idx = index("A\n  B\n  C");

        let plan = plan_move(&idx, id_of(&idx, "C"), id_of(&idx, "B"), MovePosition::RightOf).unwrap();

        assert!(plan.is_empty());
        assert!(plan.touched_trees.is_empty());
    }

    #[test]
    fn test_plan_lists_moved_subtree_and_trees() {
        let idx = index("A\n  B\n    D\nC");

        let plan = plan_move(&idx, id_of(&idx, "B"), id_of(&idx, "C"), MovePosition::LastChildOf)
            .unwrap();

        assert_eq!(plan.moved, vec![id_of(&idx, "B"), id_of(&idx, "D")]);
        assert_eq!(plan.touched_trees, BTreeSet::from([1, 2]));
    }

    #[test]
    fn test_only_changed_rows_are_emitted() {
        let idx = index("A\n  B\n  C\n  D\nE");

        let plan = plan_move(&idx, id_of(&idx, "D"), id_of(&idx, "C"), MovePosition::LeftOf).unwrap();
        let ids: BTreeSet<NodeId> = plan.updates.iter().map(|u| u.id).collect();

        assert_eq!(ids, BTreeSet::from([id_of(&idx, "C"), id_of(&idx, "D")]));
    }

    #[test]
    fn test_insert_last_child() {
        let idx = index("A\n  B\nC");

        let plan = plan_insert(&idx, Some(id_of(&idx, "A"))).unwrap();

        assert_eq!((plan.tree_id, plan.lft, plan.rgt, plan.depth), (1, 4, 5, 1));
        assert_eq!(plan.shifts.len(), 1);
        assert_eq!(plan.shifts[0].rgt, 6);
    }

    #[test]
    fn test_insert_nested_shifts_ancestors_and_followers() {
        let idx = index("A\n  B\n  C");

        let plan = plan_insert(&idx, Some(id_of(&idx, "B"))).unwrap();
        let shifted: Vec<(NodeId, i64, i64)> =
            plan.shifts.iter().map(|u| (u.id, u.lft, u.rgt)).collect();

        assert_eq!((plan.lft, plan.rgt), (3, 4));
        assert_eq!(shifted, vec![(1, 1, 8), (2, 2, 5), (3, 6, 7)]);
    }

    #[test]
    fn test_insert_root_appends_tree() {
        let idx = index("A\nB");

        let plan = plan_insert(&idx, None).unwrap();

        assert_eq!(plan.tree_id, 3);
        assert!(plan.shifts.is_empty());
        assert_eq!(plan_insert(&TreeIndex::default(), None).unwrap().tree_id, 1);
    }

    const OUTLINE: &str = "A\n  B\n    C\n    D\n  E\nF\n  G\n    H\nI\n  J\n  K\n    L";

    proptest! {
        #[test]
        fn test_random_moves_keep_nested_set(
            moves in proptest::collection::vec((1usize..=12, 1usize..=12, 0usize..4), 1..25)
        ) {
            let mut idx = TreeIndex::build(forest(OUTLINE)).unwrap();
            let positions = [
                MovePosition::LeftOf,
                MovePosition::RightOf,
                MovePosition::FirstChildOf,
                MovePosition::LastChildOf,
            ];

            for (node, target, position) in moves {
                let node = NodeId::try_from(node).unwrap();
                let target = NodeId::try_from(target).unwrap();
                match plan_move(&idx, node, target, positions[position]) {
                    Ok(plan) => {
                        let next = idx.rebuild(&[], &plan.updates, &[]).unwrap();
                        prop_assert!(next.check_invariants().is_ok());
                        prop_assert_eq!(next.len(), idx.len());
                        prop_assert_eq!(
                            next.descendants(node).len(),
                            idx.descendants(node).len()
                        );
                        idx = next;
                    }
                    Err(TreeError::InvalidMove { .. }) => {
                        prop_assert!(node == target || idx.descendants(node).iter().any(|d| d.id == target));
                    }
                    Err(e) => prop_assert!(false, "unexpected error: {e}"),
                }
            }
        }
    }
}
