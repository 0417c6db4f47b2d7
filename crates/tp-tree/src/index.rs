//! Tree materializer.
//!
//! Builds a [`TreeIndex`] from one pre-order snapshot of the node table.
//!
//! # Architecture
//!
//! Nodes are stored in a flat `Vec<PageNode>` in `(tree_id, lft)` order with
//! parent/children relationships tracked by indices. This provides:
//! - O(1) id and URL lookups via `HashMap` indexes
//! - O(d) ancestry walks where d is the node depth
//! - Pre-order descendant lists for every node
//!
//! The index is immutable. Mutations are planned against it and a new index
//! is built from the result (see [`TreeIndex::rebuild`]).

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;
use tp_store::{BoundsUpdate, NodeId, PageNode, PageStatus, TreeId};

use crate::error::TreeError;

/// Maximum ancestry depth before a snapshot is considered corrupt.
pub const MAX_DEPTH: usize = 1000;

/// Materializer output for one node, as sent to the admin tree editor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StructureEntry {
    /// Node id.
    pub id: NodeId,
    /// Direct children in order.
    pub children: Vec<NodeId>,
    /// Parent, `None` for a root.
    pub parent: Option<NodeId>,
    /// All descendants in pre-order.
    pub descendants: Vec<NodeId>,
}

/// Materialized structure keyed by node id.
pub type TreeStructure = BTreeMap<NodeId, StructureEntry>;

/// Breadcrumb navigation item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Breadcrumb {
    /// Ancestor id.
    pub id: NodeId,
    /// Display title.
    pub title: String,
    /// Effective URL of the ancestor.
    pub link: String,
}

/// Immutable arena of page nodes with structural lookups.
#[derive(Debug, Default)]
pub struct TreeIndex {
    nodes: Vec<PageNode>,
    positions: HashMap<NodeId, usize>,
    parents: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
    descendants: Vec<Vec<usize>>,
    roots: Vec<usize>,
    urls: HashMap<String, Vec<usize>>,
}

impl TreeIndex {
    /// Materialize a full snapshot.
    ///
    /// `nodes` must be ordered by `(tree_id, lft)`, as returned by
    /// [`NodeStore::list_ordered`](tp_store::NodeStore::list_ordered).
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::Corrupt`] if the sequence is out of order, ids
    /// repeat, a `parent_id` disagrees with the bound nesting, or nesting is
    /// deeper than [`MAX_DEPTH`].
    pub fn build(nodes: Vec<PageNode>) -> Result<Self, TreeError> {
        Self::materialize(nodes, None)
    }

    /// Materialize the nodes with `status >= min_status`.
    ///
    /// A node whose parent is filtered out is dropped together with its
    /// whole subtree.
    ///
    /// # Errors
    ///
    /// Same as [`TreeIndex::build`].
    pub fn build_filtered(nodes: Vec<PageNode>, min_status: PageStatus) -> Result<Self, TreeError> {
        Self::materialize(nodes, Some(min_status))
    }

    /// Filtered copy of this index. Reads no storage.
    ///
    /// # Errors
    ///
    /// Same as [`TreeIndex::build`].
    pub fn filtered(&self, min_status: PageStatus) -> Result<Self, TreeError> {
        Self::build_filtered(self.nodes.clone(), min_status)
    }

    /// Build a new index from this one with changes applied in memory.
    ///
    /// Rows listed in `removed` are dropped, `bounds` rewrites coordinates,
    /// and `replaced` swaps in whole rows (content and coordinates).
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::NotFound`] if a change names an unknown id, or
    /// [`TreeError::Corrupt`] if the result is not a valid nesting.
    pub fn rebuild(
        &self,
        removed: &[NodeId],
        bounds: &[BoundsUpdate],
        replaced: &[PageNode],
    ) -> Result<Self, TreeError> {
        let removed: HashSet<NodeId> = removed.iter().copied().collect();
        if let Some(&id) = removed.iter().find(|id| !self.positions.contains_key(id)) {
            return Err(TreeError::NotFound(id));
        }

        let mut nodes = self.nodes.clone();
        for update in bounds {
            let &i = self
                .positions
                .get(&update.id)
                .ok_or(TreeError::NotFound(update.id))?;
            nodes[i].apply_bounds(update);
        }
        for node in replaced {
            let &i = self
                .positions
                .get(&node.id)
                .ok_or(TreeError::NotFound(node.id))?;
            nodes[i] = node.clone();
        }
        nodes.retain(|n| !removed.contains(&n.id));
        nodes.sort_by_key(|n| (n.tree_id, n.lft));
        Self::build(nodes)
    }

    fn materialize(nodes: Vec<PageNode>, min_status: Option<PageStatus>) -> Result<Self, TreeError> {
        let mut index = Self {
            nodes: Vec::with_capacity(nodes.len()),
            ..Self::default()
        };
        // Open ancestors of the current node, innermost last.
        let mut stack: Vec<usize> = Vec::new();
        // Filtered-out subtree currently being skipped: (tree_id, rgt).
        let mut skip: Option<(TreeId, i64)> = None;
        let mut last: Option<(TreeId, i64)> = None;
        let mut seen: HashSet<NodeId> = HashSet::with_capacity(nodes.len());

        for node in nodes {
            let key = (node.tree_id, node.lft);
            if last.is_some_and(|prev| prev >= key) {
                return Err(TreeError::Corrupt(format!(
                    "node {} is out of (tree_id, lft) order",
                    node.id
                )));
            }
            last = Some(key);
            if !seen.insert(node.id) {
                return Err(TreeError::Corrupt(format!("duplicate node id {}", node.id)));
            }

            if let Some((tree, rgt)) = skip {
                if node.tree_id == tree && node.lft < rgt {
                    continue;
                }
                skip = None;
            }

            while let Some(&top) = stack.last() {
                let open = &index.nodes[top];
                if open.tree_id != node.tree_id || open.rgt < node.lft {
                    stack.pop();
                } else {
                    break;
                }
            }

            if min_status.is_some_and(|min| node.status < min) {
                skip = Some((node.tree_id, node.rgt));
                continue;
            }

            let parent = stack.last().copied();
            let expected = parent.map(|p| index.nodes[p].id);
            if node.parent_id != expected {
                return Err(TreeError::Corrupt(format!(
                    "node {} has parent {:?} but is nested under {:?}",
                    node.id, node.parent_id, expected
                )));
            }
            if stack.len() >= MAX_DEPTH {
                return Err(TreeError::Corrupt(format!(
                    "node {} is nested deeper than {MAX_DEPTH} levels",
                    node.id
                )));
            }

            let idx = index.nodes.len();
            index.positions.insert(node.id, idx);
            index.parents.push(parent);
            index.children.push(Vec::new());
            index.descendants.push(Vec::new());
            match parent {
                Some(p) => index.children[p].push(idx),
                None => index.roots.push(idx),
            }
            for &ancestor in &stack {
                index.descendants[ancestor].push(idx);
            }
            index.urls.entry(node.slug.clone()).or_default().push(idx);
            if let Some(url) = node
                .slug_override
                .as_ref()
                .filter(|s| !s.is_empty() && **s != node.slug)
            {
                index.urls.entry(url.clone()).or_default().push(idx);
            }
            index.nodes.push(node);
            stack.push(idx);
        }

        Ok(index)
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if the index holds no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in pre-order.
    #[must_use]
    pub fn nodes(&self) -> &[PageNode] {
        &self.nodes
    }

    /// Iterate nodes in pre-order.
    pub fn iter(&self) -> impl Iterator<Item = &PageNode> {
        self.nodes.iter()
    }

    /// Get a node by id.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&PageNode> {
        self.positions.get(&id).map(|&i| &self.nodes[i])
    }

    /// Get a node by id, failing with [`TreeError::NotFound`].
    pub fn require(&self, id: NodeId) -> Result<&PageNode, TreeError> {
        self.get(id).ok_or(TreeError::NotFound(id))
    }

    /// True if the node is present.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.positions.contains_key(&id)
    }

    /// Parent of a node.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<&PageNode> {
        let &i = self.positions.get(&id)?;
        self.parents[i].map(|p| &self.nodes[p])
    }

    /// Direct children of a node, in order. Empty for unknown ids.
    #[must_use]
    pub fn children(&self, id: NodeId) -> Vec<&PageNode> {
        self.positions
            .get(&id)
            .map(|&i| self.children[i].iter().map(|&c| &self.nodes[c]).collect())
            .unwrap_or_default()
    }

    /// All descendants of a node in pre-order. Empty for unknown ids.
    #[must_use]
    pub fn descendants(&self, id: NodeId) -> Vec<&PageNode> {
        self.positions
            .get(&id)
            .map(|&i| self.descendants[i].iter().map(|&d| &self.nodes[d]).collect())
            .unwrap_or_default()
    }

    /// Ancestry from the root down to the node itself.
    #[must_use]
    pub fn ancestors(&self, id: NodeId) -> Vec<&PageNode> {
        let mut chain = Vec::new();
        let mut current = self.positions.get(&id).copied();
        while let Some(i) = current {
            chain.push(&self.nodes[i]);
            current = self.parents[i];
        }
        chain.reverse();
        chain
    }

    /// Root nodes ordered by tree id.
    #[must_use]
    pub fn roots(&self) -> Vec<&PageNode> {
        self.roots.iter().map(|&i| &self.nodes[i]).collect()
    }

    /// Sibling list containing the node (roots are siblings of each other).
    fn siblings(&self, i: usize) -> &[usize] {
        match self.parents[i] {
            Some(p) => &self.children[p],
            None => &self.roots,
        }
    }

    /// Sibling immediately before the node.
    #[must_use]
    pub fn previous_sibling(&self, id: NodeId) -> Option<&PageNode> {
        let &i = self.positions.get(&id)?;
        let siblings = self.siblings(i);
        let at = siblings.iter().position(|&s| s == i)?;
        at.checked_sub(1).map(|prev| &self.nodes[siblings[prev]])
    }

    /// Sibling immediately after the node.
    #[must_use]
    pub fn next_sibling(&self, id: NodeId) -> Option<&PageNode> {
        let &i = self.positions.get(&id)?;
        let siblings = self.siblings(i);
        let at = siblings.iter().position(|&s| s == i)?;
        siblings.get(at + 1).map(|&next| &self.nodes[next])
    }

    /// Find the first node in tree order whose effective or derived URL
    /// equals `url` and whose status is at least `min_status`.
    #[must_use]
    pub fn find_by_url(&self, url: &str, min_status: PageStatus) -> Option<&PageNode> {
        self.urls
            .get(url)?
            .iter()
            .map(|&i| &self.nodes[i])
            .find(|n| n.status >= min_status)
    }

    /// Breadcrumbs from the root down to the node's parent.
    ///
    /// The node itself is not included. Unknown ids yield an empty list.
    #[must_use]
    pub fn breadcrumbs(&self, id: NodeId) -> Vec<Breadcrumb> {
        let mut chain = self.ancestors(id);
        chain.pop();
        chain
            .into_iter()
            .map(|n| Breadcrumb {
                id: n.id,
                title: n.title.clone(),
                link: n.url().to_owned(),
            })
            .collect()
    }

    /// Materialized structure for every node.
    #[must_use]
    pub fn structure(&self) -> TreeStructure {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| {
                let entry = StructureEntry {
                    id: node.id,
                    children: self.children[i].iter().map(|&c| self.nodes[c].id).collect(),
                    parent: node.parent_id,
                    descendants: self.descendants[i].iter().map(|&d| self.nodes[d].id).collect(),
                };
                (node.id, entry)
            })
            .collect()
    }

    /// Verify the nested-set invariants of an unfiltered snapshot.
    ///
    /// Checks root coordinates, gapless tree ids `1..=k`, depth, containment,
    /// sibling order, and gapless `1..=2n` numbering per tree.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::Corrupt`] describing the first violation.
    pub fn check_invariants(&self) -> Result<(), TreeError> {
        let corrupt = |msg: String| Err(TreeError::Corrupt(msg));

        for (expected_tree, &r) in (1..).zip(&self.roots) {
            let root = &self.nodes[r];
            let size = i64::try_from(self.descendants[r].len() + 1).unwrap_or(i64::MAX);
            if root.tree_id != expected_tree {
                return corrupt(format!(
                    "root {} has tree id {}, expected {expected_tree}",
                    root.id, root.tree_id
                ));
            }
            if root.depth != 0 {
                return corrupt(format!("root {} has depth {}", root.id, root.depth));
            }
            if root.lft != 1 || root.rgt != 2 * size {
                return corrupt(format!(
                    "root {} spans ({}, {}), expected (1, {})",
                    root.id,
                    root.lft,
                    root.rgt,
                    2 * size
                ));
            }

            let mut bounds: Vec<i64> = Vec::with_capacity(2 * self.descendants[r].len() + 2);
            bounds.extend([root.lft, root.rgt]);
            for &d in &self.descendants[r] {
                let node = &self.nodes[d];
                bounds.extend([node.lft, node.rgt]);
            }
            bounds.sort_unstable();
            if bounds.iter().zip(1..).any(|(&b, expected)| b != expected) {
                return corrupt(format!("tree {} numbering has gaps or repeats", root.tree_id));
            }
        }

        for (i, node) in self.nodes.iter().enumerate() {
            if node.lft >= node.rgt {
                return corrupt(format!("node {} has lft >= rgt", node.id));
            }
            if let Some(p) = self.parents[i] {
                let parent = &self.nodes[p];
                if node.depth != parent.depth + 1 {
                    return corrupt(format!(
                        "node {} has depth {}, parent depth {}",
                        node.id, node.depth, parent.depth
                    ));
                }
                if !parent.contains(node) {
                    return corrupt(format!("node {} escapes parent {}", node.id, parent.id));
                }
            }
            for pair in self.children[i].windows(2) {
                let (a, b) = (&self.nodes[pair[0]], &self.nodes[pair[1]]);
                if a.rgt >= b.lft {
                    return corrupt(format!("siblings {} and {} overlap", a.id, b.id));
                }
            }
        }

        Ok(())
    }
}
