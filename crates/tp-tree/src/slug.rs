//! Slug deriver.
//!
//! A node's slug is its ancestry's titles, slugified and joined:
//! `'/' + join('/', slugify(t) for t in root..=self) + '/'`.
//! Slugs are recomputed top-down whenever a node's ancestry or title changes.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tp_store::{NodeId, PageNode, SlugUpdate};

use crate::error::TreeError;
use crate::index::{MAX_DEPTH, TreeIndex};

static NON_ALPHANUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}]+").expect("invalid slug regex"));

/// Normalize text into a lowercase URL token.
///
/// Runs of characters other than Unicode letters and digits collapse to a
/// single `-`; leading and trailing `-` are trimmed. Punctuation-only text
/// yields an empty string.
#[must_use]
pub fn slugify(text: &str) -> String {
    let lowered = text.to_lowercase();
    NON_ALPHANUMERIC
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_owned()
}

/// Slug for a title chain ordered from the root down to the node.
#[must_use]
pub fn derive<S: AsRef<str>>(titles: &[S]) -> String {
    let segments: Vec<String> = titles.iter().map(|t| slugify(t.as_ref())).collect();
    format!("/{}/", segments.join("/"))
}

/// Append one title to a parent's slug.
fn child_slug(parent_slug: &str, title: &str) -> String {
    format!("{parent_slug}{}/", slugify(title))
}

/// Slug of an existing node computed from its current ancestry.
///
/// # Errors
///
/// Returns [`TreeError::NotFound`] for unknown ids or [`TreeError::Corrupt`]
/// if the ancestry is deeper than [`MAX_DEPTH`].
pub fn derive_for(index: &TreeIndex, id: NodeId) -> Result<String, TreeError> {
    index.require(id)?;
    let mut titles: Vec<&str> = Vec::new();
    let mut current = index.get(id);
    while let Some(node) = current {
        if titles.len() >= MAX_DEPTH {
            return Err(TreeError::Corrupt(format!(
                "ancestry of node {id} exceeds {MAX_DEPTH} levels"
            )));
        }
        titles.push(&node.title);
        current = index.parent(node.id);
    }
    titles.reverse();
    Ok(derive(&titles))
}

/// Slug for a new node appended under `parent` (or as a root).
///
/// # Errors
///
/// Same as [`derive_for`] for the parent.
pub fn derive_new(index: &TreeIndex, parent: Option<NodeId>, title: &str) -> Result<String, TreeError> {
    let slug = match parent {
        Some(p) => child_slug(&derive_for(index, p)?, title),
        None => derive(&[title]),
    };
    let siblings = match parent {
        Some(p) => index.children(p),
        None => index.roots(),
    };
    if siblings.iter().any(|s| s.slug == slug) {
        tracing::warn!(slug = %slug, "New page shares its slug with a sibling");
    }
    Ok(slug)
}

/// Recompute slugs for a node and every descendant, top-down.
///
/// Every parent's slug is final before its children's are derived from it.
/// Only slugs that differ from the stored value are returned.
///
/// # Errors
///
/// Returns [`TreeError::NotFound`] for unknown ids or [`TreeError::Corrupt`]
/// if the ancestry is deeper than [`MAX_DEPTH`].
pub fn derive_subtree(index: &TreeIndex, root: NodeId) -> Result<Vec<SlugUpdate>, TreeError> {
    let mut slugs: HashMap<NodeId, String> = HashMap::new();
    slugs.insert(root, derive_for(index, root)?);

    for node in index.descendants(root) {
        let parent = node.parent_id.and_then(|p| slugs.get(&p)).ok_or_else(|| {
            TreeError::Corrupt(format!("node {} is listed before its parent", node.id))
        })?;
        let slug = child_slug(parent, &node.title);
        slugs.insert(node.id, slug);
    }

    warn_collisions(index, root, &slugs);

    let subtree = std::iter::once(index.require(root)?).chain(index.descendants(root));
    Ok(subtree
        .filter_map(|node| {
            let slug = slugs.remove(&node.id)?;
            (slug != node.slug).then_some(SlugUpdate { id: node.id, slug })
        })
        .collect())
}

/// Log sibling groups inside the recomputed subtree that share a slug.
fn warn_collisions(index: &TreeIndex, root: NodeId, slugs: &HashMap<NodeId, String>) {
    let siblings = match index.parent(root) {
        Some(parent) => index.children(parent.id),
        None => index.roots(),
    };
    let mut groups: Vec<Vec<&PageNode>> = vec![siblings, index.children(root)];
    groups.extend(index.descendants(root).into_iter().map(|n| index.children(n.id)));

    for group in groups {
        let mut seen: HashMap<&str, NodeId> = HashMap::new();
        for node in group {
            let slug = slugs.get(&node.id).unwrap_or(&node.slug);
            if let Some(first) = seen.insert(slug, node.id) {
                tracing::warn!(slug = %slug, first, second = node.id, "Sibling pages share a slug");
            }
        }
    }
}
