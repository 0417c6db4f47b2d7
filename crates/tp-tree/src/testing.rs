//! Test fixtures: build forests from an indented outline.

use chrono::{TimeZone, Utc};
use tp_store::{NodeId, PageNode, PageStatus};

use crate::index::TreeIndex;
use crate::slug::slugify;

/// Build pre-order nodes from an outline with two spaces per level.
///
/// Ids are assigned from 1 in outline order. Every node is `InNavigation`
/// and carries its derived slug.
pub(crate) fn forest(outline: &str) -> Vec<PageNode> {
    let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut nodes: Vec<PageNode> = Vec::new();
    // (position in nodes, depth) of open ancestors.
    let mut open: Vec<usize> = Vec::new();
    let mut tree_id = 0;
    let mut counter = 0;

    for line in outline.lines().filter(|l| !l.trim().is_empty()) {
        let depth = (line.len() - line.trim_start().len()) / 2;
        let title = line.trim().to_owned();

        while open.len() > depth {
            let closed = open.pop().unwrap();
            counter += 1;
            nodes[closed].rgt = counter;
        }
        if depth == 0 {
            tree_id += 1;
            counter = 0;
        }
        counter += 1;

        let parent = open.last().map(|&p| &nodes[p]);
        let parent_id = parent.map(|p| p.id);
        let slug = match parent {
            Some(p) => format!("{}{}/", p.slug, slugify(&title)),
            None => format!("/{}/", slugify(&title)),
        };
        let id = NodeId::try_from(nodes.len() + 1).unwrap();
        nodes.push(PageNode {
            id,
            parent_id,
            tree_id,
            lft: counter,
            rgt: 0,
            depth: i64::try_from(depth).unwrap(),
            body: String::new(),
            status: PageStatus::InNavigation,
            template: String::new(),
            comments_enabled: false,
            login_required: false,
            slug_override: None,
            slug,
            created_at: ts,
            updated_at: ts,
            title,
        });
        open.push(nodes.len() - 1);
    }
    while let Some(closed) = open.pop() {
        counter += 1;
        nodes[closed].rgt = counter;
    }
    nodes
}

/// Materialize an outline.
pub(crate) fn index(outline: &str) -> TreeIndex {
    TreeIndex::build(forest(outline)).unwrap()
}

/// Id of the unique node with the given title.
pub(crate) fn id_of(index: &TreeIndex, title: &str) -> NodeId {
    index
        .iter()
        .find(|n| n.title == title)
        .map(|n| n.id)
        .unwrap_or_else(|| panic!("no node titled {title}"))
}

/// Titles in pre-order, nested with parentheses: `A(B(D),C)`.
pub(crate) fn shape(index: &TreeIndex) -> String {
    fn walk(index: &TreeIndex, node: &PageNode, out: &mut String) {
        out.push_str(&node.title);
        let children = index.children(node.id);
        if !children.is_empty() {
            out.push('(');
            for (i, child) in children.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                walk(index, child, out);
            }
            out.push(')');
        }
    }

    let mut out = String::new();
    for (i, root) in index.roots().iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        walk(index, root, &mut out);
    }
    out
}
