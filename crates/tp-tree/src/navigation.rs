//! Navigation renderer.
//!
//! Builds a [`NavItem`] tree from manual entries and a (filtered)
//! [`TreeIndex`], then renders it with a caller-supplied template.

use serde::{Deserialize, Serialize};
use tp_store::{NodeId, PageNode};

use crate::index::TreeIndex;

/// Hand-written navigation entry from configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualEntry {
    /// Display label.
    pub label: String,
    /// Link target.
    pub link: String,
    /// Nested entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ManualEntry>,
}

/// Origin of a navigation item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NavKind {
    /// Page from the tree.
    Page {
        /// Page id.
        id: NodeId,
    },
    /// Entry from configuration.
    Manual,
}

/// Navigation item with children for UI tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NavItem {
    /// Display title.
    pub title: String,
    /// Link target.
    pub link: String,
    /// Where the item came from.
    #[serde(flatten)]
    pub kind: NavKind,
    /// Child navigation items.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NavItem>,
}

impl From<&ManualEntry> for NavItem {
    fn from(entry: &ManualEntry) -> Self {
        Self {
            title: entry.label.clone(),
            link: entry.link.clone(),
            kind: NavKind::Manual,
            children: entry.children.iter().map(Self::from).collect(),
        }
    }
}

/// What a template sees for one item.
pub struct NavContext<'a> {
    /// Item being rendered.
    pub item: &'a NavItem,
    /// Already rendered markup of the item's children (empty for leaves).
    pub children: &'a str,
    /// Nesting depth, 0 for top-level items.
    pub depth: usize,
}

/// Build navigation: manual entries first, then every root of `index`.
#[must_use]
pub fn build(index: &TreeIndex, manual: &[ManualEntry]) -> Vec<NavItem> {
    fn page_item(index: &TreeIndex, node: &PageNode) -> NavItem {
        NavItem {
            title: node.title.clone(),
            link: node.url().to_owned(),
            kind: NavKind::Page { id: node.id },
            children: index
                .children(node.id)
                .into_iter()
                .map(|child| page_item(index, child))
                .collect(),
        }
    }

    manual
        .iter()
        .map(NavItem::from)
        .chain(index.roots().into_iter().map(|root| page_item(index, root)))
        .collect()
}

/// Render items with `template`.
///
/// Children are rendered before their parent, and the parent's template
/// receives their concatenated markup.
pub fn render<F>(items: &[NavItem], template: F) -> String
where
    F: Fn(&NavContext<'_>) -> String,
{
    fn render_items<F>(items: &[NavItem], depth: usize, template: &F) -> String
    where
        F: Fn(&NavContext<'_>) -> String,
    {
        items
            .iter()
            .map(|item| {
                let children = render_items(&item.children, depth + 1, template);
                template(&NavContext {
                    item,
                    children: &children,
                    depth,
                })
            })
            .collect()
    }

    render_items(items, 0, &template)
}

/// Default markup: `<li><a href="link">title</a><ul>children</ul></li>`.
///
/// The `<ul>` is omitted for leaves. Title and link are HTML-escaped.
#[must_use]
pub fn default_template(ctx: &NavContext<'_>) -> String {
    let title = html_escape::encode_text(&ctx.item.title);
    let link = html_escape::encode_double_quoted_attribute(&ctx.item.link);
    if ctx.children.is_empty() {
        format!(r#"<li><a href="{link}">{title}</a></li>"#)
    } else {
        format!(r#"<li><a href="{link}">{title}</a><ul>{}</ul></li>"#, ctx.children)
    }
}
