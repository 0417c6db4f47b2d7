//! Page node types.
//!
//! A [`PageNode`] is one row of the node table: page content plus the
//! nested-set coordinates (`tree_id`, `lft`, `rgt`, `depth`) that place it
//! in its tree. Coordinates are written only through [`BoundsUpdate`]
//! batches and slugs only through [`SlugUpdate`] batches.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable node identifier, assigned by the store on insert.
pub type NodeId = i64;

/// Partition key of one independent tree.
pub type TreeId = i64;

/// Publication status of a page.
///
/// Ordered: `Draft < Archive < Published < InNavigation`. Thresholds are
/// compared with `>=`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    /// Work in progress, never public.
    #[default]
    Draft,
    /// Retired page, kept for reference.
    Archive,
    /// Publicly reachable by URL.
    Published,
    /// Published and listed in the site navigation.
    InNavigation,
}

impl PageStatus {
    /// Minimum status for a page to be publicly reachable.
    pub const ACTIVE: Self = Self::Published;
    /// Minimum status for a page to appear in navigation.
    pub const NAVIGATION: Self = Self::InNavigation;

    /// Ordinal value as persisted.
    #[must_use]
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Draft => 0,
            Self::Archive => 1,
            Self::Published => 2,
            Self::InNavigation => 3,
        }
    }

    /// Status from its persisted ordinal.
    #[must_use]
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Draft),
            1 => Some(Self::Archive),
            2 => Some(Self::Published),
            3 => Some(Self::InNavigation),
            _ => None,
        }
    }

    /// Human-readable label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::Archive => "Archive",
            Self::Published => "Published",
            Self::InNavigation => "In Navigation",
        }
    }
}

impl fmt::Display for PageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error returned when a status string is not recognized.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown page status: {0}")]
pub struct ParseStatusError(String);

impl FromStr for PageStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "draft" | "0" => Ok(Self::Draft),
            "archive" | "1" => Ok(Self::Archive),
            "published" | "2" => Ok(Self::Published),
            "in_navigation" | "3" => Ok(Self::InNavigation),
            _ => Err(ParseStatusError(s.to_owned())),
        }
    }
}

/// A page with its nested-set coordinates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageNode {
    /// Stable identifier.
    pub id: NodeId,
    /// Parent node, `None` for a root.
    pub parent_id: Option<NodeId>,
    /// Tree this node belongs to.
    pub tree_id: TreeId,
    /// Left bound.
    pub lft: i64,
    /// Right bound.
    pub rgt: i64,
    /// Distance from the root (root is 0).
    pub depth: i64,
    /// Page title.
    pub title: String,
    /// Page content (raw HTML).
    pub body: String,
    /// Publication status.
    pub status: PageStatus,
    /// Template identifier used to render the page.
    pub template: String,
    /// Whether comments are enabled.
    pub comments_enabled: bool,
    /// Whether only authenticated users may view the page.
    pub login_required: bool,
    /// Explicit URL in the format `/path/to/page/`.
    pub slug_override: Option<String>,
    /// Path derived from the ancestor title chain.
    pub slug: String,
    /// Creation time, never changes.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl PageNode {
    /// Effective URL: the override when set, the derived slug otherwise.
    #[must_use]
    pub fn url(&self) -> &str {
        self.slug_override
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.slug)
    }

    /// Number of bound positions the subtree occupies (`rgt - lft + 1`).
    #[must_use]
    pub fn width(&self) -> i64 {
        self.rgt - self.lft + 1
    }

    /// True if the node has no descendants.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.rgt == self.lft + 1
    }

    /// True if `other` lies strictly inside this node's range.
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        self.tree_id == other.tree_id && self.lft < other.lft && other.rgt < self.rgt
    }

    /// Current structural coordinates as an update record.
    #[must_use]
    pub fn bounds(&self) -> BoundsUpdate {
        BoundsUpdate {
            id: self.id,
            parent_id: self.parent_id,
            tree_id: self.tree_id,
            lft: self.lft,
            rgt: self.rgt,
            depth: self.depth,
        }
    }

    /// Apply new structural coordinates in place.
    pub fn apply_bounds(&mut self, update: &BoundsUpdate) {
        self.parent_id = update.parent_id;
        self.tree_id = update.tree_id;
        self.lft = update.lft;
        self.rgt = update.rgt;
        self.depth = update.depth;
    }

    /// Apply new content fields in place.
    pub fn apply_content(&mut self, content: &PageContent) {
        self.title.clone_from(&content.title);
        self.body.clone_from(&content.body);
        self.status = content.status;
        self.template.clone_from(&content.template);
        self.comments_enabled = content.comments_enabled;
        self.login_required = content.login_required;
        self.slug_override.clone_from(&content.slug_override);
    }

    /// Content fields of this node.
    #[must_use]
    pub fn content(&self) -> PageContent {
        PageContent {
            title: self.title.clone(),
            body: self.body.clone(),
            status: self.status,
            template: self.template.clone(),
            comments_enabled: self.comments_enabled,
            login_required: self.login_required,
            slug_override: self.slug_override.clone(),
        }
    }
}

/// Editable content fields of a page.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageContent {
    /// Page title.
    pub title: String,
    /// Page content.
    pub body: String,
    /// Publication status.
    pub status: PageStatus,
    /// Template identifier.
    pub template: String,
    /// Whether comments are enabled.
    pub comments_enabled: bool,
    /// Whether login is required.
    pub login_required: bool,
    /// Explicit URL override.
    pub slug_override: Option<String>,
}

/// Structural coordinates for one node.
///
/// Applied in batches: a batch rewrites every listed row or none.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundsUpdate {
    /// Node to rewrite.
    pub id: NodeId,
    /// New parent.
    pub parent_id: Option<NodeId>,
    /// New tree.
    pub tree_id: TreeId,
    /// New left bound.
    pub lft: i64,
    /// New right bound.
    pub rgt: i64,
    /// New depth.
    pub depth: i64,
}

/// New derived slug for one node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlugUpdate {
    /// Node to rewrite.
    pub id: NodeId,
    /// New slug.
    pub slug: String,
}

/// A node to insert, with precomputed coordinates and slug.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeDraft {
    /// Parent node, `None` for a root.
    pub parent_id: Option<NodeId>,
    /// Tree the node is inserted into.
    pub tree_id: TreeId,
    /// Left bound.
    pub lft: i64,
    /// Right bound.
    pub rgt: i64,
    /// Depth.
    pub depth: i64,
    /// Derived slug.
    pub slug: String,
    /// Page content.
    pub content: PageContent,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: NodeId, tree_id: TreeId, lft: i64, rgt: i64) -> PageNode {
        let now = Utc::now();
        PageNode {
            id,
            parent_id: None,
            tree_id,
            lft,
            rgt,
            depth: 0,
            title: format!("Page {id}"),
            body: String::new(),
            status: PageStatus::Draft,
            template: String::new(),
            comments_enabled: false,
            login_required: false,
            slug_override: None,
            slug: format!("/page-{id}/"),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_status_ordering() {
        assert!(PageStatus::Draft < PageStatus::Archive);
        assert!(PageStatus::Archive < PageStatus::Published);
        assert!(PageStatus::Published < PageStatus::InNavigation);
        assert!(PageStatus::InNavigation >= PageStatus::ACTIVE);
        assert!(PageStatus::Archive < PageStatus::ACTIVE);
    }

    #[test]
    fn test_status_ordinal_roundtrip() {
        for status in [
            PageStatus::Draft,
            PageStatus::Archive,
            PageStatus::Published,
            PageStatus::InNavigation,
        ] {
            assert_eq!(PageStatus::from_i64(status.as_i64()), Some(status));
        }
        assert_eq!(PageStatus::from_i64(7), None);
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!("draft".parse(), Ok(PageStatus::Draft));
        assert_eq!("In Navigation".parse(), Ok(PageStatus::InNavigation));
        assert_eq!("in-navigation".parse(), Ok(PageStatus::InNavigation));
        assert_eq!("2".parse(), Ok(PageStatus::Published));
        assert!("hidden".parse::<PageStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&PageStatus::InNavigation).unwrap();
        assert_eq!(json, "\"in_navigation\"");
    }

    #[test]
    fn test_url_prefers_override() {
        let mut page = node(1, 1, 1, 2);
        assert_eq!(page.url(), "/page-1/");

        page.slug_override = Some("/custom/".to_owned());
        assert_eq!(page.url(), "/custom/");

        page.slug_override = Some(String::new());
        assert_eq!(page.url(), "/page-1/");
    }

    #[test]
    fn test_contains_requires_same_tree() {
        let parent = node(1, 1, 1, 6);
        let child = node(2, 1, 2, 3);
        let other_tree = node(3, 2, 2, 3);

        assert!(parent.contains(&child));
        assert!(!child.contains(&parent));
        assert!(!parent.contains(&other_tree));
    }

    #[test]
    fn test_width_and_leaf() {
        assert_eq!(node(1, 1, 1, 6).width(), 6);
        assert!(node(1, 1, 2, 3).is_leaf());
        assert!(!node(1, 1, 1, 6).is_leaf());
    }

    #[test]
    fn test_apply_bounds() {
        let mut page = node(5, 1, 2, 3);
        page.apply_bounds(&BoundsUpdate {
            id: 5,
            parent_id: Some(9),
            tree_id: 2,
            lft: 4,
            rgt: 5,
            depth: 2,
        });

        assert_eq!(page.parent_id, Some(9));
        assert_eq!(page.tree_id, 2);
        assert_eq!((page.lft, page.rgt, page.depth), (4, 5, 2));
    }
}
