//! Row decoding for the `pages` table.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use sqlx::FromRow;
use tp_store::{PageNode, PageStatus, StoreError, StoreErrorKind};

use crate::BACKEND;

/// Columns selected for a full node, in table order.
pub(crate) const COLUMNS: &str = "id, parent_id, tree_id, lft, rgt, depth, title, body, status, \
     template, comments_enabled, login_required, slug_override, slug, created_at, updated_at";

/// A value in the table that does not map onto [`PageNode`].
#[derive(Debug, thiserror::Error)]
pub(crate) enum DecodeError {
    #[error("invalid status ordinal {0}")]
    Status(i64),
    #[error("invalid timestamp {value:?}: {source}")]
    Timestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// One row of `pages` as stored.
#[derive(Debug, FromRow)]
pub(crate) struct PageRow {
    id: i64,
    parent_id: Option<i64>,
    tree_id: i64,
    lft: i64,
    rgt: i64,
    depth: i64,
    title: String,
    body: String,
    status: i64,
    template: String,
    comments_enabled: bool,
    login_required: bool,
    slug_override: Option<String>,
    slug: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<PageRow> for PageNode {
    type Error = StoreError;

    fn try_from(row: PageRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let invalid = move |e: DecodeError| {
            StoreError::new(StoreErrorKind::InvalidData)
                .with_backend(BACKEND)
                .with_node(id)
                .with_source(e)
        };

        let status = PageStatus::from_i64(row.status)
            .ok_or_else(|| invalid(DecodeError::Status(row.status)))?;
        let created_at = parse_timestamp(&row.created_at).map_err(invalid)?;
        let updated_at = parse_timestamp(&row.updated_at).map_err(invalid)?;

        Ok(PageNode {
            id: row.id,
            parent_id: row.parent_id,
            tree_id: row.tree_id,
            lft: row.lft,
            rgt: row.rgt,
            depth: row.depth,
            title: row.title,
            body: row.body,
            status,
            template: row.template,
            comments_enabled: row.comments_enabled,
            login_required: row.login_required,
            slug_override: row.slug_override,
            slug: row.slug,
            created_at,
            updated_at,
        })
    }
}

/// Current time at the precision the table keeps.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, DecodeError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|source| DecodeError::Timestamp {
            value: value.to_owned(),
            source,
        })
}
