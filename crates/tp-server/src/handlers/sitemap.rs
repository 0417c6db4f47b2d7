//! `sitemap.xml` endpoint.

use std::fmt::Write;
use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;

use crate::error::ServerError;
use crate::state::AppState;

/// Handle GET /sitemap.xml.
///
/// Lists published pages that need no login.
pub(crate) async fn get_sitemap(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ServerError> {
    let pages = state.service.sitemap().await?;
    let base = state.config.base_url.trim_end_matches('/');

    let mut xml = String::from(concat!(
        r#"<?xml version="1.0" encoding="UTF-8"?>"#,
        "\n",
        r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">"#,
        "\n",
    ));
    for page in &pages {
        let loc = format!("{base}{}", page.url());
        let _ = writeln!(
            xml,
            "  <url><loc>{}</loc><lastmod>{}</lastmod></url>",
            html_escape::encode_text(&loc),
            page.updated_at.format("%Y-%m-%d"),
        );
    }
    xml.push_str("</urlset>\n");

    Ok(([(header::CONTENT_TYPE, "application/xml")], xml))
}
