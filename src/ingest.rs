use chrono::Utc;
use scraper::Html;
use std::time::Instant;
use tracing::info;
use url::Url;

use crate::error::{AppError, Result};
use crate::extractor::{self, PageScan};
use crate::fetcher::Fetcher;
use crate::models::{ParseOptions, WebsiteContent};
use crate::normalizer;

/// Fetches `url` and turns it into a self-contained [`WebsiteContent`].
///
/// The main document fetch failing fails the whole ingestion. External
/// stylesheets and scripts are fetched concurrently afterwards and any of
/// them may fail without affecting the result beyond its own absence.
pub async fn ingest_website(fetcher: &Fetcher, url: &Url, options: &ParseOptions) -> Result<WebsiteContent> {
    let start = Instant::now();
    info!(%url, "fetching main document");
    let page = fetcher.fetch(url).await?;
    info!(%url, bytes = page.body.len(), elapsed = ?start.elapsed(), "main document fetched");

    // The parsed tree is not Send, so it must be gone before the next await.
    let (scan, html) = {
        let mut document = Html::parse_document(&page.body);
        let scan = extractor::scan(&document, url, options);
        let html = normalizer::normalize(&mut document, options);
        (scan, html)
    };

    let PageScan {
        mut inline_css,
        mut inline_js,
        stylesheet_refs,
        script_refs,
        assets,
        metadata,
        favicon,
    } = scan;

    let (stylesheets, scripts) = tokio::join!(
        extractor::fetch_stylesheets(fetcher, &stylesheet_refs),
        extractor::fetch_scripts(fetcher, &script_refs),
    );
    info!(
        %url,
        stylesheets = stylesheets.len(),
        stylesheet_refs = stylesheet_refs.len(),
        scripts = scripts.len(),
        script_refs = script_refs.len(),
        "external resources settled"
    );

    extractor::append_external_css(&mut inline_css, stylesheets);
    extractor::append_external_js(&mut inline_js, scripts);

    let content = WebsiteContent {
        url: url.to_string(),
        title: metadata.title.clone(),
        favicon,
        html,
        css: inline_css,
        js: inline_js,
        assets,
        metadata,
        parsed_at: Utc::now(),
    };

    info!(
        title = %content.title,
        html_len = content.html.len(),
        css = content.css.len(),
        js = content.js.len(),
        assets = content.assets.len(),
        elapsed = ?start.elapsed(),
        "website parsed"
    );
    Ok(content)
}

/// [`ingest_website`] under an optional overall deadline.
pub async fn ingest_with_deadline(
    fetcher: &Fetcher,
    url: &Url,
    options: &ParseOptions,
    deadline: Option<std::time::Duration>,
) -> Result<WebsiteContent> {
    match deadline {
        None => ingest_website(fetcher, url, options).await,
        Some(limit) => tokio::time::timeout(limit, ingest_website(fetcher, url, options))
            .await
            .map_err(|_| AppError::Timeout)?,
    }
}
