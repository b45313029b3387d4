//! Zip export of edited content.
//!
//! Everything in the archive is derived from the supplied content and the
//! export timestamp, so identical inputs give byte-identical archives.

use chrono::{DateTime, SecondsFormat, Utc};
use scraper::Html;
use serde::Serialize;
use std::io::{Cursor, Write};
use url::Url;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime as ZipDateTime, ZipWriter};

use crate::error::{AppError, Result};
use crate::models::{Asset, AssetKind, CssFile, JsFile, WebsiteContent, WebsiteMetadata};
use crate::normalizer::extract_body;

const GENERATOR: &str = "Web Cloner";

/// Builds the zip archive for `content`.
pub fn build_archive(content: &WebsiteContent, include_assets: bool, exported_at: DateTime<Utc>) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    zip.start_file("index.html", entry_options())?;
    zip.write_all(render_index_html(content).as_bytes())?;

    for (index, file) in content.css.iter().enumerate() {
        zip.start_file(format!("css/{}", css_filename(file, index)), entry_options())?;
        zip.write_all(file.content.as_bytes())?;
    }

    for (index, file) in content.js.iter().enumerate() {
        zip.start_file(format!("js/{}", js_filename(file, index)), entry_options())?;
        zip.write_all(file.content.as_bytes())?;
    }

    if include_assets && !content.assets.is_empty() {
        zip.start_file("assets/assets-manifest.json", entry_options())?;
        zip.write_all(render_asset_manifest(&content.assets)?.as_bytes())?;

        zip.start_file("assets/README.md", entry_options())?;
        zip.write_all(render_assets_readme(&content.assets).as_bytes())?;
    }

    zip.start_file("metadata.json", entry_options())?;
    zip.write_all(render_metadata_json(content, exported_at)?.as_bytes())?;

    zip.start_file("README.md", entry_options())?;
    zip.write_all(render_readme(content, exported_at).as_bytes())?;

    Ok(zip.finish()?.into_inner())
}

/// Level-9 deflate with the zip epoch as timestamp.
fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(9))
        .last_modified_time(ZipDateTime::default())
}

/// `website-<host>-<YYYY-MM-DD>.zip`, with non-alphanumerics in the host as `-`.
pub fn archive_filename(content: &WebsiteContent, exported_at: DateTime<Utc>) -> String {
    let host = Url::parse(&content.url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_else(|| "site".to_string());
    let domain: String = host
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    format!("website-{}-{}.zip", domain, exported_at.format("%Y-%m-%d"))
}

fn css_filename(file: &CssFile, index: usize) -> String {
    if file.name.is_empty() { format!("style-{}.css", index + 1) } else { file.name.clone() }
}

fn js_filename(file: &JsFile, index: usize) -> String {
    if file.name.is_empty() { format!("script-{}.js", index + 1) } else { file.name.clone() }
}

fn non_default<'a>(value: Option<&'a str>, default: &str) -> Option<&'a str> {
    value.filter(|v| !v.is_empty() && *v != default)
}

pub fn render_index_html(content: &WebsiteContent) -> String {
    let meta = &content.metadata;

    let css_links = content
        .css
        .iter()
        .enumerate()
        .map(|(index, file)| {
            let media = non_default(file.media.as_deref(), "all")
                .map(|m| format!(r#" media="{}""#, escape_html(m)))
                .unwrap_or_default();
            format!(r#"  <link rel="stylesheet" href="css/{}"{}>"#, escape_html(&css_filename(file, index)), media)
        })
        .collect::<Vec<_>>()
        .join("\n");

    let js_scripts = content
        .js
        .iter()
        .enumerate()
        .map(|(index, file)| {
            let script_type = non_default(file.script_type.as_deref(), "text/javascript")
                .map(|t| format!(r#" type="{}""#, escape_html(t)))
                .unwrap_or_default();
            format!(r#"  <script src="js/{}"{}></script>"#, escape_html(&js_filename(file, index)), script_type)
        })
        .collect::<Vec<_>>()
        .join("\n");

    let body = if content.html.to_ascii_lowercase().contains("<body") {
        extract_body(&Html::parse_document(&content.html)).unwrap_or_default()
    } else {
        content.html.clone()
    };

    let mut head = Vec::new();
    head.push(format!(r#"  <meta charset="{}">"#, escape_html(non_empty_or(&meta.charset, "UTF-8"))));
    head.push(format!(
        r#"  <meta name="viewport" content="{}">"#,
        escape_html(meta.viewport.as_deref().unwrap_or("width=device-width, initial-scale=1.0"))
    ));
    head.push(format!("  <title>{}</title>", escape_html(&content.title)));
    if let Some(description) = meta.description.as_deref().filter(|d| !d.is_empty()) {
        head.push(format!(r#"  <meta name="description" content="{}">"#, escape_html(description)));
    }
    if let Some(author) = meta.author.as_deref().filter(|a| !a.is_empty()) {
        head.push(format!(r#"  <meta name="author" content="{}">"#, escape_html(author)));
    }
    if let Some(favicon) = content.favicon.as_deref() {
        head.push(format!(r#"  <link rel="icon" href="{}">"#, escape_html(favicon)));
    }
    head.push(format!(r#"  <meta name="generator" content="{}">"#, GENERATOR));
    head.push(format!(r#"  <meta name="original-url" content="{}">"#, escape_html(&content.url)));

    format!(
        "<!DOCTYPE html>\n<html lang=\"{lang}\">\n<head>\n{head}\n\n{css}\n</head>\n<body>\n{body}\n\n{js}\n</body>\n</html>\n",
        lang = escape_html(meta.language.as_deref().filter(|l| !l.is_empty()).unwrap_or("en")),
        head = head.join("\n"),
        css = css_links,
        body = body,
        js = js_scripts,
    )
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn non_empty_or<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.is_empty() { default } else { value }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ManifestEntry<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    kind: AssetKind,
    original_url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    mime_type: Option<&'a str>,
}

fn render_asset_manifest(assets: &[Asset]) -> Result<String> {
    let entries: Vec<ManifestEntry> = assets
        .iter()
        .map(|asset| ManifestEntry {
            name: &asset.name,
            kind: asset.kind,
            original_url: &asset.original_url,
            mime_type: asset.mime_type.as_deref(),
        })
        .collect();
    serde_json::to_string_pretty(&entries).map_err(|e| AppError::Export(e.to_string()))
}

fn render_assets_readme(assets: &[Asset]) -> String {
    let count = |kind: AssetKind| assets.iter().filter(|a| a.kind == kind).count();
    let images = count(AssetKind::Image);
    let fonts = count(AssetKind::Font);
    format!(
        "# Assets\n\n\
         This folder contains the asset manifest for the website.\n\
         Original assets can be downloaded from the URLs listed in assets-manifest.json\n\n\
         ## Asset Types\n\
         - Images: {}\n\
         - Fonts: {}\n\
         - Other: {}\n",
        images,
        fonts,
        assets.len() - images - fonts,
    )
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportMetadata<'a> {
    original_url: &'a str,
    title: &'a str,
    exported_at: String,
    metadata: &'a WebsiteMetadata,
}

fn render_metadata_json(content: &WebsiteContent, exported_at: DateTime<Utc>) -> Result<String> {
    let metadata = ExportMetadata {
        original_url: &content.url,
        title: &content.title,
        exported_at: exported_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        metadata: &content.metadata,
    };
    serde_json::to_string_pretty(&metadata).map_err(|e| AppError::Export(e.to_string()))
}

fn render_readme(content: &WebsiteContent, exported_at: DateTime<Utc>) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {}\n\n", content.title));
    out.push_str(&format!("This website was exported from **{}** using {}.\n\n", content.url, GENERATOR));
    out.push_str("## Export Information\n\n");
    out.push_str(&format!("- **Original URL**: {}\n", content.url));
    out.push_str(&format!("- **Exported**: {}\n", exported_at.format("%Y-%m-%d %H:%M:%S UTC")));
    out.push_str(&format!("- **Title**: {}\n", content.title));
    if let Some(description) = content.metadata.description.as_deref().filter(|d| !d.is_empty()) {
        out.push_str(&format!("- **Description**: {}\n", description));
    }

    out.push_str(
        "\n## File Structure\n\n\
         - `index.html` - Main HTML file\n\
         - `css/` - Stylesheet files\n\
         - `js/` - JavaScript files\n\
         - `assets/` - Images, fonts, and other resources (if included)\n\
         - `metadata.json` - Website metadata and export information\n",
    );

    out.push_str(&format!("\n## CSS Files ({})\n\n", content.css.len()));
    for (index, file) in content.css.iter().enumerate() {
        let media = non_default(file.media.as_deref(), "all").map(|m| format!(" ({})", m)).unwrap_or_default();
        out.push_str(&format!(
            "- `{}` - {} stylesheet{}\n",
            css_filename(file, index),
            source_label(file.source),
            media
        ));
    }

    out.push_str(&format!("\n## JavaScript Files ({})\n\n", content.js.len()));
    for (index, file) in content.js.iter().enumerate() {
        let script_type = non_default(file.script_type.as_deref(), "text/javascript")
            .map(|t| format!(" ({})", t))
            .unwrap_or_default();
        out.push_str(&format!(
            "- `{}` - {} script{}\n",
            js_filename(file, index),
            source_label(file.source),
            script_type
        ));
    }

    if !content.assets.is_empty() {
        out.push_str(&format!("\n## Assets ({})\n\n", content.assets.len()));
        for asset in &content.assets {
            out.push_str(&format!("- `{}` - {} ({})\n", asset.name, asset.kind.as_str(), asset.original_url));
        }
    }

    out.push_str(
        "\n## Usage\n\n\
         1. Open `index.html` in a web browser\n\
         2. Ensure all files remain in their respective folders\n\
         3. For full functionality, serve from a web server rather than opening directly in browser\n\n\
         ## Notes\n\n\
         - This export contains the website as it was at the time of capture\n\
         - External resources may need to be downloaded separately\n\
         - Some functionality may require a web server environment\n",
    );
    out
}

fn source_label(source: crate::models::Source) -> &'static str {
    match source {
        crate::models::Source::Inline => "inline",
        crate::models::Source::External => "external",
    }
}
