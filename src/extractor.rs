//! Pulls stylesheets, scripts, asset references and page metadata out of a
//! parsed document.
//!
//! Scanning is synchronous and only borrows the parsed tree. External
//! stylesheets and scripts come back from the scan as [`ExternalRef`]s and
//! are fetched afterwards by [`fetch_stylesheets`] / [`fetch_scripts`], so
//! the (non-`Send`) document never lives across an await point.

use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use url::Url;

use crate::fetcher::Fetcher;
use crate::models::{Asset, AssetKind, CssFile, JsFile, ParseOptions, Source, WebsiteMetadata};

/// Upper bound on asset references collected from one page.
pub const ASSET_SCAN_LIMIT: usize = 1000;

const DEFAULT_MEDIA: &str = "all";
const DEFAULT_SCRIPT_TYPE: &str = "text/javascript";

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector must parse")
}

pub(crate) static STYLE_SELECTOR: Lazy<Selector> = Lazy::new(|| selector("style"));
pub(crate) static STYLESHEET_LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| selector(r#"link[rel~="stylesheet"]"#));
pub(crate) static SCRIPT_SELECTOR: Lazy<Selector> = Lazy::new(|| selector("script"));
static IMG_SELECTOR: Lazy<Selector> = Lazy::new(|| selector("img[src]"));
static LINK_HREF_SELECTOR: Lazy<Selector> = Lazy::new(|| selector("link[href]"));
static TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| selector("title"));
static META_SELECTOR: Lazy<Selector> = Lazy::new(|| selector("meta"));
static HTML_SELECTOR: Lazy<Selector> = Lazy::new(|| selector("html"));

static CSS_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid regex"));
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// A stylesheet or script referenced by URL, waiting to be fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalRef {
    pub url: Url,
    /// `media` for stylesheets, `type` for scripts.
    pub attr: String,
}

/// Everything a synchronous pass over the document yields.
#[derive(Debug, Default)]
pub struct PageScan {
    pub inline_css: Vec<CssFile>,
    pub inline_js: Vec<JsFile>,
    pub stylesheet_refs: Vec<ExternalRef>,
    pub script_refs: Vec<ExternalRef>,
    pub assets: Vec<Asset>,
    pub metadata: WebsiteMetadata,
    pub favicon: Option<String>,
}

pub fn scan(document: &Html, base: &Url, options: &ParseOptions) -> PageScan {
    let mut scan = PageScan {
        metadata: extract_metadata(document),
        favicon: extract_favicon(document, base),
        ..PageScan::default()
    };

    if options.include_inline_styles {
        scan.inline_css = extract_inline_styles(document);
    }
    if options.include_inline_scripts {
        scan.inline_js = extract_inline_scripts(document);
    }
    if options.include_external_assets {
        scan.stylesheet_refs = collect_refs(document, &STYLESHEET_LINK_SELECTOR, "href", "media", DEFAULT_MEDIA, base);
        scan.script_refs = collect_refs(document, &SCRIPT_SELECTOR, "src", "type", DEFAULT_SCRIPT_TYPE, base);
        scan.assets = extract_assets(document, base);
    }

    scan
}

fn extract_inline_styles(document: &Html) -> Vec<CssFile> {
    document
        .select(&STYLE_SELECTOR)
        .enumerate()
        .map(|(index, element)| {
            let n = index + 1;
            CssFile {
                id: format!("inline-style-{}", n),
                name: format!("inline-style-{}.css", n),
                content: clean_css(&element.text().collect::<String>()),
                source: Source::Inline,
                url: None,
                media: Some(attr_or(&element, "media", DEFAULT_MEDIA)),
            }
        })
        .collect()
}

fn extract_inline_scripts(document: &Html) -> Vec<JsFile> {
    let mut scripts = Vec::new();
    for element in document.select(&SCRIPT_SELECTOR) {
        if element.value().attr("src").is_some() {
            continue;
        }
        let content = element.text().collect::<String>();
        if content.trim().is_empty() {
            continue;
        }
        let n = scripts.len() + 1;
        scripts.push(JsFile {
            id: format!("inline-script-{}", n),
            name: format!("inline-script-{}.js", n),
            content: clean_js(&content),
            source: Source::Inline,
            url: None,
            script_type: Some(attr_or(&element, "type", DEFAULT_SCRIPT_TYPE)),
        });
    }
    scripts
}

fn collect_refs(
    document: &Html,
    selector: &Selector,
    url_attr: &str,
    extra_attr: &str,
    extra_default: &str,
    base: &Url,
) -> Vec<ExternalRef> {
    document
        .select(selector)
        .filter_map(|element| {
            let raw = element.value().attr(url_attr)?.trim();
            if raw.is_empty() {
                return None;
            }
            match base.join(raw) {
                Ok(url) => Some(ExternalRef {
                    url,
                    attr: attr_or(&element, extra_attr, extra_default),
                }),
                Err(e) => {
                    warn!(reference = raw, error = %e, "skipping unresolvable reference");
                    None
                }
            }
        })
        .collect()
}

fn extract_assets(document: &Html, base: &Url) -> Vec<Asset> {
    let mut assets: Vec<Asset> = Vec::new();

    for element in document.select(&IMG_SELECTOR) {
        let Some(src) = element.value().attr("src").map(str::trim) else {
            continue;
        };
        if src.is_empty() || src.starts_with("data:") {
            continue;
        }
        push_asset(&mut assets, base, src, AssetKind::Image);
    }

    for element in document.select(&LINK_HREF_SELECTOR) {
        let href = element.value().attr("href").unwrap_or_default().trim();
        let rel = element.value().attr("rel").unwrap_or_default().trim().to_ascii_lowercase();
        let lower_href = href.to_ascii_lowercase();
        let is_font_like = rel == "preload"
            || rel == "font"
            || lower_href.contains(".woff")
            || lower_href.contains(".ttf");
        if href.is_empty() || !is_font_like {
            continue;
        }
        push_asset(&mut assets, base, href, AssetKind::Font);
    }

    assets
}

fn push_asset(assets: &mut Vec<Asset>, base: &Url, reference: &str, context: AssetKind) {
    if assets.len() >= ASSET_SCAN_LIMIT {
        return;
    }
    let url = match base.join(reference) {
        Ok(url) => url,
        Err(e) => {
            warn!(reference, error = %e, "invalid asset URL");
            return;
        }
    };

    let n = assets.len() + 1;
    let fallback = match context {
        AssetKind::Image => format!("image-{}", n),
        _ => format!("font-{}", n),
    };
    let name = filename_from_url(&url).unwrap_or(fallback);

    let guessed = mime_guess::from_path(&name).first().map(|m| m.essence_str().to_string());
    let kind = guessed.as_deref().map(kind_for_mime).unwrap_or(context);
    let mime_type = guessed.unwrap_or_else(|| match context {
        AssetKind::Image => "image/*".to_string(),
        _ => "font/*".to_string(),
    });

    assets.push(Asset {
        id: format!("asset-{}", n),
        kind: if kind == AssetKind::Other { context } else { kind },
        original_url: url.to_string(),
        local_url: None,
        name,
        size: None,
        mime_type: Some(mime_type),
    });
}

fn kind_for_mime(mime: &str) -> AssetKind {
    match mime.split('/').next().unwrap_or_default() {
        "image" => AssetKind::Image,
        "font" => AssetKind::Font,
        "video" => AssetKind::Video,
        "audio" => AssetKind::Audio,
        _ if mime.contains("font") => AssetKind::Font,
        _ => AssetKind::Other,
    }
}

pub fn extract_metadata(document: &Html) -> WebsiteMetadata {
    let title = document
        .select(&TITLE_SELECTOR)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .or_else(|| meta_content(document, "property", "og:title"))
        .unwrap_or_else(|| "Untitled".to_string());

    let charset = document
        .select(&META_SELECTOR)
        .find_map(|m| non_empty(m.value().attr("charset")))
        .or_else(|| {
            meta_content(document, "http-equiv", "content-type").and_then(|content| {
                let lower = content.to_ascii_lowercase();
                let at = lower.find("charset=")?;
                non_empty(Some(content[at + "charset=".len()..].trim()))
            })
        })
        .unwrap_or_else(|| "UTF-8".to_string());

    let language = document
        .select(&HTML_SELECTOR)
        .next()
        .and_then(|h| non_empty(h.value().attr("lang")))
        .or_else(|| meta_content(document, "http-equiv", "content-language"));

    WebsiteMetadata {
        title,
        description: meta_content(document, "name", "description")
            .or_else(|| meta_content(document, "property", "og:description")),
        viewport: meta_content(document, "name", "viewport"),
        charset,
        language,
        author: meta_content(document, "name", "author"),
        canonical: link_href(document, "canonical"),
    }
}

pub fn extract_favicon(document: &Html, base: &Url) -> Option<String> {
    ["icon", "shortcut icon", "apple-touch-icon"]
        .iter()
        .find_map(|rel| link_href(document, rel))
        .and_then(|href| base.join(&href).ok())
        .map(|url| url.to_string())
}

/// `content` of the first `<meta>` whose `key` attribute equals `value`, case-insensitively.
fn meta_content(document: &Html, key: &str, value: &str) -> Option<String> {
    document
        .select(&META_SELECTOR)
        .filter(|m| {
            m.value()
                .attr(key)
                .is_some_and(|v| v.trim().eq_ignore_ascii_case(value))
        })
        .find_map(|m| non_empty(m.value().attr("content")))
}

fn link_href(document: &Html, rel: &str) -> Option<String> {
    document
        .select(&LINK_HREF_SELECTOR)
        .filter(|l| {
            l.value()
                .attr("rel")
                .is_some_and(|r| r.trim().eq_ignore_ascii_case(rel))
        })
        .find_map(|l| non_empty(l.value().attr("href")))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

fn attr_or(element: &ElementRef, name: &str, default: &str) -> String {
    non_empty(element.value().attr(name)).unwrap_or_else(|| default.to_string())
}

/// Strips comments and collapses whitespace.
pub fn clean_css(css: &str) -> String {
    let without_comments = CSS_COMMENT.replace_all(css, "");
    WHITESPACE_RUN.replace_all(&without_comments, " ").trim().to_string()
}

pub fn clean_js(js: &str) -> String {
    js.trim().to_string()
}

/// Last non-empty path segment of `url`.
pub fn filename_from_url(url: &Url) -> Option<String> {
    url.path_segments()?
        .next_back()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// Fetches every stylesheet concurrently. Failed fetches are logged and left out.
pub async fn fetch_stylesheets(fetcher: &Fetcher, refs: &[ExternalRef]) -> Vec<(ExternalRef, String)> {
    settle_all(fetcher, refs, "stylesheet").await
}

pub async fn fetch_scripts(fetcher: &Fetcher, refs: &[ExternalRef]) -> Vec<(ExternalRef, String)> {
    settle_all(fetcher, refs, "script").await
}

async fn settle_all(fetcher: &Fetcher, refs: &[ExternalRef], kind: &str) -> Vec<(ExternalRef, String)> {
    let results = join_all(refs.iter().map(|r| async move { (r, fetcher.fetch(&r.url).await) })).await;

    results
        .into_iter()
        .filter_map(|(reference, result)| match result {
            Ok(fetched) => {
                debug!(url = %reference.url, bytes = fetched.body.len(), "fetched external {}", kind);
                Some((reference.clone(), fetched.body))
            }
            Err(e) => {
                warn!(url = %reference.url, error = %e, "failed to fetch external {}", kind);
                None
            }
        })
        .collect()
}

/// Appends fetched stylesheets after the inline ones, numbering by final list position.
pub fn append_external_css(css: &mut Vec<CssFile>, fetched: Vec<(ExternalRef, String)>) {
    for (reference, body) in fetched {
        let n = css.len() + 1;
        css.push(CssFile {
            id: format!("external-css-{}", n),
            name: filename_from_url(&reference.url).unwrap_or_else(|| format!("external-{}.css", n)),
            content: clean_css(&body),
            source: Source::External,
            url: Some(reference.url.to_string()),
            media: Some(reference.attr),
        });
    }
}

pub fn append_external_js(js: &mut Vec<JsFile>, fetched: Vec<(ExternalRef, String)>) {
    for (reference, body) in fetched {
        let n = js.len() + 1;
        js.push(JsFile {
            id: format!("external-js-{}", n),
            name: filename_from_url(&reference.url).unwrap_or_else(|| format!("external-{}.js", n)),
            content: clean_js(&body),
            source: Source::External,
            url: Some(reference.url.to_string()),
            script_type: Some(reference.attr),
        });
    }
}
