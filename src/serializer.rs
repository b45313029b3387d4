//! Bounded, JSON-safe rendering of ingested content for the API boundary.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use std::borrow::Cow;
use tracing::error;

use crate::error::{AppError, Result};
use crate::models::{Asset, CssFile, JsFile, WebsiteContent};

pub const HTML_CHAR_LIMIT: usize = 2_000_000;
pub const FILE_CHAR_LIMIT: usize = 500_000;
pub const ASSET_LIMIT: usize = 100;
pub const TRUNCATION_MARKER: &str = "... [TRUNCATED]";
pub const CIRCULAR_PLACEHOLDER: &str = "[Circular Reference]";
/// Containers nested deeper than this are replaced by [`CIRCULAR_PLACEHOLDER`].
pub const MAX_DEPTH: usize = 64;

/// Wire form of [`WebsiteContent`]: truncated, with string timestamps and
/// metadata strings always present.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedContent {
    pub url: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
    pub html: String,
    pub css: Vec<CssFile>,
    pub js: Vec<JsFile>,
    pub assets: Vec<Asset>,
    #[serde(skip_serializing_if = "is_zero")]
    pub assets_omitted: usize,
    pub metadata: SerializedMetadata,
    pub parsed_at: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedMetadata {
    pub title: String,
    pub description: String,
    pub viewport: String,
    pub charset: String,
    pub language: String,
    pub author: String,
    pub canonical: String,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

/// Cuts `content` to `max_chars` characters and appends [`TRUNCATION_MARKER`].
///
/// Content that already carries the marker within the cap is returned as is.
pub fn truncate_content(content: &str, max_chars: usize) -> Cow<'_, str> {
    if let Some(head) = content.strip_suffix(TRUNCATION_MARKER) {
        if head.chars().nth(max_chars).is_none() {
            return Cow::Borrowed(content);
        }
    }
    match content.char_indices().nth(max_chars) {
        None => Cow::Borrowed(content),
        Some((cut, _)) => {
            let mut truncated = String::with_capacity(cut + TRUNCATION_MARKER.len());
            truncated.push_str(&content[..cut]);
            truncated.push_str(TRUNCATION_MARKER);
            Cow::Owned(truncated)
        }
    }
}

pub fn prepare(content: &WebsiteContent) -> SerializedContent {
    let css = content
        .css
        .iter()
        .map(|file| CssFile {
            content: truncate_content(&file.content, FILE_CHAR_LIMIT).into_owned(),
            ..file.clone()
        })
        .collect();
    let js = content
        .js
        .iter()
        .map(|file| JsFile {
            content: truncate_content(&file.content, FILE_CHAR_LIMIT).into_owned(),
            ..file.clone()
        })
        .collect();

    let meta = &content.metadata;
    let charset = if meta.charset.is_empty() { "UTF-8".to_string() } else { meta.charset.clone() };

    SerializedContent {
        url: content.url.clone(),
        title: content.title.clone(),
        favicon: content.favicon.clone(),
        html: truncate_content(&content.html, HTML_CHAR_LIMIT).into_owned(),
        css,
        js,
        assets: content.assets.iter().take(ASSET_LIMIT).cloned().collect(),
        assets_omitted: content.assets.len().saturating_sub(ASSET_LIMIT),
        metadata: SerializedMetadata {
            title: meta.title.clone(),
            description: meta.description.clone().unwrap_or_default(),
            viewport: meta.viewport.clone().unwrap_or_default(),
            charset,
            language: meta.language.clone().unwrap_or_default(),
            author: meta.author.clone().unwrap_or_default(),
            canonical: meta.canonical.clone().unwrap_or_default(),
        },
        parsed_at: content.parsed_at.to_rfc3339_opts(SecondsFormat::Millis, true),
    }
}

/// Truncates, cleans and round-trip checks `content`.
pub fn serialize_content(content: &WebsiteContent) -> Result<Value> {
    to_safe_value(&prepare(content))
}

/// Converts any serializable value into a cleaned [`Value`] that survives a
/// stringify/parse round trip unchanged.
pub fn to_safe_value<T: Serialize>(data: &T) -> Result<Value> {
    let mut value = serde_json::to_value(data).map_err(|e| {
        error!(error = %e, "value cannot be represented as JSON");
        AppError::NonSerializableContent
    })?;

    sanitize_value(&mut value, 0);

    let text = serde_json::to_string(&value).map_err(|e| {
        error!(error = %e, "JSON stringify failed");
        AppError::NonSerializableContent
    })?;
    let reparsed: Value = serde_json::from_str(&text).map_err(|e| {
        error!(error = %e, "JSON round trip failed");
        AppError::NonSerializableContent
    })?;

    if reparsed != value {
        error!("JSON round trip changed the payload");
        return Err(AppError::NonSerializableContent);
    }
    Ok(value)
}

/// The payload sent instead of content that could not be made JSON-safe.
pub fn failure_payload() -> Value {
    json!({
        "success": false,
        "error": "Content contains invalid characters",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

fn sanitize_value(value: &mut Value, depth: usize) {
    if depth >= MAX_DEPTH && (value.is_array() || value.is_object()) {
        *value = Value::String(CIRCULAR_PLACEHOLDER.to_string());
        return;
    }

    match value {
        Value::String(s) => clean_string(s),
        Value::Array(items) => {
            for item in items.iter_mut() {
                sanitize_value(item, depth + 1);
            }
        }
        Value::Object(map) => {
            if map.keys().any(|k| k.chars().any(is_unsafe_char)) {
                let entries = std::mem::take(map);
                for (mut key, item) in entries {
                    clean_string(&mut key);
                    map.insert(key, item);
                }
            }
            for item in map.values_mut() {
                sanitize_value(item, depth + 1);
            }
        }
        _ => {}
    }
}

fn clean_string(s: &mut String) {
    if s.chars().any(is_unsafe_char) {
        s.retain(|c| !is_unsafe_char(c));
    }
}

/// Control characters other than tab/newline/carriage return, line and
/// paragraph separators, and byte-order/non-characters.
fn is_unsafe_char(c: char) -> bool {
    matches!(
        c,
        '\u{0}'..='\u{8}'
            | '\u{B}'
            | '\u{C}'
            | '\u{E}'..='\u{1F}'
            | '\u{7F}'..='\u{9F}'
            | '\u{2028}'
            | '\u{2029}'
            | '\u{FEFF}'
            | '\u{FFFE}'
            | '\u{FFFF}'
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssetKind, Source, WebsiteMetadata};
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn content() -> WebsiteContent {
        WebsiteContent {
            url: "https://example.com/".into(),
            title: "Example Domain".into(),
            favicon: None,
            html: "<p>hi</p>".into(),
            css: vec![CssFile {
                id: "inline-style-1".into(),
                name: "inline-style-1.css".into(),
                content: "body{}".into(),
                source: Source::Inline,
                url: None,
                media: Some("all".into()),
            }],
            js: Vec::new(),
            assets: Vec::new(),
            metadata: WebsiteMetadata {
                title: "Example Domain".into(),
                ..WebsiteMetadata::default()
            },
            parsed_at: Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap(),
        }
    }

    #[test]
    fn short_content_is_untouched() {
        assert_eq!(truncate_content("abc", 3), "abc");
        assert!(matches!(truncate_content("abc", 10), Cow::Borrowed(_)));
    }

    #[test]
    fn long_content_gets_marker() {
        let out = truncate_content("abcdef", 4);
        assert_eq!(out, format!("abcd{}", TRUNCATION_MARKER));
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let out = truncate_content("ééééé", 2);
        assert_eq!(out, format!("éé{}", TRUNCATION_MARKER));
    }

    #[test]
    fn truncation_is_idempotent() {
        let once = truncate_content("0123456789", 5).into_owned();
        let twice = truncate_content(&once, 5);
        assert_eq!(twice, once);
        assert_eq!(twice.matches(TRUNCATION_MARKER).count(), 1);
    }

    #[test]
    fn prepared_content_has_wire_shape() {
        let value = serialize_content(&content()).unwrap();
        assert_eq!(value["title"], "Example Domain");
        assert_eq!(value["parsedAt"], "2024-05-06T07:08:09.000Z");
        assert_eq!(value["metadata"]["charset"], "UTF-8");
        assert_eq!(value["metadata"]["description"], "");
        assert_eq!(value["css"][0]["source"], "inline");
        assert!(value.get("assetsOmitted").is_none());
    }

    #[test]
    fn oversized_fields_are_capped() {
        let mut page = content();
        page.html = "x".repeat(HTML_CHAR_LIMIT + 10);
        page.css[0].content = "y".repeat(FILE_CHAR_LIMIT + 1);
        page.assets = (1..=120)
            .map(|n| Asset {
                id: format!("asset-{}", n),
                kind: AssetKind::Image,
                original_url: format!("https://example.com/{}.png", n),
                name: format!("{}.png", n),
                ..Asset::default()
            })
            .collect();

        let prepared = prepare(&page);
        assert_eq!(prepared.html.chars().count(), HTML_CHAR_LIMIT + TRUNCATION_MARKER.len());
        assert!(prepared.html.ends_with(TRUNCATION_MARKER));
        assert!(prepared.css[0].content.ends_with(TRUNCATION_MARKER));
        assert_eq!(prepared.assets.len(), ASSET_LIMIT);
        assert_eq!(prepared.assets_omitted, 20);
    }

    #[test]
    fn control_characters_are_removed() {
        let mut page = content();
        page.title = "Bad\u{0}Title\u{1F}".into();
        page.html = "<p>a\u{2028}b\tc\n</p>\u{FEFF}".into();

        let value = serialize_content(&page).unwrap();
        assert_eq!(value["title"], "BadTitle");
        assert_eq!(value["html"], "<p>ab\tc\n</p>");
    }

    #[test]
    fn deep_nesting_is_replaced_with_placeholder() {
        let mut nested = json!("leaf");
        for _ in 0..(MAX_DEPTH + 10) {
            nested = json!([nested]);
        }
        let value = to_safe_value(&nested).unwrap();

        let mut cursor = &value;
        let mut depth = 0;
        while let Value::Array(items) = cursor {
            cursor = &items[0];
            depth += 1;
        }
        assert_eq!(depth, MAX_DEPTH);
        assert_eq!(cursor, &json!(CIRCULAR_PLACEHOLDER));
    }

    #[test]
    fn unserializable_data_is_reported_not_panicked() {
        let mut bad: BTreeMap<(u8, u8), u8> = BTreeMap::new();
        bad.insert((1, 2), 3);
        assert!(matches!(to_safe_value(&bad), Err(AppError::NonSerializableContent)));

        let payload = failure_payload();
        assert_eq!(payload["success"], false);
        assert_eq!(payload["error"], "Content contains invalid characters");
        assert!(payload["timestamp"].is_string());
    }
}
