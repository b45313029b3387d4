use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One ingested page. Immutable once returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebsiteContent {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub css: Vec<CssFile>,
    #[serde(default)]
    pub js: Vec<JsFile>,
    #[serde(default)]
    pub assets: Vec<Asset>,
    #[serde(default)]
    pub metadata: WebsiteMetadata,
    #[serde(default = "Utc::now")]
    pub parsed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    #[default]
    Inline,
    External,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CssFile {
    pub id: String,
    pub name: String,
    pub content: String,
    pub source: Source,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JsFile {
    pub id: String,
    pub name: String,
    pub content: String,
    pub source: Source,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub script_type: Option<String>,
}

impl JsFile {
    pub fn is_module(&self) -> bool {
        self.script_type.as_deref() == Some("module")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Image,
    Font,
    Video,
    Audio,
    #[default]
    Other,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Image => "image",
            AssetKind::Font => "font",
            AssetKind::Video => "video",
            AssetKind::Audio => "audio",
            AssetKind::Other => "other",
        }
    }
}

/// Reference to an image, font or other resource. Never fetched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Asset {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: AssetKind,
    pub original_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_url: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WebsiteMetadata {
    pub title: String,
    pub description: Option<String>,
    pub viewport: Option<String>,
    pub charset: String,
    pub language: Option<String>,
    pub author: Option<String>,
    pub canonical: Option<String>,
}

impl Default for WebsiteMetadata {
    fn default() -> Self {
        WebsiteMetadata {
            title: String::new(),
            description: None,
            viewport: None,
            charset: "UTF-8".to_string(),
            language: None,
            author: None,
            canonical: None,
        }
    }
}

/// Knobs for a single ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    pub include_inline_styles: bool,
    pub include_inline_scripts: bool,
    pub include_external_assets: bool,
    pub sanitize_content: bool,
    pub preserve_comments: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            include_inline_styles: true,
            include_inline_scripts: true,
            include_external_assets: true,
            sanitize_content: true,
            preserve_comments: false,
        }
    }
}
