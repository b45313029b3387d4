use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{CssFile, JsFile, WebsiteContent};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchWebsiteRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub include_assets: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub css: Vec<CssFile>,
    #[serde(default)]
    pub js: Vec<JsFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    #[serde(default)]
    pub content: Option<WebsiteContent>,
    #[serde(default)]
    pub include_assets: bool,
}

#[derive(Serialize)]
pub struct FetchWebsitePayload {
    pub data: Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewPayload {
    pub preview_url: String,
}

#[derive(Serialize)]
pub struct MessagePayload {
    pub message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugPayload {
    pub status: String,
    pub html_length: usize,
    pub has_problematic_chars: bool,
    pub problematic_char_count: usize,
    pub first_chars: String,
}
