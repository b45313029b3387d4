//! Standalone preview documents delivered as `data:` URLs.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{CssFile, JsFile};
use crate::normalizer::sanitize_fragment;

pub const DATA_URL_PREFIX: &str = "data:text/html;base64,";
pub const FILE_SEPARATOR: &str = "\n\n/* Next File */\n\n";
pub const MAX_INTERVALS: u32 = 100;
pub const MAX_TIMEOUTS: u32 = 1000;

static SCRIPT_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</(script)").expect("valid regex"));
static STYLE_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</(style)").expect("valid regex"));
static COMMENT_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"<!--").expect("valid regex"));

const CONTENT_SECURITY_POLICY: &str = "default-src 'self' data: https:; \
script-src 'self' 'unsafe-inline' 'unsafe-eval' https:; \
style-src 'self' 'unsafe-inline' https:; \
img-src 'self' data: https: http:; \
font-src 'self' data: https:; \
connect-src 'self' https:; \
frame-src 'none'; \
object-src 'none'; \
base-uri 'self';";

const PREVIEW_STYLES: &str = r#"
    body::before {
      content: 'PREVIEW MODE';
      position: fixed;
      top: 0;
      right: 0;
      background: rgba(59, 130, 246, 0.9);
      color: white;
      padding: 4px 8px;
      font-size: 10px;
      font-family: monospace;
      z-index: 999999;
      pointer-events: none;
      border-bottom-left-radius: 4px;
    }"#;

/// Builds the preview document and encodes it as a base64 data URL.
pub fn render_preview_url(html: &str, css: &[CssFile], js: &[JsFile]) -> String {
    let document = render_preview_document(html, css, js);
    format!("{}{}", DATA_URL_PREFIX, STANDARD.encode(document.as_bytes()))
}

pub fn render_preview_document(html: &str, css: &[CssFile], js: &[JsFile]) -> String {
    let body = sanitize_fragment(html);
    let combined_css = css
        .iter()
        .map(|file| file.content.as_str())
        .collect::<Vec<_>>()
        .join(FILE_SEPARATOR);
    let combined_js = js
        .iter()
        .filter(|file| !file.is_module())
        .map(guarded_script)
        .collect::<Vec<_>>()
        .join(FILE_SEPARATOR);

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>Preview</title>
  <meta http-equiv="Content-Security-Policy" content="{csp}">
  <style>
    * {{ box-sizing: border-box; }}
    html, body {{ margin: 0; padding: 0; min-height: 100vh; }}

{css}
{badge}
  </style>
</head>
<body>
{body}
  <script>
{runtime}
{js}
  </script>
</body>
</html>"#,
        csp = CONTENT_SECURITY_POLICY,
        css = escape_style_close(&combined_css),
        badge = PREVIEW_STYLES,
        body = body,
        runtime = runtime_guard(),
        js = combined_js,
    )
}

/// Each user script runs inside its own try/catch so one failure cannot stop the rest.
fn guarded_script(file: &JsFile) -> String {
    let label = file.name.replace('\\', "\\\\").replace('\'', "\\'");
    format!(
        "    try {{\n{}\n    }} catch (error) {{\n      console.warn('Error in {}:', error);\n    }}",
        escape_script_close(&file.content),
        escape_script_close(&label),
    )
}

/// Error overlay, timer caps and a disabled `eval`.
fn runtime_guard() -> String {
    format!(
        r#"    (function () {{
      var originalError = console.error;
      console.error = function () {{
        var args = Array.prototype.slice.call(arguments);
        originalError.apply(console, args);
        var errorDiv = document.createElement('div');
        errorDiv.style.cssText = 'position:fixed;bottom:10px;left:10px;background:#ef4444;color:white;' +
          'padding:8px 12px;border-radius:4px;font-family:monospace;font-size:12px;z-index:999998;' +
          'max-width:300px;word-wrap:break-word;';
        errorDiv.textContent = 'JS Error: ' + args.join(' ');
        document.body.appendChild(errorDiv);
        originalSetTimeout(function () {{
          if (errorDiv.parentNode) {{ errorDiv.parentNode.removeChild(errorDiv); }}
        }}, 5000);
      }};

      var intervalCount = 0;
      var timeoutCount = 0;
      var originalSetInterval = window.setInterval;
      var originalSetTimeout = window.setTimeout;

      window.setInterval = function (fn, delay) {{
        if (++intervalCount > {max_intervals}) {{
          console.error('Too many intervals created, blocking to prevent infinite loops');
          return -1;
        }}
        return originalSetInterval(fn, Math.max(delay || 0, 16));
      }};

      window.setTimeout = function (fn, delay) {{
        if (++timeoutCount > {max_timeouts}) {{
          console.error('Too many timeouts created, blocking to prevent infinite loops');
          return -1;
        }}
        return originalSetTimeout(fn, Math.max(delay || 0, 0));
      }};

      window.eval = function () {{
        console.error('eval() is blocked in preview mode');
        return undefined;
      }};
    }})();"#,
        max_intervals = MAX_INTERVALS,
        max_timeouts = MAX_TIMEOUTS,
    )
}

/// End tags match case-insensitively in HTML, and `<!--` can switch the
/// tokenizer into escaped script state.
fn escape_script_close(source: &str) -> String {
    let closed = SCRIPT_CLOSE.replace_all(source, r"<\/$1");
    COMMENT_OPEN.replace_all(&closed, r"<\!--").into_owned()
}

fn escape_style_close(source: &str) -> String {
    STYLE_CLOSE.replace_all(source, r"<\/$1").into_owned()
}
