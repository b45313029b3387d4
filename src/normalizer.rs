//! Turns a parsed page into the canonical editable HTML.

use ammonia::Builder;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};

use crate::extractor::{SCRIPT_SELECTOR, STYLESHEET_LINK_SELECTOR, STYLE_SELECTOR};
use crate::models::ParseOptions;

static BODY_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("body").expect("Failed to parse body selector")
});

const EXTRA_TAGS: &[&str] = &[
    "main", "section", "article", "aside", "header", "footer", "nav", "figure", "figcaption",
    "picture", "source", "video", "audio", "button", "label", "form", "fieldset", "legend",
    "input", "select", "option", "textarea",
];

const EXTRA_GENERIC_ATTRIBUTES: &[&str] = &["class", "id", "style", "role", "aria-label", "aria-hidden"];

/// Removes hoisted tags and comments from `document`, then serializes it.
///
/// Stylesheet links, every `<script>` and every `<style>` are detached:
/// the ones that were extracted live in the css/js lists, and the rest were
/// excluded by the include flags. With `sanitize_content` the result is the
/// sanitized `<body>` markup; otherwise it is the whole document.
pub fn normalize(document: &mut Html, options: &ParseOptions) -> String {
    let mut doomed: Vec<_> = document
        .select(&STYLESHEET_LINK_SELECTOR)
        .chain(document.select(&SCRIPT_SELECTOR))
        .chain(document.select(&STYLE_SELECTOR))
        .map(|element| element.id())
        .collect();

    if !options.preserve_comments {
        doomed.extend(
            document
                .tree
                .nodes()
                .filter(|node| node.value().is_comment())
                .map(|node| node.id()),
        );
    }

    for id in doomed {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }

    if !options.sanitize_content {
        return document.html();
    }

    let body = extract_body(document).unwrap_or_default();
    sanitizer(options.preserve_comments).clean(&body).to_string()
}

pub fn extract_body(document: &Html) -> Option<String> {
    document.select(&BODY_SELECTOR)
        .next()
        .map(|element| element.inner_html())
}

/// Sanitizes an HTML fragment with the same rules used during ingestion.
pub fn sanitize_fragment(html: &str) -> String {
    sanitizer(false).clean(html).to_string()
}

fn sanitizer(preserve_comments: bool) -> Builder<'static> {
    let mut builder = Builder::default();
    builder
        .add_tags(EXTRA_TAGS)
        .add_generic_attributes(EXTRA_GENERIC_ATTRIBUTES)
        .add_tag_attributes("img", &["loading", "decoding"])
        .add_tag_attributes("source", &["src", "type", "media"])
        .add_tag_attributes("video", &["src", "poster", "controls", "autoplay", "loop", "muted", "playsinline"])
        .add_tag_attributes("audio", &["src", "controls", "loop", "muted"])
        .add_tag_attributes("input", &["type", "name", "value", "placeholder", "checked", "disabled"])
        .add_tag_attributes("button", &["type", "disabled"])
        .add_tag_attributes("label", &["for"])
        .add_tag_attributes("option", &["value", "selected"])
        .add_tag_attributes("textarea", &["name", "rows", "cols", "placeholder"])
        .strip_comments(!preserve_comments);
    builder
}
