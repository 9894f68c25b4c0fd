//! Plain-text alternative extraction from rendered HTML.
//!
//! The primary path walks the parsed tree. When the HTML cannot be parsed,
//! a regex stripper produces the text instead; extraction itself never
//! fails.

use crate::markup::{self, Element, Node, decode_entities};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

static INVISIBLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(?:script|style|head|title)\b[^>]*>.*?</(?:script|style|head|title)\s*>")
        .expect("static regex")
});
static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?(?:-->|$)").expect("static regex"));
static LINE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").expect("static regex"));
static BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</?(?:p|div|tr|li|ul|ol|table|h[1-6])\b[^>]*>")
        .expect("static regex")
});
static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*(?:>|$)").expect("static regex"));
static SPACES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\r\x0C]+").expect("static regex"));

/// Convert HTML to readable plain text.
pub fn html_to_text(html: &str) -> String {
    match markup::parse(html) {
        Ok(nodes) => {
            let mut out = String::with_capacity(html.len() / 2);
            walk(&nodes, &mut out);
            normalize(&out)
        }
        Err(err) => {
            debug!(error = %err, "html parse failed, using tag stripper");
            strip_tags(html)
        }
    }
}

fn walk(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => {
                let text = decode_entities(text);
                let text = text.trim();
                if !text.is_empty() {
                    out.push_str(text);
                    out.push(' ');
                }
            }
            Node::Element(el) => element(el, out),
            Node::Comment(_) => {}
        }
    }
}

fn element(el: &Element, out: &mut String) {
    match el.name.as_str() {
        "head" | "title" | "style" | "script" => {}
        "br" => out.push('\n'),
        "p" | "div" | "tr" => {
            out.push('\n');
            walk(&el.children, out);
            out.push('\n');
        }
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            out.push_str("\n\n");
            walk(&el.children, out);
            out.push_str("\n\n");
        }
        "li" => {
            out.push_str("\n- ");
            walk(&el.children, out);
        }
        "a" => match link_text(el) {
            Some(text) => {
                out.push_str(&text);
                out.push(' ');
            }
            None => walk(&el.children, out),
        },
        _ => walk(&el.children, out),
    }
}

/// `text (href)` when the visible text differs from the target.
fn link_text(el: &Element) -> Option<String> {
    let href = el.attr("href").map(str::trim).filter(|h| !h.is_empty())?;
    let text = el.text_content();
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");

    if text.is_empty() || text == href {
        return None;
    }
    Some(format!("{} ({})", text, href))
}

/// Regex fallback for HTML the parser rejects.
pub fn strip_tags(html: &str) -> String {
    let text = INVISIBLE.replace_all(html, "");
    let text = COMMENT.replace_all(&text, "");
    let text = LINE_BREAK.replace_all(&text, "\n");
    let text = BLOCK.replace_all(&text, "\n");
    let text = TAG.replace_all(&text, "");
    normalize(&decode_entities(&text))
}

/// Collapse spaces within lines, allow at most one blank line between
/// paragraphs, trim the ends.
fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;

    for line in text.split('\n') {
        let line = SPACES.replace_all(line, " ");
        let line = line.trim();

        if line.is_empty() {
            blank_run += 1;
            continue;
        }
        if !out.is_empty() {
            out.push_str(if blank_run > 1 { "\n\n" } else { "\n" });
        }
        out.push_str(line);
        blank_run = 0;
    }
    out
}
