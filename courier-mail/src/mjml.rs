//! MJML to HTML compiler.
//!
//! Covers the responsive-email subset our templates use:
//!
//! - head: `mj-title`, `mj-preview`, `mj-style`, `mj-font`, `mj-breakpoint`,
//!   `mj-attributes` (`mj-all`, `mj-class` and per-tag defaults)
//! - body layout: `mj-body`, `mj-wrapper`, `mj-section`, `mj-column`
//! - content: `mj-text`, `mj-button`, `mj-image`, `mj-divider`, `mj-spacer`,
//!   `mj-raw`
//!
//! Anything else inside the document is a conversion error, reported as
//! [`MailError::MarkupConversion`] with the offending element in `details`.
//! Output is compact and deterministic for a given input.

use crate::markup::{self, Element, Node, escape_attr};
use crate::{MailError, Result};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;

const DEFAULT_FONT: &str = "Ubuntu, Helvetica, Arial, sans-serif";
const DEFAULT_BODY_WIDTH: f64 = 600.0;
const DEFAULT_BREAKPOINT: &str = "480px";

const BASE_CSS: &str = "#outlook a{padding:0;}body{margin:0;padding:0;-webkit-text-size-adjust:100%;-ms-text-size-adjust:100%;}table,td{border-collapse:collapse;mso-table-lspace:0pt;mso-table-rspace:0pt;}img{border:0;height:auto;line-height:100%;outline:none;text-decoration:none;-ms-interpolation-mode:bicubic;}p{display:block;margin:13px 0;}";

const CONTENT_TAGS: &[&str] = &[
    "mj-text",
    "mj-button",
    "mj-image",
    "mj-divider",
    "mj-spacer",
    "mj-raw",
];

fn conversion(message: impl Into<String>, details: impl Into<String>) -> MailError {
    MailError::MarkupConversion {
        message: message.into(),
        details: details.into(),
    }
}

/// Compile an MJML document to HTML.
pub fn compile(source: &str) -> Result<String> {
    let nodes =
        markup::parse(source).map_err(|e| conversion("malformed markup", e.to_string()))?;

    let mut root = None;
    for node in &nodes {
        match node {
            Node::Element(el) if el.name == "mjml" && root.is_none() => root = Some(el),
            Node::Element(el) => {
                return Err(conversion(
                    "unexpected top-level element",
                    format!("<{}>", el.name),
                ));
            }
            Node::Text(text) if !text.trim().is_empty() => {
                return Err(conversion("unexpected text outside <mjml>", text.trim()));
            }
            _ => {}
        }
    }
    let root = root.ok_or_else(|| conversion("missing <mjml> root element", "document"))?;

    let mut compiler = Compiler::default();
    if let Some(head) = root.child("mj-head") {
        compiler.head(head)?;
    }
    let body = root
        .child("mj-body")
        .ok_or_else(|| conversion("missing <mj-body>", "mjml"))?;
    for el in root.elements() {
        if el.name != "mj-head" && el.name != "mj-body" {
            return Err(conversion("unexpected element", format!("<{}> inside <mjml>", el.name)));
        }
    }

    compiler.document(body)
}

#[derive(Default)]
struct Defaults {
    all: Vec<(String, String)>,
    tags: HashMap<String, Vec<(String, String)>>,
    classes: HashMap<String, Vec<(String, String)>>,
}

fn lookup<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

#[derive(Default)]
struct Compiler {
    defaults: Defaults,
    title: String,
    preview: String,
    styles: Vec<String>,
    fonts: Vec<String>,
    breakpoint: Option<String>,
    body_width: f64,
    /// Column class name to its CSS width, for the media query.
    column_classes: BTreeMap<String, String>,
}

impl Compiler {
    /// Resolve an attribute: element, then `mj-class`, then tag defaults,
    /// then `mj-all`, then the component default.
    fn attr<'a>(&'a self, el: &'a Element, key: &str, fallback: &'a str) -> &'a str {
        if let Some(value) = el.attr(key) {
            return value;
        }
        if let Some(classes) = el.attr("mj-class") {
            for class in classes.split_whitespace() {
                if let Some(value) = self.defaults.classes.get(class).and_then(|a| lookup(a, key)) {
                    return value;
                }
            }
        }
        if let Some(value) = self.defaults.tags.get(&el.name).and_then(|a| lookup(a, key)) {
            return value;
        }
        lookup(&self.defaults.all, key).unwrap_or(fallback)
    }

    fn head(&mut self, head: &Element) -> Result<()> {
        for el in head.elements() {
            match el.name.as_str() {
                "mj-title" => self.title = el.text_content().trim().to_string(),
                "mj-preview" => self.preview = el.text_content().trim().to_string(),
                "mj-style" => self.styles.push(el.text_content().trim().to_string()),
                "mj-breakpoint" => self.breakpoint = el.attr("width").map(str::to_string),
                "mj-font" => {
                    if let Some(href) = el.attr("href") {
                        self.fonts.push(href.to_string());
                    }
                }
                "mj-attributes" => {
                    for rule in el.elements() {
                        let attrs = rule.attrs.clone();
                        match rule.name.as_str() {
                            "mj-all" => self.defaults.all.extend(attrs),
                            "mj-class" => {
                                let name = rule.attr("name").ok_or_else(|| {
                                    conversion("mj-class without a name", "mj-attributes")
                                })?;
                                self.defaults.classes.insert(name.to_string(), attrs);
                            }
                            tag => {
                                self.defaults.tags.entry(tag.to_string()).or_default().extend(attrs);
                            }
                        }
                    }
                }
                other => {
                    return Err(conversion(
                        "unsupported head element",
                        format!("<{}>", other),
                    ));
                }
            }
        }
        Ok(())
    }

    fn document(mut self, body: &Element) -> Result<String> {
        self.body_width = px(self.attr(body, "width", "600px")).unwrap_or(DEFAULT_BODY_WIDTH);
        let background = self.attr(body, "background-color", "").to_string();

        let mut content = String::new();
        for child in layout_children(body, &["mj-section", "mj-wrapper", "mj-raw"])? {
            match child.name.as_str() {
                "mj-wrapper" => self.wrapper(child, &mut content)?,
                "mj-section" => self.section(child, &mut content)?,
                _ => content.push_str(&child.inner_html()),
            }
        }

        let mut html = String::from(
            "<!doctype html><html xmlns=\"http://www.w3.org/1999/xhtml\"><head>",
        );
        let _ = write!(html, "<title>{}</title>", markup::escape_text(&self.title));
        html.push_str("<meta http-equiv=\"Content-Type\" content=\"text/html; charset=UTF-8\">");
        html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">");
        let _ = write!(html, "<style type=\"text/css\">{}</style>", BASE_CSS);
        for font in &self.fonts {
            let _ = write!(
                html,
                "<link href=\"{}\" rel=\"stylesheet\" type=\"text/css\">",
                escape_attr(font)
            );
        }
        if !self.column_classes.is_empty() {
            let breakpoint = self.breakpoint.as_deref().unwrap_or(DEFAULT_BREAKPOINT);
            let _ = write!(
                html,
                "<style type=\"text/css\">@media only screen and (min-width:{}){{",
                breakpoint
            );
            for (class, width) in &self.column_classes {
                let _ = write!(html, ".{}{{width:{} !important;max-width:{};}}", class, width, width);
            }
            html.push_str("}</style>");
        }
        for style in &self.styles {
            let _ = write!(html, "<style type=\"text/css\">{}</style>", style);
        }
        html.push_str("</head>");

        let _ = write!(
            html,
            "<body style=\"{}\">",
            style(&[("word-spacing", "normal"), ("background-color", background.as_str())])
        );
        if !self.preview.is_empty() {
            let _ = write!(
                html,
                "<div style=\"display:none;font-size:1px;color:#ffffff;line-height:1px;max-height:0px;max-width:0px;opacity:0;overflow:hidden;\">{}</div>",
                markup::escape_text(&self.preview)
            );
        }
        let _ = write!(
            html,
            "<div style=\"{}\">{}</div></body></html>",
            style(&[("background-color", background.as_str())]),
            content
        );
        Ok(html)
    }

    fn wrapper(&mut self, el: &Element, out: &mut String) -> Result<()> {
        let mut inner = String::new();
        for child in layout_children(el, &["mj-section", "mj-raw"])? {
            match child.name.as_str() {
                "mj-section" => self.section(child, &mut inner)?,
                _ => inner.push_str(&child.inner_html()),
            }
        }
        self.section_shell(el, &inner, out);
        Ok(())
    }

    fn section(&mut self, el: &Element, out: &mut String) -> Result<()> {
        let columns = layout_children(el, &["mj-column", "mj-raw"])?;
        let count = columns.iter().filter(|c| c.name == "mj-column").count();

        let mut inner = String::new();
        for column in columns {
            if column.name == "mj-raw" {
                inner.push_str(&column.inner_html());
            } else {
                self.column(column, count, &mut inner)?;
            }
        }
        self.section_shell(el, &inner, out);
        Ok(())
    }

    fn section_shell(&self, el: &Element, inner: &str, out: &mut String) {
        let background = self.attr(el, "background-color", "");
        let padding = self.attr(el, "padding", "20px 0");
        let text_align = self.attr(el, "text-align", "center");
        let width = format!("{}px", self.body_width);

        let _ = write!(
            out,
            "<div style=\"{}\"><table align=\"center\" border=\"0\" cellpadding=\"0\" cellspacing=\"0\" role=\"presentation\" style=\"{}\"><tbody><tr><td style=\"{}\">{}</td></tr></tbody></table></div>",
            style(&[("margin", "0px auto"), ("max-width", width.as_str()), ("background", background)]),
            style(&[("width", "100%"), ("background", background)]),
            style(&[
                ("direction", "ltr"),
                ("font-size", "0px"),
                ("padding", padding),
                ("text-align", text_align)
            ]),
            inner
        );
    }

    fn column(&mut self, el: &Element, siblings: usize, out: &mut String) -> Result<()> {
        let (class, css_width, width_px) = match el.attr("width") {
            Some(width) if width.ends_with("px") => {
                let value = px(width)
                    .ok_or_else(|| conversion("invalid column width", width.to_string()))?;
                (format!("mj-column-px-{}", number(value)), format!("{}px", number(value)), value)
            }
            Some(width) => {
                let percent: f64 = width
                    .trim_end_matches('%')
                    .trim()
                    .parse()
                    .map_err(|_| conversion("invalid column width", width.to_string()))?;
                (
                    format!("mj-column-per-{}", number(percent).replace('.', "-")),
                    format!("{}%", number(percent)),
                    self.body_width * percent / 100.0,
                )
            }
            None => {
                let percent = 100.0 / siblings.max(1) as f64;
                (
                    format!("mj-column-per-{}", number(percent).replace('.', "-")),
                    format!("{}%", number(percent)),
                    self.body_width * percent / 100.0,
                )
            }
        };
        self.column_classes.insert(class.clone(), css_width);

        let mut rows = String::new();
        for child in layout_children(el, CONTENT_TAGS)? {
            self.content(child, width_px, &mut rows);
        }

        let _ = write!(
            out,
            "<div class=\"{} mj-outlook-group-fix\" style=\"{}\"><table border=\"0\" cellpadding=\"0\" cellspacing=\"0\" role=\"presentation\" style=\"{}\" width=\"100%\"><tbody>{}</tbody></table></div>",
            class,
            style(&[
                ("font-size", "0px"),
                ("text-align", "left"),
                ("direction", "ltr"),
                ("display", "inline-block"),
                ("vertical-align", self.attr(el, "vertical-align", "top")),
                ("width", "100%"),
            ]),
            style(&[
                ("background-color", self.attr(el, "background-color", "")),
                ("vertical-align", self.attr(el, "vertical-align", "top")),
                ("padding", self.attr(el, "padding", "")),
            ]),
            rows
        );
        Ok(())
    }

    fn content(&self, el: &Element, column_px: f64, out: &mut String) {
        if el.name == "mj-raw" {
            out.push_str(&el.inner_html());
            return;
        }

        let padding = self.attr(el, "padding", if el.name == "mj-spacer" { "0" } else { "10px 25px" });
        let default_align = if el.name == "mj-text" { "left" } else { "center" };
        let align = self.attr(el, "align", default_align);

        let inner = match el.name.as_str() {
            "mj-text" => self.text(el, align),
            "mj-button" => self.button(el),
            "mj-image" => self.image(el, column_px - horizontal_padding(padding)),
            "mj-divider" => self.divider(el),
            _ => {
                let height = self.attr(el, "height", "20px");
                format!(
                    "<div style=\"{}\">&#8202;</div>",
                    style(&[("height", height), ("line-height", height)])
                )
            }
        };

        let _ = write!(
            out,
            "<tr><td align=\"{}\" style=\"{}\">{}</td></tr>",
            escape_attr(align),
            style(&[
                ("font-size", "0px"),
                ("padding", padding),
                ("word-break", "break-word")
            ]),
            inner
        );
    }

    fn text(&self, el: &Element, align: &str) -> String {
        format!(
            "<div style=\"{}\">{}</div>",
            style(&[
                ("font-family", self.attr(el, "font-family", DEFAULT_FONT)),
                ("font-size", self.attr(el, "font-size", "13px")),
                ("font-weight", self.attr(el, "font-weight", "")),
                ("line-height", self.attr(el, "line-height", "1")),
                ("text-align", align),
                ("color", self.attr(el, "color", "#000000")),
            ]),
            el.inner_html().trim()
        )
    }

    fn button(&self, el: &Element) -> String {
        let background = self.attr(el, "background-color", "#414141");
        let link_style = style(&[
            ("display", "inline-block"),
            ("background", background),
            ("color", self.attr(el, "color", "#ffffff")),
            ("font-family", self.attr(el, "font-family", DEFAULT_FONT)),
            ("font-size", self.attr(el, "font-size", "13px")),
            ("font-weight", self.attr(el, "font-weight", "normal")),
            ("line-height", "120%"),
            ("margin", "0"),
            ("text-decoration", "none"),
            ("text-transform", "none"),
        ]);
        let label = el.inner_html();
        let label = label.trim();

        let link = match el.attr("href") {
            Some(href) => format!(
                "<a href=\"{}\" style=\"{}\" target=\"_blank\">{}</a>",
                escape_attr(href),
                link_style,
                label
            ),
            None => format!("<p style=\"{}\">{}</p>", link_style, label),
        };

        format!(
            "<table border=\"0\" cellpadding=\"0\" cellspacing=\"0\" role=\"presentation\" style=\"border-collapse:separate;line-height:100%;\"><tbody><tr><td align=\"center\" bgcolor=\"{}\" role=\"presentation\" style=\"{}\" valign=\"middle\">{}</td></tr></tbody></table>",
            escape_attr(background),
            style(&[
                ("border", "none"),
                ("border-radius", self.attr(el, "border-radius", "3px")),
                ("cursor", "auto"),
                ("background", background),
                ("padding", self.attr(el, "inner-padding", "10px 25px")),
            ]),
            link
        )
    }

    fn image(&self, el: &Element, available_px: f64) -> String {
        let width = el
            .attr("width")
            .and_then(px)
            .map(|w| w.min(available_px))
            .unwrap_or(available_px)
            .max(0.0);
        let width = number(width.floor());

        let mut img = format!(
            "<img alt=\"{}\" src=\"{}\" style=\"border:0;display:block;outline:none;text-decoration:none;height:auto;width:100%;font-size:13px;\" width=\"{}\" height=\"auto\">",
            escape_attr(self.attr(el, "alt", "")),
            escape_attr(self.attr(el, "src", "")),
            width
        );
        if let Some(href) = el.attr("href") {
            img = format!("<a href=\"{}\" target=\"_blank\">{}</a>", escape_attr(href), img);
        }

        format!(
            "<table border=\"0\" cellpadding=\"0\" cellspacing=\"0\" role=\"presentation\" style=\"border-collapse:collapse;border-spacing:0px;\"><tbody><tr><td style=\"width:{}px;\">{}</td></tr></tbody></table>",
            width, img
        )
    }

    fn divider(&self, el: &Element) -> String {
        let border = format!(
            "{} {} {}",
            self.attr(el, "border-style", "solid"),
            self.attr(el, "border-width", "4px"),
            self.attr(el, "border-color", "#000000")
        );
        format!(
            "<p style=\"{}\"></p>",
            style(&[
                ("border-top", border.as_str()),
                ("font-size", "1px"),
                ("margin", "0px auto"),
                ("width", self.attr(el, "width", "100%")),
            ])
        )
    }
}

/// Child elements of a layout component, rejecting anything not in `allowed`
/// and any stray text.
fn layout_children<'a>(parent: &'a Element, allowed: &[&str]) -> Result<Vec<&'a Element>> {
    let mut children = Vec::new();
    for node in &parent.children {
        match node {
            Node::Element(el) if allowed.contains(&el.name.as_str()) => children.push(el),
            Node::Element(el) => {
                let message = if el.name.starts_with("mj-") && !is_known(&el.name) {
                    "unknown element"
                } else {
                    "unexpected element"
                };
                return Err(conversion(
                    message,
                    format!("<{}> inside <{}>", el.name, parent.name),
                ));
            }
            Node::Text(text) if !text.trim().is_empty() => {
                return Err(conversion(
                    "unexpected text",
                    format!("{:?} inside <{}>", text.trim(), parent.name),
                ));
            }
            _ => {}
        }
    }
    Ok(children)
}

fn is_known(name: &str) -> bool {
    matches!(
        name,
        "mj-body" | "mj-head" | "mj-wrapper" | "mj-section" | "mj-column"
    ) || CONTENT_TAGS.contains(&name)
}

/// Build an inline style, skipping empty values.
fn style(props: &[(&str, &str)]) -> String {
    let mut out = String::new();
    for (key, value) in props {
        if !value.is_empty() {
            let _ = write!(out, "{}:{};", key, escape_attr(value));
        }
    }
    out
}

fn px(value: &str) -> Option<f64> {
    value.trim().trim_end_matches("px").trim().parse().ok()
}

/// Left plus right padding of a CSS padding shorthand, in px.
fn horizontal_padding(padding: &str) -> f64 {
    let parts: Vec<f64> = padding.split_whitespace().map(|p| px(p).unwrap_or(0.0)).collect();
    match parts.as_slice() {
        [all] => all * 2.0,
        [_, x] | [_, x, _] => x * 2.0,
        [_, right, _, left] => right + left,
        _ => 0.0,
    }
}

fn number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERIFY: &str = r##"
<mjml>
  <mj-head>
    <mj-title>Verify</mj-title>
    <mj-preview>One more step</mj-preview>
    <mj-attributes>
      <mj-all font-family="Arial" />
      <mj-text color="#333333" />
      <mj-class name="big" font-size="20px" />
    </mj-attributes>
  </mj-head>
  <mj-body background-color="#f4f4f4">
    <mj-section>
      <mj-column>
        <mj-text mj-class="big">Hello &amp; welcome</mj-text>
        <mj-button href="http://localhost/verify?token=abc&amp;x=1">Verify</mj-button>
        <mj-divider />
        <mj-image src="logo.png" alt="Logo" width="800px" />
        <mj-spacer height="30px" />
      </mj-column>
    </mj-section>
  </mj-body>
</mjml>"##;

    #[test]
    fn test_compile_document() {
        let html = compile(VERIFY).unwrap();
        assert!(html.starts_with("<!doctype html>"));
        assert!(html.contains("<title>Verify</title>"));
        assert!(html.contains(">One more step</div>"));
        assert!(html.contains("background-color:#f4f4f4;"));
        assert!(html.contains("class=\"mj-column-per-100 mj-outlook-group-fix\""));
        assert!(html.contains(".mj-column-per-100{width:100% !important;max-width:100%;}"));
        assert!(html.contains("@media only screen and (min-width:480px)"));
    }

    #[test]
    fn test_attribute_resolution() {
        let html = compile(VERIFY).unwrap();
        // mj-class beats tag default, tag default beats mj-all
        assert!(html.contains("font-family:Arial;font-size:20px;line-height:1;text-align:left;color:#333333;"));
        assert!(html.contains(">Hello &amp; welcome</div>"));
        assert!(html.contains("href=\"http://localhost/verify?token=abc&amp;x=1\""));
        assert!(html.contains(">Verify</a>"));
        // image clamped to the column width minus padding
        assert!(html.contains("width=\"550\""));
        assert!(html.contains("height:30px;line-height:30px;"));
    }

    #[test]
    fn test_column_widths() {
        let html = compile(
            "<mjml><mj-body><mj-section><mj-column></mj-column><mj-column></mj-column><mj-column></mj-column></mj-section>\
             <mj-section><mj-column width=\"200px\"></mj-column><mj-column width=\"66.5%\"></mj-column></mj-section></mj-body></mjml>",
        )
        .unwrap();
        assert!(html.contains("mj-column-per-33-333333333333336"));
        assert!(html.contains("mj-column-px-200"));
        assert!(html.contains(".mj-column-per-66-5{width:66.5% !important;max-width:66.5%;}"));
    }

    #[test]
    fn test_output_is_deterministic() {
        assert_eq!(compile(VERIFY).unwrap(), compile(VERIFY).unwrap());
    }

    #[test]
    fn test_conversion_errors() {
        let err = compile("<mjml><mj-body><mj-section><mj-column><mj-carousel/></mj-column></mj-section></mj-body></mjml>")
            .unwrap_err();
        match err {
            MailError::MarkupConversion { message, details } => {
                assert_eq!(message, "unknown element");
                assert_eq!(details, "<mj-carousel> inside <mj-column>");
            }
            other => panic!("unexpected error: {:?}", other),
        }

        assert!(matches!(
            compile("<p>not mjml</p>"),
            Err(MailError::MarkupConversion { .. })
        ));
        assert!(matches!(
            compile("<mjml><mj-body>stray</mj-body></mjml>"),
            Err(MailError::MarkupConversion { .. })
        ));
        assert!(matches!(
            compile("<mjml><mj-body><mj-section"),
            Err(MailError::MarkupConversion { .. })
        ));
        assert!(matches!(
            compile("<mjml><mj-head/></mjml>"),
            Err(MailError::MarkupConversion { .. })
        ));
    }

    #[test]
    fn test_raw_passthrough() {
        let html = compile(
            "<mjml><mj-body><mj-raw><p class=\"legal\">Footer</p></mj-raw></mj-body></mjml>",
        )
        .unwrap();
        assert!(html.contains("<p class=\"legal\">Footer</p>"));
    }

    #[test]
    fn test_horizontal_padding() {
        assert_eq!(horizontal_padding("10px 25px"), 50.0);
        assert_eq!(horizontal_padding("5px"), 10.0);
        assert_eq!(horizontal_padding("0 10px 0 20px"), 30.0);
    }
}
