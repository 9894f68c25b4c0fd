//! Lenient markup parser shared by the MJML compiler and text extraction.
//!
//! Accepts HTML and MJML alike: tag names are lowercased, void elements
//! never take children, `script`/`style`/`mj-style` bodies are kept as raw
//! text, stray end tags are ignored and elements still open at end of input
//! are closed. Only lexically broken input (an unterminated tag, comment or
//! quoted attribute) is an error.

use std::borrow::Cow;
use std::fmt::Write;
use thiserror::Error;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "mj-style"];

/// Lexical error in the input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at byte {offset}")]
pub struct ParseError {
    pub message: String,
    pub offset: usize,
}

/// A parsed node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    /// Raw text, entities still encoded.
    Text(String),
    Comment(String),
}

/// An element with its attributes (values entity-decoded) and children.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    fn new(name: String, attrs: Vec<(String, String)>) -> Self {
        Self {
            name,
            attrs,
            children: Vec::new(),
        }
    }

    /// Attribute value by (lowercase) name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Direct child elements.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            _ => None,
        })
    }

    /// First direct child element with this name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|el| el.name == name)
    }

    /// Decoded text of all descendant text nodes.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }

    /// Children serialized back to markup.
    pub fn inner_html(&self) -> String {
        to_html(&self.children)
    }

    pub fn is_void(&self) -> bool {
        VOID_ELEMENTS.contains(&self.name.as_str())
    }
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(&decode_entities(text)),
            Node::Element(el) => collect_text(&el.children, out),
            Node::Comment(_) => {}
        }
    }
}

/// Parse a document or fragment into a node list.
pub fn parse(input: &str) -> Result<Vec<Node>, ParseError> {
    Parser { input, pos: 0 }.run()
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn error(&self, message: &str, offset: usize) -> ParseError {
        ParseError {
            message: message.to_string(),
            offset,
        }
    }

    fn run(mut self) -> Result<Vec<Node>, ParseError> {
        let mut stack: Vec<Element> = vec![Element::default()];

        while self.pos < self.input.len() {
            let rest = self.rest();

            if rest.starts_with("<!--") {
                let start = self.pos;
                let end = rest[4..]
                    .find("-->")
                    .ok_or_else(|| self.error("unterminated comment", start))?;
                let comment = rest[4..4 + end].to_string();
                self.pos += 4 + end + 3;
                push_child(&mut stack, Node::Comment(comment));
            } else if rest.starts_with("<!") || rest.starts_with("<?") {
                // doctype or processing instruction
                let start = self.pos;
                let end = rest
                    .find('>')
                    .ok_or_else(|| self.error("unterminated declaration", start))?;
                self.pos += end + 1;
            } else if rest.starts_with("</") {
                self.end_tag(&mut stack)?;
            } else if rest.starts_with('<')
                && rest[1..].starts_with(|c: char| c.is_ascii_alphabetic())
            {
                self.start_tag(&mut stack)?;
            } else {
                // text runs to the next tag-looking '<'
                let mut end = rest.len();
                for (i, _) in rest.match_indices('<').filter(|(i, _)| *i > 0) {
                    let next = &rest[i + 1..];
                    if next.starts_with(|c: char| c.is_ascii_alphabetic() || c == '/' || c == '!' || c == '?') {
                        end = i;
                        break;
                    }
                }
                if end == 0 {
                    end = 1;
                }
                push_text(&mut stack, &rest[..end]);
                self.pos += end;
            }
        }

        while stack.len() > 1 {
            close_top(&mut stack);
        }
        Ok(stack.pop().map(|root| root.children).unwrap_or_default())
    }

    fn tag_name(&mut self) -> String {
        let rest = self.rest();
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.')))
            .unwrap_or(rest.len());
        self.pos += len;
        rest[..len].to_ascii_lowercase()
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn end_tag(&mut self, stack: &mut Vec<Element>) -> Result<(), ParseError> {
        let start = self.pos;
        self.pos += 2;
        let name = self.tag_name();
        let close = self
            .rest()
            .find('>')
            .ok_or_else(|| self.error("unterminated end tag", start))?;
        self.pos += close + 1;

        if let Some(depth) = stack.iter().skip(1).rposition(|el| el.name == name) {
            // rposition over skip(1) is relative to index 1
            while stack.len() > depth + 1 {
                close_top(stack);
            }
        }
        Ok(())
    }

    fn start_tag(&mut self, stack: &mut Vec<Element>) -> Result<(), ParseError> {
        let start = self.pos;
        self.pos += 1;
        let name = self.tag_name();
        let mut attrs = Vec::new();

        let self_closing = loop {
            self.skip_whitespace();
            let rest = self.rest();
            if rest.is_empty() {
                return Err(self.error("unterminated tag", start));
            }
            if rest.starts_with("/>") {
                self.pos += 2;
                break true;
            }
            if rest.starts_with('>') {
                self.pos += 1;
                break false;
            }
            if rest.starts_with('/') {
                self.pos += 1;
                continue;
            }

            let len = rest
                .find(|c: char| c.is_whitespace() || matches!(c, '=' | '>' | '/'))
                .unwrap_or(rest.len());
            let key = rest[..len].to_ascii_lowercase();
            self.pos += len;
            self.skip_whitespace();

            let mut value = String::new();
            if self.rest().starts_with('=') {
                self.pos += 1;
                self.skip_whitespace();
                value = self.attr_value(start)?;
            }
            attrs.push((key, value));
        };

        let element = Element::new(name, attrs);
        if self_closing || element.is_void() {
            push_child(stack, Node::Element(element));
        } else if RAW_TEXT_ELEMENTS.contains(&element.name.as_str()) {
            let mut element = element;
            let closing = format!("</{}", element.name);
            let body_start = self.pos;
            let offset = self
                .rest()
                .to_ascii_lowercase()
                .find(&closing)
                .ok_or_else(|| self.error("unterminated raw text element", start))?;
            let body = &self.input[body_start..body_start + offset];
            if !body.is_empty() {
                element.children.push(Node::Text(body.to_string()));
            }
            self.pos = body_start + offset;
            let close = self
                .rest()
                .find('>')
                .ok_or_else(|| self.error("unterminated end tag", self.pos))?;
            self.pos += close + 1;
            push_child(stack, Node::Element(element));
        } else {
            stack.push(element);
        }
        Ok(())
    }

    fn attr_value(&mut self, tag_start: usize) -> Result<String, ParseError> {
        let rest = self.rest();
        if let Some(quote) = rest.chars().next().filter(|c| *c == '"' || *c == '\'') {
            let quote_start = self.pos;
            let end = rest[1..]
                .find(quote)
                .ok_or_else(|| self.error("unterminated quoted attribute", quote_start))?;
            self.pos += end + 2;
            return Ok(decode_entities(&rest[1..1 + end]).into_owned());
        }

        let len = rest
            .find(|c: char| c.is_whitespace() || c == '>')
            .unwrap_or(rest.len());
        if len == rest.len() {
            return Err(self.error("unterminated tag", tag_start));
        }
        self.pos += len;
        Ok(decode_entities(&rest[..len]).into_owned())
    }
}

fn push_child(stack: &mut [Element], node: Node) {
    if let Some(top) = stack.last_mut() {
        top.children.push(node);
    }
}

fn push_text(stack: &mut [Element], text: &str) {
    if let Some(top) = stack.last_mut() {
        if let Some(Node::Text(prev)) = top.children.last_mut() {
            prev.push_str(text);
        } else {
            top.children.push(Node::Text(text.to_string()));
        }
    }
}

fn close_top(stack: &mut Vec<Element>) {
    if let Some(element) = stack.pop() {
        push_child(stack, Node::Element(element));
    }
}

/// Serialize nodes back to markup.
pub fn to_html(nodes: &[Node]) -> String {
    let mut out = String::new();
    write_nodes(nodes, &mut out);
    out
}

fn write_nodes(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Comment(comment) => {
                let _ = write!(out, "<!--{}-->", comment);
            }
            Node::Element(el) => {
                out.push('<');
                out.push_str(&el.name);
                for (key, value) in &el.attrs {
                    let _ = write!(out, " {}=\"{}\"", key, escape_attr(value));
                }
                out.push('>');
                if !el.is_void() {
                    write_nodes(&el.children, out);
                    let _ = write!(out, "</{}>", el.name);
                }
            }
        }
    }
}

/// Decode the common named entities plus numeric references.
///
/// `&nbsp;` becomes a plain space. Unknown entities are left untouched.
pub fn decode_entities(input: &str) -> Cow<'_, str> {
    if !input.contains('&') {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let decoded = rest
            .find(';')
            .filter(|end| *end <= 10)
            .and_then(|end| decode_entity(&rest[1..end]).map(|c| (c, end)));

        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

fn decode_entity(name: &str) -> Option<char> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse().ok()?,
        };
        return char::from_u32(code);
    }

    Some(match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "copy" => '©',
        "reg" => '®',
        "trade" => '™',
        "hellip" => '…',
        "mdash" => '—',
        "ndash" => '–',
        "lsquo" => '‘',
        "rsquo" => '’',
        "ldquo" => '“',
        "rdquo" => '”',
        "laquo" => '«',
        "raquo" => '»',
        "euro" => '€',
        _ => return None,
    })
}

/// Escape text content.
pub fn escape_text(input: &str) -> Cow<'_, str> {
    if !input.contains(['&', '<', '>']) {
        return Cow::Borrowed(input);
    }
    Cow::Owned(
        input
            .replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;"),
    )
}

/// Escape a double-quoted attribute value.
pub fn escape_attr(input: &str) -> Cow<'_, str> {
    if !input.contains(['&', '<', '>', '"']) {
        return Cow::Borrowed(input);
    }
    Cow::Owned(
        input
            .replace('&', "&amp;")
            .replace('"', "&quot;")
            .replace('<', "&lt;")
            .replace('>', "&gt;"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(nodes: &[Node]) -> &Element {
        match &nodes[0] {
            Node::Element(el) => el,
            other => panic!("expected element, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_nested() {
        let nodes = parse(r#"<DIV Class="a"><p>Hi <b>there</b></p><br/><img src=x.png></DIV>"#).unwrap();
        let div = element(&nodes);
        assert_eq!(div.name, "div");
        assert_eq!(div.attr("class"), Some("a"));

        let names: Vec<_> = div.elements().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["p", "br", "img"]);
        assert_eq!(div.child("img").unwrap().attr("src"), Some("x.png"));
        assert_eq!(div.text_content(), "Hi there");
    }

    #[test]
    fn test_lenient_structure() {
        // stray end tag ignored, unclosed elements closed at EOF
        let nodes = parse("</span><ul><li>one<li>two").unwrap();
        let ul = element(&nodes);
        assert_eq!(ul.name, "ul");
        assert_eq!(ul.text_content(), "onetwo");

        // closing an outer element closes the inner ones
        let nodes = parse("<div><p>text</div>after").unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[1], Node::Text("after".to_string()));
    }

    #[test]
    fn test_raw_text_elements() {
        let nodes = parse("<style>p > a { color: red }</style><p>x</p>").unwrap();
        let style = element(&nodes);
        assert_eq!(style.children, vec![Node::Text("p > a { color: red }".to_string())]);
        assert_eq!(nodes.len(), 2);
    }

    #[test]
    fn test_lone_angle_bracket_is_text() {
        let nodes = parse("1 < 2 and 3 > 2").unwrap();
        assert_eq!(nodes, vec![Node::Text("1 < 2 and 3 > 2".to_string())]);
    }

    #[test]
    fn test_lexical_errors() {
        assert!(parse("<p>Hello <b").is_err());
        assert!(parse("<a href=\"http://x.com>Click</a>").is_err());
        assert!(parse("<!-- never closed").is_err());
        assert!(parse("<script>var a;").is_err());

        let err = parse("ok <p class='x").unwrap_err();
        assert_eq!(err.offset, 12);
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("A &amp; B"), "A & B");
        assert_eq!(
            decode_entities("&lt;b&gt; &quot;q&quot; &#39;s&#39; a&nbsp;b"),
            "<b> \"q\" 's' a b"
        );
        assert_eq!(decode_entities("&#x41;&#66;"), "AB");
        assert_eq!(decode_entities("&amp;lt;"), "&lt;");
        assert_eq!(decode_entities("AT&T &unknown; &"), "AT&T &unknown; &");
    }

    #[test]
    fn test_serialize() {
        let input = r#"<p class="lead">a &amp; b<br></p><!--c-->"#;
        assert_eq!(to_html(&parse(input).unwrap()), input);

        let nodes = parse(r#"<a title='say "hi"'>x</a>"#).unwrap();
        assert_eq!(to_html(&nodes), r#"<a title="say &quot;hi&quot;">x</a>"#);
    }
}
