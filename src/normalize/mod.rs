//! Post body normalization: raw Piazza content → Markdown segments.
//!
//! Bodies are either HTML or a literal Markdown payload wrapped in
//! `<md>…</md>`. Both end up as an ordered list of [`Segment`]s where images
//! hosted on the upstream origin are split out so they can be rendered as
//! dedicated image blocks.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use url::Url;

use crate::error::ContentParseError;

pub mod markdown;

pub use markdown::{convert, Ruleset};

const LITERAL_OPEN: &str = "<md>";
const LITERAL_CLOSE: &str = "</md>";

static ABSOLUTE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s"'<>]+"#).expect("valid url regex"));

/// Opening of a link or image up to its target, e.g. `[label](`.
static LINK_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(!?)\[([^\]]+)\]\(").expect("valid link regex"));

/// A link whose only content is an upstream-hosted image.
static LINKED_IMAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[(!\[[^\]]*\]\(/[^)\s]*\))\]\([^)\s]*\)").expect("valid linked image regex")
});

static RELATIVE_IMAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"!\[[^\]]*\]\((/[^)\s]*)(?:\s+"[^"]*")?\)"#).expect("valid image regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Image { url: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedContent {
    pub segments: Vec<Segment>,
}

impl NormalizedContent {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            segments: vec![Segment::Text(text.into())],
        }
    }

    pub fn has_images(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Image { .. }))
    }

    /// All text segments joined by blank lines.
    pub fn text(&self) -> String {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Text(t) if !t.is_empty() => Some(t.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    origin: Url,
    rules: Ruleset,
}

impl Normalizer {
    pub fn new(origin: Url, rules: Ruleset) -> Self {
        Self { origin, rules }
    }

    /// Normalizer with the Piazza ruleset against the given origin.
    pub fn piazza(origin: Url) -> Self {
        Self::new(origin, Ruleset::piazza())
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn normalize(&self, raw_body: &str) -> Result<NormalizedContent, ContentParseError> {
        let markdown = match literal_markdown(raw_body) {
            Some(inner) => inner.to_string(),
            None => convert(raw_body, &self.rules)?,
        };
        let markdown = unescape_urls(&markdown);
        let markdown = collapse_self_links(&markdown);
        let markdown = LINKED_IMAGE.replace_all(&markdown, "$1");
        self.split_segments(&markdown)
    }

    /// Text next to an image loses the whitespace separating it from the
    /// image; everything else is kept as written.
    fn split_segments(&self, markdown: &str) -> Result<NormalizedContent, ContentParseError> {
        let mut segments = Vec::new();
        let mut last = 0;
        for caps in RELATIVE_IMAGE.captures_iter(markdown) {
            let (Some(whole), Some(path)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let mut text = &markdown[last..whole.start()];
            if last > 0 {
                text = trim_leading_blank(text);
            }
            segments.push(Segment::Text(self.absolutize_links(text.trim_end())));
            segments.push(Segment::Image {
                url: self.asset_url(path.as_str())?,
            });
            last = whole.end();
        }
        let mut tail = &markdown[last..];
        if last > 0 {
            tail = trim_leading_blank(tail);
        }
        segments.push(Segment::Text(self.absolutize_links(tail)));
        Ok(NormalizedContent { segments })
    }

    fn asset_url(&self, path: &str) -> Result<String, ContentParseError> {
        self.origin
            .join(path)
            .map(String::from)
            .map_err(|err| ContentParseError::InvalidAssetPath {
                path: path.to_string(),
                reason: err.to_string(),
            })
    }

    fn absolutize_links(&self, text: &str) -> String {
        let origin = self.origin.as_str().trim_end_matches('/');
        text.replace("](/", &format!("]({origin}/"))
    }
}

fn literal_markdown(raw: &str) -> Option<&str> {
    raw.trim()
        .strip_prefix(LITERAL_OPEN)
        .and_then(|rest| rest.strip_suffix(LITERAL_CLOSE))
}

/// Drop backslash escapes the converter left inside absolute URLs.
fn unescape_urls(text: &str) -> String {
    ABSOLUTE_URL
        .replace_all(text, |caps: &Captures| caps[0].replace('\\', ""))
        .into_owned()
}

/// `[x](x)` → `x`; images are left alone. The target may contain
/// parentheses as long as it equals the label exactly.
fn collapse_self_links(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in LINK_OPEN.captures_iter(text) {
        let (Some(whole), Some(bang), Some(label)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        if whole.start() < last || !bang.as_str().is_empty() {
            continue;
        }
        let label = label.as_str();
        let rest = &text[whole.end()..];
        if rest.strip_prefix(label).is_some_and(|r| r.starts_with(')')) {
            out.push_str(&text[last..whole.start()]);
            out.push_str(label);
            last = whole.end() + label.len() + 1;
        }
    }
    out.push_str(&text[last..]);
    out
}

/// Drop whitespace-only lines at the start; a first line sharing the image's
/// line loses its leading spaces too.
fn trim_leading_blank(text: &str) -> &str {
    let Some(first) = text.find(|c: char| !c.is_whitespace()) else {
        return "";
    };
    match text[..first].rfind('\n') {
        Some(newline) => &text[newline + 1..],
        None => &text[first..],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> Normalizer {
        Normalizer::piazza(Url::parse("https://piazza.com/").unwrap())
    }

    #[test]
    fn literal_markdown_passes_through() {
        let out = normalizer().normalize("<md>**hi**</md>").unwrap();
        assert_eq!(out.segments, vec![Segment::Text("**hi**".into())]);
        assert!(!out.has_images());
    }

    #[test]
    fn literal_markdown_is_not_html_converted() {
        let out = normalizer().normalize("<md><b>x</b> *y*</md>").unwrap();
        assert_eq!(out.text(), "<b>x</b> *y*");
    }

    #[test]
    fn self_links_collapse() {
        let out = normalizer()
            .normalize(r#"<a href="http://x.com">http://x.com</a>"#)
            .unwrap();
        assert_eq!(out.text(), "http://x.com");
    }

    #[test]
    fn escaped_urls_are_unescaped_then_collapsed() {
        let out = normalizer()
            .normalize(r#"<p>go to <a href="https://x.com/a_b">https://x.com/a_b</a> or https://y.com/c_d</p>"#)
            .unwrap();
        assert_eq!(out.text(), "go to https://x.com/a_b or https://y.com/c_d");
    }

    #[test]
    fn labelled_links_are_kept() {
        let out = normalizer()
            .normalize(r#"<a href="https://x.com">site</a>"#)
            .unwrap();
        assert_eq!(out.text(), "[site](https://x.com)");
    }

    #[test]
    fn relative_image_becomes_image_segment() {
        let out = normalizer()
            .normalize(r#"<p>before</p><img src="/files/1.png"><p>after</p>"#)
            .unwrap();
        assert!(out.has_images());
        assert_eq!(
            out.segments,
            vec![
                Segment::Text("before".into()),
                Segment::Image {
                    url: "https://piazza.com/files/1.png".into()
                },
                Segment::Text("after".into()),
            ]
        );
    }

    #[test]
    fn absolute_images_stay_inline() {
        let out = normalizer()
            .normalize(r#"<img src="https://cdn.example.com/a.png" alt="a">"#)
            .unwrap();
        assert!(!out.has_images());
        assert_eq!(out.text(), "![a](https://cdn.example.com/a.png)");
    }

    #[test]
    fn relative_links_become_absolute() {
        let out = normalizer()
            .normalize(r#"<a href="/class/abc/post/3">earlier post</a>"#)
            .unwrap();
        assert_eq!(out.text(), "[earlier post](https://piazza.com/class/abc/post/3)");
    }

    #[test]
    fn images_inside_literal_markdown_are_split() {
        let out = normalizer()
            .normalize("<md>see ![chart](/redirect/s3?x=1)</md>")
            .unwrap();
        assert_eq!(
            out.segments,
            vec![
                Segment::Text("see".into()),
                Segment::Image {
                    url: "https://piazza.com/redirect/s3?x=1".into()
                },
                Segment::Text(String::new()),
            ]
        );
    }

    #[test]
    fn literal_markdown_keeps_indentation() {
        let body = "<md>    let x = 1;\n    let y = 2;</md>";
        let out = normalizer().normalize(body).unwrap();
        assert_eq!(
            out.segments,
            vec![Segment::Text("    let x = 1;\n    let y = 2;".into())]
        );
    }

    #[test]
    fn indented_block_after_image_keeps_indentation() {
        let out = normalizer()
            .normalize("<md>![a](/i.png)\n\n    code\n</md>")
            .unwrap();
        assert_eq!(
            out.segments,
            vec![
                Segment::Text(String::new()),
                Segment::Image {
                    url: "https://piazza.com/i.png".into()
                },
                Segment::Text("    code\n".into()),
            ]
        );
    }

    #[test]
    fn self_links_with_parentheses_collapse() {
        let url = "https://en.wikipedia.org/wiki/Foo_(bar)";
        let out = normalizer()
            .normalize(&format!(r#"<a href="{url}">{url}</a>"#))
            .unwrap();
        assert_eq!(out.text(), url);
        assert_eq!(
            collapse_self_links("see [a_(b)](a_(b)) and [x](y)"),
            "see a_(b) and [x](y)"
        );
        assert_eq!(collapse_self_links("![p.png](p.png)"), "![p.png](p.png)");
    }

    #[test]
    fn linked_image_becomes_bare_image() {
        let out = normalizer()
            .normalize("<md>[![](/x.png)](/x.png) text</md>")
            .unwrap();
        assert_eq!(
            out.segments,
            vec![
                Segment::Text(String::new()),
                Segment::Image {
                    url: "https://piazza.com/x.png".into()
                },
                Segment::Text("text".into()),
            ]
        );

        let out = normalizer()
            .normalize(r#"<p><a href="/x.png"><img src="/x.png"></a> text</p>"#)
            .unwrap();
        assert!(out.has_images());
        assert!(!out.text().contains('['));
        assert!(!out.text().contains("]("));
    }

    #[test]
    fn unterminated_marker_is_treated_as_html() {
        let out = normalizer().normalize("<md>**hi**").unwrap();
        assert!(out.text().contains("hi"));
        assert_ne!(out.text(), "**hi**");
    }
}
