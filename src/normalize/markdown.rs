//! HTML → Markdown conversion with an explicit ruleset.
//!
//! Conversion is done by `html2md`; a [`Ruleset`] is the ordered list of tag
//! handlers layered over its defaults, built fresh for every [`convert`] call.
//! Later rules for the same tag replace earlier ones.

use ego_tree::iter::Edge;
use html2md::{parse_html_custom, Handle, NodeData, StructuredPrinter, TagHandler, TagHandlerFactory};
use scraper::Html;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use crate::error::ContentParseError;

/// Element nesting accepted before a document is rejected; the converter
/// recurses once per level.
pub const MAX_DEPTH: usize = 256;

pub type HandlerFn = fn() -> Box<dyn TagHandler>;

#[derive(Clone, Copy)]
pub struct Rule {
    pub name: &'static str,
    pub tag: &'static str,
    pub handler: HandlerFn,
}

#[derive(Clone, Default)]
pub struct Ruleset {
    rules: Vec<Rule>,
}

impl fmt::Debug for Ruleset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.rules.iter().map(|r| (r.tag, r.name)))
            .finish()
    }
}

impl Ruleset {
    /// `html2md` defaults only.
    pub fn standard() -> Self {
        Self::default()
    }

    /// Defaults plus every `<pre>` rendered as a fenced block, including bare
    /// ones without an inner `<code>`.
    pub fn piazza() -> Self {
        Self::standard().with_rule(Rule {
            name: "fenced-pre",
            tag: "pre",
            handler: fenced_pre,
        })
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name).collect()
    }

    fn handlers(&self) -> HashMap<String, Box<dyn TagHandlerFactory>> {
        let mut handlers: HashMap<String, Box<dyn TagHandlerFactory>> = HashMap::new();
        for rule in &self.rules {
            handlers.insert(rule.tag.to_string(), Box::new(RuleFactory(rule.handler)));
        }
        handlers
    }
}

struct RuleFactory(HandlerFn);

impl TagHandlerFactory for RuleFactory {
    fn instantiate(&self) -> Box<dyn TagHandler> {
        (self.0)()
    }
}

/// Convert an HTML fragment to Markdown with the given rules.
pub fn convert(html: &str, rules: &Ruleset) -> Result<String, ContentParseError> {
    if nesting_depth(html) > MAX_DEPTH {
        return Err(ContentParseError::TooDeep(MAX_DEPTH));
    }
    let handlers = rules.handlers();
    let markdown = panic::catch_unwind(AssertUnwindSafe(|| parse_html_custom(html, &handlers)))
        .map_err(|_| ContentParseError::Converter)?;
    Ok(markdown.trim().to_string())
}

fn nesting_depth(html: &str) -> usize {
    let document = Html::parse_document(html);
    let mut depth = 0usize;
    let mut deepest = 0;
    for edge in document.root_element().traverse() {
        match edge {
            Edge::Open(node) if node.value().is_element() => {
                depth += 1;
                deepest = deepest.max(depth);
            }
            Edge::Close(node) if node.value().is_element() => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    deepest
}

fn fenced_pre() -> Box<dyn TagHandler> {
    Box::new(FencedPre)
}

/// Fences a `<pre>` block. With a `<code>` child the `language-*` class
/// becomes the info string; a bare block gets a plain fence.
struct FencedPre;

impl TagHandler for FencedPre {
    fn handle(&mut self, tag: &Handle, printer: &mut StructuredPrinter) {
        let lang = code_language(tag).unwrap_or_default();
        printer.insert_newline();
        printer.append_str(&format!("\n```{lang}\n"));
    }

    fn after_handle(&mut self, printer: &mut StructuredPrinter) {
        printer.append_str("\n```\n");
        printer.insert_newline();
    }
}

/// `None` for a bare `<pre>`; otherwise the language of its `<code>` child,
/// empty when unspecified.
fn code_language(tag: &Handle) -> Option<String> {
    let children = tag.children.borrow();
    for child in children.iter() {
        if let NodeData::Element { name, attrs, .. } = &child.data {
            if &*name.local != "code" {
                continue;
            }
            let attrs = attrs.borrow();
            let lang = attrs
                .iter()
                .filter(|a| &*a.name.local == "class")
                .flat_map(|a| a.value.split_whitespace())
                .find_map(|class| class.strip_prefix("language-"))
                .unwrap_or("")
                .to_string();
            return Some(lang);
        }
    }
    None
}
