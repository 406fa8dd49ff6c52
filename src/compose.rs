//! Builds the outbound chat message for one post.
//!
//! Posts without extracted images become a single text payload. Posts with
//! images become an ordered list of text and gallery blocks so each image is
//! displayed on its own. Lengths are counted in `char`s.

use scraper::Html;

use crate::model::{FeedEntry, PostDetail};
use crate::normalize::{NormalizedContent, Segment};

/// Limit on a plain message's content.
pub const MAX_CONTENT_CHARS: usize = 2000;
/// Limit on the header block of a block-structured message.
pub const MAX_HEADER_BLOCK_CHARS: usize = 1000;
/// Limit on each body text block.
pub const MAX_TEXT_BLOCK_CHARS: usize = 2000;
/// Limit on text summed over all blocks of one message.
pub const MAX_TOTAL_TEXT_CHARS: usize = 4000;
/// Content blocks per message; the platform allows 40 components and the
/// action row with its button takes two.
pub const MAX_CONTENT_BLOCKS: usize = 38;

pub const ACTION_LABEL: &str = "View on Piazza";
pub const ANONYMOUS: &str = "Anonymous";
const ELLIPSIS: char = '…';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Text(String),
    Gallery { url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Plain(String),
    Blocks(Vec<Block>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    Plain,
    Blocks,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub label: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedMessage {
    pub username: String,
    pub body: MessageBody,
    pub action: Action,
}

impl ComposedMessage {
    pub fn mode(&self) -> RenderMode {
        match self.body {
            MessageBody::Plain(_) => RenderMode::Plain,
            MessageBody::Blocks(_) => RenderMode::Blocks,
        }
    }
}

/// Canonical URL of a post on the upstream site.
pub fn post_url(origin: &str, piazza_id: &str, nr: i64) -> String {
    format!("{}/class/{}/post/{}", origin.trim_end_matches('/'), piazza_id, nr)
}

pub fn compose(
    post: &FeedEntry,
    detail: &PostDetail,
    normalized: &NormalizedContent,
    author_name: Option<&str>,
    post_url: &str,
) -> ComposedMessage {
    let header = header(post, detail);
    let body = if normalized.has_images() {
        MessageBody::Blocks(blocks(&header, normalized))
    } else {
        let text = format!("{}\n\n{}", header, normalized.text());
        MessageBody::Plain(truncate(text.trim_end(), MAX_CONTENT_CHARS))
    };

    ComposedMessage {
        username: format!("{} on Piazza", author_name.unwrap_or(ANONYMOUS)),
        body,
        action: Action {
            label: ACTION_LABEL.to_string(),
            url: post_url.to_string(),
        },
    }
}

fn header(post: &FeedEntry, detail: &PostDetail) -> String {
    let mut header = format!(
        "## {}\n{}",
        decode_entities(&detail.subject),
        post.kind.capitalized()
    );
    if !post.folders.is_empty() {
        header.push_str(" in ");
        header.push_str(&post.folders.join(", "));
    }
    header
}

fn blocks(header: &str, normalized: &NormalizedContent) -> Vec<Block> {
    let header = truncate(header, MAX_HEADER_BLOCK_CHARS);
    let mut budget = MAX_TOTAL_TEXT_CHARS.saturating_sub(header.chars().count());
    let mut blocks = vec![Block::Text(header)];

    for segment in &normalized.segments {
        if blocks.len() >= MAX_CONTENT_BLOCKS {
            break;
        }
        match segment {
            Segment::Text(text) => {
                let text = text.trim_end();
                if text.trim_start().is_empty() || budget == 0 {
                    continue;
                }
                let text = truncate(text, MAX_TEXT_BLOCK_CHARS.min(budget));
                budget -= text.chars().count();
                blocks.push(Block::Text(text));
            }
            Segment::Image { url } => blocks.push(Block::Gallery { url: url.clone() }),
        }
    }
    blocks
}

/// Hard cut to `max` chars, the last one replaced by an ellipsis.
pub fn truncate(text: &str, max: usize) -> String {
    if max == 0 {
        return String::new();
    }
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max - 1).collect();
    cut.push(ELLIPSIS);
    cut
}

fn decode_entities(subject: &str) -> String {
    if !subject.contains('&') {
        return subject.to_string();
    }
    Html::parse_fragment(subject)
        .root_element()
        .text()
        .collect()
}
