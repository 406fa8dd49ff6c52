//! Change detection against the per-course watermark.

use crate::model::{FeedEntry, Watermark};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeSet {
    /// Nothing eligible; the stored watermark must not be touched.
    NoOp,
    Changes {
        /// Eligible posts, ascending by `nr`.
        new_posts: Vec<FeedEntry>,
        /// Highest `nr` in the whole snapshot, eligible or not.
        next_watermark: Watermark,
    },
}

pub fn detect_changes(feed: &[FeedEntry], watermark: Watermark) -> ChangeSet {
    let mut new_posts: Vec<FeedEntry> = feed
        .iter()
        .filter(|entry| entry.nr > watermark && !entry.is_private())
        .cloned()
        .collect();
    if new_posts.is_empty() {
        return ChangeSet::NoOp;
    }
    new_posts.sort_by_key(|entry| entry.nr);

    // Non-empty `new_posts` implies some nr > watermark, so this never lowers it.
    let next_watermark = feed
        .iter()
        .map(|entry| entry.nr)
        .max()
        .unwrap_or(watermark)
        .max(watermark);

    ChangeSet::Changes {
        new_posts,
        next_watermark,
    }
}
