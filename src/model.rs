use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Status value upstream uses for posts only visible to their author.
pub const PRIVATE_STATUS: &str = "private";

/// Tag marking an official announcement.
pub const INSTRUCTOR_NOTE_TAG: &str = "instructor-note";

/// Highest post number already announced for a course.
pub type Watermark = i64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Course {
    pub course_id: String,
    pub piazza_id: String,
    pub announcement_webhook: String,
    pub feed_webhook: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostKind {
    Note,
    Question,
    Other(String),
}

impl PostKind {
    pub fn as_str(&self) -> &str {
        match self {
            PostKind::Note => "note",
            PostKind::Question => "question",
            PostKind::Other(s) => s.as_str(),
        }
    }

    pub fn parse_kind(s: &str) -> Self {
        match s {
            "note" => PostKind::Note,
            "question" => PostKind::Question,
            other => PostKind::Other(other.to_string()),
        }
    }

    /// Kind word with its first letter upper-cased, e.g. `Question`.
    pub fn capitalized(&self) -> String {
        let mut chars = self.as_str().chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

impl fmt::Display for PostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PostKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(PostKind::parse_kind(&raw))
    }
}

impl Serialize for PostKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One post summary from a course feed snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedEntry {
    pub nr: i64,
    #[serde(rename = "type")]
    pub kind: PostKind,
    pub subject: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub folders: Vec<String>,
    #[serde(default)]
    pub status: String,
}

impl FeedEntry {
    pub fn is_private(&self) -> bool {
        self.status == PRIVATE_STATUS
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Full content of a post, taken from its latest revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostDetail {
    /// Upstream user id; `None` when the post is anonymous.
    pub author: Option<String>,
    pub subject: String,
    pub body: String,
}
