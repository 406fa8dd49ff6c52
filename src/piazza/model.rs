use serde::Deserialize;

use crate::model::{FeedEntry, PostDetail};

/// Every `logic/api` response is wrapped in this envelope.
#[derive(Deserialize, Debug)]
pub struct ApiEnvelope<T> {
    pub result: Option<T>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct FeedResult {
    pub feed: Vec<FeedEntry>,
}

#[derive(Deserialize, Debug)]
pub struct ContentResult {
    pub history: Vec<Revision>,
}

/// One revision of a post; upstream lists the latest first.
#[derive(Deserialize, Debug)]
pub struct Revision {
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub anon: Option<String>,
    pub subject: String,
    pub content: String,
}

impl Revision {
    pub fn is_anonymous(&self) -> bool {
        self.uid.is_none() || self.anon.as_deref().is_some_and(|a| a != "no")
    }
}

impl From<Revision> for PostDetail {
    fn from(rev: Revision) -> Self {
        let author = if rev.is_anonymous() { None } else { rev.uid };
        PostDetail {
            author,
            subject: rev.subject,
            body: rev.content,
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct UserRecord {
    pub name: String,
}
