//! Discord webhook delivery.
//!
//! Plain messages go out as `content` with a link-button row. Block messages
//! use the components-v2 layout, where text and images are separate
//! components and `content` must be absent.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::{json, Value};
use std::fmt;
use tracing::{debug, instrument, warn};

use crate::compose::{Action, Block, ComposedMessage, MessageBody};

/// Message flag enabling the components-v2 layout.
pub const COMPONENTS_V2_FLAG: u64 = 1 << 15;

const ACTION_ROW: u8 = 1;
const BUTTON: u8 = 2;
const LINK_BUTTON_STYLE: u8 = 5;
const TEXT_DISPLAY: u8 = 10;
const MEDIA_GALLERY: u8 = 12;

#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    async fn deliver(&self, url: &str, message: &ComposedMessage) -> Result<()>;
}

#[derive(Clone)]
pub struct DiscordWebhook {
    http: Client,
}

impl fmt::Debug for DiscordWebhook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscordWebhook").finish_non_exhaustive()
    }
}

impl DiscordWebhook {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .user_agent("piazza-relay/0.1")
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http })
    }

    pub fn build_request(&self, url: &str, message: &ComposedMessage) -> Result<reqwest::Request> {
        let mut endpoint = Url::parse(url).context("invalid webhook URL")?;
        endpoint
            .query_pairs_mut()
            .append_pair("with_components", "true");
        self.http
            .post(endpoint)
            .json(&payload(message))
            .build()
            .context("failed to build webhook request")
    }
}

#[async_trait]
impl DeliveryTransport for DiscordWebhook {
    #[instrument(skip_all)]
    async fn deliver(&self, url: &str, message: &ComposedMessage) -> Result<()> {
        let request = self.build_request(url, message)?;
        debug!(mode = ?message.mode(), "posting to webhook");
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach webhook")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            warn!(%status, "webhook rejected message");
            return Err(anyhow!("webhook error {}: {}", status, body));
        }
        Ok(())
    }
}

/// JSON body for a webhook execution.
pub fn payload(message: &ComposedMessage) -> Value {
    let mut body = json!({
        "username": message.username,
        "allowed_mentions": { "parse": [] },
    });
    match &message.body {
        MessageBody::Plain(content) => {
            body["content"] = json!(content);
            body["components"] = json!([action_row(&message.action)]);
        }
        MessageBody::Blocks(blocks) => {
            let mut components: Vec<Value> = blocks.iter().map(block_component).collect();
            components.push(action_row(&message.action));
            body["flags"] = json!(COMPONENTS_V2_FLAG);
            body["components"] = Value::Array(components);
        }
    }
    body
}

fn block_component(block: &Block) -> Value {
    match block {
        Block::Text(content) => json!({ "type": TEXT_DISPLAY, "content": content }),
        Block::Gallery { url } => json!({
            "type": MEDIA_GALLERY,
            "items": [{ "media": { "url": url } }],
        }),
    }
}

fn action_row(action: &Action) -> Value {
    json!({
        "type": ACTION_ROW,
        "components": [{
            "type": BUTTON,
            "style": LINK_BUTTON_STYLE,
            "label": action.label,
            "url": action.url,
        }],
    })
}
