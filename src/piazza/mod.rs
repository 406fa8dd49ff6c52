use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, SET_COOKIE};
use reqwest::multipart::Form;
use reqwest::{redirect, Client, Url};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::fmt;
use tracing::{debug, info, instrument};

use crate::model::{FeedEntry, PostDetail};
use crate::piazza::model::{ApiEnvelope, ContentResult, FeedResult, UserRecord};

pub mod model;

pub const PIAZZA_BASE: &str = "https://piazza.com/";
pub const DEFAULT_FEED_LIMIT: u32 = 200;

#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_feed(&self, piazza_id: &str) -> Result<Vec<FeedEntry>>;
}

#[async_trait]
pub trait DetailSource: Send + Sync {
    async fn fetch_detail(&self, piazza_id: &str, nr: i64) -> Result<PostDetail>;
}

#[async_trait]
pub trait AuthorSource: Send + Sync {
    async fn fetch_author(&self, piazza_id: &str, user_id: &str) -> Result<String>;
}

/// Unauthenticated client; [`PiazzaClient::login`] turns it into a session.
#[derive(Clone)]
pub struct PiazzaClient {
    http: Client,
    base_url: Url,
}

impl fmt::Debug for PiazzaClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PiazzaClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl PiazzaClient {
    pub fn new(base_url: Url) -> Result<Self> {
        // Login answers with a redirect whose cookies we need, so never follow.
        let http = Client::builder()
            .user_agent("piazza-relay/0.1")
            .redirect(redirect::Policy::none())
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http, base_url })
    }

    /// Fetch a CSRF token, then sign in with the account credentials.
    #[instrument(skip_all)]
    pub async fn login(&self, email: &str, password: &str) -> Result<PiazzaSession> {
        let csrf_url = self
            .base_url
            .join("main/csrf_token")
            .context("invalid Piazza base URL")?;
        let res = self
            .http
            .get(csrf_url)
            .send()
            .await
            .context("failed to reach Piazza for a CSRF token")?;
        if !res.status().is_success() {
            bail!("csrf token request failed: {}", res.status());
        }
        let csrf_cookie = cookie_header(res.headers());
        let body = res.text().await.context("failed to read CSRF response")?;
        let csrf_token = parse_csrf_token(&body)
            .ok_or_else(|| anyhow!("CSRF response carried no token: {body:?}"))?;

        let form = Form::new()
            .text("from", "/signup")
            .text("email", email.to_string())
            .text("password", password.to_string())
            .text("remember", "on")
            .text("csrf_token", csrf_token.clone());
        let login_url = self
            .base_url
            .join("class")
            .context("invalid Piazza base URL")?;
        let res = self
            .http
            .post(login_url)
            .header("cookie", csrf_cookie)
            .multipart(form)
            .send()
            .await
            .context("failed to reach Piazza for login")?;
        let status = res.status();
        if !(status.is_success() || status.is_redirection()) {
            let body = res.text().await.unwrap_or_default();
            bail!("login rejected {}: {}", status, body);
        }
        let cookie = cookie_header(res.headers());
        if cookie.is_empty() {
            bail!("login response set no session cookie");
        }
        info!("logged in to Piazza");

        Ok(PiazzaSession {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            cookie,
            csrf_token,
            feed_limit: DEFAULT_FEED_LIMIT,
        })
    }
}

/// Authenticated handle used for the `logic/api` RPC calls.
#[derive(Clone)]
pub struct PiazzaSession {
    http: Client,
    base_url: Url,
    cookie: String,
    csrf_token: String,
    feed_limit: u32,
}

impl fmt::Debug for PiazzaSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PiazzaSession")
            .field("base_url", &self.base_url)
            .field("feed_limit", &self.feed_limit)
            .finish_non_exhaustive()
    }
}

impl PiazzaSession {
    pub fn with_feed_limit(mut self, limit: u32) -> Self {
        self.feed_limit = limit;
        self
    }

    pub fn cookie(&self) -> &str {
        &self.cookie
    }

    pub fn csrf_token(&self) -> &str {
        &self.csrf_token
    }

    pub fn build_request(&self, method: &str, params: Value) -> Result<reqwest::Request> {
        let mut endpoint = self
            .base_url
            .join("logic/api")
            .context("invalid Piazza base URL")?;
        endpoint.query_pairs_mut().append_pair("method", method);
        self.http
            .post(endpoint)
            .header("cookie", &self.cookie)
            .header("csrf-token", &self.csrf_token)
            .json(&json!({ "method": method, "params": params }))
            .build()
            .context("failed to build Piazza request")
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let request = self.build_request(method, params)?;
        debug!(%method, "piazza rpc");
        let res = self
            .http
            .execute(request)
            .await
            .with_context(|| format!("failed to reach Piazza for {method}"))?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            bail!("{} returned {}: {}", method, status, body);
        }
        let body = res
            .text()
            .await
            .with_context(|| format!("failed to read {method} response"))?;
        let envelope: ApiEnvelope<T> = serde_json::from_str(&body)
            .with_context(|| format!("unexpected {method} response shape"))?;
        if let Some(err) = envelope.error {
            bail!("{} failed: {}", method, err);
        }
        envelope
            .result
            .ok_or_else(|| anyhow!("{method} response had no result"))
    }
}

#[async_trait]
impl FeedSource for PiazzaSession {
    #[instrument(skip_all, fields(piazza_id = %piazza_id))]
    async fn fetch_feed(&self, piazza_id: &str) -> Result<Vec<FeedEntry>> {
        let result: FeedResult = self
            .call(
                "network.get_my_feed",
                json!({ "nid": piazza_id, "offset": 0, "limit": self.feed_limit }),
            )
            .await?;
        Ok(result.feed)
    }
}

#[async_trait]
impl DetailSource for PiazzaSession {
    #[instrument(skip_all, fields(piazza_id = %piazza_id, nr = nr))]
    async fn fetch_detail(&self, piazza_id: &str, nr: i64) -> Result<PostDetail> {
        let result: ContentResult = self
            .call("content.get", json!({ "cid": nr, "nid": piazza_id }))
            .await?;
        let latest = result
            .history
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("post @{nr} has no revisions"))?;
        Ok(latest.into())
    }
}

#[async_trait]
impl AuthorSource for PiazzaSession {
    #[instrument(skip_all, fields(piazza_id = %piazza_id))]
    async fn fetch_author(&self, piazza_id: &str, user_id: &str) -> Result<String> {
        let users: Vec<UserRecord> = self
            .call(
                "network.get_users",
                json!({ "ids": [user_id], "nid": piazza_id }),
            )
            .await?;
        users
            .into_iter()
            .next()
            .map(|u| u.name)
            .ok_or_else(|| anyhow!("user {user_id} not found"))
    }
}

/// The token is the first double-quoted string, e.g. `CTFTOKEN = "abc";`.
fn parse_csrf_token(body: &str) -> Option<String> {
    body.split('"')
        .nth(1)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// `name=value` of every `Set-Cookie`, joined for a `cookie` request header.
fn cookie_header(headers: &HeaderMap) -> String {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .collect::<Vec<_>>()
        .join("; ")
}
