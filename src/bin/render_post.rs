use anyhow::{Context, Result};
use clap::Parser;
use reqwest::Url;
use std::path::PathBuf;

use piazza_relay::compose::{compose, post_url};
use piazza_relay::discord;
use piazza_relay::model::{FeedEntry, PostDetail, PostKind};
use piazza_relay::normalize::Normalizer;
use piazza_relay::piazza::PIAZZA_BASE;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Print the webhook payload a post body would be announced with"
)]
struct Args {
    /// File holding the raw post body (HTML or <md>…</md>)
    file: PathBuf,

    #[arg(long, default_value = "Untitled")]
    subject: String,

    /// Post kind: note or question
    #[arg(long, default_value = "note")]
    kind: String,

    /// Folder name; repeat for several
    #[arg(long = "folder")]
    folders: Vec<String>,

    /// Author display name; omitted means anonymous
    #[arg(long)]
    author: Option<String>,

    #[arg(long, default_value = PIAZZA_BASE)]
    base_url: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let body = std::fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let origin = Url::parse(&args.base_url).context("invalid --base-url")?;

    let post = FeedEntry {
        nr: 1,
        kind: PostKind::parse_kind(&args.kind),
        subject: args.subject.clone(),
        tags: vec![],
        folders: args.folders.clone(),
        status: "active".into(),
    };
    let detail = PostDetail {
        author: None,
        subject: args.subject,
        body,
    };

    let normalizer = Normalizer::piazza(origin);
    let normalized = normalizer.normalize(&detail.body)?;
    let url = post_url(normalizer.origin().as_str(), "preview", post.nr);
    let message = compose(&post, &detail, &normalized, args.author.as_deref(), &url);

    println!("{}", serde_json::to_string_pretty(&discord::payload(&message))?);
    Ok(())
}
