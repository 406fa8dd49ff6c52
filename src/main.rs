use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use piazza_relay::config;
use piazza_relay::db::{self, SqliteWatermarkStore};
use piazza_relay::discord::DiscordWebhook;
use piazza_relay::health;
use piazza_relay::pipeline;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Run a single trigger and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/relay.db", cfg.app.resolved_data_dir()));
    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;
    let store = SqliteWatermarkStore::new(pool);
    let transport = DiscordWebhook::new()?;

    if let Some(addr) = &cfg.app.health_addr {
        let addr: SocketAddr = addr.parse()?;
        tokio::spawn(async move {
            if let Err(err) = health::serve(addr).await {
                error!(?err, "health server stopped");
            }
        });
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(cfg.app.poll_interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(courses = cfg.courses.len(), "starting relay");
    loop {
        ticker.tick().await;
        match pipeline::run_trigger(&cfg, &store, &transport).await {
            Ok(report) => info!(delivered = report.delivered(), "trigger finished"),
            Err(err) => error!(kind = err.kind(), error = %err, "trigger failed"),
        }
        if args.once {
            break;
        }
    }

    Ok(())
}
