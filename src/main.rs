use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use feedcast::config::Config;
use feedcast::pipeline::Pipeline;
use feedcast::storage::Database;

#[derive(Parser, Debug)]
#[command(
    name = "feedcast",
    version,
    about = "Repost new feed entries with full content to a social-media endpoint"
)]
struct Args {
    /// Profile to run (a [profiles.<name>] table in the config file)
    profile: String,

    /// Path to the config file
    #[arg(long, env = "FEEDCAST_CONFIG", default_value = "feedcast.toml")]
    config: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("feedcast=info")),
        )
        .init();

    let args = Args::parse();

    let config = Config::load(&args.config, &args.profile).with_context(|| {
        format!(
            "Failed to load profile '{}' from {}",
            args.profile,
            args.config.display()
        )
    })?;
    tracing::debug!(config = ?config, "Resolved configuration");

    let db_path = config
        .database
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?
        .to_string();
    let db = Database::open(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path))?;

    let pipeline = Pipeline::new(config, db)?;
    let report = pipeline.run().await?;
    tracing::debug!(report = ?report, "Pipeline finished");

    Ok(())
}
