mod config;
mod error;
mod github;
mod output;
mod stats;
mod svg;
mod template;

use anyhow::{Context, Result};
use config::Config;
use output::Layout;
use reqwest::Client;
use stats::Stats;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    // Configuration first: nothing touches disk or network without credentials
    let config = Config::from_env()?;
    let layout = Layout::default();

    output::ensure_output_directory(&layout)?;
    output::check_permissions(&layout)?;

    let http = Client::builder()
        .build()
        .context("Failed to build HTTP client")?;
    let stats = Stats::new(&config, http);

    tracing::info!(
        user = %config.user,
        excluded_repos = config.excluded_repos.len(),
        excluded_langs = config.excluded_langs.len(),
        ignore_forked_repos = config.ignore_forked_repos,
        "generating badges"
    );

    tokio::try_join!(
        svg::render_languages(&stats, &layout),
        svg::render_overview(&stats, &layout)
    )?;

    tracing::info!("all badges generated");
    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}
