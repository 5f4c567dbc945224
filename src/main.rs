use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;

use matchday_tv::config::{self, BuildConfig};
use matchday_tv::logging;
use matchday_tv::site;

fn main() -> Result<()> {
    config::load_env_files();
    logging::init();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let mut cfg = BuildConfig::from_env().context("invalid build configuration")?;
    cfg.apply_args(&args);

    let summary = site::build_site(&cfg, Utc::now())?;

    info!(
        "shards: {} read, {} skipped; records: {} rejected, {} duplicate(s), {} outside window",
        summary.shards_read,
        summary.shards_skipped,
        summary.records_rejected,
        summary.duplicates_dropped,
        summary.outside_window
    );
    info!(
        "matches: {}; channels: {}; aux payloads joined: {}",
        summary.matches, summary.channels, summary.aux_payloads
    );
    println!(
        "Build complete: {} pages, {} sitemap urls -> {}",
        summary.pages_written,
        summary.sitemap_urls,
        summary.out_dir.display()
    );
    Ok(())
}
