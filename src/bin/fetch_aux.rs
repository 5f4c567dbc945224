use anyhow::{Context, Result};
use chrono::Utc;

use matchday_tv::aux_fetch::AuxFetcher;
use matchday_tv::config::{self, FetchConfig};
use matchday_tv::logging;

fn main() -> Result<()> {
    config::load_env_files();
    logging::init();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let mut cfg = FetchConfig::from_env().context("invalid fetch configuration")?;
    cfg.apply_args(&args);

    let today = cfg.clock.today(Utc::now());
    let summary = AuxFetcher::new(&cfg).run(today)?;

    println!("Aux fetch complete");
    println!("Shards scanned: {}", summary.shards_scanned);
    println!(
        "Requests: {} (stored {}, failed {}, already present {})",
        summary.requests, summary.stored, summary.failed, summary.already_present
    );
    println!("Files written: {}", summary.files_written);
    if summary.blocked {
        println!("Stopped early: provider blocked requests; rerun to resume");
    }
    Ok(())
}
