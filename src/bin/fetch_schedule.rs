use anyhow::{Context, Result};
use chrono::Utc;

use matchday_tv::config::{self, FetchConfig};
use matchday_tv::logging;
use matchday_tv::schedule_fetch::ScheduleFetcher;

fn main() -> Result<()> {
    config::load_env_files();
    logging::init();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let mut cfg = FetchConfig::from_env().context("invalid fetch configuration")?;
    cfg.apply_args(&args);

    let today = cfg.clock.today(Utc::now());
    let summary = ScheduleFetcher::new(&cfg).run(today);

    println!("Schedule fetch complete");
    for day in &summary.days {
        match &day.path {
            Some(path) => println!(
                "{}: {}/{} matches -> {}",
                day.date,
                day.matches_written,
                day.events_listed,
                path.display()
            ),
            None => println!("{}: nothing written", day.date),
        }
    }
    if summary.blocked {
        println!("Stopped early: provider blocked requests");
    }
    Ok(())
}
