use std::collections::BTreeSet;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Duration as ChronoDuration;

use crate::index::{SecondaryKey, SortPolicy};
use crate::merge::MergeWindow;
use crate::time_resolver::{LocalClock, MAX_OFFSET_HOURS, MIN_OFFSET_HOURS};

pub const DEFAULT_SITE_URL: &str = "https://tv.cricfoot.net";
pub const DEFAULT_API_BASE: &str = "https://api.sofascore.com/api/v1";

/// Everything one static build needs, resolved up front.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub site_url: String,
    pub clock: LocalClock,
    pub sort: SortPolicy,
    pub channel_retention: ChronoDuration,
    pub listing_days_before: i64,
    pub listing_days_after: i64,
    pub merge_window: MergeWindow,
    pub shard_dir: PathBuf,
    pub aux_dir: PathBuf,
    pub template_dir: PathBuf,
    pub out_dir: PathBuf,
    /// Wipe generated trees before writing. When off, only pages missing
    /// from the new sitemap are deleted.
    pub clean_output: bool,
}

impl BuildConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| non_empty(lookup(key));

        let offset_hours = get("UTC_OFFSET_HOURS")
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .unwrap_or(0.0)
            .clamp(MIN_OFFSET_HOURS, MAX_OFFSET_HOURS);
        let secondary = match get("LEAGUE_SORT") {
            Some(raw) => SecondaryKey::parse(&raw)?,
            None => SecondaryKey::default(),
        };
        let merge_window = match get("MERGE_WINDOW") {
            Some(raw) => MergeWindow::parse(&raw)?,
            None => MergeWindow::All,
        };

        Ok(Self {
            site_url: get("SITE_URL")
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_SITE_URL.to_string()),
            clock: LocalClock::from_hours(offset_hours).context("UTC_OFFSET_HOURS")?,
            sort: SortPolicy {
                priority_leagues: get("PRIORITY_LEAGUE_IDS")
                    .map(|raw| parse_ids(&raw))
                    .unwrap_or_default(),
                secondary,
            },
            channel_retention: ChronoDuration::hours(
                parse_or(get("CHANNEL_RETENTION_HOURS"), 24_i64).clamp(0, 24 * 365),
            ),
            listing_days_before: parse_or(get("LISTING_DAYS_BEFORE"), 1_i64).clamp(0, 30),
            listing_days_after: parse_or(get("LISTING_DAYS_AFTER"), 1_i64).clamp(0, 30),
            merge_window,
            shard_dir: get("SHARD_DIR").map(PathBuf::from).unwrap_or_else(|| "date".into()),
            aux_dir: get("AUX_DIR").map(PathBuf::from).unwrap_or_else(|| "data".into()),
            template_dir: get("TEMPLATE_DIR").map(PathBuf::from).unwrap_or_else(|| ".".into()),
            out_dir: get("OUT_DIR").map(PathBuf::from).unwrap_or_else(|| "dist".into()),
            clean_output: get("CLEAN_OUTPUT").map(|v| parse_bool(&v)).unwrap_or(true),
        })
    }

    /// Applies `--shard-dir=`, `--aux-dir=`, `--template-dir=`, `--out-dir=`
    /// and `--site-url=` overrides.
    pub fn apply_args(&mut self, args: &[String]) {
        if let Some(dir) = arg_value(args, "shard-dir") {
            self.shard_dir = dir.into();
        }
        if let Some(dir) = arg_value(args, "aux-dir") {
            self.aux_dir = dir.into();
        }
        if let Some(dir) = arg_value(args, "template-dir") {
            self.template_dir = dir.into();
        }
        if let Some(dir) = arg_value(args, "out-dir") {
            self.out_dir = dir.into();
        }
        if let Some(url) = arg_value(args, "site-url") {
            self.site_url = url.trim_end_matches('/').to_string();
        }
    }
}

/// Settings shared by the two acquisition tools.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub api_base: String,
    pub shard_dir: PathBuf,
    pub aux_dir: PathBuf,
    pub clock: LocalClock,
    /// Schedule days fetched, as offsets from today (inclusive).
    pub schedule_days: (i64, i64),
    /// Shard days scanned for auxiliary data, as offsets from today (inclusive).
    pub aux_days: (i64, i64),
    pub parallelism: usize,
    pub request_delay: Duration,
    pub day_delay: Duration,
    pub timeout: Duration,
}

impl FetchConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| non_empty(lookup(key));
        let offset_hours = get("UTC_OFFSET_HOURS")
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .unwrap_or(0.0)
            .clamp(MIN_OFFSET_HOURS, MAX_OFFSET_HOURS);
        let schedule_ahead = parse_or(get("SCHEDULE_DAYS_AHEAD"), 7_i64).clamp(1, 14);
        let aux_ahead = parse_or(get("AUX_DAYS_AHEAD"), 3_i64).clamp(0, 14);

        Ok(Self {
            api_base: get("API_BASE")
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            shard_dir: get("SHARD_DIR").map(PathBuf::from).unwrap_or_else(|| "date".into()),
            aux_dir: get("AUX_DIR").map(PathBuf::from).unwrap_or_else(|| "data".into()),
            clock: LocalClock::from_hours(offset_hours).context("UTC_OFFSET_HOURS")?,
            schedule_days: (1, schedule_ahead),
            aux_days: (0, aux_ahead),
            parallelism: parse_or(get("FETCH_PARALLELISM"), 6_usize).clamp(2, 32),
            request_delay: Duration::from_millis(
                parse_or(get("FETCH_DELAY_MS"), 500_u64).min(60_000),
            ),
            day_delay: Duration::from_millis(parse_or(get("FETCH_DAY_DELAY_MS"), 2_000_u64).min(60_000)),
            timeout: Duration::from_secs(parse_or(get("FETCH_TIMEOUT_SECS"), 5_u64).clamp(1, 120)),
        })
    }

    pub fn apply_args(&mut self, args: &[String]) {
        if let Some(dir) = arg_value(args, "shard-dir") {
            self.shard_dir = dir.into();
        }
        if let Some(dir) = arg_value(args, "aux-dir") {
            self.aux_dir = dir.into();
        }
        if let Some(days) = arg_value(args, "days").and_then(|v| v.parse::<i64>().ok()) {
            self.schedule_days.1 = days.clamp(1, 14);
            self.aux_days.1 = days.clamp(0, 14);
        }
    }
}

/// Loads `.env.local` then `.env`; variables already set are kept.
pub fn load_env_files() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
}

/// Finds `--key=value` or `--key value` in `args`.
pub fn arg_value(args: &[String], key: &str) -> Option<String> {
    let flag = format!("--{key}");
    let prefix = format!("{flag}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&prefix) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if *arg == flag
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
            && !next.starts_with("--")
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

/// Numeric ids separated by commas, semicolons or spaces. Junk is skipped.
pub fn parse_ids(raw: &str) -> BTreeSet<u64> {
    raw.split([',', ';', ' '])
        .filter_map(|part| part.trim().parse::<u64>().ok())
        .filter(|id| *id != 0)
        .collect()
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|v| v.trim().parse::<T>().ok()).unwrap_or(default)
}

fn parse_bool(raw: &str) -> bool {
    !matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn build_config(vars: &[(&str, &str)]) -> Result<BuildConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        BuildConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = build_config(&[]).expect("config");
        assert_eq!(cfg.site_url, DEFAULT_SITE_URL);
        assert_eq!(cfg.clock, LocalClock::utc());
        assert_eq!(cfg.sort.secondary, SecondaryKey::LeagueName);
        assert_eq!(cfg.channel_retention, ChronoDuration::hours(24));
        assert_eq!((cfg.listing_days_before, cfg.listing_days_after), (1, 1));
        assert_eq!(cfg.merge_window, MergeWindow::All);
        assert_eq!(cfg.out_dir, PathBuf::from("dist"));
        assert!(cfg.clean_output);
    }

    #[test]
    fn values_are_parsed_and_clamped() {
        let cfg = build_config(&[
            ("SITE_URL", "https://tv.example/"),
            ("UTC_OFFSET_HOURS", "99"),
            ("PRIORITY_LEAGUE_IDS", "17; 8,x 0"),
            ("LEAGUE_SORT", "match_id"),
            ("MERGE_WINDOW", "days:1:3"),
            ("CLEAN_OUTPUT", "off"),
        ])
        .expect("config");
        assert_eq!(cfg.site_url, "https://tv.example");
        assert_eq!(cfg.clock.offset().local_minus_utc(), 14 * 3600);
        assert_eq!(cfg.sort.priority_leagues.iter().copied().collect::<Vec<_>>(), vec![8, 17]);
        assert_eq!(cfg.sort.secondary, SecondaryKey::MatchId);
        assert_eq!(cfg.merge_window, MergeWindow::Days { before: 1, after: 3 });
        assert!(!cfg.clean_output);
    }

    #[test]
    fn bad_sort_key_is_an_error() {
        assert!(build_config(&[("LEAGUE_SORT", "kickoff")]).is_err());
    }

    #[test]
    fn args_override_directories() {
        let mut cfg = build_config(&[]).expect("config");
        let args = vec![
            "--out-dir=public".to_string(),
            "--shard-dir".to_string(),
            "shards".to_string(),
        ];
        cfg.apply_args(&args);
        assert_eq!(cfg.out_dir, PathBuf::from("public"));
        assert_eq!(cfg.shard_dir, PathBuf::from("shards"));
        assert_eq!(cfg.template_dir, PathBuf::from("."));
    }
}
