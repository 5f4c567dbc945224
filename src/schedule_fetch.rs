use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, NaiveDate};
use isocountry::CountryCode;
use rayon::prelude::*;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::FetchConfig;
use crate::http_client::{Fetched, fetch_json, with_fetch_pool};
use crate::model::{DEFAULT_VENUE, RawBroadcast, RawMatch};
use crate::output::write_atomic;
use crate::time_resolver::day_key;

const UNKNOWN_CHANNEL: &str = "Unknown Channel";
const TBA_CHANNEL: &str = "TBA";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DayFetch {
    pub date: NaiveDate,
    pub events_listed: usize,
    pub matches_written: usize,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ScheduleSummary {
    pub days: Vec<DayFetch>,
    pub blocked: bool,
}

/// Fetches one shard per upcoming day. Channel names are cached for the run.
pub struct ScheduleFetcher<'a> {
    cfg: &'a FetchConfig,
    channel_names: Mutex<HashMap<u64, Option<String>>>,
    blocked: AtomicBool,
}

impl<'a> ScheduleFetcher<'a> {
    pub fn new(cfg: &'a FetchConfig) -> Self {
        Self {
            cfg,
            channel_names: Mutex::new(HashMap::new()),
            blocked: AtomicBool::new(false),
        }
    }

    /// Walks the configured day range starting from `today`, pausing between
    /// days. A provider block ends the run; finished days stay on disk.
    pub fn run(&self, today: NaiveDate) -> ScheduleSummary {
        let mut summary = ScheduleSummary::default();
        let (first, last) = self.cfg.schedule_days;
        for offset in first..=last {
            let date = today + ChronoDuration::days(offset);
            match self.fetch_day(date) {
                Ok(day) => summary.days.push(day),
                Err(err) => warn!("schedule for {date} failed: {err:#}"),
            }
            if self.is_blocked() {
                warn!("provider blocked requests; stopping after {date}");
                summary.blocked = true;
                break;
            }
            if offset < last {
                thread::sleep(self.cfg.day_delay);
            }
        }
        summary
    }

    /// Fetches and writes one day. When the provider blocks partway, only
    /// fully resolved records are merged into the existing shard, so data
    /// from an earlier run is never replaced by an emptier copy.
    pub fn fetch_day(&self, date: NaiveDate) -> Result<DayFetch> {
        let url = format!(
            "{}/sport/football/scheduled-events/{}",
            self.cfg.api_base,
            date.format("%Y-%m-%d")
        );
        let Lookup::Found(listing) = self.get(&url)? else {
            return Ok(DayFetch {
                date,
                ..DayFetch::default()
            });
        };
        let ids = parse_event_ids(&listing);
        if ids.is_empty() {
            info!("no events listed for {date}");
            return Ok(DayFetch {
                date,
                ..DayFetch::default()
            });
        }
        info!("{date}: {} fixture(s), resolving tv data", ids.len());

        let outcomes: Vec<Lookup<RawMatch>> = with_fetch_pool(self.cfg.parallelism, || {
            ids.par_iter()
                .map(|id| {
                    self.fetch_match(*id).unwrap_or_else(|err| {
                        debug!("event {id} skipped: {err:#}");
                        Lookup::Missing
                    })
                })
                .collect()
        });
        let interrupted = outcomes.iter().any(|o| matches!(o, Lookup::Blocked));
        let mut matches: Vec<RawMatch> = outcomes
            .into_iter()
            .filter_map(|o| match o {
                Lookup::Found(record) => Some(record),
                Lookup::Missing | Lookup::Blocked => None,
            })
            .collect();
        matches.sort_by_key(|m| (m.kickoff, m.match_id));

        let path = shard_path(&self.cfg.shard_dir, date);
        if interrupted {
            if matches.is_empty() {
                return Ok(DayFetch {
                    date,
                    events_listed: ids.len(),
                    ..DayFetch::default()
                });
            }
            let existing = read_raw_shard(&path).unwrap_or_else(|err| {
                warn!("replacing unreadable shard {}: {err:#}", path.display());
                Vec::new()
            });
            warn!(
                "{date}: blocked mid-day, merging {} resolved match(es) into {}",
                matches.len(),
                path.display()
            );
            matches = merge_partial_shard(existing, matches);
        }

        write_shard(&path, &matches)?;
        info!("wrote {} match(es) to {}", matches.len(), path.display());
        Ok(DayFetch {
            date,
            events_listed: ids.len(),
            matches_written: matches.len(),
            path: Some(path),
        })
    }

    fn fetch_match(&self, id: u64) -> Result<Lookup<RawMatch>> {
        let url = format!("{}/event/{id}", self.cfg.api_base);
        let event = match self.get(&url)? {
            Lookup::Found(value) => value,
            Lookup::Missing => return Ok(Lookup::Missing),
            Lookup::Blocked => return Ok(Lookup::Blocked),
        };
        let Some(mut record) = parse_event(&event) else {
            return Ok(Lookup::Missing);
        };
        record.tv_channels = match self.fetch_broadcasts(id)? {
            Lookup::Found(broadcasts) => broadcasts,
            Lookup::Missing => Vec::new(),
            Lookup::Blocked => return Ok(Lookup::Blocked),
        };
        Ok(Lookup::Found(record))
    }

    fn fetch_broadcasts(&self, id: u64) -> Result<Lookup<Vec<RawBroadcast>>> {
        let url = format!("{}/tv/event/{id}/country-channels", self.cfg.api_base);
        let value = match self.get(&url)? {
            Lookup::Found(value) => value,
            Lookup::Missing => return Ok(Lookup::Missing),
            Lookup::Blocked => return Ok(Lookup::Blocked),
        };
        let mut out = Vec::new();
        for (code, channel_ids) in parse_country_channels(&value) {
            let mut names: Vec<String> = Vec::new();
            for channel_id in channel_ids {
                match self.channel_name(channel_id) {
                    Lookup::Found(name) if !names.contains(&name) => names.push(name),
                    Lookup::Found(_) | Lookup::Missing => {}
                    Lookup::Blocked => return Ok(Lookup::Blocked),
                }
            }
            if names.is_empty() {
                names.push(TBA_CHANNEL.to_string());
            }
            out.push(RawBroadcast {
                country: country_name(&code),
                channels: names,
            });
        }
        out.sort_by(|a, b| a.country.cmp(&b.country));
        Ok(Lookup::Found(out))
    }

    fn channel_name(&self, channel_id: u64) -> Lookup<String> {
        let cached = self
            .channel_names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&channel_id)
            .cloned();
        if let Some(name) = cached {
            return name.into();
        }
        let url = format!("{}/tv/channel/{channel_id}/schedule", self.cfg.api_base);
        let name = match self.get(&url) {
            Ok(Lookup::Found(value)) => parse_channel_name(&value),
            Ok(Lookup::Missing) => None,
            Ok(Lookup::Blocked) => return Lookup::Blocked,
            Err(err) => {
                debug!("channel {channel_id}: {err:#}");
                return Lookup::Missing;
            }
        };
        self.channel_names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(channel_id, name.clone());
        name.into()
    }

    fn get(&self, url: &str) -> Result<Lookup<Value>> {
        if self.is_blocked() {
            return Ok(Lookup::Blocked);
        }
        match fetch_json(url, self.cfg.timeout)? {
            Fetched::Json(value) => Ok(Lookup::Found(value)),
            Fetched::Blocked(status) => {
                if !self.blocked.swap(true, Ordering::SeqCst) {
                    warn!("{url}: http {status}, halting acquisition");
                }
                Ok(Lookup::Blocked)
            }
            Fetched::Status(status) => {
                debug!("{url}: http {status}");
                Ok(Lookup::Missing)
            }
        }
    }

    fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::SeqCst)
    }
}

/// Outcome of one provider lookup.
#[derive(Debug)]
enum Lookup<T> {
    Found(T),
    /// Nothing usable for this request alone.
    Missing,
    /// The provider refused service; whatever needed this is incomplete.
    Blocked,
}

impl<T> From<Option<T>> for Lookup<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Lookup::Missing, Lookup::Found)
    }
}

pub fn shard_path(shard_dir: &Path, date: NaiveDate) -> PathBuf {
    shard_dir.join(format!("{}.json", day_key(date)))
}

pub fn write_shard(path: &Path, matches: &[RawMatch]) -> Result<()> {
    let body = serde_json::to_vec_pretty(matches).context("serialize shard")?;
    write_atomic(path, &body)
}

/// Records of an existing shard as written, or none when the file is absent.
/// Entries that no longer deserialize are dropped.
pub fn read_raw_shard(path: &Path) -> Result<Vec<RawMatch>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let rows: Vec<Value> =
        serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
    Ok(rows
        .into_iter()
        .filter_map(|row| serde_json::from_value(row).ok())
        .collect())
}

/// Overlays freshly resolved records onto an existing shard by match id.
/// Existing records the fresh set does not cover are kept as they were.
pub fn merge_partial_shard(existing: Vec<RawMatch>, fresh: Vec<RawMatch>) -> Vec<RawMatch> {
    let mut by_id: HashMap<u64, RawMatch> = HashMap::new();
    let mut unkeyed = Vec::new();
    for record in fresh {
        match record.match_id {
            Some(id) => {
                by_id.insert(id, record);
            }
            None => unkeyed.push(record),
        }
    }
    let mut out: Vec<RawMatch> = existing
        .into_iter()
        .map(|old| {
            old.match_id
                .and_then(|id| by_id.remove(&id))
                .unwrap_or(old)
        })
        .collect();
    out.extend(by_id.into_values());
    out.extend(unkeyed);
    out.sort_by_key(|m| (m.kickoff, m.match_id));
    out
}

pub fn parse_event_ids(value: &Value) -> Vec<u64> {
    let Some(events) = value.get("events").and_then(Value::as_array) else {
        return Vec::new();
    };
    let mut ids: Vec<u64> = events
        .iter()
        .filter_map(|e| e.get("id").and_then(Value::as_u64))
        .collect();
    ids.dedup();
    ids
}

/// Builds a shard record from an `event/{id}` payload. Broadcasts are
/// attached separately.
pub fn parse_event(value: &Value) -> Option<RawMatch> {
    let event = value.get("event")?;
    let home = event.get("homeTeam")?.get("name")?.as_str()?;
    let away = event.get("awayTeam")?.get("name")?.as_str()?;
    let tournament = event.get("tournament");
    Some(RawMatch {
        match_id: event.get("id").and_then(Value::as_u64),
        kickoff: event.get("startTimestamp").and_then(Value::as_i64),
        fixture: Some(format!("{} vs {}", home.trim(), away.trim())),
        league_id: tournament
            .and_then(|t| t.get("uniqueTournament"))
            .and_then(|u| u.get("id"))
            .and_then(Value::as_u64),
        league: tournament
            .and_then(|t| t.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string),
        venue: Some(
            event
                .get("venue")
                .and_then(|v| v.get("name"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| DEFAULT_VENUE.to_string()),
        ),
        tv_channels: Vec::new(),
    })
}

/// `countryChannels` as `(country code, channel ids)` pairs.
pub fn parse_country_channels(value: &Value) -> Vec<(String, Vec<u64>)> {
    let Some(map) = value.get("countryChannels").and_then(Value::as_object) else {
        return Vec::new();
    };
    map.iter()
        .map(|(code, ids)| {
            let ids = ids
                .as_array()
                .map(|list| list.iter().filter_map(Value::as_u64).collect())
                .unwrap_or_default();
            (code.clone(), ids)
        })
        .collect()
}

pub fn parse_channel_name(value: &Value) -> Option<String> {
    let name = value.get("channel")?.get("name")?.as_str()?.trim();
    if name.is_empty() || name == UNKNOWN_CHANNEL {
        None
    } else {
        Some(name.to_string())
    }
}

/// Common names for codes whose ISO 3166 name reads awkwardly on a listing.
const SHORT_COUNTRY_NAMES: &[(&str, &str)] = &[
    ("BO", "Bolivia"),
    ("CD", "DR Congo"),
    ("GB", "United Kingdom"),
    ("IR", "Iran"),
    ("KP", "North Korea"),
    ("KR", "South Korea"),
    ("LA", "Laos"),
    ("MD", "Moldova"),
    ("NL", "Netherlands"),
    ("RU", "Russia"),
    ("SY", "Syria"),
    ("TR", "Turkey"),
    ("TW", "Taiwan"),
    ("TZ", "Tanzania"),
    ("US", "United States"),
    ("VE", "Venezuela"),
    ("VN", "Vietnam"),
];

/// English name for an ISO 3166 alpha-2 code. Codes outside the standard
/// (such as `XK`) are returned as given.
pub fn country_name(code: &str) -> String {
    let code = code.trim();
    let upper = code.to_ascii_uppercase();
    if let Some((_, name)) = SHORT_COUNTRY_NAMES.iter().find(|(c, _)| *c == upper) {
        return (*name).to_string();
    }
    match CountryCode::for_alpha2(&upper) {
        Ok(country) => country.name().to_string(),
        Err(_) => code.to_string(),
    }
}
