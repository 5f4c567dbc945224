use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{Duration as ChronoDuration, NaiveDate};
use rayon::prelude::*;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::aux_data::{AuxKind, day_file_path, read_day_file};
use crate::config::FetchConfig;
use crate::http_client::{Fetched, fetch_json, with_fetch_pool};
use crate::merge::merge;
use crate::output::write_atomic;
use crate::schedule_fetch::shard_path;
use crate::shard::load_shard_file;
use crate::time_resolver::day_key;

pub fn endpoint_path(kind: AuxKind) -> &'static str {
    match kind {
        AuxKind::HeadToHead => "h2h",
        AuxKind::Lineups => "lineups",
        AuxKind::Statistics => "statistics",
        AuxKind::Odds => "provider/1/winning-odds",
        AuxKind::Form => "pregame-form",
    }
}

/// Spaces requests at least `delay` apart across every worker thread.
#[derive(Debug)]
pub struct Pacer {
    delay: Duration,
    next: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            next: Mutex::new(None),
        }
    }

    pub fn wait(&self) {
        if self.delay.is_zero() {
            return;
        }
        let sleep_for = {
            let mut next = self.next.lock().unwrap_or_else(PoisonError::into_inner);
            let now = Instant::now();
            let slot = next.map_or(now, |n| n.max(now));
            *next = Some(slot + self.delay);
            slot.saturating_duration_since(now)
        };
        if !sleep_for.is_zero() {
            thread::sleep(sleep_for);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuxFetchSummary {
    pub shards_scanned: usize,
    pub requests: usize,
    pub stored: usize,
    pub already_present: usize,
    pub failed: usize,
    pub files_written: usize,
    pub blocked: bool,
}

pub struct AuxFetcher<'a> {
    cfg: &'a FetchConfig,
    pacer: Pacer,
    blocked: AtomicBool,
    requests: AtomicUsize,
    failed: AtomicUsize,
}

impl<'a> AuxFetcher<'a> {
    pub fn new(cfg: &'a FetchConfig) -> Self {
        Self {
            cfg,
            pacer: Pacer::new(cfg.request_delay),
            blocked: AtomicBool::new(false),
            requests: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    /// One acquisition pass. Ids already present in a day file are skipped,
    /// so a pass stopped by the provider resumes where it left off.
    pub fn run(&self, today: NaiveDate) -> Result<AuxFetchSummary> {
        let mut summary = AuxFetchSummary::default();
        let (ids_by_day, scanned) = self.collect_ids(today);
        summary.shards_scanned = scanned;

        'kinds: for kind in AuxKind::ALL {
            for (day, ids) in &ids_by_day {
                let day = day_key(*day);
                let path = day_file_path(&self.cfg.aux_dir, kind, &day);
                let mut stored = if path.exists() {
                    read_day_file(&path).unwrap_or_else(|err| {
                        warn!("rewriting {}: {err:#}", path.display());
                        Map::new()
                    })
                } else {
                    Map::new()
                };

                let pending: Vec<u64> = ids
                    .iter()
                    .copied()
                    .filter(|id| !stored.contains_key(&id.to_string()))
                    .collect();
                summary.already_present += ids.len() - pending.len();
                if pending.is_empty() {
                    continue;
                }

                let fetched = self.fetch_batch(kind, &pending);
                let added = fetched.len();
                for (id, value) in fetched {
                    stored.insert(id.to_string(), value);
                }
                if added > 0 {
                    let body = serde_json::to_vec(&Value::Object(stored))?;
                    write_atomic(&path, &body)?;
                    summary.files_written += 1;
                    summary.stored += added;
                    debug!("{}: +{added}", path.display());
                }
                if self.blocked.load(Ordering::SeqCst) {
                    summary.blocked = true;
                    break 'kinds;
                }
            }
        }

        summary.requests = self.requests.load(Ordering::SeqCst);
        summary.failed = self.failed.load(Ordering::SeqCst);
        info!(
            "aux pass: {} request(s), {} stored, {} already present",
            summary.requests, summary.stored, summary.already_present
        );
        Ok(summary)
    }

    /// Provider ids from the shard window, grouped by the local day that
    /// the site build will look them up under.
    fn collect_ids(&self, today: NaiveDate) -> (BTreeMap<NaiveDate, Vec<u64>>, usize) {
        let (first, last) = self.cfg.aux_days;
        let mut records = Vec::new();
        let mut scanned = 0;
        for offset in first..=last {
            let path = shard_path(&self.cfg.shard_dir, today + ChronoDuration::days(offset));
            if !path.exists() {
                continue;
            }
            match load_shard_file(&path) {
                Ok(parsed) => {
                    scanned += 1;
                    records.extend(parsed.records);
                }
                Err(err) => warn!("skipping shard {}: {err:#}", path.display()),
            }
        }

        let mut by_day: BTreeMap<NaiveDate, Vec<u64>> = BTreeMap::new();
        for record in merge(records).records() {
            if let Some(id) = record.provider_id {
                by_day
                    .entry(self.cfg.clock.local_date(record.kickoff))
                    .or_default()
                    .push(id);
            }
        }
        (by_day, scanned)
    }

    fn fetch_batch(&self, kind: AuxKind, ids: &[u64]) -> Vec<(u64, Value)> {
        with_fetch_pool(self.cfg.parallelism, || {
            ids.par_iter()
                .filter_map(|id| self.fetch_one(kind, *id).map(|value| (*id, value)))
                .collect()
        })
    }

    fn fetch_one(&self, kind: AuxKind, id: u64) -> Option<Value> {
        if self.blocked.load(Ordering::SeqCst) {
            return None;
        }
        self.pacer.wait();
        if self.blocked.load(Ordering::SeqCst) {
            return None;
        }
        self.requests.fetch_add(1, Ordering::SeqCst);
        let url = format!("{}/event/{id}/{}", self.cfg.api_base, endpoint_path(kind));
        match fetch_json(&url, self.cfg.timeout) {
            Ok(Fetched::Json(value)) => Some(value),
            Ok(Fetched::Blocked(status)) => {
                if !self.blocked.swap(true, Ordering::SeqCst) {
                    warn!("http {status} from provider; stopping early to keep progress");
                }
                None
            }
            Ok(Fetched::Status(status)) => {
                debug!("{url}: http {status}");
                self.failed.fetch_add(1, Ordering::SeqCst);
                None
            }
            Err(err) => {
                debug!("{url}: {err:#}");
                self.failed.fetch_add(1, Ordering::SeqCst);
                None
            }
        }
    }
}
