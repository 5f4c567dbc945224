use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveDateTime, Utc};
use tracing::{debug, warn};

use crate::merge::Dataset;
use crate::model::{MatchRecord, slug_or};
use crate::sitemap::SitemapSet;
use crate::time_resolver::{LocalClock, day_key};

/// Location of one generated page, relative to the output root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PagePath {
    dir: String,
}

impl PagePath {
    pub fn root() -> Self {
        Self { dir: String::new() }
    }

    pub fn detail(slug: &str, day: NaiveDate) -> Self {
        Self {
            dir: format!("match/{slug}/{}", day_key(day)),
        }
    }

    pub fn channel(slug: &str) -> Self {
        Self {
            dir: format!("channel/{slug}"),
        }
    }

    pub fn day(day: NaiveDate) -> Self {
        Self {
            dir: format!("day/{}", day_key(day)),
        }
    }

    /// Site-relative link, always with a trailing slash.
    pub fn href(&self) -> String {
        if self.dir.is_empty() {
            "/".to_string()
        } else {
            format!("/{}/", self.dir)
        }
    }

    pub fn url(&self, site_url: &str) -> String {
        format!("{}{}", site_url.trim_end_matches('/'), self.href())
    }

    pub fn file_in(&self, out_dir: &Path) -> PathBuf {
        let mut path = out_dir.to_path_buf();
        for part in self.dir.split('/').filter(|p| !p.is_empty()) {
            path.push(part);
        }
        path.push("index.html");
        path
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecondaryKey {
    #[default]
    LeagueName,
    MatchId,
}

impl SecondaryKey {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "name" | "league" | "league_name" => Ok(SecondaryKey::LeagueName),
            "id" | "match_id" => Ok(SecondaryKey::MatchId),
            other => Err(anyhow!("unknown league sort {other:?} (expected name or match_id)")),
        }
    }
}

/// Ordering of matches within one local day.
#[derive(Debug, Clone, Default)]
pub struct SortPolicy {
    pub priority_leagues: BTreeSet<u64>,
    pub secondary: SecondaryKey,
}

impl SortPolicy {
    /// League names that hold at least one record with a priority league id.
    /// Every record under such a name ranks as priority, so a league whose
    /// id is missing on some records still forms one group.
    pub fn promoted_leagues<'r>(&self, records: &'r [MatchRecord]) -> HashSet<&'r str> {
        records
            .iter()
            .filter(|r| r.league_id.is_some_and(|id| self.priority_leagues.contains(&id)))
            .map(|r| r.league.as_str())
            .collect()
    }

    pub fn is_priority(&self, record: &MatchRecord, promoted: &HashSet<&str>) -> bool {
        record
            .league_id
            .is_some_and(|id| self.priority_leagues.contains(&id))
            || promoted.contains(record.league.as_str())
    }

    pub fn compare(&self, a: &MatchRecord, b: &MatchRecord, promoted: &HashSet<&str>) -> Ordering {
        let secondary = || match self.secondary {
            SecondaryKey::LeagueName => a.league.cmp(&b.league),
            SecondaryKey::MatchId => a
                .provider_id
                .unwrap_or(u64::MAX)
                .cmp(&b.provider_id.unwrap_or(u64::MAX)),
        };
        // Priority leagues first: `false` sorts ahead of `true`.
        (!self.is_priority(a, promoted))
            .cmp(&!self.is_priority(b, promoted))
            .then_with(secondary)
            .then_with(|| a.kickoff.cmp(&b.kickoff))
            .then_with(|| a.key.cmp(&b.key))
    }
}

#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub site_url: String,
    pub now: DateTime<Utc>,
    pub today: NaiveDate,
    pub channel_retention: ChronoDuration,
    pub listing_days_before: i64,
    pub listing_days_after: i64,
}

/// A canonical record with its local time and detail page resolved once.
#[derive(Debug, Clone)]
pub struct Scheduled<'a> {
    pub record: &'a MatchRecord,
    pub local: NaiveDateTime,
    pub page: PagePath,
}

impl Scheduled<'_> {
    pub fn date(&self) -> NaiveDate {
        self.local.date()
    }
}

#[derive(Debug, Clone)]
pub struct DayEntry<'a> {
    pub item: Scheduled<'a>,
    /// True when this entry opens a new league group in display order.
    pub league_header: bool,
}

#[derive(Debug, Clone)]
pub struct DayBucket<'a> {
    pub date: NaiveDate,
    pub entries: Vec<DayEntry<'a>>,
}

#[derive(Debug, Clone)]
pub struct ChannelEntry<'a> {
    pub name: String,
    pub slug: String,
    pub page: PagePath,
    pub matches: Vec<Scheduled<'a>>,
}

#[derive(Debug, Clone)]
pub struct ListingPage {
    pub date: NaiveDate,
    pub offset_days: i64,
    pub page: PagePath,
}

#[derive(Debug, Default)]
pub struct SiteIndex<'a> {
    pub listings: Vec<ListingPage>,
    pub days: BTreeMap<NaiveDate, DayBucket<'a>>,
    pub details: Vec<Scheduled<'a>>,
    pub channels: Vec<ChannelEntry<'a>>,
    pub urls: SitemapSet,
}

impl<'a> SiteIndex<'a> {
    pub fn day(&self, date: NaiveDate) -> Option<&DayBucket<'a>> {
        self.days.get(&date)
    }

    pub fn channel(&self, slug: &str) -> Option<&ChannelEntry<'a>> {
        self.channels.iter().find(|c| c.slug == slug)
    }
}

/// Orders a dataset by local day, then by the sort policy.
pub fn schedule<'a>(
    dataset: &'a Dataset,
    clock: &LocalClock,
    policy: &SortPolicy,
) -> Vec<Scheduled<'a>> {
    let mut items: Vec<Scheduled<'a>> = dataset
        .records()
        .iter()
        .map(|record| {
            let local = clock.localize(record.kickoff);
            Scheduled {
                record,
                local,
                page: PagePath::detail(&record.slug, local.date()),
            }
        })
        .collect();
    let promoted = policy.promoted_leagues(dataset.records());
    items.sort_by(|a, b| {
        a.date()
            .cmp(&b.date())
            .then_with(|| policy.compare(a.record, b.record, &promoted))
    });
    items
}

/// Marks where a league header goes by comparing each entry's day and league
/// with the entry before it. Only meaningful on input already ordered by
/// [`schedule`]; any other order yields repeated headers.
pub fn league_headers(items: &[Scheduled<'_>]) -> Vec<bool> {
    let mut prev: Option<(NaiveDate, &str)> = None;
    items
        .iter()
        .map(|item| {
            let current = (item.date(), item.record.league.as_str());
            let header = prev != Some(current);
            prev = Some(current);
            header
        })
        .collect()
}

/// Builds every view of the dataset in one pass: day buckets, detail pages,
/// the channel reverse index and the sitemap URL set.
pub fn build_index<'a>(
    dataset: &'a Dataset,
    clock: &LocalClock,
    policy: &SortPolicy,
    opts: &IndexOptions,
) -> SiteIndex<'a> {
    let site = opts.site_url.as_str();
    let mut index = SiteIndex::default();

    for offset in -opts.listing_days_before.max(0)..=opts.listing_days_after.max(0) {
        let date = opts.today + ChronoDuration::days(offset);
        let page = if offset == 0 {
            PagePath::root()
        } else {
            PagePath::day(date)
        };
        index.urls.insert(page.url(site));
        index.listings.push(ListingPage {
            date,
            offset_days: offset,
            page,
        });
    }

    let items = schedule(dataset, clock, policy);
    let headers = league_headers(&items);
    let retention_cutoff = opts.now - opts.channel_retention;
    let mut detail_pages: HashSet<PagePath> = HashSet::new();
    let mut channels: BTreeMap<String, ChannelEntry<'a>> = BTreeMap::new();

    for (item, league_header) in items.into_iter().zip(headers) {
        let record = item.record;
        let date = item.date();

        index
            .days
            .entry(date)
            .or_insert_with(|| DayBucket {
                date,
                entries: Vec::new(),
            })
            .entries
            .push(DayEntry {
                item: item.clone(),
                league_header,
            });

        if detail_pages.insert(item.page.clone()) {
            index.urls.insert(item.page.url(site));
            index.details.push(item.clone());
        } else {
            warn!(
                "{} ({}) shares detail page {} with an earlier match",
                record.fixture,
                record.key,
                item.page.href()
            );
        }

        let retained = record.kickoff.utc() >= retention_cutoff;
        for name in record.channel_names() {
            let slug = slug_or(name, "channel");
            let entry = channels.entry(slug.clone()).or_insert_with(|| {
                let page = PagePath::channel(&slug);
                index.urls.insert(page.url(site));
                ChannelEntry {
                    name: name.to_string(),
                    slug: slug.clone(),
                    page,
                    matches: Vec::new(),
                }
            });
            if entry.name != name {
                debug!("channel {name:?} folded into {:?}", entry.name);
            }
            let already_listed = entry
                .matches
                .last()
                .is_some_and(|last| last.record.key == record.key);
            if retained && !already_listed {
                entry.matches.push(item.clone());
            }
        }
    }

    index.channels = channels
        .into_values()
        .map(|mut channel| {
            channel
                .matches
                .sort_by(|a, b| a.record.kickoff.cmp(&b.record.kickoff));
            channel
        })
        .collect();
    index
}
