use std::fmt;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Kickoff values above this are taken to be milliseconds since the epoch.
pub const MILLIS_THRESHOLD: i64 = 10_000_000_000;

pub const DEFAULT_LEAGUE: &str = "Football";
pub const DEFAULT_VENUE: &str = "TBA";
pub const FALLBACK_PARTICIPANTS: (&str, &str) = ("Home", "Away");

const PARTICIPANT_SEPARATORS: &[&str] = &[" vs ", " vs. ", " v ", " - "];

/// One record as it appears in a day shard. Field handling is lenient; the
/// strict checks happen in [`MatchRecord::from_raw`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawMatch {
    #[serde(default, alias = "id", deserialize_with = "id_or_none")]
    pub match_id: Option<u64>,
    #[serde(default, deserialize_with = "timestamp_or_none")]
    pub kickoff: Option<i64>,
    #[serde(default, deserialize_with = "string_or_none")]
    pub fixture: Option<String>,
    #[serde(default, deserialize_with = "id_or_none")]
    pub league_id: Option<u64>,
    #[serde(default, deserialize_with = "string_or_none")]
    pub league: Option<String>,
    #[serde(default, deserialize_with = "string_or_none")]
    pub venue: Option<String>,
    #[serde(default, alias = "broadcasts", deserialize_with = "vec_or_default")]
    pub tv_channels: Vec<RawBroadcast>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawBroadcast {
    #[serde(default, deserialize_with = "string_or_default")]
    pub country: String,
    #[serde(default, deserialize_with = "vec_or_default")]
    pub channels: Vec<String>,
}

/// A kickoff instant, always in whole seconds and always representable as a
/// calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Kickoff(DateTime<Utc>);

impl Kickoff {
    pub fn from_raw(raw: i64) -> Option<Self> {
        DateTime::from_timestamp(normalize_epoch(raw), 0).map(Self)
    }

    pub fn timestamp(&self) -> i64 {
        self.0.timestamp()
    }

    pub fn utc(&self) -> DateTime<Utc> {
        self.0
    }
}

pub fn normalize_epoch(raw: i64) -> i64 {
    if raw > MILLIS_THRESHOLD {
        raw / 1000
    } else {
        raw
    }
}

/// Stable identity of a fixture across shards.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchKey {
    Provider(u64),
    Composite { title: String, kickoff: i64 },
}

impl fmt::Display for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchKey::Provider(id) => write!(f, "{id}"),
            MatchKey::Composite { title, kickoff } => write!(f, "{title}@{kickoff}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Broadcast {
    pub country: String,
    pub channels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRecord {
    pub key: MatchKey,
    pub provider_id: Option<u64>,
    pub kickoff: Kickoff,
    pub fixture: String,
    pub home: String,
    pub away: String,
    pub league: String,
    pub league_id: Option<u64>,
    pub venue: String,
    pub broadcasts: Vec<Broadcast>,
    pub slug: String,
}

impl MatchRecord {
    pub fn from_raw(raw: RawMatch) -> Result<Self> {
        let fixture = raw
            .fixture
            .as_deref()
            .and_then(non_empty)
            .ok_or_else(|| anyhow!("record has no fixture title"))?
            .to_string();
        let kickoff = raw
            .kickoff
            .ok_or_else(|| anyhow!("{fixture}: record has no kickoff"))
            .and_then(|k| {
                Kickoff::from_raw(k).ok_or_else(|| anyhow!("{fixture}: kickoff {k} out of range"))
            })?;

        let key = match raw.match_id {
            Some(id) => MatchKey::Provider(id),
            None => MatchKey::Composite {
                title: normalize_title(&fixture),
                kickoff: kickoff.timestamp(),
            },
        };
        let (home, away) = split_participants(&fixture);

        let broadcasts = raw
            .tv_channels
            .into_iter()
            .filter_map(|b| {
                let channels: Vec<String> = b
                    .channels
                    .iter()
                    .filter_map(|c| non_empty(c).map(str::to_string))
                    .collect();
                if channels.is_empty() {
                    return None;
                }
                Some(Broadcast {
                    country: non_empty(&b.country).unwrap_or("International").to_string(),
                    channels,
                })
            })
            .collect();

        Ok(Self {
            key,
            provider_id: raw.match_id,
            kickoff,
            slug: slug_or(&fixture, "match"),
            home,
            away,
            league: raw
                .league
                .as_deref()
                .and_then(non_empty)
                .unwrap_or(DEFAULT_LEAGUE)
                .to_string(),
            league_id: raw.league_id,
            venue: raw
                .venue
                .as_deref()
                .and_then(non_empty)
                .unwrap_or(DEFAULT_VENUE)
                .to_string(),
            broadcasts,
            fixture,
        })
    }

    /// Every channel name in broadcast order, each reported once.
    pub fn channel_names(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for name in self.broadcasts.iter().flat_map(|b| b.channels.iter()) {
            if !out.contains(&name.as_str()) {
                out.push(name);
            }
        }
        out
    }
}

pub fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_dash = false;
    for ch in text.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(ch);
        } else {
            pending_dash = true;
        }
    }
    out
}

pub fn slug_or(text: &str, fallback: &str) -> String {
    let slug = slugify(text);
    if slug.is_empty() {
        fallback.to_string()
    } else {
        slug
    }
}

pub fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn split_participants(fixture: &str) -> (String, String) {
    for sep in PARTICIPANT_SEPARATORS {
        if let Some((home, away)) = fixture.split_once(sep) {
            let (home, away) = (home.trim(), away.trim());
            if !home.is_empty() && !away.is_empty() {
                return (home.to_string(), away.to_string());
            }
        }
    }
    (
        FALLBACK_PARTICIPANTS.0.to_string(),
        FALLBACK_PARTICIPANTS.1.to_string(),
    )
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn vec_or_default<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let value = Option::<Vec<T>>::deserialize(deserializer)?;
    Ok(value.unwrap_or_default())
}

fn string_or_default<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(string_or_none(deserializer)?.unwrap_or_default())
}

fn string_or_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let rendered = match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    };
    Ok(rendered)
}

fn id_or_none<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Number(n) => Ok(n.as_u64()),
        Value::String(s) => Ok(s.trim().parse::<u64>().ok()),
        _ => Ok(None),
    }
}

fn timestamp_or_none<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Number(n) => Ok(n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))),
        Value::String(s) => Ok(s.trim().parse::<i64>().ok()),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Team A vs Team B"), "team-a-vs-team-b");
        assert_eq!(slugify("  Sky Sports+ (HD) "), "sky-sports-hd");
        assert_eq!(slugify("Atlético Madrid"), "atl-tico-madrid");
        assert_eq!(slug_or("***", "channel"), "channel");
    }

    #[test]
    fn participants_fall_back_without_separator() {
        assert_eq!(
            split_participants("Arsenal vs Chelsea"),
            ("Arsenal".to_string(), "Chelsea".to_string())
        );
        assert_eq!(
            split_participants("Derby Day"),
            ("Home".to_string(), "Away".to_string())
        );
    }

    #[test]
    fn millisecond_kickoffs_are_normalized() {
        let secs = Kickoff::from_raw(1_760_000_000).expect("seconds");
        let millis = Kickoff::from_raw(1_760_000_000_000).expect("millis");
        assert_eq!(secs, millis);
        assert_eq!(normalize_epoch(MILLIS_THRESHOLD), MILLIS_THRESHOLD);
    }

    #[test]
    fn composite_key_ignores_case_and_spacing() {
        let a = MatchRecord::from_raw(RawMatch {
            fixture: Some("X  vs Y".to_string()),
            kickoff: Some(1_760_000_000),
            ..RawMatch::default()
        })
        .expect("valid");
        let b = MatchRecord::from_raw(RawMatch {
            fixture: Some("x vs y".to_string()),
            kickoff: Some(1_760_000_000_000),
            ..RawMatch::default()
        })
        .expect("valid");
        assert_eq!(a.key, b.key);
    }

    #[test]
    fn missing_optional_fields_get_defaults() {
        let record = MatchRecord::from_raw(RawMatch {
            match_id: Some(7),
            fixture: Some("A vs B".to_string()),
            kickoff: Some(1_760_000_000),
            tv_channels: vec![RawBroadcast {
                country: String::new(),
                channels: vec![" ".to_string()],
            }],
            ..RawMatch::default()
        })
        .expect("valid");
        assert_eq!(record.venue, DEFAULT_VENUE);
        assert_eq!(record.league, DEFAULT_LEAGUE);
        assert!(record.broadcasts.is_empty());
        assert_eq!(record.key, MatchKey::Provider(7));
    }

    #[test]
    fn records_without_title_or_kickoff_are_rejected() {
        assert!(
            MatchRecord::from_raw(RawMatch {
                kickoff: Some(1),
                ..RawMatch::default()
            })
            .is_err()
        );
        assert!(
            MatchRecord::from_raw(RawMatch {
                fixture: Some("A vs B".to_string()),
                ..RawMatch::default()
            })
            .is_err()
        );
    }
}
