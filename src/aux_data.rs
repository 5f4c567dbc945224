use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::model::MatchRecord;
use crate::time_resolver::day_key;

/// Result of one enrichment lookup. Every failure collapses to `Unavailable`
/// for that payload alone.
#[derive(Debug, Clone, PartialEq)]
pub enum Aux<T> {
    Available(T),
    Unavailable,
}

impl<T> Aux<T> {
    pub fn is_available(&self) -> bool {
        matches!(self, Aux::Available(_))
    }
}

impl<T> From<Option<T>> for Aux<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Aux::Available(value),
            None => Aux::Unavailable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AuxKind {
    HeadToHead,
    Lineups,
    Statistics,
    Odds,
    Form,
}

impl AuxKind {
    pub const ALL: [AuxKind; 5] = [
        AuxKind::HeadToHead,
        AuxKind::Lineups,
        AuxKind::Statistics,
        AuxKind::Odds,
        AuxKind::Form,
    ];

    pub fn dir_name(self) -> &'static str {
        match self {
            AuxKind::HeadToHead => "h2h",
            AuxKind::Lineups => "lineups",
            AuxKind::Statistics => "statistics",
            AuxKind::Odds => "odds",
            AuxKind::Form => "form",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineupPlayer {
    pub name: String,
    pub number: Option<u32>,
    pub position: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LineupSide {
    pub formation: Option<String>,
    pub starters: Vec<LineupPlayer>,
    pub substitutes: Vec<LineupPlayer>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lineups {
    pub confirmed: bool,
    pub home: LineupSide,
    pub away: LineupSide,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatItem {
    pub name: String,
    pub home: String,
    pub away: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatGroup {
    pub name: String,
    pub items: Vec<StatItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadToHead {
    pub home_wins: u32,
    pub draws: u32,
    pub away_wins: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WinningOdds {
    pub home_expected: Option<f64>,
    pub away_expected: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormResult {
    Win,
    Draw,
    Loss,
}

impl FormResult {
    pub fn letter(self) -> char {
        match self {
            FormResult::Win => 'W',
            FormResult::Draw => 'D',
            FormResult::Loss => 'L',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FormSide {
    pub results: Vec<FormResult>,
    pub position: Option<u32>,
    pub avg_rating: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormGuide {
    pub home: FormSide,
    pub away: FormSide,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchAux {
    pub head_to_head: Aux<HeadToHead>,
    pub lineups: Aux<Lineups>,
    pub statistics: Aux<Vec<StatGroup>>,
    pub odds: Aux<WinningOdds>,
    pub form: Aux<FormGuide>,
}

impl MatchAux {
    pub fn unavailable() -> Self {
        Self {
            head_to_head: Aux::Unavailable,
            lineups: Aux::Unavailable,
            statistics: Aux::Unavailable,
            odds: Aux::Unavailable,
            form: Aux::Unavailable,
        }
    }

    pub fn available_count(&self) -> usize {
        [
            self.head_to_head.is_available(),
            self.lineups.is_available(),
            self.statistics.is_available(),
            self.odds.is_available(),
            self.form.is_available(),
        ]
        .into_iter()
        .filter(|available| *available)
        .count()
    }
}

pub fn day_file_path(root: &Path, kind: AuxKind, day: &str) -> PathBuf {
    root.join(kind.dir_name()).join(format!("{day}.json"))
}

/// Reads one `(kind, day)` file: a JSON object keyed by match id.
pub fn read_day_file(path: &Path) -> Result<Map<String, Value>> {
    let raw = fs::read_to_string(path).context("read aux file")?;
    match serde_json::from_str::<Value>(raw.trim()).context("invalid aux json")? {
        Value::Object(map) => Ok(map),
        _ => Err(anyhow!("aux file is not a json object")),
    }
}

/// Lazily loads day-partitioned enrichment files and joins them onto matches.
#[derive(Debug)]
pub struct AuxStore {
    root: PathBuf,
    files: HashMap<(AuxKind, String), Option<Map<String, Value>>>,
}

impl AuxStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            files: HashMap::new(),
        }
    }

    pub fn join(&mut self, record: &MatchRecord, day: NaiveDate) -> MatchAux {
        let Some(id) = record.provider_id else {
            return MatchAux::unavailable();
        };
        let id = id.to_string();
        let day = day_key(day);
        MatchAux {
            head_to_head: self
                .payload(AuxKind::HeadToHead, &day, &id)
                .and_then(parse_head_to_head)
                .into(),
            lineups: self
                .payload(AuxKind::Lineups, &day, &id)
                .and_then(parse_lineups)
                .into(),
            statistics: self
                .payload(AuxKind::Statistics, &day, &id)
                .and_then(parse_statistics)
                .into(),
            odds: self
                .payload(AuxKind::Odds, &day, &id)
                .and_then(parse_winning_odds)
                .into(),
            form: self
                .payload(AuxKind::Form, &day, &id)
                .and_then(parse_form)
                .into(),
        }
    }

    fn payload(&mut self, kind: AuxKind, day: &str, id: &str) -> Option<&Value> {
        let root = &self.root;
        let file = self
            .files
            .entry((kind, day.to_string()))
            .or_insert_with(|| {
                let path = day_file_path(root, kind, day);
                if !path.exists() {
                    debug!("no {} data for {day}", kind.dir_name());
                    return None;
                }
                match read_day_file(&path) {
                    Ok(map) => Some(map),
                    Err(err) => {
                        warn!("ignoring {}: {err:#}", path.display());
                        None
                    }
                }
            });
        file.as_ref()?.get(id)
    }
}

pub fn parse_lineups(value: &Value) -> Option<Lineups> {
    let home = parse_lineup_side(value.get("home")?)?;
    let away = parse_lineup_side(value.get("away")?)?;
    Some(Lineups {
        confirmed: value
            .get("confirmed")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        home,
        away,
    })
}

fn parse_lineup_side(value: &Value) -> Option<LineupSide> {
    let players = value.get("players")?.as_array()?;
    let mut side = LineupSide {
        formation: pick_string(value, &["formation"]),
        ..LineupSide::default()
    };
    for entry in players {
        let Some(player) = parse_lineup_player(entry) else {
            continue;
        };
        let substitute = entry
            .get("substitute")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if substitute {
            side.substitutes.push(player);
        } else {
            side.starters.push(player);
        }
    }
    if side.starters.is_empty() && side.substitutes.is_empty() {
        None
    } else {
        Some(side)
    }
}

fn parse_lineup_player(value: &Value) -> Option<LineupPlayer> {
    let nested = value.get("player");
    let name = nested
        .and_then(|p| pick_string(p, &["name", "shortName"]))
        .or_else(|| pick_string(value, &["name"]))?;
    let number = pick_u32(value, &["shirtNumber", "jerseyNumber"])
        .or_else(|| nested.and_then(|p| pick_u32(p, &["shirtNumber", "jerseyNumber"])));
    let position = pick_string(value, &["position"])
        .or_else(|| nested.and_then(|p| pick_string(p, &["position"])));
    Some(LineupPlayer {
        name,
        number,
        position,
    })
}

/// Prefers the full-match period and falls back to the first one present.
pub fn parse_statistics(value: &Value) -> Option<Vec<StatGroup>> {
    let periods = value.get("statistics")?.as_array()?;
    let period = periods
        .iter()
        .find(|p| p.get("period").and_then(Value::as_str) == Some("ALL"))
        .or_else(|| periods.first())?;

    let mut groups = Vec::new();
    for group in period.get("groups")?.as_array()? {
        let Some(items) = group.get("statisticsItems").and_then(Value::as_array) else {
            continue;
        };
        let items: Vec<StatItem> = items
            .iter()
            .filter_map(|item| {
                Some(StatItem {
                    name: pick_string(item, &["name"])?,
                    home: value_to_string(item.get("home")),
                    away: value_to_string(item.get("away")),
                })
            })
            .collect();
        if items.is_empty() {
            continue;
        }
        groups.push(StatGroup {
            name: pick_string(group, &["groupName"]).unwrap_or_else(|| "Match".to_string()),
            items,
        });
    }
    if groups.is_empty() { None } else { Some(groups) }
}

pub fn parse_head_to_head(value: &Value) -> Option<HeadToHead> {
    let duel = value.get("teamDuel")?;
    Some(HeadToHead {
        home_wins: pick_u32(duel, &["homeWins"])?,
        draws: pick_u32(duel, &["draws"])?,
        away_wins: pick_u32(duel, &["awayWins"])?,
    })
}

pub fn parse_winning_odds(value: &Value) -> Option<WinningOdds> {
    let expected = |side: &str| {
        value
            .get(side)
            .and_then(|s| s.get("expected"))
            .and_then(as_f64)
    };
    let odds = WinningOdds {
        home_expected: expected("home"),
        away_expected: expected("away"),
    };
    if odds.home_expected.is_none() && odds.away_expected.is_none() {
        None
    } else {
        Some(odds)
    }
}

pub fn parse_form(value: &Value) -> Option<FormGuide> {
    Some(FormGuide {
        home: parse_form_side(value.get("homeTeam")?)?,
        away: parse_form_side(value.get("awayTeam")?)?,
    })
}

fn parse_form_side(value: &Value) -> Option<FormSide> {
    value.as_object()?;
    let results = value
        .get("form")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|v| match v.as_str()?.trim() {
                    "W" | "w" => Some(FormResult::Win),
                    "D" | "d" => Some(FormResult::Draw),
                    "L" | "l" => Some(FormResult::Loss),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();
    Some(FormSide {
        results,
        position: pick_u32(value, &["position"]),
        avg_rating: pick_string(value, &["avgRating"]),
    })
}

fn pick_string(value: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        let found = match value.get(*key) {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => continue,
        };
        if !found.is_empty() {
            return Some(found);
        }
    }
    None
}

fn pick_u32(value: &Value, keys: &[&str]) -> Option<u32> {
    for key in keys {
        if let Some(v) = value.get(*key) {
            if let Some(num) = v.as_u64() {
                return u32::try_from(num).ok();
            }
            if let Some(num) = v.as_str().and_then(|s| s.trim().parse::<u32>().ok()) {
                return Some(num);
            }
        }
    }
    None
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').parse::<f64>().ok(),
        _ => None,
    }
}

fn value_to_string(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => "-".to_string(),
    }
}
