use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};

macro_rules! placeholders {
    ($($variant:ident => $token:literal),+ $(,)?) => {
        /// Every token a template may contain, written `{{TOKEN}}`.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Placeholder {
            $($variant),+
        }

        impl Placeholder {
            pub const ALL: &'static [Placeholder] = &[$(Placeholder::$variant),+];

            pub fn token(self) -> &'static str {
                match self {
                    $(Placeholder::$variant => $token),+
                }
            }

            pub fn from_token(token: &str) -> Option<Self> {
                match token {
                    $($token => Some(Placeholder::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

placeholders! {
    PageTitle => "PAGE_TITLE",
    CanonicalUrl => "CANONICAL_URL",
    SiteUrl => "SITE_URL",
    Fixture => "FIXTURE",
    HomeTeam => "HOME_TEAM",
    AwayTeam => "AWAY_TEAM",
    League => "LEAGUE",
    Venue => "VENUE",
    Time => "TIME",
    Date => "DATE",
    Today => "TODAY",
    BroadcastRows => "BROADCAST_ROWS",
    TopChannels => "TOP_CHANNELS",
    MatchListing => "MATCH_LISTING",
    DateMenu => "DATE_MENU",
    ChannelName => "CHANNEL_NAME",
    Lineups => "LINEUPS",
    Statistics => "STATISTICS",
    HeadToHead => "H2H",
    Odds => "ODDS",
    Form => "FORM",
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Slot(Placeholder),
}

/// A template scanned once into literal text and placeholder slots.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    segments: Vec<Segment>,
}

impl Template {
    pub fn load(path: &Path) -> Result<Self> {
        let source = fs::read_to_string(path)
            .with_context(|| format!("template {} is missing or unreadable", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::parse(&name, &source)
    }

    /// `{{NAME}}` where NAME is upper-case letters, digits and `_` is a slot
    /// and must be a known [`Placeholder`]. Any other `{{` is literal text.
    pub fn parse(name: &str, source: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut text = String::new();
        let mut rest = source;

        while let Some(start) = rest.find("{{") {
            let after = &rest[start + 2..];
            let token = after
                .find("}}")
                .map(|end| &after[..end])
                .filter(|t| is_token_name(t));
            let Some(token) = token else {
                text.push_str(&rest[..start + 2]);
                rest = after;
                continue;
            };
            let slot = Placeholder::from_token(token)
                .ok_or_else(|| anyhow!("{name}: unknown placeholder {{{{{token}}}}}"))?;
            text.push_str(&rest[..start]);
            if !text.is_empty() {
                segments.push(Segment::Text(std::mem::take(&mut text)));
            }
            segments.push(Segment::Slot(slot));
            rest = &after[token.len() + 2..];
        }
        text.push_str(rest);
        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }

        Ok(Self {
            name: name.to_string(),
            segments,
        })
    }

    pub fn placeholders(&self) -> BTreeSet<Placeholder> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Slot(p) => Some(*p),
                Segment::Text(_) => None,
            })
            .collect()
    }

    /// Substitutes every slot exactly once. Bound values are not rescanned, so
    /// text that happens to contain `{{...}}` is emitted verbatim. A slot with
    /// no binding fails the render.
    pub fn render(&self, bindings: &Bindings) -> Result<String> {
        let missing: Vec<&str> = self
            .placeholders()
            .into_iter()
            .filter(|p| !bindings.values.contains_key(p))
            .map(Placeholder::token)
            .collect();
        if !missing.is_empty() {
            bail!("{}: unresolved placeholders {}", self.name, missing.join(", "));
        }

        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Slot(slot) => {
                    if let Some(value) = bindings.values.get(slot) {
                        out.push_str(value);
                    }
                }
            }
        }
        Ok(out)
    }
}

/// Values for one render. Plain text is HTML-escaped on the way in; markup
/// built by the page builders is stored as-is.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    values: HashMap<Placeholder, String>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, slot: Placeholder, value: &str) -> Self {
        self.values.insert(slot, html_escape(value));
        self
    }

    pub fn markup(mut self, slot: Placeholder, value: String) -> Self {
        self.values.insert(slot, value);
        self
    }
}

pub fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn is_token_name(token: &str) -> bool {
    !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}
