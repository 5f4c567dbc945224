use chrono::{Datelike, NaiveDate};

use crate::aux_data::{
    Aux, FormGuide, FormSide, HeadToHead, LineupPlayer, LineupSide, Lineups, MatchAux, StatGroup,
    WinningOdds,
};
use crate::index::{ChannelEntry, DayEntry, ListingPage, PagePath, Scheduled};
use crate::model::{MatchRecord, slug_or};
use crate::template::{Bindings, Placeholder, html_escape};
use crate::time_resolver::{clock_label, date_label, long_date_label, menu_date_label};

const TOP_CHANNEL_LIMIT: usize = 5;

/// Inputs shared by every page of one build.
#[derive(Debug, Clone)]
pub struct PageContext<'a> {
    pub site_url: &'a str,
    pub listings: &'a [ListingPage],
}

pub fn listing_bindings(
    ctx: &PageContext<'_>,
    listing: &ListingPage,
    entries: &[DayEntry<'_>],
) -> Bindings {
    let title = format!("Football on TV | {}", long_date_label(listing.date));
    Bindings::new()
        .text(Placeholder::PageTitle, &title)
        .text(Placeholder::CanonicalUrl, &listing.page.url(ctx.site_url))
        .text(Placeholder::SiteUrl, ctx.site_url)
        .text(Placeholder::Today, &long_date_label(listing.date))
        .text(Placeholder::Date, &date_label(listing.date))
        .markup(Placeholder::DateMenu, date_menu(ctx.listings, listing.date))
        .markup(Placeholder::MatchListing, day_listing(entries))
}

pub fn detail_bindings(ctx: &PageContext<'_>, item: &Scheduled<'_>, aux: &MatchAux) -> Bindings {
    let record = item.record;
    let title = format!("{} | TV Channels & Kickoff Time", record.fixture);
    Bindings::new()
        .text(Placeholder::PageTitle, &title)
        .text(Placeholder::CanonicalUrl, &item.page.url(ctx.site_url))
        .text(Placeholder::SiteUrl, ctx.site_url)
        .text(Placeholder::Fixture, &record.fixture)
        .text(Placeholder::HomeTeam, &record.home)
        .text(Placeholder::AwayTeam, &record.away)
        .text(Placeholder::League, &record.league)
        .text(Placeholder::Venue, &record.venue)
        .text(Placeholder::Time, &clock_label(item.local))
        .text(Placeholder::Date, &date_label(item.date()))
        .text(Placeholder::TopChannels, &top_channels(record).join(", "))
        .markup(Placeholder::BroadcastRows, broadcast_rows(record))
        .markup(Placeholder::HeadToHead, head_to_head_block(&aux.head_to_head))
        .markup(Placeholder::Lineups, lineups_block(&aux.lineups))
        .markup(Placeholder::Statistics, statistics_block(&aux.statistics))
        .markup(Placeholder::Odds, odds_block(&aux.odds))
        .markup(Placeholder::Form, form_block(&aux.form))
}

pub fn channel_bindings(ctx: &PageContext<'_>, channel: &ChannelEntry<'_>) -> Bindings {
    let title = format!("{} | Live Football Schedule", channel.name);
    Bindings::new()
        .text(Placeholder::PageTitle, &title)
        .text(Placeholder::CanonicalUrl, &channel.page.url(ctx.site_url))
        .text(Placeholder::SiteUrl, ctx.site_url)
        .text(Placeholder::ChannelName, &channel.name)
        .markup(Placeholder::MatchListing, channel_listing(&channel.matches))
}

pub fn date_menu(listings: &[ListingPage], current: NaiveDate) -> String {
    let mut out = String::new();
    for listing in listings {
        let label = match listing.offset_days {
            -1 => "Yesterday".to_string(),
            0 => "Today".to_string(),
            1 => "Tomorrow".to_string(),
            _ => listing.date.weekday().to_string(),
        };
        let style = if listing.date == current {
            "bg-[#00a0e9] text-white"
        } else {
            "bg-slate-700 text-slate-300"
        };
        out.push_str(&format!(
            r#"<a href="{}" class="flex-1 text-center py-2 rounded text-[10px] font-black uppercase {style}">{label}<br>{}</a>"#,
            listing.page.href(),
            menu_date_label(listing.date)
        ));
    }
    out
}

/// League groups for one day. Group boundaries come from the entries'
/// header markers, so the entries must already be in display order.
pub fn day_listing(entries: &[DayEntry<'_>]) -> String {
    if entries.is_empty() {
        return r#"<p class="empty">No televised matches listed for this day.</p>"#.to_string();
    }
    let mut out = String::new();
    let mut open = false;
    for entry in entries {
        if entry.league_header {
            if open {
                out.push_str("</div>");
            }
            out.push_str(&format!(
                r#"<div class="mb-6"><div class="league-title">{}</div>"#,
                html_escape(&entry.item.record.league)
            ));
            open = true;
        }
        out.push_str(&match_card(&entry.item, false));
    }
    if open {
        out.push_str("</div>");
    }
    out
}

pub fn channel_listing(matches: &[Scheduled<'_>]) -> String {
    if matches.is_empty() {
        return r#"<p class="empty">No upcoming matches listed for this channel.</p>"#.to_string();
    }
    matches.iter().map(|item| match_card(item, true)).collect()
}

fn match_card(item: &Scheduled<'_>, with_date: bool) -> String {
    let when = if with_date {
        format!("{} {}", menu_date_label(item.date()), clock_label(item.local))
    } else {
        clock_label(item.local)
    };
    format!(
        r#"<a href="{}" class="match-card"><div class="time-col">{}</div><div class="font-bold">{}</div></a>"#,
        item.page.href(),
        html_escape(&when),
        html_escape(&item.record.fixture)
    )
}

pub fn broadcast_rows(record: &MatchRecord) -> String {
    if record.broadcasts.is_empty() {
        return r#"<div class="row"><div class="c-name">TV listings to be announced</div></div>"#
            .to_string();
    }
    let mut out = String::new();
    for broadcast in &record.broadcasts {
        let pills: String = broadcast
            .channels
            .iter()
            .map(|name| {
                format!(
                    r#"<a href="{}" class="pill">{}</a>"#,
                    PagePath::channel(&slug_or(name, "channel")).href(),
                    html_escape(name)
                )
            })
            .collect();
        out.push_str(&format!(
            r#"<div class="row"><div class="c-name">{}</div><div class="ch-list">{pills}</div></div>"#,
            html_escape(&broadcast.country)
        ));
    }
    out
}

pub fn top_channels(record: &MatchRecord) -> Vec<&str> {
    let mut names = record.channel_names();
    names.truncate(TOP_CHANNEL_LIMIT);
    names
}

fn unavailable(label: &str) -> String {
    format!(r#"<div class="aux-unavailable">{label} not available</div>"#)
}

pub fn head_to_head_block(h2h: &Aux<HeadToHead>) -> String {
    let Aux::Available(h2h) = h2h else {
        return unavailable("Head-to-head record");
    };
    format!(
        r#"<div class="aux h2h"><span class="h2h-home">{}</span><span class="h2h-draws">{}</span><span class="h2h-away">{}</span></div>"#,
        h2h.home_wins, h2h.draws, h2h.away_wins
    )
}

pub fn lineups_block(lineups: &Aux<Lineups>) -> String {
    let Aux::Available(lineups) = lineups else {
        return unavailable("Lineups");
    };
    let status = if lineups.confirmed {
        "Confirmed lineups"
    } else {
        "Predicted lineups"
    };
    format!(
        r#"<div class="aux lineups"><div class="aux-title">{status}</div>{}{}</div>"#,
        lineup_side("home", &lineups.home),
        lineup_side("away", &lineups.away)
    )
}

fn lineup_side(class: &str, side: &LineupSide) -> String {
    let players = |list: &[LineupPlayer]| -> String {
        list.iter()
            .map(|p| {
                let number = p.number.map(|n| format!("{n} ")).unwrap_or_default();
                let position = p
                    .position
                    .as_deref()
                    .map(|pos| format!(" ({})", html_escape(pos)))
                    .unwrap_or_default();
                format!("<li>{number}{}{position}</li>", html_escape(&p.name))
            })
            .collect()
    };
    let formation = side
        .formation
        .as_deref()
        .map(|f| format!(r#"<div class="formation">{}</div>"#, html_escape(f)))
        .unwrap_or_default();
    format!(
        r#"<div class="lineup-{class}">{formation}<ul class="starters">{}</ul><ul class="subs">{}</ul></div>"#,
        players(&side.starters),
        players(&side.substitutes)
    )
}

pub fn statistics_block(stats: &Aux<Vec<StatGroup>>) -> String {
    let Aux::Available(groups) = stats else {
        return unavailable("Match statistics");
    };
    let mut out = String::from(r#"<div class="aux stats">"#);
    for group in groups {
        out.push_str(&format!(
            r#"<div class="stat-group"><div class="aux-title">{}</div>"#,
            html_escape(&group.name)
        ));
        for item in &group.items {
            out.push_str(&format!(
                r#"<div class="stat-row"><span>{}</span><span>{}</span><span>{}</span></div>"#,
                html_escape(&item.home),
                html_escape(&item.name),
                html_escape(&item.away)
            ));
        }
        out.push_str("</div>");
    }
    out.push_str("</div>");
    out
}

pub fn odds_block(odds: &Aux<WinningOdds>) -> String {
    let Aux::Available(odds) = odds else {
        return unavailable("Win probability");
    };
    let pct = |v: Option<f64>| v.map(|v| format!("{v:.0}%")).unwrap_or_else(|| "-".to_string());
    format!(
        r#"<div class="aux odds"><span class="odds-home">{}</span><span class="odds-away">{}</span></div>"#,
        pct(odds.home_expected),
        pct(odds.away_expected)
    )
}

pub fn form_block(form: &Aux<FormGuide>) -> String {
    let Aux::Available(form) = form else {
        return unavailable("Recent form");
    };
    format!(
        r#"<div class="aux form">{}{}</div>"#,
        form_side("home", &form.home),
        form_side("away", &form.away)
    )
}

fn form_side(class: &str, side: &FormSide) -> String {
    let results: String = side
        .results
        .iter()
        .map(|r| format!(r#"<span class="form-{0}">{0}</span>"#, r.letter()))
        .collect();
    let position = side
        .position
        .map(|p| format!(r#"<span class="position">#{p}</span>"#))
        .unwrap_or_default();
    let rating = side
        .avg_rating
        .as_deref()
        .map(|r| format!(r#"<span class="rating">{}</span>"#, html_escape(r)))
        .unwrap_or_default();
    format!(r#"<div class="form-{class}">{results}{position}{rating}</div>"#)
}
