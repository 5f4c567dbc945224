use std::collections::HashSet;

use anyhow::{Result, anyhow};
use chrono::{Duration as ChronoDuration, NaiveDate};

use crate::model::MatchRecord;
use crate::time_resolver::LocalClock;

/// The canonical record set: one record per identity key, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    records: Vec<MatchRecord>,
    pub duplicates_dropped: usize,
    pub outside_window: usize,
}

impl Dataset {
    pub fn records(&self) -> &[MatchRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Collapses records sharing an identity key. The first occurrence wins and
/// later ones are dropped without comparison, since shards overlap whenever
/// their source windows do.
pub fn merge<I>(records: I) -> Dataset
where
    I: IntoIterator<Item = MatchRecord>,
{
    let mut seen = HashSet::new();
    let mut out = Dataset::default();
    for record in records {
        if seen.insert(record.key.clone()) {
            out.records.push(record);
        } else {
            out.duplicates_dropped += 1;
        }
    }
    out
}

/// Largest `days:` bound accepted; wider windows are clamped to it.
pub const MAX_WINDOW_DAYS: i64 = 3_650;

/// Which local days survive the merge, relative to today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeWindow {
    #[default]
    All,
    Days { before: i64, after: i64 },
}

impl MergeWindow {
    /// Accepts `all` or `days:<before>:<after>`, bounds clamped to
    /// [`MAX_WINDOW_DAYS`].
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim().to_ascii_lowercase();
        if trimmed.is_empty() || trimmed == "all" {
            return Ok(MergeWindow::All);
        }
        let parts: Vec<&str> = trimmed.split(':').collect();
        match parts.as_slice() {
            ["days", before, after] => {
                let before = before
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| anyhow!("invalid merge window start in {raw:?}"))?;
                let after = after
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| anyhow!("invalid merge window end in {raw:?}"))?;
                if before < 0 || after < 0 {
                    return Err(anyhow!("merge window bounds must be non-negative: {raw:?}"));
                }
                Ok(MergeWindow::Days {
                    before: before.min(MAX_WINDOW_DAYS),
                    after: after.min(MAX_WINDOW_DAYS),
                })
            }
            _ => Err(anyhow!("unrecognized merge window {raw:?}")),
        }
    }

    pub fn contains(&self, date: NaiveDate, today: NaiveDate) -> bool {
        match *self {
            MergeWindow::All => true,
            MergeWindow::Days { before, after } => {
                let first = ChronoDuration::try_days(before)
                    .and_then(|span| today.checked_sub_signed(span))
                    .unwrap_or(NaiveDate::MIN);
                let last = ChronoDuration::try_days(after)
                    .and_then(|span| today.checked_add_signed(span))
                    .unwrap_or(NaiveDate::MAX);
                date >= first && date <= last
            }
        }
    }
}

pub fn apply_window(
    mut dataset: Dataset,
    window: MergeWindow,
    clock: &LocalClock,
    today: NaiveDate,
) -> Dataset {
    let before = dataset.records.len();
    dataset
        .records
        .retain(|record| window.contains(clock.local_date(record.kickoff), today));
    dataset.outside_window += before - dataset.records.len();
    dataset
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RawMatch;

    fn record(id: Option<u64>, fixture: &str, kickoff: i64) -> MatchRecord {
        MatchRecord::from_raw(RawMatch {
            match_id: id,
            fixture: Some(fixture.to_string()),
            kickoff: Some(kickoff),
            ..RawMatch::default()
        })
        .expect("valid record")
    }

    #[test]
    fn first_occurrence_wins() {
        let mut first = record(Some(1), "X vs Y", 1_760_000_000);
        first.venue = "First".to_string();
        let mut second = record(Some(1), "X vs Y", 1_760_000_000);
        second.venue = "Second".to_string();
        let dataset = merge(vec![first, second]);
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.records()[0].venue, "First");
        assert_eq!(dataset.duplicates_dropped, 1);
    }

    #[test]
    fn window_parse_accepts_both_forms() {
        assert_eq!(MergeWindow::parse("all").expect("all"), MergeWindow::All);
        assert_eq!(
            MergeWindow::parse("days:1:3").expect("days"),
            MergeWindow::Days {
                before: 1,
                after: 3
            }
        );
        assert!(MergeWindow::parse("days:-1:3").is_err());
        assert!(MergeWindow::parse("week").is_err());
    }

    #[test]
    fn oversized_window_is_clamped_and_never_overflows() {
        assert_eq!(
            MergeWindow::parse("days:200000000:0").expect("days"),
            MergeWindow::Days {
                before: MAX_WINDOW_DAYS,
                after: 0
            }
        );
        let today = NaiveDate::from_ymd_opt(2025, 10, 9).expect("date");
        let huge = MergeWindow::Days {
            before: i64::MAX,
            after: i64::MAX,
        };
        assert!(huge.contains(NaiveDate::MIN, today));
        assert!(huge.contains(NaiveDate::MAX, today));

        let dataset = merge(vec![record(Some(1), "A vs B", 1_760_000_000)]);
        let window = MergeWindow::parse("days:200000000:0").expect("days");
        let kept = apply_window(dataset, window, &LocalClock::utc(), today);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn window_drops_days_outside_range() {
        let today = NaiveDate::from_ymd_opt(2025, 10, 9).expect("date");
        let dataset = merge(vec![
            record(Some(1), "A vs B", 1_760_000_000),
            record(Some(2), "C vs D", 1_760_000_000 + 5 * 86_400),
        ]);
        let kept = apply_window(
            dataset,
            MergeWindow::Days {
                before: 1,
                after: 1,
            },
            &LocalClock::utc(),
            today,
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept.outside_window, 1);
    }
}
