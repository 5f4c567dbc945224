use anyhow::{Result, anyhow};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, Utc};

use crate::model::Kickoff;

pub const MIN_OFFSET_HOURS: f64 = -12.0;
pub const MAX_OFFSET_HOURS: f64 = 14.0;

/// Resolves UTC instants into the deployment's fixed local offset. The stored
/// instant is never modified; every method is a pure function of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalClock {
    offset: FixedOffset,
}

impl LocalClock {
    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    pub fn from_hours(hours: f64) -> Result<Self> {
        if !hours.is_finite() || !(MIN_OFFSET_HOURS..=MAX_OFFSET_HOURS).contains(&hours) {
            return Err(anyhow!("utc offset {hours} outside {MIN_OFFSET_HOURS}..={MAX_OFFSET_HOURS}"));
        }
        let secs = (hours * 3600.0).round() as i32;
        let offset = FixedOffset::east_opt(secs).ok_or_else(|| anyhow!("invalid utc offset {hours}"))?;
        Ok(Self { offset })
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn localize(&self, kickoff: Kickoff) -> NaiveDateTime {
        kickoff.utc().with_timezone(&self.offset).naive_local()
    }

    pub fn local_date(&self, kickoff: Kickoff) -> NaiveDate {
        self.localize(kickoff).date()
    }

    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset).date_naive()
    }
}

/// Folder/file key for a local calendar day, e.g. `20251009`.
pub fn day_key(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

pub fn clock_label(local: NaiveDateTime) -> String {
    local.format("%H:%M").to_string()
}

pub fn date_label(local: NaiveDate) -> String {
    local.format("%d %b %Y").to_string()
}

pub fn long_date_label(local: NaiveDate) -> String {
    local.format("%A, %b %d").to_string()
}

pub fn menu_date_label(local: NaiveDate) -> String {
    local.format("%b %d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kickoff(secs: i64) -> Kickoff {
        Kickoff::from_raw(secs).expect("valid kickoff")
    }

    #[test]
    fn late_utc_kickoff_buckets_into_next_local_day() {
        // 2025-10-09 23:30:00 UTC
        let k = kickoff(1_760_052_600);
        let utc = LocalClock::utc();
        let plus5 = LocalClock::from_hours(5.0).expect("offset");
        assert_eq!(
            utc.local_date(k),
            NaiveDate::from_ymd_opt(2025, 10, 9).expect("date")
        );
        assert_eq!(
            plus5.local_date(k),
            NaiveDate::from_ymd_opt(2025, 10, 10).expect("date")
        );
        assert_eq!(clock_label(plus5.localize(k)), "04:30");
    }

    #[test]
    fn negative_offset_moves_back_a_day() {
        // 2025-10-10 02:00:00 UTC
        let k = kickoff(1_760_061_600);
        let clock = LocalClock::from_hours(-4.0).expect("offset");
        assert_eq!(day_key(clock.local_date(k)), "20251009");
    }

    #[test]
    fn fractional_offsets_are_supported() {
        let clock = LocalClock::from_hours(5.5).expect("offset");
        assert_eq!(clock.offset().local_minus_utc(), 19_800);
        assert!(LocalClock::from_hours(15.0).is_err());
        assert!(LocalClock::from_hours(f64::NAN).is_err());
    }
}
