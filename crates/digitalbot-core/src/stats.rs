//! Calendar-bucketed message counters.

use chrono::{Datelike, NaiveDate};

/// Bucket keys for one calendar date.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BucketKeys {
    /// `YYYY-MM-DD`
    pub day: String,
    /// ISO week, `YYYY-Www`
    pub week: String,
    /// `YYYY-MM`
    pub month: String,
}

impl BucketKeys {
    pub fn for_date(date: NaiveDate) -> Self {
        let iso = date.iso_week();
        Self {
            day: date.format("%Y-%m-%d").to_string(),
            week: format!("{}-W{:02}", iso.year(), iso.week()),
            month: date.format("%Y-%m").to_string(),
        }
    }
}

/// Message counters of one member in one chat.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageCounters {
    pub total: u64,
    pub day: u64,
    pub day_key: String,
    pub week: u64,
    pub week_key: String,
    pub month: u64,
    pub month_key: String,
}

impl MessageCounters {
    /// Count one message sent on `date`, rolling over stale buckets first.
    pub fn record(&mut self, date: NaiveDate) {
        let keys = BucketKeys::for_date(date);
        roll(&mut self.day, &mut self.day_key, keys.day);
        roll(&mut self.week, &mut self.week_key, keys.week);
        roll(&mut self.month, &mut self.month_key, keys.month);
        self.total += 1;
        self.day += 1;
        self.week += 1;
        self.month += 1;
    }

    /// Counters as seen on `date`: buckets whose key is stale read as zero.
    pub fn as_of(&self, date: NaiveDate) -> Self {
        let keys = BucketKeys::for_date(date);
        Self {
            total: self.total,
            day: if self.day_key == keys.day { self.day } else { 0 },
            day_key: keys.day,
            week: if self.week_key == keys.week { self.week } else { 0 },
            week_key: keys.week,
            month: if self.month_key == keys.month {
                self.month
            } else {
                0
            },
            month_key: keys.month,
        }
    }
}

fn roll(count: &mut u64, key: &mut String, current: String) {
    if *key != current {
        *count = 0;
        *key = current;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn keys_use_iso_weeks() {
        let keys = BucketKeys::for_date(d(2021, 1, 1));
        assert_eq!(keys.day, "2021-01-01");
        assert_eq!(keys.week, "2020-W53");
        assert_eq!(keys.month, "2021-01");
    }

    #[test]
    fn counts_within_one_day() {
        let mut c = MessageCounters::default();
        c.record(d(2026, 10, 14));
        c.record(d(2026, 10, 14));
        assert_eq!((c.total, c.day, c.week, c.month), (2, 2, 2, 2));
    }

    #[test]
    fn day_rolls_over_but_week_and_month_accumulate() {
        let mut c = MessageCounters::default();
        // Wednesday and Thursday of the same ISO week.
        c.record(d(2026, 10, 14));
        c.record(d(2026, 10, 15));
        assert_eq!((c.total, c.day, c.week, c.month), (2, 1, 2, 2));
    }

    #[test]
    fn month_rolls_over() {
        let mut c = MessageCounters::default();
        c.record(d(2026, 9, 30));
        c.record(d(2026, 10, 1));
        assert_eq!(c.month, 1);
        assert_eq!(c.week, 2);
        assert_eq!(c.total, 2);
    }

    #[test]
    fn stale_buckets_read_as_zero() {
        let mut c = MessageCounters::default();
        c.record(d(2026, 10, 1));
        let seen = c.as_of(d(2026, 11, 20));
        assert_eq!((seen.total, seen.day, seen.week, seen.month), (1, 0, 0, 0));
    }
}
