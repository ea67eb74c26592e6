use chrono::{NaiveDate, Utc};
use serde::{Serialize, Deserialize};

pub const DAILY_SPIN_LIMIT: u32 = 200;

/// Spins consumed on `date`. A record from an earlier day counts as zero.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct DailySpinRecord {
    pub date: Option<NaiveDate>,
    pub spins_used: u32,
}

impl DailySpinRecord {
    pub fn new(date: Option<NaiveDate>, spins_used: u32) -> Self {
        Self { date, spins_used }
    }

    /// Builds a record from the stored `YYYY-MM-DD` text. Unparseable dates read as never spun.
    pub fn from_stored(date: Option<&str>, spins_used: i32) -> Self {
        let date = date.and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());
        Self {
            date,
            spins_used: u32::try_from(spins_used).unwrap_or(0),
        }
    }

    pub fn stored_date(&self) -> Option<String> {
        self.date.map(|d| d.format("%Y-%m-%d").to_string())
    }
}

/// The calendar day spins are counted against.
pub fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

pub fn effective_spins_used(record: &DailySpinRecord, today: NaiveDate) -> u32 {
    if record.date == Some(today) {
        record.spins_used
    } else {
        0
    }
}

pub fn can_spin(record: &DailySpinRecord, today: NaiveDate) -> bool {
    effective_spins_used(record, today) < DAILY_SPIN_LIMIT
}

pub fn spins_left(record: &DailySpinRecord, today: NaiveDate) -> u32 {
    DAILY_SPIN_LIMIT.saturating_sub(effective_spins_used(record, today))
}

/// The record after one more spin today. Callers persist the result.
pub fn record_spin(record: &DailySpinRecord, today: NaiveDate) -> DailySpinRecord {
    DailySpinRecord {
        date: Some(today),
        spins_used: effective_spins_used(record, today) + 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_last_spins_of_the_day() {
        let today = day("2024-01-01");
        let record = DailySpinRecord::new(Some(today), 199);
        assert!(can_spin(&record, today));

        let record = record_spin(&record, today);
        assert_eq!(record.spins_used, 200);
        assert!(!can_spin(&record, today));
        assert_eq!(spins_left(&record, today), 0);
    }

    #[test]
    fn test_cap_does_not_carry_across_days() {
        let record = DailySpinRecord::new(Some(day("2023-12-31")), 200);
        let today = day("2024-01-01");
        assert_eq!(effective_spins_used(&record, today), 0);
        assert!(can_spin(&record, today));
        assert_eq!(spins_left(&record, today), DAILY_SPIN_LIMIT);
    }

    #[test]
    fn test_reset_ignores_stale_count() {
        let today = day("2024-03-10");
        for used in [0, 1, 150, 200, 10_000] {
            let record = DailySpinRecord::new(Some(day("2024-03-09")), used);
            assert_eq!(effective_spins_used(&record, today), 0);
            assert_eq!(record_spin(&record, today), DailySpinRecord::new(Some(today), 1));
        }
    }

    #[test]
    fn test_can_spin_matches_limit() {
        let today = day("2024-05-05");
        for used in 195..205 {
            let record = DailySpinRecord::new(Some(today), used);
            assert_eq!(can_spin(&record, today), used < DAILY_SPIN_LIMIT);
        }
    }

    #[test]
    fn test_never_spun() {
        let today = day("2024-05-05");
        let record = DailySpinRecord::default();
        assert!(can_spin(&record, today));
        assert_eq!(record_spin(&record, today).stored_date().as_deref(), Some("2024-05-05"));
    }

    #[test]
    fn test_from_stored() {
        let record = DailySpinRecord::from_stored(Some("2024-01-01"), 12);
        assert_eq!(record.date, Some(day("2024-01-01")));
        assert_eq!(record.spins_used, 12);

        let garbled = DailySpinRecord::from_stored(Some("yesterday"), 12);
        assert_eq!(garbled.date, None);
        assert_eq!(effective_spins_used(&garbled, day("2024-01-01")), 0);

        assert_eq!(DailySpinRecord::from_stored(None, -3).spins_used, 0);
    }
}
