use time::{Date, Month, OffsetDateTime};

/// Calendar month selector for transaction listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthFilter {
    pub year: i32,
    pub month: u8,
}

impl MonthFilter {
    pub fn new(year: i32, month: u8) -> Self {
        Self { year, month }
    }

    /// The UTC instants covered by this month, or `None` if the month is not 1..=12.
    pub fn range(&self) -> Option<TimeRange> {
        TimeRange::month(self.year, self.month)
    }
}

/// Half-open instant range `[start, end)`.
///
/// Covering a month as `[first midnight, next month's first midnight)` includes
/// every instant up to the last nanosecond of the month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
}

impl TimeRange {
    pub fn month(year: i32, month: u8) -> Option<Self> {
        let month = Month::try_from(month).ok()?;
        let (next_year, next_month) = match month {
            Month::December => (year.checked_add(1)?, Month::January),
            m => (year, m.next()),
        };
        Some(Self {
            start: first_instant(year, month)?,
            end: first_instant(next_year, next_month)?,
        })
    }

    pub fn year(year: i32) -> Option<Self> {
        Some(Self {
            start: first_instant(year, Month::January)?,
            end: first_instant(year.checked_add(1)?, Month::January)?,
        })
    }

    pub fn contains(&self, instant: OffsetDateTime) -> bool {
        instant >= self.start && instant < self.end
    }
}

fn first_instant(year: i32, month: Month) -> Option<OffsetDateTime> {
    Date::from_calendar_date(year, month, 1)
        .ok()
        .map(|d| d.midnight().assume_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_month_range_is_inclusive_of_last_instant() {
        let range = MonthFilter::new(2024, 2).range().unwrap();
        assert!(range.contains(datetime!(2024-02-01 00:00 UTC)));
        assert!(range.contains(datetime!(2024-02-29 23:59:59.999999999 UTC)));
        assert!(!range.contains(datetime!(2024-03-01 00:00 UTC)));
        assert!(!range.contains(datetime!(2024-01-31 23:59:59.999 UTC)));
    }

    #[test]
    fn test_december_rolls_into_next_year() {
        let range = TimeRange::month(2023, 12).unwrap();
        assert_eq!(range.end, datetime!(2024-01-01 00:00 UTC));
    }

    #[test]
    fn test_invalid_month() {
        assert!(MonthFilter::new(2024, 13).range().is_none());
        assert!(MonthFilter::new(2024, 0).range().is_none());
    }

    #[test]
    fn test_offsets_are_compared_as_instants() {
        let range = TimeRange::year(2024).unwrap();
        // 2023-12-31 22:00 at -03:00 is already 2024 in UTC.
        assert!(range.contains(datetime!(2023-12-31 22:00 -3)));
    }
}
