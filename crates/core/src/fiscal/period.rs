//! Fiscal period types.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use defter_shared::types::{BookId, FiscalPeriodId};

/// Status of a fiscal period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeriodStatus {
    /// Period is open for posting.
    Open,
    /// Period is closing; automated posting is rejected.
    SoftClosed,
    /// Period is closed, no posting allowed.
    HardClosed,
}

impl PeriodStatus {
    /// Returns true if journals may be posted into the period.
    #[must_use]
    pub const fn allows_posting(self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns the persisted representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::SoftClosed => "SOFT_CLOSED",
            Self::HardClosed => "HARD_CLOSED",
        }
    }
}

impl std::fmt::Display for PeriodStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PeriodStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(Self::Open),
            "SOFT_CLOSED" => Ok(Self::SoftClosed),
            "HARD_CLOSED" => Ok(Self::HardClosed),
            other => Err(format!("Unknown period status: {other}")),
        }
    }
}

/// A fiscal period of a book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiscalPeriod {
    /// Unique identifier.
    pub id: FiscalPeriodId,
    /// Book the period belongs to.
    pub book_id: BookId,
    /// Start date of the period.
    pub start_date: NaiveDate,
    /// End date of the period.
    pub end_date: NaiveDate,
    /// Current status.
    pub status: PeriodStatus,
}

impl FiscalPeriod {
    /// Returns true if journals can be posted to this period.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status.allows_posting()
    }

    /// Returns true if the given date falls within this period.
    #[must_use]
    pub fn contains_date(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date <= self.end_date
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn period(status: PeriodStatus) -> FiscalPeriod {
        FiscalPeriod {
            id: FiscalPeriodId::new(),
            book_id: BookId::new(),
            start_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
            status,
        }
    }

    #[test]
    fn test_only_open_allows_posting() {
        assert!(period(PeriodStatus::Open).is_open());
        assert!(!period(PeriodStatus::SoftClosed).is_open());
        assert!(!period(PeriodStatus::HardClosed).is_open());
    }

    #[test]
    fn test_contains_date_is_inclusive() {
        let p = period(PeriodStatus::Open);
        assert!(p.contains_date(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()));
        assert!(p.contains_date(NaiveDate::from_ymd_opt(2026, 1, 31).unwrap()));
        assert!(!p.contains_date(NaiveDate::from_ymd_opt(2026, 2, 1).unwrap()));
    }

    #[test]
    fn test_status_round_trip() {
        for status in [PeriodStatus::Open, PeriodStatus::SoftClosed, PeriodStatus::HardClosed] {
            assert_eq!(PeriodStatus::from_str(status.as_str()).unwrap(), status);
        }
        assert!(PeriodStatus::from_str("closed").is_err());
    }
}
