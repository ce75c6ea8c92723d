//! Fiscal period status, consumed as a read-only posting oracle.

pub mod period;

pub use period::{FiscalPeriod, PeriodStatus};
