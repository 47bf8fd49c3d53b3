//! Injected time sources
//!
//! The cache and the call budget never read the system clock directly, so
//! tests can pin "now" and the market-hours predicate.

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc, Weekday};
use chrono_tz::America::New_York;

/// Source of the current instant
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Exchange session predicate
pub trait MarketHours: Send + Sync {
    /// Regular session open at `at`
    fn is_open(&self, at: DateTime<Utc>) -> bool;

    /// Exchange-local trading date for `at`
    fn exchange_date(&self, at: DateTime<Utc>) -> NaiveDate;
}

/// US equities regular session: weekdays 09:30-16:00 America/New_York
#[derive(Debug, Clone, Copy, Default)]
pub struct UsEquityHours;

const OPEN_MINUTE: u32 = 9 * 60 + 30;
const CLOSE_MINUTE: u32 = 16 * 60;

impl MarketHours for UsEquityHours {
    fn is_open(&self, at: DateTime<Utc>) -> bool {
        let local = at.with_timezone(&New_York);
        if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        let minute = local.hour() * 60 + local.minute();
        (OPEN_MINUTE..CLOSE_MINUTE).contains(&minute)
    }

    fn exchange_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&New_York).date_naive()
    }
}
