//! Expiry windows
//!
//! High-conviction setups take the nearest weekly at 7-12 DTE; everything
//! else goes out to 12-21 DTE. The volatility gate can push both ends out.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Inclusive days-to-expiry window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DteWindow {
    pub min: i64,
    pub max: i64,
}

impl DteWindow {
    pub const NEAR: DteWindow = DteWindow { min: 7, max: 12 };
    pub const FAR: DteWindow = DteWindow { min: 12, max: 21 };

    pub fn contains(&self, dte: i64) -> bool {
        dte >= self.min && dte <= self.max
    }

    pub fn midpoint(&self) -> f64 {
        (self.min + self.max) as f64 / 2.0
    }

    pub fn shifted(&self, days: i64) -> DteWindow {
        DteWindow {
            min: self.min + days,
            max: self.max + days,
        }
    }
}

/// Window for a score, shifted by the volatility-gate adjustment
pub fn dte_window(score: f64, actionable_threshold: f64, adjustment: i64) -> DteWindow {
    let base = if score >= actionable_threshold {
        DteWindow::NEAR
    } else {
        DteWindow::FAR
    };
    base.shifted(adjustment)
}

pub fn days_to_expiry(today: NaiveDate, expiration: NaiveDate) -> i64 {
    (expiration - today).num_days()
}

/// First Friday whose DTE falls inside the window, or the first one after it
pub fn target_friday(today: NaiveDate, window: DteWindow) -> NaiveDate {
    let start = today + Duration::days(window.min);
    let offset = (Weekday::Fri.num_days_from_monday() as i64
        - start.weekday().num_days_from_monday() as i64)
        .rem_euclid(7);
    start + Duration::days(offset)
}

/// Window widened so it always reaches a Friday
pub fn resolve_window(today: NaiveDate, window: DteWindow) -> DteWindow {
    let friday = days_to_expiry(today, target_friday(today, window));
    DteWindow {
        min: window.min,
        max: window.max.max(friday),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_window_by_score() {
        assert_eq!(dte_window(0.70, 0.68, 0), DteWindow::NEAR);
        assert_eq!(dte_window(0.68, 0.68, 0), DteWindow::NEAR);
        assert_eq!(dte_window(0.50, 0.68, 0), DteWindow::FAR);
        assert_eq!(dte_window(0.70, 0.68, 7), DteWindow { min: 14, max: 19 });
    }

    #[test]
    fn test_target_friday() {
        // Wednesday 2025-03-12: +7 is Wednesday 03-19, Friday is 03-21 (9 DTE)
        let today = date(2025, 3, 12);
        assert_eq!(target_friday(today, DteWindow::NEAR), date(2025, 3, 21));
        // Friday +7 lands on a Friday
        assert_eq!(target_friday(date(2025, 3, 14), DteWindow::NEAR), date(2025, 3, 21));
        // Saturday: 03-21 (13 DTE) comes before 03-28 (20 DTE)
        assert_eq!(target_friday(date(2025, 3, 8), DteWindow::FAR), date(2025, 3, 21));
    }

    #[test]
    fn test_window_without_friday_is_widened() {
        // Saturday: 7-12 DTE spans Saturday to Thursday
        let today = date(2025, 3, 15);
        let window = resolve_window(today, DteWindow::NEAR);
        assert_eq!(window, DteWindow { min: 7, max: 13 });
        assert_eq!(resolve_window(date(2025, 3, 12), DteWindow::NEAR), DteWindow::NEAR);
    }
}
