//! Daily upstream call budget
//!
//! One budget is shared by the regime refresh and every per-symbol analytics
//! call. The counter resets when the exchange-local date changes.

use chrono::NaiveDate;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::clock::{Clock, MarketHours};
use crate::provider::{ProviderError, ProviderResult};

#[derive(Debug, Default)]
struct BudgetState {
    date: Option<NaiveDate>,
    used: u32,
}

/// Daily quota of upstream calls
pub struct CallBudget {
    daily_limit: u32,
    clock: Arc<dyn Clock>,
    hours: Arc<dyn MarketHours>,
    state: Mutex<BudgetState>,
}

impl CallBudget {
    pub fn new(daily_limit: u32, clock: Arc<dyn Clock>, hours: Arc<dyn MarketHours>) -> Self {
        Self {
            daily_limit,
            clock,
            hours,
            state: Mutex::new(BudgetState::default()),
        }
    }

    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    fn roll(&self, state: &mut BudgetState) {
        let today = self.hours.exchange_date(self.clock.now());
        if state.date != Some(today) {
            if state.date.is_some() {
                info!(date = %today, used = state.used, "Call budget reset");
            }
            state.date = Some(today);
            state.used = 0;
        }
    }

    /// Reserve `calls` upstream calls, all or nothing
    pub async fn try_acquire(&self, calls: u32) -> ProviderResult<()> {
        let mut state = self.state.lock().await;
        self.roll(&mut state);

        if state.used.saturating_add(calls) > self.daily_limit {
            warn!(
                used = state.used,
                requested = calls,
                limit = self.daily_limit,
                "Daily call budget exhausted"
            );
            return Err(ProviderError::QuotaExhausted);
        }

        state.used += calls;
        debug!(used = state.used, limit = self.daily_limit, "Call budget spent");
        Ok(())
    }

    /// Calls left today
    pub async fn remaining(&self) -> u32 {
        let mut state = self.state.lock().await;
        self.roll(&mut state);
        self.daily_limit.saturating_sub(state.used)
    }

    pub async fn used(&self) -> u32 {
        let mut state = self.state.lock().await;
        self.roll(&mut state);
        state.used
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::clock::testing::{FixedHours, ManualClock};
    use chrono::{Duration, TimeZone, Utc};

    fn budget(limit: u32) -> (Arc<ManualClock>, CallBudget) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 4, 15, 14, 0, 0).unwrap(),
        ));
        let budget = CallBudget::new(limit, clock.clone(), Arc::new(FixedHours(true)));
        (clock, budget)
    }

    #[tokio::test]
    async fn test_quota_is_all_or_nothing() {
        let (_clock, budget) = budget(10);
        budget.try_acquire(7).await.unwrap();
        assert_eq!(
            budget.try_acquire(4).await,
            Err(ProviderError::QuotaExhausted)
        );
        assert_eq!(budget.remaining().await, 3);
        budget.try_acquire(3).await.unwrap();
        assert_eq!(budget.remaining().await, 0);
    }

    #[tokio::test]
    async fn test_resets_on_new_day() {
        let (clock, budget) = budget(5);
        budget.try_acquire(5).await.unwrap();
        assert!(budget.try_acquire(1).await.is_err());

        clock.advance(Duration::days(1));
        assert_eq!(budget.used().await, 0);
        assert!(budget.try_acquire(1).await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_spend_never_exceeds_limit() {
        let (_clock, budget) = budget(50);
        let budget = Arc::new(budget);
        let mut handles = Vec::new();
        for _ in 0..20 {
            let b = budget.clone();
            handles.push(tokio::spawn(async move { b.try_acquire(3).await.is_ok() }));
        }
        let mut granted = 0;
        for h in handles {
            if h.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 16);
        assert_eq!(budget.used().await, 48);
    }

    #[test]
    fn test_zero_limit_refuses_everything() {
        let (_clock, budget) = budget(0);
        assert!(tokio_test::block_on(budget.try_acquire(1)).is_err());
        assert!(tokio_test::block_on(budget.try_acquire(0)).is_ok());
        assert_eq!(tokio_test::block_on(budget.remaining()), 0);
    }
}
