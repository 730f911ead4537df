use std::time::{Duration, Instant};

use tracing::info;

/// Tracks the wall-clock budget for one ingest cycle. Stages check
/// `remaining()` against their own safety margin before enqueuing more work;
/// in-flight work is never interrupted once started.
pub struct CycleBudget {
    started_at: Instant,
    total: Duration,
}

impl CycleBudget {
    pub fn start(total: Duration) -> Self {
        Self {
            started_at: Instant::now(),
            total,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.total.saturating_sub(self.elapsed())
    }

    /// True when there is still more than `margin` of budget left — the
    /// caller should stop starting new work once this goes false.
    pub fn has_budget(&self, margin: Duration) -> bool {
        self.remaining() > margin
    }

    pub fn log_status(&self, stage: &str) {
        info!(
            stage,
            elapsed_ms = self.elapsed().as_millis() as u64,
            remaining_ms = self.remaining().as_millis() as u64,
            "cycle budget status"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_budget_true_when_fresh() {
        let budget = CycleBudget::start(Duration::from_secs(120));
        assert!(budget.has_budget(Duration::from_secs(10)));
    }

    #[test]
    fn has_budget_false_when_margin_exceeds_total() {
        let budget = CycleBudget::start(Duration::from_millis(5));
        std::thread::sleep(Duration::from_millis(10));
        assert!(!budget.has_budget(Duration::from_secs(1)));
    }

    #[test]
    fn remaining_never_underflows() {
        let budget = CycleBudget::start(Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(budget.remaining(), Duration::ZERO);
    }
}
