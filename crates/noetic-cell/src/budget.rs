//! ABOUTME: Per-cell token/time budget tracking and stall projection

use std::time::{Duration, Instant};

/// A cell's resource allotment. `tokens_total` can grow at runtime via
/// surplus reallocation from sibling cells; `tokens_used` only grows.
#[derive(Debug, Clone)]
pub struct Budget {
    pub tokens_total: u64,
    pub tokens_used: u64,
    pub original_tokens_total: u64,
    deadline: Instant,
    started_at: Instant,
}

impl Budget {
    pub fn new(tokens_total: u64, deadline_secs: u64) -> Self {
        Self::with_deadline(tokens_total, Duration::from_secs(deadline_secs))
    }

    pub fn with_deadline(tokens_total: u64, deadline: Duration) -> Self {
        let now = Instant::now();
        Self {
            tokens_total,
            tokens_used: 0,
            original_tokens_total: tokens_total,
            deadline: now + deadline,
            started_at: now,
        }
    }

    pub fn consume(&mut self, tokens: u64) {
        self.tokens_used = self.tokens_used.saturating_add(tokens);
    }

    pub fn remaining_tokens(&self) -> u64 {
        self.tokens_total.saturating_sub(self.tokens_used)
    }

    pub fn remaining_time(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining_tokens() == 0 || self.remaining_time().is_zero()
    }

    /// Grant additional tokens from a sibling's surplus, never exceeding
    /// `max_reallocation_factor` times the cell's original allotment.
    pub fn reallocate(&mut self, extra_tokens: u64, max_reallocation_factor: f64) -> u64 {
        let ceiling = (self.original_tokens_total as f64 * max_reallocation_factor) as u64;
        let room = ceiling.saturating_sub(self.tokens_total);
        let granted = extra_tokens.min(room);
        self.tokens_total += granted;
        granted
    }

    /// Projected tokens this cell will have consumed by its deadline, given
    /// its rate of consumption so far. Used to flag a cell as "stalled":
    /// one whose current burn rate will not finish within budget.
    pub fn projected_tokens_at_deadline(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed < 1.0 {
            return self.tokens_used as f64;
        }
        let rate = self.tokens_used as f64 / elapsed;
        let total_window = elapsed + self.remaining_time().as_secs_f64();
        rate * total_window
    }

    /// A cell is stalled if, at its current rate, it will still be well
    /// short of having produced useful output by its deadline while having
    /// already burned most of its token budget — i.e. spinning without
    /// making progress rather than steadily working through a large budget.
    pub fn is_stalled(&self, min_progress_fraction: f64) -> bool {
        if self.remaining_time().is_zero() {
            return false;
        }
        let used_fraction = self.tokens_used as f64 / self.tokens_total.max(1) as f64;
        let time_fraction = self.elapsed().as_secs_f64()
            / (self.elapsed() + self.remaining_time()).as_secs_f64().max(1.0);
        time_fraction > 0.5 && used_fraction < min_progress_fraction
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_tokens_never_underflows() {
        let mut b = Budget::new(100, 60);
        b.consume(150);
        assert_eq!(b.remaining_tokens(), 0);
    }

    #[test]
    fn reallocate_never_exceeds_max_factor() {
        let mut b = Budget::new(100, 60);
        let granted = b.reallocate(1000, 2.0);
        assert_eq!(b.tokens_total, 200);
        assert_eq!(granted, 100);
    }

    #[test]
    fn reallocate_partial_when_near_ceiling() {
        let mut b = Budget::new(100, 60);
        b.tokens_total = 180;
        let granted = b.reallocate(100, 2.0);
        assert_eq!(granted, 20);
        assert_eq!(b.tokens_total, 200);
    }

    #[test]
    fn is_exhausted_when_tokens_depleted() {
        let mut b = Budget::new(10, 60);
        b.consume(10);
        assert!(b.is_exhausted());
    }
}
