//! ABOUTME: Budget reallocation and stall detection across a set of sibling cells

use crate::budget::Budget;

pub struct ReallocationPlan {
    pub child_index: usize,
    pub granted: u64,
}

/// Children that have already finished contribute their unused tokens as
/// surplus. Surplus is handed to still-running siblings weighted by how
/// much of their own budget they have already burned through — a child
/// close to exhausting its allotment is more likely to need the top-up
/// than one that just started.
pub fn reallocate_surplus(budgets: &mut [Budget], finished: &[bool], max_reallocation_factor: f64) -> Vec<ReallocationPlan> {
    let mut surplus: u64 = 0;
    for (i, done) in finished.iter().enumerate() {
        if *done {
            surplus += budgets[i].remaining_tokens();
        }
    }
    if surplus == 0 {
        return Vec::new();
    }

    let running: Vec<usize> = finished
        .iter()
        .enumerate()
        .filter(|(_, done)| !**done)
        .map(|(i, _)| i)
        .collect();
    if running.is_empty() {
        return Vec::new();
    }

    let weights: Vec<f64> = running
        .iter()
        .map(|&i| {
            let b = &budgets[i];
            (b.tokens_used as f64 / b.tokens_total.max(1) as f64).max(0.01)
        })
        .collect();
    let weight_sum: f64 = weights.iter().sum();

    let mut plans = Vec::new();
    for (k, &i) in running.iter().enumerate() {
        let share = (surplus as f64 * weights[k] / weight_sum) as u64;
        if share == 0 {
            continue;
        }
        let granted = budgets[i].reallocate(share, max_reallocation_factor);
        if granted > 0 {
            plans.push(ReallocationPlan { child_index: i, granted });
        }
    }
    plans
}

/// Indices of still-running children whose burn rate projects them to
/// finish far short of their deadline's worth of work — candidates for
/// preemptive cancellation rather than a budget top-up.
pub fn stalled_children(budgets: &[Budget], finished: &[bool], min_progress_fraction: f64) -> Vec<usize> {
    budgets
        .iter()
        .enumerate()
        .filter(|(i, b)| !finished[*i] && b.is_stalled(min_progress_fraction))
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget_with_usage(total: u64, used: u64) -> Budget {
        let mut b = Budget::new(total, 60);
        b.consume(used);
        b
    }

    #[test]
    fn surplus_from_finished_child_flows_to_running_sibling() {
        let mut budgets = vec![budget_with_usage(100, 20), budget_with_usage(100, 80)];
        let finished = vec![true, false];

        let plans = reallocate_surplus(&mut budgets, &finished, 2.0);

        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].child_index, 1);
        assert!(plans[0].granted > 0);
    }

    #[test]
    fn no_surplus_when_finished_child_used_everything() {
        let mut budgets = vec![budget_with_usage(100, 100), budget_with_usage(100, 10)];
        let finished = vec![true, false];

        let plans = reallocate_surplus(&mut budgets, &finished, 2.0);
        assert!(plans.is_empty());
    }

    #[test]
    fn reallocation_never_exceeds_max_factor_for_recipient() {
        let mut budgets = vec![budget_with_usage(1000, 0), budget_with_usage(100, 90)];
        let finished = vec![true, false];

        let plans = reallocate_surplus(&mut budgets, &finished, 2.0);
        assert_eq!(budgets[1].tokens_total, 200);
        assert!(plans[0].granted <= 100);
    }

    #[test]
    fn stalled_children_detected_past_halfway_with_low_usage() {
        let mut slow = Budget::with_deadline(1000, std::time::Duration::from_millis(20));
        slow.consume(10);
        std::thread::sleep(std::time::Duration::from_millis(12));
        let finished = vec![false];
        let stalled = stalled_children(&[slow], &finished, 0.5);
        assert_eq!(stalled, vec![0]);
    }
}
