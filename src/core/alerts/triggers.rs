// Trigger evaluation for alert conditions.
//
// Pure functions over a window of recent rolls, oldest first.

use super::model::{Condition, ConditionKind};
use crate::core::model::Roll;

/// Evaluate a condition against the recent roll window.
/// Disabled conditions and empty windows never fire.
pub fn evaluate(condition: &Condition, window: &[Roll]) -> bool {
    if !condition.enabled || window.is_empty() {
        return false;
    }

    match condition.kind {
        ConditionKind::CountBelow => evaluate_count_below(condition, window),
        ConditionKind::AbsentStreak => evaluate_absent_streak(condition, window),
        ConditionKind::Consecutive => evaluate_consecutive(condition, window),
    }
}

fn tail<'a>(window: &'a [Roll], n: u32) -> &'a [Roll] {
    let n = n as usize;
    &window[window.len().saturating_sub(n)..]
}

/// Fewer than `threshold` matches in the last `window_size` rolls.
/// A short history is evaluated as-is.
fn evaluate_count_below(condition: &Condition, window: &[Roll]) -> bool {
    let count = tail(window, condition.window_size)
        .iter()
        .filter(|roll| roll.category == condition.category)
        .count();
    count < condition.threshold as usize
}

/// No match in the last `window_size` rolls. Needs a full window.
fn evaluate_absent_streak(condition: &Condition, window: &[Roll]) -> bool {
    let recent = tail(window, condition.window_size);
    if recent.len() < condition.window_size as usize {
        return false;
    }
    recent.iter().all(|roll| roll.category != condition.category)
}

/// The last `window_size` rolls all match. Needs a full window.
fn evaluate_consecutive(condition: &Condition, window: &[Roll]) -> bool {
    let recent = tail(window, condition.window_size);
    if recent.len() < condition.window_size as usize {
        return false;
    }
    recent.iter().all(|roll| roll.category == condition.category)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alerts::model::NewCondition;
    use crate::core::model::Category;

    fn make_window(categories: &[Category]) -> Vec<Roll> {
        categories
            .iter()
            .enumerate()
            .map(|(i, c)| Roll::new(i as u64 + 1, *c))
            .collect()
    }

    /// `len` rolls of `fill` with `category` placed at the given positions.
    fn window_with(len: usize, fill: Category, category: Category, positions: &[usize]) -> Vec<Roll> {
        let categories: Vec<Category> = (0..len)
            .map(|i| if positions.contains(&i) { category } else { fill })
            .collect();
        make_window(&categories)
    }

    fn condition(kind: ConditionKind, window_size: u32, threshold: u32) -> Condition {
        NewCondition::new("owner", Category::A, kind, window_size)
            .threshold(threshold.max(1))
            .build()
            .unwrap()
    }

    #[test]
    fn test_count_below_boundary() {
        let cond = condition(ConditionKind::CountBelow, 100, 5);

        let four = window_with(100, Category::B, Category::A, &[3, 20, 50, 99]);
        assert!(evaluate(&cond, &four));

        let five = window_with(100, Category::B, Category::A, &[3, 20, 50, 70, 99]);
        assert!(!evaluate(&cond, &five));
    }

    #[test]
    fn test_count_below_short_history() {
        let cond = condition(ConditionKind::CountBelow, 100, 5);
        let short = window_with(10, Category::B, Category::A, &[0, 1]);
        assert!(evaluate(&cond, &short));
    }

    #[test]
    fn test_count_below_only_looks_at_window() {
        let cond = condition(ConditionKind::CountBelow, 10, 2);
        // Plenty of matches, but all older than the last 10
        let window = window_with(30, Category::B, Category::A, &[0, 1, 2, 3, 4, 5]);
        assert!(evaluate(&cond, &window));
    }

    #[test]
    fn test_absent_streak_needs_full_history() {
        let cond = condition(ConditionKind::AbsentStreak, 20, 0);

        let fifteen = window_with(15, Category::B, Category::A, &[]);
        assert!(!evaluate(&cond, &fifteen), "insufficient history must not fire");

        let twenty = window_with(20, Category::B, Category::A, &[]);
        assert!(evaluate(&cond, &twenty));

        let one_match = window_with(20, Category::B, Category::A, &[3]);
        assert!(!evaluate(&cond, &one_match));
    }

    #[test]
    fn test_consecutive_runs() {
        let cond = condition(ConditionKind::Consecutive, 5, 0);

        let mut run_of_four = window_with(4, Category::A, Category::A, &[]);
        run_of_four.push(Roll::new(5, Category::B));
        assert!(!evaluate(&cond, &run_of_four));

        let mut run_of_five = window_with(3, Category::B, Category::B, &[]);
        run_of_five.extend((4..=8).map(|i| Roll::new(i, Category::A)));
        assert!(evaluate(&cond, &run_of_five));

        let run_of_six = window_with(6, Category::A, Category::A, &[]);
        assert!(evaluate(&cond, &run_of_six));

        let too_short = window_with(4, Category::A, Category::A, &[]);
        assert!(!evaluate(&cond, &too_short));
    }

    #[test]
    fn test_disabled_and_empty_never_fire() {
        let mut cond = condition(ConditionKind::CountBelow, 100, 5);
        assert!(!evaluate(&cond, &[]));

        let window = window_with(100, Category::B, Category::A, &[]);
        assert!(evaluate(&cond, &window));
        cond.enabled = false;
        assert!(!evaluate(&cond, &window));
    }
}
