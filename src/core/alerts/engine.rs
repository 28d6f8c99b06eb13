// Alert engine - cooldown gate and per-tick selection of firing conditions.

use chrono::{DateTime, Duration, Utc};

use super::model::Condition;
use super::triggers::evaluate;
use crate::core::model::Roll;

/// True while `now` is less than `cooldown_minutes` past the last firing.
/// A condition that never fired is never in cooldown.
pub fn is_in_cooldown(condition: &Condition, now: DateTime<Utc>) -> bool {
    match condition.last_fired_at {
        Some(last_fired) => {
            let cooldown = Duration::minutes(i64::from(condition.cooldown_minutes));
            now.signed_duration_since(last_fired) < cooldown
        }
        None => false,
    }
}

/// A condition fires only when enabled, out of cooldown and its trigger holds.
pub fn should_fire(condition: &Condition, window: &[Roll], now: DateTime<Utc>) -> bool {
    condition.enabled && !is_in_cooldown(condition, now) && evaluate(condition, window)
}

/// Conditions that fire on this tick, in registry order.
pub fn firing_conditions(conditions: &[Condition], window: &[Roll], now: DateTime<Utc>) -> Vec<Condition> {
    conditions
        .iter()
        .filter(|condition| should_fire(condition, window, now))
        .cloned()
        .collect()
}
