// Alert conditions: rules over the roll history that trigger notifications.
//
// Architecture:
// - model.rs: Condition, Alert and creation requests
// - triggers.rs: Pure evaluation of a condition against a roll window
// - engine.rs: Cooldown gate and per-tick selection of firing conditions
// - store.rs: Versioned JSON persistence of the condition list

pub mod engine;
pub mod model;
pub mod store;
pub mod triggers;
