use crate::condition::model::ConditionSet;
use serde_json::Value;
use tracing::warn;

/// Select the active state for `value`.
///
/// States are tried in declaration order and the first active one wins.
/// With no active state the set's default is returned; a default that names
/// no declared state falls back to the first state.
pub fn evaluate<'a>(set: &'a ConditionSet, value: &Value) -> &'a str {
    if let Some(state) = set.states.iter().find(|s| s.is_active(value)) {
        return &state.name;
    }
    default_state(set)
}

fn default_state(set: &ConditionSet) -> &str {
    if set.has_state(&set.default_state_name) {
        return &set.default_state_name;
    }

    match set.states.first() {
        Some(first) => {
            warn!(
                set_id = %set.id,
                default_state = %set.default_state_name,
                fallback = %first.name,
                "Default state is not declared, falling back to first state"
            );
            &first.name
        }
        None => {
            warn!(set_id = %set.id, "Condition set has no states");
            &set.default_state_name
        }
    }
}
