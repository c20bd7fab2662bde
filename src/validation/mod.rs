use crate::condition::{ConditionSet, ValueType};
use crate::device::SourceBinding;
use crate::metric::MetricConfig;
use std::collections::HashSet;
use std::fmt;

/// Save-time validation errors for user configuration
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    MissingId,
    NoStates,
    EmptyStateName,
    DuplicateStateName(String),
    NoConditions(String),
    EmptyLiteral(String),
    InvalidLiteral {
        state: String,
        literal: String,
        value_type: ValueType,
    },
    UnknownDefaultState(String),
    NoBindings,
    IncompleteBinding,
    InvalidRate(f64),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::MissingId => write!(f, "id is required"),
            ValidationError::NoStates => write!(f, "at least one state is required"),
            ValidationError::EmptyStateName => write!(f, "state name is required"),
            ValidationError::DuplicateStateName(name) => {
                write!(f, "duplicate state name '{}'", name)
            }
            ValidationError::NoConditions(state) => {
                write!(f, "state '{}' needs at least one condition", state)
            }
            ValidationError::EmptyLiteral(state) => {
                write!(f, "state '{}' has a condition without a value", state)
            }
            ValidationError::InvalidLiteral {
                state,
                literal,
                value_type,
            } => write!(
                f,
                "state '{}': '{}' is not a valid {:?} literal",
                state, literal, value_type
            ),
            ValidationError::UnknownDefaultState(name) => {
                write!(f, "default state '{}' is not declared", name)
            }
            ValidationError::NoBindings => write!(f, "at least one source binding is required"),
            ValidationError::IncompleteBinding => {
                write!(f, "source bindings need both a device and a key")
            }
            ValidationError::InvalidRate(rate) => {
                write!(f, "rate must be a finite, non-negative number, got {}", rate)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validates a condition set before it is saved.
///
/// Rules:
/// - id is non-empty
/// - at least one state; names non-empty and unique
/// - every state has at least one condition
/// - every literal is non-empty and parses as its declared type
/// - the default state names a declared state
/// - an optional binding names both device and key
pub fn validate_condition_set(set: &ConditionSet) -> Result<(), ValidationError> {
    if set.id.trim().is_empty() {
        return Err(ValidationError::MissingId);
    }
    if set.states.is_empty() {
        return Err(ValidationError::NoStates);
    }

    let mut seen = HashSet::new();
    for state in &set.states {
        if state.name.trim().is_empty() {
            return Err(ValidationError::EmptyStateName);
        }
        if !seen.insert(state.name.as_str()) {
            return Err(ValidationError::DuplicateStateName(state.name.clone()));
        }
        if state.conditions.is_empty() {
            return Err(ValidationError::NoConditions(state.name.clone()));
        }

        for condition in &state.conditions {
            if condition.value.trim().is_empty() {
                return Err(ValidationError::EmptyLiteral(state.name.clone()));
            }
            if condition.value_type.parse_literal(&condition.value).is_none() {
                return Err(ValidationError::InvalidLiteral {
                    state: state.name.clone(),
                    literal: condition.value.clone(),
                    value_type: condition.value_type,
                });
            }
        }
    }

    if !set.has_state(&set.default_state_name) {
        return Err(ValidationError::UnknownDefaultState(
            set.default_state_name.clone(),
        ));
    }

    if let Some(binding) = &set.binding {
        validate_binding(binding)?;
    }

    Ok(())
}

/// Validates a metric config before it is saved.
///
/// Rules:
/// - id is non-empty (nested aggregate ids included)
/// - aggregates have at least one binding
/// - every binding names both device and key
/// - cost rates are finite and non-negative
pub fn validate_metric_config(config: &MetricConfig) -> Result<(), ValidationError> {
    if config.id().trim().is_empty() {
        return Err(ValidationError::MissingId);
    }

    match config {
        MetricConfig::Aggregate(c) if c.bindings.is_empty() => {
            return Err(ValidationError::NoBindings)
        }
        MetricConfig::Ratio(c) if c.denominator.bindings.is_empty() => {
            return Err(ValidationError::NoBindings)
        }
        MetricConfig::Cost(c) if !c.rate.is_finite() || c.rate < 0.0 => {
            return Err(ValidationError::InvalidRate(c.rate))
        }
        _ => {}
    }

    config
        .bindings()
        .into_iter()
        .try_for_each(validate_binding)
}

fn validate_binding(binding: &SourceBinding) -> Result<(), ValidationError> {
    if binding.device_id.trim().is_empty() || binding.key.trim().is_empty() {
        return Err(ValidationError::IncompleteBinding);
    }
    Ok(())
}

#[cfg(test)]
mod validation_tests {
    use super::*;
    use crate::condition::{Combinator, Condition, LogicState, Operator};
    use crate::metric::{AggregateConfig, Combine, CostConfig, RatioConfig};

    fn state(name: &str, conditions: Vec<Condition>) -> LogicState {
        LogicState {
            name: name.to_string(),
            color: "green".to_string(),
            animated: false,
            conditions,
            combinator: Combinator::And,
        }
    }

    fn valid_set() -> ConditionSet {
        ConditionSet {
            id: "temp".to_string(),
            states: vec![
                state(
                    "Hot",
                    vec![Condition::new(Operator::Gt, "30", ValueType::Number)],
                ),
                state(
                    "Ok",
                    vec![Condition::new(Operator::Le, "30", ValueType::Number)],
                ),
            ],
            default_state_name: "Ok".to_string(),
            binding: Some(SourceBinding::new("sensor", "temp")),
        }
    }

    #[test]
    fn test_valid_condition_set_passes() {
        assert_eq!(validate_condition_set(&valid_set()), Ok(()));
    }

    #[test]
    fn test_condition_set_without_states_fails() {
        let mut set = valid_set();
        set.states.clear();
        assert_eq!(validate_condition_set(&set), Err(ValidationError::NoStates));
    }

    #[test]
    fn test_duplicate_state_names_fail() {
        let mut set = valid_set();
        set.states[1].name = "Hot".to_string();
        assert_eq!(
            validate_condition_set(&set),
            Err(ValidationError::DuplicateStateName("Hot".to_string()))
        );
    }

    #[test]
    fn test_state_without_conditions_fails() {
        let mut set = valid_set();
        set.states[0].conditions.clear();
        assert_eq!(
            validate_condition_set(&set),
            Err(ValidationError::NoConditions("Hot".to_string()))
        );
    }

    #[test]
    fn test_empty_literal_fails() {
        let mut set = valid_set();
        set.states[0].conditions[0].value = "  ".to_string();
        assert_eq!(
            validate_condition_set(&set),
            Err(ValidationError::EmptyLiteral("Hot".to_string()))
        );
    }

    #[test]
    fn test_non_numeric_literal_fails() {
        let mut set = valid_set();
        set.states[0].conditions[0].value = "thirty".to_string();
        match validate_condition_set(&set) {
            Err(ValidationError::InvalidLiteral { state, literal, .. }) => {
                assert_eq!(state, "Hot");
                assert_eq!(literal, "thirty");
            }
            other => panic!("Expected InvalidLiteral error, got {:?}", other),
        }
    }

    #[test]
    fn test_boolean_literal_must_be_exact() {
        let mut set = valid_set();
        set.states[0].conditions[0] = Condition::new(Operator::Eq, "yes", ValueType::Boolean);
        assert!(matches!(
            validate_condition_set(&set),
            Err(ValidationError::InvalidLiteral { .. })
        ));
    }

    #[test]
    fn test_undeclared_default_fails() {
        let mut set = valid_set();
        set.default_state_name = "Cold".to_string();
        assert_eq!(
            validate_condition_set(&set),
            Err(ValidationError::UnknownDefaultState("Cold".to_string()))
        );
    }

    #[test]
    fn test_incomplete_binding_fails() {
        let mut set = valid_set();
        set.binding = Some(SourceBinding::new("sensor", ""));
        assert_eq!(
            validate_condition_set(&set),
            Err(ValidationError::IncompleteBinding)
        );
    }

    #[test]
    fn test_metric_config_rules() {
        let empty_aggregate = MetricConfig::Aggregate(AggregateConfig {
            id: "pdu".to_string(),
            bindings: vec![],
            combine: Combine::Sum,
        });
        assert_eq!(
            validate_metric_config(&empty_aggregate),
            Err(ValidationError::NoBindings)
        );

        let negative_rate = MetricConfig::Cost(CostConfig {
            id: "bill".to_string(),
            binding: SourceBinding::new("m", "p"),
            rate: -1.0,
        });
        assert_eq!(
            validate_metric_config(&negative_rate),
            Err(ValidationError::InvalidRate(-1.0))
        );

        let ratio = MetricConfig::Ratio(RatioConfig {
            id: "pue".to_string(),
            numerator: SourceBinding::new("", "p"),
            denominator: AggregateConfig {
                id: "it".to_string(),
                bindings: vec![SourceBinding::new("pdu", "p")],
                combine: Combine::Sum,
            },
        });
        assert_eq!(
            validate_metric_config(&ratio),
            Err(ValidationError::IncompleteBinding)
        );
    }

    #[test]
    fn test_metric_config_without_id_fails() {
        let config = MetricConfig::Cost(CostConfig {
            id: String::new(),
            binding: SourceBinding::new("m", "p"),
            rate: 0.2,
        });
        assert_eq!(validate_metric_config(&config), Err(ValidationError::MissingId));
    }
}
