use crate::device::SourceBinding;
use crate::payload::parse_number;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// Declared type a condition compares in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Number,
    String,
    Boolean,
}

/// A value coerced to one of the declared types
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Number(f64),
    Text(String),
    Boolean(bool),
}

impl ValueType {
    /// Coerce a payload value.
    ///
    /// - number: JSON number or numeric string
    /// - boolean: JSON bool or the exact strings `"true"` / `"false"`
    /// - string: text as-is, numbers and bools rendered as text
    pub fn coerce(&self, value: &Value) -> Option<Literal> {
        match self {
            ValueType::Number => parse_number(value).map(Literal::Number),
            ValueType::Boolean => match value {
                Value::Bool(b) => Some(Literal::Boolean(*b)),
                Value::String(s) if s == "true" => Some(Literal::Boolean(true)),
                Value::String(s) if s == "false" => Some(Literal::Boolean(false)),
                _ => None,
            },
            ValueType::String => match value {
                Value::String(s) => Some(Literal::Text(s.clone())),
                Value::Number(n) => Some(Literal::Text(n.to_string())),
                Value::Bool(b) => Some(Literal::Text(b.to_string())),
                _ => None,
            },
        }
    }

    /// Parse a configured literal in this type
    pub fn parse_literal(&self, raw: &str) -> Option<Literal> {
        self.coerce(&Value::String(raw.to_string()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl Operator {
    fn holds(&self, ordering: Ordering) -> bool {
        match self {
            Operator::Gt => ordering == Ordering::Greater,
            Operator::Ge => ordering != Ordering::Less,
            Operator::Lt => ordering == Ordering::Less,
            Operator::Le => ordering != Ordering::Greater,
            Operator::Eq => ordering == Ordering::Equal,
            Operator::Ne => ordering != Ordering::Equal,
        }
    }

    /// Compare `lhs <op> rhs`. Mismatched types never hold; booleans only
    /// support equality.
    pub fn apply(&self, lhs: &Literal, rhs: &Literal) -> bool {
        match (lhs, rhs) {
            (Literal::Number(a), Literal::Number(b)) => {
                a.partial_cmp(b).map_or(false, |o| self.holds(o))
            }
            (Literal::Text(a), Literal::Text(b)) => self.holds(a.cmp(b)),
            (Literal::Boolean(a), Literal::Boolean(b)) => match self {
                Operator::Eq => a == b,
                Operator::Ne => a != b,
                _ => false,
            },
            _ => false,
        }
    }
}

/// How a state folds its conditions
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Combinator {
    #[default]
    #[serde(rename = "AND", alias = "and")]
    And,
    #[serde(rename = "OR", alias = "or")]
    Or,
}

/// One threshold test
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub operator: Operator,
    /// Literal as entered; validated against `value_type` on save
    #[serde(deserialize_with = "deserialize_literal")]
    pub value: String,
    #[serde(rename = "valueType")]
    pub value_type: ValueType,
}

impl Condition {
    pub fn new(operator: Operator, value: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            operator,
            value: value.into(),
            value_type,
        }
    }

    /// Whether `value` satisfies this condition. Values or literals that
    /// cannot be coerced never match.
    pub fn matches(&self, value: &Value) -> bool {
        let (Some(lhs), Some(rhs)) = (
            self.value_type.coerce(value),
            self.value_type.parse_literal(&self.value),
        ) else {
            return false;
        };
        self.operator.apply(&lhs, &rhs)
    }
}

/// A named visual state of an indicator
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogicState {
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub animated: bool,
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub combinator: Combinator,
}

impl LogicState {
    /// A state without conditions is never active
    pub fn is_active(&self, value: &Value) -> bool {
        if self.conditions.is_empty() {
            return false;
        }
        match self.combinator {
            Combinator::And => self.conditions.iter().all(|c| c.matches(value)),
            Combinator::Or => self.conditions.iter().any(|c| c.matches(value)),
        }
    }
}

/// Ordered states of one indicator
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConditionSet {
    pub id: String,
    pub states: Vec<LogicState>,
    #[serde(rename = "defaultStateName")]
    pub default_state_name: String,
    /// Live source driving the indicator, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding: Option<SourceBinding>,
}

impl ConditionSet {
    pub fn bindings(&self) -> Vec<&SourceBinding> {
        self.binding.iter().collect()
    }

    pub fn reads_from(&self, device_ids: &[String]) -> bool {
        self.binding
            .as_ref()
            .map_or(false, |b| device_ids.contains(&b.device_id))
    }

    pub fn has_state(&self, name: &str) -> bool {
        self.states.iter().any(|s| s.name == name)
    }
}

/// Literals may arrive as JSON strings, numbers or bools
fn deserialize_literal<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}
