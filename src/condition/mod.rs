// Multi-state indicator logic

mod evaluator;
mod model;


pub use evaluator::evaluate;
pub use model::{Combinator, Condition, ConditionSet, Literal, LogicState, Operator, ValueType};
