// 🔎 Predicate Parser - constraint maps to condition ASTs
//
// Grammar of a constraint key:
//   field            equality
//   field__operator  one of gt, lt, ge, le, eq, noteq/not_eq, in,
//                    notin/not_in, between
//
// Field names are resolved against entity metadata and values are coerced
// to the column type here, so a Condition is always safe to render.

use crate::error::DataError;
use crate::schema::EntityMeta;
use crate::value::{Constraints, Param, Value};
use std::fmt;
use std::str::FromStr;

const OPERATOR_SEPARATOR: &str = "__";

// ============================================================================
// OPERATORS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    NotEq,
    In,
    NotIn,
    Between,
}

impl Operator {
    pub const SUPPORTED: &'static [&'static str] = &[
        "gt", "lt", "ge", "le", "eq", "noteq", "not_eq", "in", "notin", "not_in", "between",
    ];
}

impl FromStr for Operator {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gt" => Ok(Operator::Gt),
            "lt" => Ok(Operator::Lt),
            "ge" => Ok(Operator::Ge),
            "le" => Ok(Operator::Le),
            "eq" => Ok(Operator::Eq),
            "noteq" | "not_eq" => Ok(Operator::NotEq),
            "in" => Ok(Operator::In),
            "notin" | "not_in" => Ok(Operator::NotIn),
            "between" => Ok(Operator::Between),
            _ => Err(()),
        }
    }
}

/// Binary comparison carried by `Condition::Cmp`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Gt,
    Lt,
    Ge,
    Le,
    NotEq,
}

impl Comparison {
    pub fn sql(&self) -> &'static str {
        match self {
            Comparison::Gt => ">",
            Comparison::Lt => "<",
            Comparison::Ge => ">=",
            Comparison::Le => "<=",
            Comparison::NotEq => "!=",
        }
    }
}

// ============================================================================
// CONDITION AST
// ============================================================================

/// One boolean test on one field; `field` is always a column of the entity
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Matches every row (the empty constraint map)
    True,
    Eq { field: &'static str, value: Value },
    Cmp { field: &'static str, op: Comparison, value: Value },
    In { field: &'static str, values: Vec<Value> },
    NotIn { field: &'static str, values: Vec<Value> },
    /// Inclusive on both ends
    Between { field: &'static str, low: Value, high: Value },
}

impl Condition {
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Condition::True => None,
            Condition::Eq { field, .. }
            | Condition::Cmp { field, .. }
            | Condition::In { field, .. }
            | Condition::NotIn { field, .. }
            | Condition::Between { field, .. } => Some(*field),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::True => write!(f, "true"),
            Condition::Eq { field, value } => write!(f, "{} == {}", field, value),
            Condition::Cmp { field, op, value } => write!(f, "{} {} {}", field, op.sql(), value),
            Condition::In { field, values } => write!(f, "{} in {}", field, Value::List(values.clone())),
            Condition::NotIn { field, values } => {
                write!(f, "{} not in {}", field, Value::List(values.clone()))
            }
            Condition::Between { field, low, high } => {
                write!(f, "{} between {} and {}", field, low, high)
            }
        }
    }
}

// ============================================================================
// PARSER
// ============================================================================

/// Drop `NotSpecified` entries, keeping only what the caller actually set
pub fn specified(constraints: &Constraints) -> Vec<(&str, &Value)> {
    constraints
        .iter()
        .filter_map(|(key, param)| match param {
            Param::Value(v) => Some((key.as_str(), v)),
            Param::NotSpecified => None,
        })
        .collect()
}

/// Parse a constraint map into conditions on `entity`
///
/// Keys are processed in map order. An empty map (after dropping
/// unspecified params) yields a single `Condition::True`.
pub fn parse_constraints(
    entity: &EntityMeta,
    constraints: &Constraints,
) -> Result<Vec<Condition>, DataError> {
    let pairs = specified(constraints);
    if pairs.is_empty() {
        return Ok(vec![Condition::True]);
    }

    pairs
        .into_iter()
        .map(|(key, value)| parse_condition(entity, key, value.clone()))
        .collect()
}

/// Parse one `field[__op] = value` pair
pub fn parse_condition(entity: &EntityMeta, key: &str, value: Value) -> Result<Condition, DataError> {
    let key = key.trim();
    let (field_name, operator) = match key.split_once(OPERATOR_SEPARATOR) {
        Some((field, op)) => {
            let operator = op.parse::<Operator>().map_err(|_| DataError::UnknownOperator {
                key: key.to_string(),
                operator: op.to_string(),
                supported: Operator::SUPPORTED.join(", "),
            })?;
            (field, operator)
        }
        None => (key, Operator::Eq),
    };

    let column = entity.require_column(field_name)?;
    let field = column.name;
    let value = column.ty.coerce(value).map_err(|reason| DataError::InvalidOperand {
        key: key.to_string(),
        reason,
    })?;

    let condition = match operator {
        Operator::Eq => Condition::Eq { field, value: scalar(key, value)? },
        Operator::NotEq => Condition::Cmp { field, op: Comparison::NotEq, value: scalar(key, value)? },
        Operator::Gt => Condition::Cmp { field, op: Comparison::Gt, value: scalar(key, value)? },
        Operator::Lt => Condition::Cmp { field, op: Comparison::Lt, value: scalar(key, value)? },
        Operator::Ge => Condition::Cmp { field, op: Comparison::Ge, value: scalar(key, value)? },
        Operator::Le => Condition::Cmp { field, op: Comparison::Le, value: scalar(key, value)? },
        Operator::In => Condition::In { field, values: list(key, value)? },
        Operator::NotIn => Condition::NotIn { field, values: list(key, value)? },
        Operator::Between => {
            let mut bounds = list(key, value)?;
            if bounds.len() != 2 {
                return Err(DataError::InvalidOperand {
                    key: key.to_string(),
                    reason: format!("between expects 2 bounds, got {}", bounds.len()),
                });
            }
            let high = bounds.remove(1);
            let low = bounds.remove(0);
            Condition::Between { field, low, high }
        }
    };

    Ok(condition)
}

fn scalar(key: &str, value: Value) -> Result<Value, DataError> {
    match value {
        Value::List(_) => Err(DataError::InvalidOperand {
            key: key.to_string(),
            reason: "expected a single value, got a list".to_string(),
        }),
        other => Ok(other),
    }
}

fn list(key: &str, value: Value) -> Result<Vec<Value>, DataError> {
    match value {
        Value::List(items) => Ok(items),
        other => Err(DataError::InvalidOperand {
            key: key.to_string(),
            reason: format!("expected a list, got {}", other.type_name()),
        }),
    }
}
