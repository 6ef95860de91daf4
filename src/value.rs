// 💱 Values - what flows into statements and back out of rows
//
// A Value is the dynamic form of one column value. Constraint maps carry
// Params, which add the "not specified" sentinel used by optional query
// parameters.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Money columns are DECIMAL(10, 2): stored as integer minor units
pub const MONEY_SCALE: u32 = 2;

/// Column name -> value, used for writes
pub type FieldMap = BTreeMap<String, Value>;

/// Constraint key (`field` or `field__op`) -> parameter, used for filters
pub type Constraints = BTreeMap<String, Param>;

// ============================================================================
// VALUE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Money(Decimal),
    Text(String),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    /// Operand of `in`, `notin` and `between`
    List(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Money(_) => "money",
            Value::Text(_) => "text",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
            Value::List(_) => "list",
        }
    }
}

/// Encode a money amount as minor units (cents)
pub fn money_to_minor(amount: Decimal) -> Option<i64> {
    let mut rounded = amount.round_dp(MONEY_SCALE);
    rounded.rescale(MONEY_SCALE);
    i64::try_from(rounded.mantissa()).ok()
}

/// Decode minor units back into a money amount
pub fn minor_to_money(minor: i64) -> Decimal {
    Decimal::new(minor, MONEY_SCALE)
}

/// Fixed-width timestamp text, so lexical order equals time order
pub fn datetime_to_text(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn date_to_text(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "None"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Money(d) => write!(f, "{}", d),
            Value::Text(s) => write!(f, "{}", s),
            Value::Date(d) => write!(f, "{}", date_to_text(d)),
            Value::DateTime(dt) => write!(f, "{}", datetime_to_text(dt)),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let owned = match self {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
            Value::Int(i) => SqlValue::Integer(*i),
            Value::Money(d) => match money_to_minor(*d) {
                Some(minor) => SqlValue::Integer(minor),
                None => {
                    return Err(rusqlite::Error::ToSqlConversionFailure(
                        format!("money amount {} out of range", d).into(),
                    ))
                }
            },
            Value::Text(s) => SqlValue::Text(s.clone()),
            Value::Date(d) => SqlValue::Text(date_to_text(d)),
            Value::DateTime(dt) => SqlValue::Text(datetime_to_text(dt)),
            Value::List(_) => {
                return Err(rusqlite::Error::ToSqlConversionFailure(
                    "list values must be expanded before binding".into(),
                ))
            }
        };
        Ok(ToSqlOutput::Owned(owned))
    }
}

// ============================================================================
// PARAM (value or "not specified")
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Value(Value),
    /// Optional query parameter the caller did not supply; dropped before parsing
    NotSpecified,
}

impl Param {
    /// Optional inputs map `None` to the sentinel
    pub fn optional<T: Into<Value>>(value: Option<T>) -> Self {
        match value {
            Some(v) => Param::Value(v.into()),
            None => Param::NotSpecified,
        }
    }
}

impl From<Value> for Param {
    fn from(value: Value) -> Self {
        Param::Value(value)
    }
}

macro_rules! impl_value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v.into())
                }
            }

            impl From<$ty> for Param {
                fn from(v: $ty) -> Self {
                    Param::Value(Value::from(v))
                }
            }
        )*
    };
}

impl_value_from! {
    bool => Bool,
    i64 => Int,
    i32 => Int,
    u32 => Int,
    Decimal => Money,
    String => Text,
    &str => Text,
    NaiveDate => Date,
    DateTime<Utc> => DateTime,
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Param {
    fn from(items: Vec<T>) -> Self {
        Param::Value(Value::from(items))
    }
}

impl<A: Into<Value>, B: Into<Value>> From<(A, B)> for Value {
    fn from((low, high): (A, B)) -> Self {
        Value::List(vec![low.into(), high.into()])
    }
}

impl<A: Into<Value>, B: Into<Value>> From<(A, B)> for Param {
    fn from(pair: (A, B)) -> Self {
        Param::Value(Value::from(pair))
    }
}

/// Build a `FieldMap`: `fields! { "full_name" => "Ivan", "phone" => "9001234567" }`
#[macro_export]
macro_rules! fields {
    () => { $crate::value::FieldMap::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::value::FieldMap::new();
        $( map.insert(::std::string::String::from($key), $crate::value::Value::from($value)); )+
        map
    }};
}

/// Build a `Constraints` map: `constraints! { "client_id" => 7, "amount__gt" => 10 }`
#[macro_export]
macro_rules! constraints {
    () => { $crate::value::Constraints::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::value::Constraints::new();
        $( map.insert(::std::string::String::from($key), $crate::value::Param::from($value)); )+
        map
    }};
}
