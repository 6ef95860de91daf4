// 📐 Shape Layer - static entity metadata
//
// Every identifier that ends up in SQL text comes from here. User input only
// ever names a field, which is looked up against these tables first.

use crate::entities::{balance, card, client, status, transaction};
use crate::error::DataError;
use crate::value::{minor_to_money, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rusqlite::types::ValueRef;
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;

// ============================================================================
// ENTITY KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EntityKind {
    Status,
    Client,
    Balance,
    Card,
    Transaction,
}

impl EntityKind {
    pub fn meta(self) -> &'static EntityMeta {
        match self {
            EntityKind::Status => &status::META,
            EntityKind::Client => &client::META,
            EntityKind::Balance => &balance::META,
            EntityKind::Card => &card::META,
            EntityKind::Transaction => &transaction::META,
        }
    }

    pub fn name(self) -> &'static str {
        self.meta().name
    }
}

// ============================================================================
// COLUMNS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Text,
    /// DECIMAL(10, 2)
    Money,
    Bool,
    Date,
    DateTime,
    /// Text restricted to the listed upper-case names
    Enum(&'static [&'static str]),
}

/// Value filled in by enrichment when an insert omits the column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnDefault {
    Int(i64),
    Bool(bool),
    /// Date of the statement's build time
    Today,
    /// The statement's build time
    Now,
}

impl ColumnDefault {
    pub fn resolve(&self, at: DateTime<Utc>) -> Value {
        match self {
            ColumnDefault::Int(i) => Value::Int(*i),
            ColumnDefault::Bool(b) => Value::Bool(*b),
            ColumnDefault::Today => Value::Date(at.date_naive()),
            ColumnDefault::Now => Value::DateTime(at),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
    pub primary_key: bool,
    pub default: Option<ColumnDefault>,
    /// Written only by balance actualization
    pub managed: bool,
}

impl Column {
    pub const fn new(name: &'static str, ty: ColumnType) -> Self {
        Column {
            name,
            ty,
            primary_key: false,
            default: None,
            managed: false,
        }
    }

    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub const fn default(mut self, default: ColumnDefault) -> Self {
        self.default = Some(default);
        self
    }

    pub const fn managed(mut self) -> Self {
        self.managed = true;
        self
    }
}

impl ColumnType {
    /// Bring a caller value to this column's representation
    ///
    /// Lists pass through element-wise so `in`/`between` operands coerce too.
    pub fn coerce(&self, value: Value) -> Result<Value, String> {
        match (self, value) {
            (_, Value::Null) => Ok(Value::Null),
            (_, Value::List(items)) => items
                .into_iter()
                .map(|item| self.coerce(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),

            (ColumnType::Integer, Value::Int(i)) => Ok(Value::Int(i)),
            (ColumnType::Integer, Value::Text(s)) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| format!("'{}' is not an integer", s)),

            (ColumnType::Text, Value::Text(s)) => Ok(Value::Text(s)),

            (ColumnType::Money, Value::Money(d)) => Ok(Value::Money(d)),
            (ColumnType::Money, Value::Int(i)) => Ok(Value::Money(Decimal::from(i))),
            (ColumnType::Money, Value::Text(s)) => Decimal::from_str(s.trim())
                .map(Value::Money)
                .map_err(|_| format!("'{}' is not a decimal amount", s)),

            (ColumnType::Bool, Value::Bool(b)) => Ok(Value::Bool(b)),
            (ColumnType::Bool, Value::Int(i @ (0 | 1))) => Ok(Value::Bool(i == 1)),

            (ColumnType::Date, Value::Date(d)) => Ok(Value::Date(d)),
            (ColumnType::Date, Value::Text(s)) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map(Value::Date)
                .map_err(|e| format!("'{}' is not a date: {}", s, e)),

            (ColumnType::DateTime, Value::DateTime(dt)) => Ok(Value::DateTime(dt)),
            (ColumnType::DateTime, Value::Text(s)) => parse_datetime(&s).map(Value::DateTime),

            (ColumnType::Enum(variants), Value::Text(s)) => {
                let upper = s.to_ascii_uppercase();
                if variants.contains(&upper.as_str()) {
                    Ok(Value::Text(upper))
                } else {
                    Err(format!("'{}' is not one of {:?}", s, variants))
                }
            }

            (ty, other) => Err(format!("{} value can't be used as {:?}", other.type_name(), ty)),
        }
    }

    /// Turn a raw SQLite cell into a Value of this column's type
    pub fn decode(&self, raw: ValueRef<'_>) -> Result<Value, String> {
        match (self, raw) {
            (_, ValueRef::Null) => Ok(Value::Null),
            (ColumnType::Integer, ValueRef::Integer(i)) => Ok(Value::Int(i)),
            (ColumnType::Money, ValueRef::Integer(i)) => Ok(Value::Money(minor_to_money(i))),
            (ColumnType::Bool, ValueRef::Integer(i)) => Ok(Value::Bool(i != 0)),
            (ColumnType::Text | ColumnType::Enum(_), ValueRef::Text(bytes)) => {
                Ok(Value::Text(text_of(bytes)?))
            }
            (ColumnType::Date, ValueRef::Text(bytes)) => {
                let text = text_of(bytes)?;
                NaiveDate::parse_from_str(&text, "%Y-%m-%d")
                    .map(Value::Date)
                    .map_err(|e| format!("bad date '{}': {}", text, e))
            }
            (ColumnType::DateTime, ValueRef::Text(bytes)) => {
                parse_datetime(&text_of(bytes)?).map(Value::DateTime)
            }
            (ty, other) => Err(format!("unexpected {:?} cell for {:?} column", other.data_type(), ty)),
        }
    }
}

fn text_of(bytes: &[u8]) -> Result<String, String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| format!("invalid utf-8: {}", e))
}

/// RFC 3339, or a naive `YYYY-MM-DD HH:MM:SS` taken as UTC
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, String> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("'{}' is not a timestamp: {}", s, e))
}

// ============================================================================
// RELATIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// `local` column on this entity matches `remote` column on `target`
#[derive(Debug, Clone, Copy)]
pub struct Relation {
    pub name: &'static str,
    pub target: EntityKind,
    pub local: &'static str,
    pub remote: &'static str,
    pub cardinality: Cardinality,
    /// Ascending order applied when a to-many relation is loaded
    pub order_by: Option<&'static str>,
}

// ============================================================================
// ENTITY META
// ============================================================================

#[derive(Debug)]
pub struct EntityMeta {
    pub kind: EntityKind,
    /// Display name used in messages
    pub name: &'static str,
    pub table: &'static str,
    pub columns: &'static [Column],
    pub relations: &'static [Relation],
}

impl EntityMeta {
    pub fn column(&self, name: &str) -> Option<&'static Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Look up a caller-supplied field name
    pub fn require_column(&self, name: &str) -> Result<&'static Column, DataError> {
        self.column(name).ok_or_else(|| DataError::UnknownField {
            entity: self.name,
            field: name.to_string(),
        })
    }

    pub fn primary_keys(&self) -> impl Iterator<Item = &'static Column> {
        self.columns.iter().filter(|c| c.primary_key)
    }

    pub fn relation(&self, name: &str) -> Option<&'static Relation> {
        self.relations.iter().find(|r| r.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_relation_points_at_real_columns() {
        for kind in [
            EntityKind::Status,
            EntityKind::Client,
            EntityKind::Balance,
            EntityKind::Card,
            EntityKind::Transaction,
        ] {
            let meta = kind.meta();
            assert_eq!(meta.kind, kind);
            assert!(meta.primary_keys().count() >= 1, "{} has no primary key", meta.name);

            for rel in meta.relations {
                assert!(meta.column(rel.local).is_some(), "{}.{}", meta.name, rel.local);
                assert!(rel.target.meta().column(rel.remote).is_some(), "{} -> {}", rel.name, rel.remote);
                if let Some(order) = rel.order_by {
                    assert!(rel.target.meta().column(order).is_some());
                }
            }
        }
    }

    #[test]
    fn test_coerce_money_and_dates() {
        assert_eq!(ColumnType::Money.coerce(Value::Int(5)), Ok(Value::Money(Decimal::from(5))));
        assert_eq!(
            ColumnType::Money.coerce(Value::from("12.30")),
            Ok(Value::Money(Decimal::from_str("12.30").unwrap()))
        );
        assert_eq!(
            ColumnType::Date.coerce(Value::from("2024-02-29")),
            Ok(Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()))
        );
        assert!(ColumnType::Date.coerce(Value::from("yesterday")).is_err());
        assert!(ColumnType::Integer.coerce(Value::Bool(true)).is_err());
    }

    #[test]
    fn test_coerce_enum_and_lists() {
        let sex = ColumnType::Enum(&["MALE", "FEMALE"]);
        assert_eq!(sex.coerce(Value::from("female")), Ok(Value::from("FEMALE")));
        assert!(sex.coerce(Value::from("other")).is_err());

        assert_eq!(
            ColumnType::Money.coerce(Value::from(vec![1, 2])),
            Ok(Value::List(vec![Value::Money(Decimal::from(1)), Value::Money(Decimal::from(2))]))
        );
    }

    #[test]
    fn test_decode_cells() {
        assert_eq!(
            ColumnType::Money.decode(ValueRef::Integer(1050)),
            Ok(Value::Money(Decimal::from_str("10.50").unwrap()))
        );
        assert_eq!(ColumnType::Bool.decode(ValueRef::Integer(0)), Ok(Value::Bool(false)));
        assert_eq!(ColumnType::Date.decode(ValueRef::Null), Ok(Value::Null));
        assert!(ColumnType::Integer.decode(ValueRef::Text(b"x")).is_err());
    }
}
