// Entity Models - clients, their balances, cards and transactions
//
// Each entity has:
// - Static metadata (table, columns, relations) in its `META`
// - A typed struct decoded from a dynamic `Record`
// - A way back to a `FieldMap` for writes

pub mod balance;
pub mod card;
pub mod client;
pub mod status;
pub mod transaction;

pub use balance::Balance;
pub use card::{Card, CardType};
pub use client::{Actualization, Client, Sex, VIP_BALANCE_THRESHOLD};
pub use status::Status;
pub use transaction::Transaction;

use crate::error::DataError;
use crate::schema::{EntityKind, EntityMeta};
use crate::value::{FieldMap, Value};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

// ============================================================================
// ENTITY TRAIT
// ============================================================================

/// A persisted record type the Manager can build statements for
pub trait Entity: Sized {
    const KIND: EntityKind;

    fn meta() -> &'static EntityMeta {
        Self::KIND.meta()
    }

    fn from_record(record: Record) -> Result<Self, DataError>;

    /// Column values of this instance (relations excluded)
    fn to_fields(&self) -> FieldMap;
}

/// Entities whose rows may be updated and deleted through the public API
///
/// Balance is append-only; its rows change only through actualization.
pub trait Mutable: Entity {}

// ============================================================================
// RECORD
// ============================================================================

/// Loaded relation of a record
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    One(Option<Box<Record>>),
    Many(Vec<Record>),
}

/// One decoded row plus whatever relations were eager-loaded with it
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub entity: EntityKind,
    pub fields: FieldMap,
    pub relations: BTreeMap<&'static str, Related>,
}

impl Record {
    pub fn new(entity: EntityKind, fields: FieldMap) -> Self {
        Record {
            entity,
            fields,
            relations: BTreeMap::new(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }

    fn decode_err(&self, column: &str, reason: impl Into<String>) -> DataError {
        DataError::Decode {
            entity: self.entity.name(),
            column: column.to_string(),
            reason: reason.into(),
        }
    }

    fn required(&self, column: &str) -> Result<&Value, DataError> {
        match self.fields.get(column) {
            Some(Value::Null) => Err(self.decode_err(column, "unexpected NULL")),
            Some(v) => Ok(v),
            None => Err(self.decode_err(column, "column missing from row")),
        }
    }

    pub fn int(&self, column: &str) -> Result<i64, DataError> {
        match self.required(column)? {
            Value::Int(i) => Ok(*i),
            other => Err(self.decode_err(column, format!("expected int, got {}", other.type_name()))),
        }
    }

    pub fn text(&self, column: &str) -> Result<String, DataError> {
        match self.required(column)? {
            Value::Text(s) => Ok(s.clone()),
            other => Err(self.decode_err(column, format!("expected text, got {}", other.type_name()))),
        }
    }

    pub fn money(&self, column: &str) -> Result<Decimal, DataError> {
        match self.required(column)? {
            Value::Money(d) => Ok(*d),
            other => Err(self.decode_err(column, format!("expected money, got {}", other.type_name()))),
        }
    }

    pub fn boolean(&self, column: &str) -> Result<bool, DataError> {
        match self.required(column)? {
            Value::Bool(b) => Ok(*b),
            other => Err(self.decode_err(column, format!("expected bool, got {}", other.type_name()))),
        }
    }

    pub fn date(&self, column: &str) -> Result<NaiveDate, DataError> {
        match self.required(column)? {
            Value::Date(d) => Ok(*d),
            other => Err(self.decode_err(column, format!("expected date, got {}", other.type_name()))),
        }
    }

    pub fn datetime(&self, column: &str) -> Result<DateTime<Utc>, DataError> {
        match self.required(column)? {
            Value::DateTime(dt) => Ok(*dt),
            other => Err(self.decode_err(column, format!("expected datetime, got {}", other.type_name()))),
        }
    }

    /// Take a to-one relation, if it was loaded and present
    pub fn take_one<E: Entity>(&mut self, relation: &str) -> Result<Option<E>, DataError> {
        match self.relations.remove(relation) {
            Some(Related::One(Some(record))) => E::from_record(*record).map(Some),
            Some(Related::One(None)) | None => Ok(None),
            Some(Related::Many(_)) => Err(self.decode_err(relation, "expected a to-one relation")),
        }
    }

    /// Take a to-many relation; `None` when it was not loaded
    pub fn take_many<E: Entity>(&mut self, relation: &str) -> Result<Option<Vec<E>>, DataError> {
        match self.relations.remove(relation) {
            Some(Related::Many(records)) => records.into_iter().map(E::from_record).collect::<Result<_, _>>().map(Some),
            None => Ok(None),
            Some(Related::One(_)) => Err(self.decode_err(relation, "expected a to-many relation")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;

    #[test]
    fn test_record_accessors() {
        let record = Record::new(
            EntityKind::Status,
            fields! { "status" => 200, "description" => "Active" },
        );

        assert_eq!(record.int("status").unwrap(), 200);
        assert_eq!(record.text("description").unwrap(), "Active");
        assert!(matches!(record.text("status"), Err(DataError::Decode { .. })));
        assert!(matches!(record.int("missing"), Err(DataError::Decode { .. })));
    }

    #[test]
    fn test_unloaded_relations() {
        let mut record = Record::new(EntityKind::Client, FieldMap::new());
        assert!(record.take_one::<Status>("client_status").unwrap().is_none());
        assert!(record.take_many::<Balance>("balances").unwrap().is_none());

        record.relations.insert("balances", Related::Many(Vec::new()));
        assert_eq!(record.take_many::<Balance>("balances").unwrap(), Some(Vec::new()));
    }
}
