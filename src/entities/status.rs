// 🏷️ Status Entity - reference codes that clients point to
//
// Rows can't be removed while a client references them; the foreign key
// in `setup_database` enforces that, not this module.

use super::{Entity, Mutable, Record};
use crate::error::DataError;
use crate::fields;
use crate::schema::{Column, ColumnType, EntityKind, EntityMeta};
use crate::value::FieldMap;
use serde::{Deserialize, Serialize};

/// Status assigned to new clients
pub const DEFAULT_STATUS: i64 = 200;

pub static META: EntityMeta = EntityMeta {
    kind: EntityKind::Status,
    name: "Status",
    table: "status_desc",
    columns: &[
        Column::new("status", ColumnType::Integer).primary_key(),
        Column::new("description", ColumnType::Text),
    ],
    relations: &[],
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub status: i64,
    pub description: String,
}

impl Entity for Status {
    const KIND: EntityKind = EntityKind::Status;

    fn from_record(record: Record) -> Result<Self, DataError> {
        Ok(Status {
            status: record.int("status")?,
            description: record.text("description")?,
        })
    }

    fn to_fields(&self) -> FieldMap {
        fields! {
            "status" => self.status,
            "description" => self.description.as_str(),
        }
    }
}

impl Mutable for Status {}
