// 💰 Balance Entity - append-only amount history of a client
//
// New rows are inserted as current (`actual_flag = true`); balance
// actualization then clears the flag on the rows they supersede.

use super::{Client, Entity, Record};
use crate::error::DataError;
use crate::fields;
use crate::schema::{Cardinality, Column, ColumnDefault, ColumnType, EntityKind, EntityMeta, Relation};
use crate::value::FieldMap;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub static META: EntityMeta = EntityMeta {
    kind: EntityKind::Balance,
    name: "Balance",
    table: "balance",
    columns: &[
        Column::new("row_id", ColumnType::Integer).primary_key(),
        Column::new("current_amount", ColumnType::Money),
        Column::new("actual_flag", ColumnType::Bool)
            .default(ColumnDefault::Bool(true))
            .managed(),
        Column::new("processed_datetime", ColumnType::DateTime).default(ColumnDefault::Now),
        Column::new("client_id", ColumnType::Integer),
    ],
    relations: &[Relation {
        name: "client",
        target: EntityKind::Client,
        local: "client_id",
        remote: "client_id",
        cardinality: Cardinality::One,
        order_by: None,
    }],
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub row_id: i64,
    pub current_amount: Decimal,
    pub actual_flag: bool,
    pub processed_datetime: DateTime<Utc>,
    pub client_id: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<Box<Client>>,
}

impl Entity for Balance {
    const KIND: EntityKind = EntityKind::Balance;

    fn from_record(mut record: Record) -> Result<Self, DataError> {
        Ok(Balance {
            row_id: record.int("row_id")?,
            current_amount: record.money("current_amount")?,
            actual_flag: record.boolean("actual_flag")?,
            processed_datetime: record.datetime("processed_datetime")?,
            client_id: record.int("client_id")?,
            client: record.take_one::<Client>("client")?.map(Box::new),
        })
    }

    fn to_fields(&self) -> FieldMap {
        fields! {
            "row_id" => self.row_id,
            "current_amount" => self.current_amount,
            "actual_flag" => self.actual_flag,
            "processed_datetime" => self.processed_datetime,
            "client_id" => self.client_id,
        }
    }
}
