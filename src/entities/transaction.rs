// 🧾 Transaction Entity - a card movement with business and processing time

use super::{Card, Entity, Mutable, Record};
use crate::error::DataError;
use crate::fields;
use crate::schema::{Cardinality, Column, ColumnDefault, ColumnType, EntityKind, EntityMeta, Relation};
use crate::value::FieldMap;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub static META: EntityMeta = EntityMeta {
    kind: EntityKind::Transaction,
    name: "Transaction",
    table: "transaction",
    columns: &[
        Column::new("trans_id", ColumnType::Integer).primary_key(),
        Column::new("trans_amount", ColumnType::Money),
        Column::new("trans_datetime", ColumnType::DateTime),
        Column::new("processed_datetime", ColumnType::DateTime).default(ColumnDefault::Now),
        Column::new("card_number", ColumnType::Text),
    ],
    relations: &[Relation {
        name: "card",
        target: EntityKind::Card,
        local: "card_number",
        remote: "card_number",
        cardinality: Cardinality::One,
        order_by: None,
    }],
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub trans_id: i64,
    pub trans_amount: Decimal,
    /// When it happened (business time)
    pub trans_datetime: DateTime<Utc>,
    /// When we recorded it
    pub processed_datetime: DateTime<Utc>,
    pub card_number: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<Box<Card>>,
}

impl Entity for Transaction {
    const KIND: EntityKind = EntityKind::Transaction;

    fn from_record(mut record: Record) -> Result<Self, DataError> {
        Ok(Transaction {
            trans_id: record.int("trans_id")?,
            trans_amount: record.money("trans_amount")?,
            trans_datetime: record.datetime("trans_datetime")?,
            processed_datetime: record.datetime("processed_datetime")?,
            card_number: record.text("card_number")?,
            card: record.take_one::<Card>("card")?.map(Box::new),
        })
    }

    fn to_fields(&self) -> FieldMap {
        fields! {
            "trans_id" => self.trans_id,
            "trans_amount" => self.trans_amount,
            "trans_datetime" => self.trans_datetime,
            "processed_datetime" => self.processed_datetime,
            "card_number" => self.card_number.as_str(),
        }
    }
}

impl Mutable for Transaction {}
