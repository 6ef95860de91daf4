// 💳 Card Entity - belongs to a client, owns transactions
//
// `close_date >= open_date` is a CHECK constraint on the table.

use super::{Client, Entity, Mutable, Record, Transaction};
use crate::error::DataError;
use crate::fields;
use crate::schema::{Cardinality, Column, ColumnDefault, ColumnType, EntityKind, EntityMeta, Relation};
use crate::value::FieldMap;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

const CARD_TYPE_VARIANTS: &[&str] = &["DEBIT", "CREDIT"];

pub static META: EntityMeta = EntityMeta {
    kind: EntityKind::Card,
    name: "Card",
    table: "card",
    columns: &[
        Column::new("card_number", ColumnType::Text).primary_key(),
        Column::new("card_type", ColumnType::Enum(CARD_TYPE_VARIANTS)),
        Column::new("open_date", ColumnType::Date),
        Column::new("close_date", ColumnType::Date),
        Column::new("processed_datetime", ColumnType::DateTime).default(ColumnDefault::Now),
        Column::new("client_id", ColumnType::Integer),
    ],
    relations: &[
        Relation {
            name: "client",
            target: EntityKind::Client,
            local: "client_id",
            remote: "client_id",
            cardinality: Cardinality::One,
            order_by: None,
        },
        Relation {
            name: "transactions",
            target: EntityKind::Transaction,
            local: "card_number",
            remote: "card_number",
            cardinality: Cardinality::Many,
            order_by: Some("trans_datetime"),
        },
    ],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CardType {
    Debit,
    Credit,
}

impl CardType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardType::Debit => "DEBIT",
            CardType::Credit => "CREDIT",
        }
    }

    pub fn parse(s: &str) -> Option<CardType> {
        match s {
            "DEBIT" => Some(CardType::Debit),
            "CREDIT" => Some(CardType::Credit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub card_number: String,
    pub card_type: CardType,
    pub open_date: NaiveDate,
    pub close_date: NaiveDate,
    pub processed_datetime: DateTime<Utc>,
    pub client_id: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<Box<Client>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transactions: Option<Vec<Transaction>>,
}

impl Entity for Card {
    const KIND: EntityKind = EntityKind::Card;

    fn from_record(mut record: Record) -> Result<Self, DataError> {
        let type_text = record.text("card_type")?;
        let card_type = CardType::parse(&type_text).ok_or_else(|| DataError::Decode {
            entity: META.name,
            column: "card_type".to_string(),
            reason: format!("unknown card type '{}'", type_text),
        })?;

        Ok(Card {
            card_number: record.text("card_number")?,
            card_type,
            open_date: record.date("open_date")?,
            close_date: record.date("close_date")?,
            processed_datetime: record.datetime("processed_datetime")?,
            client_id: record.int("client_id")?,
            client: record.take_one::<Client>("client")?.map(Box::new),
            transactions: record.take_many("transactions")?,
        })
    }

    fn to_fields(&self) -> FieldMap {
        fields! {
            "card_number" => self.card_number.as_str(),
            "card_type" => self.card_type.as_str(),
            "open_date" => self.open_date,
            "close_date" => self.close_date,
            "processed_datetime" => self.processed_datetime,
            "client_id" => self.client_id,
        }
    }
}

impl Mutable for Card {}
