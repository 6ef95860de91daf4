// 👤 Client Entity - bank client with balance history and VIP classification
//
// The VIP flag is derived: it follows the amount of the client's current
// balance. `actualize_balance` is the only code that writes it (and the
// balances' `actual_flag`).

use super::{Balance, Card, Entity, Mutable, Record, Status};
use crate::error::DataError;
use crate::fields;
use crate::schema::{Cardinality, Column, ColumnDefault, ColumnType, EntityKind, EntityMeta, Relation};
use crate::value::FieldMap;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::status::DEFAULT_STATUS;

/// Current balance at or above this amount makes the client VIP
pub const VIP_BALANCE_THRESHOLD: Decimal = Decimal::from_parts(900000, 0, 0, false, 0);

const SEX_VARIANTS: &[&str] = &["MALE", "FEMALE"];

pub static META: EntityMeta = EntityMeta {
    kind: EntityKind::Client,
    name: "Client",
    table: "client",
    columns: &[
        Column::new("client_id", ColumnType::Integer).primary_key(),
        Column::new("full_name", ColumnType::Text),
        Column::new("reg_date", ColumnType::Date).default(ColumnDefault::Today),
        Column::new("doc_num", ColumnType::Text),
        Column::new("doc_series", ColumnType::Text),
        Column::new("phone", ColumnType::Text),
        Column::new("VIP_flag", ColumnType::Bool)
            .default(ColumnDefault::Bool(false))
            .managed(),
        Column::new("birth_date", ColumnType::Date),
        Column::new("sex", ColumnType::Enum(SEX_VARIANTS)),
        Column::new("status", ColumnType::Integer).default(ColumnDefault::Int(DEFAULT_STATUS)),
    ],
    relations: &[
        Relation {
            name: "client_status",
            target: EntityKind::Status,
            local: "status",
            remote: "status",
            cardinality: Cardinality::One,
            order_by: None,
        },
        Relation {
            name: "balances",
            target: EntityKind::Balance,
            local: "client_id",
            remote: "client_id",
            cardinality: Cardinality::Many,
            // Actualization relies on this order
            order_by: Some("processed_datetime"),
        },
        Relation {
            name: "cards",
            target: EntityKind::Card,
            local: "client_id",
            remote: "client_id",
            cardinality: Cardinality::Many,
            order_by: None,
        },
    ],
};

// ============================================================================
// SEX
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Male => "MALE",
            Sex::Female => "FEMALE",
        }
    }

    pub fn parse(s: &str) -> Option<Sex> {
        match s {
            "MALE" => Some(Sex::Male),
            "FEMALE" => Some(Sex::Female),
            _ => None,
        }
    }
}

// ============================================================================
// CLIENT ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub client_id: i64,
    pub full_name: String,
    pub reg_date: NaiveDate,
    pub doc_num: String,
    pub doc_series: String,
    pub phone: String,
    #[serde(rename = "VIP_flag")]
    pub vip_flag: bool,
    pub birth_date: NaiveDate,
    pub sex: Sex,
    pub status: i64,

    // Relations (present only when eager-loaded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_status: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balances: Option<Vec<Balance>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cards: Option<Vec<Card>>,
}

/// What one actualization pass changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actualization {
    pub client_id: i64,
    /// Balance that stays current
    pub current_row_id: i64,
    pub current_amount: Decimal,
    /// Balances whose `actual_flag` was cleared, in processing order
    pub cleared: Vec<i64>,
    pub vip_flag: bool,
    pub vip_changed: bool,
}

impl Client {
    /// Keep exactly one current balance and recompute the VIP flag from it
    ///
    /// Among the balances currently flagged actual, the latest by processing
    /// time (then row id) stays current and every other one is cleared.
    /// Requires `balances` to be loaded; a client with no current balance
    /// is an invariant violation.
    pub fn actualize_balance(&mut self) -> Result<Actualization, DataError> {
        let client_id = self.client_id;
        let balances = self.balances.as_mut().ok_or(DataError::RelationNotLoaded {
            entity: META.name,
            relation: "balances",
        })?;
        let mut current: Vec<&mut Balance> = balances.iter_mut().filter(|b| b.actual_flag).collect();

        current.sort_by_key(|b| (b.processed_datetime, b.row_id));

        let Some((last, stale)) = current.split_last_mut() else {
            return Err(DataError::InvariantViolation(format!(
                "Client with client_id={} has no actual balance",
                client_id
            )));
        };
        let mut cleared = Vec::with_capacity(stale.len());
        for balance in stale.iter_mut() {
            balance.actual_flag = false;
            cleared.push(balance.row_id);
        }
        let (current_row_id, current_amount) = (last.row_id, last.current_amount);

        let vip_changed = self.actualize_vip_status(current_amount);

        Ok(Actualization {
            client_id,
            current_row_id,
            current_amount,
            cleared,
            vip_flag: self.vip_flag,
            vip_changed,
        })
    }

    /// Set the VIP flag for `amount`; returns whether it changed
    pub fn actualize_vip_status(&mut self, amount: Decimal) -> bool {
        let should_be_vip = amount >= VIP_BALANCE_THRESHOLD;
        if self.vip_flag == should_be_vip {
            return false;
        }
        self.vip_flag = should_be_vip;
        true
    }

    /// The balance flagged current, if balances are loaded
    pub fn current_balance(&self) -> Option<&Balance> {
        self.balances.as_deref()?.iter().find(|b| b.actual_flag)
    }
}

impl Entity for Client {
    const KIND: EntityKind = EntityKind::Client;

    fn from_record(mut record: Record) -> Result<Self, DataError> {
        let sex_text = record.text("sex")?;
        let sex = Sex::parse(&sex_text).ok_or_else(|| DataError::Decode {
            entity: META.name,
            column: "sex".to_string(),
            reason: format!("unknown sex '{}'", sex_text),
        })?;

        Ok(Client {
            client_id: record.int("client_id")?,
            full_name: record.text("full_name")?,
            reg_date: record.date("reg_date")?,
            doc_num: record.text("doc_num")?,
            doc_series: record.text("doc_series")?,
            phone: record.text("phone")?,
            vip_flag: record.boolean("VIP_flag")?,
            birth_date: record.date("birth_date")?,
            sex,
            status: record.int("status")?,
            client_status: record.take_one("client_status")?,
            balances: record.take_many("balances")?,
            cards: record.take_many("cards")?,
        })
    }

    fn to_fields(&self) -> FieldMap {
        fields! {
            "client_id" => self.client_id,
            "full_name" => self.full_name.as_str(),
            "reg_date" => self.reg_date,
            "doc_num" => self.doc_num.as_str(),
            "doc_series" => self.doc_series.as_str(),
            "phone" => self.phone.as_str(),
            "VIP_flag" => self.vip_flag,
            "birth_date" => self.birth_date,
            "sex" => self.sex.as_str(),
            "status" => self.status,
        }
    }
}

impl Mutable for Client {}
