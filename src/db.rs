// 🗄️ Database - schema bootstrap and statement execution
//
// The executor runs statements against a connection the caller owns. It
// never begins, commits or rolls back; wrap calls in a rusqlite
// `Transaction` when several writes must land together.

use crate::config::Settings;
use crate::entities::{Entity, Record, Related};
use crate::error::DataError;
use crate::logging::SQL_TARGET;
use crate::predicate::Condition;
use crate::schema::{Cardinality, EntityKind};
use crate::statement::kind::Kind;
use crate::statement::{render, Direction, EagerLoad, Query, Rendered, Statement, StatementKind};
use crate::value::{FieldMap, Value};
use chrono::{DateTime, Utc};
use rusqlite::{params_from_iter, Connection, Row};
use tracing::{debug, info};

// ============================================================================
// CONNECTION & SCHEMA
// ============================================================================

/// Open the configured database in WAL mode with foreign keys enforced
pub fn open_database(settings: &Settings) -> Result<Connection, DataError> {
    let conn = Connection::open(&settings.db_path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", true)?;
    info!(path = %settings.db_path.display(), "database opened");
    Ok(conn)
}

/// Create all tables and indexes if they don't exist yet
pub fn setup_database(conn: &Connection) -> Result<(), DataError> {
    // WAL for crash recovery; foreign keys are per connection in SQLite
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", true)?;

    // ==========================================================================
    // Status Table (client status codes)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS status_desc (
            status INTEGER PRIMARY KEY,
            description TEXT NOT NULL CHECK (length(description) <= 100)
        )",
        [],
    )?;

    // ==========================================================================
    // Client Table
    // VIP_flag is maintained by balance actualization
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS client (
            client_id INTEGER PRIMARY KEY AUTOINCREMENT,
            full_name TEXT NOT NULL CHECK (length(full_name) <= 255),
            reg_date TEXT NOT NULL,
            doc_num TEXT NOT NULL CHECK (length(doc_num) <= 10),
            doc_series TEXT NOT NULL CHECK (length(doc_series) <= 10),
            phone TEXT NOT NULL CHECK (length(phone) <= 10),
            VIP_flag INTEGER NOT NULL DEFAULT 0,
            birth_date TEXT NOT NULL,
            sex TEXT NOT NULL CHECK (sex IN ('MALE', 'FEMALE')),
            status INTEGER NOT NULL DEFAULT 200 REFERENCES status_desc(status)
        )",
        [],
    )?;

    // ==========================================================================
    // Balance Table (append-only history, amounts in minor units)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS balance (
            row_id INTEGER PRIMARY KEY AUTOINCREMENT,
            current_amount INTEGER NOT NULL,
            actual_flag INTEGER NOT NULL DEFAULT 1,
            processed_datetime TEXT NOT NULL,
            client_id INTEGER NOT NULL REFERENCES client(client_id) ON DELETE CASCADE
        )",
        [],
    )?;

    // ==========================================================================
    // Card Table
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS card (
            card_number TEXT PRIMARY KEY CHECK (length(card_number) <= 16),
            card_type TEXT NOT NULL CHECK (card_type IN ('DEBIT', 'CREDIT')),
            open_date TEXT NOT NULL,
            close_date TEXT NOT NULL,
            processed_datetime TEXT NOT NULL,
            client_id INTEGER NOT NULL REFERENCES client(client_id) ON DELETE CASCADE,
            CHECK (close_date >= open_date)
        )",
        [],
    )?;

    // ==========================================================================
    // Transaction Table (quoted: TRANSACTION is a keyword)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS \"transaction\" (
            trans_id INTEGER PRIMARY KEY AUTOINCREMENT,
            trans_amount INTEGER NOT NULL,
            trans_datetime TEXT NOT NULL,
            processed_datetime TEXT NOT NULL,
            card_number TEXT NOT NULL REFERENCES card(card_number) ON DELETE CASCADE
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute("CREATE INDEX IF NOT EXISTS idx_client_status ON client(status)", [])?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_balance_client ON balance(client_id)", [])?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_balance_actual ON balance(client_id, actual_flag)",
        [],
    )?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_card_client ON card(client_id)", [])?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_transaction_card ON \"transaction\"(card_number)",
        [],
    )?;

    info!("database schema ready");
    Ok(())
}

// ============================================================================
// EXECUTION
// ============================================================================

/// Run a statement and return the raw records, eager loads attached
pub fn fetch_records<E: Entity, K: Kind>(
    conn: &Connection,
    statement: &Statement<E, K>,
) -> Result<Vec<Record>, DataError> {
    run_query(conn, K::KIND, statement.query())
}

/// Run a statement and decode every returned row
pub fn fetch_all<E: Entity, K: Kind>(conn: &Connection, statement: &Statement<E, K>) -> Result<Vec<E>, DataError> {
    fetch_records(conn, statement)?
        .into_iter()
        .map(E::from_record)
        .collect()
}

/// Run a statement and decode the first returned row, if any
///
/// Write statements still affect every matching row.
pub fn fetch_optional<E: Entity, K: Kind>(
    conn: &Connection,
    statement: &Statement<E, K>,
) -> Result<Option<E>, DataError> {
    fetch_records(conn, statement)?
        .into_iter()
        .next()
        .map(E::from_record)
        .transpose()
}

fn run_query(conn: &Connection, kind: StatementKind, query: &Query) -> Result<Vec<Record>, DataError> {
    let rendered = render(kind, query);
    debug!(target: SQL_TARGET, sql = %rendered.sql, params = ?rendered.params, "executing");

    let mut records = read_rows(conn, &rendered)?;
    for deferred in &rendered.deferred {
        load_related(conn, &mut records, &deferred.path, &deferred.load, query.built_at)?;
    }
    Ok(records)
}

fn read_rows(conn: &Connection, rendered: &Rendered) -> Result<Vec<Record>, DataError> {
    let mut stmt = conn.prepare(&rendered.sql)?;
    let mut rows = stmt.query(params_from_iter(rendered.params.iter()))?;

    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        let mut root: Option<Record> = None;
        for segment in &rendered.segments {
            let record = decode_segment(row, segment.entity, segment.offset)?;
            match segment.path.split_last() {
                None => root = record,
                Some((name, parent_path)) => {
                    if let Some(parent) = root.as_mut().and_then(|r| record_at(r, parent_path)) {
                        parent.relations.insert(*name, Related::One(record.map(Box::new)));
                    }
                }
            }
        }
        if let Some(root) = root {
            records.push(root);
        }
    }
    Ok(records)
}

/// Decode one entity's columns; `None` when a LEFT JOIN found nothing
fn decode_segment(row: &Row<'_>, entity: EntityKind, offset: usize) -> Result<Option<Record>, DataError> {
    let meta = entity.meta();
    let mut fields = FieldMap::new();
    for (i, column) in meta.columns.iter().enumerate() {
        let raw = row.get_ref(offset + i)?;
        let value = column.ty.decode(raw).map_err(|reason| DataError::Decode {
            entity: meta.name,
            column: column.name.to_string(),
            reason,
        })?;
        fields.insert(column.name.to_string(), value);
    }

    let missing = meta
        .primary_keys()
        .all(|pk| fields.get(pk.name).map_or(true, Value::is_null));
    if missing {
        return Ok(None);
    }
    Ok(Some(Record::new(entity, fields)))
}

/// Follow loaded to-one relations from `record` along `path`
fn record_at<'a>(record: &'a mut Record, path: &[&'static str]) -> Option<&'a mut Record> {
    let Some((first, rest)) = path.split_first() else {
        return Some(record);
    };
    match record.relations.get_mut(first) {
        Some(Related::One(Some(child))) => record_at(child, rest),
        _ => None,
    }
}

/// Resolve a select-in load: one follow-up select over the collected keys
fn load_related(
    conn: &Connection,
    records: &mut [Record],
    path: &[&'static str],
    load: &EagerLoad,
    built_at: DateTime<Utc>,
) -> Result<(), DataError> {
    let mut parents: Vec<&mut Record> = records.iter_mut().filter_map(|r| record_at(r, path)).collect();
    let Some(first) = parents.first() else {
        return Ok(());
    };

    let parent_meta = first.entity.meta();
    let relation = parent_meta.relation(load.relation).ok_or_else(|| DataError::UnknownField {
        entity: parent_meta.name,
        field: load.relation.to_string(),
    })?;

    let mut keys: Vec<Value> = Vec::new();
    for parent in &parents {
        if let Some(key) = parent.get(relation.local) {
            if !key.is_null() && !keys.contains(key) {
                keys.push(key.clone());
            }
        }
    }

    let children = if keys.is_empty() {
        Vec::new()
    } else {
        let mut query = Query::new(relation.target, built_at).with_conditions(vec![Condition::In {
            field: relation.remote,
            values: keys,
        }]);
        query.loads = load.nested.clone();
        if let Some(column) = relation.order_by {
            query = query.order_by(column, Direction::Asc);
        }
        run_query(conn, StatementKind::Select, &query)?
    };

    for parent in parents.iter_mut() {
        let key = parent.get(relation.local).cloned();
        let mut matching = children
            .iter()
            .filter(|child| key.is_some() && child.get(relation.remote) == key.as_ref())
            .cloned();
        let related = match relation.cardinality {
            Cardinality::One => Related::One(matching.next().map(Box::new)),
            Cardinality::Many => Related::Many(matching.collect()),
        };
        parent.relations.insert(relation.name, related);
    }
    Ok(())
}
