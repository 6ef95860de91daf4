// 🔑 Integrity Violation Decoder - which fields collided on a unique key
//
// Two message shapes are understood:
// - `Key (col)=(val) already exists.` fragments, decoded directly
// - SQLite's `UNIQUE constraint failed: table.col, table.col`, where the
//   values have to be recovered from the rows that were being written
//
// Decoding is soft: anything unparseable is skipped and an empty map is a
// valid answer.

use crate::config::Clock;
use crate::entities::Entity;
use crate::error::DataError;
use crate::predicate::Condition;
use crate::schema::Column;
use crate::statement::{render, Query, StatementKind};
use crate::value::FieldMap;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params_from_iter, Connection, ErrorCode};
use std::collections::BTreeMap;
use tracing::debug;

static FRAGMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(([^()]*)\)=\(([^()]*)\)").expect("valid fragment regex"));

const SQLITE_UNIQUE_PREFIX: &str = "UNIQUE constraint failed:";

/// Extract `{column: value}` from every `(column)=(value)` fragment
///
/// Composite keys (`(a, b)=(1, 2)`) are split pairwise when the counts
/// line up. Later fragments overwrite earlier ones.
pub fn decode(diagnostic: &str) -> BTreeMap<String, String> {
    let mut found = BTreeMap::new();
    for caps in FRAGMENT_RE.captures_iter(diagnostic) {
        let keys = caps[1].trim();
        let values = caps[2].trim();
        if keys.is_empty() {
            continue;
        }

        let key_parts: Vec<&str> = keys.split(',').map(str::trim).collect();
        if key_parts.len() == 1 {
            found.insert(keys.to_string(), values.to_string());
            continue;
        }

        let value_parts: Vec<&str> = values.split(',').map(str::trim).collect();
        if key_parts.len() == value_parts.len() {
            for (k, v) in key_parts.into_iter().zip(value_parts) {
                found.insert(k.to_string(), v.to_string());
            }
        }
    }
    found
}

/// Column names from `UNIQUE constraint failed: t.a, t.b`
pub fn violated_columns(message: &str) -> Vec<String> {
    let Some(idx) = message.find(SQLITE_UNIQUE_PREFIX) else {
        return Vec::new();
    };
    message[idx + SQLITE_UNIQUE_PREFIX.len()..]
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| part.rsplit('.').next().unwrap_or(part).to_string())
        .collect()
}

/// Unique and primary key failures both count
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.code == ErrorCode::ConstraintViolation
                && (e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        }
        _ => false,
    }
}

fn diagnostic_text(err: &rusqlite::Error) -> String {
    match err {
        rusqlite::Error::SqliteFailure(_, Some(msg)) => msg.clone(),
        other => other.to_string(),
    }
}

/// Work out which `{field: value}` pairs made a write of `rows` fail
///
/// Must run after the failed statement and before anything else is written
/// in the same transaction. Rows are checked in order; the first one that
/// repeats an earlier row of the batch, or a row already stored, is the
/// one reported.
pub fn decode_unique_violation<E: Entity>(
    conn: &Connection,
    clock: Clock,
    err: &rusqlite::Error,
    rows: &[FieldMap],
) -> Result<BTreeMap<String, String>, DataError> {
    let message = diagnostic_text(err);

    let direct = decode(&message);
    if !direct.is_empty() {
        return Ok(direct);
    }

    let meta = E::meta();
    let columns: Vec<&'static Column> = violated_columns(&message)
        .iter()
        .filter_map(|name| meta.column(name))
        .collect();
    if columns.is_empty() {
        debug!(message = %message, "unique violation without decodable columns");
        return Ok(BTreeMap::new());
    }

    let mut seen: Vec<Vec<(&'static str, String)>> = Vec::new();
    for row in rows {
        let mut conditions = Vec::with_capacity(columns.len());
        let mut key = Vec::with_capacity(columns.len());
        for column in &columns {
            let Some(raw) = row.get(column.name) else { break };
            let Ok(value) = column.ty.coerce(raw.clone()) else { break };
            key.push((column.name, value.to_string()));
            conditions.push(Condition::Eq { field: column.name, value });
        }
        if key.len() != columns.len() {
            continue;
        }

        let clashes_in_batch = seen.contains(&key);
        let clashes_in_store = !clashes_in_batch && {
            let query = Query::new(meta.kind, clock.now()).with_conditions(conditions);
            let rendered = render(StatementKind::Select, &query);
            let mut stmt = conn.prepare(&rendered.sql)?;
            stmt.exists(params_from_iter(rendered.params.iter()))?
        };

        if clashes_in_batch || clashes_in_store {
            return Ok(key.into_iter().map(|(k, v)| (k.to_string(), v)).collect());
        }
        seen.push(key);
    }

    Ok(BTreeMap::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;
    use crate::entities::Status;
    use crate::fields;
    use chrono::{DateTime, Utc};
    use pretty_assertions::assert_eq;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_decode_single_fragment() {
        let text = "insert or update on table \"client\" violates foreign key constraint\n\
                    DETAIL:  Key (client_id)=(42) is not present in table \"client\".";
        assert_eq!(decode(text), map(&[("client_id", "42")]));
    }

    #[test]
    fn test_decode_multiple_fragments_later_wins() {
        let text = "Key (status)=(200) already exists. Key (doc_num)=(1234) and (status)=(300)";
        assert_eq!(decode(text), map(&[("doc_num", "1234"), ("status", "300")]));
    }

    #[test]
    fn test_decode_composite_key() {
        let text = "Key (doc_series, doc_num)=(4510, 123456) already exists.";
        assert_eq!(decode(text), map(&[("doc_num", "123456"), ("doc_series", "4510")]));
    }

    #[test]
    fn test_decode_without_fragments_is_empty() {
        assert!(decode("disk I/O error").is_empty());
        assert!(decode("()=(1)").is_empty());
    }

    #[test]
    fn test_violated_columns() {
        assert_eq!(
            violated_columns("UNIQUE constraint failed: client.doc_series, client.doc_num"),
            vec!["doc_series".to_string(), "doc_num".to_string()]
        );
        assert!(violated_columns("NOT NULL constraint failed: client.phone").is_empty());
    }

    fn clock() -> Clock {
        Clock::fixed(DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z").unwrap().with_timezone(&Utc))
    }

    fn status_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn.execute("INSERT INTO status_desc (status, description) VALUES (200, 'Active')", [])
            .unwrap();
        conn
    }

    fn failing_insert(conn: &Connection, sql: &str) -> rusqlite::Error {
        conn.execute(sql, []).unwrap_err()
    }

    #[test]
    fn test_primary_key_clash_with_stored_row() {
        let conn = status_conn();
        let err = failing_insert(&conn, "INSERT INTO status_desc (status, description) VALUES (200, 'Again')");
        assert!(is_unique_violation(&err));

        let rows = vec![fields! { "status" => 200, "description" => "Again" }];
        let pairs = decode_unique_violation::<Status>(&conn, clock(), &err, &rows).unwrap();
        assert_eq!(pairs, map(&[("status", "200")]));
    }

    #[test]
    fn test_first_duplicate_of_batch_is_reported() {
        let conn = status_conn();
        let err = failing_insert(
            &conn,
            "INSERT INTO status_desc (status, description) VALUES (300, 'a'), (400, 'b'), (300, 'c')",
        );

        let rows = vec![
            fields! { "status" => 300, "description" => "a" },
            fields! { "status" => 400, "description" => "b" },
            fields! { "status" => 300, "description" => "c" },
        ];
        let pairs = decode_unique_violation::<Status>(&conn, clock(), &err, &rows).unwrap();
        assert_eq!(pairs, map(&[("status", "300")]));
    }

    #[test]
    fn test_other_errors_are_not_unique_violations() {
        let conn = status_conn();
        let err = failing_insert(&conn, "INSERT INTO status_desc (status) VALUES (500)");
        assert!(!is_unique_violation(&err));
        let pairs = decode_unique_violation::<Status>(&conn, clock(), &err, &[]).unwrap();
        assert!(pairs.is_empty());
    }
}
