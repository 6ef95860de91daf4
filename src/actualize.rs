// ⚖️ Balance Actualization - persisted form of the client balance rule
//
// Loads a client with its balances, applies `Client::actualize_balance`
// and writes the outcome back. Runs on the caller's connection, so it joins
// whatever transaction the caller has open.

use crate::config::Clock;
use crate::db::{fetch_all, fetch_optional};
use crate::entities::{Actualization, Balance, Client};
use crate::error::DataError;
use crate::manager::{Creatable, Filterable, Manager};
use crate::{constraints, fields};
use rusqlite::Connection;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

/// Re-establish "one current balance, VIP matches it" for `client_id`
///
/// More than one stale current balance means an earlier write skipped
/// actualization; it is repaired and logged at warn level.
pub fn actualize_client_balance(conn: &Connection, clock: Clock, client_id: i64) -> Result<Actualization, DataError> {
    let clients = Manager::<Client>::new(clock);
    let balances = Manager::<Balance>::new(clock);

    // Client selects load `balances` in processing order
    let stmt = clients.filter(&constraints! { "client_id" => client_id })?;
    let mut client = fetch_optional(conn, &stmt)?.ok_or_else(|| DataError::NotFound {
        entity: clients.meta().name,
        constraints: format!("client_id={}", client_id),
    })?;

    let outcome = client.actualize_balance()?;

    if outcome.cleared.len() > 1 {
        warn!(
            client_id,
            cleared = ?outcome.cleared,
            kept = outcome.current_row_id,
            "repaired client with several current balances"
        );
    }

    if !outcome.cleared.is_empty() {
        let stmt = balances.update_managed(
            &constraints! { "row_id__in" => outcome.cleared.clone() },
            fields! { "actual_flag" => false },
        )?;
        let updated = fetch_all(conn, &stmt.map_query(|mut q| {
            q.loads.clear();
            q
        }))?;
        debug!(client_id, rows = updated.len(), "cleared superseded balances");
    }

    if outcome.vip_changed {
        let stmt = clients.update_managed(
            &constraints! { "client_id" => client_id },
            fields! { "VIP_flag" => outcome.vip_flag },
        )?;
        fetch_all(conn, &stmt)?;
        info!(client_id, vip = outcome.vip_flag, amount = %outcome.current_amount, "VIP status changed");
    }

    Ok(outcome)
}

/// Append a balance for `client_id` and actualize right after
pub fn record_balance(
    conn: &Connection,
    clock: Clock,
    client_id: i64,
    amount: Decimal,
) -> Result<(Balance, Actualization), DataError> {
    let stmt = Manager::<Balance>::new(clock).create(fields! {
        "client_id" => client_id,
        "current_amount" => amount,
    })?;
    let balance = fetch_optional(conn, &stmt)?.ok_or_else(|| {
        DataError::InvariantViolation(format!("insert of balance for client_id={} returned no row", client_id))
    })?;

    let outcome = actualize_client_balance(conn, clock, client_id)?;
    Ok((balance, outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;
    use crate::entities::Status;
    use chrono::{DateTime, Duration, Utc};
    use pretty_assertions::assert_eq;

    fn at(minutes: i64) -> Clock {
        let base = DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z").unwrap().with_timezone(&Utc);
        Clock::fixed(base + Duration::minutes(minutes))
    }

    fn setup() -> (Connection, i64) {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        let stmt = Manager::<Status>::new(at(0))
            .create(fields! { "status" => 200, "description" => "Active" })
            .unwrap();
        fetch_all(&conn, &stmt).unwrap();

        let stmt = Manager::<Client>::new(at(0))
            .create(fields! {
                "full_name" => "Petr Petrov",
                "doc_num" => "654321",
                "doc_series" => "4511",
                "phone" => "9007654321",
                "birth_date" => "1985-05-05",
                "sex" => "MALE",
            })
            .unwrap();
        let client = fetch_optional(&conn, &stmt).unwrap().unwrap();
        (conn, client.client_id)
    }

    fn current_balances(conn: &Connection, client_id: i64) -> Vec<Balance> {
        let stmt = Manager::<Balance>::new(at(0))
            .filter(&constraints! { "client_id" => client_id, "actual_flag" => true })
            .unwrap();
        fetch_all(conn, &stmt).unwrap()
    }

    fn vip(conn: &Connection, client_id: i64) -> bool {
        let stmt = Manager::<Client>::new(at(0))
            .filter(&constraints! { "client_id" => client_id })
            .unwrap();
        fetch_optional(conn, &stmt).unwrap().unwrap().vip_flag
    }

    #[test]
    fn test_latest_balance_stays_current() {
        let (conn, client_id) = setup();

        let (first, _) = record_balance(&conn, at(1), client_id, Decimal::from(100)).unwrap();
        let (second, outcome) = record_balance(&conn, at(2), client_id, Decimal::from(50)).unwrap();

        assert_eq!(outcome.cleared, vec![first.row_id]);
        assert_eq!(outcome.current_row_id, second.row_id);

        let current = current_balances(&conn, client_id);
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].row_id, second.row_id);
        assert_eq!(current[0].current_amount, Decimal::from(50));
        assert!(!vip(&conn, client_id));
    }

    #[test]
    fn test_vip_follows_current_balance() {
        let (conn, client_id) = setup();

        let (_, outcome) = record_balance(&conn, at(1), client_id, Decimal::from(900_000)).unwrap();
        assert!(outcome.vip_changed);
        assert!(vip(&conn, client_id));

        let (_, outcome) = record_balance(&conn, at(2), client_id, Decimal::new(89_999_999, 2)).unwrap();
        assert!(outcome.vip_changed);
        assert!(!vip(&conn, client_id));

        let (_, outcome) = record_balance(&conn, at(3), client_id, Decimal::from(10)).unwrap();
        assert!(!outcome.vip_changed);
    }

    #[test]
    fn test_several_current_balances_are_repaired() {
        let (conn, client_id) = setup();
        let balances = Manager::<Balance>::new(at(0));
        let rows = (1..=3)
            .map(|i| {
                fields! {
                    "client_id" => client_id,
                    "current_amount" => i,
                    "processed_datetime" => at(i).now(),
                }
            })
            .collect();
        let mut inserted = fetch_all(&conn, &balances.bulk_create(rows).unwrap()).unwrap();
        inserted.sort_by_key(|b| b.processed_datetime);
        assert_eq!(current_balances(&conn, client_id).len(), 3);

        let outcome = actualize_client_balance(&conn, at(5), client_id).unwrap();
        assert_eq!(outcome.cleared, vec![inserted[0].row_id, inserted[1].row_id]);

        let current = current_balances(&conn, client_id);
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].row_id, inserted[2].row_id);
    }

    #[test]
    fn test_filtered_client_actualizes_in_memory() {
        let (conn, client_id) = setup();
        record_balance(&conn, at(1), client_id, Decimal::from(950_000)).unwrap();

        let stmt = Manager::<Client>::new(at(2))
            .filter(&constraints! { "client_id" => client_id })
            .unwrap();
        let mut client = fetch_optional(&conn, &stmt).unwrap().unwrap();
        assert_eq!(client.balances.as_ref().map(Vec::len), Some(1));
        assert!(client.vip_flag);

        let outcome = client.actualize_balance().unwrap();
        assert!(outcome.cleared.is_empty());
        assert!(!outcome.vip_changed);
        assert_eq!(outcome.current_amount, Decimal::from(950_000));
    }

    #[test]
    fn test_client_without_balance_is_a_violation() {
        let (conn, client_id) = setup();
        assert!(matches!(
            actualize_client_balance(&conn, at(1), client_id),
            Err(DataError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_unknown_client() {
        let (conn, _) = setup();
        let err = actualize_client_balance(&conn, at(1), 404).unwrap_err();
        assert_eq!(err.to_string(), "Client with client_id=404 not found.");
    }

    #[test]
    fn test_rolled_back_with_the_callers_transaction() {
        let (mut conn, client_id) = setup();
        record_balance(&conn, at(1), client_id, Decimal::from(100)).unwrap();

        let tx = conn.transaction().unwrap();
        record_balance(&tx, at(2), client_id, Decimal::from(900_000)).unwrap();
        tx.rollback().unwrap();

        let current = current_balances(&conn, client_id);
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].current_amount, Decimal::from(100));
        assert!(!vip(&conn, client_id));
    }
}
