// ✨ Statement Enrichment - per-entity post-processing of built statements
//
// Pure: (EntityKind, StatementKind, Query) -> Query. Dispatch is a match on
// the entity and the statement kind tag.

use crate::schema::EntityKind;
use crate::statement::{Direction, EagerLoad, Query, StatementKind};

pub fn enrich(entity: EntityKind, kind: StatementKind, query: Query) -> Query {
    let query = match kind {
        StatementKind::Insert => fill_defaults(query),
        _ => query,
    };

    match entity {
        EntityKind::Client => enrich_client(kind, query),
        EntityKind::Balance => enrich_balance(kind, query),
        EntityKind::Card => enrich_card(kind, query),
        EntityKind::Transaction => enrich_transaction(kind, query),
        EntityKind::Status => query,
    }
}

/// Fill omitted columns that declare a default, resolved at build time
pub fn fill_defaults(mut query: Query) -> Query {
    let meta = query.meta();
    let at = query.built_at;
    for row in query.values.iter_mut() {
        for column in meta.columns {
            if let Some(default) = column.default {
                row.entry(column.name.to_string())
                    .or_insert_with(|| default.resolve(at));
            }
        }
    }
    query
}

// ============================================================================
// PER-ENTITY HOOKS
// ============================================================================

fn enrich_client(kind: StatementKind, query: Query) -> Query {
    match kind {
        StatementKind::Select => query
            .options(EagerLoad::joined("client_status"))
            .options(EagerLoad::select_in("balances"))
            .options(EagerLoad::select_in("cards").then(EagerLoad::select_in("transactions")))
            .order_by("reg_date", Direction::Desc)
            .order_by("full_name", Direction::Asc),
        // The written row only exists once the statement has run
        StatementKind::Insert | StatementKind::Update | StatementKind::Delete => {
            query.options(EagerLoad::select_in("client_status"))
        }
    }
}

fn enrich_balance(kind: StatementKind, query: Query) -> Query {
    match kind {
        StatementKind::Select => {
            query.options(EagerLoad::joined("client").then(EagerLoad::joined("client_status")))
        }
        StatementKind::Insert | StatementKind::Update => {
            query.options(EagerLoad::select_in("client").then(EagerLoad::joined("client_status")))
        }
        StatementKind::Delete => query,
    }
}

fn enrich_card(kind: StatementKind, query: Query) -> Query {
    match kind {
        StatementKind::Select => query
            .options(EagerLoad::joined("client"))
            .options(EagerLoad::select_in("transactions")),
        StatementKind::Insert | StatementKind::Update => query.options(EagerLoad::select_in("client")),
        StatementKind::Delete => query,
    }
}

fn enrich_transaction(kind: StatementKind, query: Query) -> Query {
    match kind {
        StatementKind::Select => query.options(EagerLoad::joined("card")),
        StatementKind::Insert | StatementKind::Update => query.options(EagerLoad::select_in("card")),
        StatementKind::Delete => query,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;
    use crate::statement::{LoadStrategy, OrderBy};
    use crate::value::Value;
    use chrono::{DateTime, NaiveDate, Utc};
    use pretty_assertions::assert_eq;

    fn at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_client_select_ordering() {
        let q = enrich(EntityKind::Client, StatementKind::Select, Query::new(EntityKind::Client, at()));
        assert_eq!(
            q.order_by,
            vec![
                OrderBy { column: "reg_date", direction: Direction::Desc },
                OrderBy { column: "full_name", direction: Direction::Asc },
            ]
        );
        assert_eq!(
            q.loads,
            vec![
                EagerLoad::joined("client_status"),
                EagerLoad::select_in("balances"),
                EagerLoad::select_in("cards").then(EagerLoad::select_in("transactions")),
            ]
        );
    }

    #[test]
    fn test_card_and_transaction_selects_load_each_other() {
        let card = enrich(EntityKind::Card, StatementKind::Select, Query::new(EntityKind::Card, at()));
        assert_eq!(card.loads, vec![EagerLoad::joined("client"), EagerLoad::select_in("transactions")]);

        let trans = enrich(EntityKind::Transaction, StatementKind::Select, Query::new(EntityKind::Transaction, at()));
        assert_eq!(trans.loads, vec![EagerLoad::joined("card")]);
    }

    #[test]
    fn test_client_writes_load_status_after_write() {
        for kind in [StatementKind::Insert, StatementKind::Update, StatementKind::Delete] {
            let q = enrich(EntityKind::Client, kind, Query::new(EntityKind::Client, at()));
            assert!(q.order_by.is_empty());
            assert_eq!(q.loads[0].strategy, LoadStrategy::SelectIn);
        }
    }

    #[test]
    fn test_balance_strategy_depends_on_kind() {
        let select = enrich(EntityKind::Balance, StatementKind::Select, Query::new(EntityKind::Balance, at()));
        let insert = enrich(EntityKind::Balance, StatementKind::Insert, Query::new(EntityKind::Balance, at()));

        assert_eq!(select.loads[0].strategy, LoadStrategy::Joined);
        assert_eq!(insert.loads[0].strategy, LoadStrategy::SelectIn);
        // Status always rides along with the client
        assert_eq!(insert.loads[0].nested, vec![EagerLoad::joined("client_status")]);
    }

    #[test]
    fn test_insert_defaults_use_build_time() {
        let q = Query::new(EntityKind::Client, at()).with_values(vec![fields! { "full_name" => "A B C" }]);
        let q = enrich(EntityKind::Client, StatementKind::Insert, q);

        let row = &q.values[0];
        assert_eq!(row.get("reg_date"), Some(&Value::Date(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())));
        assert_eq!(row.get("VIP_flag"), Some(&Value::Bool(false)));
        assert_eq!(row.get("status"), Some(&Value::Int(200)));
    }

    #[test]
    fn test_explicit_values_beat_defaults() {
        let q = Query::new(EntityKind::Client, at()).with_values(vec![fields! { "status" => 300 }]);
        let q = enrich(EntityKind::Client, StatementKind::Insert, q);
        assert_eq!(q.values[0].get("status"), Some(&Value::Int(300)));
    }

    #[test]
    fn test_updates_get_no_defaults() {
        let q = Query::new(EntityKind::Client, at()).with_values(vec![fields! { "phone" => "1" }]);
        let q = enrich(EntityKind::Client, StatementKind::Update, q);
        assert_eq!(q.values[0].len(), 1);
    }

    #[test]
    fn test_status_is_untouched() {
        let base = Query::new(EntityKind::Status, at());
        assert_eq!(enrich(EntityKind::Status, StatementKind::Select, base.clone()), base);
    }
}
