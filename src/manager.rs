// 🗂️ Statement Builder - one Manager per entity, capabilities as traits
//
// Every operation returns an unexecuted statement. Nothing here touches a
// connection, so the caller owns transaction boundaries.

use crate::config::Clock;
use crate::enrichment::enrich;
use crate::entities::{Entity, Mutable};
use crate::error::{format_kwargs, DataError};
use crate::predicate::{parse_constraints, specified};
use crate::schema::EntityMeta;
use crate::statement::kind::Kind;
use crate::statement::{DeleteStatement, InsertStatement, Query, SelectStatement, Statement, UpdateStatement};
use crate::value::{Constraints, FieldMap};
use std::collections::BTreeMap;
use std::marker::PhantomData;

// ============================================================================
// CAPABILITIES
// ============================================================================

pub trait Filterable<E> {
    /// Select rows matching `constraints`; empty means all rows
    fn filter(&self, constraints: &Constraints) -> Result<SelectStatement<E>, DataError>;
}

pub trait Creatable<E> {
    /// Insert one row and return it in full
    fn create(&self, fields: FieldMap) -> Result<InsertStatement<E>, DataError>;

    /// Insert many rows in one statement; all or nothing
    fn bulk_create(&self, rows: Vec<FieldMap>) -> Result<InsertStatement<E>, DataError>;
}

pub trait Updatable<E> {
    /// Update rows matching `constraints`; `set` must not be empty
    fn update(&self, constraints: &Constraints, set: FieldMap) -> Result<UpdateStatement<E>, DataError>;
}

pub trait Deletable<E> {
    /// Delete rows matching `constraints` and return them
    fn delete(&self, constraints: &Constraints) -> Result<DeleteStatement<E>, DataError>;
}

// ============================================================================
// MANAGER
// ============================================================================

pub struct Manager<E> {
    clock: Clock,
    marker: PhantomData<fn() -> E>,
}

impl<E> Clone for Manager<E> {
    fn clone(&self) -> Self {
        Manager {
            clock: self.clock,
            marker: PhantomData,
        }
    }
}

impl<E> std::fmt::Debug for Manager<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager").field("clock", &self.clock).finish()
    }
}

impl<E: Entity> Manager<E> {
    pub fn new(clock: Clock) -> Self {
        Manager {
            clock,
            marker: PhantomData,
        }
    }

    pub fn meta(&self) -> &'static EntityMeta {
        E::meta()
    }

    fn base_query(&self) -> Query {
        Query::new(E::KIND, self.clock.now())
    }

    fn finish<K: Kind>(&self, query: Query) -> Statement<E, K> {
        Statement::from_query(enrich(E::KIND, K::KIND, query))
    }

    /// Validate field names, coerce values and optionally refuse managed columns
    fn check_fields(&self, fields: FieldMap, allow_managed: bool) -> Result<FieldMap, DataError> {
        let meta = E::meta();
        fields
            .into_iter()
            .map(|(name, value)| {
                let column = meta.require_column(&name)?;
                if column.managed && !allow_managed {
                    return Err(DataError::ProtectedField {
                        entity: meta.name,
                        field: name,
                    });
                }
                let value = column
                    .ty
                    .coerce(value)
                    .map_err(|reason| DataError::InvalidOperand { key: name.clone(), reason })?;
                Ok((column.name.to_string(), value))
            })
            .collect()
    }

    pub(crate) fn build_update(
        &self,
        constraints: &Constraints,
        set: FieldMap,
        allow_managed: bool,
    ) -> Result<UpdateStatement<E>, DataError> {
        // Checked before the constraints are even looked at
        if set.is_empty() {
            let shown: BTreeMap<String, String> = specified(constraints)
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            return Err(DataError::EmptyUpdate {
                entity: E::meta().name,
                constraints: format_kwargs(&shown),
            });
        }

        let set = self.check_fields(set, allow_managed)?;
        let conditions = parse_constraints(E::meta(), constraints)?;
        let query = self.base_query().with_conditions(conditions).with_values(vec![set]);
        Ok(self.finish(query))
    }

    /// Update path reserved for balance actualization
    pub(crate) fn update_managed(
        &self,
        constraints: &Constraints,
        set: FieldMap,
    ) -> Result<UpdateStatement<E>, DataError> {
        self.build_update(constraints, set, true)
    }
}

impl<E: Entity> Filterable<E> for Manager<E> {
    fn filter(&self, constraints: &Constraints) -> Result<SelectStatement<E>, DataError> {
        let conditions = parse_constraints(E::meta(), constraints)?;
        Ok(self.finish(self.base_query().with_conditions(conditions)))
    }
}

impl<E: Entity> Creatable<E> for Manager<E> {
    fn create(&self, fields: FieldMap) -> Result<InsertStatement<E>, DataError> {
        let row = self.check_fields(fields, false)?;
        Ok(self.finish(self.base_query().with_values(vec![row])))
    }

    fn bulk_create(&self, rows: Vec<FieldMap>) -> Result<InsertStatement<E>, DataError> {
        if rows.is_empty() {
            return Err(DataError::EmptyInsert { entity: E::meta().name });
        }
        let rows = rows
            .into_iter()
            .map(|row| self.check_fields(row, false))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.finish(self.base_query().with_values(rows)))
    }
}

impl<E: Mutable> Updatable<E> for Manager<E> {
    fn update(&self, constraints: &Constraints, set: FieldMap) -> Result<UpdateStatement<E>, DataError> {
        self.build_update(constraints, set, false)
    }
}

impl<E: Mutable> Deletable<E> for Manager<E> {
    fn delete(&self, constraints: &Constraints) -> Result<DeleteStatement<E>, DataError> {
        let conditions = parse_constraints(E::meta(), constraints)?;
        Ok(self.finish(self.base_query().with_conditions(conditions)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Balance, Client, Status};
    use crate::predicate::Condition;
    use crate::statement::{LoadStrategy, StatementKind};
    use crate::value::{Param, Value};
    use crate::{constraints, fields};
    use chrono::{DateTime, Utc};
    use pretty_assertions::assert_eq;

    fn clock() -> Clock {
        Clock::fixed(DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z").unwrap().with_timezone(&Utc))
    }

    #[test]
    fn test_filter_without_constraints_matches_all() {
        let stmt = Manager::<Status>::new(clock()).filter(&constraints! {}).unwrap();
        assert_eq!(stmt.kind(), StatementKind::Select);
        assert_eq!(stmt.query().conditions, vec![Condition::True]);
    }

    #[test]
    fn test_filter_is_enriched() {
        let stmt = Manager::<Client>::new(clock()).filter(&constraints! { "client_id" => 1 }).unwrap();
        assert_eq!(stmt.query().order_by.len(), 2);
        assert_eq!(stmt.query().loads[0].strategy, LoadStrategy::Joined);
    }

    #[test]
    fn test_empty_update_fails_before_parsing() {
        let manager = Manager::<Client>::new(clock());

        // Even a constraint that would not parse is never looked at
        let err = manager
            .update(&constraints! { "client_id__bogus" => 1 }, fields! {})
            .unwrap_err();
        assert!(matches!(err, DataError::EmptyUpdate { .. }));

        let err = manager.update(&constraints! { "client_id" => 5 }, fields! {}).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Client with client_id=5 can't be updated, received empty body, change at least value of one field."
        );
    }

    #[test]
    fn test_update_parses_where_and_set() {
        let stmt = Manager::<Client>::new(clock())
            .update(
                &constraints! { "client_id__in" => vec![1, 2], "phone" => Param::NotSpecified },
                fields! { "phone" => "9000000000" },
            )
            .unwrap();

        assert_eq!(
            stmt.query().conditions,
            vec![Condition::In { field: "client_id", values: vec![Value::Int(1), Value::Int(2)] }]
        );
        assert_eq!(stmt.query().values, vec![fields! { "phone" => "9000000000" }]);
    }

    #[test]
    fn test_managed_fields_are_protected() {
        let clients = Manager::<Client>::new(clock());
        assert!(matches!(
            clients.update(&constraints! { "client_id" => 1 }, fields! { "VIP_flag" => true }),
            Err(DataError::ProtectedField { .. })
        ));
        assert!(clients
            .update_managed(&constraints! { "client_id" => 1 }, fields! { "VIP_flag" => true })
            .is_ok());

        let balances = Manager::<Balance>::new(clock());
        assert!(matches!(
            balances.create(fields! { "client_id" => 1, "current_amount" => 5, "actual_flag" => false }),
            Err(DataError::ProtectedField { .. })
        ));
    }

    #[test]
    fn test_create_coerces_and_defaults() {
        let stmt = Manager::<Balance>::new(clock())
            .create(fields! { "client_id" => 1, "current_amount" => "10.5" })
            .unwrap();

        let row = &stmt.query().values[0];
        assert_eq!(row.get("current_amount"), Some(&Value::Money("10.5".parse().unwrap())));
        assert_eq!(row.get("actual_flag"), Some(&Value::Bool(true)));
        assert_eq!(row.get("processed_datetime"), Some(&Value::DateTime(clock().now())));
    }

    #[test]
    fn test_create_rejects_unknown_fields() {
        assert!(matches!(
            Manager::<Status>::new(clock()).create(fields! { "code" => 1 }),
            Err(DataError::UnknownField { .. })
        ));
    }

    #[test]
    fn test_bulk_create_needs_rows() {
        assert!(matches!(
            Manager::<Status>::new(clock()).bulk_create(Vec::new()),
            Err(DataError::EmptyInsert { .. })
        ));
    }

    #[test]
    fn test_delete_uses_filter_parsing() {
        let stmt = Manager::<Status>::new(clock())
            .delete(&constraints! { "status__between" => (100, 199) })
            .unwrap();
        assert_eq!(stmt.kind(), StatementKind::Delete);
        assert!(stmt.to_sql().sql.starts_with("DELETE FROM \"status_desc\" WHERE \"status\" BETWEEN ?1 AND ?2"));
    }
}
