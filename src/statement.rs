// 🧱 Statements - unexecuted select/insert/update/delete descriptions
//
// A statement is a `Query` (entity, conditions, values, ordering, eager
// loads) plus a compile-time kind tag. Rendering produces SQL text with
// positional parameters; executing it is the caller's business.

use crate::entities::Entity;
use crate::predicate::{Comparison, Condition};
use crate::schema::{Cardinality, EntityKind, EntityMeta};
use crate::value::{FieldMap, Value};
use chrono::{DateTime, Utc};
use std::fmt::Write as _;
use std::marker::PhantomData;

// ============================================================================
// STATEMENT KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

/// Type-level tags for `Statement<E, K>`
pub mod kind {
    use super::StatementKind;

    pub trait Kind {
        const KIND: StatementKind;
    }

    #[derive(Debug, Clone, Copy)]
    pub struct Select;
    #[derive(Debug, Clone, Copy)]
    pub struct Insert;
    #[derive(Debug, Clone, Copy)]
    pub struct Update;
    #[derive(Debug, Clone, Copy)]
    pub struct Delete;

    impl Kind for Select {
        const KIND: StatementKind = StatementKind::Select;
    }
    impl Kind for Insert {
        const KIND: StatementKind = StatementKind::Insert;
    }
    impl Kind for Update {
        const KIND: StatementKind = StatementKind::Update;
    }
    impl Kind for Delete {
        const KIND: StatementKind = StatementKind::Delete;
    }
}

use kind::Kind;

// ============================================================================
// ORDERING & EAGER LOADING
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy {
    pub column: &'static str,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStrategy {
    /// LEFT JOIN into the same select (to-one relations of selects only)
    Joined,
    /// Follow-up select with `IN` over the collected keys
    SelectIn,
}

/// Load `relation` together with the statement's rows, then `nested` on it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EagerLoad {
    pub relation: &'static str,
    pub strategy: LoadStrategy,
    pub nested: Vec<EagerLoad>,
}

impl EagerLoad {
    pub fn joined(relation: &'static str) -> Self {
        EagerLoad {
            relation,
            strategy: LoadStrategy::Joined,
            nested: Vec::new(),
        }
    }

    pub fn select_in(relation: &'static str) -> Self {
        EagerLoad {
            relation,
            strategy: LoadStrategy::SelectIn,
            nested: Vec::new(),
        }
    }

    /// Chain a load on the related entity
    pub fn then(mut self, nested: EagerLoad) -> Self {
        self.nested.push(nested);
        self
    }
}

// ============================================================================
// QUERY
// ============================================================================

/// Kind-agnostic body of a statement; what enrichment operates on
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub entity: EntityKind,
    /// ANDed together
    pub conditions: Vec<Condition>,
    /// Insert rows, or the single SET map of an update
    pub values: Vec<FieldMap>,
    pub order_by: Vec<OrderBy>,
    pub loads: Vec<EagerLoad>,
    /// Build time; column defaults resolve against it
    pub built_at: DateTime<Utc>,
}

impl Query {
    pub fn new(entity: EntityKind, built_at: DateTime<Utc>) -> Self {
        Query {
            entity,
            conditions: vec![Condition::True],
            values: Vec::new(),
            order_by: Vec::new(),
            loads: Vec::new(),
            built_at,
        }
    }

    pub fn meta(&self) -> &'static EntityMeta {
        self.entity.meta()
    }

    pub fn with_conditions(mut self, conditions: Vec<Condition>) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_values(mut self, values: Vec<FieldMap>) -> Self {
        self.values = values;
        self
    }

    pub fn order_by(mut self, column: &'static str, direction: Direction) -> Self {
        self.order_by.push(OrderBy { column, direction });
        self
    }

    pub fn options(mut self, load: EagerLoad) -> Self {
        self.loads.push(load);
        self
    }
}

// ============================================================================
// TYPED STATEMENTS
// ============================================================================

pub struct Statement<E, K> {
    query: Query,
    marker: PhantomData<fn() -> (E, K)>,
}

pub type SelectStatement<E> = Statement<E, kind::Select>;
pub type InsertStatement<E> = Statement<E, kind::Insert>;
pub type UpdateStatement<E> = Statement<E, kind::Update>;
pub type DeleteStatement<E> = Statement<E, kind::Delete>;

impl<E: Entity, K: Kind> Statement<E, K> {
    pub(crate) fn from_query(query: Query) -> Self {
        debug_assert_eq!(query.entity, E::KIND);
        Statement {
            query,
            marker: PhantomData,
        }
    }

    pub fn kind(&self) -> StatementKind {
        K::KIND
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Further customize the statement before it is executed
    pub fn map_query(self, f: impl FnOnce(Query) -> Query) -> Self {
        Statement::from_query(f(self.query))
    }

    pub fn to_sql(&self) -> Rendered {
        render(K::KIND, &self.query)
    }
}

impl<E, K> Clone for Statement<E, K> {
    fn clone(&self) -> Self {
        Statement {
            query: self.query.clone(),
            marker: PhantomData,
        }
    }
}

impl<E, K: Kind> std::fmt::Debug for Statement<E, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("kind", &K::KIND)
            .field("query", &self.query)
            .finish()
    }
}

// ============================================================================
// RENDERING
// ============================================================================

/// Columns of one entity inside a result row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub entity: EntityKind,
    /// Index of this entity's first column in the row
    pub offset: usize,
    /// Relation names from the root record to this one (empty for the root)
    pub path: Vec<&'static str>,
}

/// Eager load resolved after the rows are read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredLoad {
    /// Relation names from the root record to the load's parent
    pub path: Vec<&'static str>,
    pub load: EagerLoad,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub sql: String,
    pub params: Vec<Value>,
    pub segments: Vec<Segment>,
    pub deferred: Vec<DeferredLoad>,
}

struct Renderer {
    sql: String,
    params: Vec<Value>,
}

impl Renderer {
    fn new() -> Self {
        Renderer {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn bind(&mut self, value: Value) -> String {
        self.params.push(value);
        format!("?{}", self.params.len())
    }

    fn condition(&mut self, qualifier: Option<&str>, condition: &Condition) -> String {
        let col = |field: &str| qualified(qualifier, field);
        match condition {
            Condition::True => "1".to_string(),
            Condition::Eq { field, value } if value.is_null() => format!("{} IS NULL", col(field)),
            Condition::Eq { field, value } => {
                let p = self.bind(value.clone());
                format!("{} = {}", col(field), p)
            }
            Condition::Cmp { field, op, value } => {
                if value.is_null() && *op == Comparison::NotEq {
                    return format!("{} IS NOT NULL", col(field));
                }
                let p = self.bind(value.clone());
                format!("{} {} {}", col(field), op.sql(), p)
            }
            Condition::In { values, .. } if values.is_empty() => "0".to_string(),
            Condition::NotIn { values, .. } if values.is_empty() => "1".to_string(),
            Condition::In { field, values } | Condition::NotIn { field, values } => {
                let placeholders: Vec<String> = values.iter().map(|v| self.bind(v.clone())).collect();
                let op = if matches!(condition, Condition::In { .. }) { "IN" } else { "NOT IN" };
                format!("{} {} ({})", col(field), op, placeholders.join(", "))
            }
            Condition::Between { field, low, high } => {
                let lo = self.bind(low.clone());
                let hi = self.bind(high.clone());
                format!("{} BETWEEN {} AND {}", col(field), lo, hi)
            }
        }
    }

    fn where_clause(&mut self, qualifier: Option<&str>, conditions: &[Condition]) {
        let rendered: Vec<String> = conditions
            .iter()
            .filter(|c| **c != Condition::True)
            .map(|c| self.condition(qualifier, c))
            .collect();
        if !rendered.is_empty() {
            let _ = write!(self.sql, " WHERE {}", rendered.join(" AND "));
        }
    }
}

pub fn quote(ident: &str) -> String {
    format!("\"{}\"", ident)
}

fn qualified(qualifier: Option<&str>, column: &str) -> String {
    match qualifier {
        Some(alias) => format!("{}.{}", alias, quote(column)),
        None => quote(column),
    }
}

fn returning(meta: &EntityMeta) -> String {
    let cols: Vec<String> = meta.columns.iter().map(|c| quote(c.name)).collect();
    format!(" RETURNING {}", cols.join(", "))
}

/// Render `query` as a statement of `kind`
///
/// Joined loads are only rendered into selects, and only for to-one
/// relations; everything else is deferred to a select-in pass.
pub fn render(kind: StatementKind, query: &Query) -> Rendered {
    let meta = query.meta();
    let mut r = Renderer::new();
    let mut segments = vec![Segment {
        entity: query.entity,
        offset: 0,
        path: Vec::new(),
    }];
    let mut deferred = Vec::new();

    match kind {
        StatementKind::Select => {
            let mut columns: Vec<String> = meta.columns.iter().map(|c| qualified(Some("t0"), c.name)).collect();
            let mut joins = String::new();
            let mut alias_count = 1;
            plan_joins(
                meta,
                "t0",
                &query.loads,
                &[],
                &mut columns,
                &mut joins,
                &mut alias_count,
                &mut segments,
                &mut deferred,
            );

            let _ = write!(r.sql, "SELECT {} FROM {} AS t0{}", columns.join(", "), quote(meta.table), joins);
            r.where_clause(Some("t0"), &query.conditions);

            if !query.order_by.is_empty() {
                let order: Vec<String> = query
                    .order_by
                    .iter()
                    .map(|o| {
                        let dir = match o.direction {
                            Direction::Asc => "ASC",
                            Direction::Desc => "DESC",
                        };
                        format!("{} {}", qualified(Some("t0"), o.column), dir)
                    })
                    .collect();
                let _ = write!(r.sql, " ORDER BY {}", order.join(", "));
            }
        }

        StatementKind::Insert => {
            // Union of the rows' columns, in metadata order
            let columns: Vec<&'static str> = meta
                .columns
                .iter()
                .map(|c| c.name)
                .filter(|name| query.values.iter().any(|row| row.contains_key(*name)))
                .collect();

            let _ = write!(r.sql, "INSERT INTO {}", quote(meta.table));
            if columns.is_empty() {
                r.sql.push_str(" DEFAULT VALUES");
            } else {
                let quoted: Vec<String> = columns.iter().map(|c| quote(c)).collect();
                let _ = write!(r.sql, " ({}) VALUES ", quoted.join(", "));
                let mut tuples = Vec::with_capacity(query.values.len());
                for row in &query.values {
                    let placeholders: Vec<String> = columns
                        .iter()
                        .map(|c| r.bind(row.get(*c).cloned().unwrap_or(Value::Null)))
                        .collect();
                    tuples.push(format!("({})", placeholders.join(", ")));
                }
                r.sql.push_str(&tuples.join(", "));
            }
            r.sql.push_str(&returning(meta));
            deferred.extend(query.loads.iter().cloned().map(|load| DeferredLoad { path: Vec::new(), load }));
        }

        StatementKind::Update => {
            let set = query.values.first().cloned().unwrap_or_default();
            let assignments: Vec<String> = meta
                .columns
                .iter()
                .filter_map(|c| set.get(c.name).map(|v| (c.name, v.clone())))
                .map(|(name, v)| {
                    let p = r.bind(v);
                    format!("{} = {}", quote(name), p)
                })
                .collect();
            let _ = write!(r.sql, "UPDATE {} SET {}", quote(meta.table), assignments.join(", "));
            r.where_clause(None, &query.conditions);
            r.sql.push_str(&returning(meta));
            deferred.extend(query.loads.iter().cloned().map(|load| DeferredLoad { path: Vec::new(), load }));
        }

        StatementKind::Delete => {
            let _ = write!(r.sql, "DELETE FROM {}", quote(meta.table));
            r.where_clause(None, &query.conditions);
            r.sql.push_str(&returning(meta));
            deferred.extend(query.loads.iter().cloned().map(|load| DeferredLoad { path: Vec::new(), load }));
        }
    }

    Rendered {
        sql: r.sql,
        params: r.params,
        segments,
        deferred,
    }
}

#[allow(clippy::too_many_arguments)]
fn plan_joins(
    parent: &'static EntityMeta,
    parent_alias: &str,
    loads: &[EagerLoad],
    path: &[&'static str],
    columns: &mut Vec<String>,
    joins: &mut String,
    alias_count: &mut usize,
    segments: &mut Vec<Segment>,
    deferred: &mut Vec<DeferredLoad>,
) {
    for load in loads {
        let relation = match parent.relation(load.relation) {
            Some(rel) if load.strategy == LoadStrategy::Joined && rel.cardinality == Cardinality::One => rel,
            _ => {
                deferred.push(DeferredLoad {
                    path: path.to_vec(),
                    load: load.clone(),
                });
                continue;
            }
        };

        let target = relation.target.meta();
        let alias = format!("t{}", alias_count);
        *alias_count += 1;

        let mut child_path = path.to_vec();
        child_path.push(relation.name);
        segments.push(Segment {
            entity: relation.target,
            offset: columns.len(),
            path: child_path.clone(),
        });
        columns.extend(target.columns.iter().map(|c| qualified(Some(&alias), c.name)));

        let _ = write!(
            joins,
            " LEFT JOIN {} AS {} ON {} = {}",
            quote(target.table),
            alias,
            qualified(Some(&alias), relation.remote),
            qualified(Some(parent_alias), relation.local),
        );

        plan_joins(
            target,
            &alias,
            &load.nested,
            &child_path,
            columns,
            joins,
            alias_count,
            segments,
            deferred,
        );
    }
}
