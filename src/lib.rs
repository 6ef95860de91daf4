// Banking App - Core Library
// Data access for clients, balances, cards and transactions, used by the CLI and tests

pub mod config;
pub mod logging;
pub mod error;
pub mod value;
pub mod schema;          // Shape Layer - static entity metadata
pub mod entities;        // Entity Models
pub mod predicate;       // field__op constraint parsing
pub mod statement;       // Typed select/insert/update/delete statements
pub mod enrichment;      // Per-entity statement post-processing
pub mod manager;         // Statement Builder
pub mod integrity;       // Unique violation decoding
pub mod actualize;       // Balance actualization against storage
pub mod db;

// Re-export commonly used types
pub use config::{Clock, Settings};
pub use logging::init_logging;
pub use error::{DataError, ErrorPayload, ErrorType};
pub use value::{Constraints, FieldMap, Param, Value};
pub use schema::{EntityKind, EntityMeta};
pub use entities::{
    Actualization, Balance, Card, CardType, Client, Entity, Mutable, Record, Sex, Status, Transaction,
    VIP_BALANCE_THRESHOLD,
};
pub use predicate::{parse_constraints, Condition, Operator};
pub use statement::{
    DeleteStatement, EagerLoad, InsertStatement, LoadStrategy, Query, SelectStatement, Statement, StatementKind,
    UpdateStatement,
};
pub use enrichment::enrich;
pub use manager::{Creatable, Deletable, Filterable, Manager, Updatable};
pub use integrity::{decode, decode_unique_violation, is_unique_violation};
pub use actualize::{actualize_client_balance, record_balance};
pub use db::{fetch_all, fetch_optional, fetch_records, open_database, setup_database};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
