// 🚨 Errors - build-time failures and transport-facing payloads

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Display;
use thiserror::Error;

// ============================================================================
// DATA ACCESS ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum DataError {
    /// `update` called with nothing to set
    #[error("{entity} with {constraints} can't be updated, received empty body, change at least value of one field.")]
    EmptyUpdate {
        entity: &'static str,
        constraints: String,
    },

    /// `bulk_create` called with no rows
    #[error("{entity} bulk create received no rows")]
    EmptyInsert { entity: &'static str },

    #[error("operator `{operator}` in `{key}` is not one of: {supported}")]
    UnknownOperator {
        key: String,
        operator: String,
        supported: String,
    },

    #[error("{entity} has no field `{field}`")]
    UnknownField { entity: &'static str, field: String },

    #[error("invalid operand for `{key}`: {reason}")]
    InvalidOperand { key: String, reason: String },

    /// Field owned by the balance actualization rule
    #[error("{entity}.{field} is maintained by balance actualization and can't be written directly")]
    ProtectedField { entity: &'static str, field: String },

    #[error("{entity} with {constraints} not found.")]
    NotFound {
        entity: &'static str,
        constraints: String,
    },

    /// A to-many relation was read without being eager-loaded
    #[error("{entity}.{relation} was not loaded")]
    RelationNotLoaded {
        entity: &'static str,
        relation: &'static str,
    },

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("failed to decode {entity}.{column}: {reason}")]
    Decode {
        entity: &'static str,
        column: String,
        reason: String,
    },

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

// ============================================================================
// TRANSPORT PAYLOADS
// ============================================================================

/// Error kinds surfaced to the HTTP layer, with status code and template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    NotFound,
    UniqueViolation,
    EmptyBodyOnPatch,
}

impl ErrorType {
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorType::NotFound => 404,
            ErrorType::UniqueViolation => 400,
            ErrorType::EmptyBodyOnPatch => 400,
        }
    }

    fn template(&self) -> &'static str {
        match self {
            ErrorType::NotFound => "{model} with {kwargs} not found.",
            ErrorType::UniqueViolation => "{model} with {kwargs} already exists.",
            ErrorType::EmptyBodyOnPatch => {
                "{model} with {kwargs} can't be updated, received empty body, change at least value of one field."
            }
        }
    }

    /// Format the detail message for `model` and the offending pairs
    pub fn payload<V: Display>(&self, model: &str, kwargs: &BTreeMap<String, V>) -> ErrorPayload {
        let detail = self
            .template()
            .replace("{model}", model)
            .replace("{kwargs}", &format_kwargs(kwargs));
        ErrorPayload { detail }
    }
}

/// `{ "detail": "..." }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    pub detail: String,
}

/// `a=1, b=2`
pub fn format_kwargs<V: Display>(kwargs: &BTreeMap<String, V>) -> String {
    kwargs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_violation_payload() {
        let mut kwargs = BTreeMap::new();
        kwargs.insert("status".to_string(), "200".to_string());

        let payload = ErrorType::UniqueViolation.payload("Status", &kwargs);
        assert_eq!(payload.detail, "Status with status=200 already exists.");
        assert_eq!(ErrorType::UniqueViolation.status_code(), 400);
    }

    #[test]
    fn test_not_found_payload_serializes() {
        let mut kwargs = BTreeMap::new();
        kwargs.insert("client_id".to_string(), 42);
        kwargs.insert("phone".to_string(), 7);

        let payload = ErrorType::NotFound.payload("Client", &kwargs);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json, serde_json::json!({"detail": "Client with client_id=42, phone=7 not found."}));
    }

    #[test]
    fn test_empty_update_message_matches_payload() {
        let err = DataError::EmptyUpdate {
            entity: "Client",
            constraints: "client_id=1".to_string(),
        };
        let mut kwargs = BTreeMap::new();
        kwargs.insert("client_id".to_string(), 1);

        assert_eq!(err.to_string(), ErrorType::EmptyBodyOnPatch.payload("Client", &kwargs).detail);
    }
}
