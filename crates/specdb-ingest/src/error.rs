use specdb_core::document::DocumentError;
use specdb_core::field::CoercionError;
use specdb_core::StoreError;
use thiserror::Error;

/// Failures that abort one product's import. Nothing of that import is
/// committed when one of these is returned.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid product document: {0}")]
    Document(#[from] DocumentError),

    #[error("failed to open import transaction for {source_product_id}: {source}")]
    Begin {
        source_product_id: String,
        #[source]
        source: StoreError,
    },

    #[error("product {source_product_id} could not be loaded or created: {source}")]
    Product {
        source_product_id: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to commit import of {source_product_id}: {source}")]
    Commit {
        source_product_id: String,
        #[source]
        source: StoreError,
    },
}

/// Non-fatal conditions met while importing a product.
///
/// None of these stop the import; they are collected on the outcome and
/// forwarded to the observer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IngestIssue {
    /// A schema slot's label was absent from the input; the slot stays unset.
    #[error("{category}: no value for '{label}'")]
    MissingField { category: String, label: String },

    /// A label outside the category's allow-list; it was not stored.
    #[error("{category}: unknown key '{key}'")]
    UnknownKey { category: String, key: String },

    /// A mapping named a slot the target entity does not have.
    #[error("{entity}: no slot named '{slot}'")]
    UnknownSlot { entity: &'static str, slot: String },

    /// A payload or nested object did not have the expected shape.
    #[error("{context}: malformed payload: {reason}")]
    MalformedPayload { context: String, reason: String },

    /// A value could not be coerced to its slot's type; the field was skipped.
    #[error("{entity} {key}: slot '{slot}': {source}")]
    TypeCoercion {
        entity: &'static str,
        key: String,
        slot: String,
        #[source]
        source: CoercionError,
    },

    /// A read or write against storage failed; that sub-object was abandoned.
    #[error("{entity} {key}: storage failed: {source}")]
    Persistence {
        entity: &'static str,
        key: String,
        #[source]
        source: StoreError,
    },
}

impl IngestIssue {
    /// Short machine-readable name of the issue kind, used as a log field.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            IngestIssue::MissingField { .. } => "missing_field",
            IngestIssue::UnknownKey { .. } => "unknown_key",
            IngestIssue::UnknownSlot { .. } => "unknown_slot",
            IngestIssue::MalformedPayload { .. } => "malformed_payload",
            IngestIssue::TypeCoercion { .. } => "type_coercion",
            IngestIssue::Persistence { .. } => "persistence",
        }
    }
}
