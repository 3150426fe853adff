pub mod app_config;
pub mod config;
pub mod document;
pub mod entities;
pub mod field;
pub mod schema;
pub mod store;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use document::{parse_external_id, AttributePayload, ProductDocument, SpecificationDocument};
pub use entities::{
    AttributeComponent, AttributeGroup, AttributeTree, ConditionClass, EnergyLabel, Price,
    Product, Stock, Variant,
};
pub use field::{DiffTarget, FieldValue, SlotKind};
pub use schema::{load_schemas, CategorySchema, SchemaRegistry, SchemasFile};
pub use store::{Persist, Store, StoreError, StoreTx};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read category schemas at {path}: {source}")]
    SchemasFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse category schemas: {0}")]
    SchemasFileParse(#[from] serde_yaml::Error),

    #[error("category schema validation failed: {0}")]
    Validation(String),
}
