//! Category schemas: the declarative table that maps each category's external
//! field labels onto internal slots, plus the allow-lists used for drift
//! detection.
//!
//! Schemas are configuration data (`config/categories.yaml`), not code. A copy
//! of the shipped file is embedded so the engine always has a registry.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

const BUILTIN_SCHEMAS: &str = include_str!("../../../config/categories.yaml");

/// One category as written in the schemas file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryConfig {
    /// External category label, e.g. `"RAM"`.
    pub label: String,
    /// Internal slot → external field label.
    pub slots: BTreeMap<String, String>,
    /// Labels that are known to occur but are deliberately not stored.
    #[serde(default)]
    pub ignored: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemasFile {
    /// Top-level categories that are recognized but have no mapper.
    #[serde(default)]
    pub known_categories: Vec<String>,
    pub categories: Vec<CategoryConfig>,
}

/// Validated schema for one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySchema {
    label: String,
    /// `(external label, slot)` pairs in slot order.
    mapping: Vec<(String, String)>,
    allow_list: BTreeSet<String>,
}

impl CategorySchema {
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// `(external label, slot)` pairs for every slot of the category.
    pub fn mapping(&self) -> impl Iterator<Item = (&str, &str)> {
        self.mapping
            .iter()
            .map(|(label, slot)| (label.as_str(), slot.as_str()))
    }

    /// Slot that stores `label`, if the label is mapped.
    #[must_use]
    pub fn slot_for(&self, label: &str) -> Option<&str> {
        self.mapping
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, slot)| slot.as_str())
    }

    /// Whether `label` is on the category's allow-list (mapped or ignored).
    #[must_use]
    pub fn allows(&self, label: &str) -> bool {
        self.allow_list.contains(label)
    }

    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.mapping.len()
    }
}

/// All category schemas, keyed by external category label.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    categories: BTreeMap<String, CategorySchema>,
    known_categories: BTreeSet<String>,
}

impl SchemaRegistry {
    /// Validate a parsed schemas file and build the registry from it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] on empty labels, invalid slot names,
    /// duplicate categories, or a label claimed twice within a category.
    pub fn from_file(file: SchemasFile) -> Result<Self, ConfigError> {
        validate_schemas(&file)?;

        let mut categories = BTreeMap::new();
        for config in file.categories {
            let mut allow_list: BTreeSet<String> = config.slots.values().cloned().collect();
            allow_list.extend(config.ignored.iter().cloned());
            let mapping = config
                .slots
                .into_iter()
                .map(|(slot, label)| (label, slot))
                .collect();
            categories.insert(
                config.label.clone(),
                CategorySchema {
                    label: config.label,
                    mapping,
                    allow_list,
                },
            );
        }

        Ok(Self {
            categories,
            known_categories: file.known_categories.into_iter().collect(),
        })
    }

    /// Parse and validate schemas from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::SchemasFileParse`] or [`ConfigError::Validation`].
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let file: SchemasFile = serde_yaml::from_str(yaml)?;
        Self::from_file(file)
    }

    /// The registry compiled into the binary from `config/categories.yaml`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] only if the embedded file is invalid.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_yaml_str(BUILTIN_SCHEMAS)
    }

    /// Schema for a category that has a mapper.
    #[must_use]
    pub fn get(&self, category: &str) -> Option<&CategorySchema> {
        self.categories.get(category)
    }

    /// Whether a top-level category is on the master allow-list.
    ///
    /// Mapped categories and `known_categories` are both allowed.
    #[must_use]
    pub fn is_known_category(&self, category: &str) -> bool {
        self.categories.contains_key(category) || self.known_categories.contains(category)
    }

    pub fn categories(&self) -> impl Iterator<Item = &CategorySchema> {
        self.categories.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

/// Load and validate category schemas from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_schemas(path: &Path) -> Result<SchemaRegistry, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::SchemasFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    SchemaRegistry::from_yaml_str(&content)
}

fn validate_schemas(file: &SchemasFile) -> Result<(), ConfigError> {
    let mut seen_categories = HashSet::new();

    for category in &file.categories {
        if category.label.trim().is_empty() {
            return Err(ConfigError::Validation(
                "category label must be non-empty".to_string(),
            ));
        }

        if !seen_categories.insert(category.label.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate category: '{}'",
                category.label
            )));
        }

        let mut seen_labels = HashSet::new();
        for (slot, label) in &category.slots {
            if !is_valid_slot_name(slot) {
                return Err(ConfigError::Validation(format!(
                    "category '{}' has invalid slot name '{slot}'; use lowercase snake_case",
                    category.label
                )));
            }
            if label.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "category '{}' slot '{slot}' has an empty label",
                    category.label
                )));
            }
            if !seen_labels.insert(label.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "category '{}' maps label '{label}' to more than one slot",
                    category.label
                )));
            }
        }

        for label in &category.ignored {
            if seen_labels.contains(label.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "category '{}' lists label '{label}' as both mapped and ignored",
                    category.label
                )));
            }
        }
    }

    for known in &file.known_categories {
        if seen_categories.contains(known.as_str()) {
            return Err(ConfigError::Validation(format!(
                "category '{known}' is listed in known_categories but also has a schema"
            )));
        }
    }

    Ok(())
}

fn is_valid_slot_name(slot: &str) -> bool {
    !slot.is_empty()
        && slot.starts_with(|c: char| c.is_ascii_lowercase())
        && slot
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
#[path = "schema_test.rs"]
mod tests;
