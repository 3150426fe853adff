//! Field diff updater: the write-if-changed primitive every importer uses.
//!
//! [`apply_fields`] resolves each mapped label from the incoming map, coerces
//! it to the target slot's kind, and overwrites the slot only when the value
//! differs. [`update`] does the same and then persists the target exactly once
//! if anything changed.
//!
//! A falsy incoming value (`null`, `0`, `""`, `false`, `[]`, `{}`) is never
//! written, so it can never replace a stored value. Transitions to zero,
//! blank, or `false` are therefore unreachable through an import. Downstream
//! consumers rely on this; see [`FALSY_NEVER_OVERWRITES`].

use serde_json::{Map, Value};
use specdb_core::field::{coerce, is_truthy, same_value, FieldValue};
use specdb_core::{DiffTarget, Persist};

use crate::error::IngestIssue;

/// Marker for the falsy-value rule, referenced from tests and docs.
pub const FALSY_NEVER_OVERWRITES: bool = true;

/// External label → target slot.
pub type FieldMapping<'a> = [(&'a str, &'a str)];

/// Result of diffing incoming values into a target in memory.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FieldDiff {
    /// Slots whose value was overwritten.
    pub changed_slots: Vec<String>,
    pub issues: Vec<IngestIssue>,
}

impl FieldDiff {
    #[must_use]
    pub fn changed(&self) -> usize {
        self.changed_slots.len()
    }
}

/// Result of [`update`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UpdateOutcome {
    /// Number of fields that changed and were persisted.
    pub changed: usize,
    /// Whether a write was issued and succeeded.
    pub persisted: bool,
    pub issues: Vec<IngestIssue>,
}

/// Diff `incoming` into `target` without persisting.
///
/// Labels missing from `incoming` are skipped. A slot the target does not
/// declare, or a value that cannot be coerced, becomes an issue and is skipped;
/// the remaining fields are still applied.
pub fn apply_fields<T: DiffTarget>(
    target: &mut T,
    incoming: &Map<String, Value>,
    mapping: &FieldMapping<'_>,
) -> FieldDiff {
    let mut diff = FieldDiff::default();

    for &(label, slot) in mapping {
        let Some(raw) = incoming.get(label) else {
            continue;
        };

        let Some(kind) = target.slot_kind(slot) else {
            tracing::warn!(
                entity = target.entity(),
                slot,
                "mapping names an unknown slot; skipping"
            );
            diff.issues.push(IngestIssue::UnknownSlot {
                entity: target.entity(),
                slot: slot.to_string(),
            });
            continue;
        };

        if FALSY_NEVER_OVERWRITES && !is_truthy(raw) {
            tracing::trace!(entity = target.entity(), slot, "falsy incoming value ignored");
            continue;
        }

        let value = match coerce(kind, raw) {
            Ok(value) => value,
            Err(source) => {
                diff.issues.push(IngestIssue::TypeCoercion {
                    entity: target.entity(),
                    key: target.key(),
                    slot: slot.to_string(),
                    source,
                });
                continue;
            }
        };

        let stored = target.get(slot);
        if same_value(kind, &stored, &value) {
            continue;
        }

        tracing::trace!(
            entity = target.entity(),
            key = %target.key(),
            slot,
            from = %stored,
            to = %value,
            "field changed"
        );
        target.set(slot, value);
        diff.changed_slots.push(slot.to_string());
    }

    diff
}

/// Point reference slots at store-assigned ids.
///
/// `Some(id)` references the entity, `None` clears the slot. Ids are not
/// document values, so the falsy rule does not apply: `0` is a valid id.
/// Slots not listed are left untouched.
pub fn apply_references<T: DiffTarget>(
    target: &mut T,
    references: &[(&str, Option<i64>)],
) -> FieldDiff {
    let mut diff = FieldDiff::default();

    for &(slot, id) in references {
        let Some(kind) = target.slot_kind(slot) else {
            diff.issues.push(IngestIssue::UnknownSlot {
                entity: target.entity(),
                slot: slot.to_string(),
            });
            continue;
        };

        let value = FieldValue::from(id);
        let stored = target.get(slot);
        if same_value(kind, &stored, &value) {
            continue;
        }

        tracing::trace!(
            entity = target.entity(),
            key = %target.key(),
            slot,
            from = %stored,
            to = %value,
            "reference changed"
        );
        target.set(slot, value);
        diff.changed_slots.push(slot.to_string());
    }

    diff
}

/// Persist `target` once if `diff` changed anything.
///
/// On a write failure `target` is restored to `original`, the failure becomes
/// a [`IngestIssue::Persistence`], and `changed` is reported as zero.
pub async fn persist_if_changed<T, P>(
    tx: &mut P,
    target: &mut T,
    original: T,
    diff: FieldDiff,
) -> UpdateOutcome
where
    T: DiffTarget + Sync,
    P: Persist<T> + Send,
{
    let FieldDiff {
        changed_slots,
        mut issues,
    } = diff;

    if changed_slots.is_empty() {
        return UpdateOutcome {
            changed: 0,
            persisted: false,
            issues,
        };
    }

    match tx.persist(target).await {
        Ok(()) => UpdateOutcome {
            changed: changed_slots.len(),
            persisted: true,
            issues,
        },
        Err(source) => {
            tracing::warn!(
                entity = target.entity(),
                key = %target.key(),
                error = %source,
                "write failed; change not applied"
            );
            issues.push(IngestIssue::Persistence {
                entity: target.entity(),
                key: target.key(),
                source,
            });
            *target = original;
            UpdateOutcome {
                changed: 0,
                persisted: false,
                issues,
            }
        }
    }
}

/// Diff `incoming` into `target` and persist it once if anything changed.
pub async fn update<T, P>(
    tx: &mut P,
    target: &mut T,
    incoming: &Map<String, Value>,
    mapping: &FieldMapping<'_>,
) -> UpdateOutcome
where
    T: DiffTarget + Clone + Send + Sync,
    P: Persist<T> + Send,
{
    let original = target.clone();
    let diff = apply_fields(target, incoming, mapping);
    persist_if_changed(tx, target, original, diff).await
}

#[cfg(test)]
#[path = "updater_test.rs"]
mod tests;
