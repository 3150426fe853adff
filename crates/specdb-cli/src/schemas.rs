//! Category schema loading for the CLI.

use std::path::Path;

use specdb_core::SchemaRegistry;

/// Load the registry from `path`, or the embedded copy when the file is absent.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or fails validation.
pub(crate) fn load_registry(path: &Path) -> anyhow::Result<SchemaRegistry> {
    if path.exists() {
        Ok(specdb_core::load_schemas(path)?)
    } else {
        tracing::info!(
            path = %path.display(),
            "schemas file not found; using the embedded category schemas"
        );
        Ok(SchemaRegistry::builtin()?)
    }
}

/// Validate a schemas file and print what it declares.
///
/// # Errors
///
/// Returns an error if the file cannot be read, parsed, or validated.
pub(crate) fn run_check(path: &Path) -> anyhow::Result<()> {
    let registry = specdb_core::load_schemas(path)?;
    let slots: usize = registry.categories().map(|c| c.slot_count()).sum();
    println!(
        "{}: {} categories, {} slots",
        path.display(),
        registry.len(),
        slots
    );
    for category in registry.categories() {
        println!("  {:<24} {:>3} slots", category.label(), category.slot_count());
    }
    Ok(())
}
