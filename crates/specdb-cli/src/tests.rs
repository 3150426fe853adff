use std::path::Path;

use super::*;
use crate::import::{parse_documents, LoadedDocuments};

#[test]
fn parses_db_ping_command() {
    let cli = Cli::try_parse_from(["specdb-cli", "db", "ping"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Ping
        })
    ));
}

#[test]
fn parses_db_migrate_command() {
    let cli =
        Cli::try_parse_from(["specdb-cli", "db", "migrate"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Migrate
        })
    ));
}

#[test]
fn no_command_is_none() {
    let cli = Cli::try_parse_from(["specdb-cli"]).expect("expected valid cli args");
    assert!(cli.command.is_none());
}

#[test]
fn import_defaults_to_a_live_run() {
    let cli = Cli::try_parse_from(["specdb-cli", "import", "a.json", "b.json"]).unwrap();
    match cli.command {
        Some(Commands::Import {
            files,
            dry_run,
            concurrency,
        }) => {
            assert_eq!(files, vec![PathBuf::from("a.json"), PathBuf::from("b.json")]);
            assert!(!dry_run);
            assert_eq!(concurrency, None);
        }
        other => panic!("expected import command, got {other:?}"),
    }
}

#[test]
fn import_accepts_dry_run_and_concurrency() {
    let cli = Cli::try_parse_from([
        "specdb-cli",
        "import",
        "--dry-run",
        "--concurrency",
        "8",
        "a.json",
    ])
    .unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Import {
            dry_run: true,
            concurrency: Some(8),
            ..
        })
    ));
}

#[test]
fn import_requires_at_least_one_file() {
    assert!(Cli::try_parse_from(["specdb-cli", "import"]).is_err());
}

#[test]
fn parses_schemas_check_with_path() {
    let cli = Cli::try_parse_from(["specdb-cli", "schemas", "check", "--path", "x.yaml"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Schemas {
            command: SchemaCommands::Check { path: Some(_) }
        })
    ));
}

#[test]
fn parse_documents_accepts_object_and_array() {
    let mut loaded = LoadedDocuments::default();
    parse_documents(Path::new("one.json"), r#"{"id": "p-1"}"#, &mut loaded);
    parse_documents(
        Path::new("many.json"),
        r#"[{"id": "p-2"}, {"id": 3}, {"name": "no id"}]"#,
        &mut loaded,
    );

    let ids: Vec<_> = loaded
        .documents
        .iter()
        .map(|d| d.source_product_id.as_str())
        .collect();
    assert_eq!(ids, vec!["p-1", "p-2", "3"]);
    assert_eq!(loaded.rejected, 1);
}

#[test]
fn parse_documents_rejects_invalid_json() {
    let mut loaded = LoadedDocuments::default();
    parse_documents(Path::new("bad.json"), "{not json", &mut loaded);
    assert!(loaded.documents.is_empty());
    assert_eq!(loaded.rejected, 1);
}

#[test]
fn embedded_schemas_are_used_when_file_is_missing() {
    let registry = crate::schemas::load_registry(Path::new("/nonexistent/categories.yaml"))
        .expect("embedded schemas load");
    assert!(registry.get("RAM").is_some());
}
