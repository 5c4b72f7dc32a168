//! Integration tests for the CLI: argument parsing, store resolution and
//! commands run against a repository in a temporary directory.

// Allow panic in tests - match arms on unexpected commands
#![allow(clippy::panic)]

use clap::Parser;
use factgraph::cli::{
    Cli, Commands, StoreOptions, cmd_add, cmd_clear, cmd_delete, cmd_facts, cmd_find, cmd_init,
    cmd_query, cmd_status, open_graph, parse_condition, parse_pattern,
};
use factgraph::config::Settings;
use factgraph_core::{FactGraphError, Filter, Pattern, Value};
use std::path::Path;
use tempfile::{TempDir, tempdir};

const PEOPLE: &str = r#"[
    {"kind": "user", "name": "Joe", "age": 12},
    {"kind": "user", "name": "Sally", "age": 31, "born": {"__type__": "date", "value": "1991-01-02"}}
]"#;

/// A project with an initialized repository and the options to open it.
fn project() -> (TempDir, StoreOptions) {
    let temp = tempdir().expect("temp dir");
    cmd_init(Some(temp.path()), false, false).expect("init");
    let store = StoreOptions {
        location: Some(temp.path().to_string_lossy().into_owned()),
        backend: None,
    };
    (temp, store)
}

fn write_people(dir: &Path) -> std::path::PathBuf {
    let file = dir.join("people.json");
    std::fs::write(&file, PEOPLE).expect("write");
    file
}

// =============================================================================
// PARSING TESTS
// =============================================================================

#[test]
fn test_parse_query_command() {
    let cli = Cli::try_parse_from(["factgraph", "query", "?id name ?n", "?id kind user"])
        .expect("parse");
    match cli.command {
        Some(Commands::Query { clauses }) => assert_eq!(clauses.len(), 2),
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn test_global_flags_after_subcommand() {
    let cli = Cli::try_parse_from(["factgraph", "status", "-L", ":memory:", "--json-mode"])
        .expect("parse");
    assert_eq!(cli.location.as_deref(), Some(":memory:"));
    assert!(cli.json_mode);
}

#[test]
fn test_flags_override_settings() {
    let cli = Cli::try_parse_from(["factgraph", "-B", "memory", "status"]).expect("parse");
    let settings = Settings {
        location: Some("/somewhere".to_string()),
        backend: Some("redb".to_string()),
        ..Settings::default()
    };
    let store = StoreOptions::resolve(&cli, &settings);
    assert_eq!(store.backend.as_deref(), Some("memory"));
    assert_eq!(store.location.as_deref(), Some("/somewhere"));
}

#[test]
fn test_pattern_words() {
    assert_eq!(parse_pattern("_", "_", "_"), Pattern::any());
    assert_eq!(
        parse_pattern("_", "name", "Joe"),
        Pattern::any().attribute("name").value("Joe")
    );
    assert_eq!(
        parse_pattern("4", "age", "12"),
        Pattern::any().entity("4").attribute("age").value(12)
    );
}

#[test]
fn test_conditions() {
    assert_eq!(
        parse_condition("age=12").expect("parse"),
        ("age".to_string(), Value::Int(12))
    );
    assert_eq!(
        parse_condition("name=Project One").expect("parse"),
        ("name".to_string(), Value::from("Project One"))
    );
    assert!(matches!(
        parse_condition("=x"),
        Err(FactGraphError::InvalidQuery(_))
    ));
    assert!(parse_condition("noequals").is_err());
}

// =============================================================================
// STORE RESOLUTION TESTS
// =============================================================================

#[test]
fn test_memory_backend() {
    let store = StoreOptions {
        location: None,
        backend: Some("memory".to_string()),
    };
    let graph = open_graph(&store).expect("open");
    assert!(!graph.store().is_persistent());
}

#[test]
fn test_unknown_backend_is_rejected() {
    let store = StoreOptions {
        location: None,
        backend: Some("sqlite".to_string()),
    };
    assert!(matches!(open_graph(&store), Err(FactGraphError::Config(_))));
}

#[test]
fn test_location_without_repository() {
    let temp = tempdir().expect("temp dir");
    let store = StoreOptions {
        location: Some(temp.path().to_string_lossy().into_owned()),
        backend: None,
    };
    assert!(matches!(
        open_graph(&store),
        Err(FactGraphError::NotARepository(_))
    ));
}

// =============================================================================
// COMMAND TESTS
// =============================================================================

#[test]
fn test_init_twice_needs_force() {
    let (temp, store) = project();
    assert!(cmd_init(Some(temp.path()), false, false).is_err());

    cmd_add(&store, false, &write_people(temp.path())).expect("add");
    cmd_init(Some(temp.path()), true, true).expect("force init");
    assert_eq!(open_graph(&store).expect("open").len().expect("len"), 0);
}

#[test]
fn test_force_init_over_a_file_fails() {
    let temp = tempdir().expect("temp dir");
    let marker = temp.path().join(".factgraph");
    std::fs::write(&marker, "not a repository").expect("write");

    assert!(matches!(
        cmd_init(Some(temp.path()), true, false),
        Err(FactGraphError::IoError(_))
    ));
    assert!(marker.is_file());
}

#[test]
fn test_add_query_delete_clear() {
    let (temp, store) = project();
    cmd_add(&store, true, &write_people(temp.path())).expect("add");

    let graph = open_graph(&store).expect("open");
    assert_eq!(graph.len().expect("len"), 9);
    let sally = graph
        .first(&Filter::new().eq("name", "Sally"))
        .expect("first")
        .expect("some");
    assert!(matches!(sally.get("born"), Some(Value::Date(_))));
    drop(graph);

    cmd_query(&store, true, &["?id kind user".to_string()]).expect("query");
    cmd_find(&store, false, &[], &["kind=user".to_string()], true).expect("find");
    cmd_facts(&store, true, "_", "name", "_").expect("facts");
    cmd_status(&store, false).expect("status");

    cmd_delete(&store, false, "_", "name", "Joe").expect("delete");
    let graph = open_graph(&store).expect("open");
    assert!(!graph
        .exists(&Filter::new().eq("name", "Joe"))
        .expect("exists"));
    drop(graph);

    cmd_clear(&store).expect("clear");
    assert!(open_graph(&store).expect("open").is_empty().expect("is_empty"));
}

#[test]
fn test_find_needs_a_condition() {
    let (_temp, store) = project();
    assert!(matches!(
        cmd_find(&store, false, &[], &[], false),
        Err(FactGraphError::InvalidQuery(_))
    ));
}

#[test]
fn test_add_rejects_invalid_json() {
    let (temp, store) = project();
    let file = temp.path().join("broken.json");
    std::fs::write(&file, "{not json").expect("write");
    assert!(matches!(
        cmd_add(&store, false, &file),
        Err(FactGraphError::SerializationError(_))
    ));
}

#[test]
fn test_bad_clause_is_invalid_query() {
    let (_temp, store) = project();
    assert!(matches!(
        cmd_query(&store, false, &["?id name".to_string()]),
        Err(FactGraphError::InvalidQuery(_))
    ));
}
