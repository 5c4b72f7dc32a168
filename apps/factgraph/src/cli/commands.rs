//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use super::StoreOptions;
use factgraph_core::json::{entity_to_json, value_to_json};
use factgraph_core::primitives::{MEMORY_LOCATION, REPOSITORY_DIR};
use factgraph_core::{
    Clause, Data, Entity, FactGraphError, Filter, Graph, Pattern, Repository, StorageBackend,
    Term, Value, create_repository, locate_repository, random_ids, remove_repository,
};
use serde_json::json;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum size of a document accepted by `add` (100 MB).
const MAX_INPUT_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), FactGraphError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| FactGraphError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(FactGraphError::SerializationError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Resolve an input path to a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, FactGraphError> {
    let canonical = path.canonicalize().map_err(|e| {
        FactGraphError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(FactGraphError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

fn print_json(output: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(output).unwrap_or_default()
    );
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Create a repository in `path` (or the working directory).
pub fn cmd_init(path: Option<&Path>, force: bool, json_mode: bool) -> Result<(), FactGraphError> {
    let project = match path {
        Some(path) => path.to_path_buf(),
        None => std::env::current_dir()?,
    };

    if project.join(REPOSITORY_DIR).exists() {
        if !force {
            return Err(FactGraphError::IoError(format!(
                "Repository already exists in {}. Use --force to replace it.",
                project.display()
            )));
        }
        remove_repository(&project)?;
    }

    let repository = create_repository(&project)?;
    if json_mode {
        print_json(&json!({ "repository": repository.to_string_lossy() }));
    } else {
        println!("Initialized empty factgraph repository in {}", repository.display());
    }
    Ok(())
}

// =============================================================================
// ADD COMMAND
// =============================================================================

/// Digest a JSON document into the graph.
pub fn cmd_add(store: &StoreOptions, json_mode: bool, file: &Path) -> Result<(), FactGraphError> {
    tracing::info!("Adding {:?}", file);

    let validated_path = validate_file_path(file)?;
    validate_file_size(&validated_path, MAX_INPUT_FILE_SIZE)?;
    let contents = std::fs::read(&validated_path)
        .map_err(|e| FactGraphError::IoError(format!("Read file: {}", e)))?;
    let document: serde_json::Value = serde_json::from_slice(&contents)
        .map_err(|e| FactGraphError::SerializationError(format!("Parse JSON: {}", e)))?;
    let data = Data::from_json(&document)?;

    let mut graph = open_graph(store)?;
    let before = graph.len()?;
    let id = graph.add(&data)?;
    let added = graph.len()?.saturating_sub(before);

    if json_mode {
        print_json(&json!({ "id": value_to_json(&id), "facts": added }));
    } else {
        println!("Added {} facts", added);
        println!("Id: {}", id);
    }
    Ok(())
}

// =============================================================================
// READ COMMANDS
// =============================================================================

/// Show entities by id, sorted by id.
pub fn cmd_get(store: &StoreOptions, json_mode: bool, ids: &[String]) -> Result<(), FactGraphError> {
    let graph = open_graph(store)?;
    let ids: BTreeSet<&str> = ids.iter().map(String::as_str).collect();

    if json_mode {
        let mut output = serde_json::Map::new();
        for id in ids {
            let entity = graph.get(id)?;
            output.insert(
                id.to_string(),
                entity.as_ref().map_or(serde_json::Value::Null, entity_to_json),
            );
        }
        print_json(&serde_json::Value::Object(output));
        return Ok(());
    }

    for id in ids {
        match graph.get(id)? {
            Some(entity) => print_entity(id, &entity),
            None => println!("{}: not found", id),
        }
    }
    Ok(())
}

/// Print the nested structure under an id as JSON.
pub fn cmd_fetch(store: &StoreOptions, id: &str) -> Result<(), FactGraphError> {
    let graph = open_graph(store)?;
    let output = graph
        .fetch(id)?
        .map_or(serde_json::Value::Null, |data| data.to_json());
    print_json(&output);
    Ok(())
}

/// Run a conjunctive query.
pub fn cmd_query(
    store: &StoreOptions,
    json_mode: bool,
    clauses: &[String],
) -> Result<(), FactGraphError> {
    let clauses = clauses
        .iter()
        .map(|text| Clause::parse(text))
        .collect::<Result<Vec<_>, _>>()?;
    let graph = open_graph(store)?;
    let results = graph.query(&clauses)?;

    if json_mode {
        let rows: Vec<serde_json::Value> = results
            .iter()
            .map(|binding| {
                serde_json::Value::Object(
                    binding
                        .iter()
                        .map(|(name, value)| (name.clone(), value_to_json(value)))
                        .collect(),
                )
            })
            .collect();
        print_json(&json!({ "count": rows.len(), "results": rows }));
        return Ok(());
    }

    println!("{} results", results.len());
    for binding in &results {
        let row: Vec<String> = binding
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        println!("  {}", row.join(" "));
    }
    Ok(())
}

/// Find entities by attribute.
pub fn cmd_find(
    store: &StoreOptions,
    json_mode: bool,
    has: &[String],
    eq: &[String],
    first: bool,
) -> Result<(), FactGraphError> {
    let mut filter = Filter::new();
    for attribute in has {
        filter = filter.has(attribute.as_str());
    }
    for condition in eq {
        let (attribute, value) = parse_condition(condition)?;
        filter = filter.eq(attribute, value);
    }
    if filter.is_empty() {
        return Err(FactGraphError::InvalidQuery(
            "find needs at least one --has or --eq".to_string(),
        ));
    }

    let graph = open_graph(store)?;
    let entities = if first {
        graph.first(&filter)?.into_iter().collect()
    } else {
        graph.find(&filter)?
    };

    if json_mode {
        let rows: Vec<serde_json::Value> = entities.iter().map(entity_to_json).collect();
        print_json(&json!({ "count": rows.len(), "results": rows }));
        return Ok(());
    }

    println!("{} entities", entities.len());
    for entity in &entities {
        print_entity("-", entity);
    }
    Ok(())
}

/// List facts matching a pattern.
pub fn cmd_facts(
    store: &StoreOptions,
    json_mode: bool,
    entity: &str,
    attribute: &str,
    value: &str,
) -> Result<(), FactGraphError> {
    let graph = open_graph(store)?;
    let facts = graph.matching(&parse_pattern(entity, attribute, value))?;

    if json_mode {
        let rows: Vec<serde_json::Value> = facts
            .iter()
            .map(|fact| json!([fact.entity, fact.attribute, value_to_json(&fact.value)]))
            .collect();
        print_json(&serde_json::Value::Array(rows));
        return Ok(());
    }

    for fact in &facts {
        println!("{}", fact);
    }
    Ok(())
}

/// Show fact count and location.
pub fn cmd_status(store: &StoreOptions, json_mode: bool) -> Result<(), FactGraphError> {
    let graph = open_graph(store)?;
    let backend = if graph.store().is_persistent() {
        "redb"
    } else {
        "memory"
    };
    let location = graph
        .store()
        .location()
        .map_or_else(|| MEMORY_LOCATION.to_string(), |p| p.display().to_string());
    let facts = graph.len()?;
    let blobs = graph.store().blob_keys()?.len();

    if json_mode {
        print_json(&json!({
            "location": location,
            "backend": backend,
            "facts": facts,
            "blobs": blobs,
        }));
        return Ok(());
    }

    println!("factgraph Status");
    println!("================");
    println!("Location: {}", location);
    println!("Backend:  {}", backend);
    println!();
    println!("Facts:    {}", facts);
    println!("Blobs:    {}", blobs);
    Ok(())
}

// =============================================================================
// WRITE COMMANDS
// =============================================================================

/// Delete facts matching a pattern.
pub fn cmd_delete(
    store: &StoreOptions,
    json_mode: bool,
    entity: &str,
    attribute: &str,
    value: &str,
) -> Result<(), FactGraphError> {
    let mut graph = open_graph(store)?;
    let removed = graph.delete(&parse_pattern(entity, attribute, value))?;

    if json_mode {
        print_json(&json!({ "deleted": removed }));
    } else {
        println!("Deleted {} facts", removed);
    }
    Ok(())
}

/// Remove every fact.
pub fn cmd_clear(store: &StoreOptions) -> Result<(), FactGraphError> {
    let mut graph = open_graph(store)?;
    let facts = graph.len()?;
    graph.clear()?;
    tracing::info!(facts, "cleared graph");
    println!("Removed {} facts", facts);
    Ok(())
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Open the graph the options point at.
///
/// - Backend `memory` or location `:memory:`: a fresh in-memory graph
/// - A location: the repository inside that project directory
/// - Otherwise: the nearest repository above the working directory
pub fn open_graph(store: &StoreOptions) -> Result<Graph<StorageBackend>, FactGraphError> {
    let memory = match store.backend.as_deref() {
        None | Some("redb") => false,
        Some("memory") => true,
        Some(other) => {
            return Err(FactGraphError::Config(format!(
                "unknown backend {:?}, expected \"redb\" or \"memory\"",
                other
            )));
        }
    };

    match store.location.as_deref() {
        _ if memory => Graph::open(None, random_ids()),
        Some(MEMORY_LOCATION) => Graph::open(None, random_ids()),
        Some(project) => Ok(Repository::open(Path::new(project), random_ids())?.into_graph()),
        None => {
            let cwd = std::env::current_dir()?;
            let repository =
                locate_repository(&cwd).ok_or(FactGraphError::NotARepository(cwd))?;
            tracing::debug!(repository = %repository.display(), "using repository");
            Graph::open(Some(&repository), random_ids())
        }
    }
}

/// Build a pattern from CLI words; `_` is a wildcard.
pub fn parse_pattern(entity: &str, attribute: &str, value: &str) -> Pattern {
    let mut pattern = Pattern::any();
    if entity != "_" {
        pattern = pattern.entity(entity);
    }
    if attribute != "_" {
        pattern = pattern.attribute(attribute);
    }
    if let Term::Const(value) = Term::parse_value(value) {
        pattern = pattern.value(value);
    }
    pattern
}

/// Split `attr=value`, reading the value as a JSON scalar when it is one.
pub fn parse_condition(text: &str) -> Result<(String, Value), FactGraphError> {
    let (attribute, value) = text
        .split_once('=')
        .filter(|(attribute, _)| !attribute.is_empty())
        .ok_or_else(|| FactGraphError::InvalidQuery(format!("expected attr=value, got {:?}", text)))?;
    let value = match Term::parse_value(value) {
        Term::Const(value) => value,
        _ => Value::Str(value.to_string()),
    };
    Ok((attribute.to_string(), value))
}

fn print_entity(label: &str, entity: &Entity) {
    println!("{}", label);
    for (attribute, value) in entity.iter() {
        println!("  {}: {}", attribute, value);
    }
}
