//! # Repository
//!
//! A repository is a `.factgraph` directory inside a project directory,
//! holding the persistent fact store and its blobs.

use crate::backend::{StorageBackend, facts_of};
use crate::graph::Graph;
use crate::ids::{SharedIds, random_ids};
use crate::primitives::REPOSITORY_DIR;
use crate::store::FactStore;
use crate::FactGraphError;
use std::path::{Path, PathBuf};
use tracing::info;

/// Directories searched for repositories and config files: `start` and its
/// ancestors, then the home directory and its ancestors not already listed.
pub fn search_path(start: &Path) -> Vec<PathBuf> {
    let start = std::fs::canonicalize(start).unwrap_or_else(|_| start.to_path_buf());
    let mut dirs: Vec<PathBuf> = start.ancestors().map(Path::to_path_buf).collect();
    if let Some(home) = std::env::var_os("HOME").map(PathBuf::from) {
        for dir in home.ancestors() {
            if !dirs.iter().any(|seen| seen == dir) {
                dirs.push(dir.to_path_buf());
            }
        }
    }
    dirs
}

/// Find the nearest repository directory at or above `start`, falling back
/// to the home directory and its ancestors.
pub fn locate_repository(start: &Path) -> Option<PathBuf> {
    search_path(start)
        .into_iter()
        .map(|dir| dir.join(REPOSITORY_DIR))
        .find(|candidate| candidate.is_dir())
}

/// The repository path inside `project`; an existing non-directory at that
/// path is an error.
fn repository_path(project: &Path) -> Result<PathBuf, FactGraphError> {
    let path = project.join(REPOSITORY_DIR);
    if path.exists() && !path.is_dir() {
        return Err(FactGraphError::IoError(format!(
            "{} exists and is not a directory",
            path.display()
        )));
    }
    Ok(path)
}

/// Create a repository inside `project` and initialize its store.
///
/// An existing repository is left untouched. Returns the repository
/// directory.
pub fn create_repository(project: &Path) -> Result<PathBuf, FactGraphError> {
    if !project.is_dir() {
        return Err(FactGraphError::NotARepository(project.to_path_buf()));
    }
    let path = repository_path(project)?;
    if path.is_dir() {
        return Ok(path);
    }
    std::fs::create_dir(&path)?;
    let mut store = facts_of(Some(&path), random_ids())?;
    store.setup()?;
    info!(path = %path.display(), "created repository");
    Ok(path)
}

/// Delete the repository inside `project`, returning whether one existed.
pub fn remove_repository(project: &Path) -> Result<bool, FactGraphError> {
    let path = repository_path(project)?;
    if !path.is_dir() {
        return Ok(false);
    }
    std::fs::remove_dir_all(&path)?;
    info!(path = %path.display(), "removed repository");
    Ok(true)
}

/// An opened repository and its graph.
#[derive(Debug)]
pub struct Repository {
    path: PathBuf,
    graph: Graph<StorageBackend>,
}

impl Repository {
    /// Open the repository inside `project`.
    pub fn open(project: &Path, ids: SharedIds) -> Result<Self, FactGraphError> {
        let path = project.join(REPOSITORY_DIR);
        if !path.is_dir() {
            return Err(FactGraphError::NotARepository(project.to_path_buf()));
        }
        let graph = Graph::open(Some(&path), ids)?;
        Ok(Self { path, graph })
    }

    /// The `.factgraph` directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn graph(&self) -> &Graph<StorageBackend> {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph<StorageBackend> {
        &mut self.graph
    }

    #[must_use]
    pub fn into_graph(self) -> Graph<StorageBackend> {
        self.graph
    }
}
