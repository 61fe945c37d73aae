//! Explicit host context handed to plugins and views.

use crate::deps::{deps, DependentsGraph};
use crate::host::{ConfigStore, PackageManager, Workspace};
use std::sync::Arc;

/// The graph plus the host services consumers talk to.
///
/// Clones share every service.
#[derive(Clone)]
pub struct HostContext {
    pub graph: DependentsGraph,
    pub workspace: Arc<Workspace>,
    pub packages: Arc<PackageManager>,
    pub config: Arc<ConfigStore>,
}

impl Default for HostContext {
    fn default() -> Self {
        Self::new()
    }
}

impl HostContext {
    /// Fresh host services on a private graph with the built-in variants.
    pub fn new() -> Self {
        Self::with_graph(DependentsGraph::with_builtin_variants())
    }

    /// Fresh host services on the process-wide graph.
    pub fn global() -> Self {
        Self::with_graph(deps().clone())
    }

    pub fn with_graph(graph: DependentsGraph) -> Self {
        Self {
            graph,
            workspace: Arc::new(Workspace::new()),
            packages: Arc::new(PackageManager::new()),
            config: Arc::new(ConfigStore::new()),
        }
    }
}
