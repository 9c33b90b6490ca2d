//! Name-to-constructor registry of clustering backends

use super::traits::ClusteringAlgorithm;
use crate::clustering::Dbscan;
use crate::error::ClusteringError;
use std::collections::BTreeMap;

/// Builds a backend from its string parameter map
pub type AlgorithmConstructor =
    fn(&BTreeMap<String, String>) -> Result<Box<dyn ClusteringAlgorithm>, ClusteringError>;

/// Clustering backends available to the orchestrator
///
/// Names are matched case-insensitively. A new registry knows DBSCAN only.
#[derive(Clone)]
pub struct AlgorithmRegistry {
    constructors: BTreeMap<String, AlgorithmConstructor>,
}

fn dbscan(parameters: &BTreeMap<String, String>) -> Result<Box<dyn ClusteringAlgorithm>, ClusteringError> {
    Ok(Box::new(Dbscan::from_parameters(parameters)?))
}

impl AlgorithmRegistry {
    /// Registry with the built-in backends
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Dbscan::NAME, dbscan);
        registry
    }

    /// Registry without any backend
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Register `constructor` under `name`, replacing any previous entry
    pub fn register(&mut self, name: &str, constructor: AlgorithmConstructor) {
        self.constructors.insert(name.to_ascii_lowercase(), constructor);
    }

    /// Whether `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(&name.to_ascii_lowercase())
    }

    /// Registered names, lowercase
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    /// Build backend `name` from `parameters`
    pub fn create(
        &self,
        name: &str,
        parameters: &BTreeMap<String, String>,
    ) -> Result<Box<dyn ClusteringAlgorithm>, ClusteringError> {
        let constructor = self
            .constructors
            .get(&name.to_ascii_lowercase())
            .ok_or_else(|| ClusteringError::Configuration(format!("unknown clustering algorithm '{}'", name)))?;
        constructor(parameters)
    }
}

impl Default for AlgorithmRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AlgorithmRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.constructors.keys()).finish()
    }
}
