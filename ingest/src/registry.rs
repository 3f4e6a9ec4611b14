//! Source registry - Holds the connectors a host has initialized.
//!
//! The host builds a registry explicitly after constructing its connectors.
//! There is no process-wide registry.

use crate::error::{IngestError, Result};
use crate::types::DataSource;
use crate::Connector;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

#[derive(Default)]
pub struct SourceRegistry {
    connectors: BTreeMap<String, Arc<dyn Connector>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connector under its declared source id. Duplicate ids are rejected.
    pub fn register(&mut self, connector: Arc<dyn Connector>) -> Result<()> {
        let source = connector.data_source();
        if source.id.is_empty() {
            return Err(IngestError::Configuration(
                "data source id must not be empty".to_string(),
            ));
        }
        if self.connectors.contains_key(&source.id) {
            return Err(IngestError::Configuration(format!(
                "data source {} is already registered",
                source.id
            )));
        }

        info!(
            source = %source.id,
            name = %source.name,
            requests_per_hour = source.rate_limit.requests_per_hour,
            burst = source.rate_limit.burst,
            "Registered data source"
        );
        self.connectors.insert(source.id.clone(), connector);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Connector>> {
        self.connectors.get(id).cloned()
    }

    /// Registration metadata of every connector, ordered by id.
    pub fn sources(&self) -> Vec<&DataSource> {
        self.connectors.values().map(|c| c.data_source()).collect()
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }
}
