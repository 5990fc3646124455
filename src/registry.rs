//! Static lookup from configuration discriminator strings to constructors.
//!
//! Populated once at process start; adding a connector or processor variant
//! means one `register_*` call here (or in the embedding application) and
//! no change to the pipeline. Factories are closures so each variant can
//! capture exactly the shared configuration slice it needs.

use std::collections::HashMap;

use crate::connectors::{arxiv, rss, ArxivConnector, RssConnector};
use crate::contract::{ConfigError, ItemProcessor, SourceConnector, SourceError};
use crate::load_config::OllamaConfig;
use crate::processors::{ollama_filter, OllamaFilterProcessor};

pub type ConnectorFactory =
    Box<dyn Fn(&serde_yaml::Value) -> Result<Box<dyn SourceConnector>, ConfigError> + Send + Sync>;

pub type ProcessorFactory =
    Box<dyn Fn(&serde_yaml::Value) -> Result<Box<dyn ItemProcessor>, ConfigError> + Send + Sync>;

#[derive(Default)]
pub struct Registry {
    connectors: HashMap<String, ConnectorFactory>,
    processors: HashMap<String, ProcessorFactory>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every connector and processor this crate ships.
    pub fn builtin(ollama: &OllamaConfig) -> Self {
        let mut registry = Self::new();

        registry.register_connector(
            arxiv::KIND,
            Box::new(|raw| Ok(Box::new(ArxivConnector::from_config(raw)?) as Box<dyn SourceConnector>)),
        );
        registry.register_connector(
            rss::KIND,
            Box::new(|raw| Ok(Box::new(RssConnector::from_config(raw)?) as Box<dyn SourceConnector>)),
        );

        let ollama = ollama.clone();
        registry.register_processor(
            ollama_filter::KIND,
            Box::new(move |raw| {
                Ok(Box::new(OllamaFilterProcessor::from_config(raw, &ollama)?) as Box<_>)
            }),
        );

        registry
    }

    pub fn register_connector(&mut self, kind: impl Into<String>, factory: ConnectorFactory) {
        self.connectors.insert(kind.into(), factory);
    }

    pub fn register_processor(&mut self, kind: impl Into<String>, factory: ProcessorFactory) {
        self.processors.insert(kind.into(), factory);
    }

    /// Construct the connector registered under `kind` from its config
    /// mapping.
    pub fn connector(
        &self,
        kind: &str,
        config: &serde_yaml::Value,
    ) -> Result<Box<dyn SourceConnector>, SourceError> {
        let factory = self
            .connectors
            .get(kind)
            .ok_or_else(|| SourceError::UnknownConnector(kind.to_string()))?;
        Ok(factory(config)?)
    }

    /// Construct the processor registered under `kind` from its config
    /// mapping.
    pub fn processor(
        &self,
        kind: &str,
        config: &serde_yaml::Value,
    ) -> Result<Box<dyn ItemProcessor>, SourceError> {
        let factory = self
            .processors
            .get(kind)
            .ok_or_else(|| SourceError::UnknownProcessor(kind.to_string()))?;
        Ok(factory(config)?)
    }
}
