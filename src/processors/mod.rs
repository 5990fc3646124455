//! Processor variants. Each submodule implements [`ItemProcessor`] for one
//! per-item enrichment step.
//!
//! [`ItemProcessor`]: crate::contract::ItemProcessor

pub mod ollama_filter;

pub use ollama_filter::OllamaFilterProcessor;
