//! Example corpus loading
//!
//! The corpus maps each example token to its input form, the decoder's
//! output form and the cross-attention weights `layers[layer][head][step]`.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// A single decoded example
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    /// Space-separated input segments, e.g. `"t v k m a ng"`
    pub input_word: String,
    pub output_word: String,
    /// `layers[layer][head][output_step][input_segment]`
    pub layers: Vec<Vec<Vec<Vec<f32>>>>,
}

impl Example {
    /// Input segments in order
    pub fn segments(&self) -> Vec<&str> {
        self.input_word.split_whitespace().collect()
    }

    pub fn n_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn n_heads(&self) -> usize {
        self.layers.first().map_or(0, Vec::len)
    }
}

/// Collection of examples keyed by token, iterated in key order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExampleCorpus {
    examples: BTreeMap<String, Example>,
}

impl ExampleCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load corpus from JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read example corpus: {}", path.display()))?;
        let corpus: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse example corpus: {}", path.display()))?;
        info!("Loaded {} examples from {}", corpus.len(), path.display());
        Ok(corpus)
    }

    /// Write corpus as JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write example corpus: {}", path.display()))?;
        Ok(())
    }

    /// Insert an example, returning any example previously stored under `token`
    pub fn insert(&mut self, token: impl Into<String>, example: Example) -> Option<Example> {
        self.examples.insert(token.into(), example)
    }

    pub fn get(&self, token: &str) -> Option<&Example> {
        self.examples.get(token)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Example)> {
        self.examples.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Total number of examples
    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }
}

impl FromIterator<(String, Example)> for ExampleCorpus {
    fn from_iter<I: IntoIterator<Item = (String, Example)>>(iter: I) -> Self {
        Self {
            examples: iter.into_iter().collect(),
        }
    }
}
