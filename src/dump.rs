//! Decoder dump conversion
//!
//! The decoding run writes one record per example with the attention of
//! every output segment stored separately (`seg0`, `seg1`, ...), each segment
//! holding `layerK.cross_attention_weights[head][hypothesis][input]` for the
//! whole beam. Dumps are written in shards named `attentions_*.json`.
//!
//! Conversion keeps only the chosen hypothesis (`winner_idx`) and regroups
//! the steps per (layer, head), giving the [`Example`] layout the
//! aggregation consumes.
//!
//! Input columns are copied as they are. The aggregation expects exactly one
//! column per input segment, so a dump whose attention also covers an
//! end-of-sentence input has to be written without that column; otherwise
//! every example fails with a malformed attention error.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::corpus::{Example, ExampleCorpus};

pub const SHARD_PREFIX: &str = "attentions_";
pub const SHARD_SUFFIX: &str = ".json";

/// Cross-attention of one layer for one output segment
#[derive(Debug, Clone, Deserialize)]
pub struct LayerDump {
    /// `[head][hypothesis][input]`
    pub cross_attention_weights: Vec<Vec<Vec<f32>>>,
}

/// Raw decoder record of one example
#[derive(Debug, Clone, Deserialize)]
pub struct DecoderDump {
    pub input_word: String,
    /// Missing when decoding did not finish
    #[serde(default)]
    pub output_word: Option<String>,
    #[serde(default)]
    pub winner_idx: Option<usize>,
    /// `segN` entries plus anything else the decoder stored
    #[serde(flatten)]
    pub rest: BTreeMap<String, serde_json::Value>,
}

/// Numeric suffix of keys like `seg12` or `layer3`
fn indexed_key(key: &str, prefix: &str) -> Option<usize> {
    let digits = key.strip_prefix(prefix)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

impl DecoderDump {
    pub fn is_finished(&self) -> bool {
        self.output_word.is_some() && self.winner_idx.is_some()
    }

    /// Output segments in step order
    fn segments(&self) -> Result<Vec<BTreeMap<usize, LayerDump>>> {
        let mut indexed: Vec<(usize, &serde_json::Value)> = self
            .rest
            .iter()
            .filter_map(|(k, v)| indexed_key(k, "seg").map(|i| (i, v)))
            .collect();
        indexed.sort_by_key(|(i, _)| *i);

        indexed
            .into_iter()
            .map(|(seg_idx, value)| {
                let entries: BTreeMap<String, serde_json::Value> =
                    serde_json::from_value(value.clone())
                        .with_context(|| format!("seg{seg_idx} is not an object"))?;
                let mut layers = BTreeMap::new();
                for (key, layer) in entries {
                    if let Some(layer_idx) = indexed_key(&key, "layer") {
                        let parsed: LayerDump = serde_json::from_value(layer)
                            .with_context(|| format!("seg{seg_idx}.{key} has no cross attention"))?;
                        layers.insert(layer_idx, parsed);
                    }
                }
                Ok(layers)
            })
            .collect()
    }

    /// Keep the winning hypothesis and regroup steps by layer and head
    pub fn to_example(&self, token: &str) -> Result<Example> {
        let output_word = self
            .output_word
            .clone()
            .ok_or_else(|| anyhow::anyhow!("'{token}' has no output word"))?;
        let winner = self
            .winner_idx
            .ok_or_else(|| anyhow::anyhow!("'{token}' has no winner_idx"))?;

        let segments = self.segments()?;
        debug!("'{}': {} output segments", token, segments.len());

        let mut layers: Vec<Vec<Vec<Vec<f32>>>> = Vec::new();
        for (seg_idx, seg) in segments.iter().enumerate() {
            if seg_idx == 0 {
                let n_heads = seg.values().next().map_or(0, |l| l.cross_attention_weights.len());
                layers = vec![vec![Vec::with_capacity(segments.len()); n_heads]; seg.len()];
            }
            anyhow::ensure!(
                seg.len() == layers.len(),
                "'{token}' seg{seg_idx} has {} layers, expected {}",
                seg.len(),
                layers.len()
            );
            for (position, (&layer_idx, layer)) in seg.iter().enumerate() {
                anyhow::ensure!(
                    layer_idx == position,
                    "'{token}' seg{seg_idx} has layer{layer_idx} where layer{position} was expected"
                );
                let heads = &mut layers[layer_idx];
                anyhow::ensure!(
                    layer.cross_attention_weights.len() == heads.len(),
                    "'{token}' seg{seg_idx} layer {layer_idx} has {} heads, expected {}",
                    layer.cross_attention_weights.len(),
                    heads.len()
                );
                for (head_idx, hypotheses) in layer.cross_attention_weights.iter().enumerate() {
                    let chosen = hypotheses.get(winner).ok_or_else(|| {
                        anyhow::anyhow!(
                            "'{token}' winner_idx {winner} out of range ({} hypotheses)",
                            hypotheses.len()
                        )
                    })?;
                    heads[head_idx].push(chosen.clone());
                }
            }
        }

        Ok(Example {
            input_word: self.input_word.clone(),
            output_word,
            layers,
        })
    }
}

/// Load every `attentions_*.json` shard in `dir`, in file-name order.
///
/// Later shards overwrite earlier entries with the same token.
pub fn combine_shards(dir: impl AsRef<Path>) -> Result<BTreeMap<String, DecoderDump>> {
    let dir = dir.as_ref();
    let mut shard_paths: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to list shard directory: {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(SHARD_PREFIX) && n.ends_with(SHARD_SUFFIX))
        })
        .collect();
    shard_paths.sort();
    info!("Found {} shard files in {}", shard_paths.len(), dir.display());

    let mut combined = BTreeMap::new();
    for path in &shard_paths {
        debug!("Loading shard {}", path.display());
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read shard: {}", path.display()))?;
        let shard: BTreeMap<String, DecoderDump> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse shard: {}", path.display()))?;
        combined.extend(shard);
    }
    Ok(combined)
}

/// Combine shards and convert every finished record into an example.
///
/// Attention rows must hold one weight per input segment, with no trailing
/// end-of-sentence column.
pub fn prepare_corpus(dir: impl AsRef<Path>) -> Result<ExampleCorpus> {
    let dumps = combine_shards(dir)?;
    let mut corpus = ExampleCorpus::new();
    for (token, dump) in &dumps {
        if !dump.is_finished() {
            warn!("Skipping unfinished decoder record '{}'", token);
            continue;
        }
        corpus.insert(token.clone(), dump.to_example(token)?);
    }
    info!("Prepared {} of {} decoder records", corpus.len(), dumps.len());
    Ok(corpus)
}
