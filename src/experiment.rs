//! Aggregation runner
//!
//! Coordinates stimulus lookup, syllable alignment, attention reduction and
//! bucketing for every example, merging each example's grid into the
//! running grid of its bucket.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::attention::CrossAttention;
use crate::classify::{classify, AnalysisMode, BucketKey};
use crate::corpus::{Example, ExampleCorpus};
use crate::error::{AnalysisError, AnalysisResult};
use crate::grid::FeatureGrid;
use crate::reduce::reduce_example;
use crate::stimuli::ReferenceTable;
use crate::syllable::align;

/// What to do when one example cannot be processed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ErrorPolicy {
    /// Abort the run on the first failing example
    #[default]
    FailFast,
    /// Record the example as skipped and continue
    SkipAndReport,
}

/// Configuration for an aggregation run
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Path to the aligned example corpus (JSON)
    pub examples_path: PathBuf,
    /// Path to the stimulus reference table (TSV)
    pub reference_path: PathBuf,
    /// Where the bucket grids are written
    pub output_path: PathBuf,
    pub mode: AnalysisMode,
    /// Grid rows
    pub n_layers: usize,
    /// Grid columns
    pub n_heads: usize,
    pub error_policy: ErrorPolicy,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            examples_path: PathBuf::from("combined_attention_aligned_for_analysis.json"),
            reference_path: PathBuf::from("stimuli.tsv"),
            output_path: PathBuf::from("compare_lt_nonlt_attn.json"),
            mode: AnalysisMode::Stimuli,
            n_layers: 4,
            n_heads: 2,
            error_policy: ErrorPolicy::FailFast,
        }
    }
}

/// An example left out of the aggregation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedExample {
    pub token: String,
    pub input_word: String,
    pub kind: String,
    pub reason: String,
}

impl SkippedExample {
    fn new(token: &str, example: &Example, err: &AnalysisError) -> Self {
        Self {
            token: token.to_string(),
            input_word: example.input_word.clone(),
            kind: err.kind().to_string(),
            reason: err.to_string(),
        }
    }
}

/// Merged grids of a full run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationResults {
    pub mode: AnalysisMode,
    /// Bucket name -> merged grid
    pub buckets: BTreeMap<String, FeatureGrid>,
    /// Examples left out under `ErrorPolicy::SkipAndReport`
    pub skipped: Vec<SkippedExample>,
}

impl AggregationResults {
    pub fn bucket(&self, name: &str) -> Option<&FeatureGrid> {
        self.buckets.get(name)
    }

    /// Examples merged across all buckets
    pub fn merged_examples(&self) -> usize {
        self.buckets
            .values()
            .map(|grid| grid.batch_size().unwrap_or(0))
            .sum()
    }

    /// Save results as JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write results: {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read results: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid results file: {}", path.display()))
    }
}

/// Outcome of a dry validation pass
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub checked: usize,
    pub problems: Vec<SkippedExample>,
    /// Bucket name -> examples that would join it
    pub bucket_counts: BTreeMap<String, usize>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Main aggregation runner
pub struct Experiment {
    config: AnalysisConfig,
    corpus: ExampleCorpus,
    table: ReferenceTable,
}

impl Experiment {
    /// Create an experiment from already loaded inputs
    pub fn new(config: AnalysisConfig, corpus: ExampleCorpus, table: ReferenceTable) -> Self {
        Self {
            config,
            corpus,
            table,
        }
    }

    /// Load corpus and reference table from the configured paths
    pub fn load(config: AnalysisConfig) -> Result<Self> {
        let corpus = ExampleCorpus::load(&config.examples_path)?;
        let table = ReferenceTable::load(&config.reference_path)?;
        info!(
            "Reference table: {} stimuli from {}",
            table.len(),
            config.reference_path.display()
        );
        Ok(Self::new(config, corpus, table))
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn corpus(&self) -> &ExampleCorpus {
        &self.corpus
    }

    fn empty_grid(&self) -> FeatureGrid {
        FeatureGrid::new(self.config.n_layers, self.config.n_heads)
    }

    /// Classify, align and reduce one example
    pub fn process_example(
        &self,
        token: &str,
        example: &Example,
    ) -> AnalysisResult<(BucketKey, FeatureGrid)> {
        let classification = classify(token, example, &self.table, self.config.mode)?;
        let alignment = align(token, &example.segments(), &classification.code)?;
        debug!(
            "'{}': {} boundary {} ({} glides before)",
            token, alignment.template, alignment.boundary, alignment.glides_before
        );

        let attention = CrossAttention::from_nested(token, &example.layers)?;
        let grid = reduce_example(token, &alignment, &attention)?;
        let expected = (self.config.n_layers, self.config.n_heads);
        if grid.shape() != expected {
            return Err(AnalysisError::ExampleShape {
                token: token.to_string(),
                expected,
                found: grid.shape(),
            });
        }
        Ok((classification.bucket(), grid))
    }

    /// Check every example without aggregating or writing anything
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();
        for (token, example) in self.corpus.iter() {
            report.checked += 1;
            match self.process_example(token, example) {
                Ok((key, _)) => *report.bucket_counts.entry(key.name()).or_default() += 1,
                Err(err) => {
                    warn!("Example '{}' would be skipped: {}", token, err);
                    report.problems.push(SkippedExample::new(token, example, &err));
                }
            }
        }
        info!(
            "Validated {} examples, {} problems",
            report.checked,
            report.problems.len()
        );
        report
    }

    /// Run the full aggregation
    pub fn run(&self) -> Result<AggregationResults> {
        info!(
            "Aggregating {} examples ({} mode, {}x{} grid)",
            self.corpus.len(),
            self.config.mode,
            self.config.n_layers,
            self.config.n_heads
        );

        let mut buckets: BTreeMap<String, FeatureGrid> = BucketKey::all(self.config.mode)
            .into_iter()
            .map(|key| (key.name(), self.empty_grid()))
            .collect();
        let mut skipped = Vec::new();

        for (item_n, (token, example)) in self.corpus.iter().enumerate() {
            debug!("Processing #{} '{}'", item_n, token);
            let (key, grid) = match self.process_example(token, example) {
                Ok(processed) => processed,
                Err(err) => match self.config.error_policy {
                    ErrorPolicy::FailFast => {
                        return Err(anyhow::Error::new(err)
                            .context(format!("Failed to process example '{token}'")));
                    }
                    ErrorPolicy::SkipAndReport => {
                        warn!("Skipping example '{}': {}", token, err);
                        skipped.push(SkippedExample::new(token, example, &err));
                        continue;
                    }
                },
            };

            debug!("'{}' -> {}", token, key);
            let bucket = buckets.entry(key.name()).or_insert_with(|| self.empty_grid());
            bucket
                .absorb(grid)
                .with_context(|| format!("Failed to merge example '{token}' into {key}"))?;
        }

        for (name, grid) in &buckets {
            info!("{}: {}", name, grid);
        }
        if !skipped.is_empty() {
            warn!("{} examples skipped", skipped.len());
        }

        Ok(AggregationResults {
            mode: self.config.mode,
            buckets,
            skipped,
        })
    }
}
