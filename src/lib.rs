// Pedantic clippy configuration for numerical analysis code
#![allow(clippy::cast_precision_loss)] // usize→f32/f64 intentional in feature math
#![allow(clippy::cast_possible_truncation)] // usize→u32 in tensor indexing
#![allow(clippy::many_single_char_names)] // i, j, n standard in grid code
#![allow(clippy::similar_names)] // related variables like `head`/`heads`
#![allow(clippy::module_name_repetitions)] // FeatureGrid in grid.rs is fine
// Documentation pedantic - acceptable for research code:
#![allow(clippy::doc_markdown)] // backticks for every technical term is excessive
#![allow(clippy::missing_errors_doc)] // # Errors section for every Result fn
#![allow(clippy::missing_panics_doc)] // # Panics section for every panic
// Method style pedantic:
#![allow(clippy::must_use_candidate)] // #[must_use] on every pure fn is excessive
#![allow(clippy::return_self_not_must_use)] // #[must_use] on Self returns
#![allow(clippy::needless_pass_by_value)] // value params for API flexibility

//! lt-attention: cross-attention analysis of tensification
//!
//! Tests whether the cross-attention of a sequence-to-sequence transcription
//! model lines up with the syllable positions where tensification applies.
//!
//! ## Architecture
//!
//! - `classify`: Stimulus-code parsing, juncture/position rules, bucket keys
//! - `syllable`: Syllable templates, glide resyllabification, boundary index
//! - `attention`: Per-example cross-attention tensors
//! - `reduce`: Nine-feature reduction of the boundary-step attention
//! - `grid`: Layer x head feature grids and their merge
//! - `stimuli`: Stimulus reference table (TSV)
//! - `corpus`: Aligned example corpus (JSON)
//! - `dump`: Decoder dump shards to aligned examples
//! - `experiment`: Aggregation runner coordinating the full pass
//! - `summary`: Descriptive statistics for merged buckets
//! - `error`: Typed failures of the core

pub mod attention;
pub mod classify;
pub mod corpus;
pub mod dump;
pub mod error;
pub mod experiment;
pub mod grid;
pub mod reduce;
pub mod stimuli;
pub mod summary;
pub mod syllable;

pub use attention::CrossAttention;
pub use classify::{
    classify, is_tensified, AnalysisMode, Boundary, BucketKey, Classification, StimulusClass,
    StimulusCode, SyllableCode, WordPosition,
};
pub use corpus::{Example, ExampleCorpus};
pub use dump::{combine_shards, prepare_corpus, DecoderDump};
pub use error::{AnalysisError, AnalysisResult, CodeError};
pub use experiment::{
    AggregationResults, AnalysisConfig, ErrorPolicy, Experiment, SkippedExample, ValidationReport,
};
pub use grid::{Cell, FeatureBatch, FeatureField, FeatureGrid};
pub use reduce::{reduce, reduce_example, FeatureRecord};
pub use stimuli::{ReferenceTable, StimulusRow};
pub use summary::{summarize, BucketSummary, FieldSummary};
pub use syllable::{align, Alignment, SyllableShape, SyllableTemplate, Tag};
