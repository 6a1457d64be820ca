//! Error types for the alignment and aggregation core
//!
//! Every per-example failure names the corpus token it came from so that a
//! skipped or fatal example can be traced back to the input data.

use thiserror::Error;

/// Failures raised while aligning, reducing, classifying or merging.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Syllable template cannot be reconciled with the segment count
    #[error("cannot align '{token}' ('{input_word}'): template {template} covers {expected} segments, input has {found}")]
    Alignment {
        token: String,
        input_word: String,
        template: String,
        expected: usize,
        found: usize,
    },

    /// Two grids of different shape were merged
    #[error("grid dimensions must match for merging: expected {expected:?}, found {found:?}")]
    DimensionMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    /// Input form has no row in the reference table
    #[error("no reference row for '{token}' (input form '{input_word}')")]
    Lookup { token: String, input_word: String },

    /// Example's grid shape differs from the configured layers x heads
    #[error("grid of '{token}' is {found:?}, configured grid is {expected:?}")]
    ExampleShape {
        token: String,
        expected: (usize, usize),
        found: (usize, usize),
    },

    /// Stimulus code does not parse into class and syllable codes
    #[error("malformed stimulus code '{code}' for '{token}' (input form '{input_word}'): {reason}")]
    MalformedCode {
        token: String,
        input_word: String,
        code: String,
        reason: String,
    },

    /// Attention tensor does not cover the segments or the boundary step
    #[error("malformed attention for '{token}': {reason}")]
    MalformedAttention { token: String, reason: String },

    #[error(transparent)]
    Tensor(#[from] candle_core::Error),
}

impl AnalysisError {
    /// Short kind label used in skip reports
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Alignment { .. } => "alignment",
            Self::DimensionMismatch { .. } | Self::ExampleShape { .. } => "dimension_mismatch",
            Self::Lookup { .. } => "lookup",
            Self::MalformedCode { .. } => "malformed_code",
            Self::MalformedAttention { .. } => "malformed_attention",
            Self::Tensor(_) => "tensor",
        }
    }
}

pub type AnalysisResult<T> = std::result::Result<T, AnalysisError>;

/// Stimulus code that does not parse, before it is tied to an example
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed stimulus code '{code}': {reason}")]
pub struct CodeError {
    pub code: String,
    pub reason: String,
}

impl CodeError {
    /// Attach the example the code was looked up for
    pub fn for_example(self, token: &str, input_word: &str) -> AnalysisError {
        AnalysisError::MalformedCode {
            token: token.to_string(),
            input_word: input_word.to_string(),
            code: self.code,
            reason: self.reason,
        }
    }
}
