//! Stimulus reference table
//!
//! Tab-separated table with a header line and one row per stimulus. Rows are
//! indexed by their `transcription` column; the `code` column carries the
//! stimulus code parsed by [`crate::classify`].

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, warn};

pub const TRANSCRIPTION_COLUMN: &str = "transcription";
pub const CODE_COLUMN: &str = "code";

/// One row of the reference table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StimulusRow {
    fields: HashMap<String, String>,
}

impl StimulusRow {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }

    pub fn transcription(&self) -> &str {
        self.get(TRANSCRIPTION_COLUMN).unwrap_or_default()
    }

    pub fn code(&self) -> &str {
        self.get(CODE_COLUMN).unwrap_or_default()
    }
}

/// Reference rows keyed by whitespace-free transcription
#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    headers: Vec<String>,
    index: HashMap<String, StimulusRow>,
}

/// Join key: the form with all whitespace removed
pub fn join_key(form: &str) -> String {
    form.split_whitespace().collect()
}

impl ReferenceTable {
    /// Load a table from a TSV file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read reference table: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse reference table: {}", path.display()))
    }

    /// Parse TSV text.
    ///
    /// Short rows are padded with empty fields; blank lines are skipped. A
    /// repeated transcription keeps the last row.
    pub fn parse(content: &str) -> Result<Self> {
        let mut lines = content.lines();
        let header_line = lines
            .next()
            .ok_or_else(|| anyhow::anyhow!("Reference table is empty"))?;
        let headers: Vec<String> = header_line
            .trim_end_matches('\r')
            .split('\t')
            .map(|h| h.trim().to_string())
            .collect();

        for required in [TRANSCRIPTION_COLUMN, CODE_COLUMN] {
            anyhow::ensure!(
                headers.iter().any(|h| h == required),
                "Reference table has no '{required}' column (headers: {headers:?})"
            );
        }

        let mut index = HashMap::new();
        for (line_no, line) in lines.enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            let mut values = line.split('\t');
            let fields: HashMap<String, String> = headers
                .iter()
                .map(|h| (h.clone(), values.next().unwrap_or("").trim().to_string()))
                .collect();
            let row = StimulusRow { fields };
            let key = join_key(row.transcription());
            if key.is_empty() {
                warn!("Reference row {} has no transcription, ignoring", line_no + 2);
                continue;
            }
            if index.insert(key.clone(), row).is_some() {
                debug!("Duplicate transcription '{}' in reference table", key);
            }
        }

        Ok(Self { headers, index })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Find the row for an example's input form
    pub fn lookup(&self, input_word: &str) -> Option<&StimulusRow> {
        self.index.get(&join_key(input_word))
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
