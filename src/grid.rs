//! Layer x head feature grids
//!
//! A [`FeatureGrid`] has a fixed shape (rows = layers, columns = heads) and
//! holds one [`Cell`] per (layer, head). A cell is empty, a single example's
//! [`FeatureRecord`], or a [`FeatureBatch`] of records stacked across merged
//! examples. Merging dispatches on the pair of cell kinds:
//!
//! | left    | right   | result                         |
//! |---------|---------|--------------------------------|
//! | Empty   | x       | x                              |
//! | x       | Empty   | x                              |
//! | Single  | Single  | Batched of 2                   |
//! | Batched | Single  | Batched, record appended       |
//! | Single  | Batched | Batched, record first          |
//! | Batched | Batched | Batched, concatenated          |

use std::fmt;

use candle_core::{Device, Tensor};
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, AnalysisResult};
use crate::reduce::FeatureRecord;

/// The nine per-head features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureField {
    WordInitial,
    WordFinal,
    Preceding,
    Syl0Sum,
    Syl0Vowel,
    Syl1Sum,
    Syl1Vowel,
    Syl2Sum,
    Syl2Vowel,
}

impl FeatureField {
    pub const ALL: [FeatureField; 9] = [
        Self::WordInitial,
        Self::WordFinal,
        Self::Preceding,
        Self::Syl0Sum,
        Self::Syl0Vowel,
        Self::Syl1Sum,
        Self::Syl1Vowel,
        Self::Syl2Sum,
        Self::Syl2Vowel,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::WordInitial => "word_initial",
            Self::WordFinal => "word_final",
            Self::Preceding => "preceding",
            Self::Syl0Sum => "syl0_sum",
            Self::Syl0Vowel => "syl0_vowel",
            Self::Syl1Sum => "syl1_sum",
            Self::Syl1Vowel => "syl1_vowel",
            Self::Syl2Sum => "syl2_sum",
            Self::Syl2Vowel => "syl2_vowel",
        }
    }
}

impl fmt::Display for FeatureField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Records of several examples, one value per example in every field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBatch")]
pub struct FeatureBatch {
    pub word_initial: Vec<f32>,
    pub word_final: Vec<f32>,
    pub preceding: Vec<f32>,
    pub syl0_sum: Vec<f32>,
    pub syl0_vowel: Vec<f32>,
    pub syl1_sum: Vec<f32>,
    pub syl1_vowel: Vec<f32>,
    pub syl2_sum: Vec<f32>,
    pub syl2_vowel: Vec<f32>,
}

impl FeatureBatch {
    pub fn from_records(records: &[FeatureRecord]) -> Self {
        let mut batch = Self::default();
        for record in records {
            batch.push(record);
        }
        batch
    }

    pub fn push(&mut self, record: &FeatureRecord) {
        for field in FeatureField::ALL {
            self.field_mut(field).push(record.get(field));
        }
    }

    /// Concatenate `other` after the current entries
    pub fn append(&mut self, mut other: FeatureBatch) {
        for field in FeatureField::ALL {
            let tail = std::mem::take(other.field_mut(field));
            self.field_mut(field).extend(tail);
        }
    }

    /// Number of examples in the batch
    pub fn len(&self) -> usize {
        self.word_initial.len()
    }

    pub fn is_empty(&self) -> bool {
        self.word_initial.is_empty()
    }

    pub fn field(&self, field: FeatureField) -> &[f32] {
        match field {
            FeatureField::WordInitial => &self.word_initial,
            FeatureField::WordFinal => &self.word_final,
            FeatureField::Preceding => &self.preceding,
            FeatureField::Syl0Sum => &self.syl0_sum,
            FeatureField::Syl0Vowel => &self.syl0_vowel,
            FeatureField::Syl1Sum => &self.syl1_sum,
            FeatureField::Syl1Vowel => &self.syl1_vowel,
            FeatureField::Syl2Sum => &self.syl2_sum,
            FeatureField::Syl2Vowel => &self.syl2_vowel,
        }
    }

    fn field_mut(&mut self, field: FeatureField) -> &mut Vec<f32> {
        match field {
            FeatureField::WordInitial => &mut self.word_initial,
            FeatureField::WordFinal => &mut self.word_final,
            FeatureField::Preceding => &mut self.preceding,
            FeatureField::Syl0Sum => &mut self.syl0_sum,
            FeatureField::Syl0Vowel => &mut self.syl0_vowel,
            FeatureField::Syl1Sum => &mut self.syl1_sum,
            FeatureField::Syl1Vowel => &mut self.syl1_vowel,
            FeatureField::Syl2Sum => &mut self.syl2_sum,
            FeatureField::Syl2Vowel => &mut self.syl2_vowel,
        }
    }

    /// One field as a rank-1 tensor of length `len()`
    pub fn field_tensor(&self, field: FeatureField) -> candle_core::Result<Tensor> {
        let values = self.field(field);
        Tensor::from_slice(values, values.len(), &Device::Cpu)
    }
}

/// Batch as stored on disk, before the field lengths are checked
#[derive(Deserialize)]
struct RawBatch {
    word_initial: Vec<f32>,
    word_final: Vec<f32>,
    preceding: Vec<f32>,
    syl0_sum: Vec<f32>,
    syl0_vowel: Vec<f32>,
    syl1_sum: Vec<f32>,
    syl1_vowel: Vec<f32>,
    syl2_sum: Vec<f32>,
    syl2_vowel: Vec<f32>,
}

impl TryFrom<RawBatch> for FeatureBatch {
    type Error = String;

    fn try_from(raw: RawBatch) -> Result<Self, String> {
        let batch = FeatureBatch {
            word_initial: raw.word_initial,
            word_final: raw.word_final,
            preceding: raw.preceding,
            syl0_sum: raw.syl0_sum,
            syl0_vowel: raw.syl0_vowel,
            syl1_sum: raw.syl1_sum,
            syl1_vowel: raw.syl1_vowel,
            syl2_sum: raw.syl2_sum,
            syl2_vowel: raw.syl2_vowel,
        };
        let n = batch.len();
        if let Some(field) = FeatureField::ALL
            .into_iter()
            .find(|f| batch.field(*f).len() != n)
        {
            return Err(format!(
                "batch field {field} has {} values, word_initial has {n}",
                batch.field(field).len()
            ));
        }
        Ok(batch)
    }
}

/// One (layer, head) slot of a grid
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Cell {
    #[default]
    Empty,
    Single(FeatureRecord),
    Batched(FeatureBatch),
}

impl Cell {
    /// Number of examples in the cell
    pub fn len(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Single(_) => 1,
            Self::Batched(batch) => batch.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn record(&self) -> Option<&FeatureRecord> {
        match self {
            Self::Single(record) => Some(record),
            _ => None,
        }
    }

    pub fn batch(&self) -> Option<&FeatureBatch> {
        match self {
            Self::Batched(batch) => Some(batch),
            _ => None,
        }
    }

    /// Values of one field, one per example
    pub fn values(&self, field: FeatureField) -> Vec<f32> {
        match self {
            Self::Empty => Vec::new(),
            Self::Single(record) => vec![record.get(field)],
            Self::Batched(batch) => batch.field(field).to_vec(),
        }
    }

    /// Stack `other` after `self`
    pub fn combine(self, other: Cell) -> Cell {
        match (self, other) {
            (Cell::Empty, cell) | (cell, Cell::Empty) => cell,
            (Cell::Single(a), Cell::Single(b)) => Cell::Batched(FeatureBatch::from_records(&[a, b])),
            (Cell::Batched(mut a), Cell::Single(b)) => {
                a.push(&b);
                Cell::Batched(a)
            }
            (Cell::Single(a), Cell::Batched(b)) => {
                let mut batch = FeatureBatch::from_records(&[a]);
                batch.append(b);
                Cell::Batched(batch)
            }
            (Cell::Batched(mut a), Cell::Batched(b)) => {
                a.append(b);
                Cell::Batched(a)
            }
        }
    }
}

/// Fixed-shape layer x head matrix of cells
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGrid")]
pub struct FeatureGrid {
    rows: usize,
    cols: usize,
    /// Row-major cells
    cells: Vec<Cell>,
}

#[derive(Deserialize)]
struct RawGrid {
    rows: usize,
    cols: usize,
    cells: Vec<Cell>,
}

impl TryFrom<RawGrid> for FeatureGrid {
    type Error = String;

    fn try_from(raw: RawGrid) -> Result<Self, String> {
        let expected = raw.rows.checked_mul(raw.cols).ok_or_else(|| {
            format!("grid shape {}x{} overflows", raw.rows, raw.cols)
        })?;
        if raw.cells.len() != expected {
            return Err(format!(
                "{}x{} grid needs {expected} cells, found {}",
                raw.rows,
                raw.cols,
                raw.cells.len()
            ));
        }
        Ok(Self {
            rows: raw.rows,
            cols: raw.cols,
            cells: raw.cells,
        })
    }
}

impl FeatureGrid {
    /// Create an empty grid of `rows` layers and `cols` heads
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![Cell::Empty; rows * cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    fn index(&self, row: usize, col: usize) -> usize {
        assert!(
            row < self.rows && col < self.cols,
            "cell ({row}, {col}) outside {}x{} grid",
            self.rows,
            self.cols
        );
        row * self.cols + col
    }

    pub fn get(&self, row: usize, col: usize) -> &Cell {
        &self.cells[self.index(row, col)]
    }

    pub fn set(&mut self, row: usize, col: usize, record: FeatureRecord) {
        self.set_cell(row, col, Cell::Single(record));
    }

    pub fn set_cell(&mut self, row: usize, col: usize, cell: Cell) {
        let idx = self.index(row, col);
        self.cells[idx] = cell;
    }

    /// Iterate `(row, col, cell)` in row-major order
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &Cell)> {
        let cols = self.cols;
        self.cells
            .iter()
            .enumerate()
            .map(move |(idx, cell)| (idx / cols, idx % cols, cell))
    }

    /// True when no cell is populated
    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(Cell::is_empty)
    }

    /// Examples merged into the grid, if all cells agree
    pub fn batch_size(&self) -> Option<usize> {
        let mut sizes = self.cells.iter().map(Cell::len);
        let first = sizes.next().unwrap_or(0);
        sizes.all(|n| n == first).then_some(first)
    }

    fn check_dimension(&self, other: &FeatureGrid) -> AnalysisResult<()> {
        if self.shape() != other.shape() {
            return Err(AnalysisError::DimensionMismatch {
                expected: self.shape(),
                found: other.shape(),
            });
        }
        Ok(())
    }

    /// Merge two grids into a new one; neither input changes.
    ///
    /// An empty grid on either side is the identity.
    pub fn merge(&self, other: &FeatureGrid) -> AnalysisResult<FeatureGrid> {
        let mut merged = self.clone();
        merged.absorb(other.clone())?;
        Ok(merged)
    }

    /// Merge `other` into `self` in place.
    ///
    /// On a shape mismatch `self` is left untouched.
    pub fn absorb(&mut self, other: FeatureGrid) -> AnalysisResult<()> {
        self.check_dimension(&other)?;
        if other.is_empty() {
            return Ok(());
        }
        if self.is_empty() {
            *self = other;
            return Ok(());
        }
        for (cell, incoming) in self.cells.iter_mut().zip(other.cells) {
            *cell = std::mem::take(cell).combine(incoming);
        }
        Ok(())
    }
}

impl fmt::Display for FeatureGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "Empty grid of size {}x{}", self.rows, self.cols);
        }
        match self.batch_size() {
            Some(n) => write!(f, "Grid of size {}x{} with {n} items", self.rows, self.cols),
            None => write!(f, "Grid of size {}x{} with uneven cells", self.rows, self.cols),
        }
    }
}
