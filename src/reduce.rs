//! Attention reduction
//!
//! Collapses the attention vector produced at the boundary output step into
//! the nine per-head features: word edges, the segment before the boundary,
//! and the summed (and vowel-only) attention of each syllable. Raw weights
//! are kept as they are; nothing is renormalized.

use serde::{Deserialize, Serialize};

use crate::attention::CrossAttention;
use crate::error::{AnalysisError, AnalysisResult};
use crate::grid::{FeatureField, FeatureGrid};
use crate::syllable::{Alignment, SyllableTemplate, Tag};

/// Syllables every record describes
pub const N_SYLLABLES: usize = 3;

/// Features of one (layer, head) for one example
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub word_initial: f32,
    pub word_final: f32,
    pub preceding: f32,
    pub syl0_sum: f32,
    pub syl0_vowel: f32,
    pub syl1_sum: f32,
    pub syl1_vowel: f32,
    pub syl2_sum: f32,
    pub syl2_vowel: f32,
}

impl FeatureRecord {
    pub fn get(&self, field: FeatureField) -> f32 {
        match field {
            FeatureField::WordInitial => self.word_initial,
            FeatureField::WordFinal => self.word_final,
            FeatureField::Preceding => self.preceding,
            FeatureField::Syl0Sum => self.syl0_sum,
            FeatureField::Syl0Vowel => self.syl0_vowel,
            FeatureField::Syl1Sum => self.syl1_sum,
            FeatureField::Syl1Vowel => self.syl1_vowel,
            FeatureField::Syl2Sum => self.syl2_sum,
            FeatureField::Syl2Vowel => self.syl2_vowel,
        }
    }

    pub fn syllable_sums(&self) -> [f32; N_SYLLABLES] {
        [self.syl0_sum, self.syl1_sum, self.syl2_sum]
    }

    pub fn syllable_vowels(&self) -> [f32; N_SYLLABLES] {
        [self.syl0_vowel, self.syl1_vowel, self.syl2_vowel]
    }
}

/// Reduce one attention vector over the input segments.
///
/// `weights` is the distribution at output step `boundary`; it must have
/// one entry per template segment.
pub fn reduce(
    token: &str,
    template: &SyllableTemplate,
    boundary: usize,
    weights: &[f32],
) -> AnalysisResult<FeatureRecord> {
    let malformed = |reason: String| AnalysisError::MalformedAttention {
        token: token.to_string(),
        reason,
    };

    if template.n_syllables() != N_SYLLABLES {
        return Err(malformed(format!(
            "template {template} has {} syllables, expected {N_SYLLABLES}",
            template.n_syllables()
        )));
    }
    if weights.len() != template.segment_count() {
        return Err(malformed(format!(
            "attention covers {} inputs, template {template} has {}",
            weights.len(),
            template.segment_count()
        )));
    }
    if boundary == 0 || boundary > weights.len() {
        return Err(malformed(format!(
            "boundary {boundary} has no preceding input among {}",
            weights.len()
        )));
    }

    let mut sums = [0.0f32; N_SYLLABLES];
    let mut vowels = [0.0f32; N_SYLLABLES];
    let mut cursor = 0;
    for (idx, syl) in template.syllables().iter().enumerate() {
        let span = &weights[cursor..cursor + syl.len()];
        sums[idx] = span.iter().sum();
        vowels[idx] = syl
            .tags()
            .iter()
            .zip(span)
            .filter(|(tag, _)| **tag == Tag::V)
            .map(|(_, w)| *w)
            .sum();
        cursor += syl.len();
    }

    Ok(FeatureRecord {
        word_initial: weights[0],
        word_final: weights[weights.len() - 1],
        preceding: weights[boundary - 1],
        syl0_sum: sums[0],
        syl0_vowel: vowels[0],
        syl1_sum: sums[1],
        syl1_vowel: vowels[1],
        syl2_sum: sums[2],
        syl2_vowel: vowels[2],
    })
}

/// Reduce every (layer, head) of an example into a single-example grid
pub fn reduce_example(
    token: &str,
    alignment: &Alignment,
    attention: &CrossAttention,
) -> AnalysisResult<FeatureGrid> {
    if alignment.boundary >= attention.output_steps() {
        return Err(AnalysisError::MalformedAttention {
            token: token.to_string(),
            reason: format!(
                "boundary step {} but only {} output steps",
                alignment.boundary,
                attention.output_steps()
            ),
        });
    }

    let mut grid = FeatureGrid::new(attention.n_layers(), attention.n_heads());
    for layer in 0..attention.n_layers() {
        for head in 0..attention.n_heads() {
            let weights = attention.step_weights(layer, head, alignment.boundary)?;
            let record = reduce(token, &alignment.template, alignment.boundary, &weights)?;
            grid.set(layer, head, record);
        }
    }
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syllable::SyllableShape;

    fn template(shapes: &[&str]) -> SyllableTemplate {
        SyllableTemplate::new(shapes.iter().map(|s| SyllableShape::parse(s)).collect())
    }

    #[test]
    fn test_reduce_six_segments() {
        let weights = [0.1, 0.2, 0.05, 0.05, 0.5, 0.1];
        let record = reduce("t", &template(&["CV", "CV", "CV"]), 4, &weights).unwrap();

        assert_eq!(record.word_initial, 0.1);
        assert_eq!(record.word_final, 0.1);
        assert_eq!(record.preceding, 0.05);

        let total: f32 = record.syllable_sums().iter().sum();
        assert!((total - 1.0).abs() < 1e-6);
        assert!((record.syl0_sum - 0.3).abs() < 1e-6);
        assert!((record.syl0_vowel - 0.2).abs() < 1e-6);
        assert!((record.syl2_vowel - 0.1).abs() < 1e-6);
        for (sum, vowel) in record.syllable_sums().iter().zip(record.syllable_vowels()) {
            assert!(vowel <= *sum);
        }
    }

    #[test]
    fn test_reduce_diphthong_template() {
        // p w a . t a . k a with the glide counted as a vowel slot
        let weights = [0.1, 0.1, 0.1, 0.2, 0.1, 0.3, 0.1];
        let record = reduce("t", &template(&["CVV", "CV", "CV"]), 5, &weights).unwrap();
        assert!((record.syl0_sum - 0.3).abs() < 1e-6);
        assert!((record.syl0_vowel - 0.2).abs() < 1e-6);
        assert_eq!(record.preceding, 0.1);
        assert_eq!(record.get(FeatureField::Syl2Sum), record.syl2_sum);
    }

    #[test]
    fn test_reduce_keeps_raw_weights() {
        let weights = [2.0, 0.0, 0.0, 0.0, 0.0, 3.0];
        let record = reduce("t", &template(&["CV", "CV", "CV"]), 2, &weights).unwrap();
        assert_eq!(record.syl0_sum + record.syl1_sum + record.syl2_sum, 5.0);
    }

    #[test]
    fn test_reduce_rejects_bad_shapes() {
        let t = template(&["CV", "CV", "CV"]);
        assert!(reduce("t", &t, 4, &[0.1; 5]).is_err());
        assert!(reduce("t", &t, 0, &[0.1; 6]).is_err());
        assert!(reduce("t", &template(&["CV", "CV"]), 2, &[0.1; 4]).is_err());
    }

    #[test]
    fn test_reduce_example_grid() {
        let alignment = Alignment {
            template: template(&["CV", "CV", "CV"]),
            boundary: 4,
            unshifted_boundary: 4,
            glides_before: 0,
        };
        let step = vec![0.1, 0.2, 0.05, 0.05, 0.5, 0.1];
        let layers: Vec<Vec<Vec<Vec<f32>>>> = vec![vec![vec![step.clone(); 6]; 2]; 4];
        let attention = CrossAttention::from_nested("t", &layers).unwrap();

        let grid = reduce_example("t", &alignment, &attention).unwrap();
        assert_eq!(grid.shape(), (4, 2));
        assert_eq!(grid.batch_size(), Some(1));
        assert_eq!(grid.get(3, 1).record().unwrap().word_initial, 0.1);

        // Too few output steps for the boundary
        let short: Vec<Vec<Vec<Vec<f32>>>> = vec![vec![vec![step; 4]; 2]; 4];
        let attention = CrossAttention::from_nested("t", &short).unwrap();
        assert!(reduce_example("t", &alignment, &attention).is_err());
    }
}
