//! Syllable alignment
//!
//! Maps a stimulus code onto the raw segment list of an example: three
//! syllable shapes built from the per-syllable codes, widened where a glide
//! forms a diphthong the coarse code does not describe, and the boundary
//! index of the onset that follows the tensification juncture.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::classify::StimulusCode;
use crate::error::{AnalysisError, AnalysisResult};

/// Segments folded into the following vowel's nucleus
pub const GLIDES: [&str; 2] = ["w", "y"];

pub fn is_glide(segment: &str) -> bool {
    GLIDES.contains(&segment)
}

/// Consonant or vowel slot of a syllable shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tag {
    C,
    V,
}

/// Ordered C/V tags of one syllable
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyllableShape(Vec<Tag>);

impl SyllableShape {
    /// Build a shape from a pattern such as `"CVC"`.
    ///
    /// Every character other than `V` is a consonant slot.
    pub fn parse(pattern: &str) -> Self {
        Self(
            pattern
                .chars()
                .map(|c| if c == 'V' { Tag::V } else { Tag::C })
                .collect(),
        )
    }

    pub fn tags(&self) -> &[Tag] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Shape with one extra vowel slot for a glide.
    ///
    /// Vowel-initial shapes gain a leading `V`; otherwise the slot goes right
    /// after the first consonant.
    pub fn with_glide(&self) -> Self {
        let mut tags = Vec::with_capacity(self.0.len() + 1);
        match self.0.first() {
            Some(Tag::V) | None => {
                tags.push(Tag::V);
                tags.extend_from_slice(&self.0);
            }
            Some(Tag::C) => {
                tags.push(Tag::C);
                tags.push(Tag::V);
                tags.extend_from_slice(&self.0[1..]);
            }
        }
        Self(tags)
    }
}

impl fmt::Display for SyllableShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for tag in &self.0 {
            match tag {
                Tag::C => f.write_str("C")?,
                Tag::V => f.write_str("V")?,
            }
        }
        Ok(())
    }
}

/// Syllable shapes of a word, always walked from syllable 0 onwards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyllableTemplate {
    syllables: Vec<SyllableShape>,
}

impl SyllableTemplate {
    pub fn new(syllables: Vec<SyllableShape>) -> Self {
        Self { syllables }
    }

    pub fn syllables(&self) -> &[SyllableShape] {
        &self.syllables
    }

    pub fn n_syllables(&self) -> usize {
        self.syllables.len()
    }

    /// Number of segments the template covers
    pub fn segment_count(&self) -> usize {
        self.syllables.iter().map(SyllableShape::len).sum()
    }

    /// Segment offset at which syllable `index` starts
    pub fn onset_of(&self, index: usize) -> usize {
        self.syllables.iter().take(index).map(SyllableShape::len).sum()
    }

    /// Segment ranges `(start, end)` of each syllable
    pub fn spans(&self) -> Vec<(usize, usize)> {
        let mut start = 0;
        self.syllables
            .iter()
            .map(|syl| {
                let span = (start, start + syl.len());
                start = span.1;
                span
            })
            .collect()
    }
}

impl fmt::Display for SyllableTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, syl) in self.syllables.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{syl}")?;
        }
        f.write_str("]")
    }
}

/// Result of aligning one example
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alignment {
    pub template: SyllableTemplate,
    /// Segment index after the juncture, in raw segment positions.
    ///
    /// Equal to the onset of the following syllable unless an earlier syllable
    /// has a glide at or past `unshifted_boundary`; that glide is not counted.
    pub boundary: usize,
    /// Boundary before glide positions were added
    pub unshifted_boundary: usize,
    /// Glides strictly before the unshifted boundary
    pub glides_before: usize,
}

/// Derive the syllable template and boundary index of one example.
///
/// `token` only labels errors.
pub fn align<S: AsRef<str>>(
    token: &str,
    segments: &[S],
    code: &StimulusCode,
) -> AnalysisResult<Alignment> {
    let n_segments = segments.len();

    let mut shapes: Vec<SyllableShape> = code.syllables.iter().map(|c| c.shape()).collect();
    if code.has_extra_onset() {
        shapes[0] = SyllableShape::parse("CVC");
    }

    let following = code.class.boundary().following_syllable();
    let unshifted_boundary: usize = shapes.iter().take(following).map(SyllableShape::len).sum();

    let coarse_len: usize = shapes.iter().map(SyllableShape::len).sum();
    if coarse_len != n_segments {
        let mut cursor = 0;
        for shape in &mut shapes {
            let start = cursor.min(n_segments);
            let end = (cursor + shape.len()).min(n_segments);
            if segments[start..end].iter().any(|s| is_glide(s.as_ref())) {
                *shape = shape.with_glide();
            }
            cursor += shape.len();
        }
    }

    let template = SyllableTemplate::new(shapes);
    if template.segment_count() != n_segments {
        let input_word: Vec<&str> = segments.iter().map(AsRef::as_ref).collect();
        return Err(AnalysisError::Alignment {
            token: token.to_string(),
            input_word: input_word.join(" "),
            template: template.to_string(),
            expected: template.segment_count(),
            found: n_segments,
        });
    }

    // Fixed window: the glides counted are those before the unshifted boundary
    let glides_before = segments[..unshifted_boundary.min(n_segments)]
        .iter()
        .filter(|s| is_glide(s.as_ref()))
        .count();

    Ok(Alignment {
        template,
        boundary: unshifted_boundary + glides_before,
        unshifted_boundary,
        glides_before,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segs(word: &str) -> Vec<&str> {
        word.split_whitespace().collect()
    }

    fn code(s: &str) -> StimulusCode {
        StimulusCode::parse(s).unwrap()
    }

    #[test]
    fn test_shape_with_glide() {
        assert_eq!(SyllableShape::parse("CVC").with_glide().to_string(), "CVVC");
        assert_eq!(SyllableShape::parse("CV").with_glide().to_string(), "CVV");
        assert_eq!(SyllableShape::parse("VC").with_glide().to_string(), "VVC");
        assert_eq!(SyllableShape::parse("V").with_glide().to_string(), "VV");
    }

    #[test]
    fn test_template_spans() {
        let template = SyllableTemplate::new(vec![
            SyllableShape::parse("VC"),
            SyllableShape::parse("CVC"),
            SyllableShape::parse("CV"),
        ]);
        assert_eq!(template.segment_count(), 7);
        assert_eq!(template.spans(), vec![(0, 2), (2, 5), (5, 7)]);
        assert_eq!(template.onset_of(2), 5);
        assert_eq!(template.to_string(), "[VC, CVC, CV]");
    }

    #[test]
    fn test_align_second_third_juncture() {
        // a k . t a p . k a
        let alignment = align("t0", &segs("a k t a p k a"), &code("A-3-1-2")).unwrap();
        assert_eq!(alignment.template.to_string(), "[VC, CVC, CV]");
        assert_eq!(alignment.boundary, 5);
        assert_eq!(alignment.glides_before, 0);
    }

    #[test]
    fn test_align_first_second_juncture() {
        let alignment = align("t0", &segs("p a k t a p a"), &code("D-1-1-4")).unwrap();
        assert_eq!(alignment.template.to_string(), "[CVC, CVC, V]");
        assert_eq!(alignment.boundary, 3);
    }

    #[test]
    fn test_align_extra_onset() {
        // Coarse code says CV, the fifth element forces CVC
        let alignment = align("t0", &segs("p a k t a p a"), &code("B-2-1-4-o")).unwrap();
        assert_eq!(alignment.template.to_string(), "[CVC, CVC, V]");
        assert_eq!(alignment.boundary, 3);

        // Medial classes keep the coarse shape
        let err = align("t0", &segs("p a k t a p a"), &code("D-2-1-4-o")).unwrap_err();
        assert!(matches!(err, AnalysisError::Alignment { .. }));
    }

    #[test]
    fn test_align_glide_before_boundary() {
        let alignment = align("t0", &segs("p w a t a k a"), &code("A-2-2-2")).unwrap();
        assert_eq!(alignment.template.to_string(), "[CVV, CV, CV]");
        assert_eq!(alignment.unshifted_boundary, 4);
        assert_eq!(alignment.glides_before, 1);
        assert_eq!(alignment.boundary, 5);
        assert_eq!(alignment.template.segment_count(), 7);
    }

    #[test]
    fn test_align_two_glides_shift_counts_fixed_window() {
        // The second glide sits at the unshifted boundary itself, so only the
        // first one shifts it: the boundary lands on the vowel of syllable 1,
        // one short of the onset of syllable 2.
        let segments = segs("p w a t w a k a");
        let alignment = align("t0", &segments, &code("A-2-2-2")).unwrap();
        assert_eq!(alignment.template.to_string(), "[CVV, CVV, CV]");
        assert_eq!(alignment.unshifted_boundary, 4);
        assert_eq!(alignment.glides_before, 1);
        assert_eq!(alignment.boundary, 5);
        assert_eq!(alignment.template.onset_of(2), 6);
        assert_eq!(segments[alignment.boundary], "a");
    }

    #[test]
    fn test_align_glide_after_boundary() {
        let alignment = align("t0", &segs("p a t a k y a"), &code("A-2-2-2")).unwrap();
        assert_eq!(alignment.template.to_string(), "[CV, CV, CVV]");
        assert_eq!(alignment.boundary, 4);
        assert_eq!(alignment.glides_before, 0);
    }

    #[test]
    fn test_align_vowel_initial_glide() {
        let alignment = align("t0", &segs("w a k t a p a"), &code("B-3-1-4")).unwrap();
        assert_eq!(alignment.template.to_string(), "[VVC, CVC, V]");
        assert_eq!(alignment.boundary, 3);
    }

    #[test]
    fn test_align_mismatch_without_glide_fails() {
        let err = align("ex7", &segs("t v k m a ng"), &code("A-3-1-1")).unwrap_err();
        match err {
            AnalysisError::Alignment {
                token,
                input_word,
                expected,
                found,
                ..
            } => {
                assert_eq!(token, "ex7");
                assert_eq!(input_word, "t v k m a ng");
                assert_eq!(expected, 8);
                assert_eq!(found, 6);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
