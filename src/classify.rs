//! Stimulus classification
//!
//! Parses the hyphen-delimited stimulus code (`A-3-1-1`, optionally with a
//! fifth extra-onset element) and derives everything the aggregation needs
//! from it: which syllable juncture carries the tensification environment,
//! whether the process sits in the first syllable, and which bucket the
//! example joins.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::corpus::Example;
use crate::error::{AnalysisError, AnalysisResult, CodeError};
use crate::stimuli::ReferenceTable;
use crate::syllable::SyllableShape;

/// Which analysis is being run over the corpus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    /// Experimental items; examples are split by whether tensification surfaced
    Stimuli,
    /// Filler items; no outcome dimension
    Filler,
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stimuli => write!(f, "stimuli"),
            Self::Filler => write!(f, "filler"),
        }
    }
}

/// The four stimulus classes of the experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StimulusClass {
    /// Juncture 2-3, manipulation in the first syllable
    A,
    /// Juncture 1-2, manipulation in the first syllable
    B,
    /// Juncture 2-3, word-medial
    C,
    /// Juncture 1-2, word-medial
    D,
}

impl StimulusClass {
    pub fn boundary(&self) -> Boundary {
        match self {
            Self::A | Self::C => Boundary::SecondThird,
            Self::B | Self::D => Boundary::FirstSecond,
        }
    }

    pub fn position(&self) -> WordPosition {
        match self {
            Self::A | Self::B => WordPosition::Initial,
            Self::C | Self::D => WordPosition::Medial,
        }
    }

    /// Classes whose extra code element marks an additional first-syllable onset
    pub fn allows_extra_onset(&self) -> bool {
        self.position() == WordPosition::Initial
    }
}

impl FromStr for StimulusClass {
    type Err = CodeError;

    fn from_str(s: &str) -> Result<Self, CodeError> {
        match s.trim() {
            "A" => Ok(Self::A),
            "B" => Ok(Self::B),
            "C" => Ok(Self::C),
            "D" => Ok(Self::D),
            other => Err(CodeError {
                code: s.to_string(),
                reason: format!("unknown stimulus class '{other}'"),
            }),
        }
    }
}

/// Syllable juncture where the tensification environment sits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Boundary {
    FirstSecond,
    SecondThird,
}

impl Boundary {
    /// Index of the syllable whose onset follows the juncture
    pub fn following_syllable(&self) -> usize {
        match self {
            Self::FirstSecond => 1,
            Self::SecondThird => 2,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::FirstSecond => "12",
            Self::SecondThird => "23",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WordPosition {
    Initial,
    Medial,
}

impl WordPosition {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Medial => "medial",
        }
    }
}

/// Numeric per-syllable code: 1 = CVC, 2 = CV, 3 = VC, 4 = V
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyllableCode {
    Cvc,
    Cv,
    Vc,
    V,
}

impl SyllableCode {
    pub fn shape(&self) -> SyllableShape {
        match self {
            Self::Cvc => SyllableShape::parse("CVC"),
            Self::Cv => SyllableShape::parse("CV"),
            Self::Vc => SyllableShape::parse("VC"),
            Self::V => SyllableShape::parse("V"),
        }
    }
}

impl TryFrom<&str> for SyllableCode {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.trim() {
            "1" => Ok(Self::Cvc),
            "2" => Ok(Self::Cv),
            "3" => Ok(Self::Vc),
            "4" => Ok(Self::V),
            other => Err(format!("unknown syllable code '{other}'")),
        }
    }
}

/// Parsed `<class>-<syl0>-<syl1>-<syl2>[-<extra>]` code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StimulusCode {
    pub raw: String,
    pub class: StimulusClass,
    pub syllables: [SyllableCode; 3],
    pub extra: Option<String>,
}

impl StimulusCode {
    pub fn parse(code: &str) -> Result<Self, CodeError> {
        let malformed = |reason: String| CodeError {
            code: code.to_string(),
            reason,
        };

        let parts: Vec<&str> = code.trim().split('-').collect();
        if parts.len() != 4 && parts.len() != 5 {
            return Err(malformed(format!(
                "expected 4 or 5 hyphen-separated fields, found {}",
                parts.len()
            )));
        }

        let class: StimulusClass = parts[0].parse().map_err(|_| {
            malformed(format!("unknown stimulus class '{}'", parts[0].trim()))
        })?;

        let mut syllables = [SyllableCode::Cvc; 3];
        for (slot, part) in syllables.iter_mut().zip(&parts[1..4]) {
            *slot = SyllableCode::try_from(*part).map_err(malformed)?;
        }

        Ok(Self {
            raw: code.trim().to_string(),
            class,
            syllables,
            extra: parts.get(4).map(|s| s.trim().to_string()),
        })
    }

    /// True when the first syllable carries an additional onset consonant
    pub fn has_extra_onset(&self) -> bool {
        self.extra.is_some() && self.class.allows_extra_onset()
    }
}

impl FromStr for StimulusCode {
    type Err = CodeError;

    fn from_str(s: &str) -> Result<Self, CodeError> {
        Self::parse(s)
    }
}

/// Aggregate bucket an example is merged into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BucketKey {
    /// Whether tensification surfaced; `None` in filler mode
    pub tensified: Option<bool>,
    pub boundary: Boundary,
    pub position: WordPosition,
}

impl BucketKey {
    /// Bucket name, e.g. `lt_23_initial`, `nonlt_12_medial` or `12_medial`
    pub fn name(&self) -> String {
        let prefix = match self.tensified {
            Some(true) => "lt_",
            Some(false) => "nonlt_",
            None => "",
        };
        format!(
            "{prefix}{}_{}",
            self.boundary.label(),
            self.position.label()
        )
    }

    /// Every bucket of a mode, in a fixed order
    pub fn all(mode: AnalysisMode) -> Vec<Self> {
        let outcomes: &[Option<bool>] = match mode {
            AnalysisMode::Stimuli => &[Some(true), Some(false)],
            AnalysisMode::Filler => &[None],
        };
        let mut keys = Vec::with_capacity(outcomes.len() * 4);
        for &tensified in outcomes {
            for boundary in [Boundary::FirstSecond, Boundary::SecondThird] {
                for position in [WordPosition::Initial, WordPosition::Medial] {
                    keys.push(Self {
                        tensified,
                        boundary,
                        position,
                    });
                }
            }
        }
        keys
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Outcome of classifying one example
#[derive(Debug, Clone)]
pub struct Classification {
    pub code: StimulusCode,
    pub tensified: Option<bool>,
}

impl Classification {
    pub fn bucket(&self) -> BucketKey {
        BucketKey {
            tensified: self.tensified,
            boundary: self.code.class.boundary(),
            position: self.code.class.position(),
        }
    }
}

/// Whether the output surface form differs from the input form.
///
/// Forms are compared segment by segment so that spacing differences in the
/// decoder output do not count as an alternation.
pub fn is_tensified(input_word: &str, output_word: &str) -> bool {
    !input_word
        .split_whitespace()
        .eq(output_word.split_whitespace())
}

/// Look up an example's stimulus row and classify it
pub fn classify(
    token: &str,
    example: &Example,
    table: &ReferenceTable,
    mode: AnalysisMode,
) -> AnalysisResult<Classification> {
    let row = table
        .lookup(&example.input_word)
        .ok_or_else(|| AnalysisError::Lookup {
            token: token.to_string(),
            input_word: example.input_word.clone(),
        })?;

    let code = StimulusCode::parse(row.code())
        .map_err(|err| err.for_example(token, &example.input_word))?;
    let tensified = match mode {
        AnalysisMode::Stimuli => Some(is_tensified(&example.input_word, &example.output_word)),
        AnalysisMode::Filler => None,
    };

    Ok(Classification { code, tensified })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_code() {
        let code = StimulusCode::parse("A-3-1-1").unwrap();
        assert_eq!(code.class, StimulusClass::A);
        assert_eq!(
            code.syllables,
            [SyllableCode::Vc, SyllableCode::Cvc, SyllableCode::Cvc]
        );
        assert!(code.extra.is_none());
        assert!(!code.has_extra_onset());

        let code = StimulusCode::parse("B-2-2-4-x").unwrap();
        assert_eq!(code.extra.as_deref(), Some("x"));
        assert!(code.has_extra_onset());

        // Medial classes ignore the fifth element
        let code = StimulusCode::parse("D-2-2-4-x").unwrap();
        assert!(!code.has_extra_onset());
    }

    #[test]
    fn test_parse_malformed_codes() {
        for bad in ["", "A-1-1", "E-1-1-1", "A-1-5-1", "A-1-1-1-x-y", "A-a-1-1"] {
            let err = StimulusCode::parse(bad).unwrap_err();
            assert_eq!(err.code, bad);
            assert!(!err.reason.is_empty(), "{bad} should be malformed");
        }
    }

    #[test]
    fn test_classify_errors_name_the_example() {
        let table = ReferenceTable::parse("transcription\tcode\npataka\tZ-9-9-9\n").unwrap();
        let example = Example {
            input_word: "p a t a k a".into(),
            output_word: "p a t a k a".into(),
            layers: Vec::new(),
        };

        let err = classify("token_42", &example, &table, AnalysisMode::Stimuli).unwrap_err();
        assert_eq!(err.kind(), "malformed_code");
        match &err {
            AnalysisError::MalformedCode {
                token, input_word, ..
            } => {
                assert_eq!(token, "token_42");
                assert_eq!(input_word, "p a t a k a");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(err.to_string().contains("token_42"));

        let missing = Example {
            input_word: "k a k a".into(),
            ..example
        };
        let err = classify("token_43", &missing, &table, AnalysisMode::Filler).unwrap_err();
        assert_eq!(err.kind(), "lookup");
        assert!(err.to_string().contains("token_43"));
    }

    #[test]
    fn test_class_geometry() {
        assert_eq!(StimulusClass::A.boundary(), Boundary::SecondThird);
        assert_eq!(StimulusClass::B.boundary(), Boundary::FirstSecond);
        assert_eq!(StimulusClass::C.boundary(), Boundary::SecondThird);
        assert_eq!(StimulusClass::D.boundary(), Boundary::FirstSecond);
        assert_eq!(StimulusClass::A.position(), WordPosition::Initial);
        assert_eq!(StimulusClass::D.position(), WordPosition::Medial);
    }

    #[test]
    fn test_bucket_names() {
        let key = BucketKey {
            tensified: Some(true),
            boundary: Boundary::SecondThird,
            position: WordPosition::Initial,
        };
        assert_eq!(key.name(), "lt_23_initial");

        let key = BucketKey {
            tensified: Some(false),
            boundary: Boundary::FirstSecond,
            position: WordPosition::Medial,
        };
        assert_eq!(key.name(), "nonlt_12_medial");

        let key = BucketKey {
            tensified: None,
            ..key
        };
        assert_eq!(key.to_string(), "12_medial");
    }

    #[test]
    fn test_all_buckets_unique() {
        let stimuli: Vec<String> = BucketKey::all(AnalysisMode::Stimuli)
            .iter()
            .map(BucketKey::name)
            .collect();
        assert_eq!(stimuli.len(), 8);
        let mut dedup = stimuli.clone();
        dedup.sort();
        dedup.dedup();
        assert_eq!(dedup.len(), 8);

        let filler = BucketKey::all(AnalysisMode::Filler);
        assert_eq!(filler.len(), 4);
        assert!(filler.iter().all(|k| k.tensified.is_none()));
    }

    #[test]
    fn test_is_tensified() {
        assert!(is_tensified("t v k m a ng", "t v ngZ m a ngZ"));
        assert!(!is_tensified("p a k", "p a k"));
        assert!(!is_tensified("p a k", "p  a k "));
    }
}
