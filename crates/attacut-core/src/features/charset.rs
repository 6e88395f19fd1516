//! # Character Feature Extractor
//!
//! Encodes every character as `[char_id, class_id]`. Reference tokens are
//! extended grapheme clusters, so Thai vowel and tone marks stay attached to
//! the consonant they sit on.

use std::collections::HashMap;
use std::path::Path;

use unicode_segmentation::UnicodeSegmentation;

use crate::error::{AttacutError, Result};
use crate::features::{FeatureError, FeatureExtractor, FeatureSet};

/// Values per character: vocabulary id and character class.
pub const FEATURE_DIM: usize = 2;

/// Id reserved for padding positions.
pub const PAD_ID: u32 = 0;

/// Id for characters missing from the vocabulary.
pub const UNK_ID: u32 = 1;

/// Coarse character classes. `0` is left free for padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharClass {
    Consonant,
    Vowel,
    ToneMark,
    ThaiSign,
    Digit,
    Latin,
    Whitespace,
    Punctuation,
    Other,
}

impl CharClass {
    /// Number of class ids including the padding id.
    pub const NUM_CLASSES: usize = 10;

    /// Classify a single character.
    pub fn of(c: char) -> Self {
        match c {
            '\u{0E01}'..='\u{0E2E}' => CharClass::Consonant,
            '\u{0E30}'..='\u{0E3A}' | '\u{0E40}'..='\u{0E45}' => CharClass::Vowel,
            '\u{0E48}'..='\u{0E4B}' => CharClass::ToneMark,
            '\u{0E50}'..='\u{0E59}' => CharClass::Digit,
            '\u{0E2F}' | '\u{0E3F}' | '\u{0E46}' | '\u{0E47}' | '\u{0E4C}'..='\u{0E4F}'
            | '\u{0E5A}' | '\u{0E5B}' => CharClass::ThaiSign,
            c if c.is_ascii_digit() => CharClass::Digit,
            c if c.is_ascii_alphabetic() => CharClass::Latin,
            c if c.is_whitespace() => CharClass::Whitespace,
            c if c.is_ascii_punctuation() => CharClass::Punctuation,
            _ => CharClass::Other,
        }
    }

    /// Id used in the feature vector.
    pub fn id(&self) -> u32 {
        match self {
            CharClass::Consonant => 1,
            CharClass::Vowel => 2,
            CharClass::ToneMark => 3,
            CharClass::ThaiSign => 4,
            CharClass::Digit => 5,
            CharClass::Latin => 6,
            CharClass::Whitespace => 7,
            CharClass::Punctuation => 8,
            CharClass::Other => 9,
        }
    }
}

/// Character vocabulary for encoding lines.
#[derive(Debug, Clone)]
pub struct CharVocab {
    char_to_idx: HashMap<char, u32>,
    size: usize,
}

impl CharVocab {
    /// Built-in vocabulary: printable ASCII followed by the assigned Thai block.
    pub fn new() -> Self {
        let mut char_to_idx = HashMap::new();
        let mut next = UNK_ID + 1;

        let thai = ('\u{0E01}'..='\u{0E3A}').chain('\u{0E3F}'..='\u{0E5B}');
        for c in (' '..='~').chain(thai) {
            char_to_idx.insert(c, next);
            next += 1;
        }

        Self {
            char_to_idx,
            size: next as usize,
        }
    }

    /// Parse a JSON object mapping single characters to ids.
    ///
    /// Ids `0` and `1` are reserved for padding and unknown characters.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: HashMap<String, u32> = serde_json::from_str(json)
            .map_err(|e| AttacutError::ModelLoad(format!("Failed to parse vocabulary: {}", e)))?;

        let mut char_to_idx = HashMap::with_capacity(raw.len());
        let mut max_id = UNK_ID;
        for (key, id) in raw {
            let mut chars = key.chars();
            let c = match (chars.next(), chars.next()) {
                (Some(c), None) => c,
                _ => {
                    return Err(AttacutError::ModelLoad(format!(
                        "vocabulary key {:?} is not a single character",
                        key
                    )));
                }
            };
            if id <= UNK_ID {
                return Err(AttacutError::ModelLoad(format!(
                    "vocabulary id {} for {:?} collides with a reserved id",
                    id, c
                )));
            }
            max_id = max_id.max(id);
            char_to_idx.insert(c, id);
        }

        Ok(Self {
            char_to_idx,
            size: max_id as usize + 1,
        })
    }

    /// Load a vocabulary from a `characters.json` file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            AttacutError::ModelLoad(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    pub fn encode(&self, c: char) -> u32 {
        *self.char_to_idx.get(&c).unwrap_or(&UNK_ID)
    }

    /// Number of embedding rows a model needs for this vocabulary.
    pub fn vocab_size(&self) -> usize {
        self.size
    }
}

impl Default for CharVocab {
    fn default() -> Self {
        Self::new()
    }
}

/// Feature extractor producing `[char_id, class_id]` per character.
#[derive(Debug, Clone, Default)]
pub struct CharFeatureExtractor {
    vocab: CharVocab,
}

impl CharFeatureExtractor {
    /// Create an extractor with the built-in vocabulary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an extractor with a custom vocabulary.
    pub fn with_vocab(vocab: CharVocab) -> Self {
        Self { vocab }
    }

    pub fn vocab(&self) -> &CharVocab {
        &self.vocab
    }
}

impl FeatureExtractor for CharFeatureExtractor {
    fn feature_dim(&self) -> usize {
        FEATURE_DIM
    }

    fn extract(&self, line: &str) -> std::result::Result<FeatureSet, FeatureError> {
        let mut features = Vec::with_capacity(line.len() * FEATURE_DIM);

        for (column, c) in line.chars().enumerate() {
            if c.is_control() && c != '\t' {
                return Err(FeatureError::ControlCharacter {
                    code: c as u32,
                    column,
                });
            }
            features.push(self.vocab.encode(c) as f32);
            features.push(CharClass::of(c).id() as f32);
        }

        let tokens = line.graphemes(true).map(str::to_string).collect();

        Ok(FeatureSet::new(tokens, features, FEATURE_DIM))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocab() {
        let vocab = CharVocab::new();
        assert_eq!(vocab.encode(' '), 2);
        assert_eq!(vocab.encode('~'), 96);
        assert_eq!(vocab.encode('ก'), 97);
        assert_eq!(vocab.encode('€'), UNK_ID);
        assert_eq!(vocab.vocab_size(), 184);
    }

    #[test]
    fn test_vocab_from_json() {
        let vocab = CharVocab::from_json(r#"{"ก": 2, "ข": 7}"#).unwrap();
        assert_eq!(vocab.encode('ข'), 7);
        assert_eq!(vocab.encode('x'), UNK_ID);
        assert_eq!(vocab.vocab_size(), 8);
    }

    #[test]
    fn test_vocab_rejects_reserved_ids_and_long_keys() {
        assert!(CharVocab::from_json(r#"{"ก": 1}"#).is_err());
        assert!(CharVocab::from_json(r#"{"กข": 5}"#).is_err());
        assert!(CharVocab::from_json("not json").is_err());
    }

    #[test]
    fn test_char_classes() {
        assert_eq!(CharClass::of('ก'), CharClass::Consonant);
        assert_eq!(CharClass::of('า'), CharClass::Vowel);
        assert_eq!(CharClass::of('เ'), CharClass::Vowel);
        assert_eq!(CharClass::of('่'), CharClass::ToneMark);
        assert_eq!(CharClass::of('์'), CharClass::ThaiSign);
        assert_eq!(CharClass::of('๓'), CharClass::Digit);
        assert_eq!(CharClass::of('7'), CharClass::Digit);
        assert_eq!(CharClass::of('Q'), CharClass::Latin);
        assert_eq!(CharClass::of(' '), CharClass::Whitespace);
        assert_eq!(CharClass::of('!'), CharClass::Punctuation);
        assert_eq!(CharClass::of('é'), CharClass::Other);
    }

    #[test]
    fn test_extract_one_vector_per_char() {
        let extractor = CharFeatureExtractor::new();
        let fs = extractor.extract("ก่า b").unwrap();

        assert_eq!(fs.feature_dim, FEATURE_DIM);
        assert_eq!(fs.len(), 5);
        // ก่ is a single grapheme cluster
        assert_eq!(fs.tokens, vec!["ก่", "า", " ", "b"]);
        assert!(fs.check(FEATURE_DIM).is_ok());
        assert_eq!(&fs.features[0..2], &[97.0, 1.0]);
    }

    #[test]
    fn test_extract_empty_line() {
        let extractor = CharFeatureExtractor::new();
        let fs = extractor.extract("").unwrap();
        assert!(fs.is_empty());
        assert!(fs.tokens.is_empty());
    }

    #[test]
    fn test_extract_never_emits_padding_ids() {
        let extractor = CharFeatureExtractor::new();
        let fs = extractor.extract("สวัสดี hello €").unwrap();
        assert!(fs.features.iter().all(|&v| v != PAD_ID as f32));
    }

    #[test]
    fn test_extract_rejects_control_characters() {
        let extractor = CharFeatureExtractor::new();
        let err = extractor.extract("ab\u{0}c").unwrap_err();
        assert_eq!(
            err,
            FeatureError::ControlCharacter {
                code: 0,
                column: 2
            }
        );
        assert!(extractor.extract("a\tb").is_ok());
    }
}
