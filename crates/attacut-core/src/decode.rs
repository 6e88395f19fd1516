//! # Boundary Decoding
//!
//! Turns flat classifier output into words. A boundary flag on character `i`
//! closes the current word after that character.

use crate::batch::SortedBatch;
use crate::error::{AttacutError, Result};

/// Thresholded predictions, `[rows, width]` in sorted row order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictionGrid {
    rows: usize,
    width: usize,
    flags: Vec<bool>,
}

impl PredictionGrid {
    /// Threshold `probabilities` into boundary flags.
    ///
    /// `boundary = p > threshold`; a probability equal to the threshold is not
    /// a boundary. Fails with [`AttacutError::Inference`] on a shape mismatch
    /// or a non-finite value.
    pub fn from_probabilities(
        batch: usize,
        probabilities: &[f32],
        rows: usize,
        width: usize,
        threshold: f32,
    ) -> Result<Self> {
        let expected = rows * width;
        if probabilities.len() != expected {
            return Err(AttacutError::Inference {
                batch,
                reason: format!(
                    "expected {} probabilities ({} x {}), got {}",
                    expected,
                    rows,
                    width,
                    probabilities.len()
                ),
            });
        }
        if let Some(position) = probabilities.iter().position(|p| !p.is_finite()) {
            return Err(AttacutError::Inference {
                batch,
                reason: format!("non-finite probability at flat position {}", position),
            });
        }

        Ok(Self {
            rows,
            width,
            flags: probabilities.iter().map(|&p| p > threshold).collect(),
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// All padded flags of sorted row `row`.
    pub fn row(&self, row: usize) -> &[bool] {
        &self.flags[row * self.width..(row + 1) * self.width]
    }
}

/// Group characters into words using per-character boundary flags.
///
/// Characters past the end of `flags` are ignored, as are flags past the last
/// character.
pub fn words_from_boundaries<I>(chars: I, flags: &[bool]) -> Vec<String>
where
    I: IntoIterator<Item = char>,
{
    let mut words = Vec::new();
    let mut current = String::new();

    for (c, &boundary) in chars.into_iter().zip(flags) {
        current.push(c);
        if boundary {
            words.push(std::mem::take(&mut current));
        }
    }

    if !current.is_empty() {
        words.push(current);
    }

    words
}

/// Decode a batch's probabilities into words per line.
///
/// The result is indexed by original intra-batch position, not sorted position.
pub fn decode(
    probabilities: &[f32],
    sorted: &SortedBatch<'_>,
    threshold: f32,
) -> Result<Vec<Vec<String>>> {
    let grid = PredictionGrid::from_probabilities(
        sorted.batch().index(),
        probabilities,
        sorted.len(),
        sorted.max_length(),
        threshold,
    )?;

    let mut words = vec![Vec::new(); sorted.len()];
    for row in 0..grid.rows() {
        let original = sorted.order().original(row);
        let entry = sorted.entry(row);
        let flags = &grid.row(row)[..entry.length];
        let chars = entry.tokens.iter().flat_map(|t| t.chars());
        words[original] = words_from_boundaries(chars, flags);
    }

    Ok(words)
}
