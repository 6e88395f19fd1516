//! # Length Sorter
//!
//! Orders a batch by descending sequence length without moving any feature
//! data: the order is a pair of index arrays resolved at lookup time.

use std::cmp::Reverse;

use crate::batch::builder::{Batch, BatchEntry};

/// Permutation between length-sorted positions and original batch positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthOrder {
    permutation: Vec<usize>,
    inverse: Vec<usize>,
}

impl LengthOrder {
    /// Stable descending sort; equal lengths keep their original relative order.
    pub fn sort_desc(lengths: &[usize]) -> Self {
        let mut permutation: Vec<usize> = (0..lengths.len()).collect();
        permutation.sort_by_key(|&i| Reverse(lengths[i]));

        let mut inverse = vec![0; permutation.len()];
        for (sorted, &original) in permutation.iter().enumerate() {
            inverse[original] = sorted;
        }

        Self {
            permutation,
            inverse,
        }
    }

    /// `permutation[sorted] = original`.
    pub fn permutation(&self) -> &[usize] {
        &self.permutation
    }

    /// `inverse[original] = sorted`.
    pub fn inverse(&self) -> &[usize] {
        &self.inverse
    }

    /// Original position of the row at `sorted`.
    pub fn original(&self, sorted: usize) -> usize {
        self.permutation[sorted]
    }

    /// Sorted position of the entry at `original`.
    pub fn sorted(&self, original: usize) -> usize {
        self.inverse[original]
    }

    pub fn len(&self) -> usize {
        self.permutation.len()
    }

    pub fn is_empty(&self) -> bool {
        self.permutation.is_empty()
    }
}

/// Sort a batch by descending length.
pub fn sort_desc(batch: &Batch) -> LengthOrder {
    LengthOrder::sort_desc(&batch.lengths())
}

/// A batch viewed in length-sorted order.
///
/// This is what the classifier sees: row `s` is the entry at
/// `order.original(s)`.
#[derive(Debug, Clone)]
pub struct SortedBatch<'a> {
    batch: &'a Batch,
    order: LengthOrder,
}

impl<'a> SortedBatch<'a> {
    pub fn new(batch: &'a Batch) -> Self {
        Self {
            order: sort_desc(batch),
            batch,
        }
    }

    pub fn batch(&self) -> &'a Batch {
        self.batch
    }

    pub fn order(&self) -> &LengthOrder {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    pub fn max_length(&self) -> usize {
        self.batch.max_length()
    }

    pub fn feature_dim(&self) -> usize {
        self.batch.feature_dim()
    }

    /// Entry behind sorted row `sorted`.
    pub fn entry(&self, sorted: usize) -> &'a BatchEntry {
        self.batch.entry(self.order.original(sorted))
    }

    /// Padded features of sorted row `sorted`.
    pub fn row(&self, sorted: usize) -> &'a [f32] {
        self.batch.row(self.order.original(sorted))
    }

    /// True lengths in sorted (non-increasing) order.
    pub fn lengths(&self) -> Vec<usize> {
        self.order
            .permutation()
            .iter()
            .map(|&original| self.batch.entry(original).length)
            .collect()
    }

    /// Copy the padded features out in sorted order, `[len, max_length, feature_dim]`.
    pub fn gather_features(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.batch.features().len());
        for sorted in 0..self.len() {
            out.extend_from_slice(self.row(sorted));
        }
        out
    }
}
