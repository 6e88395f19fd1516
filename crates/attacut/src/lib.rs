//! # Attacut
//!
//! Fast batched word segmentation for Thai text.
//!
//! This crate re-exports the segmentation engine from `attacut-core`.

pub use attacut_core::*;
