pub mod builder;
pub mod sorter;

pub use builder::{build, Batch, BatchBuilder, BatchEntry, LineChunk, LineChunks};
pub use sorter::{sort_desc, LengthOrder, SortedBatch};
