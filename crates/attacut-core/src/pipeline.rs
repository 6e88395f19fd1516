//! # Segmentation Pipeline
//!
//! Streams lines through batch assembly, length sorting, a single classifier
//! call per batch and decoding, and emits one joined line per input line in
//! input order.

use std::io::{self, BufRead, Write};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info};

use crate::batch::{Batch, LineChunk, LineChunks, SortedBatch};
use crate::config::SegmenterConfig;
use crate::decode::decode;
use crate::error::{AttacutError, Result};
use crate::features::FeatureExtractor;
use crate::model::BoundaryClassifier;

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Lines read and written
    pub lines: usize,
    /// Batches processed
    pub batches: usize,
}

/// Batched word segmenter.
///
/// Holds the extractor and classifier for its whole lifetime; both are shared
/// by reference with every batch.
pub struct Segmenter<E, C> {
    config: SegmenterConfig,
    extractor: E,
    classifier: C,
    pool: Option<ThreadPool>,
}

impl<E, C> Segmenter<E, C>
where
    E: FeatureExtractor,
    C: BoundaryClassifier,
{
    /// Create a segmenter, rejecting invalid configuration up front.
    pub fn new(config: SegmenterConfig, extractor: E, classifier: C) -> Result<Self> {
        config.validate()?;

        let pool = if config.num_workers > 1 {
            let pool = ThreadPoolBuilder::new()
                .num_threads(config.num_workers)
                .thread_name(|i| format!("attacut-worker-{}", i))
                .build()
                .map_err(|e| {
                    AttacutError::Configuration(format!("failed to start worker pool: {}", e))
                })?;
            Some(pool)
        } else {
            None
        };

        Ok(Self {
            config,
            extractor,
            classifier,
            pool,
        })
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    pub fn extractor(&self) -> &E {
        &self.extractor
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    /// Sort, classify and decode one assembled batch.
    ///
    /// Returns words per line in the batch's original order.
    pub fn segment_batch(&self, batch: &Batch) -> Result<Vec<Vec<String>>> {
        let sorted = SortedBatch::new(batch);

        let probabilities = self.classifier.predict(&sorted).map_err(|e| match e {
            e @ AttacutError::Inference { .. } => e,
            other => AttacutError::Inference {
                batch: batch.index(),
                reason: other.to_string(),
            },
        })?;

        let words = decode(&probabilities, &sorted, self.config.threshold)?;
        debug!(
            batch = batch.index(),
            lines = batch.len(),
            max_length = batch.max_length(),
            "segmented batch"
        );
        Ok(words)
    }

    fn process_chunk(&self, chunk: LineChunk) -> Result<Vec<Vec<String>>> {
        let batch = Batch::assemble(chunk, &self.extractor)?;
        self.segment_batch(&batch)
    }

    /// Segment every line of `reader` into `writer`.
    ///
    /// Each output line is the words of the matching input line joined by the
    /// configured separator. The writer is flushed on success; on error,
    /// whatever was written so far must be discarded by the caller.
    pub fn run<R, W>(&self, reader: R, mut writer: W) -> Result<RunSummary>
    where
        R: BufRead,
        W: Write,
    {
        let separator = self.config.separator.as_str();
        let summary = self.drive(reader.lines(), |words| {
            for line in words {
                writer.write_all(line.join(separator).as_bytes())?;
                writer.write_all(b"\n")?;
            }
            Ok(())
        })?;
        writer.flush()?;
        Ok(summary)
    }

    /// Segment in-memory lines, returning one joined string per line.
    pub fn run_lines<I, S>(&self, lines: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let separator = self.config.separator.as_str();
        let mut out = Vec::new();
        self.drive(lines.into_iter().map(|l| Ok(l.into())), |words| {
            out.extend(words.iter().map(|w| w.join(separator)));
            Ok(())
        })?;
        Ok(out)
    }

    /// Segment a single line of text into words.
    ///
    /// The text is treated as one line; embedded line breaks are rejected by
    /// the extractor like any other control character.
    pub fn tokenize(&self, text: &str) -> Result<Vec<String>> {
        let chunk = LineChunk {
            index: 0,
            first_line: 0,
            lines: vec![text.to_string()],
        };
        Ok(self.process_chunk(chunk)?.pop().unwrap_or_default())
    }

    /// Pull chunks from `lines`, segment them, and hand each batch's words to
    /// `emit` strictly in batch order.
    fn drive<I, F>(&self, lines: I, mut emit: F) -> Result<RunSummary>
    where
        I: Iterator<Item = io::Result<String>>,
        F: FnMut(&[Vec<String>]) -> Result<()>,
    {
        info!(
            batch_size = self.config.batch_size,
            workers = self.config.num_workers,
            "starting segmentation run"
        );

        let mut chunks = LineChunks::new(lines, self.config.batch_size);
        let mut summary = RunSummary::default();

        match &self.pool {
            None => {
                for chunk in chunks {
                    let words = self.process_chunk(chunk?)?;
                    emit(&words)?;
                    summary.lines += words.len();
                    summary.batches += 1;
                }
            }
            Some(pool) => {
                let window = self.config.num_workers;
                loop {
                    let mut pending = Vec::with_capacity(window);
                    let mut read_error = None;
                    for item in chunks.by_ref().take(window) {
                        match item {
                            Ok(chunk) => pending.push(chunk),
                            Err(e) => {
                                read_error = Some(e);
                                break;
                            }
                        }
                    }
                    if pending.is_empty() && read_error.is_none() {
                        break;
                    }

                    // Results come back indexed by submission order.
                    let results: Vec<Result<Vec<Vec<String>>>> = pool.install(|| {
                        pending
                            .into_par_iter()
                            .map(|chunk| self.process_chunk(chunk))
                            .collect()
                    });

                    for words in results {
                        let words = words?;
                        emit(&words)?;
                        summary.lines += words.len();
                        summary.batches += 1;
                    }

                    if let Some(e) = read_error {
                        return Err(e);
                    }
                }
            }
        }

        info!(
            lines = summary.lines,
            batches = summary.batches,
            "segmentation run complete"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{FeatureError, FeatureSet};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// One feature per character: its code point. Fails on `!`.
    struct CodePoints;

    impl FeatureExtractor for CodePoints {
        fn feature_dim(&self) -> usize {
            1
        }

        fn extract(&self, line: &str) -> std::result::Result<FeatureSet, FeatureError> {
            if line.contains('!') {
                return Err(FeatureError::Other("bang".into()));
            }
            Ok(FeatureSet::new(
                line.chars().map(String::from).collect(),
                line.chars().map(|c| c as u32 as f32).collect(),
                1,
            ))
        }
    }

    /// Boundary after every uppercase ASCII letter; padding scores 1.0.
    #[derive(Default)]
    struct UppercaseEnds {
        calls: AtomicUsize,
    }

    impl BoundaryClassifier for UppercaseEnds {
        fn predict(&self, batch: &SortedBatch<'_>) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut out = Vec::new();
            for row in 0..batch.len() {
                for &value in batch.row(row) {
                    let p = match char::from_u32(value as u32) {
                        _ if value == 0.0 => 1.0,
                        Some(c) if c.is_ascii_uppercase() => 0.9,
                        _ => 0.1,
                    };
                    out.push(p);
                }
            }
            Ok(out)
        }
    }

    /// Returns fixed probabilities regardless of input.
    struct Scripted(Vec<f32>);

    impl BoundaryClassifier for Scripted {
        fn predict(&self, _batch: &SortedBatch<'_>) -> Result<Vec<f32>> {
            Ok(self.0.clone())
        }
    }

    struct Failing;

    impl BoundaryClassifier for Failing {
        fn predict(&self, _batch: &SortedBatch<'_>) -> Result<Vec<f32>> {
            Err(AttacutError::Candle("device lost".into()))
        }
    }

    fn segmenter(batch_size: usize) -> Segmenter<CodePoints, UppercaseEnds> {
        let config = SegmenterConfig::new().with_batch_size(batch_size);
        Segmenter::new(config, CodePoints, UppercaseEnds::default()).unwrap()
    }

    #[test]
    fn test_worked_example() {
        let seg = Segmenter::new(
            SegmenterConfig::default(),
            CodePoints,
            Scripted(vec![0.1, 0.9, 0.1, 0.1, 0.9]),
        )
        .unwrap();

        assert_eq!(seg.tokenize("ABCDE").unwrap(), vec!["AB", "CDE"]);
        assert_eq!(seg.run_lines(["ABCDE"]).unwrap(), vec!["AB|CDE"]);
    }

    #[test]
    fn test_run_writes_one_line_per_input_line() {
        let seg = segmenter(2);
        let input = "abCdE\n\nxyZ   \nq\n";
        let mut output = Vec::new();

        let summary = seg.run(input.as_bytes(), &mut output).unwrap();

        assert_eq!(summary, RunSummary { lines: 4, batches: 2 });
        assert_eq!(String::from_utf8(output).unwrap(), "abC|dE\n\nxyZ\nq\n");
    }

    #[test]
    fn test_empty_input() {
        let seg = segmenter(3);
        let mut output = Vec::new();
        let summary = seg.run(&b""[..], &mut output).unwrap();

        assert_eq!(summary, RunSummary::default());
        assert!(output.is_empty());
        assert_eq!(seg.classifier().calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_one_classifier_call_per_batch() {
        let seg = segmenter(3);
        let lines = ["aB", "c", "dEf", "G", "hi", "J", "k"];
        seg.run_lines(lines).unwrap();
        assert_eq!(seg.classifier().calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_order_preserved_for_every_batch_size() {
        let lines = ["short", "aMuchLongerLine", "", "X", "mixedCASEwords", "zz"];
        let expected = segmenter(1).run_lines(lines).unwrap();
        assert_eq!(expected[1], "aM|uchL|ongerL|ine");

        for batch_size in 1..=lines.len() + 1 {
            assert_eq!(segmenter(batch_size).run_lines(lines).unwrap(), expected);
        }
    }

    #[test]
    fn test_workers_match_sequential_output() {
        let lines: Vec<String> = (0..37)
            .map(|i| "abC".repeat(i % 7) + &"x".repeat(i % 3))
            .collect();
        let sequential = segmenter(4).run_lines(lines.clone()).unwrap();

        let config = SegmenterConfig::new().with_batch_size(4).with_num_workers(3);
        let parallel = Segmenter::new(config, CodePoints, UppercaseEnds::default()).unwrap();
        assert_eq!(parallel.run_lines(lines).unwrap(), sequential);
    }

    #[test]
    fn test_idempotent_output() {
        let seg = segmenter(2);
        let input = "oneTwo\nthreeFourFive\n\nsix\n";
        let mut first = Vec::new();
        let mut second = Vec::new();
        seg.run(input.as_bytes(), &mut first).unwrap();
        seg.run(input.as_bytes(), &mut second).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_extraction_error_aborts_run() {
        for workers in [1, 2] {
            let config = SegmenterConfig::new().with_batch_size(2).with_num_workers(workers);
            let seg = Segmenter::new(config, CodePoints, UppercaseEnds::default()).unwrap();
            let err = seg.run_lines(["a", "b", "c", "d!", "e"]).unwrap_err();
            assert!(
                matches!(err, AttacutError::Extraction { line: 3, .. }),
                "workers={} err={}",
                workers,
                err
            );
        }
    }

    #[test]
    fn test_shape_mismatch_is_inference_error() {
        let seg = Segmenter::new(
            SegmenterConfig::new().with_batch_size(1),
            CodePoints,
            Scripted(vec![0.1, 0.9]),
        )
        .unwrap();

        // The first line has two characters and decodes fine; the second does not.
        let err = seg.run_lines(["ab", "abc"]).unwrap_err();
        assert!(matches!(err, AttacutError::Inference { batch: 1, .. }));
    }

    #[test]
    fn test_classifier_failure_names_batch() {
        let seg = Segmenter::new(SegmenterConfig::default(), CodePoints, Failing).unwrap();
        let err = seg.run_lines(["abc"]).unwrap_err();
        match err {
            AttacutError::Inference { batch, reason } => {
                assert_eq!(batch, 0);
                assert!(reason.contains("device lost"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_invalid_config_rejected_before_processing() {
        let result = Segmenter::new(
            SegmenterConfig::new().with_batch_size(0),
            CodePoints,
            UppercaseEnds::default(),
        );
        assert!(matches!(result, Err(AttacutError::Configuration(_))));
    }

    #[test]
    fn test_custom_separator() {
        let config = SegmenterConfig::new().with_separator(" ");
        let seg = Segmenter::new(config, CodePoints, UppercaseEnds::default()).unwrap();
        assert_eq!(seg.run_lines(["helloWorld"]).unwrap(), vec!["helloW orld"]);
    }
}
