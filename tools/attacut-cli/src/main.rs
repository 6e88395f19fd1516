//! Attacut command line tool
//!
//! Segments a text file line by line and writes one line of `|`-separated
//! words per input line.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use attacut::config::{DEFAULT_BATCH_SIZE, DEFAULT_SEPARATOR, DEFAULT_THRESHOLD};
use attacut::{
    BoundaryClassifier, FeatureExtractor, ModelArtifacts, RunSummary, Segmenter, SegmenterConfig,
};
use clap::Parser;
use tempfile::NamedTempFile;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// CLI arguments
#[derive(Parser, Debug)]
#[command(name = "attacut-cli")]
#[command(about = "Segment a text file into words, one output line per input line")]
#[command(version)]
struct Cli {
    /// Input file, one record per line (`-` reads stdin and writes stdout)
    src: PathBuf,

    /// Output file [default: <src stem>-tokenized-by-<model name>.txt]
    #[arg(short, long)]
    dest: Option<PathBuf>,

    /// Model directory containing config.json and model.safetensors
    #[arg(short, long, env = "ATTACUT_MODEL", default_value = "models/attacut-c")]
    model: PathBuf,

    /// Lines per batch
    #[arg(short, long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Batches processed concurrently
    #[arg(short = 'w', long, default_value_t = 1)]
    num_workers: usize,

    /// Boundary probability threshold (strictly greater is a boundary)
    #[arg(short, long, default_value_t = DEFAULT_THRESHOLD)]
    threshold: f32,

    /// Word separator in output lines
    #[arg(short, long, default_value = DEFAULT_SEPARATOR)]
    separator: String,
}

impl Cli {
    fn segmenter_config(&self) -> SegmenterConfig {
        SegmenterConfig::new()
            .with_batch_size(self.batch_size)
            .with_threshold(self.threshold)
            .with_separator(self.separator.clone())
            .with_num_workers(self.num_workers)
    }

    fn reads_stdin(&self) -> bool {
        self.src.as_os_str() == "-"
    }
}

/// `<dir>/<src stem>-tokenized-by-<model name>.txt`
fn default_dest(src: &Path, model: &Path) -> PathBuf {
    let stem = src
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let model_name = model
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "model".to_string());
    src.with_file_name(format!("{}-tokenized-by-{}.txt", stem, model_name))
}

/// Segment `src` into `dest` through a temporary file in the destination
/// directory; `dest` only appears once the whole input has been processed.
fn segment_file<E, C>(segmenter: &Segmenter<E, C>, src: &Path, dest: &Path) -> Result<RunSummary>
where
    E: FeatureExtractor,
    C: BoundaryClassifier,
{
    let input = File::open(src).with_context(|| format!("failed to open {}", src.display()))?;

    let dir = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create a temporary file in {}", dir.display()))?;

    let summary = {
        let mut writer = BufWriter::new(tmp.as_file());
        let summary = segmenter.run(BufReader::new(input), &mut writer)?;
        writer.flush()?;
        summary
    };

    tmp.persist(dest)
        .with_context(|| format!("failed to write {}", dest.display()))?;
    Ok(summary)
}

fn run(cli: Cli) -> Result<()> {
    let config = cli.segmenter_config();
    config.validate()?;

    let artifacts = ModelArtifacts::load(&cli.model)
        .with_context(|| format!("failed to load model from {}", cli.model.display()))?;
    let segmenter = Segmenter::new(config, artifacts.extractor, artifacts.model)?;

    if cli.reads_stdin() {
        let stdin = io::stdin();
        let stdout = io::stdout();
        let summary = segmenter.run(stdin.lock(), BufWriter::new(stdout.lock()))?;
        info!(lines = summary.lines, batches = summary.batches, "done");
        return Ok(());
    }

    let dest = cli
        .dest
        .clone()
        .unwrap_or_else(|| default_dest(&cli.src, &cli.model));
    info!(src = %cli.src.display(), dest = %dest.display(), "segmenting");

    let summary = segment_file(&segmenter, &cli.src, &dest)?;
    info!(
        lines = summary.lines,
        batches = summary.batches,
        dest = %dest.display(),
        "done"
    );
    Ok(())
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attacut::{CharFeatureExtractor, SortedBatch};

    /// Boundary after every space.
    struct SpaceEnds;

    impl BoundaryClassifier for SpaceEnds {
        fn predict(&self, batch: &SortedBatch<'_>) -> attacut::Result<Vec<f32>> {
            let mut out = Vec::new();
            for row in 0..batch.len() {
                let entry = batch.entry(row);
                let chars: Vec<char> = entry.tokens.iter().flat_map(|t| t.chars()).collect();
                for pos in 0..batch.max_length() {
                    let p = match chars.get(pos) {
                        Some(' ') => 0.9,
                        _ => 0.1,
                    };
                    out.push(p);
                }
            }
            Ok(out)
        }
    }

    fn segmenter() -> Segmenter<CharFeatureExtractor, SpaceEnds> {
        let config = SegmenterConfig::new().with_batch_size(2);
        Segmenter::new(config, CharFeatureExtractor::new(), SpaceEnds).unwrap()
    }

    #[test]
    fn test_default_dest() {
        let dest = default_dest(Path::new("data/news.txt"), Path::new("models/attacut-sc"));
        assert_eq!(dest, PathBuf::from("data/news-tokenized-by-attacut-sc.txt"));

        let dest = default_dest(Path::new("input"), Path::new("m"));
        assert_eq!(dest, PathBuf::from("input-tokenized-by-m.txt"));
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["attacut-cli", "in.txt"]).unwrap();
        assert_eq!(cli.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(cli.num_workers, 1);
        assert_eq!(cli.threshold, 0.5);
        assert_eq!(cli.separator, "|");
        assert!(cli.dest.is_none());
        assert!(!cli.reads_stdin());
        assert!(cli.segmenter_config().validate().is_ok());
    }

    #[test]
    fn test_cli_rejects_zero_batch_size_before_loading() {
        let cli = Cli::try_parse_from(["attacut-cli", "in.txt", "--batch-size", "0"]).unwrap();
        let err = run(cli).unwrap_err();
        assert!(err.to_string().contains("batch size"));
    }

    #[test]
    fn test_segment_file_writes_destination() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in.txt");
        let dest = dir.path().join("out.txt");
        std::fs::write(&src, "สวัสดี ครับ\n\nhello world  \n").unwrap();

        let summary = segment_file(&segmenter(), &src, &dest).unwrap();

        assert_eq!(summary.lines, 3);
        assert_eq!(
            std::fs::read_to_string(&dest).unwrap(),
            "สวัสดี |ครับ\n\nhello |world\n"
        );
    }

    #[test]
    fn test_failed_run_leaves_no_destination() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in.txt");
        let dest = dir.path().join("out.txt");
        std::fs::write(&src, "fine\nbad\u{7}line\n").unwrap();

        let err = segment_file(&segmenter(), &src, &dest).unwrap_err();

        assert!(err.to_string().contains("line 1"));
        assert!(!dest.exists());
        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }
}
