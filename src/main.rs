use chopper::{parse_delimiter, ChopConfig, ConfigError, Encoding, MalformedPolicy, SplitMode};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "chopper")]
#[command(about = "Split large CSV files into smaller pieces, by column, row count or equal parts, with optional shuffling")]
struct Cli {
    /// Input files or directories. Everything is read as one combined file
    /// sharing the first file's header.
    #[arg(required = true, num_args = 1..)]
    inputs: Vec<PathBuf>,

    /// Output directory (created if missing; existing files may be overwritten)
    #[arg(short, long)]
    output_dir: PathBuf,

    /// File extension to look for inside input directories
    #[arg(short = 'x', long)]
    extension: Option<String>,

    /// Text encoding of the inputs (utf-8 or latin-1)
    #[arg(short, long, default_value = "utf-8")]
    encoding: String,

    /// Field delimiter (a single character, or \t for tab)
    #[arg(short, long, default_value = ",")]
    delimiter: String,

    /// String prepended to each output file name
    #[arg(short, long)]
    prefix: Option<String>,

    /// Number of shuffles. Each shuffle writes its own set of files. Without
    /// --columns the whole input is loaded into memory.
    #[arg(short, long, default_value_t = 0)]
    shuffles: usize,

    /// Comma separated column names to split by
    #[arg(short, long, value_delimiter = ',')]
    columns: Vec<String>,

    /// Maximum number of rows per file
    #[arg(short, long, conflicts_with = "equal")]
    rows: Option<usize>,

    /// Split into this many files of near-equal row counts (per column group)
    #[arg(short = 'q', long)]
    equal: Option<usize>,

    /// Random seed for deterministic shuffling
    #[arg(long)]
    seed: Option<u64>,

    /// Skip rows whose field count does not match the header instead of failing
    #[arg(long)]
    skip_malformed: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn into_config(self) -> Result<ChopConfig, ConfigError> {
        let split = SplitMode::from_limits(self.rows, self.equal)?;
        let encoding = Encoding::from_label(&self.encoding)?;
        let delimiter = parse_delimiter(&self.delimiter)?;
        let malformed = if self.skip_malformed {
            MalformedPolicy::Skip
        } else {
            MalformedPolicy::Abort
        };

        Ok(ChopConfig::new(self.inputs, self.output_dir)?
            .extension(self.extension)
            .encoding(encoding)
            .delimiter(delimiter)
            .prefix(self.prefix)
            .shuffles(self.shuffles)
            .columns(self.columns)
            .split(split)
            .seed(self.seed)
            .malformed(malformed))
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = match cli.into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    info!("Writing output to {}", config.output_dir.display());

    // The engine does blocking file I/O; keep it off the async workers.
    let result = tokio::task::spawn_blocking(move || chopper::chop(&config)).await;

    match result {
        Ok(Ok(report)) => {
            println!("Successfully created {} output files:", report.output_files.len());
            for file in report.output_files {
                println!("  {}", file.display());
            }
            if report.records_skipped > 0 {
                println!("Skipped {} malformed records", report.records_skipped);
            }
        }
        Ok(Err(e)) if e.is_config() => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
        Ok(Err(e)) => {
            eprintln!("Error during chopping: {}", e);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: chopping task failed: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("chopper").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_cli_defaults() {
        let config = parse(&["in.csv", "-o", "out"]).into_config().unwrap();

        assert_eq!(config.inputs, vec![PathBuf::from("in.csv")]);
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.delimiter, b',');
        assert_eq!(config.encoding, Encoding::Utf8);
        assert_eq!(config.split, SplitMode::Whole);
        assert_eq!(config.shuffles, 0);
        assert!(config.columns.is_empty());
        assert_eq!(config.malformed, MalformedPolicy::Abort);
    }

    #[test]
    fn test_cli_full_options() {
        let config = parse(&[
            "a.csv", "b.csv", "-o", "out", "-c", "region,year", "-r", "100", "-s", "2", "-d",
            "\\t", "-p", "run", "-e", "latin1", "--seed", "7", "--skip-malformed",
        ])
        .into_config()
        .unwrap();

        assert_eq!(config.inputs.len(), 2);
        assert_eq!(config.columns, vec!["region", "year"]);
        assert_eq!(
            config.split,
            SplitMode::Rows(std::num::NonZeroUsize::new(100).unwrap())
        );
        assert_eq!(config.shuffles, 2);
        assert_eq!(config.delimiter, b'\t');
        assert_eq!(config.prefix.as_deref(), Some("run"));
        assert_eq!(config.encoding, Encoding::Latin1);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.malformed, MalformedPolicy::Skip);
    }

    #[test]
    fn test_cli_rejects_rows_with_equal() {
        let result = Cli::try_parse_from(["chopper", "in.csv", "-o", "out", "-r", "3", "-q", "2"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_requires_input_and_output() {
        assert!(Cli::try_parse_from(["chopper", "-o", "out"]).is_err());
        assert!(Cli::try_parse_from(["chopper", "in.csv"]).is_err());
    }

    #[test]
    fn test_cli_rejects_zero_equal() {
        let err = parse(&["in.csv", "-o", "out", "-q", "0"])
            .into_config()
            .unwrap_err();
        assert!(matches!(err, ConfigError::ZeroEqual));
    }

    #[test]
    fn test_cli_rejects_bad_delimiter() {
        let err = parse(&["in.csv", "-o", "out", "-d", "::"])
            .into_config()
            .unwrap_err();
        assert!(err.to_string().contains("invalid delimiter"));
    }
}
