use crate::error::ConfigError;
use crate::split::SplitMode;
use std::path::PathBuf;

/// Text encoding used to decode header names and grouping values.
///
/// Record bytes are never re-encoded; they are copied to the outputs as read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Utf8,
    Latin1,
}

impl Encoding {
    pub fn from_label(label: &str) -> Result<Self, ConfigError> {
        match label.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Encoding::Utf8),
            "latin-1" | "latin1" | "iso-8859-1" => Ok(Encoding::Latin1),
            _ => Err(ConfigError::UnsupportedEncoding {
                label: label.to_string(),
            }),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Encoding::Utf8 => "UTF-8",
            Encoding::Latin1 => "ISO-8859-1",
        }
    }

    /// Returns `None` when `bytes` is not valid text in this encoding.
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            Encoding::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_owned),
            Encoding::Latin1 => Some(bytes.iter().map(|&b| b as char).collect()),
        }
    }
}

/// What to do with a data row whose field count differs from the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedPolicy {
    #[default]
    Abort,
    Skip,
}

/// Parse a delimiter argument into a single byte. `\t` is accepted for tab.
pub fn parse_delimiter(value: &str) -> Result<u8, ConfigError> {
    let bytes = match value {
        "\\t" => b"\t".as_slice(),
        other => other.as_bytes(),
    };
    match bytes {
        [b] => Ok(*b),
        _ => Err(ConfigError::InvalidDelimiter {
            value: value.to_string(),
        }),
    }
}

/// Fully resolved run configuration.
#[derive(Debug, Clone)]
pub struct ChopConfig {
    pub inputs: Vec<PathBuf>,
    pub output_dir: PathBuf,
    /// Extension filter applied when an input is a directory.
    pub extension: Option<String>,
    pub encoding: Encoding,
    pub delimiter: u8,
    pub prefix: Option<String>,
    pub shuffles: usize,
    pub columns: Vec<String>,
    pub split: SplitMode,
    pub seed: Option<u64>,
    pub malformed: MalformedPolicy,
}

impl ChopConfig {
    pub fn new(
        inputs: Vec<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let output_dir = output_dir.into();
        if inputs.is_empty() {
            return Err(ConfigError::NoInputs);
        }
        if output_dir.as_os_str().is_empty() {
            return Err(ConfigError::NoOutputDir);
        }

        Ok(Self {
            inputs,
            output_dir,
            extension: None,
            encoding: Encoding::default(),
            delimiter: b',',
            prefix: None,
            shuffles: 0,
            columns: Vec::new(),
            split: SplitMode::Whole,
            seed: None,
            malformed: MalformedPolicy::default(),
        })
    }

    pub fn extension(mut self, extension: Option<String>) -> Self {
        // Accept ".csv" as well as "csv"; "*" means no filter.
        self.extension = extension
            .map(|ext| ext.trim_start_matches('.').to_string())
            .filter(|ext| !ext.is_empty() && ext != "*");
        self
    }

    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn prefix(mut self, prefix: Option<String>) -> Self {
        self.prefix = prefix.filter(|p| !p.is_empty());
        self
    }

    pub fn shuffles(mut self, shuffles: usize) -> Self {
        self.shuffles = shuffles;
        self
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns
            .into_iter()
            .map(|c| {
                let c: String = c.into();
                c.trim().to_string()
            })
            .filter(|c| !c.is_empty())
            .collect();
        self
    }

    pub fn split(mut self, split: SplitMode) -> Self {
        self.split = split;
        self
    }

    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn malformed(mut self, malformed: MalformedPolicy) -> Self {
        self.malformed = malformed;
        self
    }

    /// True when the run must hold the entire input in memory: shuffling
    /// without grouping columns.
    pub fn buffers_whole_input(&self) -> bool {
        self.shuffles > 0 && self.columns.is_empty()
    }
}
