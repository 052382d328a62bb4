//! Settings file describing the two environments and engine defaults.
//!
//! ```yaml
//! left:  { dir: exports/dev,  delimiter: ",", encoding: utf-8 }
//! right: { dir: exports/prod, delimiter: tab }
//! mapping_file: mappings/worker.yaml
//! god_mode_default: false
//! row_limit: 5000
//! normalization:
//!   trim_strings: true
//!   numeric_round_precision: 2
//! suggest:
//!   fuzzy_threshold: 0.15
//! ```
//!
//! Every key is optional, except `dir` inside an environment that is given.
//! Command-line flags override what the file says.

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    cli::parse_delimiter,
    io_utils,
    normalize::NormalizationConfig,
    query::DEFAULT_TRACE_LIMIT,
    source::CsvSource,
    suggest::SuggestConfig,
};

/// One environment. `dir` is required whenever the environment is given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSettings {
    pub dir: PathBuf,
    #[serde(default)]
    pub delimiter: Option<String>,
    #[serde(default)]
    pub encoding: Option<String>,
}

impl SourceSettings {
    fn with_dir(dir: &str) -> Self {
        Self {
            dir: PathBuf::from(dir),
            delimiter: None,
            encoding: None,
        }
    }

    pub fn csv_source(&self) -> Result<CsvSource> {
        let delimiter = self
            .delimiter
            .as_deref()
            .map(parse_delimiter)
            .transpose()
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("Invalid delimiter for source {:?}", self.dir))?;
        let encoding = io_utils::resolve_encoding(self.encoding.as_deref())?;
        Ok(CsvSource::new(&self.dir)
            .with_delimiter(delimiter)
            .with_encoding(encoding))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(default = "default_left")]
    pub left: SourceSettings,
    #[serde(default = "default_right")]
    pub right: SourceSettings,
    pub mapping_file: PathBuf,
    pub god_mode_default: bool,
    pub row_limit: Option<usize>,
    pub trace_limit: usize,
    pub normalization: NormalizationConfig,
    pub suggest: SuggestConfig,
}

fn default_left() -> SourceSettings {
    SourceSettings::with_dir("data/left")
}

fn default_right() -> SourceSettings {
    SourceSettings::with_dir("data/right")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            left: default_left(),
            right: default_right(),
            mapping_file: PathBuf::from("mappings/mapping.yaml"),
            god_mode_default: false,
            row_limit: None,
            trace_limit: DEFAULT_TRACE_LIMIT,
            normalization: NormalizationConfig::default(),
            suggest: SuggestConfig::default(),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening settings file {path:?}"))?;
        let settings: Settings = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing settings file {path:?}"))?;
        settings
            .normalization
            .validate()
            .with_context(|| format!("Invalid normalization settings in {path:?}"))?;
        debug!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Settings from `path` when given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}
