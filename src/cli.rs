use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Compare entity records across two drifted data environments",
    long_about = None
)]
pub struct Cli {
    /// YAML settings file describing both environments
    #[arg(short, long, global = true)]
    pub settings: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Compare mapped table pairs and report left-only, right-only and mismatched rows
    Compare(CompareArgs),
    /// List columns of a table pair and suggest field mappings
    Introspect(IntrospectArgs),
    /// Show the rows of one entity in every mapped table pair
    Trace(TraceArgs),
}

#[derive(Debug, Args)]
pub struct SourceArgs {
    /// Mapping file (YAML) with table and field correspondences
    #[arg(short, long)]
    pub mapping: Option<PathBuf>,
    /// Directory holding the left environment's table files
    #[arg(long = "left-dir")]
    pub left_dir: Option<PathBuf>,
    /// Directory holding the right environment's table files
    #[arg(long = "right-dir")]
    pub right_dir: Option<PathBuf>,
    /// CSV delimiter for both sides (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input files (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct PairSelection {
    /// Left table of the pair(s) to process; repeatable (all active pairs if omitted)
    #[arg(short = 't', long = "table", action = clap::ArgAction::Append)]
    pub tables: Vec<String>,
}

#[derive(Debug, Args)]
pub struct NormalizationArgs {
    /// Decimal places numeric values are rounded to before comparison
    #[arg(long = "round", conflicts_with = "no_round", allow_negative_numbers = true)]
    pub round: Option<i32>,
    /// Compare numeric values without rounding
    #[arg(long = "no-round")]
    pub no_round: bool,
    /// Keep leading and trailing whitespace when comparing strings
    #[arg(long = "no-trim")]
    pub no_trim: bool,
    /// Distinguish empty strings from absent values
    #[arg(long = "strict-empty")]
    pub strict_empty: bool,
    /// Parse date-like fields as datetimes when they carry no declared kind
    #[arg(long = "detect-temporal")]
    pub detect_temporal: bool,
}

#[derive(Debug, Args)]
pub struct CompareArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    #[command(flatten)]
    pub pairs: PairSelection,
    #[command(flatten)]
    pub normalization: NormalizationArgs,
    /// Restrict the comparison to these values of the first key field; repeatable
    #[arg(short = 'k', long = "key", action = clap::ArgAction::Append)]
    pub keys: Vec<String>,
    /// Maximum rows fetched per side and table pair
    #[arg(long)]
    pub limit: Option<usize>,
    /// Include query text in trace records
    #[arg(long = "god-mode")]
    pub god_mode: bool,
    /// JSON report destination (stdout if omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct IntrospectArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    #[command(flatten)]
    pub pairs: PairSelection,
    /// Largest relative edit distance accepted for fuzzy suggestions
    #[arg(long = "fuzzy-threshold")]
    pub fuzzy_threshold: Option<f64>,
    /// JSON report destination (stdout if omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct TraceArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    #[command(flatten)]
    pub pairs: PairSelection,
    /// Value of the first key field identifying the entity
    #[arg(short = 'k', long = "key")]
    pub key: String,
    /// Maximum rows fetched per side and table pair
    #[arg(long)]
    pub limit: Option<usize>,
    /// Include query text in trace records
    #[arg(long = "god-mode")]
    pub god_mode: bool,
    /// JSON report destination (stdout if omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn delimiter_names_and_characters_parse() {
        assert_eq!(parse_delimiter("tab"), Ok(b'\t'));
        assert_eq!(parse_delimiter("pipe"), Ok(b'|'));
        assert_eq!(parse_delimiter(":"), Ok(b':'));
        assert!(parse_delimiter("").is_err());
        assert!(parse_delimiter("ab").is_err());
        assert!(parse_delimiter("é").is_err());
    }

    #[test]
    fn compare_flags_parse() {
        let cli = Cli::try_parse_from([
            "drift-compare",
            "compare",
            "--mapping",
            "m.yaml",
            "-t",
            "dev.worker",
            "--key",
            "7",
            "--round",
            "2",
            "--god-mode",
        ])
        .unwrap();
        let Commands::Compare(args) = cli.command else {
            panic!("expected compare");
        };
        assert_eq!(args.pairs.tables, vec!["dev.worker"]);
        assert_eq!(args.keys, vec!["7"]);
        assert_eq!(args.normalization.round, Some(2));
        assert!(args.god_mode);
    }
}
