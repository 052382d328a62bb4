pub mod cli;
pub mod compare;
pub mod config;
pub mod data;
pub mod error;
pub mod index;
pub mod io_utils;
pub mod mapping;
pub mod normalize;
pub mod query;
pub mod report;
pub mod rows;
pub mod session;
pub mod source;
pub mod suggest;
pub mod trace;

use std::{env, path::PathBuf, sync::OnceLock};

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{Cli, Commands, NormalizationArgs, PairSelection, SourceArgs},
    config::{Settings, SourceSettings},
    data::Value,
    error::MappingError,
    mapping::{MappingSet, TablePair},
    normalize::NormalizationConfig,
    report::{CompareReport, TraceEntry},
    session::{CompareOptions, Session, TraceOutcome},
    source::CsvSource,
    suggest::SuggestConfig,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("drift_compare", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let settings = Settings::load_or_default(cli.settings.as_deref())?;
    match cli.command {
        Commands::Compare(args) => handle_compare(&settings, &args),
        Commands::Introspect(args) => handle_introspect(&settings, &args),
        Commands::Trace(args) => handle_trace(&settings, &args),
    }
}

/// Mapping set and both data sources of one invocation.
struct Environment {
    mappings: MappingSet,
    left: CsvSource,
    right: CsvSource,
}

impl Environment {
    fn open(settings: &Settings, args: &SourceArgs) -> Result<Self> {
        let mapping_path = args
            .mapping
            .clone()
            .unwrap_or_else(|| settings.mapping_file.clone());
        let mappings = MappingSet::load(&mapping_path)
            .with_context(|| format!("Loading mapping from {mapping_path:?}"))?;
        let left = open_source(&settings.left, args.left_dir.as_ref(), args)?;
        let right = open_source(&settings.right, args.right_dir.as_ref(), args)?;
        info!(
            "Comparing {:?} (left) against {:?} (right) using {} table pair(s) from {:?}",
            left.root(),
            right.root(),
            mappings.tables.len(),
            mapping_path
        );
        Ok(Self {
            mappings,
            left,
            right,
        })
    }

    fn session(&self, options: CompareOptions) -> Session<'_> {
        Session::new(&self.mappings, &self.left, &self.right, options)
    }
}

fn open_source(
    settings: &SourceSettings,
    dir: Option<&PathBuf>,
    args: &SourceArgs,
) -> Result<CsvSource> {
    let mut source_settings = settings.clone();
    if let Some(dir) = dir {
        source_settings.dir = dir.clone();
    }
    let mut source = source_settings.csv_source()?;
    if args.delimiter.is_some() {
        source = source.with_delimiter(args.delimiter);
    }
    if let Some(label) = args.input_encoding.as_deref() {
        source = source.with_encoding(io_utils::resolve_encoding(Some(label))?);
    }
    Ok(source)
}

/// Pairs named by `--table` (matched on the left table), or every active pair.
fn select_pairs<'m>(mappings: &'m MappingSet, selection: &PairSelection) -> Result<Vec<&'m TablePair>> {
    if selection.tables.is_empty() {
        let pairs: Vec<&TablePair> = mappings.active_pairs().collect();
        if pairs.is_empty() {
            bail!("The mapping declares no active table pairs");
        }
        return Ok(pairs);
    }
    selection
        .tables
        .iter()
        .map(|name| {
            mappings
                .pair_for_left(name)
                .ok_or_else(|| anyhow!(MappingError::UnknownTablePair(name.clone())))
        })
        .collect()
}

fn normalization_config(settings: &Settings, args: &NormalizationArgs) -> NormalizationConfig {
    let mut config = settings.normalization;
    if let Some(precision) = args.round {
        config.numeric_round_precision = Some(precision);
    }
    if args.no_round {
        config.numeric_round_precision = None;
    }
    if args.no_trim {
        config.trim_strings = false;
    }
    if args.strict_empty {
        config.null_empty_equal = false;
    }
    if args.detect_temporal {
        config.detect_temporal_fields = true;
    }
    config
}

fn handle_compare(settings: &Settings, args: &cli::CompareArgs) -> Result<()> {
    let environment = Environment::open(settings, &args.source)?;
    let pairs = select_pairs(&environment.mappings, &args.pairs)?;
    let options = CompareOptions {
        normalization: normalization_config(settings, &args.normalization),
        god_mode: args.god_mode || settings.god_mode_default,
        key_values: args.keys.iter().map(|k| Value::from(k.as_str())).collect(),
        limit: args.limit.or(settings.row_limit),
        trace_limit: settings.trace_limit,
    };
    debug!("Normalization: {:?}", options.normalization);
    let session = environment.session(options);
    let outcomes = session.compare_pairs(&pairs);

    report::write_json(args.output.as_deref(), &CompareReport::new(&outcomes))?;
    for line in report::summary_table(&outcomes).lines() {
        info!("{line}");
    }
    if let Some(path) = &args.output {
        info!("Comparison report written to {path:?}");
    }

    let failed = outcomes.iter().filter(|o| o.is_failed()).count();
    if failed > 0 {
        bail!("{failed} of {} table pair(s) failed", outcomes.len());
    }
    Ok(())
}

fn handle_introspect(settings: &Settings, args: &cli::IntrospectArgs) -> Result<()> {
    let environment = Environment::open(settings, &args.source)?;
    let pairs = select_pairs(&environment.mappings, &args.pairs)?;
    let suggest_config = SuggestConfig {
        fuzzy_threshold: args
            .fuzzy_threshold
            .unwrap_or(settings.suggest.fuzzy_threshold),
    };
    let session = environment.session(CompareOptions::default());
    let reports = pairs
        .iter()
        .map(|pair| session.introspect(pair, &suggest_config))
        .collect::<Result<Vec<_>>>()?;
    for introspection in &reports {
        info!(
            "{}: {} suggestion(s); unmapped columns: {} left, {} right",
            introspection.pair,
            introspection.suggestions.len(),
            introspection.unmapped.left.len(),
            introspection.unmapped.right.len()
        );
    }
    report::write_json(args.output.as_deref(), &reports)
}

fn handle_trace(settings: &Settings, args: &cli::TraceArgs) -> Result<()> {
    let environment = Environment::open(settings, &args.source)?;
    let pairs = select_pairs(&environment.mappings, &args.pairs)?;
    let options = CompareOptions {
        normalization: settings.normalization,
        god_mode: args.god_mode || settings.god_mode_default,
        trace_limit: args.limit.unwrap_or(settings.trace_limit),
        ..CompareOptions::default()
    };
    let session = environment.session(options);
    let key = Value::from(args.key.as_str());
    let outcomes = session.trace_entity(&pairs, &key);

    let entries: Vec<TraceEntry<'_>> = outcomes.iter().map(TraceEntry::from).collect();
    report::write_json(args.output.as_deref(), &entries)?;
    for outcome in &outcomes {
        if let TraceOutcome::Traced(frame) = outcome {
            info!(
                "{}: {} left row(s), {} right row(s) for key '{}'",
                frame.pair,
                frame.left_rows.len(),
                frame.right_rows.len(),
                key
            );
        }
    }

    let failed = outcomes
        .iter()
        .filter(|o| matches!(o, TraceOutcome::Failed(_)))
        .count();
    if failed > 0 {
        bail!("{failed} of {} table pair(s) failed", outcomes.len());
    }
    Ok(())
}
