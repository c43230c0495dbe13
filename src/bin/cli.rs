//! ContextLog CLI
//!
//! Command-line interface for ContextLog operations:
//! - Inspect a recorded log
//! - Analyze problems against event traces
//! - Generate a default config file

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use contextlog::analysis::{
    EventTrace, OccurrenceFilter, Problem, ProblemDefinition, ProblemReport, Relation,
    SignalConstraint, SignalRef, Threshold,
};
use contextlog::codec::read_log;
use contextlog::config::{generate_default_config, Config};
use contextlog::series::TimeSeriesStore;
use contextlog::ClockOffset;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "contextlog")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Inspect context logs and correlate them with program events")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the signals and value ranges of a log
    Inspect {
        /// Log file (.clog or .text.clog)
        log: PathBuf,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Report signal values at function calls
    Analyze {
        /// Log files; each is paired with the event trace at the same position
        #[arg(required = true)]
        logs: Vec<PathBuf>,
        /// Event trace CSV files (`name,time` rows)
        #[arg(short, long, required = true)]
        events: Vec<PathBuf>,
        /// Start time of each event trace, on the log clock (default: the log's start)
        #[arg(long)]
        event_start: Vec<i64>,
        /// Fixed clock offset, overrides start-time derivation
        #[arg(long, allow_hyphen_values = true)]
        offset: Option<i64>,
        /// Function to match (exact name, or case-insensitive substring)
        #[arg(short, long)]
        function: Option<String>,
        /// Constrained signal
        #[arg(short, long, requires_all = ["relation", "threshold"])]
        signal: Option<String>,
        /// Relation: <, <=, =, <>, >=, >
        #[arg(short, long, allow_hyphen_values = true)]
        relation: Option<String>,
        /// Threshold value, parsed by the signal's type
        #[arg(short, long, allow_hyphen_values = true)]
        threshold: Option<String>,
        /// Which occurrences to summarize
        #[arg(long, value_enum, default_value = "all")]
        only: Only,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Write a default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Only {
    All,
    Inside,
    Outside,
}

impl From<Only> for OccurrenceFilter {
    fn from(only: Only) -> Self {
        match only {
            Only::All => OccurrenceFilter::All,
            Only::Inside => OccurrenceFilter::Inside,
            Only::Outside => OccurrenceFilter::Outside,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    config.logging.init_tracing();

    match cli.command {
        Commands::Inspect { log, json } => inspect(&log, json),
        Commands::Analyze {
            logs,
            events,
            event_start,
            offset,
            function,
            signal,
            relation,
            threshold,
            only,
            json,
        } => {
            let args = AnalyzeArgs {
                logs,
                events,
                event_start,
                offset: offset.or(config.analysis.default_clock_offset),
                function,
                signal,
                relation,
                threshold,
                only: only.into(),
                json,
            };
            analyze(args, &config)
        }
        Commands::Config { output } => {
            let content = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, content)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("Wrote {}", path.display());
                }
                None => print!("{}", content),
            }
            Ok(())
        }
    }
}

fn inspect(path: &Path, json: bool) -> anyhow::Result<()> {
    let log = read_log(path).with_context(|| format!("reading {}", path.display()))?;
    let format = log.format;
    let version = log.version;
    let total_samples = log.samples.len();
    let store = TimeSeriesStore::from_decoded(log);

    if json {
        let signals: Vec<serde_json::Value> = store
            .signals_desc()
            .into_iter()
            .filter_map(|signal| store.by_id(signal.id))
            .map(|series| {
                serde_json::json!({
                    "id": series.signal().id,
                    "name": series.signal().name,
                    "type": series.signal().value_type,
                    "samples": series.len(),
                    "summary": series.summary(),
                })
            })
            .collect();
        let body = serde_json::json!({
            "path": path.display().to_string(),
            "format": format,
            "version": version,
            "start_time": store.start_time(),
            "samples": total_samples,
            "signals": signals,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    println!("Log:        {}", path.display());
    println!("Format:     {:?}", format);
    match version {
        Some(v) => println!("Version:    {}", v),
        None => println!("Version:    (none)"),
    }
    println!("Start time: {}", store.start_time());
    println!("Samples:    {}", total_samples);
    println!();
    println!(
        "{:>4}  {:<24} {:<7} {:>8} {:>12} {:>12} {:>12} {:>12}",
        "ID", "NAME", "TYPE", "SAMPLES", "FIRST", "LAST", "MIN", "MAX"
    );
    for series in store
        .signals_desc()
        .into_iter()
        .filter_map(|signal| store.by_id(signal.id))
    {
        let signal = series.signal();
        let summary = series.summary();
        println!(
            "{:>4}  {:<24} {:<7} {:>8} {:>12} {:>12} {:>12} {:>12}",
            signal.id,
            signal.name,
            signal.value_type.to_string(),
            series.len(),
            summary.min_time,
            summary.max_time,
            summary.min_value,
            summary.max_value
        );
    }
    Ok(())
}

struct AnalyzeArgs {
    logs: Vec<PathBuf>,
    events: Vec<PathBuf>,
    event_start: Vec<i64>,
    offset: Option<i64>,
    function: Option<String>,
    signal: Option<String>,
    relation: Option<String>,
    threshold: Option<String>,
    only: OccurrenceFilter,
    json: bool,
}

fn analyze(args: AnalyzeArgs, config: &Config) -> anyhow::Result<()> {
    if args.events.len() != args.logs.len() {
        bail!(
            "{} log(s) but {} event trace(s); pass one trace per log",
            args.logs.len(),
            args.events.len()
        );
    }
    if !args.event_start.is_empty() && args.event_start.len() != args.logs.len() {
        bail!("--event-start must be given once per log or not at all");
    }

    let stores = args
        .logs
        .iter()
        .map(|path| {
            TimeSeriesStore::load(path).with_context(|| format!("reading {}", path.display()))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let traces = args
        .events
        .iter()
        .zip(&stores)
        .enumerate()
        .map(|(i, (path, store))| {
            let start = args
                .event_start
                .get(i)
                .copied()
                .unwrap_or_else(|| store.start_time());
            EventTrace::from_csv(path, start).with_context(|| format!("reading {}", path.display()))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut problems = Vec::with_capacity(stores.len());
    for (store, trace) in stores.iter().zip(&traces) {
        let definition = build_definition(&args, store)?;
        let mut problem = Problem::new(store, trace, definition)?;
        if let Some(offset) = args.offset {
            problem = problem.with_offset(ClockOffset(offset));
        }
        problems.push(problem);
    }

    let report = ProblemReport::from_problems(&mut problems, args.only, &config.analysis.stats())?;

    if args.json {
        println!("{}", report.to_json()?);
    } else {
        if let Some(problem) = problems.first() {
            println!("Problem: {}", problem.definition());
        }
        println!("Occurrences: {}", report.occurrences);
        print!("{}", report);
    }
    Ok(())
}

fn build_definition(args: &AnalyzeArgs, store: &TimeSeriesStore) -> anyhow::Result<ProblemDefinition> {
    let constraint = match (&args.signal, &args.relation, &args.threshold) {
        (Some(signal), Some(relation), Some(threshold)) => {
            let signal_ref = SignalRef::from(signal.as_str());
            let series = signal_ref.resolve(store)?;
            let relation: Relation = relation.parse()?;
            let threshold = Threshold::parse_for(threshold, series.signal().value_type)?;
            Some(SignalConstraint::new(signal_ref, relation, threshold)?)
        }
        (None, None, None) => None,
        _ => bail!("--signal, --relation and --threshold go together"),
    };
    Ok(ProblemDefinition::new(args.function.clone(), constraint)?)
}
