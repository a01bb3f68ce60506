use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use log::{info, warn};

use trisweep::export::write_export;
use trisweep::palette::write_annotated;
use trisweep::report::{render_quick_list, render_report, ReportOptions};
use trisweep::segment_io::read_segment_file;
use trisweep::{
    Algorithm, Chromosome, FilterParams, MemorySegmentStore, TriangulationConfig, TriangulationEngine,
};

/// Parse a count that may have a metric suffix (k/K=1000, m/M=1e6)
fn parse_metric_number(s: &str) -> Result<usize, String> {
    let s = s.trim();
    let Some(last_char) = s.chars().last() else {
        return Err("Empty string".to_string());
    };

    let (num_part, suffix) = if last_char.is_ascii_alphabetic() {
        (&s[..s.len() - last_char.len_utf8()], Some(last_char))
    } else {
        (s, None)
    };

    let base: f64 = num_part
        .parse()
        .map_err(|e| format!("Invalid number: {e}"))?;

    let multiplier = match suffix {
        Some('k') | Some('K') => 1000.0,
        Some('m') | Some('M') => 1_000_000.0,
        Some(c) => return Err(format!("Unknown suffix '{c}'. Use k/K (1000) or m/M (1e6)")),
        None => 1.0,
    };

    let result = base * multiplier;
    if !result.is_finite() || result < 0.0 {
        return Err(format!("Value {s} must be a non-negative number"));
    }
    if result > usize::MAX as f64 {
        return Err(format!("Value {result} too large"));
    }
    Ok(result as usize)
}

/// Parse a wall-clock budget: plain seconds or a s/m/h suffix ("90", "30s", "5m")
fn parse_time_budget(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let (num_part, scale) = match s.chars().last() {
        Some('s') | Some('S') => (&s[..s.len() - 1], 1.0),
        Some('m') | Some('M') => (&s[..s.len() - 1], 60.0),
        Some('h') | Some('H') => (&s[..s.len() - 1], 3600.0),
        Some(_) => (s, 1.0),
        None => return Err("Empty string".to_string()),
    };
    let value: f64 = num_part
        .parse()
        .map_err(|e| format!("Invalid duration '{s}': {e}"))?;
    Duration::try_from_secs_f64(value * scale).map_err(|e| format!("Invalid duration '{s}': {e}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    /// Hierarchical report with every group's members by family
    Full,
    /// One line per group
    Quick,
}

/// trisweep - find DNA triangulation groups in shared-segment tables
///
/// Segments from all inputs are merged and deduplicated, filtered, and
/// clustered into groups of matches whose segments overlap on the same
/// chromosome. Groups are reported largest first.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Segment tables (CSV or TSV, optionally gzipped) with columns
    /// Match Name, Chromosome, Start Location, End Location, Centimorgans, Matching SNPs
    #[clap(value_name = "SEGMENTS", required = true, num_args = 1..)]
    inputs: Vec<PathBuf>,

    /// Drop segments shorter than this many cM
    #[clap(long = "min-cm", default_value = "7.0")]
    min_cm: f64,

    /// Drop segments longer than this many cM (0 = unbounded)
    #[clap(long = "max-cm", default_value = "0")]
    max_cm: f64,

    /// Minimum shared span in Mb for two segments to link
    #[clap(short = 'm', long = "min-overlap", default_value = "1.0")]
    min_overlap_mb: f64,

    /// Smallest group to report
    #[clap(short = 'g', long = "min-group-size", default_value = "2")]
    min_group_size: usize,

    /// Flag groups spanning more than this many Mb as possibly spurious
    #[clap(long = "large-span", default_value = "100")]
    large_span_mb: f64,

    /// Exclude the X chromosome
    #[clap(long = "no-x")]
    no_x: bool,

    /// Only analyse these chromosomes (comma separated, e.g. 1,7,X)
    #[clap(short = 'c', long = "chromosome", value_delimiter = ',')]
    chromosomes: Vec<Chromosome>,

    /// Only analyse these families ("Unassigned" for segments without one)
    #[clap(short = 'F', long = "family", value_delimiter = ',')]
    families: Vec<String>,

    /// Clustering algorithm: parallel or reference
    #[clap(short = 'a', long = "algorithm", default_value = "parallel")]
    algorithm: Algorithm,

    /// Worker threads for the parallel algorithm (0 = all cores)
    #[clap(short = 't', long = "threads", default_value = "0")]
    threads: usize,

    /// Segments per parallel task on large chromosomes
    #[clap(long = "shard-size", default_value = "50k", value_parser = parse_metric_number)]
    shard_size: usize,

    /// Fail chromosomes with more segments than this
    #[clap(long = "max-segments", value_parser = parse_metric_number)]
    max_segments: Option<usize>,

    /// Abort the run after this long (e.g. 90, 30s, 5m)
    #[clap(long = "time-budget", value_parser = parse_time_budget)]
    time_budget: Option<Duration>,

    /// Write the report here instead of stdout
    #[clap(short = 'r', long = "report")]
    report: Option<PathBuf>,

    /// Report style
    #[clap(long = "format", value_enum, default_value = "full")]
    format: ReportFormat,

    /// Write the tabular group export (tab-delimited for .tsv, else comma)
    #[clap(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Write the filtered segments with family colors and group ranks
    #[clap(long = "annotated")]
    annotated: Option<PathBuf>,

    /// Write a step-by-step comparison trace (uses the reference algorithm)
    #[clap(long = "audit")]
    audit: Option<PathBuf>,

    /// Print import history and store statistics to stderr
    #[clap(long = "stats")]
    stats: bool,

    /// More log output (-v info, -vv debug)
    #[clap(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[clap(long = "quiet", conflicts_with = "verbose")]
    quiet: bool,
}

impl Args {
    fn config(&self) -> TriangulationConfig {
        let mut filter = FilterParams::default()
            .with_cm_range(self.min_cm, self.max_cm)
            .with_min_overlap_mb(self.min_overlap_mb)
            .with_min_group_size(self.min_group_size)
            .with_include_x(!self.no_x)
            .with_large_span_mb(self.large_span_mb);
        if !self.chromosomes.is_empty() {
            filter = filter.with_chromosomes(self.chromosomes.iter().copied());
        }
        if !self.families.is_empty() {
            filter = filter.with_families(self.families.iter().map(|f| f.trim().to_string()));
        }

        TriangulationConfig::new(filter)
            .with_algorithm(self.algorithm)
            .with_threads(self.threads)
            .with_shard_size(self.shard_size)
            .with_segment_limit(self.max_segments)
            .with_time_budget(self.time_budget)
            .with_audit(self.audit.is_some())
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let log_level = match (quiet, verbose) {
        (true, _) => log::LevelFilter::Error,
        (false, 0) => log::LevelFilter::Warn,
        (false, 1) => log::LevelFilter::Info,
        (false, _) => log::LevelFilter::Debug,
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp(None)
        .format_target(false)
        .init();
}

/// Write through a temp file in the target directory, then rename into place
fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let mut temp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    {
        let mut out = BufWriter::new(temp.as_file_mut());
        write(&mut out)?;
        out.flush()?;
    }
    temp.persist(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn export_delimiter(path: &Path) -> char {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") || ext.eq_ignore_ascii_case("txt") => '\t',
        _ => ',',
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let mut store = MemorySegmentStore::new();
    let mut import_issues = Vec::new();
    for path in &args.inputs {
        let outcome = read_segment_file(path)?;
        store.import(&outcome);
        import_issues.extend(outcome.issues);
    }

    if args.stats {
        for record in store.history() {
            eprintln!("{record}");
        }
        eprintln!("{}", store.stats());
    }

    let engine = TriangulationEngine::new(args.config())?;
    let mut run = engine.run(&store)?;

    // Rows the importer rejected belong in the same diagnostics as the engine's
    import_issues.append(&mut run.summary.issues);
    run.summary.issues = import_issues;

    for failure in &run.summary.failures {
        warn!("Analysis failed for {failure}");
    }

    let report = match args.format {
        ReportFormat::Full => render_report(
            &run.groups,
            &ReportOptions {
                min_cm: args.min_cm,
                preamble: Some(run.summary.to_string()),
            },
        ),
        ReportFormat::Quick => render_quick_list(&run.groups),
    };
    match &args.report {
        Some(path) => {
            write_atomically(path, |out| Ok(out.write_all(report.as_bytes())?))?;
            info!("Wrote report to {}", path.display());
        }
        None => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            out.write_all(report.as_bytes())?;
            out.flush()?;
        }
    }

    if let Some(path) = &args.output {
        let delimiter = export_delimiter(path);
        let mut rows = 0;
        write_atomically(path, |out| {
            rows = write_export(out, &run.groups, delimiter)?;
            Ok(())
        })?;
        info!("Wrote {rows} export rows to {}", path.display());
    }

    if let Some(path) = &args.annotated {
        let annotated = run.annotated();
        write_atomically(path, |out| write_annotated(out, &annotated))?;
        info!("Wrote {} annotated segments to {}", annotated.len(), path.display());
    }

    if let Some(path) = &args.audit {
        let trace = run.audit_trace().unwrap_or_default();
        write_atomically(path, |out| Ok(out.write_all(trace.as_bytes())?))?;
        info!("Wrote audit trace to {}", path.display());
    }

    Ok(())
}
