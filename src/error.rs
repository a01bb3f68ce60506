//! Error and diagnostic types for triangulation runs.
//!
//! Only configuration errors and cancellation abort a run. Data-quality
//! problems and per-chromosome failures are collected as diagnostics and
//! returned next to the partial result.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::segment::Chromosome;

/// Invalid parameter, rejected before any clustering starts
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("min_overlap_mb must be a finite value >= 0, got {0}")]
    InvalidOverlap(f64),

    #[error("min_group_size must be at least 2, got {0}")]
    GroupSizeTooSmall(usize),

    #[error("min_cm must be a finite value >= 0, got {0}")]
    InvalidMinCm(f64),

    #[error("max_cm must be a finite value >= 0 (0 = unbounded), got {0}")]
    InvalidMaxCm(f64),

    #[error("max_cm ({max_cm}) is below min_cm ({min_cm})")]
    EmptyCmRange { min_cm: f64, max_cm: f64 },

    #[error("large_span_mb must be a finite value > 0, got {0}")]
    InvalidLargeSpan(f64),

    #[error("shard_size must be at least 1")]
    ZeroShardSize,

    #[error("max_segments_per_chromosome must be at least 1")]
    ZeroSegmentLimit,
}

/// Run-level failure of a clustering strategy; no partial result is kept
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClusterError {
    #[error("run cancelled by caller")]
    Cancelled,

    #[error("time budget of {budget:?} exceeded; rerun with tighter filters")]
    DeadlineExceeded { budget: Duration },

    #[error("failed to start worker pool: {0}")]
    WorkerPool(String),
}

/// Error returned by the engine for a whole run
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error("segment store query failed: {0}")]
    Store(String),
}

impl EngineError {
    /// Whether rerunning (possibly with a smaller scope) can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Cluster(ClusterError::Cancelled)
                | EngineError::Cluster(ClusterError::DeadlineExceeded { .. })
                | EngineError::Store(_)
        )
    }
}

/// What was wrong with a skipped row or segment
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IssueKind {
    #[error("malformed interval {start_bp}-{end_bp} (start must be below end)")]
    MalformedInterval { start_bp: u64, end_bp: u64 },

    #[error("non-numeric {field} value '{value}'")]
    NonNumeric { field: &'static str, value: String },

    #[error("unknown chromosome '{0}'")]
    UnknownChromosome(String),

    #[error("missing {0} field")]
    MissingField(&'static str),
}

/// A data-quality problem: the offending row or segment is skipped and the run continues
#[derive(Debug, Clone, PartialEq)]
pub struct DataQualityIssue {
    pub source: Option<String>,
    pub line: Option<usize>,
    pub match_name: String,
    pub kind: IssueKind,
}

impl DataQualityIssue {
    pub fn new(match_name: &str, kind: IssueKind) -> Self {
        DataQualityIssue {
            source: None,
            line: None,
            match_name: match_name.to_string(),
            kind,
        }
    }

    pub fn at(mut self, source: &str, line: usize) -> Self {
        self.source = Some(source.to_string());
        self.line = Some(line);
        self
    }
}

impl fmt::Display for DataQualityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.source, self.line) {
            (Some(source), Some(line)) => write!(f, "{source}:{line}: ")?,
            (Some(source), None) => write!(f, "{source}: ")?,
            (None, Some(line)) => write!(f, "line {line}: ")?,
            (None, None) => {}
        }
        if self.match_name.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{} ({})", self.kind, self.match_name)
        }
    }
}

/// Why one chromosome could not be analysed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FailureReason {
    #[error("{count} segments exceed the per-chromosome limit of {limit}")]
    TooManySegments { count: usize, limit: usize },

    #[error("worker failed: {0}")]
    WorkerPanicked(String),
}

/// A chromosome whose analysis failed while the rest of the run succeeded
#[derive(Debug, Clone, PartialEq)]
pub struct ChromosomeFailure {
    pub chromosome: Chromosome,
    pub reason: FailureReason,
}

impl fmt::Display for ChromosomeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chromosome {}: {}", self.chromosome, self.reason)
    }
}
