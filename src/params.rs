/// Filter and clustering parameters shared by the store query, both
/// clustering strategies and the group aggregator
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::segment::Chromosome;

pub const BP_PER_MB: f64 = 1_000_000.0;
pub const DEFAULT_MIN_CM: f64 = 7.0;
pub const DEFAULT_MIN_OVERLAP_MB: f64 = 1.0;
pub const DEFAULT_MIN_GROUP_SIZE: usize = 2;
pub const DEFAULT_LARGE_SPAN_MB: f64 = 100.0;

/// Convert megabases to a base-pair threshold
pub fn mb_to_bp(mb: f64) -> u64 {
    (mb * BP_PER_MB).round() as u64
}

/// Clustering strategy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Algorithm {
    /// Single-threaded exhaustive comparison with an audit trail
    Reference,
    /// Sweep-line index fanned out per chromosome over a worker pool
    #[default]
    Parallel,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::Reference => f.write_str("reference"),
            Algorithm::Parallel => f.write_str("parallel"),
        }
    }
}

impl FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reference" | "simple" | "debug" => Ok(Algorithm::Reference),
            "parallel" | "optimized" | "fast" => Ok(Algorithm::Parallel),
            other => Err(format!(
                "unknown algorithm '{other}', expected 'reference' or 'parallel'"
            )),
        }
    }
}

/// Segment filters and grouping thresholds for one analysis run
#[derive(Debug, Clone, PartialEq)]
pub struct FilterParams {
    pub min_cm: f64,
    /// 0 means unbounded
    pub max_cm: f64,
    pub min_overlap_mb: f64,
    pub min_group_size: usize,
    /// Keep X-chromosome segments
    pub include_x: bool,
    /// None keeps every chromosome
    pub chromosomes: Option<BTreeSet<Chromosome>>,
    /// None keeps every family; "Unassigned" selects segments without a family
    pub families: Option<BTreeSet<String>>,
    /// Groups spanning more than this are flagged as possibly spurious
    pub large_span_mb: f64,
}

impl Default for FilterParams {
    fn default() -> Self {
        FilterParams {
            min_cm: DEFAULT_MIN_CM,
            max_cm: 0.0,
            min_overlap_mb: DEFAULT_MIN_OVERLAP_MB,
            min_group_size: DEFAULT_MIN_GROUP_SIZE,
            include_x: true,
            chromosomes: None,
            families: None,
            large_span_mb: DEFAULT_LARGE_SPAN_MB,
        }
    }
}

impl FilterParams {
    /// Check every parameter; the first invalid one is reported
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.min_overlap_mb.is_finite() || self.min_overlap_mb < 0.0 {
            return Err(ConfigError::InvalidOverlap(self.min_overlap_mb));
        }
        if self.min_group_size < 2 {
            return Err(ConfigError::GroupSizeTooSmall(self.min_group_size));
        }
        if !self.min_cm.is_finite() || self.min_cm < 0.0 {
            return Err(ConfigError::InvalidMinCm(self.min_cm));
        }
        if !self.max_cm.is_finite() || self.max_cm < 0.0 {
            return Err(ConfigError::InvalidMaxCm(self.max_cm));
        }
        if self.max_cm > 0.0 && self.max_cm < self.min_cm {
            return Err(ConfigError::EmptyCmRange {
                min_cm: self.min_cm,
                max_cm: self.max_cm,
            });
        }
        if !self.large_span_mb.is_finite() || self.large_span_mb <= 0.0 {
            return Err(ConfigError::InvalidLargeSpan(self.large_span_mb));
        }
        Ok(())
    }

    pub fn min_overlap_bp(&self) -> u64 {
        mb_to_bp(self.min_overlap_mb)
    }

    pub fn large_span_bp(&self) -> u64 {
        mb_to_bp(self.large_span_mb)
    }

    /// Upper cM bound, None when unbounded
    pub fn max_cm_bound(&self) -> Option<f64> {
        (self.max_cm > 0.0).then_some(self.max_cm)
    }

    pub fn with_cm_range(mut self, min_cm: f64, max_cm: f64) -> Self {
        self.min_cm = min_cm;
        self.max_cm = max_cm;
        self
    }

    pub fn with_min_overlap_mb(mut self, min_overlap_mb: f64) -> Self {
        self.min_overlap_mb = min_overlap_mb;
        self
    }

    pub fn with_min_group_size(mut self, min_group_size: usize) -> Self {
        self.min_group_size = min_group_size;
        self
    }

    pub fn with_chromosomes<I: IntoIterator<Item = Chromosome>>(mut self, chromosomes: I) -> Self {
        self.chromosomes = Some(chromosomes.into_iter().collect());
        self
    }

    pub fn with_families<I, S>(mut self, families: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.families = Some(families.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_include_x(mut self, include_x: bool) -> Self {
        self.include_x = include_x;
        self
    }

    pub fn with_large_span_mb(mut self, large_span_mb: f64) -> Self {
        self.large_span_mb = large_span_mb;
        self
    }
}
