//! Triangulation engine: one analysis run from store query to ranked groups.
//!
//! The engine validates its configuration up front, queries the segment
//! store, runs the selected clustering strategy under a cancel token, and
//! turns the surviving components into ranked groups plus a run summary.

use std::fmt;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::audit::AuditLog;
use crate::cluster::{CancelToken, ClusterParams, ClusteringStrategy};
use crate::error::{ChromosomeFailure, ConfigError, DataQualityIssue, EngineError};
use crate::group::{GroupAggregator, TriangulationGroup};
use crate::palette::{annotate, AnnotatedSegment};
use crate::parallel::{ParallelStrategy, DEFAULT_SHARD_SIZE};
use crate::params::{Algorithm, FilterParams};
use crate::reference::ReferenceStrategy;
use crate::report::rank_groups;
use crate::segment::Segment;
use crate::store::{MemorySegmentStore, SegmentQuery, SegmentStore};

/// Everything that shapes one analysis run
#[derive(Debug, Clone, PartialEq)]
pub struct TriangulationConfig {
    pub filter: FilterParams,
    pub algorithm: Algorithm,
    /// Worker threads for the parallel strategy, 0 = rayon default
    pub threads: usize,
    /// Intervals per parallel task on large chromosomes
    pub shard_size: usize,
    pub max_segments_per_chromosome: Option<usize>,
    pub time_budget: Option<Duration>,
    /// Record every comparison; implies the reference strategy
    pub audit: bool,
}

impl Default for TriangulationConfig {
    fn default() -> Self {
        TriangulationConfig {
            filter: FilterParams::default(),
            algorithm: Algorithm::default(),
            threads: 0,
            shard_size: DEFAULT_SHARD_SIZE,
            max_segments_per_chromosome: None,
            time_budget: None,
            audit: false,
        }
    }
}

impl TriangulationConfig {
    pub fn new(filter: FilterParams) -> Self {
        TriangulationConfig {
            filter,
            ..Self::default()
        }
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_shard_size(mut self, shard_size: usize) -> Self {
        self.shard_size = shard_size;
        self
    }

    pub fn with_segment_limit(mut self, limit: Option<usize>) -> Self {
        self.max_segments_per_chromosome = limit;
        self
    }

    pub fn with_time_budget(mut self, budget: Option<Duration>) -> Self {
        self.time_budget = budget;
        self
    }

    pub fn with_audit(mut self, audit: bool) -> Self {
        self.audit = audit;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.filter.validate()?;
        if self.shard_size == 0 {
            return Err(ConfigError::ZeroShardSize);
        }
        if self.max_segments_per_chromosome == Some(0) {
            return Err(ConfigError::ZeroSegmentLimit);
        }
        Ok(())
    }

    /// Strategy actually used: auditing always runs the reference strategy
    pub fn effective_algorithm(&self) -> Algorithm {
        if self.audit {
            Algorithm::Reference
        } else {
            self.algorithm
        }
    }
}

/// Why a run produced no groups
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmptyReason {
    NoSegments,
    NothingAfterFilter { total: usize },
    /// Every segment that passed the filters had an empty or inverted interval
    NoWellFormedSegments { malformed: usize },
    /// No chromosome could be clustered; the failures are listed separately
    AllChromosomesFailed { failed: usize },
    AllBelowThreshold {
        min_group_size: usize,
        largest_component: usize,
    },
}

impl fmt::Display for EmptyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmptyReason::NoSegments => f.write_str("the segment store is empty"),
            EmptyReason::NothingAfterFilter { total } => {
                write!(f, "none of the {total} stored segments passed the filters")
            }
            EmptyReason::NoWellFormedSegments { malformed } => {
                write!(f, "all {malformed} filtered segments have malformed intervals")
            }
            EmptyReason::AllChromosomesFailed { failed } => {
                write!(f, "analysis failed on all {failed} chromosomes with usable segments")
            }
            EmptyReason::AllBelowThreshold {
                min_group_size,
                largest_component,
            } => write!(
                f,
                "no group reached {min_group_size} members (largest had {largest_component})"
            ),
        }
    }
}

/// Diagnostics for one run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub algorithm: Algorithm,
    pub store_segments: usize,
    pub filtered_segments: usize,
    pub issues: Vec<DataQualityIssue>,
    pub groups: usize,
    pub discarded_components: usize,
    pub failures: Vec<ChromosomeFailure>,
    pub empty_reason: Option<EmptyReason>,
    pub elapsed: Duration,
}

impl RunSummary {
    /// Whether any chromosome could not be analysed
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

// Elapsed time is left out so identical runs render identically
impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Algorithm: {}", self.algorithm)?;
        writeln!(
            f,
            "Segments: {} stored, {} after filtering",
            self.store_segments, self.filtered_segments
        )?;
        writeln!(
            f,
            "Groups: {} reported, {} below the size threshold",
            self.groups, self.discarded_components
        )?;
        if !self.issues.is_empty() {
            writeln!(f, "Data-quality issues: {} segments skipped", self.issues.len())?;
            for issue in &self.issues {
                writeln!(f, "  - {issue}")?;
            }
        }
        for failure in &self.failures {
            writeln!(f, "FAILED {failure}")?;
        }
        if let Some(reason) = &self.empty_reason {
            writeln!(f, "No groups: {reason}")?;
        }
        Ok(())
    }
}

/// Output of one successful run
#[derive(Debug, Clone)]
pub struct TriangulationRun {
    /// Ranked, group_id 1 first
    pub groups: Vec<TriangulationGroup>,
    pub summary: RunSummary,
    pub audit: Option<AuditLog>,
    /// The filtered segments the run clustered
    pub segments: Vec<Segment>,
}

impl TriangulationRun {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Filtered segments with family color keys and group ranks
    pub fn annotated(&self) -> Vec<AnnotatedSegment> {
        annotate(&self.segments, &self.groups)
    }

    pub fn audit_trace(&self) -> Option<String> {
        self.audit.as_ref().map(|log| log.render(&self.segments))
    }
}

pub struct TriangulationEngine {
    config: TriangulationConfig,
    cancel: CancelToken,
}

impl TriangulationEngine {
    /// Rejects invalid configuration before any work starts
    pub fn new(config: TriangulationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(TriangulationEngine {
            config,
            cancel: CancelToken::new(),
        })
    }

    pub fn config(&self) -> &TriangulationConfig {
        &self.config
    }

    /// Handle for cancelling in-flight runs from another thread
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn strategy(&self) -> Box<dyn ClusteringStrategy> {
        match self.config.effective_algorithm() {
            Algorithm::Reference => Box::new(ReferenceStrategy::new().with_audit(self.config.audit)),
            Algorithm::Parallel => Box::new(
                ParallelStrategy::new(self.config.threads).with_shard_size(self.config.shard_size),
            ),
        }
    }

    /// Query the store with the configured filters and cluster the result
    pub fn run(&self, store: &dyn SegmentStore) -> Result<TriangulationRun, EngineError> {
        let started = Instant::now();
        let query = SegmentQuery::from(&self.config.filter);
        let segments = store
            .query(&query)
            .map_err(|e| EngineError::Store(format!("{e:#}")))?;
        debug!(
            "Store returned {} of {} segments",
            segments.len(),
            store.len()
        );
        self.cluster_segments(segments, store.len(), started)
    }

    /// Run over an in-memory segment list (deduplicated and filtered first)
    pub fn run_segments(&self, segments: Vec<Segment>) -> Result<TriangulationRun, EngineError> {
        self.run(&MemorySegmentStore::from_segments(segments))
    }

    fn cluster_segments(
        &self,
        segments: Vec<Segment>,
        store_segments: usize,
        started: Instant,
    ) -> Result<TriangulationRun, EngineError> {
        let cancel = match self.config.time_budget {
            Some(budget) => self.cancel.with_deadline(budget),
            None => self.cancel.clone(),
        };
        let params = ClusterParams::from_filter(&self.config.filter)
            .with_segment_limit(self.config.max_segments_per_chromosome)
            .with_cancel(cancel);

        let strategy = self.strategy();
        info!(
            "Clustering {} segments with the {} strategy (min overlap {} bp, min group size {})",
            segments.len(),
            strategy.name(),
            params.min_overlap_bp,
            params.min_group_size
        );
        let clustering = strategy.cluster(&segments, &params)?;

        let aggregator = GroupAggregator::new(self.config.filter.large_span_mb);
        let mut groups = aggregator.aggregate(&segments, &clustering);
        rank_groups(&mut groups);

        let empty_reason = if !groups.is_empty() {
            None
        } else if store_segments == 0 {
            Some(EmptyReason::NoSegments)
        } else if segments.is_empty() {
            Some(EmptyReason::NothingAfterFilter {
                total: store_segments,
            })
        } else if clustering.discarded_components == 0 && !clustering.failures.is_empty() {
            Some(EmptyReason::AllChromosomesFailed {
                failed: clustering.failures.len(),
            })
        } else if clustering.discarded_components == 0 {
            Some(EmptyReason::NoWellFormedSegments {
                malformed: clustering.issues.len(),
            })
        } else {
            Some(EmptyReason::AllBelowThreshold {
                min_group_size: params.min_group_size,
                largest_component: clustering.largest_discarded,
            })
        };

        let spurious = groups.iter().filter(|g| g.possibly_spurious).count();
        if spurious > 0 {
            warn!("{spurious} groups span more than {} Mb and may be spurious", self.config.filter.large_span_mb);
        }

        let summary = RunSummary {
            algorithm: self.config.effective_algorithm(),
            store_segments,
            filtered_segments: segments.len(),
            issues: clustering.issues,
            groups: groups.len(),
            discarded_components: clustering.discarded_components,
            failures: clustering.failures,
            empty_reason,
            elapsed: started.elapsed(),
        };
        info!(
            "Found {} triangulation groups in {:.2}s",
            summary.groups,
            summary.elapsed.as_secs_f64()
        );

        Ok(TriangulationRun {
            groups,
            summary,
            audit: clustering.audit,
            segments,
        })
    }
}
