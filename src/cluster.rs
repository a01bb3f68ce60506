//! Clustering contract shared by the reference and parallel strategies.
//!
//! A strategy receives the filtered segment slice (the arena) and returns the
//! connected components of the overlap graph, keyed by index into that slice.
//! Both strategies finish through [`assemble`], so component ids and member
//! order are canonical and the two can be compared directly.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::warn;

use crate::audit::AuditLog;
use crate::error::{ChromosomeFailure, ClusterError, DataQualityIssue, FailureReason, IssueKind};
use crate::params::FilterParams;
use crate::segment::{Chromosome, Segment};
use crate::union_find::UnionFind;

/// Cooperative cancellation shared between a caller and a running strategy
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<(Instant, Duration)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same cancel flag, plus a wall-clock budget starting now
    pub fn with_deadline(&self, budget: Duration) -> Self {
        CancelToken {
            flag: Arc::clone(&self.flag),
            deadline: Some((Instant::now(), budget)),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), ClusterError> {
        if self.is_cancelled() {
            return Err(ClusterError::Cancelled);
        }
        if let Some((started, budget)) = self.deadline {
            if started.elapsed() > budget {
                return Err(ClusterError::DeadlineExceeded { budget });
            }
        }
        Ok(())
    }
}

/// What a strategy needs to know about the run
#[derive(Debug, Clone)]
pub struct ClusterParams {
    pub min_overlap_bp: u64,
    pub min_group_size: usize,
    pub max_segments_per_chromosome: Option<usize>,
    pub cancel: CancelToken,
}

impl ClusterParams {
    pub fn new(min_overlap_bp: u64, min_group_size: usize) -> Self {
        ClusterParams {
            min_overlap_bp,
            min_group_size,
            max_segments_per_chromosome: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn from_filter(params: &FilterParams) -> Self {
        Self::new(params.min_overlap_bp(), params.min_group_size)
    }

    pub fn with_segment_limit(mut self, limit: Option<usize>) -> Self {
        self.max_segments_per_chromosome = limit;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// One connected component that met `min_group_size`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub id: usize,
    pub chromosome: Chromosome,
    /// Indices into the input slice, ordered by (start, end, index)
    pub members: Vec<usize>,
}

/// Result of clustering one segment slice
#[derive(Debug, Clone, Default)]
pub struct Clustering {
    /// Component id per input segment; None for discarded, malformed or failed segments
    pub assignment: Vec<Option<usize>>,
    pub components: Vec<Component>,
    /// Components (singletons included) smaller than `min_group_size`
    pub discarded_components: usize,
    /// Size of the largest discarded component
    pub largest_discarded: usize,
    pub issues: Vec<DataQualityIssue>,
    pub failures: Vec<ChromosomeFailure>,
    pub audit: Option<AuditLog>,
}

impl Clustering {
    pub fn component_of(&self, segment_idx: usize) -> Option<&Component> {
        self.assignment
            .get(segment_idx)
            .copied()
            .flatten()
            .map(|id| &self.components[id])
    }

    /// Member sets independent of component numbering, for comparing strategies
    pub fn partition(&self) -> BTreeSet<Vec<usize>> {
        self.components
            .iter()
            .map(|c| {
                let mut members = c.members.clone();
                members.sort_unstable();
                members
            })
            .collect()
    }

    pub fn unassigned(&self) -> usize {
        self.assignment.iter().filter(|a| a.is_none()).count()
    }
}

/// A clustering algorithm over filtered segments
///
/// Implementations must agree on the partition for identical input.
pub trait ClusteringStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn cluster(
        &self,
        segments: &[Segment],
        params: &ClusterParams,
    ) -> Result<Clustering, ClusterError>;
}

/// Well-formed segment indices of one chromosome
#[derive(Debug, Clone)]
pub(crate) struct ChromosomeBatch {
    pub chromosome: Chromosome,
    pub members: Vec<usize>,
}

/// Split the arena by chromosome, skipping (and reporting) malformed intervals
pub(crate) fn partition_by_chromosome(
    segments: &[Segment],
    issues: &mut Vec<DataQualityIssue>,
) -> Vec<ChromosomeBatch> {
    let mut by_chromosome: BTreeMap<Chromosome, Vec<usize>> = BTreeMap::new();

    for (idx, segment) in segments.iter().enumerate() {
        if !segment.is_well_formed() {
            let issue = DataQualityIssue::new(
                &segment.display_name,
                IssueKind::MalformedInterval {
                    start_bp: segment.start_bp,
                    end_bp: segment.end_bp,
                },
            );
            warn!("Skipping segment on chromosome {}: {}", segment.chromosome, issue);
            issues.push(issue);
            continue;
        }
        by_chromosome.entry(segment.chromosome).or_default().push(idx);
    }

    by_chromosome
        .into_iter()
        .map(|(chromosome, members)| ChromosomeBatch {
            chromosome,
            members,
        })
        .collect()
}

/// Refuse chromosomes above the configured segment limit
pub(crate) fn check_capacity(
    batch: &ChromosomeBatch,
    params: &ClusterParams,
) -> Result<(), ChromosomeFailure> {
    match params.max_segments_per_chromosome {
        Some(limit) if batch.members.len() > limit => Err(ChromosomeFailure {
            chromosome: batch.chromosome,
            reason: FailureReason::TooManySegments {
                count: batch.members.len(),
                limit,
            },
        }),
        _ => Ok(()),
    }
}

/// Read the components of the clustered batches out of the union-find, drop
/// the ones below `min_group_size` and number the rest canonically
pub(crate) fn assemble(
    segments: &[Segment],
    uf: &mut UnionFind,
    clustered: &[ChromosomeBatch],
    min_group_size: usize,
    issues: Vec<DataQualityIssue>,
    failures: Vec<ChromosomeFailure>,
    audit: Option<AuditLog>,
) -> Clustering {
    let threshold = min_group_size.max(2);
    let sweep_key = |&idx: &usize| (segments[idx].start_bp, segments[idx].end_bp, idx);

    let mut kept: Vec<(Chromosome, Vec<usize>)> = Vec::new();
    let mut discarded_components = 0;
    let mut largest_discarded = 0;

    for batch in clustered {
        for mut members in uf.sets_of(&batch.members) {
            if members.len() < threshold {
                discarded_components += 1;
                largest_discarded = largest_discarded.max(members.len());
                continue;
            }
            members.sort_unstable_by_key(sweep_key);
            kept.push((batch.chromosome, members));
        }
    }

    kept.sort_by_key(|(chromosome, members)| (*chromosome, sweep_key(&members[0])));

    let mut assignment = vec![None; segments.len()];
    let components: Vec<Component> = kept
        .into_iter()
        .enumerate()
        .map(|(id, (chromosome, members))| {
            for &m in &members {
                assignment[m] = Some(id);
            }
            Component {
                id,
                chromosome,
                members,
            }
        })
        .collect();

    Clustering {
        assignment,
        components,
        discarded_components,
        largest_discarded,
        issues,
        failures,
        audit,
    }
}
