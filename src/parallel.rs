/// Parallel clustering: overlap index per chromosome, fanned out over a rayon pool
///
/// Each chromosome (or shard of a large chromosome) is an independent task.
/// A task sweeps its part of the chromosome's overlap index into a local
/// union-find over just the segments it links, and returns (segment, local
/// root) assignments for those. The coordinator
/// replays those assignments into one union-find, the only mutable state
/// shared by the run, so the merge is single-writer and deterministic.
use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::cluster::{
    assemble, check_capacity, partition_by_chromosome, ChromosomeBatch, ClusterParams, Clustering,
    ClusteringStrategy,
};
use crate::error::{ChromosomeFailure, ClusterError, FailureReason};
use crate::overlap_index::{Interval, OverlapIndex, Shard};
use crate::segment::Segment;
use crate::union_find::UnionFind;

pub const DEFAULT_SHARD_SIZE: usize = 50_000;

#[derive(Debug, Clone)]
pub struct ParallelStrategy {
    threads: usize,
    shard_size: usize,
    /// Makes every shard of this chromosome panic
    #[cfg(test)]
    fail_chromosome: Option<crate::segment::Chromosome>,
}

impl Default for ParallelStrategy {
    fn default() -> Self {
        ParallelStrategy {
            threads: 0,
            shard_size: DEFAULT_SHARD_SIZE,
            #[cfg(test)]
            fail_chromosome: None,
        }
    }
}

/// Output of one shard task, in arena indices
struct ShardAssignments {
    batch: usize,
    assignments: Vec<(usize, usize)>,
}

/// Union-find over the batch positions one shard actually links, so a shard
/// costs what it touches rather than the size of its chromosome
#[derive(Default)]
struct TouchedSets {
    slot_of: HashMap<usize, usize>,
    positions: Vec<usize>,
    uf: UnionFind,
}

impl TouchedSets {
    fn slot(&mut self, position: usize) -> usize {
        if let Some(&slot) = self.slot_of.get(&position) {
            return slot;
        }
        let slot = self.uf.make_set();
        self.slot_of.insert(position, slot);
        self.positions.push(position);
        slot
    }

    fn union(&mut self, a: usize, b: usize) {
        let (a, b) = (self.slot(a), self.slot(b));
        self.uf.union(a, b);
    }

    /// (position, root position) for every touched position not its own root
    fn assignments(mut self) -> Vec<(usize, usize)> {
        let mut assignments = Vec::new();
        for slot in 0..self.positions.len() {
            let root = self.uf.find(slot);
            if root != slot {
                assignments.push((self.positions[slot], self.positions[root]));
            }
        }
        assignments
    }
}

/// A shard either returns its assignments or the panic message of its batch
type ShardOutcome = Result<ShardAssignments, (usize, String)>;

impl ParallelStrategy {
    /// `threads == 0` lets rayon pick from the available parallelism
    pub fn new(threads: usize) -> Self {
        ParallelStrategy {
            threads,
            ..Self::default()
        }
    }

    pub fn with_shard_size(mut self, shard_size: usize) -> Self {
        self.shard_size = shard_size.max(1);
        self
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn shard_size(&self) -> usize {
        self.shard_size
    }

    #[cfg(test)]
    fn with_failing_chromosome(mut self, chromosome: crate::segment::Chromosome) -> Self {
        self.fail_chromosome = Some(chromosome);
        self
    }

    fn build_index(segments: &[Segment], batch: &ChromosomeBatch, min_overlap_bp: u64) -> OverlapIndex {
        // Interval ids are positions within the batch; members maps them back
        let intervals = batch
            .members
            .iter()
            .enumerate()
            .map(|(local, &idx)| Interval::new(local, segments[idx].start_bp, segments[idx].end_bp))
            .collect();
        OverlapIndex::new(intervals, min_overlap_bp)
    }

    fn run_shard(
        &self,
        batch_no: usize,
        batch: &ChromosomeBatch,
        index: &OverlapIndex,
        shard: &Shard,
    ) -> Result<ShardAssignments, String> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            #[cfg(test)]
            if self.fail_chromosome == Some(batch.chromosome) {
                panic!("simulated fault on chromosome {}", batch.chromosome);
            }

            let mut local = TouchedSets::default();
            index.for_each_linked_pair_in_shard(shard, |a, b| local.union(a, b));
            local
                .assignments()
                .into_iter()
                .map(|(member, root)| (batch.members[member], batch.members[root]))
                .collect::<Vec<_>>()
        }));

        match outcome {
            Ok(assignments) => Ok(ShardAssignments {
                batch: batch_no,
                assignments,
            }),
            Err(payload) => Err(panic_message(payload.as_ref())),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl ClusteringStrategy for ParallelStrategy {
    fn name(&self) -> &'static str {
        "parallel"
    }

    fn cluster(
        &self,
        segments: &[Segment],
        params: &ClusterParams,
    ) -> Result<Clustering, ClusterError> {
        params.cancel.check()?;

        let mut issues = Vec::new();
        let mut failures = Vec::new();
        let mut batches = Vec::new();
        for batch in partition_by_chromosome(segments, &mut issues) {
            match check_capacity(&batch, params) {
                Ok(()) => batches.push(batch),
                Err(failure) => {
                    warn!("Parallel clustering skipped {failure}");
                    failures.push(failure);
                }
            }
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .thread_name(|i| format!("trisweep-worker-{i}"))
            .build()
            .map_err(|e| ClusterError::WorkerPool(e.to_string()))?;

        let min_overlap_bp = params.min_overlap_bp;
        let shard_size = self.shard_size;

        let results: Vec<Result<ShardOutcome, ClusterError>> =
            pool.install(|| {
                let indexes: Vec<OverlapIndex> = batches
                    .par_iter()
                    .map(|batch| Self::build_index(segments, batch, min_overlap_bp))
                    .collect();

                let tasks: Vec<(usize, Shard)> = indexes
                    .iter()
                    .enumerate()
                    .flat_map(|(batch_no, index)| {
                        index
                            .shards(shard_size)
                            .into_iter()
                            .map(move |shard| (batch_no, shard))
                    })
                    .collect();

                debug!(
                    "Dispatching {} tasks over {} chromosomes on {} threads",
                    tasks.len(),
                    batches.len(),
                    rayon::current_num_threads()
                );

                tasks
                    .into_par_iter()
                    .map(|(batch_no, shard)| -> Result<ShardOutcome, ClusterError> {
                        params.cancel.check()?;
                        Ok(self
                            .run_shard(batch_no, &batches[batch_no], &indexes[batch_no], &shard)
                            .map_err(|message| (batch_no, message)))
                    })
                    .collect()
            });

        // All-or-nothing: a cancelled task or a late cancel voids the whole run
        let mut shard_outputs = Vec::with_capacity(results.len());
        for result in results {
            shard_outputs.push(result?);
        }
        params.cancel.check()?;

        let mut failed_batches: BTreeMap<usize, String> = BTreeMap::new();
        let mut merged: Vec<ShardAssignments> = Vec::new();
        for output in shard_outputs {
            match output {
                Ok(shard) => merged.push(shard),
                Err((batch_no, message)) => {
                    failed_batches.entry(batch_no).or_insert(message);
                }
            }
        }

        // Single-writer merge into the global union-find
        let mut uf = UnionFind::new(segments.len());
        for shard in merged.iter().filter(|s| !failed_batches.contains_key(&s.batch)) {
            for &(member, root) in &shard.assignments {
                uf.union(member, root);
            }
        }

        let mut clustered = Vec::with_capacity(batches.len());
        for (batch_no, batch) in batches.into_iter().enumerate() {
            if let Some(message) = failed_batches.remove(&batch_no) {
                let failure = ChromosomeFailure {
                    chromosome: batch.chromosome,
                    reason: FailureReason::WorkerPanicked(message),
                };
                warn!("Parallel clustering lost {failure}");
                failures.push(failure);
            } else {
                clustered.push(batch);
            }
        }
        failures.sort_by_key(|f| f.chromosome);

        let clustering = assemble(
            segments,
            &mut uf,
            &clustered,
            params.min_group_size,
            issues,
            failures,
            None,
        );
        info!(
            "Parallel clustering found {} components ({} below threshold)",
            clustering.components.len(),
            clustering.discarded_components
        );
        Ok(clustering)
    }
}
