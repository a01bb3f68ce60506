/// Reference clustering: exhaustive pairwise comparison, single-threaded
///
/// Every pair on a chromosome is compared directly, without the overlap index,
/// and each linked pair is unioned. Quadratic per chromosome, so it is meant
/// for verification and small or medium datasets. With auditing enabled every
/// comparison and union decision is recorded.
use log::{debug, info, warn};

use crate::audit::{AuditEvent, AuditLog};
use crate::cluster::{
    assemble, check_capacity, partition_by_chromosome, ClusterParams, Clustering,
    ClusteringStrategy,
};
use crate::error::ClusterError;
use crate::segment::Segment;
use crate::union_find::UnionFind;

#[derive(Debug, Clone, Default)]
pub struct ReferenceStrategy {
    audit: bool,
}

impl ReferenceStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_audit(mut self, audit: bool) -> Self {
        self.audit = audit;
        self
    }

    /// Run the clustering and hand back the union-find state for inspection
    pub fn cluster_with_state(
        &self,
        segments: &[Segment],
        params: &ClusterParams,
    ) -> Result<(Clustering, UnionFind), ClusterError> {
        let mut issues = Vec::new();
        let batches = partition_by_chromosome(segments, &mut issues);

        let mut uf = UnionFind::new(segments.len());
        let mut audit = self.audit.then(AuditLog::new);
        let mut clustered = Vec::with_capacity(batches.len());
        let mut failures = Vec::new();

        for batch in batches {
            params.cancel.check()?;

            if let Err(failure) = check_capacity(&batch, params) {
                warn!("Reference clustering skipped {failure}");
                if let Some(log) = audit.as_mut() {
                    log.push(AuditEvent::ChromosomeSkipped {
                        chromosome: failure.chromosome,
                        reason: failure.reason.to_string(),
                    });
                }
                failures.push(failure);
                continue;
            }

            debug!(
                "Reference clustering chromosome {} with {} segments",
                batch.chromosome,
                batch.members.len()
            );
            if let Some(log) = audit.as_mut() {
                log.push(AuditEvent::ChromosomeStart {
                    chromosome: batch.chromosome,
                    segments: batch.members.len(),
                });
            }

            for (pos, &a) in batch.members.iter().enumerate() {
                params.cancel.check()?;

                for &b in &batch.members[pos + 1..] {
                    let overlap_bp = segments[a].overlap_bp(&segments[b]);
                    let linked = overlap_bp > 0 && overlap_bp >= params.min_overlap_bp;

                    if let Some(log) = audit.as_mut() {
                        log.push(AuditEvent::Compare {
                            a,
                            b,
                            overlap_bp,
                            required_bp: params.min_overlap_bp,
                            linked,
                        });
                    }

                    if linked {
                        let merged = uf.union(a, b);
                        if let Some(log) = audit.as_mut() {
                            log.push(AuditEvent::Union { a, b, merged });
                        }
                    }
                }
            }

            clustered.push(batch);
        }

        let clustering = assemble(
            segments,
            &mut uf,
            &clustered,
            params.min_group_size,
            issues,
            failures,
            audit,
        );
        info!(
            "Reference clustering found {} components ({} below threshold)",
            clustering.components.len(),
            clustering.discarded_components
        );
        Ok((clustering, uf))
    }
}

impl ClusteringStrategy for ReferenceStrategy {
    fn name(&self) -> &'static str {
        "reference"
    }

    fn cluster(
        &self,
        segments: &[Segment],
        params: &ClusterParams,
    ) -> Result<Clustering, ClusterError> {
        self.cluster_with_state(segments, params)
            .map(|(clustering, _)| clustering)
    }
}
