/// Turn raw components into reportable triangulation groups
use std::cmp::Ordering;

use indexmap::IndexMap;

use crate::cluster::Clustering;
use crate::params::{mb_to_bp, BP_PER_MB, DEFAULT_LARGE_SPAN_MB};
use crate::segment::{Chromosome, Family, Segment};

/// Members of one group that share a family name
#[derive(Debug, Clone, PartialEq)]
pub struct FamilyBucket {
    pub family: Family,
    /// Strongest match first
    pub members: Vec<Segment>,
}

/// Whether a group points at one family line or several
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FamilyMix {
    Single(Family),
    Mixed(Vec<Family>),
}

/// A connected component with its summary statistics
#[derive(Debug, Clone, PartialEq)]
pub struct TriangulationGroup {
    /// Rank after sorting, 1-based; 0 until ranked
    pub group_id: usize,
    pub chromosome: Chromosome,
    /// Ordered by (start, end, match id)
    pub members: Vec<Segment>,
    pub span: (u64, u64),
    pub total_cm: f64,
    pub avg_cm: f64,
    /// Largest family first
    pub families: Vec<FamilyBucket>,
    /// Span exceeds the large-span threshold
    pub possibly_spurious: bool,
}

impl TriangulationGroup {
    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn span_bp(&self) -> u64 {
        self.span.1.saturating_sub(self.span.0)
    }

    pub fn span_mb(&self) -> f64 {
        self.span_bp() as f64 / BP_PER_MB
    }

    pub fn family_mix(&self) -> FamilyMix {
        match self.families.as_slice() {
            [only] => FamilyMix::Single(only.family.clone()),
            buckets => FamilyMix::Mixed(buckets.iter().map(|b| b.family.clone()).collect()),
        }
    }

    pub fn family(&self, family: &Family) -> Option<&FamilyBucket> {
        self.families.iter().find(|b| &b.family == family)
    }
}

fn by_strength(a: &Segment, b: &Segment) -> Ordering {
    b.length_cm
        .total_cmp(&a.length_cm)
        .then_with(|| a.display_name.cmp(&b.display_name))
        .then_with(|| a.start_bp.cmp(&b.start_bp))
}

fn by_position(a: &Segment, b: &Segment) -> Ordering {
    a.start_bp
        .cmp(&b.start_bp)
        .then_with(|| a.end_bp.cmp(&b.end_bp))
        .then_with(|| a.match_id.cmp(&b.match_id))
}

/// Builds groups and flags suspiciously long ones
#[derive(Debug, Clone, Copy)]
pub struct GroupAggregator {
    large_span_bp: u64,
}

impl Default for GroupAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_LARGE_SPAN_MB)
    }
}

impl GroupAggregator {
    pub fn new(large_span_mb: f64) -> Self {
        GroupAggregator {
            large_span_bp: mb_to_bp(large_span_mb),
        }
    }

    pub fn large_span_bp(&self) -> u64 {
        self.large_span_bp
    }

    /// One group per component, in component order, not yet ranked
    pub fn aggregate(&self, segments: &[Segment], clustering: &Clustering) -> Vec<TriangulationGroup> {
        clustering
            .components
            .iter()
            .map(|component| {
                let members = component
                    .members
                    .iter()
                    .map(|&idx| segments[idx].clone())
                    .collect();
                self.build_group(component.chromosome, members)
            })
            .collect()
    }

    /// Compute span, strength and family breakdown for one member list
    pub fn build_group(&self, chromosome: Chromosome, mut members: Vec<Segment>) -> TriangulationGroup {
        members.sort_by(by_position);

        let span_start = members.iter().map(|m| m.start_bp).min().unwrap_or(0);
        let span_end = members.iter().map(|m| m.end_bp).max().unwrap_or(0);
        let total_cm: f64 = members.iter().map(|m| m.length_cm).sum();
        let avg_cm = if members.is_empty() {
            0.0
        } else {
            total_cm / members.len() as f64
        };

        let mut buckets: IndexMap<Family, Vec<Segment>> = IndexMap::new();
        for member in &members {
            buckets.entry(member.family()).or_default().push(member.clone());
        }
        let mut families: Vec<FamilyBucket> = buckets
            .into_iter()
            .map(|(family, mut members)| {
                members.sort_by(by_strength);
                FamilyBucket { family, members }
            })
            .collect();
        families.sort_by(|a, b| {
            b.members
                .len()
                .cmp(&a.members.len())
                .then_with(|| a.family.cmp(&b.family))
        });

        TriangulationGroup {
            group_id: 0,
            chromosome,
            possibly_spurious: span_end.saturating_sub(span_start) > self.large_span_bp,
            members,
            span: (span_start, span_end),
            total_cm,
            avg_cm,
            families,
        }
    }
}
