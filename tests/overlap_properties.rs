/// Property-based tests for the overlap index and the clustering strategies
///
/// Random interval sets are checked against exhaustive comparison, and the
/// two strategies are checked against each other.
use std::collections::BTreeSet;

use proptest::prelude::*;
use trisweep::overlap_index::{Interval, OverlapIndex};
use trisweep::{Chromosome, ClusterParams, ClusteringStrategy, ParallelStrategy, ReferenceStrategy, Segment};

fn brute_force(intervals: &[Interval], min_overlap_bp: u64) -> BTreeSet<(usize, usize)> {
    let mut pairs = BTreeSet::new();
    for (i, a) in intervals.iter().enumerate() {
        for b in &intervals[i + 1..] {
            if a.links_with(b, min_overlap_bp) {
                pairs.insert((a.idx.min(b.idx), a.idx.max(b.idx)));
            }
        }
    }
    pairs
}

fn normalized(pairs: Vec<(usize, usize)>) -> Vec<(usize, usize)> {
    let mut pairs: Vec<(usize, usize)> = pairs.into_iter().map(|(a, b)| (a.min(b), a.max(b))).collect();
    pairs.sort_unstable();
    pairs
}

fn intervals_from(raw: &[(u64, u64)]) -> Vec<Interval> {
    raw.iter()
        .enumerate()
        .map(|(idx, &(begin, len))| Interval::new(idx, begin, begin + len))
        .collect()
}

fn segments_from(raw: &[(u8, u64, u64)]) -> Vec<Segment> {
    raw.iter()
        .enumerate()
        .map(|(i, &(chr, begin, len))| {
            Segment::new(&format!("S{i}"), Chromosome::Autosome(chr), begin, begin + len, 10.0, 100)
        })
        .collect()
}

/// Property: the sweep emits exactly the brute-force pair set, each pair once
#[test]
fn prop_sweep_matches_brute_force() {
    proptest!(|(
        raw in prop::collection::vec((0u64..2_000, 0u64..400), 0..60),
        min_overlap in 0u64..250
    )| {
        let intervals = intervals_from(&raw);
        let index = OverlapIndex::new(intervals.clone(), min_overlap);
        let emitted = normalized(index.linked_pairs());
        let unique: BTreeSet<(usize, usize)> = emitted.iter().copied().collect();

        prop_assert_eq!(emitted.len(), unique.len(), "duplicate pair emitted");
        prop_assert_eq!(unique, brute_force(&intervals, min_overlap));
    });
}

/// Property: any shard size yields the same pairs as the full sweep
#[test]
fn prop_sharded_sweep_matches_full() {
    proptest!(|(
        raw in prop::collection::vec((0u64..1_000, 1u64..300), 0..50),
        min_overlap in 0u64..150,
        shard_size in 1usize..12
    )| {
        let index = OverlapIndex::new(intervals_from(&raw), min_overlap);
        let mut sharded = Vec::new();
        for range in index.shard_ranges(shard_size) {
            index.for_each_linked_pair_in(range, |a, b| sharded.push((a, b)));
        }
        prop_assert_eq!(normalized(sharded), normalized(index.linked_pairs()));
    });
}

/// Property: a one-pass shard plan seeds each shard with exactly the
/// intervals a prefix scan would find
#[test]
fn prop_shard_plan_matches_prefix_seeding() {
    proptest!(|(
        raw in prop::collection::vec((0u64..1_000, 1u64..300), 0..50),
        min_overlap in 0u64..150,
        shard_size in 1usize..12
    )| {
        let index = OverlapIndex::new(intervals_from(&raw), min_overlap);
        let mut planned = Vec::new();
        let mut scanned = Vec::new();
        for shard in index.shards(shard_size) {
            index.for_each_linked_pair_in_shard(&shard, |a, b| planned.push((a, b)));
            index.for_each_linked_pair_in(shard.range.clone(), |a, b| scanned.push((a, b)));
        }
        prop_assert_eq!(normalized(planned.clone()), normalized(scanned));
        prop_assert_eq!(normalized(planned), normalized(index.linked_pairs()));
    });
}

/// Property: shard ranges tile the sweep order without gaps or overlap
#[test]
fn prop_shard_ranges_cover_index() {
    proptest!(|(
        n in 0usize..200,
        shard_size in 0usize..40
    )| {
        let index = OverlapIndex::new((0..n).map(|i| Interval::new(i, i as u64, i as u64 + 5)).collect(), 0);
        let ranges = index.shard_ranges(shard_size);
        let mut next = 0;
        for range in &ranges {
            prop_assert_eq!(range.start, next);
            prop_assert!(range.end > range.start);
            prop_assert!(range.len() <= shard_size.max(1));
            next = range.end;
        }
        prop_assert_eq!(next, n);
    });
}

/// Property: reference and parallel strategies produce identical components
#[test]
fn prop_strategies_agree() {
    proptest!(|(
        raw in prop::collection::vec((1u8..4, 0u64..5_000, 1u64..1_500), 0..80),
        min_overlap in 0u64..600,
        min_group_size in 2usize..5,
        shard_size in 1usize..20
    )| {
        let segments = segments_from(&raw);
        let params = ClusterParams::new(min_overlap, min_group_size);
        let reference = ReferenceStrategy::new().cluster(&segments, &params).unwrap();
        let parallel = ParallelStrategy::new(2)
            .with_shard_size(shard_size)
            .cluster(&segments, &params)
            .unwrap();

        prop_assert_eq!(&parallel.components, &reference.components);
        prop_assert_eq!(&parallel.assignment, &reference.assignment);
        prop_assert_eq!(parallel.discarded_components, reference.discarded_components);
    });
}

/// Property: a stricter overlap threshold never makes a segment's component larger
#[test]
fn prop_threshold_monotonic() {
    proptest!(|(
        raw in prop::collection::vec((1u8..3, 0u64..3_000, 1u64..1_000), 0..60),
        low in 0u64..300,
        extra in 0u64..300
    )| {
        let segments = segments_from(&raw);
        let size_of = |threshold: u64| -> Vec<usize> {
            let clustering = ReferenceStrategy::new()
                .cluster(&segments, &ClusterParams::new(threshold, 2))
                .unwrap();
            (0..segments.len())
                .map(|i| clustering.component_of(i).map(|c| c.members.len()).unwrap_or(0))
                .collect()
        };

        let loose = size_of(low);
        let strict = size_of(low + extra);
        for (i, (&s, &l)) in strict.iter().zip(&loose).enumerate() {
            prop_assert!(s <= l, "segment {} grew from {} to {}", i, l, s);
        }
    });
}

/// Property: kept components plus unassigned segments account for every input
#[test]
fn prop_partition_accounts_for_every_segment() {
    proptest!(|(
        raw in prop::collection::vec((1u8..4, 0u64..4_000, 1u64..800), 0..70),
        min_overlap in 0u64..400
    )| {
        let segments = segments_from(&raw);
        let clustering = ParallelStrategy::new(2)
            .cluster(&segments, &ClusterParams::new(min_overlap, 2))
            .unwrap();

        let members: usize = clustering.components.iter().map(|c| c.members.len()).sum();
        prop_assert_eq!(members + clustering.unassigned(), segments.len());

        let mut seen = BTreeSet::new();
        for component in &clustering.components {
            for &m in &component.members {
                prop_assert!(seen.insert(m));
                prop_assert_eq!(segments[m].chromosome, component.chromosome);
            }
        }
    });
}
