/// Sweep-line overlap index for the segments of one chromosome
///
/// Intervals are sorted by start. The sweep keeps an active set ordered by end
/// position; every interval that can no longer reach `min_overlap_bp` of shared
/// span with anything to its right is evicted before the next interval is
/// tested. Finding all linked pairs costs O(n log n + k) for k pairs.
use std::collections::BTreeSet;
use std::ops::Range;

/// An interval tagged with the caller's identity for it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub idx: usize,   // Caller-side identity
    pub begin: u64,   // Start position (bp)
    pub end: u64,     // End position (bp)
}

impl Interval {
    pub fn new(idx: usize, begin: u64, end: u64) -> Self {
        Interval { idx, begin, end }
    }

    pub fn length(&self) -> u64 {
        self.end.saturating_sub(self.begin)
    }

    pub fn overlap_bp(&self, other: &Interval) -> u64 {
        let overlap_start = self.begin.max(other.begin);
        let overlap_end = self.end.min(other.end);
        overlap_end.saturating_sub(overlap_start)
    }

    pub fn links_with(&self, other: &Interval, min_overlap_bp: u64) -> bool {
        let overlap = self.overlap_bp(other);
        overlap > 0 && overlap >= min_overlap_bp
    }
}

/// A contiguous run of sweep positions plus the earlier intervals that are
/// still open where it starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shard {
    pub range: Range<usize>,
    /// Sweep positions before `range` that can still link into it
    pub seeds: Vec<usize>,
}

/// Drop every active entry ending before `horizon`
fn evict_before(active: &mut BTreeSet<(u64, usize)>, horizon: u64) {
    while let Some(&(end, _)) = active.first() {
        if end < horizon {
            active.pop_first();
        } else {
            break;
        }
    }
}

/// Sorted intervals of one chromosome plus the linking threshold
#[derive(Debug, Clone)]
pub struct OverlapIndex {
    sorted: Vec<Interval>,
    min_overlap_bp: u64,
}

impl OverlapIndex {
    pub fn new(mut intervals: Vec<Interval>, min_overlap_bp: u64) -> Self {
        intervals.sort_unstable_by(|a, b| {
            a.begin
                .cmp(&b.begin)
                .then_with(|| a.end.cmp(&b.end))
                .then_with(|| a.idx.cmp(&b.idx))
        });
        OverlapIndex {
            sorted: intervals,
            min_overlap_bp,
        }
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    /// Intervals in sweep order
    pub fn intervals(&self) -> &[Interval] {
        &self.sorted
    }

    pub fn min_overlap_bp(&self) -> u64 {
        self.min_overlap_bp
    }

    /// Shared span an interval must reach past a start position to link.
    /// A zero threshold still needs one base of true intersection.
    fn min_link(&self) -> u64 {
        self.min_overlap_bp.max(1)
    }

    /// Call `f(a, b)` once for every linked pair, with `a` before `b` in sweep order
    pub fn for_each_linked_pair<F: FnMut(usize, usize)>(&self, f: F) {
        self.for_each_linked_pair_in(0..self.sorted.len(), f)
    }

    /// Sweep only the intervals at sweep positions in `range`, reporting each
    /// pair whose later member falls in the range. Earlier intervals that are
    /// still open when the range begins seed the active set, so disjoint
    /// ranges covering the whole index report every pair exactly once.
    ///
    /// Finding the seeds scans the whole prefix; use [`OverlapIndex::shards`]
    /// when sweeping many ranges of one index.
    pub fn for_each_linked_pair_in<F: FnMut(usize, usize)>(&self, range: Range<usize>, f: F) {
        let hi = range.end.min(self.sorted.len());
        let lo = range.start.min(hi);
        if lo == hi {
            return;
        }

        let reach = self.sorted[lo].begin.saturating_add(self.min_link());
        let seeds = self.sorted[..lo]
            .iter()
            .enumerate()
            .filter(|(_, interval)| interval.end >= reach)
            .map(|(pos, _)| pos);
        self.sweep(seeds, lo..hi, f);
    }

    /// Sweep one shard from [`OverlapIndex::shards`]
    pub fn for_each_linked_pair_in_shard<F: FnMut(usize, usize)>(&self, shard: &Shard, f: F) {
        let hi = shard.range.end.min(self.sorted.len());
        let lo = shard.range.start.min(hi);
        if lo == hi {
            return;
        }
        self.sweep(shard.seeds.iter().copied(), lo..hi, f);
    }

    fn sweep<I, F>(&self, seeds: I, range: Range<usize>, mut f: F)
    where
        I: IntoIterator<Item = usize>,
        F: FnMut(usize, usize),
    {
        let min_link = self.min_link();

        // Active set keyed by (end, sweep position) so eviction pops from the front
        let mut active: BTreeSet<(u64, usize)> = seeds
            .into_iter()
            .map(|pos| (self.sorted[pos].end, pos))
            .collect();

        for pos in range {
            let current = self.sorted[pos];

            // Anything ending before the horizon cannot share enough span with
            // this interval or any later one, since starts only increase
            evict_before(&mut active, current.begin.saturating_add(min_link));

            // Every survivor started no later and reaches the horizon, so the
            // shared span is decided by the current interval's own length
            if current.length() >= min_link {
                for &(_, other) in &active {
                    f(self.sorted[other].idx, current.idx);
                }
            }

            active.insert((current.end, pos));
        }
    }

    /// Collect all linked pairs
    pub fn linked_pairs(&self) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        self.for_each_linked_pair(|a, b| pairs.push((a, b)));
        pairs
    }

    /// Split the sweep order into contiguous ranges of at most `shard_size`
    pub fn shard_ranges(&self, shard_size: usize) -> Vec<Range<usize>> {
        let n = self.sorted.len();
        if n == 0 {
            return Vec::new();
        }
        let step = shard_size.max(1);
        (0..n)
            .step_by(step)
            .map(|start| start..(start + step).min(n))
            .collect()
    }

    /// Cut the sweep order like [`OverlapIndex::shard_ranges`] and find every
    /// shard's seeds in a single pass
    pub fn shards(&self, shard_size: usize) -> Vec<Shard> {
        let min_link = self.min_link();
        let mut active: BTreeSet<(u64, usize)> = BTreeSet::new();

        self.shard_ranges(shard_size)
            .into_iter()
            .map(|range| {
                evict_before(&mut active, self.sorted[range.start].begin.saturating_add(min_link));
                let seeds = active.iter().map(|&(_, pos)| pos).collect();
                for pos in range.clone() {
                    active.insert((self.sorted[pos].end, pos));
                }
                Shard { range, seeds }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalized(mut pairs: Vec<(usize, usize)>) -> Vec<(usize, usize)> {
        for pair in pairs.iter_mut() {
            if pair.0 > pair.1 {
                *pair = (pair.1, pair.0);
            }
        }
        pairs.sort_unstable();
        pairs
    }

    fn brute_force(intervals: &[Interval], min_overlap_bp: u64) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        for (i, a) in intervals.iter().enumerate() {
            for b in &intervals[i + 1..] {
                if a.links_with(b, min_overlap_bp) {
                    pairs.push((a.idx, b.idx));
                }
            }
        }
        normalized(pairs)
    }

    #[test]
    fn test_empty_and_single() {
        let index = OverlapIndex::new(vec![], 0);
        assert!(index.linked_pairs().is_empty());
        assert!(index.shard_ranges(4).is_empty());

        let index = OverlapIndex::new(vec![Interval::new(0, 10, 20)], 0);
        assert!(index.linked_pairs().is_empty());
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let intervals = vec![Interval::new(0, 0, 3_000_000), Interval::new(1, 1_000_000, 5_000_000)];
        // 2 Mb of shared span
        let index = OverlapIndex::new(intervals.clone(), 2_000_000);
        assert_eq!(index.linked_pairs(), vec![(0, 1)]);

        let index = OverlapIndex::new(intervals, 2_000_001);
        assert!(index.linked_pairs().is_empty());
    }

    #[test]
    fn test_touching_never_links() {
        let intervals = vec![Interval::new(0, 0, 100), Interval::new(1, 100, 200)];
        let index = OverlapIndex::new(intervals, 0);
        assert!(index.linked_pairs().is_empty());
    }

    #[test]
    fn test_identical_intervals_link() {
        let intervals = vec![
            Interval::new(0, 100, 200),
            Interval::new(1, 100, 200),
            Interval::new(2, 100, 200),
        ];
        let index = OverlapIndex::new(intervals, 50);
        assert_eq!(normalized(index.linked_pairs()), vec![(0, 1), (0, 2), (1, 2)]);
    }

    #[test]
    fn test_short_interval_inside_long_one() {
        // The nested interval is shorter than the threshold, so it links with nothing
        let intervals = vec![
            Interval::new(0, 0, 10_000),
            Interval::new(1, 2_000, 2_500),
            Interval::new(2, 3_000, 9_000),
        ];
        let index = OverlapIndex::new(intervals.clone(), 1_000);
        assert_eq!(normalized(index.linked_pairs()), brute_force(&intervals, 1_000));
        assert_eq!(normalized(index.linked_pairs()), vec![(0, 2)]);
    }

    #[test]
    fn test_matches_brute_force_on_mixed_layout() {
        let intervals: Vec<Interval> = [
            (0, 50),
            (10, 30),
            (25, 90),
            (40, 45),
            (60, 120),
            (61, 62),
            (100, 300),
            (150, 160),
            (150, 160),
            (299, 400),
        ]
        .iter()
        .enumerate()
        .map(|(i, &(b, e))| Interval::new(i, b, e))
        .collect();

        for threshold in [0, 1, 5, 10, 20, 60] {
            let index = OverlapIndex::new(intervals.clone(), threshold);
            assert_eq!(
                normalized(index.linked_pairs()),
                brute_force(&intervals, threshold),
                "threshold {threshold}"
            );
        }
    }

    #[test]
    fn test_sharded_sweep_matches_full_sweep() {
        let intervals: Vec<Interval> = (0..40)
            .map(|i| Interval::new(i, (i as u64 * 37) % 500, (i as u64 * 37) % 500 + 20 + (i as u64 % 7) * 30))
            .collect();
        let index = OverlapIndex::new(intervals, 15);
        let full = normalized(index.linked_pairs());

        for shard_size in [1, 3, 7, 40, 100] {
            let mut sharded = Vec::new();
            for range in index.shard_ranges(shard_size) {
                index.for_each_linked_pair_in(range, |a, b| sharded.push((a, b)));
            }
            assert_eq!(normalized(sharded), full, "shard size {shard_size}");
        }
    }

    #[test]
    fn test_shard_ranges_cover_everything() {
        let intervals = (0..10).map(|i| Interval::new(i, i as u64, i as u64 + 5)).collect();
        let index = OverlapIndex::new(intervals, 1);
        assert_eq!(index.shard_ranges(4), vec![0..4, 4..8, 8..10]);
        assert_eq!(index.shard_ranges(0), (0..10).map(|i| i..i + 1).collect::<Vec<_>>());
    }

    #[test]
    fn test_shards_carry_open_intervals_as_seeds() {
        // 0 spans everything, 1 ends before the second shard starts
        let intervals = vec![
            Interval::new(0, 0, 1000),
            Interval::new(1, 10, 40),
            Interval::new(2, 50, 300),
            Interval::new(3, 100, 200),
        ];
        let index = OverlapIndex::new(intervals, 20);
        let shards = index.shards(2);
        assert_eq!(shards.len(), 2);
        assert_eq!(shards[0].range, 0..2);
        assert!(shards[0].seeds.is_empty());
        assert_eq!(shards[1].range, 2..4);
        assert_eq!(shards[1].seeds, vec![0]);
    }

    #[test]
    fn test_shard_plan_matches_full_sweep() {
        let intervals: Vec<Interval> = (0..60)
            .map(|i| Interval::new(i, (i as u64 * 53) % 700, (i as u64 * 53) % 700 + 10 + (i as u64 % 9) * 45))
            .collect();
        let index = OverlapIndex::new(intervals, 25);
        let full = normalized(index.linked_pairs());

        for shard_size in [1, 4, 11, 60, 200] {
            let shards = index.shards(shard_size);
            let ranges: Vec<_> = shards.iter().map(|shard| shard.range.clone()).collect();
            assert_eq!(ranges, index.shard_ranges(shard_size));

            let mut sharded = Vec::new();
            for shard in &shards {
                index.for_each_linked_pair_in_shard(shard, |a, b| sharded.push((a, b)));
            }
            assert_eq!(normalized(sharded), full, "shard size {shard_size}");
        }
    }
}
