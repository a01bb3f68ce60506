/// Segment storage: the query contract the engine consumes and an in-memory
/// implementation fed by the table importer
use std::collections::{BTreeSet, HashSet};
use std::fmt;

use anyhow::Result;
use chrono::{DateTime, Local};
use indexmap::IndexMap;
use log::info;

use crate::params::FilterParams;
use crate::segment::{Chromosome, DedupKey, Family, Segment};
use crate::segment_io::ImportOutcome;

/// Which segments an analysis run wants
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentQuery {
    pub min_cm: f64,
    pub max_cm: Option<f64>,
    pub chromosomes: Option<BTreeSet<Chromosome>>,
    pub families: Option<BTreeSet<Family>>,
    pub include_x: bool,
}

impl Default for SegmentQuery {
    fn default() -> Self {
        SegmentQuery {
            min_cm: 0.0,
            max_cm: None,
            chromosomes: None,
            families: None,
            include_x: true,
        }
    }
}

impl From<&FilterParams> for SegmentQuery {
    fn from(params: &FilterParams) -> Self {
        SegmentQuery {
            min_cm: params.min_cm,
            max_cm: params.max_cm_bound(),
            chromosomes: params.chromosomes.clone(),
            families: params
                .families
                .as_ref()
                .map(|labels| labels.iter().map(|l| Family::from_label(l)).collect()),
            include_x: params.include_x,
        }
    }
}

impl SegmentQuery {
    pub fn matches(&self, segment: &Segment) -> bool {
        if segment.length_cm < self.min_cm {
            return false;
        }
        if self.max_cm.is_some_and(|max| segment.length_cm > max) {
            return false;
        }
        if !self.include_x && segment.chromosome == Chromosome::X {
            return false;
        }
        if let Some(chromosomes) = &self.chromosomes {
            if !chromosomes.contains(&segment.chromosome) {
                return false;
            }
        }
        if let Some(families) = &self.families {
            if !families.contains(&segment.family()) {
                return false;
            }
        }
        true
    }
}

/// Which segment attribute a store search looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchField {
    /// Substring of the display name
    #[default]
    MatchName,
    /// Substring of the assigned family name; unassigned segments never match
    Family,
    /// Exact chromosome, in any spelling the importer accepts
    Chromosome,
}

/// Read side of a segment store
pub trait SegmentStore {
    /// Number of stored segments before filtering
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Matching segments ordered by (chromosome, start, end, match id)
    fn query(&self, query: &SegmentQuery) -> Result<Vec<Segment>>;
}

/// One import into the store
#[derive(Debug, Clone)]
pub struct ImportRecord {
    pub source: String,
    pub imported: usize,
    pub duplicates: usize,
    /// Rows the reader could not use
    pub skipped: usize,
    pub imported_at: DateTime<Local>,
}

impl fmt::Display for ImportRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} imported, {} duplicates, {} skipped ({})",
            self.source,
            self.imported,
            self.duplicates,
            self.skipped,
            self.imported_at.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreStats {
    pub total_segments: usize,
    pub unique_matches: usize,
    pub chromosomes_covered: usize,
    pub families: usize,
    pub import_sessions: usize,
    pub total_cm: f64,
}

impl fmt::Display for StoreStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} segments from {} matches on {} chromosomes, {} families, {:.1} cM total ({} imports)",
            self.total_segments,
            self.unique_matches,
            self.chromosomes_covered,
            self.families,
            self.total_cm,
            self.import_sessions
        )
    }
}

/// Segments kept in import order, deduplicated by (match, chromosome, start, end)
#[derive(Debug, Clone, Default)]
pub struct MemorySegmentStore {
    segments: IndexMap<DedupKey, Segment>,
    history: Vec<ImportRecord>,
}

impl MemorySegmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store directly from segments, first copy of a duplicate wins
    pub fn from_segments<I: IntoIterator<Item = Segment>>(segments: I) -> Self {
        let mut store = Self::new();
        for segment in segments {
            store.insert(segment);
        }
        store
    }

    /// Returns false when an identical segment is already stored
    pub fn insert(&mut self, segment: Segment) -> bool {
        let key = segment.dedup_key();
        if self.segments.contains_key(&key) {
            return false;
        }
        self.segments.insert(key, segment);
        true
    }

    /// Merge the segments of one table into the store and record the import
    pub fn import(&mut self, outcome: &ImportOutcome) -> ImportRecord {
        let mut imported = 0;
        let mut duplicates = 0;
        for segment in &outcome.segments {
            if self.insert(segment.clone()) {
                imported += 1;
            } else {
                duplicates += 1;
            }
        }

        let record = ImportRecord {
            source: outcome.source.clone(),
            imported,
            duplicates,
            skipped: outcome.issues.len(),
            imported_at: Local::now(),
        };
        info!("Imported {record}");
        self.history.push(record.clone());
        record
    }

    pub fn history(&self) -> &[ImportRecord] {
        &self.history
    }

    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.values()
    }

    /// Distinct named families, alphabetically
    pub fn families(&self) -> Vec<String> {
        self.segments
            .values()
            .filter_map(|s| s.family().name().map(str::to_string))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Set the family of every segment of one match; returns how many changed
    pub fn assign_family(&mut self, match_id: &str, family: Option<&str>) -> usize {
        let family = family.map(str::trim).filter(|f| !f.is_empty()).map(str::to_string);
        let mut changed = 0;
        for segment in self.segments.values_mut().filter(|s| s.match_id == match_id) {
            if segment.family_name != family {
                segment.family_name = family.clone();
                changed += 1;
            }
        }
        changed
    }

    /// Drop every segment of one match; returns how many were removed
    pub fn remove_match(&mut self, match_id: &str) -> usize {
        let before = self.segments.len();
        self.segments.retain(|_, s| s.match_id != match_id);
        before - self.segments.len()
    }

    /// Segments whose `field` matches `term`; text fields match substrings, ignoring case
    pub fn search(&self, term: &str, field: SearchField) -> Vec<Segment> {
        let needle = term.trim().to_lowercase();
        let chromosome = term.parse::<Chromosome>().ok();
        let mut found: Vec<Segment> = self
            .segments
            .values()
            .filter(|s| match field {
                SearchField::MatchName => s.display_name.to_lowercase().contains(&needle),
                SearchField::Family => s
                    .family()
                    .name()
                    .is_some_and(|name| name.to_lowercase().contains(&needle)),
                SearchField::Chromosome => chromosome == Some(s.chromosome),
            })
            .cloned()
            .collect();
        sort_for_query(&mut found);
        found
    }

    pub fn stats(&self) -> StoreStats {
        let matches: HashSet<&str> = self.segments.values().map(|s| s.match_id.as_str()).collect();
        let chromosomes: HashSet<Chromosome> = self.segments.values().map(|s| s.chromosome).collect();
        StoreStats {
            total_segments: self.segments.len(),
            unique_matches: matches.len(),
            chromosomes_covered: chromosomes.len(),
            families: self.families().len(),
            import_sessions: self.history.len(),
            total_cm: self.segments.values().map(|s| s.length_cm).sum(),
        }
    }
}

fn sort_for_query(segments: &mut [Segment]) {
    segments.sort_by(|a, b| {
        (a.chromosome, a.start_bp, a.end_bp, &a.match_id).cmp(&(b.chromosome, b.start_bp, b.end_bp, &b.match_id))
    });
}

impl SegmentStore for MemorySegmentStore {
    fn len(&self) -> usize {
        self.segments.len()
    }

    fn query(&self, query: &SegmentQuery) -> Result<Vec<Segment>> {
        let mut selected: Vec<Segment> = self
            .segments
            .values()
            .filter(|s| query.matches(s))
            .cloned()
            .collect();
        sort_for_query(&mut selected);
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn seg(name: &str, chr: Chromosome, start: u64, cm: f64, family: Option<&str>) -> Segment {
        Segment::new(name, chr, start, start + 5_000_000, cm, 1000).with_family(family.map(str::to_string))
    }

    fn sample_store() -> MemorySegmentStore {
        MemorySegmentStore::from_segments(vec![
            seg("Ann Smith", Chromosome::Autosome(2), 30_000_000, 12.0, Some("Smith")),
            seg("Bob Jones", Chromosome::Autosome(1), 10_000_000, 60.0, Some("Jones")),
            seg("Cy", Chromosome::X, 0, 9.0, None),
            seg("Ann Smith", Chromosome::Autosome(2), 10_000_000, 5.0, Some("Smith")),
            seg("Dee Smith", Chromosome::Autosome(2), 10_000_000, 20.0, Some("Smith")),
        ])
    }

    fn names(segments: &[Segment]) -> Vec<&str> {
        segments.iter().map(|s| s.display_name.as_str()).collect()
    }

    #[test]
    fn test_query_order_and_filters() {
        let store = sample_store();
        let all = store.query(&SegmentQuery::default()).unwrap();
        assert_eq!(
            names(&all),
            vec!["Bob Jones", "Ann Smith", "Dee Smith", "Ann Smith", "Cy"]
        );

        let params = FilterParams::default().with_cm_range(7.0, 50.0).with_include_x(false);
        let filtered = store.query(&SegmentQuery::from(&params)).unwrap();
        assert_eq!(names(&filtered), vec!["Dee Smith", "Ann Smith"]);

        let unassigned = SegmentQuery {
            families: Some([Family::Unassigned].into_iter().collect()),
            ..Default::default()
        };
        assert_eq!(names(&store.query(&unassigned).unwrap()), vec!["Cy"]);

        let chr1 = SegmentQuery::from(&FilterParams::default().with_cm_range(0.0, 0.0).with_chromosomes([Chromosome::Autosome(1)]));
        assert_eq!(names(&store.query(&chr1).unwrap()), vec!["Bob Jones"]);
    }

    #[test]
    fn test_unassigned_filter_skips_family_named_unassigned() {
        let store = MemorySegmentStore::from_segments(vec![
            seg("Literal", Chromosome::Autosome(5), 0, 10.0, Some("Unassigned")),
            seg("Nobody", Chromosome::Autosome(5), 1_000_000, 10.0, None),
        ]);

        let params = FilterParams::default().with_families(["Unassigned"]);
        let selected = store.query(&SegmentQuery::from(&params)).unwrap();
        assert_eq!(names(&selected), vec!["Nobody"]);

        let literal = SegmentQuery {
            families: Some([Family::Named("Unassigned".into())].into_iter().collect()),
            ..Default::default()
        };
        assert_eq!(names(&store.query(&literal).unwrap()), vec!["Literal"]);
    }

    #[test]
    fn test_import_deduplicates_and_records_history() {
        let mut store = MemorySegmentStore::new();
        let outcome = ImportOutcome {
            source: "first.csv".into(),
            segments: vec![
                seg("A", Chromosome::Autosome(1), 0, 10.0, None),
                seg("A", Chromosome::Autosome(1), 0, 10.0, None),
                seg("B", Chromosome::Autosome(1), 0, 10.0, None),
            ],
            issues: vec![],
            rows: 3,
        };
        let record = store.import(&outcome);
        assert_eq!((record.imported, record.duplicates, record.skipped), (2, 1, 0));

        let again = store.import(&ImportOutcome {
            source: "second.csv".into(),
            ..outcome.clone()
        });
        assert_eq!((again.imported, again.duplicates), (0, 3));
        assert_eq!(store.len(), 2);
        assert_eq!(store.history().len(), 2);
        assert_eq!(store.history()[1].source, "second.csv");
    }

    #[test]
    fn test_family_maintenance() {
        let mut store = sample_store();
        assert_eq!(store.families(), vec!["Jones".to_string(), "Smith".to_string()]);

        assert_eq!(store.assign_family("Cy", Some("Young")), 1);
        assert_eq!(store.assign_family("Ann Smith", Some("Carter")), 2);
        assert_eq!(store.families(), vec!["Carter", "Jones", "Smith", "Young"]);
        assert_eq!(store.assign_family("Cy", Some("  ")), 1);

        assert_eq!(
            names(&store.search("smith", SearchField::MatchName)),
            vec!["Ann Smith", "Dee Smith", "Ann Smith"]
        );
        assert_eq!(names(&store.search("ART", SearchField::Family)), vec!["Ann Smith", "Ann Smith"]);
        assert_eq!(names(&store.search("chrX", SearchField::Chromosome)), vec!["Cy"]);
        assert!(store.search("chr99", SearchField::Chromosome).is_empty());
        assert_eq!(store.remove_match("Ann Smith"), 2);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_stats() {
        let stats = sample_store().stats();
        assert_eq!(
            stats,
            StoreStats {
                total_segments: 5,
                unique_matches: 4,
                chromosomes_covered: 3,
                families: 2,
                import_sessions: 0,
                total_cm: 106.0,
            }
        );
    }
}
