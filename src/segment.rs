/// Shared DNA segment records
///
/// A segment is one contiguous region on one chromosome where the tester's DNA
/// matches another person's. Segments are read-only snapshots handed out by a
/// segment store; nothing in the clustering path mutates them.
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Chromosome identifier: autosomes 1-22 and X
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Chromosome {
    Autosome(u8),
    X,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown chromosome '{0}'")]
pub struct ParseChromosomeError(pub String);

impl Chromosome {
    pub const AUTOSOME_COUNT: u8 = 22;

    /// Build an autosome, rejecting numbers outside 1-22
    pub fn autosome(n: u8) -> Option<Self> {
        (1..=Self::AUTOSOME_COUNT).contains(&n).then_some(Chromosome::Autosome(n))
    }

    pub fn is_autosomal(&self) -> bool {
        matches!(self, Chromosome::Autosome(_))
    }

    /// All chromosomes in ascending order (1..22, then X)
    pub fn all() -> impl Iterator<Item = Chromosome> {
        (1..=Self::AUTOSOME_COUNT)
            .map(Chromosome::Autosome)
            .chain(std::iter::once(Chromosome::X))
    }
}

impl fmt::Display for Chromosome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Chromosome::Autosome(n) => write!(f, "{n}"),
            Chromosome::X => f.write_str("X"),
        }
    }
}

impl FromStr for Chromosome {
    type Err = ParseChromosomeError;

    /// Accepts "7", "chr7", "X", "chrX" and the numeric alias "23" for X
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let bare = match (trimmed.get(..3), trimmed.get(3..)) {
            (Some(prefix), Some(rest)) if prefix.eq_ignore_ascii_case("chr") => rest,
            _ => trimmed,
        };

        if bare.eq_ignore_ascii_case("x") || bare == "23" {
            return Ok(Chromosome::X);
        }

        bare.parse::<u8>()
            .ok()
            .and_then(Chromosome::autosome)
            .ok_or_else(|| ParseChromosomeError(s.to_string()))
    }
}

/// Family bucket a segment is reported under
///
/// Named families sort alphabetically and `Unassigned` sorts after all of them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Family {
    Named(String),
    Unassigned,
}

impl Family {
    pub const UNASSIGNED_LABEL: &'static str = "Unassigned";

    pub fn from_option(name: Option<&str>) -> Self {
        match name.map(str::trim) {
            Some(n) if !n.is_empty() => Family::Named(n.to_string()),
            _ => Family::Unassigned,
        }
    }

    /// Family named on a command line or in a filter list, where the
    /// `Unassigned` label selects segments without a family
    pub fn from_label(label: &str) -> Self {
        let label = label.trim();
        if label.eq_ignore_ascii_case(Self::UNASSIGNED_LABEL) {
            Family::Unassigned
        } else {
            Family::from_option(Some(label))
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Family::Named(n) => Some(n),
            Family::Unassigned => None,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::Named(n) => f.write_str(n),
            Family::Unassigned => f.write_str(Self::UNASSIGNED_LABEL),
        }
    }
}

/// One shared segment between the tester and a match
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub match_id: String,
    pub display_name: String,
    pub family_name: Option<String>,
    pub chromosome: Chromosome,
    pub start_bp: u64,
    pub end_bp: u64,
    pub length_cm: f64,
    pub snp_count: u32,
}

/// Key used to recognise the same segment imported twice
pub type DedupKey = (String, Chromosome, u64, u64);

impl Segment {
    /// Create a segment whose identity and display name are both the match name
    pub fn new(
        match_name: &str,
        chromosome: Chromosome,
        start_bp: u64,
        end_bp: u64,
        length_cm: f64,
        snp_count: u32,
    ) -> Self {
        Segment {
            match_id: match_name.to_string(),
            display_name: match_name.to_string(),
            family_name: None,
            chromosome,
            start_bp,
            end_bp,
            length_cm,
            snp_count,
        }
    }

    pub fn with_family(mut self, family: Option<String>) -> Self {
        self.family_name = family;
        self
    }

    pub fn with_match_id(mut self, match_id: &str) -> Self {
        self.match_id = match_id.to_string();
        self
    }

    /// True when the interval has positive length
    pub fn is_well_formed(&self) -> bool {
        self.start_bp < self.end_bp
    }

    pub fn span_bp(&self) -> u64 {
        self.end_bp.saturating_sub(self.start_bp)
    }

    pub fn family(&self) -> Family {
        Family::from_option(self.family_name.as_deref())
    }

    pub fn dedup_key(&self) -> DedupKey {
        (
            self.match_id.clone(),
            self.chromosome,
            self.start_bp,
            self.end_bp,
        )
    }

    /// Length of the shared interval with another segment, 0 when disjoint,
    /// touching, or on a different chromosome
    pub fn overlap_bp(&self, other: &Segment) -> u64 {
        if self.chromosome != other.chromosome {
            return 0;
        }
        let overlap_start = self.start_bp.max(other.start_bp);
        let overlap_end = self.end_bp.min(other.end_bp);
        overlap_end.saturating_sub(overlap_start)
    }

    /// The overlap relation: positive intersection of at least `min_overlap_bp`
    pub fn links_with(&self, other: &Segment, min_overlap_bp: u64) -> bool {
        let overlap = self.overlap_bp(other);
        overlap > 0 && overlap >= min_overlap_bp
    }
}
