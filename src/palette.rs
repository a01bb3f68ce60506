/// Family color keys for the visualization layer
///
/// Every family in a segment set gets a palette index from its sorted
/// position, so the same family set always yields the same colors.
use std::collections::{BTreeSet, HashMap};
use std::io::Write;

use anyhow::Result;

use crate::delimited::write_record;
use crate::group::TriangulationGroup;
use crate::segment::{DedupKey, Family, Segment};

const SATURATION: f64 = 0.8;
const VALUE: f64 = 0.9;

pub const ANNOTATED_HEADER: [&str; 10] = [
    "Match_Name",
    "Surname",
    "Chromosome",
    "Start_Location",
    "End_Location",
    "Centimorgans",
    "Matching_SNPs",
    "Palette_Index",
    "Color",
    "Group_ID",
];

/// HSV to RGB with components in 0..=1
fn hsv_to_rgb(h: f64, s: f64, v: f64) -> (f64, f64, f64) {
    let sector = (h * 6.0).floor();
    let f = h * 6.0 - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    match (sector as i64).rem_euclid(6) {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    }
}

/// Deterministic family → palette index mapping
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FamilyPalette {
    families: Vec<Family>,
}

impl FamilyPalette {
    pub fn from_families<I: IntoIterator<Item = Family>>(families: I) -> Self {
        let sorted: BTreeSet<Family> = families.into_iter().collect();
        FamilyPalette {
            families: sorted.into_iter().collect(),
        }
    }

    pub fn from_segments(segments: &[Segment]) -> Self {
        Self::from_families(segments.iter().map(Segment::family))
    }

    pub fn len(&self) -> usize {
        self.families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    pub fn families(&self) -> &[Family] {
        &self.families
    }

    pub fn index_of(&self, family: &Family) -> Option<usize> {
        self.families.binary_search(family).ok()
    }

    /// Evenly spaced hue for a palette index, as "rgb(r, g, b)"
    pub fn color(&self, index: usize) -> String {
        let n = self.families.len().max(1);
        let (r, g, b) = hsv_to_rgb(index as f64 / n as f64, SATURATION, VALUE);
        let channel = |c: f64| (c * 255.0) as u8;
        format!("rgb({}, {}, {})", channel(r), channel(g), channel(b))
    }
}

/// A segment ready for rendering
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedSegment {
    pub segment: Segment,
    pub family: Family,
    pub palette_index: usize,
    pub color: String,
    /// Rank of the group the segment ended up in, if any
    pub group_id: Option<usize>,
}

/// Attach family, color key and group rank to every segment
pub fn annotate(segments: &[Segment], groups: &[TriangulationGroup]) -> Vec<AnnotatedSegment> {
    let palette = FamilyPalette::from_segments(segments);
    let group_of: HashMap<DedupKey, usize> = groups
        .iter()
        .flat_map(|g| g.members.iter().map(move |m| (m.dedup_key(), g.group_id)))
        .collect();

    segments
        .iter()
        .map(|segment| {
            let family = segment.family();
            let palette_index = palette.index_of(&family).unwrap_or_default();
            AnnotatedSegment {
                group_id: group_of.get(&segment.dedup_key()).copied(),
                color: palette.color(palette_index),
                palette_index,
                family,
                segment: segment.clone(),
            }
        })
        .collect()
}

/// Tab-delimited rendering input, one row per segment
pub fn write_annotated<W: Write + ?Sized>(out: &mut W, annotated: &[AnnotatedSegment]) -> Result<()> {
    write_record(out, &ANNOTATED_HEADER, '\t')?;
    for a in annotated {
        let s = &a.segment;
        let row = [
            s.display_name.clone(),
            a.family.name().unwrap_or_default().to_string(),
            s.chromosome.to_string(),
            s.start_bp.to_string(),
            s.end_bp.to_string(),
            s.length_cm.to_string(),
            s.snp_count.to_string(),
            a.palette_index.to_string(),
            a.color.clone(),
            a.group_id.map(|id| id.to_string()).unwrap_or_default(),
        ];
        write_record(out, &row, '\t')?;
    }
    Ok(())
}
