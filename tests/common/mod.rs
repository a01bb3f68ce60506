//! Shared fixtures for the integration tests
#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use trisweep::{Chromosome, Segment};

pub const FAMILIES: [&str; 5] = ["Carter", "Jones", "Lee", "Smith", "Young"];

/// Autosomal segment without a family
pub fn seg(name: &str, chr: u8, start: u64, end: u64, cm: f64) -> Segment {
    Segment::new(name, Chromosome::Autosome(chr), start, end, cm, 1000)
}

/// Random segments piled around a few hotspots per chromosome so that
/// components of every size show up, including long chains
pub fn synthetic_segments(seed: u64, count: usize, autosomes: u8) -> Vec<Segment> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let chromosome = if rng.gen_bool(0.1) {
                Chromosome::X
            } else {
                Chromosome::Autosome(rng.gen_range(1..=autosomes))
            };
            let hotspot = rng.gen_range(0..8u64) * 20_000_000;
            let start = hotspot + rng.gen_range(0..10_000_000u64);
            let length = rng.gen_range(500_000..15_000_000u64);
            let cm = rng.gen_range(7.0..45.0);
            let family = if rng.gen_bool(0.2) {
                None
            } else {
                Some(FAMILIES[rng.gen_range(0..FAMILIES.len())].to_string())
            };
            Segment::new(
                &format!("Match {i:04}"),
                chromosome,
                start,
                start + length,
                cm,
                rng.gen_range(300..5000),
            )
            .with_family(family)
        })
        .collect()
}

/// Every linked pair by exhaustive comparison
pub fn brute_force_pairs(segments: &[Segment], min_overlap_bp: u64) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    for i in 0..segments.len() {
        for j in i + 1..segments.len() {
            let (a, b) = (&segments[i], &segments[j]);
            if a.is_well_formed() && b.is_well_formed() && a.links_with(b, min_overlap_bp) {
                pairs.push((i, j));
            }
        }
    }
    pairs
}

/// Table text in the importer's format
pub fn segments_csv(rows: &[(&str, &str, u64, u64, f64, u32)]) -> String {
    let mut text =
        String::from("Match Name,Chromosome,Start Location,End Location,Centimorgans,Matching SNPs\n");
    for (name, chr, start, end, cm, snps) in rows {
        text.push_str(&format!("{name},{chr},{start},{end},{cm},{snps}\n"));
    }
    text
}
