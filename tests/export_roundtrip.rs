//! Exported groups read back into the same group structure
mod common;

use std::io::Cursor;

use pretty_assertions::assert_eq;
use trisweep::export::{read_export, rebuild_groups, write_export};
use trisweep::{Algorithm, Chromosome, FilterParams, GroupAggregator, Segment, TriangulationConfig, TriangulationEngine};

use common::synthetic_segments;

fn run_groups(segments: Vec<Segment>) -> Vec<trisweep::TriangulationGroup> {
    let config = TriangulationConfig::new(FilterParams::default().with_min_overlap_mb(2.0))
        .with_algorithm(Algorithm::Parallel);
    TriangulationEngine::new(config)
        .unwrap()
        .run_segments(segments)
        .unwrap()
        .groups
}

#[test]
fn synthetic_run_round_trips() {
    let groups = run_groups(synthetic_segments(99, 500, 6));
    assert!(groups.len() > 5, "fixture should produce several groups");

    for delimiter in [',', '\t'] {
        let mut buf = Vec::new();
        let rows = write_export(&mut buf, &groups, delimiter).unwrap();
        assert_eq!(rows, groups.iter().map(|g| g.size()).sum::<usize>());

        let exported = read_export(Cursor::new(buf)).unwrap();
        let ids: Vec<usize> = exported.iter().map(|g| g.group_id).collect();
        assert_eq!(ids, (1..=groups.len()).collect::<Vec<_>>());

        let rebuilt = rebuild_groups(exported, &GroupAggregator::default());
        assert_eq!(rebuilt, groups);
    }
}

#[test]
fn awkward_names_survive() {
    let chr = Chromosome::Autosome(12);
    let segments = vec![
        Segment::new("O'Brien, \"Pat\"", chr, 1_000_000, 9_000_000, 18.5, 1400)
            .with_family(Some("O'Brien".into())),
        Segment::new("Multi\nLine Name", chr, 2_000_000, 10_000_000, 16.25, 1300),
        Segment::new("Windows\r\nLine Name", chr, 4_000_000, 12_000_000, 9.5, 900),
        Segment::new("Tab\tName", chr, 3_000_000, 11_000_000, 12.0, 1000)
            .with_match_id("kit-0042")
            .with_family(Some("Van der Berg".into())),
    ];
    let groups = run_groups(segments);
    assert_eq!(groups.len(), 1);

    for delimiter in [',', '\t'] {
        let mut buf = Vec::new();
        write_export(&mut buf, &groups, delimiter).unwrap();
        let rebuilt = rebuild_groups(read_export(Cursor::new(buf)).unwrap(), &GroupAggregator::default());
        assert_eq!(rebuilt, groups);
    }
}

#[test]
fn empty_export_round_trips() {
    let mut buf = Vec::new();
    assert_eq!(write_export(&mut buf, &[], ',').unwrap(), 0);
    assert!(read_export(Cursor::new(buf)).unwrap().is_empty());
}
