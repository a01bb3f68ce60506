//! Flat tabular export of ranked groups and its reader.
//!
//! One row per (group, member), group rows contiguous and in rank order.
//! Reading an export back and rebuilding the groups yields the same groups
//! that were written.

use std::io::{BufRead, Write};

use anyhow::{anyhow, bail, Context, Result};

use crate::delimited::{write_record, RecordReader};
use crate::group::{GroupAggregator, TriangulationGroup};
use crate::segment::{Chromosome, Segment};

pub const EXPORT_HEADER: [&str; 10] = [
    "Group_ID",
    "Group_Size",
    "Match_Name",
    "Surname",
    "Chromosome",
    "Start_Location",
    "End_Location",
    "Centimorgans",
    "Matching_SNPs",
    "Match_ID",
];

/// Columns a reader cannot do without; Match_ID defaults to the name
const REQUIRED: usize = 9;

/// Write every member of every group; returns the number of rows written
pub fn write_export<W: Write + ?Sized>(out: &mut W, groups: &[TriangulationGroup], delimiter: char) -> Result<usize> {
    write_record(out, &EXPORT_HEADER, delimiter)?;
    let mut rows = 0;
    for group in groups {
        for member in &group.members {
            let row = [
                group.group_id.to_string(),
                group.size().to_string(),
                member.display_name.clone(),
                member.family().name().unwrap_or_default().to_string(),
                member.chromosome.to_string(),
                member.start_bp.to_string(),
                member.end_bp.to_string(),
                member.length_cm.to_string(),
                member.snp_count.to_string(),
                member.match_id.clone(),
            ];
            write_record(out, &row, delimiter)?;
            rows += 1;
        }
    }
    Ok(rows)
}

/// One group as read back from an export
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedGroup {
    pub group_id: usize,
    pub group_size: usize,
    pub chromosome: Chromosome,
    pub members: Vec<Segment>,
}

fn column_positions(header: &[String]) -> Result<Vec<Option<usize>>> {
    let positions: Vec<Option<usize>> = EXPORT_HEADER
        .iter()
        .map(|name| header.iter().position(|h| h.trim().eq_ignore_ascii_case(name)))
        .collect();
    let missing: Vec<&str> = EXPORT_HEADER[..REQUIRED]
        .iter()
        .zip(&positions)
        .filter(|(_, pos)| pos.is_none())
        .map(|(name, _)| *name)
        .collect();
    if !missing.is_empty() {
        bail!("export is missing columns: {}", missing.join(", "));
    }
    Ok(positions)
}

fn parse_field<T: std::str::FromStr>(record: &[String], pos: Option<usize>, name: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    let raw = pos
        .and_then(|p| record.get(p))
        .ok_or_else(|| anyhow!("missing {name}"))?;
    raw.trim()
        .parse()
        .map_err(|e| anyhow!("invalid {name} '{raw}': {e}"))
}

/// Parse an export back into groups, checking contiguity and declared sizes
pub fn read_export<R: BufRead>(reader: R) -> Result<Vec<ExportedGroup>> {
    let mut records = RecordReader::detecting(reader);
    let Some((_, header)) = records.next_record()? else {
        return Ok(Vec::new());
    };
    let cols = column_positions(&header)?;

    let mut groups: Vec<ExportedGroup> = Vec::new();
    while let Some((line, record)) = records.next_record()? {
        let group_id: usize = parse_field(&record, cols[0], EXPORT_HEADER[0]).with_context(|| format!("line {line}"))?;
        let group_size: usize =
            parse_field(&record, cols[1], EXPORT_HEADER[1]).with_context(|| format!("line {line}"))?;
        let name: String = parse_field(&record, cols[2], EXPORT_HEADER[2]).with_context(|| format!("line {line}"))?;
        let surname = cols[3].and_then(|p| record.get(p)).map(|s| s.trim()).unwrap_or_default();
        let chromosome: Chromosome =
            parse_field(&record, cols[4], EXPORT_HEADER[4]).with_context(|| format!("line {line}"))?;
        let start_bp: u64 = parse_field(&record, cols[5], EXPORT_HEADER[5]).with_context(|| format!("line {line}"))?;
        let end_bp: u64 = parse_field(&record, cols[6], EXPORT_HEADER[6]).with_context(|| format!("line {line}"))?;
        let length_cm: f64 = parse_field(&record, cols[7], EXPORT_HEADER[7]).with_context(|| format!("line {line}"))?;
        let snp_count: u32 = parse_field(&record, cols[8], EXPORT_HEADER[8]).with_context(|| format!("line {line}"))?;
        let match_id = cols[9]
            .and_then(|p| record.get(p))
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .unwrap_or(name.as_str())
            .to_string();

        let family = (!surname.is_empty()).then(|| surname.to_string());
        let member = Segment::new(&name, chromosome, start_bp, end_bp, length_cm, snp_count)
            .with_family(family)
            .with_match_id(&match_id);

        match groups.last_mut() {
            Some(current) if current.group_id == group_id => {
                if current.chromosome != chromosome {
                    bail!("line {line}: group {group_id} spans chromosomes {} and {chromosome}", current.chromosome);
                }
                if current.group_size != group_size {
                    bail!("line {line}: group {group_id} declares sizes {} and {group_size}", current.group_size);
                }
                current.members.push(member);
            }
            _ => {
                if groups.iter().any(|g| g.group_id == group_id) {
                    bail!("line {line}: rows of group {group_id} are not contiguous");
                }
                groups.push(ExportedGroup {
                    group_id,
                    group_size,
                    chromosome,
                    members: vec![member],
                });
            }
        }
    }

    for group in &groups {
        if group.members.len() != group.group_size {
            bail!(
                "group {} declares {} members but has {}",
                group.group_id,
                group.group_size,
                group.members.len()
            );
        }
    }
    Ok(groups)
}

/// Recompute full groups (statistics, family buckets) from exported rows
pub fn rebuild_groups(exported: Vec<ExportedGroup>, aggregator: &GroupAggregator) -> Vec<TriangulationGroup> {
    exported
        .into_iter()
        .map(|g| {
            let mut group = aggregator.build_group(g.chromosome, g.members);
            group.group_id = g.group_id;
            group
        })
        .collect()
}
