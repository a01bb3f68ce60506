//! Reading segment tables exported by testing services.
//!
//! The format is header driven: the six required columns may appear in any
//! order and unknown columns are ignored. Rows that cannot be turned into a
//! segment are skipped and reported as [`DataQualityIssue`]s.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{bail, Context, Result};
use flate2::read::MultiGzDecoder;
use log::{debug, warn};

use crate::delimited::RecordReader;
use crate::error::{DataQualityIssue, IssueKind};
use crate::segment::{Chromosome, Segment};

pub const MATCH_NAME: &str = "Match Name";
pub const CHROMOSOME: &str = "Chromosome";
pub const START_LOCATION: &str = "Start Location";
pub const END_LOCATION: &str = "End Location";
pub const CENTIMORGANS: &str = "Centimorgans";
pub const MATCHING_SNPS: &str = "Matching SNPs";

pub const REQUIRED_COLUMNS: [&str; 6] = [
    MATCH_NAME,
    CHROMOSOME,
    START_LOCATION,
    END_LOCATION,
    CENTIMORGANS,
    MATCHING_SNPS,
];

const FAMILY_COLUMNS: [&str; 3] = ["Surname", "Family", "Family Name"];
const MATCH_ID_COLUMNS: [&str; 2] = ["Match ID", "MatchID"];

const NAME_TITLES: [&str; 4] = ["Mr.", "Mrs.", "Dr.", "Ph.D."];

/// Open a segment table, decompressing `.gz` inputs transparently
pub fn open_segment_input<P: AsRef<Path>>(path: P) -> Result<Box<dyn BufRead>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;

    let is_compressed = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false);

    if is_compressed {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Family name guessed from a match name: the last word once honorifics are
/// removed. An empty name has no family.
pub fn infer_family(match_name: &str) -> Option<String> {
    let mut cleaned = match_name.to_string();
    for title in NAME_TITLES {
        cleaned = cleaned.replace(title, "");
    }
    cleaned.split_whitespace().last().map(str::to_string)
}

/// Positions of the recognised columns in a header row
#[derive(Debug, Clone, PartialEq, Eq)]
struct ColumnMap {
    name: usize,
    chromosome: usize,
    start: usize,
    end: usize,
    cm: usize,
    snps: usize,
    family: Option<usize>,
    match_id: Option<usize>,
}

impl ColumnMap {
    fn from_header(header: &[String]) -> Result<Self> {
        let normalized: Vec<String> = header
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_ascii_lowercase())
            .collect();
        let find = |wanted: &str| normalized.iter().position(|h| h == &wanted.to_ascii_lowercase());
        let find_any = |names: &[&str]| names.iter().find_map(|n| find(n));

        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|c| find(c).is_none())
            .collect();
        if !missing.is_empty() {
            bail!("missing required columns: {}", missing.join(", "));
        }

        // Presence checked above
        let col = |c: &str| find(c).unwrap_or_default();
        Ok(ColumnMap {
            name: col(MATCH_NAME),
            chromosome: col(CHROMOSOME),
            start: col(START_LOCATION),
            end: col(END_LOCATION),
            cm: col(CENTIMORGANS),
            snps: col(MATCHING_SNPS),
            family: find_any(&FAMILY_COLUMNS),
            match_id: find_any(&MATCH_ID_COLUMNS),
        })
    }
}

/// Everything read from one table
#[derive(Debug, Clone, Default)]
pub struct ImportOutcome {
    pub source: String,
    pub segments: Vec<Segment>,
    pub issues: Vec<DataQualityIssue>,
    /// Data rows seen, including skipped ones
    pub rows: usize,
}

fn field<'a>(record: &'a [String], idx: usize, name: &'static str) -> Result<&'a str, IssueKind> {
    match record.get(idx).map(|v| v.trim()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(IssueKind::MissingField(name)),
    }
}

/// Numbers may carry thousands separators ("12,345,678")
fn strip_number(value: &str) -> String {
    value.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect()
}

fn parse_count(value: &str, name: &'static str) -> Result<u64, IssueKind> {
    let cleaned = strip_number(value);
    if let Ok(n) = cleaned.parse::<u64>() {
        return Ok(n);
    }
    // Spreadsheets sometimes write integers as "1234.0"
    match cleaned.parse::<f64>() {
        Ok(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => Ok(f as u64),
        _ => Err(IssueKind::NonNumeric {
            field: name,
            value: value.to_string(),
        }),
    }
}

fn parse_cm(value: &str) -> Result<f64, IssueKind> {
    match strip_number(value).parse::<f64>() {
        Ok(cm) if cm.is_finite() && cm >= 0.0 => Ok(cm),
        _ => Err(IssueKind::NonNumeric {
            field: CENTIMORGANS,
            value: value.to_string(),
        }),
    }
}

fn parse_row(record: &[String], columns: &ColumnMap) -> Result<Segment, IssueKind> {
    let name = field(record, columns.name, MATCH_NAME)?;
    let chromosome_text = field(record, columns.chromosome, CHROMOSOME)?;
    let chromosome: Chromosome = chromosome_text
        .parse()
        .map_err(|_| IssueKind::UnknownChromosome(chromosome_text.to_string()))?;
    let start_bp = parse_count(field(record, columns.start, START_LOCATION)?, START_LOCATION)?;
    let end_bp = parse_count(field(record, columns.end, END_LOCATION)?, END_LOCATION)?;
    let length_cm = parse_cm(field(record, columns.cm, CENTIMORGANS)?)?;
    let snps = parse_count(field(record, columns.snps, MATCHING_SNPS)?, MATCHING_SNPS)?;
    let snp_count = u32::try_from(snps).map_err(|_| IssueKind::NonNumeric {
        field: MATCHING_SNPS,
        value: snps.to_string(),
    })?;

    // An explicit family column wins, even when the cell is blank
    let family = match columns.family {
        Some(idx) => record
            .get(idx)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string),
        None => infer_family(name),
    };

    let mut segment =
        Segment::new(name, chromosome, start_bp, end_bp, length_cm, snp_count).with_family(family);
    if let Some(id) = columns
        .match_id
        .and_then(|idx| record.get(idx))
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
    {
        segment = segment.with_match_id(id);
    }
    Ok(segment)
}

/// Read every segment row of one table
///
/// Only an unreadable stream or a header without the required columns fails;
/// bad rows are skipped with a warning and listed in the outcome.
pub fn read_segments<R: BufRead>(reader: R, source: &str) -> Result<ImportOutcome> {
    let mut records = RecordReader::detecting(reader);
    let mut outcome = ImportOutcome {
        source: source.to_string(),
        ..Default::default()
    };

    let Some((_, header)) = records
        .next_record()
        .with_context(|| format!("Failed to read header of {source}"))?
    else {
        debug!("{source} is empty");
        return Ok(outcome);
    };
    let columns = ColumnMap::from_header(&header).with_context(|| format!("Invalid header in {source}"))?;

    while let Some((line, record)) = records
        .next_record()
        .with_context(|| format!("Failed to read {source}"))?
    {
        outcome.rows += 1;
        match parse_row(&record, &columns) {
            Ok(segment) => outcome.segments.push(segment),
            Err(kind) => {
                let name = record.get(columns.name).map(|v| v.trim()).unwrap_or_default();
                let issue = DataQualityIssue::new(name, kind).at(source, line);
                warn!("Skipping row {issue}");
                outcome.issues.push(issue);
            }
        }
    }

    debug!(
        "Read {} segments from {} rows of {} ({} skipped)",
        outcome.segments.len(),
        outcome.rows,
        source,
        outcome.issues.len()
    );
    Ok(outcome)
}

/// Open and read one table from disk
pub fn read_segment_file<P: AsRef<Path>>(path: P) -> Result<ImportOutcome> {
    let path = path.as_ref();
    let reader = open_segment_input(path)?;
    read_segments(reader, &path.display().to_string())
}
