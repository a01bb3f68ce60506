/// Step-by-step trace of a reference clustering run
use std::fmt::Write;

use crate::segment::{Chromosome, Segment};

/// One recorded decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditEvent {
    ChromosomeStart {
        chromosome: Chromosome,
        segments: usize,
    },
    Compare {
        a: usize,
        b: usize,
        overlap_bp: u64,
        required_bp: u64,
        linked: bool,
    },
    Union {
        a: usize,
        b: usize,
        merged: bool,
    },
    ChromosomeSkipped {
        chromosome: Chromosome,
        reason: String,
    },
}

/// Ordered list of audit events, indices refer to the clustered segment slice
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditLog {
    events: Vec<AuditEvent>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: AuditEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[AuditEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn comparisons(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, AuditEvent::Compare { .. }))
            .count()
    }

    pub fn merges(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, AuditEvent::Union { merged: true, .. }))
            .count()
    }

    /// Human-readable trace, naming segments from the slice that was clustered
    pub fn render(&self, segments: &[Segment]) -> String {
        let mut out = String::new();
        let describe = |idx: usize| match segments.get(idx) {
            Some(s) => format!("{} [{}-{}]", s.display_name, s.start_bp, s.end_bp),
            None => format!("#{idx}"),
        };

        for event in &self.events {
            // Writing to a String cannot fail
            let _ = match event {
                AuditEvent::ChromosomeStart {
                    chromosome,
                    segments,
                } => writeln!(out, "Chromosome {chromosome}: {segments} segments"),
                AuditEvent::Compare {
                    a,
                    b,
                    overlap_bp,
                    required_bp,
                    linked,
                } => writeln!(
                    out,
                    "  compare {} with {}: overlap {} bp, required {} bp -> {}",
                    describe(*a),
                    describe(*b),
                    overlap_bp,
                    required_bp,
                    if *linked { "linked" } else { "not linked" }
                ),
                AuditEvent::Union { a, b, merged } => writeln!(
                    out,
                    "  union {} + {}: {}",
                    describe(*a),
                    describe(*b),
                    if *merged { "merged" } else { "already connected" }
                ),
                AuditEvent::ChromosomeSkipped { chromosome, reason } => {
                    writeln!(out, "Chromosome {chromosome}: skipped ({reason})")
                }
            };
        }
        out
    }
}
