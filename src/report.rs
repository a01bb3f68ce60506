/// Ranking and human-readable rendering of triangulation groups
use std::cmp::{Ordering, Reverse};
use std::fmt::Write;

use ordered_float::OrderedFloat;

use crate::group::{FamilyMix, TriangulationGroup};
use crate::params::BP_PER_MB;

/// Groups larger than this only list the strongest few members per family
pub const FULL_LISTING_LIMIT: usize = 20;
pub const MEMBERS_PER_FAMILY_WHEN_LARGE: usize = 5;

const RULE_WIDTH: usize = 60;

/// Ranking order: size desc, total cM desc, chromosome asc, span start asc,
/// then span end asc and first member id for a total order
pub fn compare_groups(a: &TriangulationGroup, b: &TriangulationGroup) -> Ordering {
    let key = |g: &TriangulationGroup| {
        (
            Reverse(g.size()),
            Reverse(OrderedFloat(g.total_cm)),
            g.chromosome,
            g.span.0,
            g.span.1,
        )
    };
    key(a).cmp(&key(b)).then_with(|| {
        let first = |g: &TriangulationGroup| g.members.first().map(|m| m.match_id.clone());
        first(a).cmp(&first(b))
    })
}

/// Sort groups into report order and number them from 1
pub fn rank_groups(groups: &mut [TriangulationGroup]) {
    groups.sort_by(compare_groups);
    for (rank, group) in groups.iter_mut().enumerate() {
        group.group_id = rank + 1;
    }
}

/// Format an integer with comma thousands separators
pub fn with_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Options for the full report
#[derive(Debug, Clone, Default)]
pub struct ReportOptions {
    /// Noted in the header when positive
    pub min_cm: f64,
    /// Extra lines printed under the header (usually the run summary)
    pub preamble: Option<String>,
}

/// Hierarchical report: one block per ranked group with members by family
pub fn render_report(groups: &[TriangulationGroup], options: &ReportOptions) -> String {
    let mut out = String::new();
    let rule = "=".repeat(RULE_WIDTH);
    let thin_rule = "-".repeat(RULE_WIDTH);

    // Writing to a String cannot fail, so results are ignored throughout
    let _ = writeln!(out, "DNA TRIANGULATION GROUPS - SORTED BY SIZE");
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "(Largest groups first)");
    if options.min_cm > 0.0 {
        let _ = writeln!(out, "(Filtered to show only matches >= {} cM)", options.min_cm);
    }
    let _ = writeln!(out);

    if let Some(preamble) = &options.preamble {
        let _ = writeln!(out, "{}", preamble.trim_end());
        let _ = writeln!(out);
    }

    if groups.is_empty() {
        let _ = writeln!(out, "No triangulation groups found.");
        return out;
    }

    let _ = writeln!(out, "SUMMARY: Found {} triangulation groups", groups.len());
    let largest = groups.iter().map(|g| g.size()).max().unwrap_or(0);
    let smallest = groups.iter().map(|g| g.size()).min().unwrap_or(0);
    let _ = writeln!(out, "Largest group: {largest} people");
    let _ = writeln!(out, "Smallest group: {smallest} people");
    let _ = writeln!(out);
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out);

    for group in groups {
        render_group(&mut out, group);
        let _ = writeln!(out);
        let _ = writeln!(out, "{thin_rule}");
        let _ = writeln!(out);
    }

    out
}

fn render_group(out: &mut String, group: &TriangulationGroup) {
    let _ = writeln!(
        out,
        "RANK #{}: {} PEOPLE SHARE DNA HERE",
        group.group_id,
        group.size()
    );
    let _ = writeln!(
        out,
        "Location: Chromosome {}, {} - {} bp ({:.1} Mb)",
        group.chromosome,
        with_thousands(group.span.0),
        with_thousands(group.span.1),
        group.span_mb()
    );
    let _ = writeln!(
        out,
        "Strength: Average {:.1} cM per person, Total {:.1} cM",
        group.avg_cm, group.total_cm
    );
    if group.possibly_spurious {
        let _ = writeln!(
            out,
            "WARNING: span of {:.1} Mb is unusually long; this group may be spurious (try a larger minimum overlap)",
            group.span_mb()
        );
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "PEOPLE IN THIS GROUP (by family name):");

    let large = group.size() > FULL_LISTING_LIMIT;
    for bucket in &group.families {
        let _ = writeln!(
            out,
            "  {} family ({} people):",
            bucket.family,
            bucket.members.len()
        );
        for (i, member) in bucket.members.iter().enumerate() {
            if large && i == MEMBERS_PER_FAMILY_WHEN_LARGE {
                let _ = writeln!(
                    out,
                    "    ... and {} more {} family members",
                    bucket.members.len() - MEMBERS_PER_FAMILY_WHEN_LARGE,
                    bucket.family
                );
                break;
            }
            let _ = writeln!(
                out,
                "    * {} ({:.1} cM, {:.1}-{:.1}Mb, {} SNPs)",
                member.display_name,
                member.length_cm,
                member.start_bp as f64 / BP_PER_MB,
                member.end_bp as f64 / BP_PER_MB,
                with_thousands(u64::from(member.snp_count))
            );
        }
    }

    let _ = writeln!(out);
    match group.family_mix() {
        FamilyMix::Single(family) => {
            let _ = writeln!(
                out,
                "  -> SUGGESTION: This appears to be a pure {family} ancestral line"
            );
        }
        FamilyMix::Mixed(families) => {
            let names: Vec<String> = families.iter().map(|f| f.to_string()).collect();
            let _ = writeln!(
                out,
                "  -> SUGGESTION: Mixed families ({}); may be an ancestor shared by these families",
                names.join(", ")
            );
        }
    }
}

/// One line per group for quick review
pub fn render_quick_list(groups: &[TriangulationGroup]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "QUICK GROUP SUMMARY (Largest First)");
    let _ = writeln!(out, "{}", "=".repeat(50));
    if groups.is_empty() {
        let _ = writeln!(out, "No triangulation groups found.");
        return out;
    }

    for group in groups {
        let mix = match group.family_mix() {
            FamilyMix::Single(family) => format!("{} ({})", family, group.size()),
            FamilyMix::Mixed(families) => format!("Mixed: {} families", families.len()),
        };
        let flag = if group.possibly_spurious { " | possibly spurious" } else { "" };
        let _ = writeln!(
            out,
            "{:2}. {:3} people | Chr {:>2} | {:5.1} Mb | {}{}",
            group.group_id,
            group.size(),
            group.chromosome.to_string(),
            group.span_mb(),
            mix,
            flag
        );
    }
    out
}
