use std::collections::BTreeMap;

use crate::review::aggregator::{DemotionReason, MergedFinding};
use crate::review::finding::Severity;

/// Render the markdown body for one inline comment group. Groups hold one or
/// more merged findings anchored to the same line; multiple entries are
/// separated by a horizontal rule.
pub(crate) fn render_comment(merged: &[MergedFinding]) -> String {
    let mut out = String::new();

    for (i, m) in merged.iter().enumerate() {
        if i > 0 {
            out.push_str("\n---\n\n");
        }
        out.push_str(&format!(
            "**{}** | {}\n\n",
            m.finding.tool.to_uppercase(),
            m.finding.severity.label()
        ));
        if let Some(rule) = &m.finding.rule {
            out.push_str(&format!("`{}` ", rule));
        }
        out.push_str(&m.finding.message);
        out.push('\n');
        if let Some(suggestion) = &m.finding.suggestion {
            out.push_str(&format!("\n```suggestion\n{}\n```\n", suggestion));
        }
        out.push_str(&format!(
            "\nConfidence: {} {:.0}%",
            confidence_bar(m.finding.confidence),
            m.finding.confidence * 100.0
        ));
        if m.sources > 1 {
            out.push_str(&format!(" (reported by {} checks)", m.sources));
        }
        out.push('\n');
    }

    out
}

/// Render the top-level review summary. Deterministic: no timestamps, no
/// randomized ordering.
pub(crate) fn render_summary(
    score: u8,
    shown: usize,
    ranked: &[&MergedFinding],
    overflow: &[&MergedFinding],
    demoted: &[(MergedFinding, DemotionReason)],
) -> String {
    let mut out = String::new();

    out.push_str("# PR Review Report\n\n");
    out.push_str(&format!("**Quality score: {}/100**\n\n", score));

    if ranked.is_empty() {
        out.push_str("No issues found. \u{2705}\n");
        return out;
    }

    out.push_str(&format!(
        "{} issue(s) found, {} posted as inline comments.\n\n",
        ranked.len(),
        shown
    ));

    out.push_str("## By Severity\n\n");
    for severity in [Severity::Error, Severity::Warning, Severity::Info] {
        let count = ranked
            .iter()
            .filter(|m| m.finding.severity == severity)
            .count();
        if count > 0 {
            out.push_str(&format!("- {}: {}\n", severity.label(), count));
        }
    }
    out.push('\n');

    out.push_str("## By Tool\n\n");
    let mut by_tool: BTreeMap<&str, usize> = BTreeMap::new();
    for m in ranked {
        *by_tool.entry(m.finding.tool.as_str()).or_default() += 1;
    }
    for (tool, count) in by_tool {
        out.push_str(&format!("- {}: {}\n", tool, count));
    }
    out.push('\n');

    out.push_str("## High Priority\n\n");
    for m in ranked.iter().take(5) {
        let location = match m.finding.line {
            Some(line) => format!("{}:{}", m.finding.file, line),
            None => m.finding.file.clone(),
        };
        out.push_str(&format!(
            "- **{}** `{}` {}\n",
            m.finding.severity.label(),
            location,
            m.finding.message
        ));
    }
    out.push('\n');

    if !overflow.is_empty() {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for m in overflow {
            *counts.entry(m.finding.severity.label()).or_default() += 1;
        }
        let breakdown: Vec<String> = counts
            .iter()
            .map(|(label, n)| format!("{} {}", n, label.to_lowercase()))
            .collect();
        out.push_str(&format!(
            "> {} further issue(s) not shown inline ({}).\n\n",
            overflow.len(),
            breakdown.join(", ")
        ));
    }

    if !demoted.is_empty() {
        out.push_str("## Issues Outside the Diff\n\n");
        out.push_str("These could not be attached to a changed line:\n\n");
        for (m, reason) in demoted {
            let location = match m.finding.line {
                Some(line) => format!("{}:{}", m.finding.file, line),
                None => m.finding.file.clone(),
            };
            out.push_str(&format!(
                "- **{}** `{}` {} _({})_\n",
                m.finding.severity.label(),
                location,
                m.finding.message,
                demotion_label(*reason)
            ));
        }
        out.push('\n');
    }

    out.push_str("---\n*Automated review. Verify findings before acting on them.*\n");
    out
}

fn demotion_label(reason: DemotionReason) -> &'static str {
    match reason {
        DemotionReason::NoLine => "file-level issue",
        DemotionReason::LineNotInDiff => "line not in diff",
        DemotionReason::UnmappedFile => "file not in diff",
    }
}

fn confidence_bar(confidence: f32) -> String {
    let filled = ((confidence * 5.0).round() as usize).min(5);
    format!("{}{}", "\u{2593}".repeat(filled), "\u{2591}".repeat(5 - filled))
}
