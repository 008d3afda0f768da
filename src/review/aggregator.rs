use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::diff::{self, Address, CommentTarget, DiffFile, PositionScheme};
use crate::review::finding::{Finding, Severity};
use crate::review::report;

/// Per-severity score penalties. Policy knobs, exposed through config rather
/// than hard-coded (see ReviewConfig).
#[derive(Debug, Clone)]
pub struct SeverityPenalties {
    pub error: u32,
    pub warning: u32,
    pub info: u32,
}

impl Default for SeverityPenalties {
    fn default() -> Self {
        Self {
            error: 10,
            warning: 3,
            info: 1,
        }
    }
}

impl SeverityPenalties {
    fn penalty(&self, severity: Severity) -> u32 {
        match severity {
            Severity::Error => self.error,
            Severity::Warning => self.warning,
            Severity::Info => self.info,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AggregateOptions {
    pub max_comments: usize,
    pub scheme: PositionScheme,
    pub min_confidence: f32,
    pub similarity_threshold: f64,
    pub penalties: SeverityPenalties,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            max_comments: 20,
            scheme: PositionScheme::Position,
            min_confidence: 0.0,
            similarity_threshold: 0.8,
            penalties: SeverityPenalties::default(),
        }
    }
}

/// A finding group resolved to a postable inline location.
#[derive(Debug, Clone, Serialize)]
pub struct PositionedComment {
    pub file: String,
    pub address: Address,
    pub severity: Severity,
    pub body: String,
}

/// The complete outcome of one review: positioned inline comments, a summary
/// body, and the quality score. Immutable once returned.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewResult {
    pub comments: Vec<PositionedComment>,
    pub summary: String,
    pub score: u8,
}

/// A finding after near-duplicate merging. Keeps the highest severity and
/// confidence of its sources and the earliest input index for tie-breaks.
#[derive(Debug, Clone)]
pub(crate) struct MergedFinding {
    pub finding: Finding,
    pub sources: usize,
    pub order: usize,
}

/// Why a merged finding was demoted to the summary instead of an inline
/// comment. Demoted findings still count toward the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DemotionReason {
    NoLine,
    LineNotInDiff,
    UnmappedFile,
}

struct Group {
    file: String,
    address: Address,
    merged: Vec<MergedFinding>,
}

/// Merge, position, budget, and score a finding set against a parsed diff.
///
/// Pure and deterministic: identical inputs produce byte-identical results.
/// Individual findings never make this fail; unresolvable ones are demoted
/// to the summary, not dropped.
pub fn aggregate(
    findings: &[Finding],
    diff: &[DiffFile],
    opts: &AggregateOptions,
) -> ReviewResult {
    // 1. confidence floor, preserving input order
    let kept: Vec<(usize, &Finding)> = findings
        .iter()
        .enumerate()
        .filter(|(_, f)| f.confidence >= opts.min_confidence)
        .collect();

    // 2. group by (file, target line); BTreeMap keeps iteration deterministic
    let mut by_location: BTreeMap<(String, Option<u32>), Vec<(usize, &Finding)>> =
        BTreeMap::new();
    for (i, f) in kept {
        by_location
            .entry((f.file.clone(), f.line))
            .or_default()
            .push((i, f));
    }

    // 3./4. dedupe each group, then resolve it to an address or demote it
    let mut groups: Vec<Group> = Vec::new();
    let mut demoted: Vec<(MergedFinding, DemotionReason)> = Vec::new();

    for ((file, line), members) in by_location {
        let mut merged = dedupe(members, opts.similarity_threshold);
        merged.sort_by(rank_merged);

        let Some(line) = line else {
            demoted.extend(merged.into_iter().map(|m| (m, DemotionReason::NoLine)));
            continue;
        };

        match diff::find_file(diff, &file) {
            None => {
                demoted.extend(
                    merged
                        .into_iter()
                        .map(|m| (m, DemotionReason::UnmappedFile)),
                );
            }
            Some(df) => match diff::resolve(df, CommentTarget::Line(line), opts.scheme)
            {
                Ok(address) => groups.push(Group {
                    file,
                    address,
                    merged,
                }),
                Err(_) => {
                    demoted.extend(
                        merged
                            .into_iter()
                            .map(|m| (m, DemotionReason::LineNotInDiff)),
                    );
                }
            },
        }
    }

    // 5. budget: rank groups globally by their best finding, truncate
    groups.sort_by(|a, b| rank_merged(&a.merged[0], &b.merged[0]));
    let shown = groups.len().min(opts.max_comments);
    let overflow: Vec<&MergedFinding> = groups[shown..]
        .iter()
        .flat_map(|g| g.merged.iter())
        .collect();

    // 6. score over every surviving merged finding, shown inline or not
    let mut penalty: i64 = 0;
    for m in groups.iter().flat_map(|g| g.merged.iter()) {
        penalty += i64::from(opts.penalties.penalty(m.finding.severity));
    }
    for (m, _) in &demoted {
        penalty += i64::from(opts.penalties.penalty(m.finding.severity));
    }
    let score = (100 - penalty).clamp(0, 100) as u8;

    let mut ranked: Vec<&MergedFinding> = groups
        .iter()
        .flat_map(|g| g.merged.iter())
        .chain(demoted.iter().map(|(m, _)| m))
        .collect();
    ranked.sort_by(|a, b| rank_merged(a, b));

    let summary = report::render_summary(
        score,
        shown,
        &ranked,
        &overflow,
        &demoted,
    );

    let comments = groups[..shown]
        .iter()
        .map(|g| PositionedComment {
            file: g.file.clone(),
            address: g.address,
            severity: g.merged[0].finding.severity,
            body: report::render_comment(&g.merged),
        })
        .collect();

    ReviewResult {
        comments,
        summary,
        score,
    }
}

/// Severity descending, confidence descending, then original input order.
fn rank_merged(a: &MergedFinding, b: &MergedFinding) -> Ordering {
    b.finding
        .severity
        .cmp(&a.finding.severity)
        .then(
            b.finding
                .confidence
                .partial_cmp(&a.finding.confidence)
                .unwrap_or(Ordering::Equal),
        )
        .then(a.order.cmp(&b.order))
}

fn dedupe(members: Vec<(usize, &Finding)>, threshold: f64) -> Vec<MergedFinding> {
    let mut merged: Vec<MergedFinding> = Vec::new();

    'next: for (i, f) in members {
        for m in merged.iter_mut() {
            if jaccard(&m.finding.message, &f.message) >= threshold {
                if f.severity > m.finding.severity {
                    m.finding.severity = f.severity;
                }
                if f.confidence > m.finding.confidence {
                    m.finding.confidence = f.confidence;
                }
                if let Some(s) = &f.suggestion {
                    match &mut m.finding.suggestion {
                        None => m.finding.suggestion = Some(s.clone()),
                        Some(existing) if existing != s => {
                            existing.push_str("\n\n");
                            existing.push_str(s);
                        }
                        _ => {}
                    }
                }
                m.sources += 1;
                continue 'next;
            }
        }
        merged.push(MergedFinding {
            finding: f.clone(),
            sources: 1,
            order: i,
        });
    }

    merged
}

/// Token-set Jaccard similarity: case-insensitive, punctuation-stripped.
pub(crate) fn jaccard(a: &str, b: &str) -> f64 {
    let ta = tokens(a);
    let tb = tokens(b);
    if ta.is_empty() && tb.is_empty() {
        return 1.0;
    }
    let intersection = ta.intersection(&tb).count();
    let union = ta.union(&tb).count();
    intersection as f64 / union as f64
}

fn tokens(s: &str) -> HashSet<String> {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::parse_diff;
    use crate::review::finding::{FindingOrigin, AI_CONFIDENCE, STATIC_CONFIDENCE};

    fn finding(
        origin: FindingOrigin,
        file: &str,
        line: Option<u32>,
        severity: Severity,
        confidence: f32,
        message: &str,
    ) -> Finding {
        Finding {
            origin,
            tool: match origin {
                FindingOrigin::Static => "flake8".into(),
                FindingOrigin::Ai => "gemini".into(),
                FindingOrigin::Security => "security_patterns".into(),
            },
            file: file.into(),
            line,
            severity,
            confidence,
            message: message.into(),
            suggestion: None,
            rule: None,
        }
    }

    /// Two files: the first contributes diff positions 1-4, then a.py adds
    /// target lines 10-12 at positions 5-7.
    fn two_file_diff() -> Vec<crate::diff::DiffFile> {
        let diff = "\
--- a/lead.py
+++ b/lead.py
@@ -1,2 +1,3 @@
 keep
-old
+new
+more
--- a/a.py
+++ b/a.py
@@ -9,0 +10,3 @@
+line ten
+line eleven
+line twelve
";
        parse_diff(diff).unwrap()
    }

    #[test]
    fn near_duplicates_merge_keeping_higher_severity() {
        let diff = two_file_diff();
        let findings = vec![
            finding(
                FindingOrigin::Static,
                "a.py",
                Some(11),
                Severity::Error,
                STATIC_CONFIDENCE,
                "Missing null check on `x`",
            ),
            finding(
                FindingOrigin::Ai,
                "a.py",
                Some(11),
                Severity::Warning,
                AI_CONFIDENCE,
                "missing null check on x",
            ),
        ];
        let result = aggregate(&findings, &diff, &AggregateOptions::default());

        assert_eq!(result.comments.len(), 1);
        let comment = &result.comments[0];
        assert_eq!(comment.file, "a.py");
        assert_eq!(comment.address, Address::Position(6));
        assert_eq!(comment.severity, Severity::Error);
        // one error after the merge: 100 - 10
        assert_eq!(result.score, 90);
    }

    #[test]
    fn line_scheme_resolves_to_target_line() {
        let diff = two_file_diff();
        let findings = vec![finding(
            FindingOrigin::Static,
            "a.py",
            Some(11),
            Severity::Error,
            STATIC_CONFIDENCE,
            "Missing null check on x",
        )];
        let opts = AggregateOptions {
            scheme: PositionScheme::Line,
            ..Default::default()
        };
        let result = aggregate(&findings, &diff, &opts);
        assert_eq!(result.comments[0].address, Address::Line(11));
    }

    #[test]
    fn untouched_line_demotes_to_summary_but_still_scores() {
        let diff = two_file_diff();
        let findings = vec![finding(
            FindingOrigin::Static,
            "a.py",
            Some(40),
            Severity::Error,
            STATIC_CONFIDENCE,
            "Broken thing far away",
        )];
        let result = aggregate(&findings, &diff, &AggregateOptions::default());

        assert!(result.comments.is_empty());
        assert_eq!(result.score, 90);
        assert!(result.summary.contains("Broken thing far away"));
    }

    #[test]
    fn unmapped_file_demotes_to_summary() {
        let diff = two_file_diff();
        let findings = vec![finding(
            FindingOrigin::Ai,
            "nowhere.py",
            Some(1),
            Severity::Warning,
            AI_CONFIDENCE,
            "Issue in a file the diff never touched",
        )];
        let result = aggregate(&findings, &diff, &AggregateOptions::default());

        assert!(result.comments.is_empty());
        assert_eq!(result.score, 97);
        assert!(result.summary.contains("nowhere.py"));
    }

    #[test]
    fn budget_truncates_but_score_is_unaffected() {
        let diff = two_file_diff();
        let findings = vec![
            finding(
                FindingOrigin::Static,
                "a.py",
                Some(10),
                Severity::Error,
                0.9,
                "First problem entirely",
            ),
            finding(
                FindingOrigin::Static,
                "a.py",
                Some(11),
                Severity::Warning,
                0.9,
                "Second problem entirely",
            ),
            finding(
                FindingOrigin::Static,
                "a.py",
                Some(12),
                Severity::Info,
                0.9,
                "Third problem entirely",
            ),
        ];

        let small = AggregateOptions {
            max_comments: 1,
            ..Default::default()
        };
        let large = AggregateOptions {
            max_comments: 10,
            ..Default::default()
        };

        let r_small = aggregate(&findings, &diff, &small);
        let r_large = aggregate(&findings, &diff, &large);

        assert_eq!(r_small.comments.len(), 1);
        // the inline survivor is the highest-ranked group
        assert_eq!(r_small.comments[0].severity, Severity::Error);
        assert_eq!(r_large.comments.len(), 3);
        assert!(r_large.comments.len() >= r_small.comments.len());
        // 100 - 10 - 3 - 1, regardless of display truncation
        assert_eq!(r_small.score, 86);
        assert_eq!(r_large.score, r_small.score);
        assert!(r_small.summary.contains("not shown inline"));
    }

    #[test]
    fn aggregate_is_deterministic() {
        let diff = two_file_diff();
        let findings = vec![
            finding(
                FindingOrigin::Ai,
                "a.py",
                Some(10),
                Severity::Warning,
                0.8,
                "One candidate issue",
            ),
            finding(
                FindingOrigin::Ai,
                "a.py",
                Some(10),
                Severity::Warning,
                0.8,
                "A different candidate issue",
            ),
            finding(
                FindingOrigin::Static,
                "lead.py",
                Some(2),
                Severity::Info,
                0.5,
                "Minor nit",
            ),
        ];
        let opts = AggregateOptions::default();
        let a = aggregate(&findings, &diff, &opts);
        let b = aggregate(&findings, &diff, &opts);
        assert_eq!(a.summary, b.summary);
        assert_eq!(a.score, b.score);
        assert_eq!(a.comments.len(), b.comments.len());
        for (x, y) in a.comments.iter().zip(b.comments.iter()) {
            assert_eq!(x.body, y.body);
            assert_eq!(x.address, y.address);
        }
    }

    #[test]
    fn low_confidence_findings_are_dropped_before_grouping() {
        let diff = two_file_diff();
        let findings = vec![finding(
            FindingOrigin::Ai,
            "a.py",
            Some(11),
            Severity::Warning,
            0.2,
            "Very unsure about this",
        )];
        let opts = AggregateOptions {
            min_confidence: 0.7,
            ..Default::default()
        };
        let result = aggregate(&findings, &diff, &opts);
        assert!(result.comments.is_empty());
        assert_eq!(result.score, 100);
    }

    #[test]
    fn jaccard_similarity() {
        assert_eq!(
            jaccard("Missing null check on `x`", "missing null check on x"),
            1.0
        );
        assert!(jaccard("completely different words", "missing null check") < 0.2);
        assert_eq!(jaccard("", ""), 1.0);
    }

    #[test]
    fn distinct_suggestions_concatenate_on_merge() {
        let diff = two_file_diff();
        let mut a = finding(
            FindingOrigin::Static,
            "a.py",
            Some(11),
            Severity::Warning,
            0.9,
            "Use a guard clause here",
        );
        a.suggestion = Some("if x is None: return".into());
        let mut b = finding(
            FindingOrigin::Ai,
            "a.py",
            Some(11),
            Severity::Warning,
            0.9,
            "use a guard clause here",
        );
        b.suggestion = Some("assert x is not None".into());

        let result = aggregate(&[a, b], &diff, &AggregateOptions::default());
        assert_eq!(result.comments.len(), 1);
        let body = &result.comments[0].body;
        assert!(body.contains("if x is None: return"));
        assert!(body.contains("assert x is not None"));
    }
}
