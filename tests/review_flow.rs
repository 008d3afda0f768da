use prlink::analyzers;
use prlink::config::AppConfig;
use prlink::diff::{parse_diff, Address, PositionScheme};
use prlink::review::{aggregate, AggregateOptions, Finding, FindingOrigin, Severity};
use prlink::review::finding::STATIC_CONFIDENCE;

const DIFF: &str = "\
--- a/app/settings.py
+++ b/app/settings.py
@@ -10,3 +10,4 @@ class Settings:
     DEBUG = False
-    HOST = \"localhost\"
+    HOST = \"prod.internal\"
+    password = \"super-secret-value\"
     TIMEOUT = 30
--- a/app/util.py
+++ b/app/util.py
@@ -1,2 +1,3 @@
 import json
+result = eval(payload)
 def load(s):
";

#[test]
fn security_findings_flow_through_to_positioned_comments() {
    let files = parse_diff(DIFF).unwrap();
    let findings = analyzers::patterns::scan_diff(&files);
    assert_eq!(findings.len(), 2);

    let result = aggregate(&findings, &files, &AggregateOptions::default());

    assert_eq!(result.comments.len(), 2);

    let password = result
        .comments
        .iter()
        .find(|c| c.file == "app/settings.py")
        .unwrap();
    // hunk lines: context(1) removed(2) added(3) added(4) context(5)
    assert_eq!(password.address, Address::Position(4));
    assert_eq!(password.severity, Severity::Warning);
    assert!(password.body.contains("Hardcoded Password"));

    let eval = result
        .comments
        .iter()
        .find(|c| c.file == "app/util.py")
        .unwrap();
    // second file continues the global position count
    assert_eq!(eval.address, Address::Position(7));
    assert!(eval.body.contains("Dynamic Code Execution"));

    // two warnings: 100 - 3 - 3
    assert_eq!(result.score, 94);
    assert!(result.summary.contains("security_patterns"));
}

#[test]
fn default_config_keeps_linter_findings_in_the_review() {
    let files = parse_diff(DIFF).unwrap();
    let finding = Finding {
        origin: FindingOrigin::Static,
        tool: "flake8".into(),
        file: "app/util.py".into(),
        line: Some(2),
        severity: Severity::Error,
        confidence: STATIC_CONFIDENCE,
        message: "undefined name 'payload'".into(),
        suggestion: None,
        rule: Some("F821".into()),
    };

    let defaults = AppConfig::default();
    let options = AggregateOptions {
        min_confidence: defaults.review.min_confidence,
        max_comments: defaults.review.max_inline_comments,
        similarity_threshold: defaults.review.similarity_threshold,
        ..Default::default()
    };
    let result = aggregate(&[finding], &files, &options);

    assert_eq!(result.comments.len(), 1);
    assert_eq!(result.comments[0].file, "app/util.py");
    assert!(result.comments[0].body.contains("undefined name"));
    assert_eq!(result.score, 90);
    assert!(result.summary.contains("flake8"));
}

#[test]
fn line_scheme_addresses_target_lines_instead() {
    let files = parse_diff(DIFF).unwrap();
    let findings = analyzers::patterns::scan_diff(&files);

    let options = AggregateOptions {
        scheme: PositionScheme::Line,
        ..Default::default()
    };
    let result = aggregate(&findings, &files, &options);

    let password = result
        .comments
        .iter()
        .find(|c| c.file == "app/settings.py")
        .unwrap();
    assert_eq!(password.address, Address::Line(12));

    let eval = result
        .comments
        .iter()
        .find(|c| c.file == "app/util.py")
        .unwrap();
    assert_eq!(eval.address, Address::Line(2));
}
