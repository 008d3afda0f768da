use std::fs;
use std::path::PathBuf;
use std::process::Command;

use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;
use serde::Deserialize;

use crate::diff::{DiffFile, LineKind};
use crate::review::finding::{Finding, FindingOrigin, Severity, STATIC_CONFIDENCE};

static FLAKE8_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^.+?:(\d+):\d+:\s+([A-Z]+\d+)\s+(.*)$").unwrap());

/// Run the available linters over every changed file in parallel. Files with
/// no added lines and files in languages we have no linter for are skipped.
pub fn analyze(files: &[DiffFile]) -> Vec<Finding> {
    files
        .par_iter()
        .flat_map(|file| analyze_file(file))
        .collect()
}

fn analyze_file(file: &DiffFile) -> Vec<Finding> {
    // Only the added lines are linted; snippet line N maps back to the Nth
    // added target line.
    let added: Vec<(&str, u32)> = file
        .lines()
        .filter(|l| l.kind == LineKind::Added)
        .filter_map(|l| l.target_line.map(|t| (l.content.as_str(), t)))
        .collect();
    if added.is_empty() {
        return Vec::new();
    }

    let Some(linter) = linter_for(&file.path) else {
        return Vec::new();
    };

    let snippet: String = added
        .iter()
        .map(|(content, _)| format!("{}\n", content))
        .collect();
    let targets: Vec<u32> = added.iter().map(|(_, t)| *t).collect();

    let Some(snippet_path) = write_snippet(&file.path, &snippet, linter.extension) else {
        return Vec::new();
    };
    let findings = linter.run(&snippet_path, &file.path, &targets);
    let _ = fs::remove_file(&snippet_path);
    findings
}

struct Linter {
    tool: &'static str,
    extension: &'static str,
}

fn linter_for(path: &str) -> Option<Linter> {
    // each arm yields a 'static literal; the borrowed extension must not
    // escape into the Linter
    let extension = match path.rsplit('.').next()? {
        "py" => "py",
        "js" => "js",
        "jsx" => "jsx",
        "ts" => "ts",
        "tsx" => "tsx",
        _ => return None,
    };
    let tool = if extension == "py" { "flake8" } else { "eslint" };
    Some(Linter { tool, extension })
}

impl Linter {
    fn run(&self, snippet: &PathBuf, original_path: &str, targets: &[u32]) -> Vec<Finding> {
        match self.tool {
            "flake8" => run_flake8(snippet, original_path, targets),
            _ => run_eslint(snippet, original_path, targets),
        }
    }
}

fn write_snippet(original_path: &str, snippet: &str, extension: &str) -> Option<PathBuf> {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(original_path.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    let path = std::env::temp_dir().join(format!(
        "prlink-{}-{}.{}",
        std::process::id(),
        &digest[..12],
        extension
    ));
    fs::write(&path, snippet).ok()?;
    Some(path)
}

// ==================== flake8 ====================

fn run_flake8(snippet: &PathBuf, original_path: &str, targets: &[u32]) -> Vec<Finding> {
    // A missing linter is not an error; that analyzer just contributes
    // nothing to the run.
    let output = match Command::new("flake8")
        .arg("--max-line-length=100")
        .arg(snippet)
        .output()
    {
        Ok(o) => o,
        Err(_) => return Vec::new(),
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut findings = Vec::new();

    for line in stdout.lines() {
        let Some(caps) = FLAKE8_LINE.captures(line) else {
            continue;
        };
        let snippet_line: usize = match caps[1].parse() {
            Ok(n) => n,
            Err(_) => continue,
        };
        let Some(&target) = targets.get(snippet_line.saturating_sub(1)) else {
            continue;
        };
        let rule = caps[2].to_string();
        findings.push(Finding {
            origin: FindingOrigin::Static,
            tool: "flake8".to_string(),
            file: original_path.to_string(),
            line: Some(target),
            severity: flake8_severity(&rule),
            confidence: STATIC_CONFIDENCE,
            message: caps[3].to_string(),
            suggestion: None,
            rule: Some(rule),
        });
    }

    findings
}

fn flake8_severity(rule: &str) -> Severity {
    match rule.chars().next() {
        Some('E') | Some('F') => Severity::Error,
        Some('W') | Some('C') => Severity::Warning,
        _ => Severity::Info,
    }
}

// ==================== eslint ====================

#[derive(Deserialize)]
struct EslintFileResult {
    messages: Vec<EslintMessage>,
}

#[derive(Deserialize)]
struct EslintMessage {
    line: Option<usize>,
    severity: u8,
    message: String,
    #[serde(rename = "ruleId")]
    rule_id: Option<String>,
}

fn run_eslint(snippet: &PathBuf, original_path: &str, targets: &[u32]) -> Vec<Finding> {
    let output = match Command::new("eslint")
        .arg("--format")
        .arg("json")
        .arg("--no-eslintrc")
        .arg(snippet)
        .output()
    {
        Ok(o) => o,
        Err(_) => return Vec::new(),
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let results: Vec<EslintFileResult> = match serde_json::from_str(&stdout) {
        Ok(r) => r,
        Err(_) => return Vec::new(),
    };

    let mut findings = Vec::new();
    for result in results {
        for msg in result.messages {
            let Some(snippet_line) = msg.line else {
                continue;
            };
            let Some(&target) = targets.get(snippet_line.saturating_sub(1)) else {
                continue;
            };
            findings.push(Finding {
                origin: FindingOrigin::Static,
                tool: "eslint".to_string(),
                file: original_path.to_string(),
                line: Some(target),
                severity: if msg.severity >= 2 {
                    Severity::Error
                } else {
                    Severity::Warning
                },
                confidence: STATIC_CONFIDENCE,
                message: msg.message,
                suggestion: None,
                rule: msg.rule_id,
            });
        }
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linter_selection_by_extension() {
        assert_eq!(linter_for("app.py").map(|l| l.tool), Some("flake8"));
        assert_eq!(linter_for("app.tsx").map(|l| l.tool), Some("eslint"));
        assert!(linter_for("app.rs").is_none());
        assert!(linter_for("Makefile").is_none());
    }

    #[test]
    fn snippet_extension_matches_the_source_file() {
        // the extension must survive independently of the borrowed path
        let linter = {
            let path = String::from("deep/dir/component.jsx");
            linter_for(&path).unwrap()
        };
        assert_eq!(linter.extension, "jsx");
        assert_eq!(linter.tool, "eslint");
    }

    #[test]
    fn flake8_rule_prefixes_map_to_severities() {
        assert_eq!(flake8_severity("E501"), Severity::Error);
        assert_eq!(flake8_severity("F401"), Severity::Error);
        assert_eq!(flake8_severity("W291"), Severity::Warning);
        assert_eq!(flake8_severity("C901"), Severity::Warning);
        assert_eq!(flake8_severity("N801"), Severity::Info);
    }

    #[test]
    fn flake8_output_line_parses() {
        let caps = FLAKE8_LINE
            .captures("/tmp/prlink-1-abc.py:3:80: E501 line too long (105 > 100 characters)")
            .unwrap();
        assert_eq!(&caps[1], "3");
        assert_eq!(&caps[2], "E501");
        assert_eq!(&caps[3], "line too long (105 > 100 characters)");
    }
}
