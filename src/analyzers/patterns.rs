use once_cell::sync::Lazy;
use regex::Regex;

use crate::diff::{DiffFile, LineKind};
use crate::review::finding::{Finding, FindingOrigin, Severity, SECURITY_CONFIDENCE};

#[derive(Debug, Clone)]
pub struct SecurityPattern {
    pub name: &'static str,
    pub regex: Regex,
}

pub static PATTERNS: Lazy<Vec<SecurityPattern>> = Lazy::new(|| {
    vec![
        SecurityPattern {
            name: "AWS Access Key",
            regex: Regex::new(r"\bAKIA[0-9A-Z]{16}\b").unwrap(),
        },

        SecurityPattern {
            name: "AWS Secret Key",
            regex: Regex::new(
                r#"(?i)(aws_secret_access_key|secret_access_key)\s*[:=]\s*['"]?[A-Za-z0-9/+]{40}['"]?"#
            ).unwrap(),
        },

        SecurityPattern {
            name: "Hardcoded Password",
            regex: Regex::new(
                r#"(?i)\bpassword\s*[:=]\s*['"][^'"]{4,}['"]"#
            ).unwrap(),
        },

        SecurityPattern {
            name: "Generic API Key / Token",
            regex: Regex::new(
                r#"(?i)\b(api[_-]?key|token|secret|auth[_-]?key)\b\s*[:=]\s*['"]?[A-Za-z0-9_\-]{16,}['"]?"#
            ).unwrap(),
        },

        SecurityPattern {
            name: "JWT Token",
            regex: Regex::new(
                r"\beyJ[A-Za-z0-9_-]{10,}\.[A-Za-z0-9_-]{10,}\.[A-Za-z0-9_-]{10,}\b"
            ).unwrap(),
        },

        SecurityPattern {
            name: "Private Key",
            regex: Regex::new(
                r"-----BEGIN (RSA|EC|OPENSSH|DSA) PRIVATE KEY-----"
            ).unwrap(),
        },

        SecurityPattern {
            name: "GitHub Token",
            regex: Regex::new(r"\bghp_[A-Za-z0-9]{36}\b").unwrap(),
        },

        SecurityPattern {
            name: "Stripe Secret Key",
            regex: Regex::new(r"\bsk_live_[A-Za-z0-9]{24,}\b").unwrap(),
        },

        SecurityPattern {
            name: "Dynamic Code Execution",
            regex: Regex::new(r"\b(eval|exec)\s*\(").unwrap(),
        },

        SecurityPattern {
            name: "Unsafe Deserialization",
            regex: Regex::new(r"\bpickle\.loads?\s*\(").unwrap(),
        },
    ]
});

/// Scan only the added lines of the diff. Context and removed lines stay
/// quiet so pre-existing problems are not blamed on this change.
pub fn scan_diff(files: &[DiffFile]) -> Vec<Finding> {
    let mut findings = Vec::new();

    for file in files {
        for line in file.lines() {
            if line.kind != LineKind::Added {
                continue;
            }
            let Some(target_line) = line.target_line else {
                continue;
            };
            for pattern in PATTERNS.iter() {
                if pattern.regex.is_match(&line.content) {
                    findings.push(Finding {
                        origin: FindingOrigin::Security,
                        tool: "security_patterns".to_string(),
                        file: file.path.clone(),
                        line: Some(target_line),
                        severity: Severity::Warning,
                        confidence: SECURITY_CONFIDENCE,
                        message: format!("{} detected in added code", pattern.name),
                        suggestion: None,
                        rule: None,
                    });
                }
            }
        }
    }

    findings
}
