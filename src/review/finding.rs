use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Where a finding came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingOrigin {
    Static,
    Ai,
    Security,
}

/// Common severity scale across all producers. Ordered: error > warning > info.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    /// Lenient parsing of producer vocabularies. Unknown strings map to info
    /// rather than failing, since producer output is untrusted.
    pub fn parse(s: &str) -> Severity {
        match s.to_ascii_lowercase().as_str() {
            "critical" | "error" | "high" | "fatal" => Severity::Error,
            "warning" | "medium" => Severity::Warning,
            _ => Severity::Info,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Severity::Error => "Error",
            Severity::Warning => "Warning",
            Severity::Info => "Info",
        }
    }
}

/// Default confidence assigned to static-analysis findings with no native
/// confidence signal.
pub const STATIC_CONFIDENCE: f32 = 0.5;
/// Default confidence for built-in security-pattern matches.
pub const SECURITY_CONFIDENCE: f32 = 0.9;
/// Default confidence when the AI omits the field.
pub const AI_CONFIDENCE: f32 = 0.8;

/// A normalized issue record from any analyzer or AI source.
///
/// Findings are created once by an analyzer adapter and never mutated; the
/// aggregator produces new derived records instead of editing inputs.
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub origin: FindingOrigin,
    pub tool: String,
    pub file: String,
    pub line: Option<u32>,
    pub severity: Severity,
    pub confidence: f32,
    pub message: String,
    pub suggestion: Option<String>,
    pub rule: Option<String>,
}

impl Finding {
    /// Stable identity for the suppression database.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.file.as_bytes());
        hasher.update(self.line.unwrap_or(0).to_string().as_bytes());
        hasher.update(self.message.as_bytes());
        hasher.update(self.tool.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Bring producer paths into the same form `DiffFile.path` uses.
pub fn normalize_path(path: &str) -> String {
    let p = path.trim();
    let p = p
        .strip_prefix("a/")
        .or_else(|| p.strip_prefix("b/"))
        .or_else(|| p.strip_prefix("./"))
        .unwrap_or(p);
    p.to_string()
}
