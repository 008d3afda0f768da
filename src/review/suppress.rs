use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::review::finding::{Finding, FindingOrigin};

const IGNORE_FILE: &str = ".prlinkignore.json";

/// One suppressed finding. The fingerprint is the durable key; the rest is
/// kept so `--list-ignored` can show something human-readable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IgnoredItem {
    pub fingerprint: String,
    pub short_id: String,
    pub file: String,
    pub rule: Option<String>,
    pub origin: FindingOrigin,
    pub message: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct IgnoreDatabase {
    pub ignored: Vec<IgnoredItem>,
}

impl IgnoreDatabase {
    /// Missing or unreadable file means an empty database, never an error.
    pub fn load(dir: &Path) -> IgnoreDatabase {
        match fs::read_to_string(db_path(dir)) {
            Ok(data) => serde_json::from_str(&data).unwrap_or_default(),
            Err(_) => IgnoreDatabase::default(),
        }
    }

    pub fn save(&self, dir: &Path) -> Result<(), Box<dyn Error>> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(db_path(dir), json)
            .map_err(|e| format!("Failed to write {}: {}", IGNORE_FILE, e))?;
        Ok(())
    }

    pub fn add(&mut self, finding: &Finding) {
        let fingerprint = finding.fingerprint();
        if self.contains(&fingerprint) {
            return;
        }
        let short_id = fingerprint[..8].to_string();
        self.ignored.push(IgnoredItem {
            fingerprint,
            short_id,
            file: finding.file.clone(),
            rule: finding.rule.clone(),
            origin: finding.origin,
            message: finding.message.clone(),
        });
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.ignored.iter().any(|i| i.fingerprint == fingerprint)
    }

    /// Removes by the 8-char prefix shown in listings. Returns whether an
    /// entry matched.
    pub fn remove_by_short_id(&mut self, short_id: &str) -> bool {
        let before = self.ignored.len();
        self.ignored.retain(|i| i.short_id != short_id);
        self.ignored.len() != before
    }

    pub fn clear(&mut self) {
        self.ignored.clear();
    }

    /// Drop findings that have been suppressed.
    pub fn filter<'a>(&self, findings: &'a [Finding]) -> Vec<&'a Finding> {
        findings
            .iter()
            .filter(|f| !self.contains(&f.fingerprint()))
            .collect()
    }
}

fn db_path(dir: &Path) -> PathBuf {
    dir.join(IGNORE_FILE)
}
