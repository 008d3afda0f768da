use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use sha2::{Digest, Sha256};

/// Diffs are cached on disk briefly so repeated dry runs against the same
/// PR do not refetch.
const DIFF_TTL: Duration = Duration::from_secs(300);

fn cache_dir() -> Option<PathBuf> {
    let mut dir = dirs::cache_dir()?;
    dir.push("prlink");
    fs::create_dir_all(&dir).ok()?;
    Some(dir)
}

fn cache_path(key: &str) -> Option<PathBuf> {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    let mut path = cache_dir()?;
    path.push(format!("{}.diff", &digest[..16]));
    Some(path)
}

fn is_fresh(path: &PathBuf, ttl: Duration) -> bool {
    if let Ok(metadata) = fs::metadata(path) {
        if let Ok(modified) = metadata.modified() {
            return modified.elapsed().unwrap_or(ttl) < ttl;
        }
    }
    false
}

pub fn diff_key(provider: &str, owner: &str, repo: &str, number: u64, head_sha: &str) -> String {
    format!("{}:{}/{}/{}@{}", provider, owner, repo, number, head_sha)
}

pub fn load_diff(key: &str) -> Option<String> {
    let path = cache_path(key)?;
    if !is_fresh(&path, DIFF_TTL) {
        return None;
    }
    fs::read_to_string(&path).ok()
}

/// Cache writes are best-effort.
pub fn store_diff(key: &str, diff: &str) {
    if let Some(path) = cache_path(key) {
        let _ = fs::write(path, diff);
    }
}
