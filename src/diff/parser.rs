use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Fatal parse failure: the text does not conform to unified-diff structure.
#[derive(Debug, Error)]
pub enum DiffError {
    #[error("malformed diff: {0}")]
    MalformedDiff(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Added,
    Removed,
    Context,
}

/// A single content line of the diff, with dual addressing.
///
/// `position` is a 1-based ordinal counted across every content line of the
/// whole diff (the convention position-addressed comment APIs use).
/// `target_line` is the line number this line occupies in the new file
/// version; removed lines have none.
#[derive(Debug, Clone)]
pub struct DiffLine {
    pub kind: LineKind,
    pub content: String,
    pub target_line: Option<u32>,
    pub position: u32,
}

#[derive(Debug, Clone)]
pub struct Hunk {
    pub source_start: u32,
    pub source_count: u32,
    pub target_start: u32,
    pub target_count: u32,
    pub section: String,
    pub lines: Vec<DiffLine>,
}

/// One changed file, keyed by target path (source path for deletions).
#[derive(Debug, Clone, Default)]
pub struct DiffFile {
    pub path: String,
    pub old_path: Option<String>,
    pub is_new: bool,
    pub is_deleted: bool,
    pub hunks: Vec<Hunk>,
}

impl DiffFile {
    pub fn lines(&self) -> impl Iterator<Item = &DiffLine> {
        self.hunks.iter().flat_map(|h| h.lines.iter())
    }

    pub fn additions(&self) -> usize {
        self.lines().filter(|l| l.kind == LineKind::Added).count()
    }

    pub fn deletions(&self) -> usize {
        self.lines().filter(|l| l.kind == LineKind::Removed).count()
    }
}

static HUNK_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@(.*)$").unwrap()
});

static GIT_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^diff --git (?:a/)?(\S+) (?:b/)?(\S+)$").unwrap());

struct OpenHunk {
    hunk: Hunk,
    remaining_source: u32,
    remaining_target: u32,
    next_target: u32,
}

#[derive(Default)]
struct FileBuilder {
    old_path: Option<String>,
    new_path: Option<String>,
    is_new: bool,
    is_deleted: bool,
    hunks: Vec<Hunk>,
    header_done: bool,
}

impl FileBuilder {
    fn build(self) -> Option<DiffFile> {
        let path = if self.is_deleted {
            self.old_path.clone()
        } else {
            self.new_path.clone().or_else(|| self.old_path.clone())
        }?;

        let old_path = match (&self.old_path, &self.new_path) {
            (Some(old), Some(new)) if old != new => Some(old.clone()),
            _ => None,
        };

        Some(DiffFile {
            path,
            old_path,
            is_new: self.is_new,
            is_deleted: self.is_deleted,
            hunks: self.hunks,
        })
    }
}

/// Parse unified-diff text into an ordered file/hunk/line model.
///
/// Empty input yields an empty vec. Structural problems (unparsable hunk
/// header, hunk body not matching its declared line counts) fail with
/// `DiffError::MalformedDiff`.
pub fn parse_diff(text: &str) -> Result<Vec<DiffFile>, DiffError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut files: Vec<DiffFile> = Vec::new();
    let mut current: Option<FileBuilder> = None;
    let mut open_hunk: Option<OpenHunk> = None;
    let mut position: u32 = 0;

    for raw in text.lines() {
        // A hunk body consumes lines until its declared counts are satisfied.
        if let Some(state) = open_hunk.as_mut() {
            if raw.starts_with('\\') {
                // "\ No newline at end of file" is not a content line
                continue;
            }

            let (kind, content) = match raw.as_bytes().first() {
                Some(b'+') => (LineKind::Added, &raw[1..]),
                Some(b'-') => (LineKind::Removed, &raw[1..]),
                Some(b' ') => (LineKind::Context, &raw[1..]),
                // some generators emit truly empty context lines
                None => (LineKind::Context, ""),
                _ => {
                    return Err(DiffError::MalformedDiff(format!(
                        "unexpected line inside hunk: {:?}",
                        raw
                    )))
                }
            };

            match kind {
                LineKind::Added if state.remaining_target == 0 => {
                    return Err(DiffError::MalformedDiff(
                        "hunk contains more added lines than declared".into(),
                    ))
                }
                LineKind::Removed if state.remaining_source == 0 => {
                    return Err(DiffError::MalformedDiff(
                        "hunk contains more removed lines than declared".into(),
                    ))
                }
                LineKind::Context
                    if state.remaining_source == 0 || state.remaining_target == 0 =>
                {
                    return Err(DiffError::MalformedDiff(
                        "hunk contains more context lines than declared".into(),
                    ))
                }
                _ => {}
            }

            position += 1;
            let target_line = match kind {
                LineKind::Removed => {
                    state.remaining_source -= 1;
                    None
                }
                LineKind::Added => {
                    state.remaining_target -= 1;
                    let n = state.next_target;
                    state.next_target += 1;
                    Some(n)
                }
                LineKind::Context => {
                    state.remaining_source -= 1;
                    state.remaining_target -= 1;
                    let n = state.next_target;
                    state.next_target += 1;
                    Some(n)
                }
            };

            state.hunk.lines.push(DiffLine {
                kind,
                content: content.to_string(),
                target_line,
                position,
            });

            if state.remaining_source == 0 && state.remaining_target == 0 {
                let done = open_hunk.take().unwrap();
                current
                    .as_mut()
                    .expect("open hunk without a file")
                    .hunks
                    .push(done.hunk);
            }
            continue;
        }

        if let Some(caps) = GIT_HEADER.captures(raw) {
            finalize(&mut files, current.take());
            let mut builder = FileBuilder::default();
            builder.old_path = Some(caps[1].to_string());
            builder.new_path = Some(caps[2].to_string());
            current = Some(builder);
            continue;
        }

        if let Some(rest) = raw.strip_prefix("--- ") {
            // plain unified diffs have no "diff --git" delimiter; a new "---"
            // after a completed file starts the next one
            if current.as_ref().map_or(true, |b| b.header_done) {
                finalize(&mut files, current.take());
                current = Some(FileBuilder::default());
            }
            let builder = current.as_mut().unwrap();
            match header_path(rest) {
                Some(p) => builder.old_path = Some(p),
                None => {
                    builder.is_new = true;
                    builder.old_path = None;
                }
            }
            continue;
        }

        if let Some(rest) = raw.strip_prefix("+++ ") {
            if let Some(builder) = current.as_mut() {
                match header_path(rest) {
                    Some(p) => builder.new_path = Some(p),
                    None => {
                        builder.is_deleted = true;
                        builder.new_path = None;
                    }
                }
                builder.header_done = true;
            }
            continue;
        }

        if raw.starts_with("@@") {
            let caps = HUNK_HEADER.captures(raw).ok_or_else(|| {
                DiffError::MalformedDiff(format!("bad hunk header: {:?}", raw))
            })?;
            if current.is_none() {
                return Err(DiffError::MalformedDiff(
                    "hunk header before any file header".into(),
                ));
            }

            let source_start = parse_count(&caps[1], raw)?;
            let source_count = match caps.get(2) {
                Some(m) => parse_count(m.as_str(), raw)?,
                None => 1,
            };
            let target_start = parse_count(&caps[3], raw)?;
            let target_count = match caps.get(4) {
                Some(m) => parse_count(m.as_str(), raw)?,
                None => 1,
            };

            let hunk = Hunk {
                source_start,
                source_count,
                target_start,
                target_count,
                section: caps[5].trim().to_string(),
                lines: Vec::new(),
            };

            if source_count == 0 && target_count == 0 {
                current.as_mut().unwrap().hunks.push(hunk);
            } else {
                open_hunk = Some(OpenHunk {
                    remaining_source: source_count,
                    remaining_target: target_count,
                    next_target: target_start,
                    hunk,
                });
            }
            continue;
        }

        if let Some(builder) = current.as_mut() {
            // a content-prefixed line here means the hunk declared fewer
            // lines than its body carries ("--- "/"+++ " were handled above)
            if matches!(raw.as_bytes().first(), Some(b'+') | Some(b'-') | Some(b' ')) {
                return Err(DiffError::MalformedDiff(format!(
                    "content line outside any hunk: {:?}",
                    raw
                )));
            }
            if let Some(p) = raw.strip_prefix("rename from ") {
                builder.old_path = Some(p.to_string());
            } else if let Some(p) = raw.strip_prefix("rename to ") {
                builder.new_path = Some(p.to_string());
            } else if raw.starts_with("new file mode") {
                builder.is_new = true;
            } else if raw.starts_with("deleted file mode") {
                builder.is_deleted = true;
            }
            // index/mode/similarity/Binary lines carry no commentable content
        }
    }

    if open_hunk.is_some() {
        return Err(DiffError::MalformedDiff(
            "diff ended before hunk body completed".into(),
        ));
    }
    finalize(&mut files, current.take());

    Ok(files)
}

fn parse_count(digits: &str, header: &str) -> Result<u32, DiffError> {
    digits
        .parse()
        .map_err(|_| DiffError::MalformedDiff(format!("bad hunk header: {:?}", header)))
}

/// Strip the `a/`/`b/` prefix and any trailing tab-separated timestamp from a
/// `---`/`+++` header path. `/dev/null` means the side does not exist.
fn header_path(raw: &str) -> Option<String> {
    let path = raw.split('\t').next().unwrap_or(raw).trim();
    if path == "/dev/null" {
        return None;
    }
    let path = path
        .strip_prefix("a/")
        .or_else(|| path.strip_prefix("b/"))
        .unwrap_or(path);
    Some(path.to_string())
}

fn finalize(files: &mut Vec<DiffFile>, builder: Option<FileBuilder>) {
    let Some(file) = builder.and_then(FileBuilder::build) else {
        return;
    };
    // invariant: at most one DiffFile per target path
    if let Some(existing) = files.iter_mut().find(|f| f.path == file.path) {
        existing.hunks.extend(file.hunks);
    } else {
        files.push(file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
diff --git a/example.py b/example.py
index 1234567..abcdefg 100644
--- a/example.py
+++ b/example.py
@@ -1,4 +1,6 @@
 def hello_world():
-    print(\"Hello\")
+    print(\"Hello, World!\")
+    return \"greeting\"
+
 def main():
     hello_world()
";

    #[test]
    fn parses_basic_diff() {
        let files = parse_diff(SAMPLE).unwrap();
        assert_eq!(files.len(), 1);
        let file = &files[0];
        assert_eq!(file.path, "example.py");
        assert_eq!(file.additions(), 3);
        assert_eq!(file.deletions(), 1);
        assert_eq!(file.hunks.len(), 1);
        assert_eq!(file.hunks[0].target_start, 1);
        assert_eq!(file.hunks[0].target_count, 6);
    }

    #[test]
    fn target_lines_reconstruct_new_file() {
        let files = parse_diff(SAMPLE).unwrap();
        let file = &files[0];
        let new_side: Vec<(u32, &str)> = file
            .lines()
            .filter(|l| l.kind != LineKind::Removed)
            .map(|l| (l.target_line.unwrap(), l.content.as_str()))
            .collect();
        assert_eq!(new_side[0], (1, "def hello_world():"));
        assert_eq!(new_side[1], (2, "    print(\"Hello, World!\")"));
        assert_eq!(new_side[2], (3, "    return \"greeting\""));
        assert_eq!(new_side[3], (4, ""));
        assert_eq!(new_side[4], (5, "def main():"));
        assert_eq!(new_side[5], (6, "    hello_world()"));
    }

    #[test]
    fn removed_lines_have_no_target_line() {
        let files = parse_diff(SAMPLE).unwrap();
        for line in files[0].lines() {
            match line.kind {
                LineKind::Removed => assert!(line.target_line.is_none()),
                _ => assert!(line.target_line.is_some()),
            }
        }
    }

    #[test]
    fn positions_increase_across_whole_diff() {
        let two_files = format!(
            "{}{}",
            SAMPLE,
            "\
diff --git a/other.py b/other.py
--- a/other.py
+++ b/other.py
@@ -1,1 +1,2 @@
 first
+second
"
        );
        let files = parse_diff(&two_files).unwrap();
        assert_eq!(files.len(), 2);
        let positions: Vec<u32> = files
            .iter()
            .flat_map(|f| f.lines().map(|l| l.position))
            .collect();
        assert_eq!(positions[0], 1);
        for pair in positions.windows(2) {
            assert!(pair[1] > pair[0]);
        }
        // second file continues the global counter
        assert_eq!(files[1].lines().next().unwrap().position, 8);
    }

    #[test]
    fn empty_input_is_not_an_error() {
        assert!(parse_diff("").unwrap().is_empty());
        assert!(parse_diff("   \n").unwrap().is_empty());
    }

    #[test]
    fn bad_hunk_header_is_malformed() {
        let diff = "--- a/x.py\n+++ b/x.py\n@@ bad @@\n+new\n";
        assert!(matches!(
            parse_diff(diff),
            Err(DiffError::MalformedDiff(_))
        ));
    }

    #[test]
    fn hunk_count_mismatch_is_malformed() {
        // declares 2 added lines but provides 1
        let diff = "--- a/x.py\n+++ b/x.py\n@@ -1,1 +1,3 @@\n context\n+only one\n";
        assert!(matches!(
            parse_diff(diff),
            Err(DiffError::MalformedDiff(_))
        ));
    }

    #[test]
    fn overlong_hunk_is_malformed() {
        let diff = "--- a/x.py\n+++ b/x.py\n@@ -1,1 +1,2 @@\n context\n+one\n+two\n";
        assert!(matches!(
            parse_diff(diff),
            Err(DiffError::MalformedDiff(_))
        ));
    }

    #[test]
    fn trailing_lines_after_satisfied_hunk_are_malformed() {
        // the declared counts are met before the extra lines, so they land
        // between the hunk and the next header
        for extra in ["+added", "-removed", " context"] {
            let diff = format!(
                "--- a/x.py\n+++ b/x.py\n@@ -1,1 +1,1 @@\n-old\n+new\n{}\n",
                extra
            );
            assert!(
                matches!(parse_diff(&diff), Err(DiffError::MalformedDiff(_))),
                "accepted trailing line {:?}",
                extra
            );
        }
    }

    #[test]
    fn overlong_hunk_before_next_file_is_malformed() {
        let diff = "\
--- a/x.py
+++ b/x.py
@@ -1,1 +1,1 @@
-old
+new
+extra
--- a/y.py
+++ b/y.py
@@ -1,1 +1,1 @@
-a
+b
";
        assert!(matches!(
            parse_diff(diff),
            Err(DiffError::MalformedDiff(_))
        ));
    }

    #[test]
    fn rename_without_hunks_has_no_commentable_lines() {
        let diff = "\
diff --git a/old_name.py b/new_name.py
similarity index 100%
rename from old_name.py
rename to new_name.py
";
        let files = parse_diff(diff).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "new_name.py");
        assert_eq!(files[0].old_path.as_deref(), Some("old_name.py"));
        assert!(files[0].hunks.is_empty());
    }

    #[test]
    fn binary_change_yields_zero_hunks() {
        let diff = "\
diff --git a/logo.png b/logo.png
index 1111111..2222222 100644
Binary files a/logo.png and b/logo.png differ
";
        let files = parse_diff(diff).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "logo.png");
        assert!(files[0].hunks.is_empty());
    }

    #[test]
    fn new_and_deleted_files() {
        let diff = "\
diff --git a/created.py b/created.py
new file mode 100644
--- /dev/null
+++ b/created.py
@@ -0,0 +1,1 @@
+hello
diff --git a/gone.py b/gone.py
deleted file mode 100644
--- a/gone.py
+++ /dev/null
@@ -1,1 +0,0 @@
-bye
";
        let files = parse_diff(diff).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].is_new);
        assert_eq!(files[0].path, "created.py");
        assert_eq!(files[0].lines().next().unwrap().target_line, Some(1));
        assert!(files[1].is_deleted);
        assert_eq!(files[1].path, "gone.py");
        assert!(files[1].lines().all(|l| l.target_line.is_none()));
    }

    #[test]
    fn no_newline_marker_is_skipped() {
        let diff = "\
--- a/x.txt
+++ b/x.txt
@@ -1,1 +1,1 @@
-old
+new
\\ No newline at end of file
";
        let files = parse_diff(diff).unwrap();
        let file = &files[0];
        assert_eq!(file.lines().count(), 2);
        assert_eq!(file.lines().last().unwrap().position, 2);
    }

    #[test]
    fn stats_cover_all_files() {
        let files = parse_diff(SAMPLE).unwrap();
        let (nfiles, adds, dels) = crate::diff::diff_stats(&files);
        assert_eq!((nfiles, adds, dels), (1, 3, 1));
    }
}
