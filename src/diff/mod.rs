pub mod parser;
pub mod position;

pub use parser::{parse_diff, DiffError, DiffFile, DiffLine, Hunk, LineKind};
pub use position::{resolve, Address, CommentTarget, PositionError, PositionScheme};

/// Overall diff statistics: (files, additions, deletions).
pub fn diff_stats(files: &[DiffFile]) -> (usize, usize, usize) {
    let additions = files.iter().map(|f| f.additions()).sum();
    let deletions = files.iter().map(|f| f.deletions()).sum();
    (files.len(), additions, deletions)
}

/// Find a file in the parsed diff by its (normalized) target path.
pub fn find_file<'a>(files: &'a [DiffFile], path: &str) -> Option<&'a DiffFile> {
    files.iter().find(|f| f.path == path)
}
