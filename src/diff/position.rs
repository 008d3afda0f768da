use serde::Serialize;
use thiserror::Error;

use crate::diff::parser::{DiffFile, LineKind};

/// How the hosting provider addresses inline comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionScheme {
    /// Ordinal into the diff text ("patch position", GitHub classic).
    Position,
    /// Target-file line number plus the head commit, supplied by the caller.
    Line,
}

impl PositionScheme {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "position" => Some(PositionScheme::Position),
            "line" => Some(PositionScheme::Line),
            _ => None,
        }
    }
}

/// What the caller wants to anchor a comment to.
#[derive(Debug, Clone, Copy)]
pub enum CommentTarget {
    Line(u32),
    DiffPosition(u32),
}

/// The resolved addressing value for the requested scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Address {
    Position(u32),
    Line(u32),
}

/// Recoverable resolution failures: the requested location is simply not
/// commentable. Callers fall back to the summary, never abort.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PositionError {
    #[error("line {line} of {file} was not touched by the diff")]
    LineNotInDiff { file: String, line: u32 },
    #[error("diff position {position} does not exist in {file}")]
    PositionNotInDiff { file: String, position: u32 },
}

/// Resolve a comment target against a file's diff lines.
///
/// Context lines are commentable (providers allow comments on unchanged lines
/// inside a hunk); removed-only lines are not, since they carry no
/// target-line number.
pub fn resolve(
    file: &DiffFile,
    target: CommentTarget,
    scheme: PositionScheme,
) -> Result<Address, PositionError> {
    let line = match target {
        CommentTarget::Line(n) => file
            .lines()
            .find(|l| l.kind != LineKind::Removed && l.target_line == Some(n))
            .ok_or(PositionError::LineNotInDiff {
                file: file.path.clone(),
                line: n,
            })?,
        CommentTarget::DiffPosition(p) => file
            .lines()
            .find(|l| l.position == p)
            .ok_or(PositionError::PositionNotInDiff {
                file: file.path.clone(),
                position: p,
            })?,
    };

    match scheme {
        PositionScheme::Position => Ok(Address::Position(line.position)),
        PositionScheme::Line => match line.target_line {
            Some(n) => Ok(Address::Line(n)),
            None => Err(PositionError::LineNotInDiff {
                file: file.path.clone(),
                line: 0,
            }),
        },
    }
}
