pub mod aggregator;
pub mod finding;
pub mod report;
pub mod suppress;

pub use aggregator::{aggregate, AggregateOptions, PositionedComment, ReviewResult};
pub use finding::{Finding, FindingOrigin, Severity};
