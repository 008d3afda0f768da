pub mod ai;
pub mod patterns;
pub mod static_analyzer;

pub use ai::{AiAnalyzer, AiReview};
