use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::error::Error;

use crate::review::finding::{Finding, FindingOrigin, Severity, AI_CONFIDENCE};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Larger diffs are truncated before prompting to stay inside the model's
/// context window.
const MAX_PROMPT_DIFF_CHARS: usize = 8000;

/// Gemini-backed reviewer. Produces findings plus an optional prose summary.
pub struct AiAnalyzer {
    client: Client,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

pub struct AiReview {
    pub findings: Vec<Finding>,
    pub summary: Option<String>,
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<RequestContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Option<Vec<CandidatePart>>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: String,
}

/// The JSON shape we ask the model for. Every field except the message is
/// optional because model output is untrusted.
#[derive(Debug, Deserialize)]
struct RawAiFeedback {
    issues: Option<Vec<RawAiIssue>>,
    summary: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawAiIssue {
    file: Option<String>,
    line: Option<u32>,
    severity: Option<String>,
    confidence: Option<f32>,
    message: Option<String>,
    suggestion: Option<String>,
}

impl AiAnalyzer {
    pub fn new(api_key: String, model: String, temperature: f32, max_tokens: u32) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
            temperature,
            max_tokens,
        }
    }

    /// Review the diff text. Network and parse failures surface as errors so
    /// the caller can decide whether to continue without AI feedback.
    pub async fn review(
        &self,
        title: &str,
        description: &str,
        diff_text: &str,
    ) -> Result<AiReview, Box<dyn Error>> {
        let prompt = build_prompt(title, description, diff_text);
        let url = format!(
            "{}/{}:generateContent?key={}",
            GEMINI_API_BASE, self.model, self.api_key
        );

        let request = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_tokens,
            },
        };

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            return Err(format!("Gemini API error: {}", response.status()).into());
        }

        let body: GenerateResponse = response.json().await?;
        let text = body
            .candidates
            .and_then(|mut c| c.drain(..).next())
            .and_then(|c| c.content)
            .and_then(|c| c.parts)
            .and_then(|mut p| p.drain(..).next())
            .map(|p| p.text)
            .ok_or("Gemini returned an empty response")?;

        Ok(parse_feedback(&text))
    }
}

fn build_prompt(title: &str, description: &str, diff_text: &str) -> String {
    let diff = if diff_text.len() > MAX_PROMPT_DIFF_CHARS {
        let mut end = MAX_PROMPT_DIFF_CHARS;
        while !diff_text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}\n... (diff truncated)", &diff_text[..end])
    } else {
        diff_text.to_string()
    };

    format!(
        "You are a senior code reviewer. Review this pull request diff.\n\
         \n\
         Title: {}\n\
         Description: {}\n\
         \n\
         Focus on bugs, security problems, and maintainability. Only report\n\
         issues on lines that were added or changed. Respond with JSON only,\n\
         no prose outside the JSON, in this shape:\n\
         {{\n\
           \"issues\": [\n\
             {{\"file\": \"path\", \"line\": 1, \"severity\": \"error|warning|info\",\n\
              \"confidence\": 0.0, \"message\": \"...\", \"suggestion\": \"replacement code or null\"}}\n\
           ],\n\
           \"summary\": \"one paragraph\"\n\
         }}\n\
         \n\
         Diff:\n\
         ```diff\n\
         {}\n\
         ```",
        title, description, diff
    )
}

/// Models often wrap JSON in markdown fences despite instructions. Unparseable
/// output degrades to an empty review rather than an error.
fn parse_feedback(text: &str) -> AiReview {
    let cleaned = strip_code_fences(text);
    let raw: RawAiFeedback = match serde_json::from_str(cleaned) {
        Ok(r) => r,
        Err(_) => {
            return AiReview {
                findings: Vec::new(),
                summary: None,
            }
        }
    };

    let findings = raw
        .issues
        .unwrap_or_default()
        .into_iter()
        .filter_map(|issue| {
            let message = issue.message.clone().filter(|m| !m.trim().is_empty())?;
            Some((issue, message))
        })
        .map(|(issue, message)| Finding {
            origin: FindingOrigin::Ai,
            tool: "gemini".to_string(),
            file: crate::review::finding::normalize_path(
                issue.file.as_deref().unwrap_or("unknown"),
            ),
            line: issue.line,
            severity: issue
                .severity
                .as_deref()
                .map(Severity::parse)
                .unwrap_or(Severity::Info),
            confidence: issue.confidence.unwrap_or(AI_CONFIDENCE).clamp(0.0, 1.0),
            message,
            suggestion: issue.suggestion.filter(|s| !s.trim().is_empty()),
            rule: None,
        })
        .collect();

    AiReview {
        findings,
        summary: raw.summary.filter(|s| !s.trim().is_empty()),
    }
}

fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the language tag on the opening fence
    let rest = match rest.find('\n') {
        Some(i) => &rest[i + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_json_is_unwrapped() {
        let text = "```json\n{\"issues\": [], \"summary\": \"fine\"}\n```";
        assert_eq!(
            strip_code_fences(text),
            "{\"issues\": [], \"summary\": \"fine\"}"
        );
        assert_eq!(strip_code_fences("{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn feedback_parses_with_missing_fields() {
        let text = r#"{"issues": [{"message": "possible off-by-one"}]}"#;
        let review = parse_feedback(text);
        assert_eq!(review.findings.len(), 1);
        let f = &review.findings[0];
        assert_eq!(f.file, "unknown");
        assert_eq!(f.line, None);
        assert_eq!(f.severity, Severity::Info);
        assert_eq!(f.confidence, AI_CONFIDENCE);
        assert!(review.summary.is_none());
    }

    #[test]
    fn feedback_maps_full_issue() {
        let text = r#"{
            "issues": [{
                "file": "b/src/app.py",
                "line": 12,
                "severity": "critical",
                "confidence": 0.95,
                "message": "SQL built by string concatenation",
                "suggestion": "use parameterized queries"
            }],
            "summary": "One serious problem."
        }"#;
        let review = parse_feedback(text);
        let f = &review.findings[0];
        assert_eq!(f.file, "src/app.py");
        assert_eq!(f.line, Some(12));
        assert_eq!(f.severity, Severity::Error);
        assert_eq!(f.confidence, 0.95);
        assert_eq!(review.summary.as_deref(), Some("One serious problem."));
    }

    #[test]
    fn issues_without_a_message_are_dropped() {
        let text = r#"{"issues": [{"file": "a.py", "line": 3}, {"message": "real issue"}]}"#;
        let review = parse_feedback(text);
        assert_eq!(review.findings.len(), 1);
        assert_eq!(review.findings[0].message, "real issue");
    }

    #[test]
    fn garbage_output_degrades_to_empty_review() {
        let review = parse_feedback("Sorry, I cannot review this diff.");
        assert!(review.findings.is_empty());
        assert!(review.summary.is_none());
    }

    #[test]
    fn long_diffs_are_truncated_in_the_prompt() {
        let diff = "x".repeat(MAX_PROMPT_DIFF_CHARS * 2);
        let prompt = build_prompt("t", "d", &diff);
        assert!(prompt.contains("(diff truncated)"));
        assert!(prompt.len() < diff.len());
    }
}
