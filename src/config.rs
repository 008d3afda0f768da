use std::error::Error;
use std::fs;
use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

/// Everything tunable about a review run. Loaded from prlink.toml (or the
/// `--config` path), then overridden by PRLINK__* environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub review: ReviewConfig,
    pub analyzers: AnalyzerConfig,
    pub ai: AiConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    pub max_inline_comments: usize,
    pub max_diff_size: usize,
    pub min_confidence: f32,
    pub similarity_threshold: f64,
    pub error_penalty: u32,
    pub warning_penalty: u32,
    pub info_penalty: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub static_enabled: bool,
    pub security_enabled: bool,
    pub ai_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            review: ReviewConfig::default(),
            analyzers: AnalyzerConfig::default(),
            ai: AiConfig::default(),
        }
    }
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            max_inline_comments: 20,
            max_diff_size: 50_000,
            // must stay below the 0.5 assigned to linter findings, which
            // carry no native confidence signal
            min_confidence: 0.4,
            similarity_threshold: 0.8,
            error_penalty: 10,
            warning_penalty: 3,
            info_penalty: 1,
        }
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            static_enabled: true,
            security_enabled: true,
            ai_enabled: true,
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-1.5-flash".to_string(),
            temperature: 0.1,
            max_tokens: 4000,
        }
    }
}

impl AppConfig {
    pub fn load(path: Option<&str>) -> Result<AppConfig, Box<dyn Error>> {
        let mut builder = Config::builder();

        match path {
            Some(p) => {
                builder = builder.add_source(File::new(p, FileFormat::Toml));
            }
            None => {
                builder = builder.add_source(
                    File::new("prlink.toml", FileFormat::Toml).required(false),
                );
            }
        }

        builder = builder.add_source(Environment::with_prefix("PRLINK").separator("__"));

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Box<dyn Error>> {
        if !(0.0..=1.0).contains(&self.review.min_confidence) {
            return Err("review.min_confidence must be between 0.0 and 1.0".into());
        }
        if !(0.0..=1.0).contains(&self.review.similarity_threshold) {
            return Err("review.similarity_threshold must be between 0.0 and 1.0".into());
        }
        if self.review.max_inline_comments == 0 {
            return Err("review.max_inline_comments must be at least 1".into());
        }
        if !(0.0..=2.0).contains(&self.ai.temperature) {
            return Err("ai.temperature must be between 0.0 and 2.0".into());
        }
        Ok(())
    }

    /// The AI key comes from the config file or GEMINI_API_KEY.
    pub fn gemini_api_key(&self) -> Option<String> {
        self.ai
            .api_key
            .clone()
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }
}

const SAMPLE_CONFIG: &str = r#"# prlink configuration

[review]
max_inline_comments = 20
max_diff_size = 50000
# linter findings carry confidence 0.5; raising this above that drops them
min_confidence = 0.4
similarity_threshold = 0.8
error_penalty = 10
warning_penalty = 3
info_penalty = 1

[analyzers]
static_enabled = true
security_enabled = true
ai_enabled = true

[ai]
# api_key = "..."   # or set GEMINI_API_KEY
model = "gemini-1.5-flash"
temperature = 0.1
max_tokens = 4000
"#;

pub fn generate_sample(path: &str) -> Result<(), Box<dyn Error>> {
    if Path::new(path).exists() {
        return Err(format!("{} already exists, not overwriting", path).into());
    }
    fs::write(path, SAMPLE_CONFIG)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.review.max_inline_comments, 20);
        assert_eq!(config.review.min_confidence, 0.4);
        assert_eq!(config.ai.model, "gemini-1.5-flash");
    }

    #[test]
    fn default_threshold_keeps_linter_findings() {
        let config = AppConfig::default();
        assert!(crate::review::finding::STATIC_CONFIDENCE >= config.review.min_confidence);
    }

    #[test]
    fn out_of_range_values_fail_validation() {
        let mut config = AppConfig::default();
        config.review.min_confidence = 1.5;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.review.max_inline_comments = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn sample_config_parses_back() {
        let config: AppConfig = Config::builder()
            .add_source(File::from_str(SAMPLE_CONFIG, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.review.error_penalty, 10);
    }
}
