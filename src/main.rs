use std::error::Error;
use std::path::Path;
use std::process::ExitCode;

use colored::Colorize;
use dialoguer::{theme::ColorfulTheme, Select};

use prlink::analyzers::{self, AiAnalyzer};
use prlink::auth;
use prlink::config::{self, AppConfig};
use prlink::diff::{self, PositionScheme};
use prlink::providers::{self, GitHubClient, GitLabClient, InlineComment, Provider};
use prlink::review::aggregator::SeverityPenalties;
use prlink::review::suppress::IgnoreDatabase;
use prlink::review::{aggregate, AggregateOptions, Finding, ReviewResult, Severity};

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    match run(&args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {}", "❌".red(), e);
            ExitCode::from(2)
        }
    }
}

async fn run(args: &[String]) -> Result<ExitCode, Box<dyn Error>> {
    // ==============================
    // 🔐 AUTH MANAGEMENT
    // ==============================
    if args.len() >= 3 && args[1] == "auth" {
        return handle_auth(&args[2..]);
    }

    if let Some(path) = flag_value(args, "--generate-config") {
        config::generate_sample(&path)?;
        println!("✅ Wrote sample config to {}", path);
        return Ok(ExitCode::SUCCESS);
    }

    // ==============================
    // 🚫 IGNORE MANAGEMENT
    // ==============================
    if args.iter().any(|a| a == "--list-ignored") {
        let db = IgnoreDatabase::load(Path::new("."));
        if db.ignored.is_empty() {
            println!("No ignored findings.");
        }
        for item in &db.ignored {
            println!(
                "{}  {}  {}  {}",
                item.short_id,
                item.file,
                item.rule.as_deref().unwrap_or("-"),
                item.message
            );
        }
        return Ok(ExitCode::SUCCESS);
    }

    if args.iter().any(|a| a == "--clear-ignored") {
        let mut db = IgnoreDatabase::load(Path::new("."));
        db.clear();
        db.save(Path::new("."))?;
        println!("✅ Cleared all ignored findings");
        return Ok(ExitCode::SUCCESS);
    }

    if let Some(short_id) = flag_value(args, "--remove-ignore") {
        let mut db = IgnoreDatabase::load(Path::new("."));
        if db.remove_by_short_id(&short_id) {
            db.save(Path::new("."))?;
            println!("✅ Removed {}", short_id);
        } else {
            println!("No ignored finding with ID {}", short_id);
        }
        return Ok(ExitCode::SUCCESS);
    }

    // ==============================
    // ⚙️  CONFIG
    // ==============================
    let config_path = flag_value(args, "--config");
    let app_config = AppConfig::load(config_path.as_deref())?;

    if args.iter().any(|a| a == "--validate-config") {
        println!("✅ Configuration is valid");
        return Ok(ExitCode::SUCCESS);
    }

    // ==============================
    // 🔍 REVIEW MODE
    // ==============================
    let provider_name =
        flag_value(args, "--provider").ok_or("Missing --provider (github or gitlab)")?;
    let owner = flag_value(args, "--owner").ok_or("Missing --owner")?;
    let repo = flag_value(args, "--repo").ok_or("Missing --repo")?;
    let pr_number: u64 = flag_value(args, "--pr")
        .ok_or("Missing --pr")?
        .parse()
        .map_err(|_| "--pr must be a number")?;

    let debug = args.iter().any(|a| a == "--debug");
    let verbose = debug || args.iter().any(|a| a == "--verbose");

    let token = auth::resolve_token(&provider_name)?;
    let provider = match provider_name.as_str() {
        "github" => Provider::GitHub(GitHubClient::new(token)),
        "gitlab" => Provider::GitLab(GitLabClient::new(token)),
        other => return Err(format!("Unknown provider: {}", other).into()),
    };

    println!("🔑 Validating {} token...", provider.name());
    provider.validate_token().await?;

    println!("📥 Fetching PR {}/{}#{}...", owner, repo, pr_number);
    let pr = provider.fetch_pr(&owner, &repo, pr_number).await?;
    println!("   {} by @{} ({})", pr.title, pr.author, pr.state);
    if let Ok(created) = chrono::DateTime::parse_from_rfc3339(&pr.created_at) {
        println!("   Opened: {}", created.format("%Y-%m-%d %H:%M:%S"));
    }

    let cache_key =
        providers::cache::diff_key(provider.name(), &owner, &repo, pr_number, &pr.head_sha);
    let diff_text = match providers::cache::load_diff(&cache_key) {
        Some(cached) => {
            println!("📦 Using cached diff");
            cached
        }
        None => {
            let text = provider.fetch_diff(&owner, &repo, pr_number).await?;
            providers::cache::store_diff(&cache_key, &text);
            text
        }
    };

    let files = diff::parse_diff(&diff_text)?;
    let (file_count, additions, deletions) = diff::diff_stats(&files);
    println!(
        "📄 {} file(s), +{} -{}",
        file_count, additions, deletions
    );
    if debug {
        for file in &files {
            println!("   {} ({} hunks)", file.path, file.hunks.len());
        }
    }

    // ==============================
    // 🧪 ANALYSIS
    // ==============================
    let no_static = args.iter().any(|a| a == "--no-static");
    let no_ai = args.iter().any(|a| a == "--no-ai");
    let run_static = app_config.analyzers.static_enabled && !no_static;
    let run_security = app_config.analyzers.security_enabled;
    let mut run_ai = app_config.analyzers.ai_enabled && !no_ai;

    if diff_text.len() > app_config.review.max_diff_size && run_ai {
        println!(
            "⚠️  Diff is {} bytes (limit {}), skipping AI review",
            diff_text.len(),
            app_config.review.max_diff_size
        );
        run_ai = false;
    }

    let local_files = files.clone();
    let local_task = tokio::task::spawn_blocking(move || {
        let mut findings = Vec::new();
        if run_static {
            findings.extend(analyzers::static_analyzer::analyze(&local_files));
        }
        if run_security {
            findings.extend(analyzers::patterns::scan_diff(&local_files));
        }
        findings
    });

    let ai_task = async {
        if !run_ai {
            return None;
        }
        let Some(api_key) = app_config.gemini_api_key() else {
            println!("⚠️  No Gemini API key, skipping AI review");
            return None;
        };
        let analyzer = AiAnalyzer::new(
            api_key,
            app_config.ai.model.clone(),
            app_config.ai.temperature,
            app_config.ai.max_tokens,
        );
        match analyzer.review(&pr.title, &pr.description, &diff_text).await {
            Ok(ai_review) => Some(ai_review),
            Err(e) => {
                eprintln!("⚠️  AI review failed: {}", e);
                None
            }
        }
    };

    println!("🧪 Running analyzers...");
    let (local_result, ai_result) = tokio::join!(local_task, ai_task);
    let mut findings = local_result?;
    let mut ai_summary = None;
    if let Some(ai_review) = ai_result {
        findings.extend(ai_review.findings);
        ai_summary = ai_review.summary;
    }
    if verbose {
        let mut by_tool: std::collections::BTreeMap<&str, usize> =
            std::collections::BTreeMap::new();
        for f in &findings {
            *by_tool.entry(f.tool.as_str()).or_default() += 1;
        }
        for (tool, count) in by_tool {
            println!("   {}: {} finding(s)", tool, count);
        }
    }

    // ==============================
    // 🚫 SUPPRESSION + TRIAGE
    // ==============================
    let mut ignore_db = IgnoreDatabase::load(Path::new("."));
    let mut findings: Vec<Finding> = ignore_db
        .filter(&findings)
        .into_iter()
        .cloned()
        .collect();

    if args.iter().any(|a| a == "--triage") {
        findings = triage(findings, &mut ignore_db)?;
        ignore_db.save(Path::new("."))?;
    }

    // ==============================
    // 📊 AGGREGATION
    // ==============================
    let scheme = match flag_value(args, "--scheme") {
        Some(s) => PositionScheme::parse(&s)
            .ok_or(format!("Unknown scheme: {} (use position or line)", s))?,
        None => provider.default_scheme(),
    };

    let max_comments = match flag_value(args, "--max-comments") {
        Some(n) => n.parse().map_err(|_| "--max-comments must be a number")?,
        None => app_config.review.max_inline_comments,
    };
    let min_confidence = match flag_value(args, "--min-confidence") {
        Some(f) => f
            .parse()
            .map_err(|_| "--min-confidence must be a number between 0 and 1")?,
        None => app_config.review.min_confidence,
    };

    let options = AggregateOptions {
        max_comments,
        scheme,
        min_confidence,
        similarity_threshold: app_config.review.similarity_threshold,
        penalties: SeverityPenalties {
            error: app_config.review.error_penalty,
            warning: app_config.review.warning_penalty,
            info: app_config.review.info_penalty,
        },
    };

    let mut result = aggregate(&findings, &files, &options);
    if let Some(summary) = &ai_summary {
        result.summary.push_str(&format!("\n## AI Overview\n\n{}\n", summary));
    }

    // ==============================
    // 📤 OUTPUT
    // ==============================
    if args.iter().any(|a| a == "--json") {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(ExitCode::SUCCESS);
    }

    if args.iter().any(|a| a == "--dry-run") {
        print_dry_run(&result);
        return Ok(ExitCode::SUCCESS);
    }

    let mut post_failures: usize = 0;

    if !args.iter().any(|a| a == "--no-summary") {
        println!("📤 Posting summary...");
        if let Err(e) = provider
            .post_summary(&owner, &repo, pr_number, &result.summary)
            .await
        {
            eprintln!("⚠️  {}", e);
            post_failures += 1;
        }
    }

    if !args.iter().any(|a| a == "--no-inline") {
        let mut posted = 0;
        for comment in &result.comments {
            let inline = InlineComment {
                file: comment.file.clone(),
                address: comment.address,
                body: comment.body.clone(),
            };
            match provider
                .post_inline_comment(&owner, &repo, &pr, &inline)
                .await
            {
                Ok(()) => posted += 1,
                Err(e) => {
                    eprintln!("⚠️  {}", e);
                    post_failures += 1;
                }
            }
        }
        println!("💬 Posted {} inline comment(s)", posted);
    }

    println!("\n✅ Review complete. Score: {}/100", result.score);

    if post_failures > 0 {
        eprintln!("❌ {} post(s) failed", post_failures);
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn handle_auth(args: &[String]) -> Result<ExitCode, Box<dyn Error>> {
    match args.first().map(String::as_str) {
        Some("set-token") => {
            let provider = args.get(1).ok_or("Usage: prlink auth set-token <provider>")?;
            let token = dialoguer::Password::new()
                .with_prompt(format!("Enter {} token", provider))
                .interact()?;
            auth::token_store::save_token(provider, &token)?;
            println!("✅ Token saved securely for {}", provider);
        }
        Some("logout") => {
            let provider = args.get(1).ok_or("Usage: prlink auth logout <provider>")?;
            auth::token_store::delete_token(provider)?;
            println!("✅ Logged out from {}", provider);
        }
        _ => return Err("Usage: prlink auth <set-token|logout> <provider>".into()),
    }
    Ok(ExitCode::SUCCESS)
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == flag)?;
    args.get(pos + 1).cloned()
}

fn print_dry_run(result: &ReviewResult) {
    println!("\n{}", "=".repeat(80));
    println!("🔍 Review (dry run, nothing posted)");
    println!("{}", "=".repeat(80));

    for comment in &result.comments {
        let severity = match comment.severity {
            Severity::Error => "Error".red().bold(),
            Severity::Warning => "Warning".yellow().bold(),
            Severity::Info => "Info".cyan(),
        };
        let address = match comment.address {
            diff::Address::Position(p) => format!("position {}", p),
            diff::Address::Line(l) => format!("line {}", l),
        };
        println!("\n{} {} ({})", severity, comment.file.bold(), address);
        for line in comment.body.lines() {
            println!("  {}", line);
        }
    }

    println!("\n{}", "─".repeat(80));
    println!("{}", result.summary);
}

fn triage(
    findings: Vec<Finding>,
    ignore_db: &mut IgnoreDatabase,
) -> Result<Vec<Finding>, Box<dyn Error>> {
    let mut kept = Vec::new();

    for finding in findings {
        let location = match finding.line {
            Some(line) => format!("{}:{}", finding.file, line),
            None => finding.file.clone(),
        };
        println!(
            "\n{} [{}] {}",
            location,
            finding.tool,
            finding.message
        );

        let options = vec![
            "Keep in this review",
            "Ignore permanently",
            "Skip for this run",
        ];
        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt("What do you want to do?")
            .items(&options)
            .default(0)
            .interact()?;

        match selection {
            0 => kept.push(finding),
            1 => {
                ignore_db.add(&finding);
                println!("✔ Finding ignored.");
            }
            _ => {}
        }
    }

    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn flag_value_extracts_following_arg() {
        let a = args(&["prlink", "--owner", "octocat", "--pr", "42"]);
        assert_eq!(flag_value(&a, "--owner"), Some("octocat".to_string()));
        assert_eq!(flag_value(&a, "--pr"), Some("42".to_string()));
        assert_eq!(flag_value(&a, "--repo"), None);
    }

    #[test]
    fn flag_value_at_end_without_argument() {
        let a = args(&["prlink", "--owner"]);
        assert_eq!(flag_value(&a, "--owner"), None);
    }
}
