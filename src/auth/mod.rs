pub mod token_store;

use std::error::Error;

/// Resolve the API token for a provider: the environment variable wins, then
/// the OS keychain.
pub fn resolve_token(provider: &str) -> Result<String, Box<dyn Error>> {
    let env_var = match provider {
        "github" => "GITHUB_TOKEN",
        "gitlab" => "GITLAB_TOKEN",
        other => return Err(format!("Unknown provider: {}", other).into()),
    };

    if let Ok(token) = std::env::var(env_var) {
        if !token.trim().is_empty() {
            return Ok(token);
        }
    }

    token_store::load_token(provider).map_err(|_| {
        format!(
            "No token for {}. Set {} or run: prlink auth set-token {}",
            provider, env_var, provider
        )
        .into()
    })
}
