//! Generation model client.
//!
//! Dispatches a single completion call to the configured backend: the OpenAI
//! chat completions API or a local Ollama instance. One attempt per call —
//! recovery is the caller's re-invocation, never an internal retry.

use anyhow::{bail, Result};
use std::time::Duration;

use crate::config::LlmConfig;

/// Verify the generation backend can be used at all.
///
/// A missing API key for a credentialed provider is a startup failure, not
/// a runtime error; call this once while constructing the application
/// context.
pub fn check_credentials(config: &LlmConfig) -> Result<()> {
    if config.provider == "openai" && std::env::var(&config.api_key_env).is_err() {
        bail!(
            "{} environment variable not set (required by llm provider 'openai')",
            config.api_key_env
        );
    }
    Ok(())
}

/// Run one completion against the configured provider.
pub async fn generate(config: &LlmConfig, prompt: &str) -> Result<String> {
    match config.provider.as_str() {
        "openai" => generate_openai(config, prompt).await,
        "ollama" => generate_ollama(config, prompt).await,
        "disabled" => bail!("Generation provider is disabled"),
        other => bail!("Unknown llm provider: {}", other),
    }
}

async fn generate_openai(config: &LlmConfig, prompt: &str) -> Result<String> {
    let api_key = std::env::var(&config.api_key_env)
        .map_err(|_| anyhow::anyhow!("{} not set", config.api_key_env))?;

    let model = config
        .model
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("llm.model required"))?;

    let url = config
        .url
        .as_deref()
        .unwrap_or("https://api.openai.com/v1/chat/completions");

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let body = serde_json::json!({
        "model": model,
        "messages": [{"role": "user", "content": prompt}],
        "temperature": config.temperature,
    });

    let response = client
        .post(url)
        .header("Authorization", format!("Bearer {}", api_key))
        .header("Content-Type", "application/json")
        .json(&body)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        bail!("OpenAI API error {}: {}", status, body_text);
    }

    let json: serde_json::Value = response.json().await?;
    parse_openai_completion(&json)
}

fn parse_openai_completion(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
}

async fn generate_ollama(config: &LlmConfig, prompt: &str) -> Result<String> {
    let model = config
        .model
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("llm.model required"))?;

    let url = config.url.as_deref().unwrap_or("http://localhost:11434");

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let body = serde_json::json!({
        "model": model,
        "prompt": prompt,
        "stream": false,
        "options": {"temperature": config.temperature},
    });

    let response = client
        .post(format!("{}/api/generate", url))
        .header("Content-Type", "application/json")
        .json(&body)
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("Ollama connection error (is Ollama running at {}?): {}", url, e))?;

    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        bail!("Ollama API error {}: {}", status, body_text);
    }

    let json: serde_json::Value = response.json().await?;
    parse_ollama_completion(&json)
}

fn parse_ollama_completion(json: &serde_json::Value) -> Result<String> {
    json.get("response")
        .and_then(|r| r.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing response field"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_openai_completion() {
        let json = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "Patch immediately."}}]
        });
        assert_eq!(parse_openai_completion(&json).unwrap(), "Patch immediately.");
    }

    #[test]
    fn test_parse_openai_completion_missing_content() {
        let json = serde_json::json!({"choices": []});
        assert!(parse_openai_completion(&json).is_err());
    }

    #[test]
    fn test_parse_ollama_completion() {
        let json = serde_json::json!({"response": "Upgrade to 2.17.1.", "done": true});
        assert_eq!(parse_ollama_completion(&json).unwrap(), "Upgrade to 2.17.1.");
    }

    #[test]
    fn test_check_credentials_disabled_ok() {
        let config = LlmConfig::default();
        assert!(check_credentials(&config).is_ok());
    }

    #[test]
    fn test_check_credentials_openai_requires_key() {
        let config = LlmConfig {
            provider: "openai".to_string(),
            model: Some("gpt-4o-mini".to_string()),
            api_key_env: "CVERAG_TEST_MISSING_KEY".to_string(),
            ..LlmConfig::default()
        };
        assert!(check_credentials(&config).is_err());
    }
}
