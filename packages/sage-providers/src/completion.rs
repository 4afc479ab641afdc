use std::time::Duration;

use color_eyre::{Result, eyre};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct ChatResponse {
	#[serde(default)]
	choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
	message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
	#[serde(default)]
	content: Option<String>,
}

/// Single chat-completion call against an OpenAI-compatible endpoint. Returns
/// the raw assistant text; parsing and schema validation are the caller's job,
/// as is any retry policy.
pub async fn complete(
	cfg: &sage_config::LlmProviderConfig,
	messages: &[Value],
	json_mode: bool,
) -> Result<String> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let mut body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"messages": messages,
	});

	if json_mode && let Some(map) = body.as_object_mut() {
		map.insert("response_format".to_string(), serde_json::json!({ "type": "json_object" }));
	}

	let res = client
		.post(&url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: ChatResponse = res.error_for_status()?.json().await?;

	extract_content(json)
}

fn extract_content(response: ChatResponse) -> Result<String> {
	let content = response
		.choices
		.into_iter()
		.next()
		.and_then(|choice| choice.message.content)
		.unwrap_or_default();

	if content.trim().is_empty() {
		return Err(eyre::eyre!("Completion response has no message content."));
	}

	Ok(content)
}
