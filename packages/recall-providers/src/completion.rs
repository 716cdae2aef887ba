use serde_json::Value;

use crate::{Error, Result};
use recall_config::LlmProviderConfig;

/// Sends a single user prompt and returns the model's free-text answer.
pub async fn complete(
	cfg: &LlmProviderConfig,
	model: &str,
	max_tokens: u32,
	prompt: &str,
) -> Result<String> {
	let client = crate::client(cfg.timeout_ms)?;
	let body = serde_json::json!({
		"model": model,
		"max_tokens": max_tokens,
		"temperature": cfg.temperature,
		"messages": [{ "role": "user", "content": prompt }],
	});
	let res = client
		.post(crate::endpoint(&cfg.api_base, &cfg.path))
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_completion_text(&json)
}

// Accepts both chat-completions (`choices[0].message.content`) and messages-style
// (`content[].text`) payloads.
fn parse_completion_text(json: &Value) -> Result<String> {
	if let Some(content) = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
	{
		return Ok(content.to_string());
	}

	if let Some(blocks) = json.get("content").and_then(|v| v.as_array()) {
		let text: Vec<&str> = blocks
			.iter()
			.filter(|block| {
				block.get("type").and_then(|t| t.as_str()).map(|t| t == "text").unwrap_or(true)
			})
			.filter_map(|block| block.get("text").and_then(|t| t.as_str()))
			.collect();

		if !text.is_empty() {
			return Ok(text.join("\n"));
		}
	}

	Err(Error::response("Completion response is missing text content."))
}
