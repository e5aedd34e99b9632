mod client;
pub(crate) mod types;

use tracing::debug;

use crate::error::{AiError, Result};
use crate::schema::StructuredOutput;
use crate::util::strip_code_blocks;

use client::ClaudeClient;
use types::*;

// =============================================================================
// Claude
// =============================================================================

#[derive(Clone)]
pub struct Claude {
    api_key: String,
    pub(crate) model: String,
    base_url: Option<String>,
}

/// Verdict-sized answers; structured replies here are a few sentences.
const MAX_TOKENS: u32 = 1024;

impl Claude {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub(crate) fn client(&self) -> Result<ClaudeClient> {
        if self.api_key.is_empty() {
            return Err(AiError::Config("Anthropic API key is empty".to_string()));
        }
        Ok(ClaudeClient::new(&self.api_key, self.base_url.as_deref()))
    }

    /// Ask for a `T` by forcing a single tool call whose input schema is `T`'s schema.
    ///
    /// The tool input is deserialized strictly; a payload with missing or
    /// wrong-typed fields is a `Parse` error. A plain-text JSON reply is accepted
    /// as a fallback for models that ignore `tool_choice`.
    pub async fn extract<T: StructuredOutput>(
        &self,
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
    ) -> Result<T> {
        let tool_name = "structured_response";
        let mut request = ChatRequest::new(&self.model)
            .system(system_prompt)
            .message(WireMessage::user(user_prompt))
            .max_tokens(MAX_TOKENS)
            .temperature(0.0)
            .tool(ToolDefinitionWire {
                name: tool_name.to_string(),
                description: "Return the structured answer.".to_string(),
                input_schema: T::tool_schema(),
            });
        request.tool_choice = Some(serde_json::json!({
            "type": "tool",
            "name": tool_name,
        }));

        let response = self.client()?.chat(&request).await?;
        parse_structured(&response)
    }
}

fn parse_structured<T: StructuredOutput>(response: &ChatResponse) -> Result<T> {
    if let Some(input) = response.tool_input() {
        return serde_json::from_value(input.clone())
            .map_err(|e| AiError::Parse(format!("{}: {e}", T::type_name())));
    }

    if let Some(text) = response.text() {
        debug!("No tool_use block, falling back to text body");
        return serde_json::from_str(strip_code_blocks(&text))
            .map_err(|e| AiError::Parse(format!("{}: {e}", T::type_name())));
    }

    Err(AiError::MissingOutput)
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, JsonSchema)]
    struct Verdict {
        relevant: bool,
        reason: String,
    }

    fn response(json: serde_json::Value) -> ChatResponse {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_claude_new() {
        let ai = Claude::new("sk-ant-test", "claude-haiku-4-5-20251001");
        assert_eq!(ai.model(), "claude-haiku-4-5-20251001");
        assert_eq!(ai.api_key, "sk-ant-test");
    }

    #[test]
    fn base_url_reaches_the_transport() {
        let ai = Claude::new("sk-ant-test", "claude-haiku-4-5-20251001")
            .with_base_url("https://custom.api.com");
        let client = ai.client().unwrap();
        assert_eq!(client.endpoint(), "https://custom.api.com/messages");
    }

    #[test]
    fn empty_key_is_config_error() {
        let ai = Claude::new("", "claude-haiku-4-5-20251001");
        assert!(matches!(ai.client(), Err(AiError::Config(_))));
    }

    #[test]
    fn tool_use_block_is_deserialized() {
        let resp = response(serde_json::json!({
            "content": [
                { "type": "tool_use", "id": "t1", "name": "structured_response",
                  "input": { "relevant": true, "reason": "slot opened" } }
            ],
            "stop_reason": "tool_use"
        }));

        let verdict: Verdict = parse_structured(&resp).unwrap();
        assert!(verdict.relevant);
        assert_eq!(verdict.reason, "slot opened");
    }

    #[test]
    fn wrong_typed_field_is_parse_error() {
        let resp = response(serde_json::json!({
            "content": [
                { "type": "tool_use", "id": "t1", "name": "structured_response",
                  "input": { "relevant": "yes", "reason": "slot opened" } }
            ]
        }));

        let result: Result<Verdict> = parse_structured(&resp);
        assert!(matches!(result, Err(AiError::Parse(_))));
    }

    #[test]
    fn fenced_text_reply_is_accepted() {
        let resp = response(serde_json::json!({
            "content": [
                { "type": "text", "text": "```json\n{\"relevant\": false, \"reason\": \"none\"}\n```" }
            ]
        }));

        let verdict: Verdict = parse_structured(&resp).unwrap();
        assert!(!verdict.relevant);
    }

    #[test]
    fn empty_content_is_missing_output() {
        let resp = response(serde_json::json!({ "content": [] }));
        let result: Result<Verdict> = parse_structured(&resp);
        assert!(matches!(result, Err(AiError::MissingOutput)));
    }
}
