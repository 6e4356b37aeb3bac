//! Abstract MCP backend client.
//!
//! vMCP treats the underlying MCP transport (SSE / streamable HTTP) as an
//! external collaborator: this module only defines the operations the
//! runtime needs (`listTools`, `listPrompts`, `listResources`, `callTool`,
//! `getPrompt`, `readResource`) plus the content-normalization rules used to
//! make backend responses templatable by the composite-workflow engine.
//! Concrete transports are expected to implement `McpBackendClient` on top
//! of `rmcp`'s client types.

use std::collections::BTreeMap;

use async_trait::async_trait;
use rmcp::model::{CallToolResult, GetPromptResult, RawContent, ReadResourceResult};
use serde_json::Value;

use crate::error::BackendError;

/// Operations vMCP needs from a single backend MCP server.
#[async_trait]
pub trait McpBackendClient: Send + Sync {
    fn backend_id(&self) -> &str;

    async fn list_tools(&self) -> Result<Vec<rmcp::model::Tool>, BackendError>;
    async fn list_prompts(&self) -> Result<Vec<rmcp::model::Prompt>, BackendError>;
    async fn list_resources(&self) -> Result<Vec<rmcp::model::Resource>, BackendError>;

    async fn call_tool(&self, name: &str, args: Value) -> Result<CallToolResult, BackendError>;
    async fn get_prompt(&self, name: &str, args: Value) -> Result<GetPromptResult, BackendError>;
    async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, BackendError>;
}

/// A step output record, normalized into a flat string/value map so it can
/// be addressed by the template engine (`.steps.<id>.output.<field>`).
pub type NormalizedOutput = BTreeMap<String, Value>;

/// Flatten a `callTool` content list into `text`, `text_1`, `text_2`, ...,
/// `image_0`, `image_1`, ... Audio content is omitted (not templatable), per
/// the content-normalization rule in the external-interfaces section.
pub fn normalize_call_tool_result(result: &CallToolResult) -> NormalizedOutput {
    let mut out = NormalizedOutput::new();
    let mut text_index = 0usize;
    let mut image_index = 0usize;

    for item in &result.content {
        match &item.raw {
            RawContent::Text(t) => {
                let key = if text_index == 0 { "text".to_string() } else { format!("text_{text_index}") };
                out.insert(key, Value::String(t.text.clone()));
                text_index += 1;
            }
            RawContent::Image(img) => {
                let key = format!("image_{image_index}");
                out.insert(key, Value::String(img.data.clone()));
                image_index += 1;
            }
            RawContent::Resource(_) | RawContent::Audio(_) => {
                // Resources embedded in tool output and audio are not
                // templatable; skipped per the normalization rule.
            }
        }
    }

    if let Some(structured) = &result.structured_content {
        out.insert("structuredContent".to_string(), structured.clone());
    }
    out.insert("isError".to_string(), Value::Bool(result.is_error.unwrap_or(false)));

    out
}

/// Concatenate `getPrompt` messages as `"[role] text\n"`.
pub fn normalize_get_prompt_result(result: &GetPromptResult) -> String {
    let mut buf = String::new();
    for message in &result.messages {
        let role = match message.role {
            rmcp::model::Role::User => "user",
            rmcp::model::Role::Assistant => "assistant",
        };
        if let RawContent::Text(t) = &message.content.raw {
            buf.push_str(&format!("[{role}] {}\n", t.text));
        }
    }
    buf
}

/// Concatenate `readResource` text and blob contents into one byte stream,
/// returned as a UTF-8-lossy string for templating purposes.
pub fn normalize_read_resource_result(result: &ReadResourceResult) -> Vec<u8> {
    let mut buf = Vec::new();
    for content in &result.contents {
        match content {
            rmcp::model::ResourceContents::TextResourceContents { text, .. } => {
                buf.extend_from_slice(text.as_bytes());
            }
            rmcp::model::ResourceContents::BlobResourceContents { blob, .. } => {
                use base64::Engine;
                if let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(blob) {
                    buf.extend_from_slice(&decoded);
                }
            }
        }
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmcp::model::{Annotated, RawTextContent};

    fn text_content(s: &str) -> rmcp::model::Content {
        Annotated::new(RawContent::Text(RawTextContent { text: s.to_string(), meta: None }), None)
    }

    #[test]
    fn normalizes_multiple_text_items_with_suffix_indices() {
        let result = CallToolResult {
            content: vec![text_content("first"), text_content("second")],
            structured_content: None,
            is_error: Some(false),
            meta: None,
        };
        let normalized = normalize_call_tool_result(&result);
        assert_eq!(normalized.get("text").unwrap(), "first");
        assert_eq!(normalized.get("text_1").unwrap(), "second");
    }

    #[test]
    fn normalizes_structured_content() {
        let result = CallToolResult {
            content: vec![],
            structured_content: Some(serde_json::json!({"ok": true})),
            is_error: Some(false),
            meta: None,
        };
        let normalized = normalize_call_tool_result(&result);
        assert_eq!(normalized.get("structuredContent").unwrap(), &serde_json::json!({"ok": true}));
    }
}
