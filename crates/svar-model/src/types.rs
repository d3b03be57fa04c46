use serde::{Deserialize, Serialize};

// ─── Message types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the assistant.
///
/// `arguments` is the JSON-encoded argument object exactly as the model
/// produced it; it is parsed at execution time so a malformed payload can be
/// surfaced back to the model as a tool error instead of failing the turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// A single message in the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Set on tool-result messages: the id of the call being answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Set on assistant messages that request tool invocations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: text.into(),
            tool_call_id: None,
            tool_calls: Vec::new(),
            metadata: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
            tool_call_id: None,
            tool_calls: Vec::new(),
            metadata: None,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
            tool_call_id: None,
            tool_calls: Vec::new(),
            metadata: None,
        }
    }

    /// An assistant message carrying tool-call requests and no text.
    pub fn tool_calls(calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            tool_call_id: None,
            tool_calls: calls,
            metadata: None,
        }
    }

    /// A tool-result message answering `call_id`.  The executed tool's name
    /// rides along in the metadata so transcripts stay self-describing.
    pub fn tool_result(
        call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_call_id: Some(call_id.into()),
            tool_calls: Vec::new(),
            metadata: Some(serde_json::json!({ "tool": name.into() })),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// The text of the most recent user message, if any.
pub fn last_user_text(messages: &[Message]) -> Option<&str> {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
}

/// The text of the most recent assistant message with non-empty content.
pub fn last_assistant_text(messages: &[Message]) -> Option<&str> {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant && !m.content.is_empty())
        .map(|m| m.content.as_str())
}

// ─── Provider request/response ────────────────────────────────────────────────

/// A tool schema provided to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of the parameters object
    pub parameters: serde_json::Value,
}

/// Request sent to a chat provider.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
    /// Model identifier; empty = the provider's configured default.
    pub model: String,
    /// Sampling overrides; `None` = the provider's configured default.
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            tools: Vec::new(),
            model: String::new(),
            temperature: None,
            top_p: None,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolSchema>) -> Self {
        self.tools = tools;
        self
    }
}

/// One completed (non-streamed) model turn.
#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl ChatResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_roles() {
        assert_eq!(Message::system("s").role, Role::System);
        assert_eq!(Message::user("u").role, Role::User);
        assert_eq!(Message::assistant("a").role, Role::Assistant);
        assert_eq!(Message::tool_result("id", "t", "out").role, Role::Tool);
    }

    #[test]
    fn tool_result_carries_call_id_and_tool_name() {
        let m = Message::tool_result("call-1", "look_up_invoice", "found");
        assert_eq!(m.tool_call_id.as_deref(), Some("call-1"));
        assert_eq!(m.content, "found");
        assert_eq!(m.metadata.unwrap()["tool"], "look_up_invoice");
    }

    #[test]
    fn last_user_text_finds_most_recent() {
        let msgs = vec![
            Message::user("first"),
            Message::assistant("reply"),
            Message::user("second"),
        ];
        assert_eq!(last_user_text(&msgs), Some("second"));
    }

    #[test]
    fn last_user_text_empty_history() {
        assert_eq!(last_user_text(&[]), None);
    }

    #[test]
    fn last_assistant_text_skips_tool_call_shells() {
        let msgs = vec![
            Message::assistant("the answer"),
            Message::tool_calls(vec![ToolCallRequest {
                id: "1".into(),
                name: "t".into(),
                arguments: "{}".into(),
            }]),
        ];
        assert_eq!(last_assistant_text(&msgs), Some("the answer"));
    }

    #[test]
    fn message_serializes_without_empty_optionals() {
        let json = serde_json::to_string(&Message::user("hi")).unwrap();
        assert!(!json.contains("tool_call_id"));
        assert!(!json.contains("tool_calls"));
        assert!(!json.contains("metadata"));
    }

    #[test]
    fn message_round_trips_through_json() {
        let original = Message::tool_calls(vec![ToolCallRequest {
            id: "c1".into(),
            name: "get_refund_status".into(),
            arguments: r#"{"invoice_id":"INV-1"}"#.into(),
        }]);
        let json = serde_json::to_string(&original).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.role, Role::Assistant);
        assert_eq!(back.tool_calls, original.tool_calls);
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        assert_eq!(serde_json::to_string(&Role::Tool).unwrap(), "\"tool\"");
    }

    #[test]
    fn chat_response_reports_tool_calls() {
        let mut r = ChatResponse::text("hi");
        assert!(!r.has_tool_calls());
        r.tool_calls.push(ToolCallRequest {
            id: "1".into(),
            name: "t".into(),
            arguments: "{}".into(),
        });
        assert!(r.has_tool_calls());
    }
}
