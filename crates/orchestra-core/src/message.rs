//! Conversation messages and tool-call plumbing.
//!
//! These types model the data flowing between the turn loop, the model
//! backend, and the tool executor.  They are provider-agnostic: a concrete
//! [`crate::Model`] translates them into its own wire format.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Who contributed a message to the conversation.
///
/// Stored history alternates between the two senders; the engine's context
/// layer merges adjacent same-sender entries to keep that invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// The human side of the conversation.  Also carries synthesized
    /// tool-result messages and compaction summaries.
    User,
    /// The model side of the conversation.
    Agent,
}

/// One turn contributed by a sender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Who produced this message.
    pub sender: Sender,

    /// Free-text content.  May be empty on agent messages that only carry
    /// tool calls and on user messages that only carry tool results.
    #[serde(default)]
    pub text: String,

    /// Ordered rich-content parts (images, documents, ...) accompanying the
    /// text.  Empty for plain-text messages.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<ContentPart>,

    /// Tool invocations requested by the model (agent messages only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// Tool execution results carried back to the model (present only on
    /// the user-role message synthesized after a tool batch).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<ToolResult>,

    /// Marks a compaction boundary: this message is the summary that
    /// replaces everything before it in the visible context window.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub compaction: bool,
}

impl Message {
    /// Create a plain user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            text: text.into(),
            parts: Vec::new(),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
            compaction: false,
        }
    }

    /// Create a plain agent message.
    pub fn agent(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Agent,
            text: text.into(),
            parts: Vec::new(),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
            compaction: false,
        }
    }

    /// Create an agent message carrying tool-call requests.
    pub fn agent_with_tool_calls(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            sender: Sender::Agent,
            text: text.into(),
            parts: Vec::new(),
            tool_calls,
            tool_results: Vec::new(),
            compaction: false,
        }
    }

    /// Create the synthesized user message that carries a batch's tool
    /// results back to the model.
    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        Self {
            sender: Sender::User,
            text: String::new(),
            parts: Vec::new(),
            tool_calls: Vec::new(),
            tool_results: results,
            compaction: false,
        }
    }

    /// Create a compaction-boundary summary message.
    pub fn summary(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            text: text.into(),
            parts: Vec::new(),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
            compaction: true,
        }
    }

    /// Whether this message requests any tool invocations.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Merge another same-sender message into this one.
    ///
    /// Text is joined with a newline (skipping empty sides), part, call,
    /// and result lists are concatenated, and the compaction flag is
    /// sticky: a merged message is a boundary if either side was.
    pub fn merge(mut self, other: Message) -> Self {
        debug_assert_eq!(self.sender, other.sender, "merge requires same sender");

        if self.text.is_empty() {
            self.text = other.text;
        } else if !other.text.is_empty() {
            self.text.push('\n');
            self.text.push_str(&other.text);
        }

        self.parts.extend(other.parts);
        self.tool_calls.extend(other.tool_calls);
        self.tool_results.extend(other.tool_results);
        self.compaction |= other.compaction;
        self
    }
}

// ---------------------------------------------------------------------------
// Content parts
// ---------------------------------------------------------------------------

/// Where the bytes of a media part live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaSource {
    /// Bytes carried inline, base64-encoded.
    Inline {
        /// MIME type of the payload (e.g. `"image/png"`).
        media_type: String,
        /// Base64-encoded payload.
        data: String,
    },
    /// Bytes referenced by URL; the consumer fetches them.
    Reference {
        /// Location of the payload.
        url: String,
    },
}

/// One ordered rich-content part of a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// A text segment.
    Text {
        /// The text.
        text: String,
    },
    /// An image.
    Image {
        /// Where the image bytes live.
        source: MediaSource,
    },
    /// A video clip.
    Video {
        /// Where the video bytes live.
        source: MediaSource,
    },
    /// A document (PDF, etc.).
    Document {
        /// Where the document bytes live.
        source: MediaSource,
    },
}

// ---------------------------------------------------------------------------
// Tool calls and results
// ---------------------------------------------------------------------------

/// A single tool invocation requested by the model.
///
/// The input payload is raw and unvalidated; the executor validates it
/// against the tool's schema before the tool ever sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlation id assigned by the model, used to pair the eventual
    /// result with this request.  Absent for models that do not issue ids.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Name of the tool to invoke.  Matched case-insensitively against the
    /// executor's registry.
    pub name: String,

    /// Raw input payload.
    pub input: Value,
}

/// Final disposition of one tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    /// The tool ran and produced its result.
    Success,
    /// The tool could not run or failed after exhausting retries.
    Error,
    /// The invocation was cancelled before completing.
    Aborted,
}

/// The result envelope a tool run produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    /// Disposition of the invocation.
    pub status: ToolStatus,

    /// Opaque result data fed back to the model.
    #[serde(default)]
    pub data: Value,

    /// Optional human-readable message (error descriptions, notes).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Out-of-band data for reconstructing tool UI after a reload.
    /// Never forwarded to the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render_data: Option<Value>,
}

impl ToolOutcome {
    /// A successful outcome carrying `data`.
    pub fn success(data: Value) -> Self {
        Self {
            status: ToolStatus::Success,
            data,
            message: None,
            render_data: None,
        }
    }

    /// An error outcome with a description.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Error,
            data: Value::Null,
            message: Some(message.into()),
            render_data: None,
        }
    }

    /// An aborted outcome with a description.
    pub fn aborted(message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Aborted,
            data: Value::Null,
            message: Some(message.into()),
            render_data: None,
        }
    }

    /// Attach render data to this outcome.
    pub fn with_render_data(mut self, render_data: Value) -> Self {
        self.render_data = Some(render_data);
        self
    }
}

/// Outcome of one [`ToolCall`], tagged with its origin for correlation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Name of the tool that was (or would have been) invoked.
    pub tool_name: String,

    /// The [`ToolCall::id`] this result corresponds to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,

    /// The result envelope.
    pub outcome: ToolOutcome,
}

impl ToolResult {
    /// Build a result for a call from its outcome envelope.
    pub fn new(call: &ToolCall, outcome: ToolOutcome) -> Self {
        Self {
            tool_name: call.name.clone(),
            call_id: call.id.clone(),
            outcome,
        }
    }

    /// Whether this result reports an error.
    pub fn is_error(&self) -> bool {
        self.outcome.status == ToolStatus::Error
    }

    /// Whether this result reports a cancelled invocation.
    pub fn is_aborted(&self) -> bool {
        self.outcome.status == ToolStatus::Aborted
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
