//! Debug Adapter Protocol payloads used by the debug-session file systems.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An adapter-to-client message as observed by the session tracker.
///
/// Only the fields the tracker dispatches on are decoded; payloads stay as raw JSON in `body`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProtocolMessage {
    #[serde(default)]
    pub seq: u64,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub body: Option<Value>,
}

impl ProtocolMessage {
    pub fn is_response_to(&self, command: &str) -> bool {
        self.type_ == "response" && self.command.as_deref() == Some(command)
    }

    pub fn is_event(&self, event: &str) -> bool {
        self.type_ == "event" && self.event.as_deref() == Some(event)
    }
}

/// The subset of adapter capabilities the file systems care about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    #[serde(default)]
    pub supports_read_memory_request: bool,
    #[serde(default)]
    pub supports_write_memory_request: bool,
    #[serde(default)]
    pub supports_memory_event: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadMemoryArguments {
    pub memory_reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadMemoryResponseBody {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub unreadable_bytes: Option<u64>,
    /// Base64 encoded bytes; absent when nothing could be read.
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteMemoryArguments {
    pub memory_reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_partial: Option<bool>,
    /// Base64 encoded bytes.
    pub data: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteMemoryResponseBody {
    #[serde(default)]
    pub offset: Option<i64>,
    #[serde(default)]
    pub bytes_written: Option<u64>,
}

/// Body of the `memory` event: `count` bytes at `offset` relative to `memory_reference` changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryEventBody {
    pub memory_reference: String,
    pub offset: i64,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoppedEventBody {
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub thread_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceArguments {
    pub thread_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub levels: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceResponseBody {
    #[serde(default)]
    pub stack_frames: Vec<StackFrame>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StackFrame {
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceArguments {
    pub source_reference: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceResponseBody {
    pub content: String,
    #[serde(default)]
    pub mime_type: Option<String>,
}
