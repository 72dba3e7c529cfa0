//! Wire contracts shared between the gateway bridge and the chat store.
//!
//! Defines the delivery-status pipeline, the message row shapes the bridge
//! reads and mutates, the typed gateway lifecycle events, and the transcript
//! payload emitted by a finished agent run.

use serde::{Deserialize, Serialize};

/// Sentinel reply bodies that resolve a message without producing output.
pub const NO_REPLY_SENTINEL: &str = "NO_REPLY";
pub const HEARTBEAT_OK_SENTINEL: &str = "HEARTBEAT_OK";

const ASSISTANT_TRANSCRIPT_ROLE: &str = "assistant";
const TEXT_SEGMENT_KIND: &str = "text";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Enumerates supported `DeliveryStatus` values for human-authored messages.
pub enum DeliveryStatus {
    Sent,
    Delivered,
    Processing,
    Responded,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Processing => "processing",
            Self::Responded => "responded",
            Self::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "sent" => Some(Self::Sent),
            "delivered" => Some(Self::Delivered),
            "processing" => Some(Self::Processing),
            "responded" => Some(Self::Responded),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Terminal statuses are never touched by the sweeper or the engine.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Responded | Self::Failed)
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Message row as served by the chat store. Non-human messages carry no
/// `delivery_status` and are invisible to the bridge.
pub struct ChatMessage {
    pub id: String,
    pub chat_id: String,
    pub author: String,
    #[serde(default)]
    pub delivery_status: Option<DeliveryStatus>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub cooldown_until_unix_ms: Option<u64>,
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub created_at_unix_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Row shape of the store's global stuck-message scan.
pub struct StuckMessage {
    pub id: String,
    pub chat_id: String,
    pub delivery_status: DeliveryStatus,
    #[serde(default)]
    pub retry_count: u32,
    pub age_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Typed gateway lifecycle events consumed by the bridge runtime.
///
/// The gateway scopes events to a session, never to a message; correlation
/// back to a concrete message id is the bridge's job.
pub enum GatewayEvent {
    MessageReceived {
        session_key: String,
    },
    AgentStart {
        session_key: String,
    },
    AgentEnd {
        session_key: String,
        outcome: AgentRunOutcome,
    },
}

impl GatewayEvent {
    pub fn session_key(&self) -> &str {
        match self {
            Self::MessageReceived { session_key }
            | Self::AgentStart { session_key }
            | Self::AgentEnd { session_key, .. } => session_key,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::MessageReceived { .. } => "message_received",
            Self::AgentStart { .. } => "agent_start",
            Self::AgentEnd { .. } => "agent_end",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
/// Result payload of a finished agent run as reported by the gateway.
pub struct AgentRunOutcome {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub transcript: Vec<TranscriptEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
/// One entry of the gateway transcript. Content arrives either as a plain
/// string or as a list of typed segments.
pub struct TranscriptEntry {
    pub role: String,
    pub content: TranscriptContent,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TranscriptContent {
    Text(String),
    Segments(Vec<TranscriptSegment>),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TranscriptSegment {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

/// Extracts the deliverable assistant reply from a gateway transcript.
///
/// Scans backward for the last assistant-authored entry and joins its
/// `text`-typed segments in order, separated by a blank line. Empty output
/// and the no-content sentinels yield `None`; the caller still resolves the
/// message, it just has nothing to dispatch.
pub fn extract_assistant_reply(transcript: &[TranscriptEntry]) -> Option<String> {
    let entry = transcript
        .iter()
        .rev()
        .find(|entry| entry.role == ASSISTANT_TRANSCRIPT_ROLE)?;

    let joined = match &entry.content {
        TranscriptContent::Text(text) => text.clone(),
        TranscriptContent::Segments(segments) => segments
            .iter()
            .filter(|segment| segment.kind == TEXT_SEGMENT_KIND)
            .filter_map(|segment| segment.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n\n"),
    };

    let trimmed = joined.trim();
    if trimmed.is_empty()
        || trimmed == NO_REPLY_SENTINEL
        || trimmed == HEARTBEAT_OK_SENTINEL
    {
        return None;
    }
    Some(trimmed.to_string())
}
