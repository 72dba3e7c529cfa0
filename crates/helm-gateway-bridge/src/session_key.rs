//! Session key codec for gateway lifecycle events.
//!
//! The gateway stamps every lifecycle event with a session key of the form
//! `{namespace}:{project}:{chat_id}`. The event stream is shared with other
//! integrations, so anything outside our namespace decodes to `None` and the
//! caller drops the event without further action.

#[derive(Debug, Clone, PartialEq, Eq)]
/// Decoded parts of a bridge-owned session key.
pub struct SessionKeyParts {
    pub project: String,
    pub chat_id: String,
}

/// Decodes `{namespace}:{project}:{chat_id}`. Foreign namespaces, missing
/// segments, and empty segments all yield `None`. Pure, no failure mode
/// beyond "not our key".
pub fn decode_session_key(namespace: &str, key: &str) -> Option<SessionKeyParts> {
    let mut parts = key.splitn(3, ':');
    let prefix = parts.next()?;
    if prefix != namespace {
        return None;
    }
    let project = parts.next()?.trim();
    let chat_id = parts.next()?.trim();
    if project.is_empty() || chat_id.is_empty() {
        return None;
    }
    Some(SessionKeyParts {
        project: project.to_string(),
        chat_id: chat_id.to_string(),
    })
}

/// Formats a session key in the bridge's namespace. Used when echoing the
/// originating session back to the store on outbound sends.
pub fn encode_session_key(namespace: &str, project: &str, chat_id: &str) -> String {
    format!("{namespace}:{project}:{chat_id}")
}
