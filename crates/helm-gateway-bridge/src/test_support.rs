//! In-memory `ChatStore` test double used by engine, sweeper, recovery, and
//! runtime tests. Mirrors the store-side semantics the bridge relies on:
//! FIFO-by-creation-order resolution, server-side retry increment, age-based
//! bulk recovery, and duplicate run-id detection on sends.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use anyhow::Result;

use crate::bridge_contract::{ChatMessage, DeliveryStatus, StuckMessage};
use crate::chat_store::{
    ChatStore, OutboundMessageRequest, RecoverAction, RecoverReport, SendReceipt, StatusUpdate,
};
use crate::time_utils::current_unix_timestamp_ms;

pub const HUMAN_AUTHOR: &str = "human";
pub const RECOVERED_REASON: &str = "recovered after restart";

#[derive(Default)]
struct InMemoryState {
    messages: Vec<ChatMessage>,
    seen_run_ids: HashSet<String>,
    typing_calls: Vec<(String, bool)>,
    retry_calls: Vec<(String, String)>,
    send_requests: Vec<(String, OutboundMessageRequest)>,
    next_id: u64,
}

#[derive(Default)]
pub struct InMemoryChatStore {
    inner: Mutex<InMemoryState>,
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Seeds a human message whose creation time lies `age_ms` in the past.
    pub async fn seed_human_message(
        &self,
        chat_id: &str,
        id: &str,
        status: DeliveryStatus,
        age_ms: u64,
        retry_count: u32,
    ) {
        let created_at_unix_ms = current_unix_timestamp_ms().saturating_sub(age_ms);
        self.inner.lock().await.messages.push(ChatMessage {
            id: id.to_string(),
            chat_id: chat_id.to_string(),
            author: HUMAN_AUTHOR.to_string(),
            delivery_status: Some(status),
            retry_count,
            cooldown_until_unix_ms: None,
            failure_reason: None,
            created_at_unix_ms,
        });
    }

    pub async fn message(&self, id: &str) -> Option<ChatMessage> {
        self.inner
            .lock()
            .await
            .messages
            .iter()
            .find(|message| message.id == id)
            .cloned()
    }

    pub async fn typing_calls(&self) -> Vec<(String, bool)> {
        self.inner.lock().await.typing_calls.clone()
    }

    pub async fn retry_calls(&self) -> Vec<(String, String)> {
        self.inner.lock().await.retry_calls.clone()
    }

    pub async fn send_requests(&self) -> Vec<(String, OutboundMessageRequest)> {
        self.inner.lock().await.send_requests.clone()
    }

    pub async fn message_count(&self) -> usize {
        self.inner.lock().await.messages.len()
    }
}

#[async_trait]
impl ChatStore for InMemoryChatStore {
    async fn oldest_in_status(
        &self,
        chat_id: &str,
        status: DeliveryStatus,
    ) -> Option<ChatMessage> {
        self.inner
            .lock()
            .await
            .messages
            .iter()
            .filter(|message| {
                message.chat_id == chat_id
                    && message.author == HUMAN_AUTHOR
                    && message.delivery_status == Some(status)
            })
            .min_by_key(|message| message.created_at_unix_ms)
            .cloned()
    }

    async fn latest_human_message(&self, chat_id: &str) -> Option<ChatMessage> {
        self.inner
            .lock()
            .await
            .messages
            .iter()
            .filter(|message| message.chat_id == chat_id && message.author == HUMAN_AUTHOR)
            .max_by_key(|message| message.created_at_unix_ms)
            .cloned()
    }

    async fn set_status(
        &self,
        chat_id: &str,
        message_id: &str,
        update: StatusUpdate,
    ) -> Result<()> {
        let mut state = self.inner.lock().await;
        let message = state
            .messages
            .iter_mut()
            .find(|message| message.chat_id == chat_id && message.id == message_id)
            .ok_or_else(|| anyhow::anyhow!("message not found: {message_id}"))?;
        message.delivery_status = Some(update.delivery_status);
        if let Some(retry_count) = update.retry_count {
            message.retry_count = retry_count;
        }
        message.cooldown_until_unix_ms = update.cooldown_until_unix_ms;
        if update.failure_reason.is_some() {
            message.failure_reason = update.failure_reason;
        }
        Ok(())
    }

    async fn retry_message(&self, chat_id: &str, message_id: &str) -> Result<()> {
        let mut state = self.inner.lock().await;
        state
            .retry_calls
            .push((chat_id.to_string(), message_id.to_string()));
        let message = state
            .messages
            .iter_mut()
            .find(|message| message.chat_id == chat_id && message.id == message_id)
            .ok_or_else(|| anyhow::anyhow!("message not found: {message_id}"))?;
        message.retry_count += 1;
        message.delivery_status = Some(DeliveryStatus::Sent);
        message.cooldown_until_unix_ms = None;
        Ok(())
    }

    async fn bulk_recover(
        &self,
        age_threshold_minutes: u64,
        _action: RecoverAction,
    ) -> Result<RecoverReport> {
        let now = current_unix_timestamp_ms();
        let threshold_ms = age_threshold_minutes * 60_000;
        let mut processed = 0;
        for message in &mut self.inner.lock().await.messages {
            let non_terminal = matches!(message.delivery_status, Some(status) if !status.is_terminal());
            let age_ms = now.saturating_sub(message.created_at_unix_ms);
            if non_terminal && age_ms >= threshold_ms {
                message.delivery_status = Some(DeliveryStatus::Failed);
                message.failure_reason = Some(RECOVERED_REASON.to_string());
                processed += 1;
            }
        }
        Ok(RecoverReport { processed })
    }

    async fn stuck_messages(&self, age_minutes: u64, limit: usize) -> Result<Vec<StuckMessage>> {
        let now = current_unix_timestamp_ms();
        let threshold_ms = age_minutes * 60_000;
        Ok(self
            .inner
            .lock()
            .await
            .messages
            .iter()
            .filter_map(|message| {
                let status = message.delivery_status?;
                if status.is_terminal() {
                    return None;
                }
                let age_ms = now.saturating_sub(message.created_at_unix_ms);
                if age_ms < threshold_ms {
                    return None;
                }
                Some(StuckMessage {
                    id: message.id.clone(),
                    chat_id: message.chat_id.clone(),
                    delivery_status: status,
                    retry_count: message.retry_count,
                    age_ms,
                })
            })
            .take(limit)
            .collect())
    }

    async fn send_message(
        &self,
        chat_id: &str,
        request: OutboundMessageRequest,
    ) -> Result<SendReceipt> {
        let mut state = self.inner.lock().await;
        state
            .send_requests
            .push((chat_id.to_string(), request.clone()));
        if let Some(run_id) = &request.run_id {
            if !state.seen_run_ids.insert(run_id.clone()) {
                return Ok(SendReceipt {
                    message_id: None,
                    duplicate: true,
                });
            }
        }
        state.next_id += 1;
        let id = format!("mem-{}", state.next_id);
        state.messages.push(ChatMessage {
            id: id.clone(),
            chat_id: chat_id.to_string(),
            author: request.author,
            delivery_status: None,
            retry_count: 0,
            cooldown_until_unix_ms: None,
            failure_reason: None,
            created_at_unix_ms: current_unix_timestamp_ms(),
        });
        Ok(SendReceipt {
            message_id: Some(id),
            duplicate: false,
        })
    }

    async fn set_typing(&self, chat_id: &str, typing: bool, _author: &str) {
        self.inner
            .lock()
            .await
            .typing_calls
            .push((chat_id.to_string(), typing));
    }
}
