//! Chat store client: the bridge's single seam to the reactive message store.
//!
//! The engine holds no authoritative state of its own; everything it decides
//! is recomputed from store snapshots fetched through this contract. Fetches
//! are transport-failure-tolerant (warn log, `None`), mutations surface
//! errors to the caller, and outbound sends treat a duplicate-run 409 as
//! success so gateway at-least-once delivery stays idempotent.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::bridge_contract::{ChatMessage, DeliveryStatus, StuckMessage};

#[derive(Debug, Clone, Serialize)]
/// Partial status mutation applied to one message.
pub struct StatusUpdate {
    pub delivery_status: DeliveryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_until_unix_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl StatusUpdate {
    pub fn to(delivery_status: DeliveryStatus) -> Self {
        Self {
            delivery_status,
            retry_count: None,
            cooldown_until_unix_ms: None,
            failure_reason: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            failure_reason: Some(reason.into()),
            ..Self::to(DeliveryStatus::Failed)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Server-side bulk recovery action.
pub enum RecoverAction {
    MarkFailed,
}

impl RecoverAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MarkFailed => "mark_failed",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
/// Outcome of a bulk recovery pass; the store reports how many messages it
/// touched.
pub struct RecoverReport {
    #[serde(default)]
    pub processed: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
/// Outbound message payload. `run_id` makes the send idempotent under
/// duplicate gateway delivery; `session_key` lets the store echo the message
/// back to the originating session.
pub struct OutboundMessageRequest {
    pub author: String,
    pub content: String,
    pub is_automated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Result of an outbound send. `duplicate` marks the 409 already-saved path,
/// which callers treat identically to a fresh save.
pub struct SendReceipt {
    pub message_id: Option<String>,
    pub duplicate: bool,
}

#[async_trait]
/// Trait contract for chat store access used across the bridge.
pub trait ChatStore: Send + Sync {
    /// Oldest message currently in `status` for the chat, ties broken by
    /// creation order. The FIFO resolver's data source.
    async fn oldest_in_status(
        &self,
        chat_id: &str,
        status: DeliveryStatus,
    ) -> Option<ChatMessage>;

    /// Latest human-authored message in the chat, used by the deferred
    /// cooldown retry to re-check that its target is still current.
    async fn latest_human_message(&self, chat_id: &str) -> Option<ChatMessage>;

    async fn set_status(
        &self,
        chat_id: &str,
        message_id: &str,
        update: StatusUpdate,
    ) -> Result<()>;

    /// Server-side retry: the store increments `retry_count` and resets the
    /// message to `sent` in one transaction.
    async fn retry_message(&self, chat_id: &str, message_id: &str) -> Result<()>;

    async fn bulk_recover(
        &self,
        age_threshold_minutes: u64,
        action: RecoverAction,
    ) -> Result<RecoverReport>;

    /// Global scan of non-terminal messages older than `age_minutes`, across
    /// all chats. Not filtered through the per-chat FIFO.
    async fn stuck_messages(&self, age_minutes: u64, limit: usize) -> Result<Vec<StuckMessage>>;

    async fn send_message(
        &self,
        chat_id: &str,
        request: OutboundMessageRequest,
    ) -> Result<SendReceipt>;

    /// Best effort: failures are logged here and never propagated.
    async fn set_typing(&self, chat_id: &str, typing: bool, author: &str);
}

#[derive(Debug, Clone)]
/// Reqwest-backed `ChatStore` implementation against the store's HTTP API.
pub struct HttpChatStore {
    api_base: String,
    client: reqwest::Client,
}

impl HttpChatStore {
    pub fn new(api_base: impl Into<String>, http_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(http_timeout)
            .build()
            .context("failed to build chat store http client")?;
        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    async fn fetch_message(&self, endpoint: &str) -> Option<ChatMessage> {
        let response = match self.client.get(endpoint).send().await {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(endpoint, %error, "chat store fetch failed");
                return None;
            }
        };
        match response.status() {
            StatusCode::NOT_FOUND => return None,
            status if !status.is_success() => {
                tracing::warn!(endpoint, status = status.as_u16(), "chat store fetch rejected");
                return None;
            }
            _ => {}
        }
        match response.json::<Option<ChatMessage>>().await {
            Ok(message) => message,
            Err(error) => {
                tracing::warn!(endpoint, %error, "chat store fetch body unreadable");
                None
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct SendResponseBody {
    #[serde(default)]
    message_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StuckResponseBody {
    #[serde(default)]
    messages: Vec<StuckMessage>,
}

#[async_trait]
impl ChatStore for HttpChatStore {
    async fn oldest_in_status(
        &self,
        chat_id: &str,
        status: DeliveryStatus,
    ) -> Option<ChatMessage> {
        let endpoint = self.endpoint(&format!(
            "chats/{chat_id}/oldest-{}-message",
            status.as_str()
        ));
        self.fetch_message(&endpoint).await
    }

    async fn latest_human_message(&self, chat_id: &str) -> Option<ChatMessage> {
        let endpoint = self.endpoint(&format!("chats/{chat_id}/latest-human-message"));
        self.fetch_message(&endpoint).await
    }

    async fn set_status(
        &self,
        chat_id: &str,
        message_id: &str,
        update: StatusUpdate,
    ) -> Result<()> {
        let endpoint = self.endpoint(&format!("chats/{chat_id}/messages/{message_id}/status"));
        let response = self
            .client
            .patch(&endpoint)
            .json(&update)
            .send()
            .await
            .with_context(|| format!("status update request failed: {endpoint}"))?;
        if !response.status().is_success() {
            anyhow::bail!(
                "status update rejected: endpoint={endpoint} status={}",
                response.status().as_u16()
            );
        }
        Ok(())
    }

    async fn retry_message(&self, chat_id: &str, message_id: &str) -> Result<()> {
        let endpoint = self.endpoint(&format!("chats/{chat_id}/messages/{message_id}/retry"));
        let response = self
            .client
            .post(&endpoint)
            .send()
            .await
            .with_context(|| format!("retry request failed: {endpoint}"))?;
        if !response.status().is_success() {
            anyhow::bail!(
                "retry rejected: endpoint={endpoint} status={}",
                response.status().as_u16()
            );
        }
        Ok(())
    }

    async fn bulk_recover(
        &self,
        age_threshold_minutes: u64,
        action: RecoverAction,
    ) -> Result<RecoverReport> {
        let endpoint = self.endpoint("chats/messages/recover");
        let body = serde_json::json!({
            "age_threshold_minutes": age_threshold_minutes,
            "action": action.as_str(),
        });
        let response = self
            .client
            .post(&endpoint)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("bulk recover request failed: {endpoint}"))?;
        if !response.status().is_success() {
            anyhow::bail!(
                "bulk recover rejected: endpoint={endpoint} status={}",
                response.status().as_u16()
            );
        }
        response
            .json::<RecoverReport>()
            .await
            .context("bulk recover response body unreadable")
    }

    async fn stuck_messages(&self, age_minutes: u64, limit: usize) -> Result<Vec<StuckMessage>> {
        let endpoint = self.endpoint("chats/messages/stuck");
        let response = self
            .client
            .get(&endpoint)
            .query(&[
                ("age_minutes", age_minutes.to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await
            .with_context(|| format!("stuck scan request failed: {endpoint}"))?;
        if !response.status().is_success() {
            anyhow::bail!(
                "stuck scan rejected: endpoint={endpoint} status={}",
                response.status().as_u16()
            );
        }
        let body = response
            .json::<StuckResponseBody>()
            .await
            .context("stuck scan response body unreadable")?;
        Ok(body.messages)
    }

    async fn send_message(
        &self,
        chat_id: &str,
        request: OutboundMessageRequest,
    ) -> Result<SendReceipt> {
        let endpoint = self.endpoint(&format!("chats/{chat_id}/messages"));
        let response = self
            .client
            .post(&endpoint)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("send request failed: {endpoint}"))?;
        // 409 means the store already persisted this run's message through a
        // racing ingestion path. That is success for the dispatcher.
        if response.status() == StatusCode::CONFLICT {
            return Ok(SendReceipt {
                message_id: None,
                duplicate: true,
            });
        }
        if !response.status().is_success() {
            anyhow::bail!(
                "send rejected: endpoint={endpoint} status={}",
                response.status().as_u16()
            );
        }
        let body = response.json::<SendResponseBody>().await.unwrap_or(
            SendResponseBody { message_id: None },
        );
        Ok(SendReceipt {
            message_id: body.message_id,
            duplicate: false,
        })
    }

    async fn set_typing(&self, chat_id: &str, typing: bool, author: &str) {
        let endpoint = self.endpoint(&format!("chats/{chat_id}/typing"));
        let body = serde_json::json!({ "typing": typing, "author": author });
        match self.client.post(&endpoint).json(&body).send().await {
            Ok(response) if !response.status().is_success() => {
                tracing::warn!(
                    endpoint = %endpoint,
                    status = response.status().as_u16(),
                    "typing indicator update rejected"
                );
            }
            Ok(_) => {}
            Err(error) => {
                tracing::warn!(endpoint = %endpoint, %error, "typing indicator update failed");
            }
        }
    }
}
