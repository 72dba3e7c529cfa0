//! Delivery state machine: maps session-scoped gateway lifecycle events onto
//! per-message status transitions.
//!
//! The gateway never names a message id, so every event is resolved against
//! the chat's oldest message in the expected source status (the FIFO rule).
//! An event with no qualifying message is a safe no-op. The engine itself is
//! stateless; the store snapshot is re-read on every event.

use std::sync::Arc;

use anyhow::Result;

use crate::bridge_config::DeliveryBridgeConfig;
use crate::bridge_contract::{
    extract_assistant_reply, AgentRunOutcome, ChatMessage, DeliveryStatus, GatewayEvent,
};
use crate::chat_store::{ChatStore, OutboundMessageRequest, StatusUpdate};
use crate::failure_classifier::{classify_agent_failure, AgentFailureKind};
use crate::retry_scheduler::schedule_cooldown_retry;
use crate::session_key::{decode_session_key, SessionKeyParts};
use crate::time_utils::current_unix_timestamp_ms;

pub const COOLDOWN_PARKED_REASON: &str = "waiting for model availability";
const UNSPECIFIED_FAILURE_REASON: &str = "agent run failed without a reported error";

/// Stateless event-to-transition engine over one chat store.
pub struct DeliveryEngine {
    config: DeliveryBridgeConfig,
    store: Arc<dyn ChatStore>,
}

impl DeliveryEngine {
    pub fn new(config: DeliveryBridgeConfig, store: Arc<dyn ChatStore>) -> Self {
        Self { config, store }
    }

    /// Entry point for one gateway event. Foreign-namespace session keys are
    /// silently dropped; everything else resolves through the FIFO rule.
    pub async fn handle_event(&self, event: &GatewayEvent) -> Result<()> {
        let Some(parts) =
            decode_session_key(&self.config.session_namespace, event.session_key())
        else {
            tracing::debug!(
                session_key = event.session_key(),
                "session key outside bridge namespace, ignoring"
            );
            return Ok(());
        };

        match event {
            GatewayEvent::MessageReceived { .. } => {
                self.advance_oldest(&parts.chat_id, DeliveryStatus::Sent, DeliveryStatus::Delivered)
                    .await?;
                Ok(())
            }
            GatewayEvent::AgentStart { .. } => {
                self.advance_oldest(
                    &parts.chat_id,
                    DeliveryStatus::Delivered,
                    DeliveryStatus::Processing,
                )
                .await?;
                Ok(())
            }
            GatewayEvent::AgentEnd { outcome, .. } => {
                self.handle_agent_end(&parts, event.session_key(), outcome).await
            }
        }
    }

    /// FIFO resolver + transition: advances the chat's oldest message in
    /// `from` to `to`. Returns the resolved message, or `None` when the
    /// event had nothing to act on.
    async fn advance_oldest(
        &self,
        chat_id: &str,
        from: DeliveryStatus,
        to: DeliveryStatus,
    ) -> Result<Option<ChatMessage>> {
        let Some(message) = self.store.oldest_in_status(chat_id, from).await else {
            tracing::info!(
                chat_id = %chat_id,
                from = from.as_str(),
                to = to.as_str(),
                "no message to advance"
            );
            return Ok(None);
        };
        self.store
            .set_status(chat_id, &message.id, StatusUpdate::to(to))
            .await?;
        tracing::info!(
            chat_id = %chat_id,
            message_id = %message.id,
            from = from.as_str(),
            to = to.as_str(),
            "message advanced"
        );
        Ok(Some(message))
    }

    /// `agent_end` handling. The typing indicator is cleared on every exit
    /// path, including when no message could be resolved, before any error
    /// is surfaced to the router boundary.
    async fn handle_agent_end(
        &self,
        parts: &SessionKeyParts,
        session_key: &str,
        outcome: &AgentRunOutcome,
    ) -> Result<()> {
        let result = if outcome.success {
            self.resolve_successful_run(parts, session_key, outcome).await
        } else {
            self.resolve_failed_run(parts, outcome).await
        };
        self.store
            .set_typing(&parts.chat_id, false, &self.config.assistant_author)
            .await;
        result
    }

    async fn resolve_successful_run(
        &self,
        parts: &SessionKeyParts,
        session_key: &str,
        outcome: &AgentRunOutcome,
    ) -> Result<()> {
        // Dispatch before resolving so the reply is visible by the time the
        // message reads as responded. Sentinel/empty replies resolve the
        // message without dispatching anything.
        if let Some(reply) = extract_assistant_reply(&outcome.transcript) {
            let receipt = self
                .store
                .send_message(
                    &parts.chat_id,
                    OutboundMessageRequest {
                        author: self.config.assistant_author.clone(),
                        content: reply,
                        is_automated: true,
                        run_id: outcome.run_id.clone(),
                        session_key: Some(session_key.to_string()),
                    },
                )
                .await?;
            if receipt.duplicate {
                tracing::info!(
                    chat_id = %parts.chat_id,
                    run_id = outcome.run_id.as_deref().unwrap_or(""),
                    "reply already persisted, duplicate send skipped"
                );
            }
        } else {
            tracing::info!(chat_id = %parts.chat_id, "run produced no deliverable content");
        }

        self.advance_oldest(
            &parts.chat_id,
            DeliveryStatus::Processing,
            DeliveryStatus::Responded,
        )
        .await?;
        Ok(())
    }

    async fn resolve_failed_run(
        &self,
        parts: &SessionKeyParts,
        outcome: &AgentRunOutcome,
    ) -> Result<()> {
        let error_text = outcome
            .error
            .as_deref()
            .unwrap_or(UNSPECIFIED_FAILURE_REASON);
        let Some(message) = self
            .store
            .oldest_in_status(&parts.chat_id, DeliveryStatus::Processing)
            .await
        else {
            tracing::info!(chat_id = %parts.chat_id, "failed run had no processing message");
            return Ok(());
        };

        match classify_agent_failure(error_text) {
            AgentFailureKind::Cooldown { wait_ms } => {
                // Park the message back in `sent` and schedule the one-shot
                // deferred retry. The sweeper enforces the attempt budget.
                self.store
                    .set_status(
                        &parts.chat_id,
                        &message.id,
                        StatusUpdate {
                            delivery_status: DeliveryStatus::Sent,
                            retry_count: None,
                            cooldown_until_unix_ms: Some(
                                current_unix_timestamp_ms().saturating_add(wait_ms),
                            ),
                            failure_reason: Some(COOLDOWN_PARKED_REASON.to_string()),
                        },
                    )
                    .await?;
                tracing::info!(
                    chat_id = %parts.chat_id,
                    message_id = %message.id,
                    wait_ms,
                    "cooldown detected, message parked for retry"
                );
                schedule_cooldown_retry(
                    self.store.clone(),
                    parts.chat_id.clone(),
                    message.id.clone(),
                    wait_ms,
                );
            }
            AgentFailureKind::Hard { reason } => {
                self.store
                    .set_status(&parts.chat_id, &message.id, StatusUpdate::failed(reason.as_str()))
                    .await?;
                tracing::warn!(
                    chat_id = %parts.chat_id,
                    message_id = %message.id,
                    reason = %reason,
                    "run failed, message marked failed"
                );
            }
        }
        Ok(())
    }
}
