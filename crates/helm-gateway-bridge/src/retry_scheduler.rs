//! Deferred cooldown retry: a one-shot timer per parked message.
//!
//! When a run fails with a classified cooldown the message regresses to
//! `sent` and a single deferred retry is scheduled for the parsed wait. The
//! timer re-checks the chat before firing: a newer human message, or a
//! message that resolved through another path, cancels the retry. The
//! heartbeat sweeper carries an independent second retry path in case this
//! timer is lost to a crash.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::bridge_contract::{ChatMessage, DeliveryStatus};
use crate::chat_store::ChatStore;

/// A deferred retry only fires when the parked message is still the chat's
/// latest human message and still `sent`.
pub fn retry_still_applies(latest: Option<&ChatMessage>, message_id: &str) -> bool {
    match latest {
        Some(message) => {
            message.id == message_id && message.delivery_status == Some(DeliveryStatus::Sent)
        }
        None => false,
    }
}

/// Spawns the one-shot deferred retry for a cooldown-parked message.
pub fn schedule_cooldown_retry(
    store: Arc<dyn ChatStore>,
    chat_id: String,
    message_id: String,
    wait_ms: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(wait_ms)).await;
        let latest = store.latest_human_message(&chat_id).await;
        if !retry_still_applies(latest.as_ref(), &message_id) {
            tracing::info!(
                chat_id = %chat_id,
                message_id = %message_id,
                "deferred retry skipped, message no longer current"
            );
            return;
        }
        match store.retry_message(&chat_id, &message_id).await {
            Ok(()) => {
                tracing::info!(
                    chat_id = %chat_id,
                    message_id = %message_id,
                    wait_ms,
                    "cooldown retry issued"
                );
            }
            Err(error) => {
                tracing::warn!(
                    chat_id = %chat_id,
                    message_id = %message_id,
                    %error,
                    "cooldown retry failed"
                );
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge_contract::DeliveryStatus;
    use crate::test_support::InMemoryChatStore;

    fn message(id: &str, status: DeliveryStatus) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            chat_id: "chat-1".to_string(),
            author: "human".to_string(),
            delivery_status: Some(status),
            retry_count: 0,
            cooldown_until_unix_ms: None,
            failure_reason: None,
            created_at_unix_ms: 0,
        }
    }

    #[test]
    fn guard_requires_same_id_and_sent_status() {
        let sent = message("msg-1", DeliveryStatus::Sent);
        assert!(retry_still_applies(Some(&sent), "msg-1"));

        let newer = message("msg-2", DeliveryStatus::Sent);
        assert!(!retry_still_applies(Some(&newer), "msg-1"));

        let resolved = message("msg-1", DeliveryStatus::Responded);
        assert!(!retry_still_applies(Some(&resolved), "msg-1"));

        assert!(!retry_still_applies(None, "msg-1"));
    }

    #[tokio::test]
    async fn deferred_retry_fires_once_for_a_still_parked_message() {
        let store = Arc::new(InMemoryChatStore::new());
        store
            .seed_human_message("chat-1", "msg-1", DeliveryStatus::Sent, 0, 0)
            .await;

        let handle =
            schedule_cooldown_retry(store.clone(), "chat-1".into(), "msg-1".into(), 20);
        handle.await.expect("retry task");

        assert_eq!(
            store.retry_calls().await,
            vec![("chat-1".to_string(), "msg-1".to_string())]
        );
        let message = store.message("msg-1").await.expect("message");
        assert_eq!(message.delivery_status, Some(DeliveryStatus::Sent));
        assert_eq!(message.retry_count, 1);
    }

    #[tokio::test]
    async fn deferred_retry_is_skipped_when_a_newer_message_arrived() {
        let store = Arc::new(InMemoryChatStore::new());
        store
            .seed_human_message("chat-1", "msg-1", DeliveryStatus::Sent, 60_000, 0)
            .await;
        store
            .seed_human_message("chat-1", "msg-2", DeliveryStatus::Sent, 0, 0)
            .await;

        let handle =
            schedule_cooldown_retry(store.clone(), "chat-1".into(), "msg-1".into(), 20);
        handle.await.expect("retry task");

        assert!(store.retry_calls().await.is_empty());
    }
}
