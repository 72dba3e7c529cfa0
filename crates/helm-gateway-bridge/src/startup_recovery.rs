//! Startup recovery: a one-shot reconciliation pass for messages left
//! in-flight by a previous process crash.
//!
//! The pass is deliberately delayed a few seconds so the gateway and store
//! connections can stabilize first. Per-message rules live store-side behind
//! the bulk recover operation; the bridge only logs the processed count.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::bridge_config::DeliveryBridgeConfig;
use crate::chat_store::{ChatStore, RecoverAction};
use crate::time_utils::duration_as_age_minutes;

/// The recovery body, runnable directly in tests without the startup delay.
pub async fn run_startup_recovery(config: &DeliveryBridgeConfig, store: &dyn ChatStore) {
    let age_minutes = duration_as_age_minutes(config.startup_recovery_age);
    match store.bulk_recover(age_minutes, RecoverAction::MarkFailed).await {
        Ok(report) => {
            tracing::info!(
                processed = report.processed,
                age_minutes,
                "startup recovery completed"
            );
        }
        Err(error) => {
            tracing::warn!(%error, "startup recovery failed");
        }
    }
}

/// Schedules the delayed one-shot recovery pass on the current runtime.
pub fn start_startup_recovery(
    config: DeliveryBridgeConfig,
    store: Arc<dyn ChatStore>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(config.startup_recovery_delay).await;
        run_startup_recovery(&config, store.as_ref()).await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge_contract::DeliveryStatus;
    use crate::test_support::{InMemoryChatStore, RECOVERED_REASON};

    #[tokio::test]
    async fn recovery_fails_only_messages_older_than_the_threshold() {
        let store = InMemoryChatStore::shared();
        let ten_minutes = 600_000;
        store
            .seed_human_message("chat-1", "msg-sent", DeliveryStatus::Sent, ten_minutes, 0)
            .await;
        store
            .seed_human_message("chat-1", "msg-delivered", DeliveryStatus::Delivered, ten_minutes, 0)
            .await;
        store
            .seed_human_message("chat-2", "msg-processing", DeliveryStatus::Processing, ten_minutes, 0)
            .await;
        store
            .seed_human_message("chat-2", "msg-recent", DeliveryStatus::Sent, 60_000, 0)
            .await;

        let config = DeliveryBridgeConfig {
            store_api_base: "http://unused.invalid".to_string(),
            ..DeliveryBridgeConfig::default()
        };
        run_startup_recovery(&config, store.as_ref()).await;

        for id in ["msg-sent", "msg-delivered", "msg-processing"] {
            let message = store.message(id).await.expect("message");
            assert_eq!(message.delivery_status, Some(DeliveryStatus::Failed));
            assert_eq!(message.failure_reason.as_deref(), Some(RECOVERED_REASON));
        }
        let recent = store.message("msg-recent").await.expect("message");
        assert_eq!(recent.delivery_status, Some(DeliveryStatus::Sent));
        assert_eq!(recent.failure_reason, None);
    }
}
