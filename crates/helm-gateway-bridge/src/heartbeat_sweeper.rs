//! Heartbeat sweeper: the periodic defense against agent runs that never
//! report back and gateway events that are silently dropped.
//!
//! Each tick scans the store's global stuck list and applies status-specific
//! timeout rules. The sweep also carries the second retry path for `sent`
//! messages whose deferred cooldown timer was lost to a crash.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::bridge_config::DeliveryBridgeConfig;
use crate::bridge_contract::{DeliveryStatus, StuckMessage};
use crate::chat_store::{ChatStore, StatusUpdate};
use crate::time_utils::duration_as_age_minutes;

pub const PROCESSING_TIMEOUT_REASON: &str = "processing timeout (agent may be stuck)";
pub const DELIVERY_TIMEOUT_REASON: &str = "delivery timeout (agent didn't start processing)";
pub const MAX_RETRIES_REASON: &str = "max retries exceeded";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Age cutoffs applied per status during a sweep tick.
pub struct SweepThresholds {
    pub processing_timeout_ms: u64,
    pub delivered_timeout_ms: u64,
    pub sent_retry_age_ms: u64,
    pub max_retry_attempts: u32,
}

impl SweepThresholds {
    pub fn from_config(config: &DeliveryBridgeConfig) -> Self {
        Self {
            processing_timeout_ms: config.processing_timeout.as_millis() as u64,
            delivered_timeout_ms: config.delivered_timeout.as_millis() as u64,
            sent_retry_age_ms: config.sent_retry_age.as_millis() as u64,
            max_retry_attempts: config.max_retry_attempts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Enumerates supported `SweepAction` values.
pub enum SweepAction {
    MarkFailed { reason: &'static str },
    Retry,
}

/// Pure per-message sweep decision. `None` means the message has not yet
/// overstayed its state-specific timeout.
pub fn plan_sweep_action(
    message: &StuckMessage,
    thresholds: &SweepThresholds,
) -> Option<SweepAction> {
    match message.delivery_status {
        DeliveryStatus::Processing if message.age_ms > thresholds.processing_timeout_ms => {
            Some(SweepAction::MarkFailed {
                reason: PROCESSING_TIMEOUT_REASON,
            })
        }
        DeliveryStatus::Delivered if message.age_ms > thresholds.delivered_timeout_ms => {
            Some(SweepAction::MarkFailed {
                reason: DELIVERY_TIMEOUT_REASON,
            })
        }
        DeliveryStatus::Sent if message.age_ms > thresholds.sent_retry_age_ms => {
            if message.retry_count < thresholds.max_retry_attempts {
                Some(SweepAction::Retry)
            } else {
                Some(SweepAction::MarkFailed {
                    reason: MAX_RETRIES_REASON,
                })
            }
        }
        _ => None,
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
/// Tally of one sweep tick, for logging and tests.
pub struct SweepTickReport {
    pub scanned: usize,
    pub failed: usize,
    pub retried: usize,
}

/// One full sweep: scan, plan, apply. Store errors on individual messages
/// are warn-logged and the rest of the tick continues.
pub async fn run_sweep_tick(
    config: &DeliveryBridgeConfig,
    store: &dyn ChatStore,
) -> Result<SweepTickReport> {
    let stuck = store
        .stuck_messages(
            duration_as_age_minutes(config.stuck_scan_age),
            config.stuck_scan_limit,
        )
        .await
        .context("stuck message scan failed")?;

    let thresholds = SweepThresholds::from_config(config);
    let mut report = SweepTickReport {
        scanned: stuck.len(),
        ..SweepTickReport::default()
    };
    for message in &stuck {
        match plan_sweep_action(message, &thresholds) {
            Some(SweepAction::MarkFailed { reason }) => {
                match store
                    .set_status(&message.chat_id, &message.id, StatusUpdate::failed(reason))
                    .await
                {
                    Ok(()) => {
                        report.failed += 1;
                        tracing::warn!(
                            chat_id = %message.chat_id,
                            message_id = %message.id,
                            status = message.delivery_status.as_str(),
                            age_ms = message.age_ms,
                            reason,
                            "stuck message timed out"
                        );
                    }
                    Err(error) => {
                        tracing::warn!(
                            chat_id = %message.chat_id,
                            message_id = %message.id,
                            %error,
                            "sweep failed to mark message"
                        );
                    }
                }
            }
            Some(SweepAction::Retry) => {
                match store.retry_message(&message.chat_id, &message.id).await {
                    Ok(()) => {
                        report.retried += 1;
                        tracing::info!(
                            chat_id = %message.chat_id,
                            message_id = %message.id,
                            retry_count = message.retry_count,
                            "stale sent message re-queued"
                        );
                    }
                    Err(error) => {
                        tracing::warn!(
                            chat_id = %message.chat_id,
                            message_id = %message.id,
                            %error,
                            "sweep retry failed"
                        );
                    }
                }
            }
            None => {}
        }
    }
    Ok(report)
}

/// Background handle for the sweeper loop.
pub struct SweeperHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    pub async fn shutdown(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

/// Starts the periodic sweeper on the current Tokio runtime.
pub fn start_heartbeat_sweeper(
    config: DeliveryBridgeConfig,
    store: Arc<dyn ChatStore>,
) -> Result<SweeperHandle> {
    if config.sweep_interval.is_zero() {
        anyhow::bail!("sweep interval must be greater than zero");
    }
    let handle = tokio::runtime::Handle::try_current()
        .context("heartbeat sweeper requires an active Tokio runtime")?;

    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
    let task = handle.spawn(async move {
        let mut interval = tokio::time::interval(config.sweep_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // First tick of a tokio interval fires immediately; swallow it so a
        // restart does not race the startup recovery pass.
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match run_sweep_tick(&config, store.as_ref()).await {
                        Ok(report) if report.failed > 0 || report.retried > 0 => {
                            tracing::info!(
                                scanned = report.scanned,
                                failed = report.failed,
                                retried = report.retried,
                                "sweep tick applied actions"
                            );
                        }
                        Ok(_) => {}
                        Err(error) => {
                            tracing::warn!(%error, "sweep tick abandoned");
                        }
                    }
                }
                _ = &mut shutdown_rx => break,
            }
        }
    });

    Ok(SweeperHandle {
        shutdown_tx: Some(shutdown_tx),
        task: Some(task),
    })
}
