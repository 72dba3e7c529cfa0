//! Bridge runtime: the top-level event router.
//!
//! Subscribes the delivery engine to the typed gateway event bus, starts the
//! heartbeat sweeper and the startup recovery pass, and isolates every event
//! handler so one failure never blocks other hooks or reaches the gateway's
//! dispatch path. The gateway treats hooks as fire-and-forget; nothing is
//! ever surfaced back to it synchronously.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::bridge_config::DeliveryBridgeConfig;
use crate::bridge_contract::GatewayEvent;
use crate::chat_store::ChatStore;
use crate::delivery_engine::DeliveryEngine;
use crate::heartbeat_sweeper::{start_heartbeat_sweeper, SweeperHandle};
use crate::startup_recovery::start_startup_recovery;

/// Handle for a running delivery bridge.
pub struct DeliveryBridgeHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    router_task: Option<JoinHandle<()>>,
    sweeper: SweeperHandle,
    recovery_task: JoinHandle<()>,
}

impl DeliveryBridgeHandle {
    pub fn is_running(&self) -> bool {
        self.router_task.is_some()
    }

    pub async fn shutdown(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(task) = self.router_task.take() {
            let _ = task.await;
        }
        self.sweeper.shutdown().await;
        self.recovery_task.abort();
    }
}

/// Starts the delivery bridge: router loop, heartbeat sweeper, and delayed
/// startup recovery, all on the current Tokio runtime.
pub fn start_delivery_bridge(
    config: DeliveryBridgeConfig,
    store: Arc<dyn ChatStore>,
    mut events: mpsc::Receiver<GatewayEvent>,
) -> Result<DeliveryBridgeHandle> {
    config.validate()?;
    let handle = tokio::runtime::Handle::try_current()
        .context("delivery bridge requires an active Tokio runtime")?;

    let sweeper = start_heartbeat_sweeper(config.clone(), store.clone())?;
    let recovery_task = start_startup_recovery(config.clone(), store.clone());
    let engine = Arc::new(DeliveryEngine::new(config, store));

    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
    let router_task = handle.spawn(async move {
        loop {
            tokio::select! {
                maybe_event = events.recv() => {
                    let Some(event) = maybe_event else {
                        tracing::info!("gateway event channel closed, router stopping");
                        break;
                    };
                    let engine = engine.clone();
                    // Fire-and-forget per event: the handler catches its own
                    // errors at the boundary and never blocks the router.
                    tokio::spawn(async move {
                        if let Err(error) = engine.handle_event(&event).await {
                            tracing::warn!(
                                kind = event.kind(),
                                session_key = event.session_key(),
                                %error,
                                "gateway event handler failed"
                            );
                        }
                    });
                }
                _ = &mut shutdown_rx => break,
            }
        }
    });

    Ok(DeliveryBridgeHandle {
        shutdown_tx: Some(shutdown_tx),
        router_task: Some(router_task),
        sweeper,
        recovery_task,
    })
}
