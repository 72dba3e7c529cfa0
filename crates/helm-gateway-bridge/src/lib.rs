//! Message delivery correlation and recovery engine for the Helm dashboard.
//!
//! Bridges the session-scoped agent-execution gateway (which emits only
//! lifecycle events, never message-level acknowledgments) to the per-chat
//! message store the dashboard reads reactively. Correlation is inferred by
//! the FIFO-oldest-in-status rule, per-message status is tracked through the
//! `sent -> delivered -> processing -> responded | failed` pipeline, and
//! stuck or crashed work is recovered by a periodic heartbeat sweep plus a
//! one-shot startup reconciliation pass.
//!
//! ```no_run
//! # fn main() -> anyhow::Result<()> {
//! use std::sync::Arc;
//!
//! use helm_gateway_bridge::{
//!     start_delivery_bridge, DeliveryBridgeConfig, GatewayEvent, HttpChatStore,
//! };
//! use tokio::sync::mpsc;
//!
//! let runtime = tokio::runtime::Runtime::new()?;
//! runtime.block_on(async {
//!     let config = DeliveryBridgeConfig::default();
//!     let store = Arc::new(HttpChatStore::new(
//!         config.store_api_base.clone(),
//!         config.http_timeout,
//!     )?);
//!     let (events_tx, events_rx) = mpsc::channel::<GatewayEvent>(64);
//!     let _bridge = start_delivery_bridge(config, store, events_rx)?;
//!     // ... feed gateway lifecycle events into events_tx ...
//!     # drop(events_tx);
//!     anyhow::Ok(())
//! })?;
//! # Ok(())
//! # }
//! ```

pub mod bridge_config;
pub mod bridge_contract;
pub mod bridge_runtime;
pub mod chat_store;
pub mod delivery_engine;
pub mod failure_classifier;
pub mod heartbeat_sweeper;
pub mod retry_scheduler;
pub mod session_key;
pub mod startup_recovery;
pub mod time_utils;

#[cfg(test)]
pub(crate) mod test_support;

pub use bridge_config::*;
pub use bridge_contract::*;
pub use bridge_runtime::*;
pub use chat_store::*;
pub use delivery_engine::*;
pub use failure_classifier::*;
pub use heartbeat_sweeper::*;
pub use retry_scheduler::*;
pub use session_key::*;
pub use startup_recovery::*;
pub use time_utils::*;
