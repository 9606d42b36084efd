//! Asynchronous pool error channel and background health probing.
//!
//! sqlx pools do not push error events, so failures observed outside a
//! request (the periodic probe, or any other component holding a sender) are
//! delivered as [`PoolEvent`]s over an mpsc channel. A listener task drains
//! the channel and hands each error to [`PoolManager::report_pool_error`].

use crate::db::pool::PoolManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Something happened to the pool outside of a caller's statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    /// The pool as a whole looks unusable.
    Error { reason: String },
}

/// Owns the listener and probe tasks.
#[derive(Debug)]
pub struct HealthMonitor {
    sender: mpsc::Sender<PoolEvent>,
    listener: JoinHandle<()>,
    prober: Option<JoinHandle<()>>,
}

impl HealthMonitor {
    /// Start the listener, plus a probe every `interval` when one is given.
    pub fn start(manager: Arc<PoolManager>, interval: Option<Duration>) -> Self {
        let (sender, mut receiver) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let listener_manager = Arc::clone(&manager);
        let listener = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                match event {
                    PoolEvent::Error { reason } => {
                        let scheduled = listener_manager.report_pool_error(&reason);
                        debug!(reason = %reason, scheduled, "Pool error event handled");
                    }
                }
            }
            debug!("Pool event channel closed");
        });

        let prober = interval.map(|every| {
            let probe_sender = sender.clone();
            tokio::spawn(probe_loop(manager, every, probe_sender))
        });

        if let Some(every) = interval {
            info!(interval_secs = every.as_secs(), "Pool health monitor started");
        }

        Self {
            sender,
            listener,
            prober,
        }
    }

    /// A handle for reporting pool errors from elsewhere.
    pub fn sender(&self) -> mpsc::Sender<PoolEvent> {
        self.sender.clone()
    }

    /// Stop probing and listening.
    pub fn stop(self) {
        if let Some(prober) = self.prober {
            prober.abort();
        }
        self.listener.abort();
        debug!("Pool health monitor stopped");
    }
}

async fn probe_loop(manager: Arc<PoolManager>, every: Duration, sender: mpsc::Sender<PoolEvent>) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if manager.is_closed() {
            break;
        }
        match manager.probe().await {
            Ok(()) => debug!("Pool health probe succeeded"),
            Err(e) if e.is_connection_level() => {
                warn!(error = %e, "Pool health probe failed");
                let event = PoolEvent::Error {
                    reason: e.to_string(),
                };
                if sender.send(event).await.is_err() {
                    break;
                }
            }
            Err(e) => warn!(error = %e, "Pool health probe returned an error"),
        }
    }
}
