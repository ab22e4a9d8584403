//! Tokio-backed tick scheduler.
//!
//! Each dimming session gets its own task driven by `tokio::time::interval`
//! and a `CancellationToken`. Ticks and association pumps are sent back into
//! the engine's event channel, so they are processed in order with every
//! other event.

use super::dimming::SessionId;
use super::{InboundEvent, TickScheduler};
use crate::device::DeviceId;
use log::{debug, warn};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub struct TokioTickScheduler {
    tx: mpsc::Sender<InboundEvent>,
    tick_period: Duration,
    pump_delay: Duration,
    timers: HashMap<DeviceId, CancellationToken>,
}

impl TokioTickScheduler {
    pub fn new(tx: mpsc::Sender<InboundEvent>, tick_period: Duration, pump_delay: Duration) -> Self {
        Self {
            tx,
            tick_period,
            pump_delay,
            timers: HashMap::new(),
        }
    }

    /// Number of devices with a running tick task.
    pub fn active(&self) -> usize {
        self.timers.len()
    }
}

impl TickScheduler for TokioTickScheduler {
    fn start_ticks(&mut self, device_id: &DeviceId, session: SessionId) {
        self.cancel_ticks(device_id);

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let tx = self.tx.clone();
        let device_id = device_id.clone();
        let period = self.tick_period;
        self.timers.insert(device_id.clone(), token);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = interval.tick() => {
                        let tick = InboundEvent::DimmingTick {
                            device_id: device_id.clone(),
                            session,
                        };
                        if tx.send(tick).await.is_err() {
                            warn!("[Dimming] Event channel closed, stopping ticks for {}", device_id);
                            break;
                        }
                    }
                }
            }
            debug!("[Dimming] Tick task for {} (session {}) ended", device_id, session);
        });
    }

    fn cancel_ticks(&mut self, device_id: &DeviceId) {
        if let Some(token) = self.timers.remove(device_id) {
            token.cancel();
        }
    }

    fn schedule_association_pump(&mut self) {
        let tx = self.tx.clone();
        let delay = self.pump_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(InboundEvent::AssociationPump).await.is_err() {
                warn!("[Association] Event channel closed, pump dropped");
            }
        });
    }
}

impl Drop for TokioTickScheduler {
    fn drop(&mut self) {
        for token in self.timers.values() {
            token.cancel();
        }
    }
}
