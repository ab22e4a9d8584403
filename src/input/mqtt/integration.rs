//! MQTT integration orchestrator.
//!
//! Owns the broker connection for the gateway side: subscribes to every
//! configured wall switch, decodes incoming messages and forwards the
//! resulting events to the engine. After every (re)connect each device gets
//! a refresh so LEDs and reported state match what the engine holds.

use super::client::{MqttClient, MqttMessage};
use super::wall_switch::WallSwitchDecoder;
use crate::engine::InboundEvent;
use log::{error, info, warn};
use rumqttc::{AsyncClient, QoS};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct MqttIntegration {
    client: MqttClient,
    decoder: WallSwitchDecoder,
    events: mpsc::Sender<InboundEvent>,
}

impl MqttIntegration {
    pub fn new(
        client: MqttClient,
        decoder: WallSwitchDecoder,
        events: mpsc::Sender<InboundEvent>,
    ) -> Self {
        Self {
            client,
            decoder,
            events,
        }
    }

    /// Spawn the integration task.
    ///
    /// Returns a JoinHandle that can be used to abort the task on shutdown.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(self) {
        let Self {
            client,
            mut decoder,
            events,
        } = self;
        let topics = decoder.subscribe_topics();
        if topics.is_empty() {
            info!("[MQTT] No devices configured, skipping MQTT integration");
            return;
        }

        let subscribe_client = client.client();
        let (msg_tx, mut msg_rx) = mpsc::channel::<MqttMessage>(64);
        let (connected_tx, connected_rx) = oneshot::channel();
        let (reconnected_tx, mut reconnected_rx) = mpsc::channel(1);

        // Start the event loop first so it can establish the connection
        let mqtt_loop = tokio::spawn(client.run(msg_tx, Some(connected_tx), reconnected_tx));

        match tokio::time::timeout(CONNECT_TIMEOUT, connected_rx).await {
            Ok(Ok(())) => info!("[MQTT] Connection established, subscribing to topics"),
            Ok(Err(_)) => {
                warn!("[MQTT] Connection signal channel dropped");
                return;
            }
            Err(_) => {
                warn!(
                    "[MQTT] Connection timeout after {} seconds",
                    CONNECT_TIMEOUT.as_secs()
                );
                mqtt_loop.abort();
                return;
            }
        }

        subscribe_all(&subscribe_client, &topics).await;
        if !refresh_all(&decoder, &events).await {
            mqtt_loop.abort();
            return;
        }
        info!(
            "[MQTT] Integration started with {} wall switch(es)",
            decoder.device_ids().len()
        );

        loop {
            tokio::select! {
                msg = msg_rx.recv() => {
                    let Some(msg) = msg else { break };
                    for event in decoder.decode(&msg.topic, &msg.payload) {
                        if events.send(event).await.is_err() {
                            error!("[MQTT] Engine channel closed");
                            mqtt_loop.abort();
                            return;
                        }
                    }
                }
                Some(()) = reconnected_rx.recv() => {
                    // Clean sessions lose subscriptions on reconnect
                    subscribe_all(&subscribe_client, &topics).await;
                    if !refresh_all(&decoder, &events).await {
                        break;
                    }
                }
            }
        }

        mqtt_loop.abort();
    }
}

/// Ask the engine to re-send every device's state. False if the engine is gone.
async fn refresh_all(decoder: &WallSwitchDecoder, events: &mpsc::Sender<InboundEvent>) -> bool {
    for device_id in decoder.device_ids() {
        if events.send(InboundEvent::Refresh { device_id }).await.is_err() {
            error!("[MQTT] Engine channel closed");
            return false;
        }
    }
    true
}

async fn subscribe_all(client: &AsyncClient, topics: &[String]) {
    for topic in topics {
        info!("[MQTT] Subscribing to topic: {}", topic);
        if let Err(e) = client.subscribe(topic, QoS::AtLeastOnce).await {
            warn!("[MQTT] Failed to subscribe to {}: {:?}", topic, e);
        }
    }
}
