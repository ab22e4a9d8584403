//! Switch engine: debouncing, dimming, sync broadcasting and association setup.
//!
//! The engine is an actor. One task owns the [`SwitchEngine`] and feeds it
//! [`InboundEvent`]s one at a time; every handler runs to completion before
//! the next event is looked at, so a sync broadcast is never observed half
//! applied. The only future resumptions are dimming ticks and association
//! pumps, which the [`TickScheduler`] delivers back as events.

pub mod association;
pub mod broadcast;
pub mod debounce;
pub mod dimming;
pub mod led;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

use crate::device::{
    ComponentName, Device, DeviceId, DeviceRegistry, Direction, Preferences, StateChange,
};
use crate::error::{Result, SwitchError};
use crate::store::{PersistedDevice, StateStore};
use association::{AssociationCommand, AssociationState, ProgrammingQueue, PumpOutcome};
use debounce::{DEBOUNCE_WINDOW, DebounceState};
use dimming::{SessionId, TickOutcome};
use led::LedCommand;
use log::{debug, error, info, warn};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Node id of the hub every button group is associated with by default.
pub const DEFAULT_HUB_NODE_ID: u8 = 1;

/// State-change notification for the capability layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateNotification {
    pub device_id: DeviceId,
    pub component: ComponentName,
    pub is_on: bool,
    pub level: u8,
}

/// Outbound side of the protocol and capability layers.
///
/// Calls must not block: the engine issues them from inside an event handler.
pub trait OutboundSink: Send {
    /// Send an LED-set command. An error means the device rejected the update.
    fn send_led(&mut self, device_id: &DeviceId, command: LedCommand) -> Result<()>;

    /// Send one association-program command. `Ok` means the sink accepted it.
    fn send_association(&mut self, command: &AssociationCommand) -> Result<()>;

    fn notify_state(&mut self, notification: &StateNotification);
}

/// Delivers future events back into the engine.
pub trait TickScheduler: Send {
    /// Start delivering [`InboundEvent::DimmingTick`] for `session` once per tick period.
    fn start_ticks(&mut self, device_id: &DeviceId, session: SessionId);

    /// Stop tick delivery for `device_id`.
    fn cancel_ticks(&mut self, device_id: &DeviceId);

    /// Deliver one [`InboundEvent::AssociationPump`] after the pacing delay.
    fn schedule_association_pump(&mut self);
}

/// Every event the engine reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    SceneActivation {
        device_id: DeviceId,
        scene_id: u8,
    },
    DimmerHoldStart {
        device_id: DeviceId,
        direction: Direction,
    },
    DimmerHoldStop {
        device_id: DeviceId,
    },
    PreferencesChanged {
        device_id: DeviceId,
        old: Preferences,
        new: Preferences,
    },
    DeviceAdded {
        device_id: DeviceId,
        preferences: Preferences,
    },
    DeviceRemoved {
        device_id: DeviceId,
    },
    SetOn {
        device_id: DeviceId,
        component: ComponentName,
    },
    SetOff {
        device_id: DeviceId,
        component: ComponentName,
    },
    SetLevel {
        device_id: DeviceId,
        component: ComponentName,
        level: u8,
    },
    DimmingTick {
        device_id: DeviceId,
        session: SessionId,
    },
    AssociationPump,
    Refresh {
        device_id: DeviceId,
    },
}

/// Tunables the engine itself needs.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub debounce_window: Duration,
    pub hub_node_id: u8,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            debounce_window: DEBOUNCE_WINDOW,
            hub_node_id: DEFAULT_HUB_NODE_ID,
        }
    }
}

pub struct SwitchEngine<S, T> {
    registry: DeviceRegistry,
    sink: S,
    scheduler: T,
    queue: ProgrammingQueue,
    pump_armed: bool,
    /// Last dimming session id handed out, across all devices ever registered.
    last_session: SessionId,
    store: StateStore,
    settings: EngineSettings,
}

impl<S: OutboundSink, T: TickScheduler> SwitchEngine<S, T> {
    pub fn new(settings: EngineSettings, sink: S, scheduler: T, store: StateStore) -> Self {
        Self {
            registry: DeviceRegistry::new(),
            sink,
            scheduler,
            queue: ProgrammingQueue::default(),
            pump_armed: false,
            last_session: 0,
            store,
            settings,
        }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn device(&self, id: &DeviceId) -> Result<&Device> {
        self.registry.get(id)
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn scheduler(&self) -> &T {
        &self.scheduler
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Process one event to completion.
    pub fn handle(&mut self, event: InboundEvent, now: Instant) -> Result<()> {
        match event {
            InboundEvent::SceneActivation {
                device_id,
                scene_id,
            } => self.on_scene_activation(&device_id, scene_id, now),
            InboundEvent::DimmerHoldStart {
                device_id,
                direction,
            } => self.on_hold_start(&device_id, direction),
            InboundEvent::DimmerHoldStop { device_id } => self.on_hold_stop(&device_id),
            InboundEvent::PreferencesChanged {
                device_id,
                old,
                new,
            } => self.on_preferences_changed(&device_id, old, new),
            InboundEvent::DeviceAdded {
                device_id,
                preferences,
            } => self.on_device_added(device_id, preferences),
            InboundEvent::DeviceRemoved { device_id } => self.on_device_removed(&device_id),
            InboundEvent::SetOn {
                device_id,
                component,
            } => self.broadcast(&device_id, component, StateChange::OnOff(true)),
            InboundEvent::SetOff {
                device_id,
                component,
            } => self.broadcast(&device_id, component, StateChange::OnOff(false)),
            InboundEvent::SetLevel {
                device_id,
                component,
                level,
            } => {
                if level > 100 {
                    return Err(SwitchError::InvalidLevel(i64::from(level)));
                }
                self.broadcast(&device_id, component, StateChange::Level(level))
            }
            InboundEvent::DimmingTick { device_id, session } => {
                self.on_dimming_tick(&device_id, session)
            }
            InboundEvent::AssociationPump => {
                self.pump_armed = false;
                self.pump_associations();
                Ok(())
            }
            InboundEvent::Refresh { device_id } => {
                let device = self.registry.get(&device_id)?;
                broadcast::refresh(device, &ComponentName::ALL, &mut self.sink)
            }
        }
    }

    /// Run the actor loop until the channel closes.
    pub async fn run(mut self, mut rx: mpsc::Receiver<InboundEvent>) {
        info!("[Engine] Started");
        while let Some(event) = rx.recv().await {
            debug!("[Engine] {:?}", event);
            if let Err(e) = self.handle(event, Instant::now()) {
                warn!("[Engine] Event rejected: {}", e);
            }
        }
        info!("[Engine] Event channel closed, stopping");
    }

    fn on_scene_activation(&mut self, id: &DeviceId, scene_id: u8, now: Instant) -> Result<()> {
        let button = debounce::normalize_scene(scene_id)?;
        let component = ComponentName::from_button(button)?;
        let window = self.settings.debounce_window;

        let device = self.registry.get_mut(id)?;
        if !device.debounce.accept(button, now, window) {
            debug!("[Debounce] {} duplicate press of button {} dropped", id, button);
            return Ok(());
        }
        let target = !device.component(component).is_on;
        debug!(
            "[Debounce] {} button {} -> {} {}",
            id,
            button,
            component,
            if target { "on" } else { "off" }
        );
        self.persist(id);
        self.broadcast(id, component, StateChange::OnOff(target))
    }

    fn on_hold_start(&mut self, id: &DeviceId, direction: Direction) -> Result<()> {
        let device = self.registry.get_mut(id)?;
        let target = device
            .last_button_index()
            .and_then(|b| ComponentName::from_button(b).ok());
        let duration = device.preferences().dimming_duration();
        let session = self.last_session + 1;

        if !device.dimming.start(session, direction, duration, target) {
            debug!("[Dimming] {} already ramping, hold start ignored", id);
            return Ok(());
        }
        self.last_session = session;
        match target {
            Some(component) => info!(
                "[Dimming] {} ramping {} {} (session {})",
                id, component, direction, session
            ),
            None => warn!(
                "[Dimming] {} hold started with no button pressed yet, ticks will be ignored",
                id
            ),
        }
        self.scheduler.start_ticks(id, session);
        self.persist(id);
        Ok(())
    }

    fn on_hold_stop(&mut self, id: &DeviceId) -> Result<()> {
        let device = self.registry.get_mut(id)?;
        match device.dimming.stop() {
            Some(session) => {
                self.scheduler.cancel_ticks(id);
                info!("[Dimming] {} stopped (session {})", id, session);
                self.persist(id);
            }
            None => debug!("[Dimming] {} hold stop without active session", id),
        }
        Ok(())
    }

    fn on_dimming_tick(&mut self, id: &DeviceId, session: SessionId) -> Result<()> {
        let Ok(device) = self.registry.get(id) else {
            debug!("[Dimming] Tick for removed device {} ignored", id);
            return Ok(());
        };
        match device.dimming.tick(session) {
            TickOutcome::Stale => {
                debug!("[Dimming] {} stale tick for session {} ignored", id, session);
                Ok(())
            }
            TickOutcome::NoTarget => {
                debug!("[Dimming] {} tick without target button", id);
                Ok(())
            }
            TickOutcome::Step { target, step } => {
                let level = dimming::next_level(device.component(target).level, step);
                self.broadcast(id, target, StateChange::Level(level))
            }
        }
    }

    fn on_preferences_changed(
        &mut self,
        id: &DeviceId,
        old: Preferences,
        new: Preferences,
    ) -> Result<()> {
        let device = self.registry.get_mut(id)?;
        if device.preferences() != &old {
            debug!("[Engine] {} preference change based on stale values", id);
        }
        let joined = !device.sync_enabled() && new.sync_enabled;
        device.set_preferences(new);

        if joined
            && let Err(e) = broadcast::harmonize_from_peer(&mut self.registry, id, &mut self.sink)
        {
            warn!("[Sync] {} could not be harmonized: {}", id, e);
        }
        self.configure(id)
    }

    fn on_device_added(&mut self, id: DeviceId, preferences: Preferences) -> Result<()> {
        if self.registry.contains(&id) {
            info!("[Engine] {} re-added, refreshing preferences", id);
            let device = self.registry.get_mut(&id)?;
            let old = device.preferences().clone();
            return self.on_preferences_changed(&id, old, preferences);
        }

        let mut device = Device::new(id.clone(), preferences);
        if let Some(saved) = self.store.get(&id) {
            device.debounce = DebounceState::restored(saved.last_button_index);
            device.associations = AssociationState::restored(saved.configured, saved.associations);
        }
        let sync_enabled = device.sync_enabled();
        self.registry.insert(device)?;
        info!("[Engine] {} added (sync {})", id, if sync_enabled { "on" } else { "off" });

        let shown = if sync_enabled {
            broadcast::harmonize_from_peer(&mut self.registry, &id, &mut self.sink).map(|_| ())
        } else {
            let device = self.registry.get(&id)?;
            broadcast::refresh(device, &ComponentName::ALL, &mut self.sink)
        };
        if let Err(e) = shown {
            warn!("[Sync] {} initial state not delivered: {}", id, e);
        }

        self.persist(&id);
        self.configure(&id)
    }

    fn on_device_removed(&mut self, id: &DeviceId) -> Result<()> {
        let Some(mut device) = self.registry.remove(id) else {
            return Err(SwitchError::UnknownDevice(id.clone()));
        };
        if device.dimming.stop().is_some() {
            self.scheduler.cancel_ticks(id);
        }
        self.queue.drop_device(id);
        self.store.remove(id);
        info!("[Engine] {} removed", id);
        Ok(())
    }

    fn broadcast(&mut self, id: &DeviceId, component: ComponentName, change: StateChange) -> Result<()> {
        let report = broadcast::apply_to_group(&mut self.registry, id, component, change, &mut self.sink)?;
        if !report.is_complete() {
            warn!(
                "[Sync] {} of {} device(s) rejected {} {:?}",
                report.failed.len(),
                report.failed.len() + report.applied.len(),
                component,
                change
            );
        }
        Ok(())
    }

    /// Program associations for `id` unless they are already current or queued.
    fn configure(&mut self, id: &DeviceId) -> Result<()> {
        let device = self.registry.get(id)?;
        let plans = association::plan_for(self.settings.hub_node_id, device.preferences());
        if device.associations.is_current(&plans) {
            debug!("[Association] {} already configured", id);
            return Ok(());
        }
        if self.queue.is_pending(id, &plans) {
            debug!("[Association] {} programming already queued", id);
            return Ok(());
        }

        info!("[Association] {} programming {} button(s)", id, plans.len());
        self.queue.enqueue(id, plans);
        if !self.pump_armed {
            self.pump_associations();
        }
        Ok(())
    }

    fn pump_associations(&mut self) {
        match self.queue.pump(&mut self.sink) {
            PumpOutcome::Idle => {}
            PumpOutcome::Sent { device_id } => {
                debug!("[Association] {} command accepted", device_id);
            }
            PumpOutcome::Completed { device_id, plans } => {
                if let Ok(device) = self.registry.get_mut(&device_id) {
                    device.associations.mark_programmed(&plans, chrono::Utc::now());
                    info!("[Association] {} configured", device_id);
                    self.persist(&device_id);
                }
            }
            PumpOutcome::Failed { device_id, error } => {
                error!("[Association] {} programming failed: {}", device_id, error);
                if let Ok(device) = self.registry.get_mut(&device_id) {
                    device.associations.mark_failed();
                    self.persist(&device_id);
                }
            }
        }
        if !self.queue.is_empty() && !self.pump_armed {
            self.pump_armed = true;
            self.scheduler.schedule_association_pump();
        }
    }

    fn persist(&self, id: &DeviceId) {
        if let Ok(device) = self.registry.get(id) {
            self.store.put(
                id,
                PersistedDevice {
                    last_button_index: device.last_button_index(),
                    dimming_active: device.is_ramping(),
                    configured: device.configured(),
                    associations: device.associations.records().to_vec(),
                },
            );
        }
    }
}
