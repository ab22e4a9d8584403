//! Sync group broadcasting.
//!
//! A change on one device is applied to every device in its sync group.
//! Membership is computed from the live preferences at call time. Each
//! target's new state is only committed after its LED command has been
//! accepted, so no device ends up with switch and LED state disagreeing.

use super::led::LedCommand;
use super::{OutboundSink, StateNotification};
use crate::device::{ComponentName, Device, DeviceId, DeviceRegistry, StateChange, SwitchStateStore};
use crate::error::{Result, SwitchError};
use log::{debug, warn};

/// Devices a change originating at `origin` must reach.
///
/// With sync disabled on the origin this is the origin alone; otherwise the
/// origin plus every other sync-enabled device, in id order.
pub fn target_set(registry: &DeviceRegistry, origin: &DeviceId) -> Result<Vec<DeviceId>> {
    let device = registry.get(origin)?;
    let mut targets = vec![origin.clone()];
    if device.sync_enabled() {
        targets.extend(registry.sync_members().into_iter().filter(|id| id != origin));
    }
    Ok(targets)
}

/// Result of one broadcast.
#[derive(Debug, Default)]
pub struct BroadcastReport {
    pub applied: Vec<DeviceId>,
    pub failed: Vec<(DeviceId, SwitchError)>,
}

impl BroadcastReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Apply `change` to `component` on every device in `origin`'s sync group.
///
/// A target whose LED update is rejected keeps its previous state and is
/// reported in [`BroadcastReport::failed`]; the other targets are still
/// updated. Only an unknown origin fails the whole call.
pub fn apply_to_group(
    registry: &mut DeviceRegistry,
    origin: &DeviceId,
    component: ComponentName,
    change: StateChange,
    sink: &mut dyn OutboundSink,
) -> Result<BroadcastReport> {
    let targets = target_set(registry, origin)?;
    debug!(
        "[Sync] {} {:?} from {} -> {} device(s)",
        component,
        change,
        origin,
        targets.len()
    );

    let mut report = BroadcastReport::default();
    for id in targets {
        let device = registry.get_mut(&id)?;
        let mut candidate = device.switches().clone();
        candidate.apply(component, change);

        match commit(device, candidate, &[component], sink) {
            Ok(()) => report.applied.push(id),
            Err(e) => {
                warn!("[Sync] {} left unchanged: {}", id, e);
                report.failed.push((id, e));
            }
        }
    }
    Ok(report)
}

/// Bring a device that just joined its sync group in line with the group.
///
/// Copies all component state from the first other sync member, or resets
/// to off/level 100 when there is none. Returns the peer copied from.
pub fn harmonize_from_peer(
    registry: &mut DeviceRegistry,
    id: &DeviceId,
    sink: &mut dyn OutboundSink,
) -> Result<Option<DeviceId>> {
    let peer = registry
        .sync_members()
        .into_iter()
        .find(|member| member != id);

    let source = match &peer {
        Some(peer_id) => registry.get(peer_id)?.switches().clone(),
        None => SwitchStateStore::default(),
    };

    let device = registry.get_mut(id)?;
    let mut candidate = device.switches().clone();
    candidate.copy_from(&source);
    commit(device, candidate, &ComponentName::ALL, sink)?;

    match &peer {
        Some(peer_id) => debug!("[Sync] {} harmonized from {}", id, peer_id),
        None => debug!("[Sync] {} has no sync peer, reset to defaults", id),
    }
    Ok(peer)
}

/// Re-send LED state and notifications for `components` without changing state.
pub fn refresh(
    device: &Device,
    components: &[ComponentName],
    sink: &mut dyn OutboundSink,
) -> Result<()> {
    sink.send_led(device.id(), LedCommand::from_switches(device.switches()))?;
    notify(device, components, sink);
    Ok(())
}

/// Send the LED bitmap for `candidate`; store it only if the sink accepts it.
fn commit(
    device: &mut Device,
    candidate: SwitchStateStore,
    components: &[ComponentName],
    sink: &mut dyn OutboundSink,
) -> Result<()> {
    sink.send_led(device.id(), LedCommand::from_switches(&candidate))?;
    *device.switches_mut() = candidate;
    notify(device, components, sink);
    Ok(())
}

fn notify(device: &Device, components: &[ComponentName], sink: &mut dyn OutboundSink) {
    for &component in components {
        let state = device.component(component);
        sink.notify_state(&StateNotification {
            device_id: device.id().clone(),
            component,
            is_on: state.is_on,
            level: state.level,
        });
    }
}
