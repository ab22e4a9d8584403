//! Association (button -> group) programming.
//!
//! Each logical button `b` forwards through two device groups: the primary
//! group `b` and the alternate "LED-on" group `b + 4`. Programming only
//! happens when the device has never been configured or when the planned
//! targets differ from what was last programmed. Commands go out through a
//! [`ProgrammingQueue`] one at a time.

use super::OutboundSink;
use crate::device::{BUTTON_COUNT, DeviceId, Preferences};
use crate::error::SwitchError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Offset between a button's primary group and its alternate group.
pub const ALTERNATE_GROUP_OFFSET: u8 = BUTTON_COUNT;

/// Desired association for one button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationPlan {
    pub button: u8,
    pub primary_group: u8,
    pub alternate_group: u8,
    pub targets: Vec<u8>,
}

/// Last programmed association for one button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationRecord {
    pub button: u8,
    pub primary_group: u8,
    pub alternate_group: u8,
    pub targets: Vec<u8>,
    pub programmed_at: DateTime<Utc>,
}

impl AssociationRecord {
    fn from_plan(plan: &AssociationPlan, programmed_at: DateTime<Utc>) -> Self {
        Self {
            button: plan.button,
            primary_group: plan.primary_group,
            alternate_group: plan.alternate_group,
            targets: plan.targets.clone(),
            programmed_at,
        }
    }

    fn matches(&self, plan: &AssociationPlan) -> bool {
        self.button == plan.button
            && self.primary_group == plan.primary_group
            && self.alternate_group == plan.alternate_group
            && self.targets == plan.targets
    }
}

/// Plan the associations for a device: the hub first, then the configured
/// extra targets, without duplicates.
pub fn plan_for(hub_node_id: u8, preferences: &Preferences) -> Vec<AssociationPlan> {
    let mut targets = vec![hub_node_id];
    for node in &preferences.association_targets {
        if !targets.contains(node) {
            targets.push(*node);
        }
    }

    (1..=BUTTON_COUNT)
        .map(|button| AssociationPlan {
            button,
            primary_group: button,
            alternate_group: button + ALTERNATE_GROUP_OFFSET,
            targets: targets.clone(),
        })
        .collect()
}

/// Per-device association bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct AssociationState {
    configured: bool,
    records: Vec<AssociationRecord>,
}

impl AssociationState {
    pub fn restored(configured: bool, records: Vec<AssociationRecord>) -> Self {
        Self { configured, records }
    }

    pub fn configured(&self) -> bool {
        self.configured
    }

    pub fn records(&self) -> &[AssociationRecord] {
        &self.records
    }

    /// True when the device is configured and every plan is already programmed.
    pub fn is_current(&self, plans: &[AssociationPlan]) -> bool {
        self.configured
            && self.records.len() == plans.len()
            && self.records.iter().zip(plans).all(|(r, p)| r.matches(p))
    }

    pub fn mark_programmed(&mut self, plans: &[AssociationPlan], at: DateTime<Utc>) {
        self.records = plans
            .iter()
            .map(|p| AssociationRecord::from_plan(p, at))
            .collect();
        self.configured = true;
    }

    /// Programming failed: force a full reprogram on the next trigger.
    pub fn mark_failed(&mut self) {
        self.configured = false;
    }
}

/// Outbound association-program command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationCommand {
    pub device_id: DeviceId,
    pub group_id: u8,
    pub target_node_ids: Vec<u8>,
}

#[derive(Debug)]
struct Job {
    plans: Vec<AssociationPlan>,
    remaining: usize,
}

/// Result of issuing (at most) one queued command.
#[derive(Debug)]
pub enum PumpOutcome {
    Idle,
    Sent { device_id: DeviceId },
    Completed { device_id: DeviceId, plans: Vec<AssociationPlan> },
    Failed { device_id: DeviceId, error: SwitchError },
}

/// Sequential queue of association commands across all devices.
#[derive(Debug, Default)]
pub struct ProgrammingQueue {
    pending: VecDeque<AssociationCommand>,
    jobs: BTreeMap<DeviceId, Job>,
}

impl ProgrammingQueue {
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether exactly these plans are already queued for `device_id`.
    pub fn is_pending(&self, device_id: &DeviceId, plans: &[AssociationPlan]) -> bool {
        self.jobs
            .get(device_id)
            .is_some_and(|job| job.plans == plans)
    }

    /// Queue two commands per plan, replacing anything still queued for the device.
    pub fn enqueue(&mut self, device_id: &DeviceId, plans: Vec<AssociationPlan>) {
        self.drop_device(device_id);
        for plan in &plans {
            for group_id in [plan.primary_group, plan.alternate_group] {
                self.pending.push_back(AssociationCommand {
                    device_id: device_id.clone(),
                    group_id,
                    target_node_ids: plan.targets.clone(),
                });
            }
        }
        let remaining = plans.len() * 2;
        self.jobs.insert(device_id.clone(), Job { plans, remaining });
    }

    pub fn drop_device(&mut self, device_id: &DeviceId) {
        self.pending.retain(|cmd| &cmd.device_id != device_id);
        self.jobs.remove(device_id);
    }

    /// Issue the next command. The following one is only issued by a later call.
    pub fn pump(&mut self, sink: &mut dyn OutboundSink) -> PumpOutcome {
        let Some(command) = self.pending.pop_front() else {
            return PumpOutcome::Idle;
        };
        let device_id = command.device_id.clone();

        if let Err(error) = sink.send_association(&command) {
            self.drop_device(&device_id);
            return PumpOutcome::Failed { device_id, error };
        }

        let done = match self.jobs.get_mut(&device_id) {
            Some(job) => {
                job.remaining = job.remaining.saturating_sub(1);
                job.remaining == 0
            }
            None => false,
        };
        if done && let Some(job) = self.jobs.remove(&device_id) {
            return PumpOutcome::Completed {
                device_id,
                plans: job.plans,
            };
        }
        PumpOutcome::Sent { device_id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::RecordingSink;

    fn prefs(targets: Vec<u8>) -> Preferences {
        Preferences {
            association_targets: targets,
            ..Preferences::default()
        }
    }

    #[test]
    fn test_plan_maps_buttons_to_both_groups() {
        let plans = plan_for(1, &prefs(vec![7, 1, 7, 9]));
        assert_eq!(plans.len(), 4);
        for (i, plan) in plans.iter().enumerate() {
            let button = i as u8 + 1;
            assert_eq!(plan.button, button);
            assert_eq!(plan.primary_group, button);
            assert_eq!(plan.alternate_group, button + 4);
            assert_eq!(plan.targets, vec![1, 7, 9]);
        }
    }

    #[test]
    fn test_state_is_current_only_after_programming() {
        let plans = plan_for(1, &prefs(vec![]));
        let mut state = AssociationState::default();
        assert!(!state.is_current(&plans));

        state.mark_programmed(&plans, Utc::now());
        assert!(state.configured());
        assert!(state.is_current(&plans));
        assert!(!state.is_current(&plan_for(1, &prefs(vec![5]))));

        state.mark_failed();
        assert!(!state.is_current(&plans));
    }

    #[test]
    fn test_queue_issues_one_command_per_pump() {
        let device: DeviceId = "hall".into();
        let plans = plan_for(1, &prefs(vec![]));
        let mut queue = ProgrammingQueue::default();
        let mut sink = RecordingSink::default();

        queue.enqueue(&device, plans.clone());
        assert_eq!(queue.len(), 8);

        for sent in 1..8 {
            assert!(matches!(queue.pump(&mut sink), PumpOutcome::Sent { .. }));
            assert_eq!(sink.associations.len(), sent);
        }
        match queue.pump(&mut sink) {
            PumpOutcome::Completed { plans: done, .. } => assert_eq!(done, plans),
            other => panic!("expected completion, got {other:?}"),
        }
        assert!(matches!(queue.pump(&mut sink), PumpOutcome::Idle));

        let groups: Vec<u8> = sink.associations.iter().map(|c| c.group_id).collect();
        assert_eq!(groups, vec![1, 5, 2, 6, 3, 7, 4, 8]);
    }

    #[test]
    fn test_failure_drops_remaining_commands_for_device() {
        let plans = plan_for(1, &prefs(vec![]));
        let mut queue = ProgrammingQueue::default();
        queue.enqueue(&"a".into(), plans.clone());
        queue.enqueue(&"b".into(), plans.clone());

        let mut sink = RecordingSink::default();
        sink.reject_associations = true;
        assert!(matches!(queue.pump(&mut sink), PumpOutcome::Failed { .. }));
        assert_eq!(queue.len(), 8);
        assert!(!queue.is_pending(&"a".into(), &plans));
        assert!(queue.is_pending(&"b".into(), &plans));
    }

    #[test]
    fn test_enqueue_replaces_pending_commands() {
        let mut queue = ProgrammingQueue::default();
        queue.enqueue(&"a".into(), plan_for(1, &prefs(vec![])));
        let replacement = plan_for(1, &prefs(vec![3]));
        queue.enqueue(&"a".into(), replacement.clone());
        assert_eq!(queue.len(), 8);
        assert!(queue.is_pending(&"a".into(), &replacement));
    }
}
