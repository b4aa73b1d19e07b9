use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::vitality::VitalitySnapshot;
use crate::sim::{
    EntityHandle, EntityId, ObserverRegistry, Services, TaskKey, TaskScheduler, TeamId,
    UiAttribute, UiPayload, Vec3,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SlotKind {
    NativeAbility,
    AuxiliaryAbility,
    Handheld,
    UtilityItem,
}

impl SlotKind {
    pub const CARRIED: [SlotKind; 3] = [
        SlotKind::NativeAbility,
        SlotKind::AuxiliaryAbility,
        SlotKind::Handheld,
    ];

    pub fn is_transferable(self) -> bool {
        matches!(self, Self::AuxiliaryAbility | Self::Handheld)
    }

    pub fn accepts(self, kind: EquippableKind) -> bool {
        match self {
            Self::NativeAbility | Self::AuxiliaryAbility => kind == EquippableKind::Ability,
            Self::Handheld => kind == EquippableKind::Handheld,
            Self::UtilityItem => false,
        }
    }

    pub fn ui_attribute(self) -> UiAttribute {
        match self {
            Self::NativeAbility => UiAttribute::NativeAbility,
            Self::AuxiliaryAbility => UiAttribute::AuxiliaryAbility,
            Self::Handheld => UiAttribute::Handheld,
            Self::UtilityItem => UiAttribute::Utility,
        }
    }

    fn animates_attach(self) -> bool {
        matches!(self, Self::NativeAbility | Self::AuxiliaryAbility)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EquippableKind {
    Ability,
    Handheld,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EquippableConfig {
    pub name: String,
    pub kind: EquippableKind,
    pub colliders: Vec<String>,
    pub charge_per_damage: f32,
    pub charge_per_kill: f32,
}

impl Default for EquippableConfig {
    fn default() -> Self {
        Self {
            name: "Item".to_string(),
            kind: EquippableKind::Handheld,
            colliders: vec!["body".to_string()],
            charge_per_damage: 0.01,
            charge_per_kill: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipMode {
    WorldOwned,
    Carried { by: EntityId, slot: SlotKind },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentNode {
    WorldContainer,
    Attachment { carrier: EntityId, slot: SlotKind },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyState {
    pub kinematic: bool,
    pub use_gravity: bool,
    pub velocity: Vec3,
    pub pending_impulse: Vec3,
}

impl BodyState {
    fn dynamic() -> Self {
        Self {
            kinematic: false,
            use_gravity: true,
            velocity: Vec3::ZERO,
            pending_impulse: Vec3::ZERO,
        }
    }

    fn carried() -> Self {
        Self {
            kinematic: true,
            use_gravity: false,
            velocity: Vec3::ZERO,
            pending_impulse: Vec3::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColliderVolume {
    pub name: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CarrierBinding {
    pub carrier: EntityHandle,
    pub team: Option<TeamId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ItemEvent {
    StateChanged,
    CasualtyAchieved,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CasualtyReport {
    pub unit: EntityHandle,
    pub label: String,
    pub vitality: VitalitySnapshot,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemSignal {
    StateChanged { item: EntityId, percentage: f32 },
    CasualtyAchieved { item: EntityId, casualty: CasualtyReport },
}

#[derive(Debug)]
pub struct Equippable {
    handle: EntityHandle,
    name: String,
    kind: EquippableKind,
    charge_per_damage: f32,
    charge_per_kill: f32,
    mode: OwnershipMode,
    parent: ParentNode,
    position: Vec3,
    local_offset: Vec3,
    forward: Vec3,
    body: BodyState,
    colliders: Vec<ColliderVolume>,
    pickup_enabled: bool,
    binding: Option<CarrierBinding>,
    charge: f32,
    observers: ObserverRegistry<ItemEvent, ItemSignal>,
}

impl Equippable {
    pub fn new(handle: EntityHandle, config: EquippableConfig, position: Vec3) -> Self {
        Self {
            handle,
            name: config.name,
            kind: config.kind,
            charge_per_damage: config.charge_per_damage.max(0.0),
            charge_per_kill: config.charge_per_kill.max(0.0),
            mode: OwnershipMode::WorldOwned,
            parent: ParentNode::WorldContainer,
            position,
            local_offset: Vec3::ZERO,
            forward: Vec3::FORWARD,
            body: BodyState::dynamic(),
            colliders: config
                .colliders
                .into_iter()
                .map(|name| ColliderVolume {
                    name,
                    enabled: true,
                })
                .collect(),
            pickup_enabled: true,
            binding: None,
            charge: 0.0,
            observers: ObserverRegistry::new(),
        }
    }

    pub fn handle(&self) -> EntityHandle {
        self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> EquippableKind {
        self.kind
    }

    pub fn mode(&self) -> OwnershipMode {
        self.mode
    }

    pub fn parent(&self) -> ParentNode {
        self.parent
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn local_offset(&self) -> Vec3 {
        self.local_offset
    }

    pub fn forward(&self) -> Vec3 {
        self.forward
    }

    pub fn body(&self) -> &BodyState {
        &self.body
    }

    pub fn colliders(&self) -> &[ColliderVolume] {
        &self.colliders
    }

    pub fn colliders_enabled(&self) -> bool {
        self.colliders.iter().all(|collider| collider.enabled)
    }

    pub fn pickup_enabled(&self) -> bool {
        self.pickup_enabled
    }

    pub fn binding(&self) -> Option<CarrierBinding> {
        self.binding
    }

    pub fn charge(&self) -> f32 {
        self.charge
    }

    pub fn is_carried(&self) -> bool {
        matches!(self.mode, OwnershipMode::Carried { .. })
    }

    pub fn observers_mut(&mut self) -> &mut ObserverRegistry<ItemEvent, ItemSignal> {
        &mut self.observers
    }

    /// Host physics moving a loose item. Ignored while carried.
    pub fn set_world_pose(&mut self, position: Vec3, forward: Vec3) -> bool {
        if self.is_carried() {
            return false;
        }
        self.position = position;
        self.forward = forward;
        true
    }

    pub fn take_impulse(&mut self) -> Vec3 {
        std::mem::replace(&mut self.body.pending_impulse, Vec3::ZERO)
    }

    fn initialize(&mut self, binding: CarrierBinding) {
        self.binding = Some(binding);
    }

    fn terminate(&mut self) {
        self.binding = None;
    }

    fn set_colliders(&mut self, enabled: bool) {
        for collider in &mut self.colliders {
            collider.enabled = enabled;
        }
    }

    pub fn add_charge(&mut self, amount: f32) {
        if !amount.is_finite() {
            return;
        }
        let next = (self.charge + amount).clamp(0.0, 1.0);
        if next == self.charge {
            return;
        }
        self.charge = next;
        let signal = ItemSignal::StateChanged {
            item: self.handle.id,
            percentage: self.charge,
        };
        self.observers.notify(ItemEvent::StateChanged, &signal);
    }

    pub fn damage_achieved(&mut self, amount: f32) {
        self.add_charge(amount.abs() * self.charge_per_damage);
    }

    pub fn kill_achieved(&mut self) {
        self.add_charge(self.charge_per_kill);
    }

    pub fn report_casualty(&mut self, casualty: CasualtyReport) {
        let signal = ItemSignal::CasualtyAchieved {
            item: self.handle.id,
            casualty,
        };
        self.observers.notify(ItemEvent::CasualtyAchieved, &signal);
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TransferError {
    #[error("slot {slot:?} is not transferable")]
    NonTransferable { slot: SlotKind },
    #[error("native ability slot is already occupied")]
    NativeSlotLocked,
    #[error("utility items are spawned per use and never carried")]
    UtilityNotCarried,
    #[error("slot {slot:?} does not accept {kind:?} items")]
    SlotMismatch { slot: SlotKind, kind: EquippableKind },
    #[error("item {item:?} is already carried by {by:?}")]
    AlreadyCarried { item: EntityId, by: EntityId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoopReason {
    UnknownCarrier,
    UnknownItem,
    AlreadyEquipped,
    EmptySlot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    PickedUp {
        item: EntityId,
        slot: SlotKind,
        displaced: Option<EntityId>,
    },
    Dropped {
        item: EntityId,
        slot: SlotKind,
    },
    Ignored(NoopReason),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadoutSettings {
    pub attach_duration_seconds: f32,
    pub drop_impulse: f32,
    pub handheld_offset: Vec3,
}

pub type SignalInbox = Rc<RefCell<VecDeque<ItemSignal>>>;

pub struct TransferCtx<'a> {
    pub items: &'a mut BTreeMap<EntityId, Equippable>,
    pub scheduler: &'a mut TaskScheduler<TaskKey>,
    pub services: &'a Services,
    pub carrier_position: Vec3,
    pub carrier_forward: Vec3,
}

/// Slot occupancy for one carrier.
#[derive(Debug)]
pub struct Loadout {
    carrier: EntityHandle,
    team: Option<TeamId>,
    settings: LoadoutSettings,
    slots: BTreeMap<SlotKind, EntityId>,
    attach_from: BTreeMap<SlotKind, Vec3>,
    inbox: SignalInbox,
}

impl Loadout {
    pub fn new(carrier: EntityHandle, team: Option<TeamId>, settings: LoadoutSettings) -> Self {
        Self {
            carrier,
            team,
            settings,
            slots: BTreeMap::new(),
            attach_from: BTreeMap::new(),
            inbox: Rc::new(RefCell::new(VecDeque::new())),
        }
    }

    pub fn carrier(&self) -> EntityHandle {
        self.carrier
    }

    pub fn item_in(&self, slot: SlotKind) -> Option<EntityId> {
        self.slots.get(&slot).copied()
    }

    pub fn slot_of(&self, item: EntityId) -> Option<SlotKind> {
        self.slots
            .iter()
            .find(|(_, carried)| **carried == item)
            .map(|(slot, _)| *slot)
    }

    pub fn carried(&self) -> impl Iterator<Item = (SlotKind, EntityId)> + '_ {
        self.slots.iter().map(|(slot, item)| (*slot, *item))
    }

    pub fn is_attaching(&self, slot: SlotKind) -> bool {
        self.attach_from.contains_key(&slot)
    }

    pub fn drain_signals(&self) -> Vec<ItemSignal> {
        self.inbox.borrow_mut().drain(..).collect()
    }

    fn attach_key(&self, slot: SlotKind) -> TaskKey {
        TaskKey::Attach(self.carrier.id, slot)
    }

    pub fn pickup(
        &mut self,
        item_id: EntityId,
        slot: SlotKind,
        ctx: &mut TransferCtx<'_>,
    ) -> Result<TransferOutcome, TransferError> {
        let Some((kind, mode)) = ctx.items.get(&item_id).map(|item| (item.kind, item.mode)) else {
            return Ok(TransferOutcome::Ignored(NoopReason::UnknownItem));
        };
        if slot == SlotKind::UtilityItem {
            return Err(TransferError::UtilityNotCarried);
        }
        if !slot.accepts(kind) {
            return Err(TransferError::SlotMismatch { slot, kind });
        }
        if let OwnershipMode::Carried { by, .. } = mode {
            if by == self.carrier.id {
                return Ok(TransferOutcome::Ignored(NoopReason::AlreadyEquipped));
            }
            return Err(TransferError::AlreadyCarried { item: item_id, by });
        }

        let displaced = match self.item_in(slot) {
            Some(_) if slot == SlotKind::NativeAbility => {
                warn!(carrier = self.carrier.id.0, item = item_id.0, "native_slot_locked");
                return Err(TransferError::NativeSlotLocked);
            }
            Some(occupant) => {
                self.eject(slot, ctx);
                Some(occupant)
            }
            None => None,
        };

        let Some(item) = ctx.items.get_mut(&item_id) else {
            return Ok(TransferOutcome::Ignored(NoopReason::UnknownItem));
        };

        item.mode = OwnershipMode::Carried {
            by: self.carrier.id,
            slot,
        };
        item.parent = ParentNode::Attachment {
            carrier: self.carrier.id,
            slot,
        };
        item.forward = ctx.carrier_forward;
        if slot.animates_attach() {
            let start = item.position - ctx.carrier_position;
            item.local_offset = start;
            self.attach_from.insert(slot, start);
            ctx.scheduler
                .start(self.attach_key(slot), self.settings.attach_duration_seconds);
        } else {
            item.local_offset = self.settings.handheld_offset;
            item.position = ctx.carrier_position + self.settings.handheld_offset;
        }

        item.pickup_enabled = false;
        item.set_colliders(false);
        item.body = BodyState::carried();

        self.wire(item, slot, ctx.services);
        item.initialize(CarrierBinding {
            carrier: self.carrier,
            team: self.team,
        });
        ctx.services
            .ui
            .publish(slot.ui_attribute(), UiPayload::Percentage(item.charge));

        self.slots.insert(slot, item_id);
        info!(
            carrier = self.carrier.id.0,
            item = item_id.0,
            slot = ?slot,
            displaced = ?displaced.map(|id| id.0),
            "item_picked_up"
        );
        Ok(TransferOutcome::PickedUp {
            item: item_id,
            slot,
            displaced,
        })
    }

    fn wire(&self, item: &mut Equippable, slot: SlotKind, services: &Services) {
        let ui = Rc::clone(&services.ui);
        let attribute = slot.ui_attribute();
        item.observers
            .subscribe(ItemEvent::StateChanged, self.carrier.id, move |signal| {
                if let ItemSignal::StateChanged { percentage, .. } = signal {
                    ui.publish(attribute, UiPayload::Percentage(*percentage));
                }
            });
        let inbox = Rc::clone(&self.inbox);
        item.observers
            .subscribe(ItemEvent::CasualtyAchieved, self.carrier.id, move |signal| {
                inbox.borrow_mut().push_back(signal.clone());
            });
    }

    pub fn drop(
        &mut self,
        slot: SlotKind,
        ctx: &mut TransferCtx<'_>,
    ) -> Result<TransferOutcome, TransferError> {
        if !slot.is_transferable() {
            warn!(carrier = self.carrier.id.0, slot = ?slot, "drop_rejected_non_transferable");
            return Err(TransferError::NonTransferable { slot });
        }
        Ok(self.eject(slot, ctx))
    }

    pub fn drop_item(
        &mut self,
        item: EntityId,
        ctx: &mut TransferCtx<'_>,
    ) -> Result<TransferOutcome, TransferError> {
        match self.slot_of(item) {
            Some(slot) => self.drop(slot, ctx),
            None => Ok(TransferOutcome::Ignored(NoopReason::UnknownItem)),
        }
    }

    fn eject(&mut self, slot: SlotKind, ctx: &mut TransferCtx<'_>) -> TransferOutcome {
        let Some(item_id) = self.slots.remove(&slot) else {
            return TransferOutcome::Ignored(NoopReason::EmptySlot);
        };
        let Some(item) = ctx.items.get_mut(&item_id) else {
            self.cancel_attach(slot, ctx.scheduler);
            return TransferOutcome::Ignored(NoopReason::UnknownItem);
        };

        item.observers.unsubscribe_owner(self.carrier.id);
        item.terminate();

        item.position = ctx.carrier_position + item.local_offset;
        item.local_offset = Vec3::ZERO;
        item.forward = ctx.carrier_forward;
        item.parent = ParentNode::WorldContainer;

        item.set_colliders(true);
        item.pickup_enabled = true;
        item.body = BodyState {
            pending_impulse: item.forward.normalized().scale(self.settings.drop_impulse),
            ..BodyState::dynamic()
        };

        item.mode = OwnershipMode::WorldOwned;
        self.cancel_attach(slot, ctx.scheduler);

        ctx.services.ui.publish(slot.ui_attribute(), UiPayload::Cleared);
        info!(
            carrier = self.carrier.id.0,
            item = item_id.0,
            slot = ?slot,
            "item_dropped"
        );
        TransferOutcome::Dropped {
            item: item_id,
            slot,
        }
    }

    fn cancel_attach(&mut self, slot: SlotKind, scheduler: &mut TaskScheduler<TaskKey>) {
        self.attach_from.remove(&slot);
        scheduler.cancel(self.attach_key(slot));
    }

    /// Interpolates rising items and keeps carried items on the carrier.
    pub fn advance_attachments(&mut self, ctx: &mut TransferCtx<'_>) {
        for (slot, item_id) in &self.slots {
            let Some(item) = ctx.items.get_mut(item_id) else {
                continue;
            };
            if let Some(start) = self.attach_from.get(slot) {
                let progress = ctx
                    .scheduler
                    .progress(TaskKey::Attach(self.carrier.id, *slot))
                    .unwrap_or(1.0);
                item.local_offset = start.lerp(Vec3::ZERO, progress);
            }
            item.position = ctx.carrier_position + item.local_offset;
            item.forward = ctx.carrier_forward;
        }
    }

    /// The attach task for `slot` expired: snap to the attachment point.
    pub fn finish_attach(&mut self, slot: SlotKind, ctx: &mut TransferCtx<'_>) -> bool {
        if self.attach_from.remove(&slot).is_none() {
            return false;
        }
        let Some(item) = self.item_in(slot).and_then(|id| ctx.items.get_mut(&id)) else {
            return false;
        };
        item.local_offset = Vec3::ZERO;
        item.position = ctx.carrier_position;
        true
    }

    /// Forgets an item that is about to be destroyed without ejecting it.
    pub fn release_item(&mut self, item: EntityId, ctx: &mut TransferCtx<'_>) -> Option<SlotKind> {
        let slot = self.slot_of(item)?;
        self.release_slot(slot, ctx);
        Some(slot)
    }

    fn release_slot(&mut self, slot: SlotKind, ctx: &mut TransferCtx<'_>) -> Option<EntityId> {
        let item_id = self.slots.remove(&slot)?;
        self.cancel_attach(slot, ctx.scheduler);
        if let Some(item) = ctx.items.get_mut(&item_id) {
            item.observers.unsubscribe_owner(self.carrier.id);
            item.terminate();
        }
        Some(item_id)
    }

    /// Carrier destruction. Transferable items are dropped into the world;
    /// the native item is released and returned for despawn.
    pub fn teardown(&mut self, ctx: &mut TransferCtx<'_>) -> Vec<EntityId> {
        for slot in [SlotKind::AuxiliaryAbility, SlotKind::Handheld] {
            self.eject(slot, ctx);
        }
        let released: Vec<EntityId> = self
            .release_slot(SlotKind::NativeAbility, ctx)
            .into_iter()
            .collect();
        self.inbox.borrow_mut().clear();
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{handle, recording_services, Recorder};

    const CARRIER: u64 = 1;
    const OTHER_CARRIER: u64 = 2;

    fn settings() -> LoadoutSettings {
        LoadoutSettings {
            attach_duration_seconds: 0.4,
            drop_impulse: 5.0,
            handheld_offset: Vec3::new(0.5, 1.0, 0.5),
        }
    }

    struct Rig {
        items: BTreeMap<EntityId, Equippable>,
        scheduler: TaskScheduler<TaskKey>,
        services: Services,
        recorder: Rc<Recorder>,
        loadout: Loadout,
    }

    impl Rig {
        fn new() -> Self {
            let (recorder, services) = recording_services();
            Self {
                items: BTreeMap::new(),
                scheduler: TaskScheduler::new(),
                services,
                recorder,
                loadout: Loadout::new(handle(CARRIER), Some(TeamId(3)), settings()),
            }
        }

        fn add(&mut self, id: u64, kind: EquippableKind, position: Vec3) -> EntityId {
            let config = EquippableConfig {
                name: format!("item-{id}"),
                kind,
                colliders: vec!["body".to_string(), "trigger".to_string()],
                ..EquippableConfig::default()
            };
            self.items
                .insert(EntityId(id), Equippable::new(handle(id), config, position));
            EntityId(id)
        }

        fn item(&self, id: EntityId) -> &Equippable {
            &self.items[&id]
        }

        fn pickup(&mut self, id: EntityId, slot: SlotKind) -> Result<TransferOutcome, TransferError> {
            let mut ctx = TransferCtx {
                items: &mut self.items,
                scheduler: &mut self.scheduler,
                services: &self.services,
                carrier_position: Vec3::ZERO,
                carrier_forward: Vec3::FORWARD,
            };
            self.loadout.pickup(id, slot, &mut ctx)
        }

        fn drop(&mut self, slot: SlotKind) -> Result<TransferOutcome, TransferError> {
            let mut ctx = TransferCtx {
                items: &mut self.items,
                scheduler: &mut self.scheduler,
                services: &self.services,
                carrier_position: Vec3::ZERO,
                carrier_forward: Vec3::FORWARD,
            };
            self.loadout.drop(slot, &mut ctx)
        }

        fn tick(&mut self, dt: f32) {
            let expired = self.scheduler.advance(dt);
            let mut ctx = TransferCtx {
                items: &mut self.items,
                scheduler: &mut self.scheduler,
                services: &self.services,
                carrier_position: Vec3::ZERO,
                carrier_forward: Vec3::FORWARD,
            };
            for key in expired {
                if let TaskKey::Attach(_, slot) = key {
                    self.loadout.finish_attach(slot, &mut ctx);
                }
            }
            self.loadout.advance_attachments(&mut ctx);
        }
    }

    #[test]
    fn pickup_switches_item_to_carried_kinematic_state() {
        let mut rig = Rig::new();
        let orb = rig.add(10, EquippableKind::Ability, Vec3::new(0.0, 0.0, 2.0));
        assert_eq!(
            rig.pickup(orb, SlotKind::AuxiliaryAbility),
            Ok(TransferOutcome::PickedUp {
                item: orb,
                slot: SlotKind::AuxiliaryAbility,
                displaced: None
            })
        );

        let item = rig.item(orb);
        assert_eq!(
            item.mode(),
            OwnershipMode::Carried {
                by: EntityId(CARRIER),
                slot: SlotKind::AuxiliaryAbility
            }
        );
        assert_eq!(
            item.parent(),
            ParentNode::Attachment {
                carrier: EntityId(CARRIER),
                slot: SlotKind::AuxiliaryAbility
            }
        );
        assert!(item.colliders().iter().all(|collider| !collider.enabled));
        assert!(!item.pickup_enabled());
        assert!(item.body().kinematic);
        assert!(!item.body().use_gravity);
        assert_eq!(
            item.binding(),
            Some(CarrierBinding {
                carrier: handle(CARRIER),
                team: Some(TeamId(3))
            })
        );
        assert!(rig
            .scheduler
            .is_pending(TaskKey::Attach(EntityId(CARRIER), SlotKind::AuxiliaryAbility)));
        assert_eq!(
            rig.recorder.ui_for(UiAttribute::AuxiliaryAbility),
            vec![UiPayload::Percentage(0.0)]
        );
    }

    #[test]
    fn pickup_then_drop_restores_world_state_and_unwires() {
        let mut rig = Rig::new();
        let orb = rig.add(10, EquippableKind::Ability, Vec3::new(0.0, 0.0, 2.0));
        rig.pickup(orb, SlotKind::AuxiliaryAbility).unwrap();
        assert_eq!(
            rig.drop(SlotKind::AuxiliaryAbility),
            Ok(TransferOutcome::Dropped {
                item: orb,
                slot: SlotKind::AuxiliaryAbility
            })
        );

        let published_before = rig.recorder.ui.borrow().len();
        let item = rig.items.get_mut(&orb).unwrap();
        assert_eq!(item.mode(), OwnershipMode::WorldOwned);
        assert_eq!(item.parent(), ParentNode::WorldContainer);
        assert!(item.colliders_enabled());
        assert!(item.pickup_enabled());
        assert!(!item.body().kinematic);
        assert!(item.body().use_gravity);
        assert_eq!(item.binding(), None);
        assert!(item.observers_mut().is_empty());

        item.add_charge(0.5);
        item.report_casualty(CasualtyReport {
            unit: handle(77),
            label: "grunt".to_string(),
            vitality: dummy_snapshot(),
        });
        assert_eq!(rig.recorder.ui.borrow().len(), published_before);
        assert!(rig.loadout.drain_signals().is_empty());
        assert!(!rig
            .scheduler
            .is_pending(TaskKey::Attach(EntityId(CARRIER), SlotKind::AuxiliaryAbility)));
    }

    #[test]
    fn drop_zeroes_velocity_and_ejects_forward() {
        let mut rig = Rig::new();
        let sword = rig.add(11, EquippableKind::Handheld, Vec3::new(3.0, 0.0, 0.0));
        rig.pickup(sword, SlotKind::Handheld).unwrap();
        rig.drop(SlotKind::Handheld).unwrap();
        let item = rig.item(sword);
        assert_eq!(item.body().velocity, Vec3::ZERO);
        assert_eq!(item.body().pending_impulse, Vec3::new(0.0, 0.0, 5.0));
        assert_eq!(item.position(), Vec3::new(0.5, 1.0, 0.5));
        assert_eq!(item.local_offset(), Vec3::ZERO);
    }

    #[test]
    fn native_slot_rejects_drop_and_keeps_item() {
        let mut rig = Rig::new();
        let core = rig.add(12, EquippableKind::Ability, Vec3::ZERO);
        rig.pickup(core, SlotKind::NativeAbility).unwrap();
        assert_eq!(
            rig.drop(SlotKind::NativeAbility),
            Err(TransferError::NonTransferable {
                slot: SlotKind::NativeAbility
            })
        );
        assert!(rig.item(core).is_carried());
        assert_eq!(rig.loadout.item_in(SlotKind::NativeAbility), Some(core));
    }

    #[test]
    fn native_slot_cannot_be_replaced() {
        let mut rig = Rig::new();
        let core = rig.add(12, EquippableKind::Ability, Vec3::ZERO);
        let other = rig.add(13, EquippableKind::Ability, Vec3::ZERO);
        rig.pickup(core, SlotKind::NativeAbility).unwrap();
        assert_eq!(
            rig.pickup(other, SlotKind::NativeAbility),
            Err(TransferError::NativeSlotLocked)
        );
        assert_eq!(rig.item(other).mode(), OwnershipMode::WorldOwned);
    }

    #[test]
    fn second_pickup_into_slot_drops_the_first() {
        let mut rig = Rig::new();
        let first = rig.add(10, EquippableKind::Handheld, Vec3::ZERO);
        let second = rig.add(11, EquippableKind::Handheld, Vec3::ZERO);
        rig.pickup(first, SlotKind::Handheld).unwrap();
        assert_eq!(
            rig.pickup(second, SlotKind::Handheld),
            Ok(TransferOutcome::PickedUp {
                item: second,
                slot: SlotKind::Handheld,
                displaced: Some(first)
            })
        );
        assert_eq!(rig.item(first).mode(), OwnershipMode::WorldOwned);
        assert!(rig.item(first).colliders_enabled());
        assert!(rig.item(second).is_carried());
        assert_eq!(rig.loadout.item_in(SlotKind::Handheld), Some(second));
    }

    #[test]
    fn invalid_transfers_are_distinguished() {
        let mut rig = Rig::new();
        let sword = rig.add(10, EquippableKind::Handheld, Vec3::ZERO);
        let orb = rig.add(11, EquippableKind::Ability, Vec3::ZERO);
        assert_eq!(
            rig.pickup(sword, SlotKind::UtilityItem),
            Err(TransferError::UtilityNotCarried)
        );
        assert_eq!(
            rig.pickup(sword, SlotKind::AuxiliaryAbility),
            Err(TransferError::SlotMismatch {
                slot: SlotKind::AuxiliaryAbility,
                kind: EquippableKind::Handheld
            })
        );
        assert_eq!(
            rig.pickup(orb, SlotKind::Handheld),
            Err(TransferError::SlotMismatch {
                slot: SlotKind::Handheld,
                kind: EquippableKind::Ability
            })
        );
        assert_eq!(
            rig.drop(SlotKind::UtilityItem),
            Err(TransferError::NonTransferable {
                slot: SlotKind::UtilityItem
            })
        );
    }

    #[test]
    fn noop_requests_are_ignored() {
        let mut rig = Rig::new();
        let sword = rig.add(10, EquippableKind::Handheld, Vec3::ZERO);
        assert_eq!(
            rig.drop(SlotKind::Handheld),
            Ok(TransferOutcome::Ignored(NoopReason::EmptySlot))
        );
        assert_eq!(
            rig.pickup(EntityId(99), SlotKind::Handheld),
            Ok(TransferOutcome::Ignored(NoopReason::UnknownItem))
        );
        rig.pickup(sword, SlotKind::Handheld).unwrap();
        assert_eq!(
            rig.pickup(sword, SlotKind::Handheld),
            Ok(TransferOutcome::Ignored(NoopReason::AlreadyEquipped))
        );
    }

    #[test]
    fn item_held_by_someone_else_cannot_be_taken() {
        let mut rig = Rig::new();
        let sword = rig.add(10, EquippableKind::Handheld, Vec3::ZERO);
        let mut rival = Loadout::new(handle(OTHER_CARRIER), None, settings());
        let mut ctx = TransferCtx {
            items: &mut rig.items,
            scheduler: &mut rig.scheduler,
            services: &rig.services,
            carrier_position: Vec3::ZERO,
            carrier_forward: Vec3::FORWARD,
        };
        rival.pickup(sword, SlotKind::Handheld, &mut ctx).unwrap();
        assert_eq!(
            rig.pickup(sword, SlotKind::Handheld),
            Err(TransferError::AlreadyCarried {
                item: sword,
                by: EntityId(OTHER_CARRIER)
            })
        );
    }

    #[test]
    fn ability_rises_to_attachment_point() {
        let mut rig = Rig::new();
        let orb = rig.add(10, EquippableKind::Ability, Vec3::new(0.0, 0.0, 4.0));
        rig.pickup(orb, SlotKind::AuxiliaryAbility).unwrap();
        assert_eq!(rig.item(orb).local_offset(), Vec3::new(0.0, 0.0, 4.0));

        rig.tick(0.2);
        let halfway = rig.item(orb).local_offset();
        assert!((halfway.z - 2.0).abs() < 1e-4);
        assert!(rig.loadout.is_attaching(SlotKind::AuxiliaryAbility));

        rig.tick(0.2);
        assert_eq!(rig.item(orb).local_offset(), Vec3::ZERO);
        assert_eq!(rig.item(orb).position(), Vec3::ZERO);
        assert!(!rig.loadout.is_attaching(SlotKind::AuxiliaryAbility));
    }

    #[test]
    fn handheld_snaps_without_animation() {
        let mut rig = Rig::new();
        let sword = rig.add(10, EquippableKind::Handheld, Vec3::new(9.0, 0.0, 0.0));
        rig.pickup(sword, SlotKind::Handheld).unwrap();
        assert_eq!(rig.item(sword).position(), Vec3::new(0.5, 1.0, 0.5));
        assert!(rig.scheduler.is_empty());
    }

    #[test]
    fn dropping_mid_attach_cancels_the_task() {
        let mut rig = Rig::new();
        let orb = rig.add(10, EquippableKind::Ability, Vec3::new(0.0, 0.0, 4.0));
        rig.pickup(orb, SlotKind::AuxiliaryAbility).unwrap();
        rig.tick(0.1);
        rig.drop(SlotKind::AuxiliaryAbility).unwrap();
        assert!(rig.scheduler.is_empty());
        assert!(!rig.loadout.is_attaching(SlotKind::AuxiliaryAbility));
        assert!((rig.item(orb).position().z - 3.0).abs() < 1e-4);
    }

    #[test]
    fn charge_changes_reach_the_slot_ui() {
        let mut rig = Rig::new();
        let orb = rig.add(10, EquippableKind::Ability, Vec3::ZERO);
        rig.pickup(orb, SlotKind::NativeAbility).unwrap();
        let item = rig.items.get_mut(&orb).unwrap();
        item.damage_achieved(-20.0);
        item.kill_achieved();
        let percentages: Vec<f32> = rig
            .recorder
            .ui_for(UiAttribute::NativeAbility)
            .into_iter()
            .filter_map(|payload| match payload {
                UiPayload::Percentage(value) => Some(value),
                _ => None,
            })
            .collect();
        assert_eq!(percentages.len(), 3);
        for (actual, expected) in percentages.iter().zip([0.0, 0.2, 0.3]) {
            assert!((actual - expected).abs() < 1e-5);
        }
    }

    #[test]
    fn casualties_are_queued_for_the_carrier() {
        let mut rig = Rig::new();
        let sword = rig.add(10, EquippableKind::Handheld, Vec3::ZERO);
        rig.pickup(sword, SlotKind::Handheld).unwrap();
        let report = CasualtyReport {
            unit: handle(77),
            label: "grunt".to_string(),
            vitality: dummy_snapshot(),
        };
        rig.items
            .get_mut(&sword)
            .unwrap()
            .report_casualty(report.clone());
        assert_eq!(
            rig.loadout.drain_signals(),
            vec![ItemSignal::CasualtyAchieved {
                item: sword,
                casualty: report
            }]
        );
        assert!(rig.loadout.drain_signals().is_empty());
    }

    #[test]
    fn teardown_drops_transferables_and_releases_native() {
        let mut rig = Rig::new();
        let core = rig.add(10, EquippableKind::Ability, Vec3::new(0.0, 0.0, 1.0));
        let orb = rig.add(11, EquippableKind::Ability, Vec3::new(0.0, 0.0, 1.0));
        let sword = rig.add(12, EquippableKind::Handheld, Vec3::ZERO);
        rig.pickup(core, SlotKind::NativeAbility).unwrap();
        rig.pickup(orb, SlotKind::AuxiliaryAbility).unwrap();
        rig.pickup(sword, SlotKind::Handheld).unwrap();

        let mut ctx = TransferCtx {
            items: &mut rig.items,
            scheduler: &mut rig.scheduler,
            services: &rig.services,
            carrier_position: Vec3::ZERO,
            carrier_forward: Vec3::FORWARD,
        };
        assert_eq!(rig.loadout.teardown(&mut ctx), vec![core]);
        assert!(rig.scheduler.is_empty());
        assert_eq!(rig.loadout.carried().count(), 0);
        assert_eq!(rig.item(orb).mode(), OwnershipMode::WorldOwned);
        assert_eq!(rig.item(sword).mode(), OwnershipMode::WorldOwned);
        assert_eq!(rig.item(core).binding(), None);
        assert!(rig.items.get_mut(&core).unwrap().observers_mut().is_empty());
    }

    fn dummy_snapshot() -> VitalitySnapshot {
        VitalitySnapshot {
            unit: EntityId(77),
            current_health: 10.0,
            max_health: 100,
            health_percentage: 0.1,
            is_alive: true,
            last_delta: -5.0,
            last_attacker: None,
        }
    }
}
