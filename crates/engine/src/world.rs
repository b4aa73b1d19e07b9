use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::behaviour::{
    CandidateHost, CandidateState, CasualtyReport, CollectOutcome, Collectible, CollectibleConfig,
    CollectibleKind, Collector, CommitOutcome, DeltaOutcome, DropOutcome, Equippable,
    EquippableConfig, ExperienceLedger, Hit, InteractResult, Interactable, InteractableConfig,
    InteractableEvent, InteractionRecord, ItemEvent, ItemSignal, NoopReason, OwnershipMode,
    PlayerConfig, PlayerController, SlotKind, TargetArbiter, TransferCtx, TransferError,
    TransferOutcome, UtilityLaunch, Vitality, VitalityConfig, VitalityCtx, VitalityEvent,
    VitalitySnapshot, Wallet,
};
use crate::sim::{
    EntityHandle, EntityId, EntityRegistry, ObserverRegistry, Services, TaskKey, TaskScheduler,
    Vec3,
};

#[derive(Debug)]
struct Unit {
    handle: EntityHandle,
    name: String,
    vitality: Vitality,
    position: Vec3,
    forward: Vec3,
}

/// Host-facing container. Owns every entity and routes host events into
/// the behaviours once per event or tick.
#[derive(Debug)]
pub struct World {
    services: Services,
    registry: EntityRegistry,
    scheduler: TaskScheduler<TaskKey>,
    units: BTreeMap<EntityId, Unit>,
    players: BTreeMap<EntityId, PlayerController>,
    interactables: BTreeMap<EntityId, Interactable>,
    collectibles: BTreeMap<EntityId, Collectible>,
    items: BTreeMap<EntityId, Equippable>,
}

struct PlayerCandidates<'a> {
    registry: &'a EntityRegistry,
    interactables: &'a mut BTreeMap<EntityId, Interactable>,
    services: &'a Services,
    user: EntityId,
    wallet: &'a mut Wallet,
}

impl CandidateHost for PlayerCandidates<'_> {
    type Interaction = InteractResult;

    fn candidate(&self, handle: EntityHandle) -> Option<CandidateState> {
        if !self.registry.is_live(handle) {
            return None;
        }
        self.interactables
            .get(&handle.id)
            .map(Interactable::candidate)
    }

    fn interact(&mut self, handle: EntityHandle) -> InteractResult {
        match self.interactables.get_mut(&handle.id) {
            Some(interactable) => interactable.interact(self.user, self.wallet, self.services),
            None => InteractResult::Unusable,
        }
    }

    fn inflate(&mut self, handle: EntityHandle) {
        if let Some(interactable) = self.interactables.get_mut(&handle.id) {
            interactable.inflate_ui(self.services);
        }
    }

    fn deflate(&mut self, handle: EntityHandle) {
        if let Some(interactable) = self.interactables.get_mut(&handle.id) {
            interactable.deflate_ui(self.services);
        }
    }
}

fn transfer_ctx<'a>(
    items: &'a mut BTreeMap<EntityId, Equippable>,
    scheduler: &'a mut TaskScheduler<TaskKey>,
    services: &'a Services,
    carrier: &Unit,
) -> TransferCtx<'a> {
    TransferCtx {
        items,
        scheduler,
        services,
        carrier_position: carrier.position,
        carrier_forward: carrier.forward,
    }
}

fn tracked_handle(arbiter: &TargetArbiter, id: EntityId) -> Option<EntityHandle> {
    arbiter
        .current()
        .filter(|handle| handle.id == id)
        .or_else(|| arbiter.in_range().find(|handle| handle.id == id))
}

fn ledger_mut(
    ledger: &mut Option<Box<dyn ExperienceLedger>>,
) -> Option<&mut dyn ExperienceLedger> {
    match ledger {
        Some(ledger) => Some(ledger.as_mut()),
        None => None,
    }
}

impl World {
    pub fn new(services: Services) -> Self {
        Self {
            services,
            registry: EntityRegistry::new(),
            scheduler: TaskScheduler::new(),
            units: BTreeMap::new(),
            players: BTreeMap::new(),
            interactables: BTreeMap::new(),
            collectibles: BTreeMap::new(),
            items: BTreeMap::new(),
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn scheduler(&self) -> &TaskScheduler<TaskKey> {
        &self.scheduler
    }

    pub fn is_live(&self, handle: EntityHandle) -> bool {
        self.registry.is_live(handle)
    }

    pub fn handle_of(&self, id: EntityId) -> Option<EntityHandle> {
        self.registry.handle_of(id)
    }

    pub fn live_count(&self) -> usize {
        self.registry.live_count()
    }

    pub fn spawn_unit(
        &mut self,
        name: impl Into<String>,
        config: VitalityConfig,
        position: Vec3,
    ) -> EntityHandle {
        let handle = self.registry.spawn();
        let mut vitality = Vitality::new(handle.id, config);
        vitality.activate(&mut self.scheduler);
        self.units.insert(
            handle.id,
            Unit {
                handle,
                name: name.into(),
                vitality,
                position,
                forward: Vec3::FORWARD,
            },
        );
        debug!(unit = handle.id.0, "unit_spawned");
        handle
    }

    pub fn spawn_player(
        &mut self,
        name: impl Into<String>,
        config: PlayerConfig,
        position: Vec3,
        forward: Vec3,
    ) -> EntityHandle {
        let handle = self.spawn_unit(name, config.vitality.clone(), position);
        let controller = PlayerController::new(handle, config);
        if let Some(unit) = self.units.get_mut(&handle.id) {
            unit.forward = forward;
            controller.wire_health_ui(&mut unit.vitality, &self.services);
        }
        controller.publish_credits(&self.services);
        self.players.insert(handle.id, controller);
        handle
    }

    pub fn spawn_interactable(&mut self, config: InteractableConfig, position: Vec3) -> EntityHandle {
        let handle = self.registry.spawn();
        self.interactables
            .insert(handle.id, Interactable::new(handle, config, position));
        handle
    }

    pub fn spawn_collectible(&mut self, config: CollectibleConfig, position: Vec3) -> EntityHandle {
        let handle = self.registry.spawn();
        self.collectibles
            .insert(handle.id, Collectible::new(handle, config, position));
        handle
    }

    pub fn spawn_item(&mut self, config: EquippableConfig, position: Vec3) -> EntityHandle {
        let handle = self.registry.spawn();
        self.items
            .insert(handle.id, Equippable::new(handle, config, position));
        handle
    }

    /// Removes an entity and everything tied to it: scheduled tasks, slot
    /// occupancy, arbiter pointers and observer subscriptions.
    pub fn despawn(&mut self, id: EntityId) -> bool {
        if self.registry.handle_of(id).is_none() {
            return false;
        }
        self.scheduler.cancel_where(|key| key.owner() == id);

        let mut released = Vec::new();
        if let Some(mut controller) = self.players.remove(&id) {
            if let Some(unit) = self.units.get(&id) {
                let mut ctx =
                    transfer_ctx(&mut self.items, &mut self.scheduler, &self.services, unit);
                released = controller.loadout.teardown(&mut ctx);
            }
            let mut host = PlayerCandidates {
                registry: &self.registry,
                interactables: &mut self.interactables,
                services: &self.services,
                user: id,
                wallet: &mut controller.wallet,
            };
            controller.arbiter.clear(&mut host);
        }

        if let Some(OwnershipMode::Carried { by, .. }) = self.items.get(&id).map(Equippable::mode) {
            if let (Some(controller), Some(unit)) = (self.players.get_mut(&by), self.units.get(&by)) {
                let mut ctx = transfer_ctx(&mut self.items, &mut self.scheduler, &self.services, unit);
                controller.loadout.release_item(id, &mut ctx);
            }
        }

        for (player_id, controller) in self.players.iter_mut() {
            let Some(handle) = tracked_handle(&controller.arbiter, id) else {
                continue;
            };
            let mut host = PlayerCandidates {
                registry: &self.registry,
                interactables: &mut self.interactables,
                services: &self.services,
                user: *player_id,
                wallet: &mut controller.wallet,
            };
            controller.arbiter.exit_proximity(handle, &mut host);
        }

        self.units.remove(&id);
        self.interactables.remove(&id);
        self.collectibles.remove(&id);
        self.items.remove(&id);

        for unit in self.units.values_mut() {
            unit.vitality.observers_mut().unsubscribe_owner(id);
        }
        for item in self.items.values_mut() {
            item.observers_mut().unsubscribe_owner(id);
        }
        for interactable in self.interactables.values_mut() {
            interactable.observers_mut().unsubscribe_owner(id);
            interactable.body_exited(id);
        }

        self.registry.despawn(id);
        debug!(entity = id.0, "entity_despawned");
        for native in released {
            self.despawn(native);
        }
        true
    }

    pub fn set_pose(&mut self, id: EntityId, position: Vec3, forward: Vec3) -> bool {
        if let Some(unit) = self.units.get_mut(&id) {
            unit.position = position;
            unit.forward = forward;
            return true;
        }
        if let Some(item) = self.items.get_mut(&id) {
            return item.set_world_pose(position, forward);
        }
        if let Some(interactable) = self.interactables.get_mut(&id) {
            interactable.set_position(position);
            return true;
        }
        if let Some(collectible) = self.collectibles.get_mut(&id) {
            collectible.position = position;
            return true;
        }
        false
    }

    pub fn proximity_enter(&mut self, player: EntityId, candidate: EntityId) -> bool {
        let Some(handle) = self.interactables.get(&candidate).map(Interactable::handle) else {
            return false;
        };
        let Some(controller) = self.players.get_mut(&player) else {
            return false;
        };
        controller.arbiter.enter_proximity(handle)
    }

    pub fn proximity_exit(&mut self, player: EntityId, candidate: EntityId) -> DropOutcome {
        let Some(controller) = self.players.get_mut(&player) else {
            return DropOutcome::NotCurrent;
        };
        let Some(handle) = tracked_handle(&controller.arbiter, candidate) else {
            return DropOutcome::NotCurrent;
        };
        let mut host = PlayerCandidates {
            registry: &self.registry,
            interactables: &mut self.interactables,
            services: &self.services,
            user: player,
            wallet: &mut controller.wallet,
        };
        controller.arbiter.exit_proximity(handle, &mut host)
    }

    /// A body entered the interactable's own activation trigger.
    pub fn trigger_enter(&mut self, interactable: EntityId, body: EntityId) -> bool {
        self.interactables
            .get_mut(&interactable)
            .is_some_and(|target| target.body_entered(body))
    }

    pub fn trigger_exit(&mut self, interactable: EntityId, body: EntityId) -> bool {
        self.interactables
            .get_mut(&interactable)
            .is_some_and(|target| target.body_exited(body))
    }

    pub fn apply_hit(&mut self, target: EntityId, hit: Hit) -> Option<DeltaOutcome> {
        let unit = self.units.get_mut(&target)?;
        let mut ctx = VitalityCtx {
            scheduler: &mut self.scheduler,
            services: &self.services,
            position: unit.position,
        };
        Some(unit.vitality.apply_delta(hit, &mut ctx))
    }

    /// A hit delivered by an item. Carried items sign the hit with their
    /// carrier and report the casualty back through their observers.
    pub fn item_hit(&mut self, item: EntityId, target: EntityId, hit: Hit) -> Option<DeltaOutcome> {
        let binding = self.items.get(&item)?.binding();
        let hit = match binding {
            Some(binding) => hit.from(binding.carrier),
            None => hit,
        };
        let outcome = self.apply_hit(target, hit)?;
        if outcome.changed_health() && binding.is_some() {
            let report = self.units.get(&target).map(|unit| CasualtyReport {
                unit: unit.handle,
                label: unit.name.clone(),
                vitality: unit.vitality.snapshot(),
            });
            if let (Some(report), Some(equippable)) = (report, self.items.get_mut(&item)) {
                equippable.report_casualty(report);
            }
        }
        Some(outcome)
    }

    /// Revives a unit, reactivating it first when death deactivated it.
    pub fn revive(&mut self, id: EntityId, health: f32) -> Option<f32> {
        let unit = self.units.get_mut(&id)?;
        if !unit.vitality.is_active() {
            unit.vitality.activate(&mut self.scheduler);
        }
        let mut ctx = VitalityCtx {
            scheduler: &mut self.scheduler,
            services: &self.services,
            position: unit.position,
        };
        Some(unit.vitality.revive(health, &mut ctx))
    }

    pub fn kill(&mut self, id: EntityId) -> bool {
        let Some(unit) = self.units.get_mut(&id) else {
            return false;
        };
        let mut ctx = VitalityCtx {
            scheduler: &mut self.scheduler,
            services: &self.services,
            position: unit.position,
        };
        unit.vitality.kill(&mut ctx)
    }

    pub fn activate(&mut self, id: EntityId) -> bool {
        let Some(unit) = self.units.get_mut(&id) else {
            return false;
        };
        unit.vitality.activate(&mut self.scheduler);
        true
    }

    pub fn deactivate(&mut self, id: EntityId) -> bool {
        let Some(unit) = self.units.get_mut(&id) else {
            return false;
        };
        unit.vitality.deactivate(&mut self.scheduler);
        true
    }

    pub fn interact(&mut self, player: EntityId) -> Option<CommitOutcome<InteractResult>> {
        let (Some(controller), Some(unit)) = (self.players.get_mut(&player), self.units.get(&player))
        else {
            return None;
        };
        let mut host = PlayerCandidates {
            registry: &self.registry,
            interactables: &mut self.interactables,
            services: &self.services,
            user: player,
            wallet: &mut controller.wallet,
        };
        let outcome =
            controller
                .arbiter
                .commit(unit.position, controller.config.interaction_radius, &mut host);
        if let CommitOutcome::Interacted {
            result: InteractResult::Used,
            ..
        } = outcome
        {
            controller.publish_credits(&self.services);
        }
        Some(outcome)
    }

    pub fn pickup(
        &mut self,
        player: EntityId,
        item: EntityId,
        slot: SlotKind,
    ) -> Result<TransferOutcome, TransferError> {
        let (Some(controller), Some(unit)) = (self.players.get_mut(&player), self.units.get(&player))
        else {
            return Ok(TransferOutcome::Ignored(NoopReason::UnknownCarrier));
        };
        let mut ctx = transfer_ctx(&mut self.items, &mut self.scheduler, &self.services, unit);
        let result = controller.loadout.pickup(item, slot, &mut ctx);
        if let Err(err) = &result {
            warn!(player = player.0, item = item.0, error = %err, "pickup_rejected");
        }
        result
    }

    pub fn drop(
        &mut self,
        player: EntityId,
        slot: SlotKind,
    ) -> Result<TransferOutcome, TransferError> {
        let (Some(controller), Some(unit)) = (self.players.get_mut(&player), self.units.get(&player))
        else {
            return Ok(TransferOutcome::Ignored(NoopReason::UnknownCarrier));
        };
        let mut ctx = transfer_ctx(&mut self.items, &mut self.scheduler, &self.services, unit);
        controller.loadout.drop(slot, &mut ctx)
    }

    pub fn drop_item(
        &mut self,
        player: EntityId,
        item: EntityId,
    ) -> Result<TransferOutcome, TransferError> {
        let (Some(controller), Some(unit)) = (self.players.get_mut(&player), self.units.get(&player))
        else {
            return Ok(TransferOutcome::Ignored(NoopReason::UnknownCarrier));
        };
        let mut ctx = transfer_ctx(&mut self.items, &mut self.scheduler, &self.services, unit);
        controller.loadout.drop_item(item, &mut ctx)
    }

    pub fn utility_hold(&mut self, player: EntityId, dt_seconds: f32) -> Option<UtilityLaunch> {
        let (Some(controller), Some(unit)) = (self.players.get_mut(&player), self.units.get(&player))
        else {
            return None;
        };
        controller.utility_hold(dt_seconds, unit.position, unit.forward, &self.services)
    }

    pub fn utility_release(&mut self, player: EntityId) -> Option<UtilityLaunch> {
        let (Some(controller), Some(unit)) = (self.players.get_mut(&player), self.units.get(&player))
        else {
            return None;
        };
        controller.utility_release(unit.position, unit.forward, &self.services)
    }

    pub fn utility_cancel(&mut self, player: EntityId) -> bool {
        let Some(controller) = self.players.get_mut(&player) else {
            return false;
        };
        controller.utility_cancel();
        true
    }

    /// Contact between a body and a pickup. Collected pickups are despawned.
    pub fn collect(&mut self, collector: EntityId, collectible: EntityId) -> CollectOutcome {
        let Some(pickup) = self.collectibles.get(&collectible).copied() else {
            return CollectOutcome::Declined;
        };
        let Some(unit) = self.units.get_mut(&collector) else {
            return CollectOutcome::Declined;
        };
        let (wallet, ledger) = match self.players.get_mut(&collector) {
            Some(controller) => (
                Some(&mut controller.wallet),
                ledger_mut(&mut controller.ledger),
            ),
            None => (None, None),
        };
        let mut ctx = VitalityCtx {
            scheduler: &mut self.scheduler,
            services: &self.services,
            position: unit.position,
        };
        let parts = Collector {
            vitality: Some(&mut unit.vitality),
            wallet,
            ledger,
        };
        let outcome = pickup.attempt_apply(parts, &mut ctx);
        if outcome == CollectOutcome::Collected {
            if pickup.kind == CollectibleKind::Credit {
                if let Some(controller) = self.players.get(&collector) {
                    controller.publish_credits(&self.services);
                }
            }
            self.despawn(collectible);
        }
        outcome
    }

    pub fn tick(&mut self, dt_seconds: f32) {
        for key in self.scheduler.advance(dt_seconds) {
            self.dispatch_expiry(key);
        }
        self.advance_attachments();
        self.pull_collectibles(dt_seconds);
        self.refresh_targets();
        self.drain_signals();
    }

    fn dispatch_expiry(&mut self, key: TaskKey) {
        match key {
            TaskKey::Invincibility(id) => {
                if let Some(unit) = self.units.get_mut(&id) {
                    unit.vitality.end_invincibility(&mut self.scheduler);
                }
            }
            TaskKey::Attach(carrier, slot) => {
                let (Some(controller), Some(unit)) =
                    (self.players.get_mut(&carrier), self.units.get(&carrier))
                else {
                    return;
                };
                let mut ctx = transfer_ctx(&mut self.items, &mut self.scheduler, &self.services, unit);
                controller.loadout.finish_attach(slot, &mut ctx);
            }
        }
    }

    fn advance_attachments(&mut self) {
        for (id, controller) in self.players.iter_mut() {
            let Some(unit) = self.units.get(id) else {
                continue;
            };
            let mut ctx = transfer_ctx(&mut self.items, &mut self.scheduler, &self.services, unit);
            controller.loadout.advance_attachments(&mut ctx);
        }
    }

    fn pull_collectibles(&mut self, dt_seconds: f32) {
        for (id, controller) in &self.players {
            if !controller.config.should_collect {
                continue;
            }
            let Some(unit) = self.units.get(id) else {
                continue;
            };
            if !unit.vitality.is_alive() {
                continue;
            }
            for collectible in self.collectibles.values_mut() {
                collectible.pull_toward(
                    unit.position,
                    controller.config.collect_range,
                    controller.config.collect_speed,
                    dt_seconds,
                );
            }
        }
    }

    fn refresh_targets(&mut self) {
        for (id, controller) in self.players.iter_mut() {
            let Some(unit) = self.units.get(id) else {
                continue;
            };
            let viewpoint = controller.viewpoint(unit.position, unit.forward);
            let mut host = PlayerCandidates {
                registry: &self.registry,
                interactables: &mut self.interactables,
                services: &self.services,
                user: *id,
                wallet: &mut controller.wallet,
            };
            controller
                .arbiter
                .refresh(&viewpoint, controller.config.interaction_radius, &mut host);
        }
    }

    fn drain_signals(&mut self) {
        for (id, controller) in self.players.iter_mut() {
            let Some(unit) = self.units.get(id) else {
                continue;
            };
            controller.drain_signals(&mut self.items, &self.services, unit.position);
        }
    }

    pub fn vitality(&self, id: EntityId) -> Option<&Vitality> {
        self.units.get(&id).map(|unit| &unit.vitality)
    }

    pub fn vitality_mut(&mut self, id: EntityId) -> Option<&mut Vitality> {
        self.units.get_mut(&id).map(|unit| &mut unit.vitality)
    }

    pub fn unit_name(&self, id: EntityId) -> Option<&str> {
        self.units.get(&id).map(|unit| unit.name.as_str())
    }

    pub fn unit_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.units.keys().copied()
    }

    pub fn position(&self, id: EntityId) -> Option<Vec3> {
        if let Some(unit) = self.units.get(&id) {
            return Some(unit.position);
        }
        if let Some(item) = self.items.get(&id) {
            return Some(item.position());
        }
        if let Some(interactable) = self.interactables.get(&id) {
            return Some(interactable.position());
        }
        self.collectibles
            .get(&id)
            .map(|collectible| collectible.position)
    }

    /// The last attacker, or `None` once that attacker is gone.
    pub fn last_attacker(&self, unit: EntityId) -> Option<EntityHandle> {
        self.units
            .get(&unit)?
            .vitality
            .last_attacker()
            .filter(|attacker| self.registry.is_live(*attacker))
    }

    pub fn player(&self, id: EntityId) -> Option<&PlayerController> {
        self.players.get(&id)
    }

    pub fn set_experience_ledger(&mut self, player: EntityId, ledger: Box<dyn ExperienceLedger>) -> bool {
        let Some(controller) = self.players.get_mut(&player) else {
            return false;
        };
        controller.set_experience_ledger(ledger);
        true
    }

    pub fn item(&self, id: EntityId) -> Option<&Equippable> {
        self.items.get(&id)
    }

    pub fn interactable(&self, id: EntityId) -> Option<&Interactable> {
        self.interactables.get(&id)
    }

    pub fn set_interactable_enabled(&mut self, id: EntityId, enabled: bool) -> bool {
        let Some(interactable) = self.interactables.get_mut(&id) else {
            return false;
        };
        interactable.set_enabled(enabled);
        if !enabled {
            interactable.deflate_ui(&self.services);
        }
        true
    }

    pub fn collectible(&self, id: EntityId) -> Option<&Collectible> {
        self.collectibles.get(&id)
    }

    pub fn collectible_count(&self) -> usize {
        self.collectibles.len()
    }

    pub fn unit_observers(
        &mut self,
        id: EntityId,
    ) -> Option<&mut ObserverRegistry<VitalityEvent, VitalitySnapshot>> {
        self.units
            .get_mut(&id)
            .map(|unit| unit.vitality.observers_mut())
    }

    pub fn interactable_observers(
        &mut self,
        id: EntityId,
    ) -> Option<&mut ObserverRegistry<InteractableEvent, InteractionRecord>> {
        self.interactables
            .get_mut(&id)
            .map(Interactable::observers_mut)
    }

    pub fn item_observers(
        &mut self,
        id: EntityId,
    ) -> Option<&mut ObserverRegistry<ItemEvent, ItemSignal>> {
        self.items.get_mut(&id).map(Equippable::observers_mut)
    }
}
