use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use behaviour_engine::behaviour::{InteractableEvent, VitalityEvent};
use behaviour_engine::sim::{UiAttribute, UiPayload};
use behaviour_engine::{CollectOutcome, EntityHandle, EntityId, Hit, SlotKind, Vec3, World};
use tracing::{debug, info, warn};

use super::config::{SandboxConfig, ScriptAction, ScriptStep};
use super::services::SandboxServices;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ScenarioSummary {
    pub(crate) ticks: u32,
    pub(crate) live_entities: usize,
    pub(crate) player_alive: bool,
    pub(crate) player_health: f32,
    pub(crate) credits: u32,
    pub(crate) credits_hud: Option<UiPayload>,
    pub(crate) experience: i64,
    pub(crate) kills: u32,
    pub(crate) interactions: u32,
    pub(crate) effects: u32,
    pub(crate) carried: Vec<(SlotKind, String)>,
    pub(crate) collectibles_left: usize,
}

/// A populated world plus the scripted host events that drive it.
#[derive(Debug)]
pub(crate) struct Scenario {
    world: World,
    services: SandboxServices,
    player: EntityHandle,
    names: BTreeMap<String, EntityId>,
    interactables: Vec<EntityId>,
    collectibles: Vec<EntityId>,
    script: Vec<ScriptStep>,
    next_step: usize,
    contact_radius: f32,
    fixed_dt_seconds: f32,
    tick: u32,
    kills: Rc<Cell<u32>>,
    interactions: Rc<Cell<u32>>,
    touching: BTreeSet<EntityId>,
    nearby: BTreeSet<EntityId>,
}

impl Scenario {
    pub(crate) fn load(config: &SandboxConfig, services: SandboxServices) -> Self {
        let mut world = World::new(services.services());
        let spec = &config.player;
        let player = world.spawn_player(
            spec.name.clone(),
            spec.config.clone(),
            spec.position,
            spec.forward,
        );
        world.set_experience_ledger(player.id, Box::new(services.ledger.clone()));

        let mut names = BTreeMap::new();
        names.insert(spec.name.clone(), player.id);
        let kills = Rc::new(Cell::new(0));
        let interactions = Rc::new(Cell::new(0));

        for unit in &config.units {
            let handle = world.spawn_unit(unit.name.clone(), unit.vitality.clone(), unit.position);
            if let Some(observers) = world.unit_observers(handle.id) {
                let kills = Rc::clone(&kills);
                observers.subscribe(VitalityEvent::Killed, handle.id, move |_| {
                    kills.set(kills.get() + 1);
                });
            }
            names.insert(unit.name.clone(), handle.id);
        }

        let mut interactables = Vec::with_capacity(config.interactables.len());
        for spec in &config.interactables {
            let handle = world.spawn_interactable(spec.config.clone(), spec.position);
            if let Some(observers) = world.interactable_observers(handle.id) {
                let interactions = Rc::clone(&interactions);
                observers.subscribe(InteractableEvent::Used, handle.id, move |_| {
                    interactions.set(interactions.get() + 1);
                });
            }
            names.insert(spec.config.name.clone(), handle.id);
            interactables.push(handle.id);
        }

        let mut collectibles = Vec::with_capacity(config.collectibles.len());
        for spec in &config.collectibles {
            let handle = world.spawn_collectible(spec.config, spec.position);
            names.insert(spec.name.clone(), handle.id);
            collectibles.push(handle.id);
        }

        for spec in &config.items {
            let handle = world.spawn_item(spec.config.clone(), spec.position);
            names.insert(spec.config.name.clone(), handle.id);
            if let Some(slot) = spec.equip {
                if let Err(err) = world.pickup(player.id, handle.id, slot) {
                    warn!(item = %spec.config.name, slot = ?slot, error = %err, "starting_item_rejected");
                }
            }
        }

        let mut script = config.script.clone();
        script.sort_by_key(|step| step.at_tick);

        info!(
            player = %spec.name,
            units = config.units.len(),
            interactables = interactables.len(),
            collectibles = collectibles.len(),
            items = config.items.len(),
            script_steps = script.len(),
            "scenario_loaded"
        );

        Self {
            world,
            services,
            player,
            names,
            interactables,
            collectibles,
            script,
            next_step: 0,
            contact_radius: config.contact_radius,
            fixed_dt_seconds: config.fixed_dt_seconds(),
            tick: 0,
            kills,
            interactions,
            touching: BTreeSet::new(),
            nearby: BTreeSet::new(),
        }
    }

    pub(crate) fn world(&self) -> &World {
        &self.world
    }

    pub(crate) fn player(&self) -> EntityHandle {
        self.player
    }

    pub(crate) fn entity(&self, name: &str) -> Option<EntityId> {
        self.names.get(name).copied()
    }

    /// One fixed step: due script actions, contact sensing, then the world tick.
    pub(crate) fn step(&mut self) {
        self.services.pool.begin_tick();
        while let Some(step) = self.script.get(self.next_step) {
            if step.at_tick > self.tick {
                break;
            }
            let action = step.action.clone();
            self.next_step += 1;
            self.apply(action);
        }
        self.sense_contacts();
        self.world.tick(self.fixed_dt_seconds);
        self.tick += 1;
    }

    fn resolve(&self, name: &str) -> Option<EntityId> {
        let id = self.entity(name);
        if id.is_none() {
            warn!(name, "script_target_unknown");
        }
        id
    }

    fn apply(&mut self, action: ScriptAction) {
        let player = self.player.id;
        debug!(tick = self.tick, action = ?action, "script_action");
        match action {
            ScriptAction::MovePlayer { position, forward } => {
                self.world.set_pose(player, position, forward);
            }
            ScriptAction::Interact => {
                let outcome = self.world.interact(player);
                info!(tick = self.tick, outcome = ?outcome, "interaction_attempted");
            }
            ScriptAction::Pickup { item, slot } => {
                let Some(item) = self.resolve(&item) else {
                    return;
                };
                if let Err(err) = self.world.pickup(player, item, slot) {
                    warn!(tick = self.tick, error = %err, "scripted_pickup_rejected");
                }
            }
            ScriptAction::Drop { slot } => {
                if let Err(err) = self.world.drop(player, slot) {
                    warn!(tick = self.tick, error = %err, "scripted_drop_rejected");
                }
            }
            ScriptAction::Strike {
                item,
                target,
                damage,
                critical,
            } => {
                let (Some(item), Some(target)) = (self.resolve(&item), self.resolve(&target))
                else {
                    return;
                };
                let hit = if critical {
                    Hit::damage(damage).critical()
                } else {
                    Hit::damage(damage)
                };
                let outcome = self.world.item_hit(item, target, hit);
                debug!(tick = self.tick, outcome = ?outcome, "strike_resolved");
            }
            ScriptAction::Hit { target, damage } => {
                if let Some(target) = self.resolve(&target) {
                    self.world.apply_hit(target, Hit::damage(damage));
                }
            }
            ScriptAction::Heal { target, amount } => {
                if let Some(target) = self.resolve(&target) {
                    self.world.apply_hit(target, Hit::heal(amount));
                }
            }
            ScriptAction::Revive { target, health } => {
                if let Some(target) = self.resolve(&target) {
                    self.world.revive(target, health);
                }
            }
            ScriptAction::Kill { target } => {
                if let Some(target) = self.resolve(&target) {
                    self.world.kill(target);
                }
            }
            ScriptAction::ThrowUtility { hold_seconds } => {
                let launch = self
                    .world
                    .utility_hold(player, hold_seconds)
                    .or_else(|| self.world.utility_release(player));
                match launch {
                    Some(launch) => info!(
                        tick = self.tick,
                        utility = %launch.name,
                        charge = launch.charge_fraction,
                        thrown = launch.thrown,
                        "utility_launched"
                    ),
                    None => debug!(tick = self.tick, "utility_unavailable"),
                }
            }
            ScriptAction::Despawn { target } => {
                if let Some(target) = self.resolve(&target) {
                    self.world.despawn(target);
                }
            }
        }
    }

    /// Stands in for physics triggers: compares the player's distance to
    /// interactables and pickups and raises enter/exit events on change.
    fn sense_contacts(&mut self) {
        let player = self.player.id;
        let Some(origin) = self.world.position(player) else {
            return;
        };
        if !self.world.vitality(player).is_some_and(|vitality| vitality.is_alive()) {
            return;
        }
        let interaction_radius = self
            .world
            .player(player)
            .map_or(0.0, |controller| controller.config().interaction_radius);

        for &id in &self.interactables {
            let Some(position) = self.world.position(id) else {
                continue;
            };
            let distance = origin.distance(position);
            sync_membership(
                &mut self.touching,
                id,
                distance <= self.contact_radius,
                |entered| {
                    if entered {
                        self.world.trigger_enter(id, player);
                    } else {
                        self.world.trigger_exit(id, player);
                    }
                },
            );
            sync_membership(
                &mut self.nearby,
                id,
                distance <= interaction_radius,
                |entered| {
                    if entered {
                        self.world.proximity_enter(player, id);
                    } else {
                        self.world.proximity_exit(player, id);
                    }
                },
            );
        }

        for &id in &self.collectibles {
            let touching = self
                .world
                .position(id)
                .is_some_and(|position: Vec3| origin.distance(position) <= self.contact_radius);
            if touching && self.world.collect(player, id) == CollectOutcome::Collected {
                debug!(tick = self.tick, collectible = id.0, "collectible_collected");
            }
        }
    }

    pub(crate) fn summary(&self) -> ScenarioSummary {
        let player = self.player().id;
        let vitality = self.world().vitality(player);
        let controller = self.world().player(player);
        let carried = controller
            .map(|controller| {
                controller
                    .loadout()
                    .carried()
                    .map(|(slot, id)| {
                        let name = self
                            .world
                            .item(id)
                            .map_or_else(String::new, |item| item.name().to_string());
                        (slot, name)
                    })
                    .collect()
            })
            .unwrap_or_default();
        ScenarioSummary {
            ticks: self.tick,
            live_entities: self.world.live_count(),
            player_alive: vitality.is_some_and(|vitality| vitality.is_alive()),
            player_health: vitality.map_or(0.0, |vitality| vitality.current_health()),
            credits: controller.map_or(0, |controller| controller.wallet().credits()),
            credits_hud: self.services.ui.latest(UiAttribute::Credits),
            experience: self.services.ledger.experience(),
            kills: self.kills.get(),
            interactions: self.interactions.get(),
            effects: self.services.effects.emitted(),
            carried,
            collectibles_left: self.world.collectible_count(),
        }
    }
}

fn sync_membership(
    members: &mut BTreeSet<EntityId>,
    id: EntityId,
    inside: bool,
    mut on_change: impl FnMut(bool),
) {
    if inside && members.insert(id) {
        on_change(true);
    } else if !inside && members.remove(&id) {
        on_change(false);
    }
}
