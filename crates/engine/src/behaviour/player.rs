use std::collections::BTreeMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::collectible::ExperienceLedger;
use super::equipment::{
    CasualtyReport, Equippable, ItemSignal, Loadout, LoadoutSettings, SlotKind,
};
use super::interactable::Wallet;
use super::targeting::{TargetArbiter, Viewpoint};
use super::utility::{UtilityConfig, UtilityLaunch, UtilityPouch};
use super::vitality::{Vitality, VitalityConfig, VitalityEvent};
use crate::sim::{
    ColorClass, EntityHandle, EntityId, Services, TeamId, UiAttribute, UiPayload, Vec3,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub interaction_radius: f32,
    pub field_of_view_degrees: f32,
    pub should_collect: bool,
    pub collect_range: f32,
    pub collect_speed: f32,
    pub attach_duration_seconds: f32,
    pub drop_impulse: f32,
    pub handheld_offset: Vec3,
    pub starting_credits: u32,
    pub team: Option<u32>,
    pub vitality: VitalityConfig,
    pub utility: Option<UtilityConfig>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            interaction_radius: 4.0,
            field_of_view_degrees: 120.0,
            should_collect: false,
            collect_range: 4.0,
            collect_speed: 6.0,
            attach_duration_seconds: 0.35,
            drop_impulse: 5.0,
            handheld_offset: Vec3::new(0.4, 1.2, 0.6),
            starting_credits: 0,
            team: None,
            vitality: VitalityConfig::default(),
            utility: None,
        }
    }
}

impl PlayerConfig {
    pub fn loadout_settings(&self) -> LoadoutSettings {
        LoadoutSettings {
            attach_duration_seconds: non_negative(self.attach_duration_seconds),
            drop_impulse: non_negative(self.drop_impulse),
            handheld_offset: self.handheld_offset,
        }
    }
}

fn non_negative(value: f32) -> f32 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

/// Glue between a player's arbiter, loadout, purse and pouch.
pub struct PlayerController {
    pub(crate) handle: EntityHandle,
    pub(crate) config: PlayerConfig,
    pub(crate) arbiter: TargetArbiter,
    pub(crate) loadout: Loadout,
    pub(crate) wallet: Wallet,
    pub(crate) utility: Option<UtilityPouch>,
    pub(crate) ledger: Option<Box<dyn ExperienceLedger>>,
}

impl std::fmt::Debug for PlayerController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerController")
            .field("handle", &self.handle)
            .field("arbiter", &self.arbiter)
            .field("loadout", &self.loadout)
            .field("wallet", &self.wallet)
            .field("utility", &self.utility)
            .field("has_ledger", &self.ledger.is_some())
            .finish()
    }
}

impl PlayerController {
    pub fn new(handle: EntityHandle, config: PlayerConfig) -> Self {
        let loadout = Loadout::new(handle, config.team.map(TeamId), config.loadout_settings());
        let utility = config.utility.clone().map(UtilityPouch::new);
        Self {
            handle,
            wallet: Wallet::new(config.starting_credits),
            arbiter: TargetArbiter::new(),
            loadout,
            utility,
            ledger: None,
            config,
        }
    }

    pub fn handle(&self) -> EntityHandle {
        self.handle
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn arbiter(&self) -> &TargetArbiter {
        &self.arbiter
    }

    pub fn loadout(&self) -> &Loadout {
        &self.loadout
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    pub fn utility(&self) -> Option<&UtilityPouch> {
        self.utility.as_ref()
    }

    pub fn set_experience_ledger(&mut self, ledger: Box<dyn ExperienceLedger>) {
        self.ledger = Some(ledger);
    }

    pub fn viewpoint(&self, position: Vec3, forward: Vec3) -> Viewpoint {
        Viewpoint {
            position,
            forward,
            field_of_view_degrees: self.config.field_of_view_degrees,
        }
    }

    pub fn wire_health_ui(&self, vitality: &mut Vitality, services: &Services) {
        let ui = Rc::clone(&services.ui);
        vitality.observers_mut().subscribe(
            VitalityEvent::HealthChanged,
            self.handle.id,
            move |snapshot| ui.publish(UiAttribute::Health, UiPayload::Percentage(snapshot.health_percentage)),
        );
    }

    pub fn credit_arithmetic(&mut self, delta: i64, services: &Services) -> bool {
        if !self.wallet.apply(delta) {
            return false;
        }
        self.publish_credits(services);
        true
    }

    pub(crate) fn publish_credits(&self, services: &Services) {
        services
            .ui
            .publish(UiAttribute::Credits, UiPayload::Count(self.wallet.credits()));
    }

    /// Routes queued item signals; returns how many casualties were handled.
    pub fn drain_signals(
        &mut self,
        items: &mut BTreeMap<EntityId, Equippable>,
        services: &Services,
        position: Vec3,
    ) -> usize {
        let mut casualties = 0;
        for signal in self.loadout.drain_signals() {
            if let ItemSignal::CasualtyAchieved { casualty, .. } = signal {
                self.casualty_achieved(&casualty, items, services, position);
                casualties += 1;
            }
        }
        casualties
    }

    pub fn casualty_achieved(
        &mut self,
        casualty: &CasualtyReport,
        items: &mut BTreeMap<EntityId, Equippable>,
        services: &Services,
        position: Vec3,
    ) {
        services.ui.publish(
            UiAttribute::Enemy,
            UiPayload::Labelled {
                label: casualty.label.clone(),
                percentage: casualty.vitality.health_percentage,
            },
        );

        let abilities = [SlotKind::NativeAbility, SlotKind::AuxiliaryAbility]
            .into_iter()
            .filter_map(|slot| self.loadout.item_in(slot));
        let magnitude = casualty.vitality.last_delta.abs().round() as i32;
        if casualty.vitality.is_alive {
            for id in abilities {
                if let Some(item) = items.get_mut(&id) {
                    item.damage_achieved(casualty.vitality.last_delta);
                }
            }
            services
                .effects
                .notify(position, magnitude, ColorClass::DamageAchieved);
        } else {
            for id in abilities {
                if let Some(item) = items.get_mut(&id) {
                    item.kill_achieved();
                }
            }
            services
                .effects
                .notify(position, magnitude, ColorClass::KillAchieved);
        }
    }

    fn utility_origin(&self, position: Vec3) -> Vec3 {
        position + self.config.handheld_offset
    }

    pub fn utility_hold(
        &mut self,
        dt_seconds: f32,
        position: Vec3,
        forward: Vec3,
        services: &Services,
    ) -> Option<UtilityLaunch> {
        let origin = self.utility_origin(position);
        let launch = self.utility.as_mut()?.hold(dt_seconds, origin, forward);
        self.after_utility_use(launch, services)
    }

    pub fn utility_release(
        &mut self,
        position: Vec3,
        forward: Vec3,
        services: &Services,
    ) -> Option<UtilityLaunch> {
        let origin = self.utility_origin(position);
        let launch = self.utility.as_mut()?.release(origin, forward);
        self.after_utility_use(launch, services)
    }

    pub fn utility_cancel(&mut self) {
        if let Some(pouch) = self.utility.as_mut() {
            pouch.cancel();
        }
    }

    fn after_utility_use(
        &self,
        launch: Option<UtilityLaunch>,
        services: &Services,
    ) -> Option<UtilityLaunch> {
        let launch = launch?;
        if let Some(pouch) = &self.utility {
            services
                .ui
                .publish(UiAttribute::Utility, UiPayload::Count(pouch.count()));
        }
        Some(launch)
    }
}
