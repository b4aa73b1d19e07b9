use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::targeting::CandidateState;
use crate::sim::{
    ColorClass, EntityHandle, EntityId, ObserverRegistry, PooledKind, Services, SoundClip,
    UiAttribute, UiPayload, Vec3,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractableConfig {
    pub name: String,
    pub activation_cost: i32,
    pub usable_outside_view: bool,
    pub ui_offset: Vec3,
    pub activation_sound: Option<SoundClip>,
    pub uses: Option<u32>,
}

impl Default for InteractableConfig {
    fn default() -> Self {
        Self {
            name: "Interactable Object".to_string(),
            activation_cost: 0,
            usable_outside_view: false,
            ui_offset: Vec3::new(0.0, 1.0, 2.0),
            activation_sound: None,
            uses: None,
        }
    }
}

/// Single-currency purse. Never goes negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Wallet {
    credits: u32,
}

impl Wallet {
    pub fn new(credits: u32) -> Self {
        Self { credits }
    }

    pub fn credits(&self) -> u32 {
        self.credits
    }

    pub fn try_debit(&mut self, amount: u32) -> bool {
        match self.credits.checked_sub(amount) {
            Some(remaining) => {
                self.credits = remaining;
                true
            }
            None => false,
        }
    }

    pub fn credit(&mut self, amount: u32) {
        self.credits = self.credits.saturating_add(amount);
    }

    /// Signed change; refused when it would leave the balance negative.
    pub fn apply(&mut self, delta: i64) -> bool {
        let next = i64::from(self.credits) + delta;
        if next < 0 {
            return false;
        }
        self.credits = u32::try_from(next).unwrap_or(u32::MAX);
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InteractableEvent {
    Used,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InteractionRecord {
    pub interactable: EntityHandle,
    pub user: EntityId,
    pub cost: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractResult {
    Unusable,
    NotActivator,
    Unaffordable { cost: u32, balance: u32 },
    Used,
}

#[derive(Debug)]
pub struct Interactable {
    handle: EntityHandle,
    config: InteractableConfig,
    position: Vec3,
    enabled: bool,
    uses_remaining: Option<u32>,
    activators: BTreeSet<EntityId>,
    prompt_shown: bool,
    observers: ObserverRegistry<InteractableEvent, InteractionRecord>,
}

impl Interactable {
    pub fn new(handle: EntityHandle, config: InteractableConfig, position: Vec3) -> Self {
        let uses_remaining = config.uses;
        Self {
            handle,
            config,
            position,
            enabled: true,
            uses_remaining,
            activators: BTreeSet::new(),
            prompt_shown: false,
            observers: ObserverRegistry::new(),
        }
    }

    pub fn handle(&self) -> EntityHandle {
        self.handle
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    pub fn activation_cost(&self) -> u32 {
        u32::try_from(self.config.activation_cost).unwrap_or(0)
    }

    pub fn uses_remaining(&self) -> Option<u32> {
        self.uses_remaining
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_usable(&self) -> bool {
        self.enabled && self.uses_remaining != Some(0)
    }

    pub fn observers_mut(&mut self) -> &mut ObserverRegistry<InteractableEvent, InteractionRecord> {
        &mut self.observers
    }

    pub fn body_entered(&mut self, body: EntityId) -> bool {
        self.activators.insert(body)
    }

    pub fn body_exited(&mut self, body: EntityId) -> bool {
        self.activators.remove(&body)
    }

    pub fn is_activator(&self, body: EntityId) -> bool {
        self.activators.contains(&body)
    }

    pub fn candidate(&self) -> CandidateState {
        CandidateState {
            handle: self.handle,
            position: self.position,
            is_usable: self.is_usable(),
            usable_outside_view: self.config.usable_outside_view,
        }
    }

    pub fn interact(
        &mut self,
        user: EntityId,
        wallet: &mut Wallet,
        services: &Services,
    ) -> InteractResult {
        if !self.is_usable() {
            return InteractResult::Unusable;
        }
        if !self.is_activator(user) {
            return InteractResult::NotActivator;
        }
        let cost = self.activation_cost();
        if !wallet.try_debit(cost) {
            return InteractResult::Unaffordable {
                cost,
                balance: wallet.credits(),
            };
        }

        if let Some(remaining) = self.uses_remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
        }
        if cost > 0 {
            services
                .effects
                .notify(self.position, -(cost as i32), ColorClass::Cost);
        }
        let record = InteractionRecord {
            interactable: self.handle,
            user,
            cost,
        };
        self.observers.notify(InteractableEvent::Used, &record);
        if let Some(sound) = &self.config.activation_sound {
            play_clip(sound, self.position, services);
        }
        info!(
            interactable = self.handle.id.0,
            user = user.0,
            cost,
            name = %self.config.name,
            "interaction_used"
        );
        InteractResult::Used
    }

    /// Shows the interaction prompt. Skipped when disabled or when the
    /// prompt pool is exhausted.
    pub fn inflate_ui(&mut self, services: &Services) -> bool {
        if !self.enabled {
            return false;
        }
        if self.prompt_shown {
            return true;
        }
        let anchor = self.position + self.config.ui_offset;
        if services
            .pool
            .acquire(PooledKind::InteractionPrompt, anchor)
            .is_none()
        {
            debug!(interactable = self.handle.id.0, "interaction_prompt_pool_exhausted");
            return false;
        }
        services.ui.publish(
            UiAttribute::InteractionPrompt,
            UiPayload::Prompt {
                target: self.handle,
                name: self.config.name.clone(),
                cost: self.activation_cost(),
            },
        );
        self.prompt_shown = true;
        true
    }

    pub fn deflate_ui(&mut self, services: &Services) {
        if !self.prompt_shown {
            return;
        }
        self.prompt_shown = false;
        services
            .ui
            .publish(UiAttribute::InteractionPrompt, UiPayload::Cleared);
    }

    pub fn is_prompt_shown(&self) -> bool {
        self.prompt_shown
    }
}

pub(crate) fn play_clip(clip: &SoundClip, position: Vec3, services: &Services) {
    if clip.use_remnant
        && services
            .pool
            .acquire(PooledKind::AudioRemnant, position)
            .is_none()
    {
        debug!(clip = %clip.name, "audio_remnant_pool_exhausted");
        return;
    }
    services.sound.play(clip);
}
