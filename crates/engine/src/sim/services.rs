use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::entity::EntityHandle;
use super::math::Vec3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorClass {
    HealthGained,
    HealthLost,
    CriticalHit,
    DamageAchieved,
    KillAchieved,
    Reward,
    Cost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PooledKind {
    DeathBurst,
    InteractionPrompt,
    AudioRemnant,
}

/// A pooled node lent out by the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PooledObject {
    pub kind: PooledKind,
    pub slot: u32,
    pub position: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UiAttribute {
    Health,
    NativeAbility,
    AuxiliaryAbility,
    Handheld,
    Utility,
    Enemy,
    Credits,
    InteractionPrompt,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiPayload {
    Percentage(f32),
    Labelled { label: String, percentage: f32 },
    Count(u32),
    Prompt {
        target: EntityHandle,
        name: String,
        cost: u32,
    },
    Cleared,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundClip {
    pub name: String,
    pub volume: f32,
    pub pitch: f32,
    pub use_remnant: bool,
}

impl Default for SoundClip {
    fn default() -> Self {
        Self {
            name: String::new(),
            volume: 1.0,
            pitch: 1.0,
            use_remnant: false,
        }
    }
}

pub trait EffectSink {
    fn notify(&self, position: Vec3, magnitude: i32, color: ColorClass);
}

pub trait PooledSpawner {
    /// `None` means the pool is exhausted.
    fn acquire(&self, kind: PooledKind, position: Vec3) -> Option<PooledObject>;
}

pub trait UiChannel {
    fn publish(&self, attribute: UiAttribute, payload: UiPayload);
}

pub trait SoundChannel {
    fn play(&self, clip: &SoundClip);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

impl EffectSink for Silent {
    fn notify(&self, _position: Vec3, _magnitude: i32, _color: ColorClass) {}
}

impl PooledSpawner for Silent {
    fn acquire(&self, _kind: PooledKind, _position: Vec3) -> Option<PooledObject> {
        None
    }
}

impl UiChannel for Silent {
    fn publish(&self, _attribute: UiAttribute, _payload: UiPayload) {}
}

impl SoundChannel for Silent {
    fn play(&self, _clip: &SoundClip) {}
}

#[derive(Clone)]
pub struct Services {
    pub effects: Rc<dyn EffectSink>,
    pub pool: Rc<dyn PooledSpawner>,
    pub ui: Rc<dyn UiChannel>,
    pub sound: Rc<dyn SoundChannel>,
}

impl Services {
    pub fn new(
        effects: Rc<dyn EffectSink>,
        pool: Rc<dyn PooledSpawner>,
        ui: Rc<dyn UiChannel>,
        sound: Rc<dyn SoundChannel>,
    ) -> Self {
        Self {
            effects,
            pool,
            ui,
            sound,
        }
    }

    pub fn silent() -> Self {
        let silent = Rc::new(Silent);
        Self {
            effects: silent.clone(),
            pool: silent.clone(),
            ui: silent.clone(),
            sound: silent,
        }
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}
