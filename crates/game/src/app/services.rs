use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use behaviour_engine::sim::{
    ColorClass, EffectSink, PooledKind, PooledObject, PooledSpawner, SoundChannel, SoundClip,
    UiAttribute, UiChannel, UiPayload,
};
use behaviour_engine::{ExperienceLedger, Services, Vec3};
use tracing::debug;

/// Floating numbers and hit flashes become log lines.
#[derive(Debug, Default)]
pub(crate) struct TracingEffects {
    emitted: Cell<u32>,
}

impl TracingEffects {
    pub(crate) fn emitted(&self) -> u32 {
        self.emitted.get()
    }
}

impl EffectSink for TracingEffects {
    fn notify(&self, position: Vec3, magnitude: i32, color: ColorClass) {
        self.emitted.set(self.emitted.get().saturating_add(1));
        debug!(
            x = position.x,
            y = position.y,
            z = position.z,
            magnitude,
            color = ?color,
            "effect_notified"
        );
    }
}

/// Pool with a fixed number of objects per kind, reclaimed every tick.
#[derive(Debug)]
pub(crate) struct FramePool {
    capacity_per_tick: u32,
    lent: RefCell<BTreeMap<PooledKind, u32>>,
}

impl FramePool {
    pub(crate) fn new(capacity_per_tick: u32) -> Self {
        Self {
            capacity_per_tick,
            lent: RefCell::new(BTreeMap::new()),
        }
    }

    pub(crate) fn begin_tick(&self) {
        self.lent.borrow_mut().clear();
    }
}

impl PooledSpawner for FramePool {
    fn acquire(&self, kind: PooledKind, position: Vec3) -> Option<PooledObject> {
        let mut lent = self.lent.borrow_mut();
        let used = lent.entry(kind).or_insert(0);
        if *used >= self.capacity_per_tick {
            debug!(kind = ?kind, capacity = self.capacity_per_tick, "pool_exhausted");
            return None;
        }
        let slot = *used;
        *used += 1;
        Some(PooledObject {
            kind,
            slot,
            position,
        })
    }
}

/// Keeps the latest payload per attribute, the way a HUD would show it.
#[derive(Debug, Default)]
pub(crate) struct UiBoard {
    latest: RefCell<BTreeMap<UiAttribute, UiPayload>>,
}

impl UiBoard {
    pub(crate) fn latest(&self, attribute: UiAttribute) -> Option<UiPayload> {
        self.latest.borrow().get(&attribute).cloned()
    }
}

impl UiChannel for UiBoard {
    fn publish(&self, attribute: UiAttribute, payload: UiPayload) {
        debug!(attribute = ?attribute, payload = ?payload, "ui_published");
        self.latest.borrow_mut().insert(attribute, payload);
    }
}

#[derive(Debug, Default)]
pub(crate) struct TracingSound;

impl SoundChannel for TracingSound {
    fn play(&self, clip: &SoundClip) {
        debug!(
            clip = %clip.name,
            volume = clip.volume,
            pitch = clip.pitch,
            "sound_played"
        );
    }
}

/// Flat experience counter shared with the sandbox summary.
#[derive(Debug, Clone, Default)]
pub(crate) struct SandboxLedger {
    experience: Rc<Cell<i64>>,
}

impl SandboxLedger {
    pub(crate) fn experience(&self) -> i64 {
        self.experience.get()
    }
}

impl ExperienceLedger for SandboxLedger {
    fn can_modify(&self, delta: i32) -> bool {
        self.experience.get() + i64::from(delta) >= 0
    }

    fn modify(&mut self, delta: i32) {
        self.experience.set(self.experience.get() + i64::from(delta));
    }
}

/// Concrete capability set the sandbox hands to the world.
#[derive(Debug, Clone)]
pub(crate) struct SandboxServices {
    pub(crate) effects: Rc<TracingEffects>,
    pub(crate) pool: Rc<FramePool>,
    pub(crate) ui: Rc<UiBoard>,
    pub(crate) ledger: SandboxLedger,
}

impl SandboxServices {
    pub(crate) fn new(pool_capacity_per_tick: u32) -> Self {
        Self {
            effects: Rc::new(TracingEffects::default()),
            pool: Rc::new(FramePool::new(pool_capacity_per_tick)),
            ui: Rc::new(UiBoard::default()),
            ledger: SandboxLedger::default(),
        }
    }

    pub(crate) fn services(&self) -> Services {
        Services::new(
            self.effects.clone(),
            self.pool.clone(),
            self.ui.clone(),
            Rc::new(TracingSound),
        )
    }
}
