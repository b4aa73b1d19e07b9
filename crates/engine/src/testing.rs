//! Recording doubles for the capability services and the candidate seam.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::behaviour::{CandidateHost, CandidateState};
use crate::sim::{
    ColorClass, EffectSink, EntityHandle, EntityId, PooledKind, PooledObject, PooledSpawner,
    Services, SoundChannel, SoundClip, UiAttribute, UiChannel, UiPayload, Vec3,
};

#[derive(Debug, Default)]
pub(crate) struct Recorder {
    pub(crate) effects: RefCell<Vec<(Vec3, i32, ColorClass)>>,
    pub(crate) pooled: RefCell<Vec<PooledKind>>,
    pub(crate) ui: RefCell<Vec<(UiAttribute, UiPayload)>>,
    pub(crate) sounds: RefCell<Vec<String>>,
    exhausted: Cell<bool>,
}

impl Recorder {
    pub(crate) fn exhaust_pool(&self) {
        self.exhausted.set(true);
    }

    pub(crate) fn ui_for(&self, attribute: UiAttribute) -> Vec<UiPayload> {
        self.ui
            .borrow()
            .iter()
            .filter(|(published, _)| *published == attribute)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    pub(crate) fn colors(&self) -> Vec<ColorClass> {
        self.effects
            .borrow()
            .iter()
            .map(|(_, _, color)| *color)
            .collect()
    }
}

impl EffectSink for Recorder {
    fn notify(&self, position: Vec3, magnitude: i32, color: ColorClass) {
        self.effects.borrow_mut().push((position, magnitude, color));
    }
}

impl PooledSpawner for Recorder {
    fn acquire(&self, kind: PooledKind, position: Vec3) -> Option<PooledObject> {
        if self.exhausted.get() {
            return None;
        }
        let mut pooled = self.pooled.borrow_mut();
        pooled.push(kind);
        Some(PooledObject {
            kind,
            slot: pooled.len() as u32 - 1,
            position,
        })
    }
}

impl UiChannel for Recorder {
    fn publish(&self, attribute: UiAttribute, payload: UiPayload) {
        self.ui.borrow_mut().push((attribute, payload));
    }
}

impl SoundChannel for Recorder {
    fn play(&self, clip: &SoundClip) {
        self.sounds.borrow_mut().push(clip.name.clone());
    }
}

pub(crate) fn recording_services() -> (Rc<Recorder>, Services) {
    let recorder = Rc::new(Recorder::default());
    let services = Services::new(
        recorder.clone(),
        recorder.clone(),
        recorder.clone(),
        recorder.clone(),
    );
    (recorder, services)
}

/// In-memory candidate table for arbiter tests.
#[derive(Debug, Default)]
pub(crate) struct FakeHost {
    pub(crate) candidates: BTreeMap<EntityHandle, CandidateState>,
    pub(crate) interactions: Vec<EntityHandle>,
    pub(crate) inflated: Vec<EntityHandle>,
    pub(crate) deflated: Vec<EntityHandle>,
}

impl FakeHost {
    pub(crate) fn add(&mut self, id: u64, position: Vec3) -> CandidateState {
        let state = CandidateState {
            handle: handle(id),
            position,
            is_usable: true,
            usable_outside_view: false,
        };
        self.candidates.insert(state.handle, state);
        state
    }

    pub(crate) fn state(&self, id: u64) -> CandidateState {
        self.candidates[&handle(id)]
    }

    pub(crate) fn update(&mut self, id: u64, edit: impl FnOnce(&mut CandidateState)) {
        if let Some(state) = self.candidates.get_mut(&handle(id)) {
            edit(state);
        }
    }

    pub(crate) fn destroy(&mut self, id: u64) {
        self.candidates.remove(&handle(id));
    }
}

impl CandidateHost for FakeHost {
    type Interaction = ();

    fn candidate(&self, handle: EntityHandle) -> Option<CandidateState> {
        self.candidates.get(&handle).copied()
    }

    fn interact(&mut self, handle: EntityHandle) {
        self.interactions.push(handle);
    }

    fn inflate(&mut self, handle: EntityHandle) {
        self.inflated.push(handle);
    }

    fn deflate(&mut self, handle: EntityHandle) {
        self.deflated.push(handle);
    }
}

pub(crate) fn handle(id: u64) -> EntityHandle {
    EntityHandle {
        id: EntityId(id),
        generation: 0,
    }
}
