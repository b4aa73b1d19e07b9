use serde::{Deserialize, Serialize};

use super::interactable::Wallet;
use super::vitality::{Hit, Vitality, VitalityCtx};
use crate::sim::{ColorClass, EntityHandle, Vec3};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollectibleKind {
    Health,
    Experience,
    Credit,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectibleConfig {
    pub kind: CollectibleKind,
    pub value: i32,
}

impl Default for CollectibleConfig {
    fn default() -> Self {
        Self {
            kind: CollectibleKind::Credit,
            value: 1,
        }
    }
}

/// Experience bookkeeping owned by the host.
pub trait ExperienceLedger {
    fn can_modify(&self, delta: i32) -> bool;
    fn modify(&mut self, delta: i32);
}

/// Whatever the collecting body can receive. Missing parts decline.
#[derive(Default)]
pub struct Collector<'a> {
    pub vitality: Option<&'a mut Vitality>,
    pub wallet: Option<&'a mut Wallet>,
    pub ledger: Option<&'a mut dyn ExperienceLedger>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectOutcome {
    Collected,
    Declined,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Collectible {
    pub handle: EntityHandle,
    pub kind: CollectibleKind,
    pub value: i32,
    pub position: Vec3,
}

impl Collectible {
    pub fn new(handle: EntityHandle, config: CollectibleConfig, position: Vec3) -> Self {
        Self {
            handle,
            kind: config.kind,
            value: config.value,
            position,
        }
    }

    pub fn attempt_apply(&self, collector: Collector<'_>, ctx: &mut VitalityCtx<'_>) -> CollectOutcome {
        let collected = match self.kind {
            CollectibleKind::Health => collector.vitality.is_some_and(|vitality| {
                vitality.needs_healing()
                    && vitality
                        .apply_delta(Hit::raw(self.value as f32).from(self.handle), ctx)
                        .changed_health()
            }),
            CollectibleKind::Credit => collector.wallet.is_some_and(|wallet| {
                let applied = wallet.apply(i64::from(self.value));
                if applied && self.value != 0 {
                    ctx.services
                        .effects
                        .notify(self.position, self.value, ColorClass::Reward);
                }
                applied
            }),
            CollectibleKind::Experience => collector.ledger.is_some_and(|ledger| {
                if !ledger.can_modify(self.value) {
                    return false;
                }
                ledger.modify(self.value);
                true
            }),
        };
        if collected {
            CollectOutcome::Collected
        } else {
            CollectOutcome::Declined
        }
    }

    /// Moves toward `target` when within `range`, never overshooting.
    /// Returns whether the pickup moved.
    pub fn pull_toward(&mut self, target: Vec3, range: f32, speed: f32, dt_seconds: f32) -> bool {
        let distance = self.position.distance(target);
        if distance > range || distance <= f32::EPSILON {
            return false;
        }
        let step = speed.max(0.0) * dt_seconds.max(0.0);
        if !step.is_finite() || step <= 0.0 {
            return false;
        }
        self.position = if step >= distance {
            target
        } else {
            self.position + (target - self.position).normalized().scale(step)
        };
        true
    }
}
