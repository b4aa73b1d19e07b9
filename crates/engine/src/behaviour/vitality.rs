use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::sim::{
    ColorClass, EntityHandle, EntityId, ObserverRegistry, PooledKind, Services, TaskKey,
    TaskScheduler, Vec3,
};

const LOW_HEALTH_PERCENT: f32 = 0.2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VitalityConfig {
    pub base_max_health: i32,
    pub damage_resistance: i32,
    pub invincibility_window_seconds: f32,
    pub max_health_on_activation: bool,
    pub deactivate_on_death: bool,
}

impl Default for VitalityConfig {
    fn default() -> Self {
        Self {
            base_max_health: 100,
            damage_resistance: 0,
            invincibility_window_seconds: 0.2,
            max_health_on_activation: true,
            deactivate_on_death: true,
        }
    }
}

impl VitalityConfig {
    /// Clamps every numeric tunable to a finite, non-negative value.
    pub fn sanitized(mut self) -> Self {
        self.base_max_health = self.base_max_health.max(0);
        self.damage_resistance = self.damage_resistance.max(0);
        self.invincibility_window_seconds = non_negative_seconds(self.invincibility_window_seconds);
        self
    }
}

fn non_negative_seconds(value: f32) -> f32 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

/// A signed health change. Negative deltas are damage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub delta: f32,
    pub is_critical: bool,
    pub attacker: Option<EntityHandle>,
    pub direction: Vec3,
}

impl Hit {
    pub fn damage(amount: f32) -> Self {
        Self::raw(-amount.abs())
    }

    pub fn heal(amount: f32) -> Self {
        Self::raw(amount.abs())
    }

    pub fn raw(delta: f32) -> Self {
        Self {
            delta,
            is_critical: false,
            attacker: None,
            direction: Vec3::ZERO,
        }
    }

    pub fn critical(mut self) -> Self {
        self.is_critical = true;
        self
    }

    pub fn from(mut self, attacker: EntityHandle) -> Self {
        self.attacker = Some(attacker);
        self
    }

    pub fn toward(mut self, direction: Vec3) -> Self {
        self.direction = direction;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    Uninitialized,
    Inactive,
    Dead,
    Invincible,
    ZeroDelta,
    FullHealth,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeltaOutcome {
    Ignored(IgnoreReason),
    Applied { applied: f32, current_health: f32 },
    Killed { applied: f32 },
}

impl DeltaOutcome {
    pub fn changed_health(&self) -> bool {
        !matches!(self, Self::Ignored(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VitalityPhase {
    Uninitialized,
    Vulnerable,
    Invincible,
    Dead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VitalityEvent {
    Damaged,
    HealthChanged,
    Killed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VitalitySnapshot {
    pub unit: EntityId,
    pub current_health: f32,
    pub max_health: i32,
    pub health_percentage: f32,
    pub is_alive: bool,
    pub last_delta: f32,
    pub last_attacker: Option<EntityHandle>,
}

/// Borrowed collaborators for one vitality operation.
pub struct VitalityCtx<'a> {
    pub scheduler: &'a mut TaskScheduler<TaskKey>,
    pub services: &'a Services,
    pub position: Vec3,
}

#[derive(Debug)]
pub struct Vitality {
    owner: EntityId,
    config: VitalityConfig,
    current_health: f32,
    bonus_health: i32,
    initialized: bool,
    active: bool,
    is_alive: bool,
    is_invincible: bool,
    last_attacker: Option<EntityHandle>,
    last_attack_direction: Vec3,
    last_delta: f32,
    observers: ObserverRegistry<VitalityEvent, VitalitySnapshot>,
}

impl Vitality {
    pub fn new(owner: EntityId, config: VitalityConfig) -> Self {
        Self {
            owner,
            config: config.sanitized(),
            current_health: 0.0,
            bonus_health: 0,
            initialized: false,
            active: false,
            is_alive: false,
            is_invincible: false,
            last_attacker: None,
            last_attack_direction: Vec3::ZERO,
            last_delta: 0.0,
            observers: ObserverRegistry::new(),
        }
    }

    pub fn owner(&self) -> EntityId {
        self.owner
    }

    pub fn config(&self) -> &VitalityConfig {
        &self.config
    }

    pub fn observers_mut(&mut self) -> &mut ObserverRegistry<VitalityEvent, VitalitySnapshot> {
        &mut self.observers
    }

    fn invincibility_key(&self) -> TaskKey {
        TaskKey::Invincibility(self.owner)
    }

    pub fn activate(&mut self, scheduler: &mut TaskScheduler<TaskKey>) {
        if !self.initialized || self.config.max_health_on_activation {
            self.initialize(scheduler);
        }
        self.active = true;
    }

    pub fn deactivate(&mut self, scheduler: &mut TaskScheduler<TaskKey>) {
        self.active = false;
        self.end_invincibility(scheduler);
    }

    fn initialize(&mut self, scheduler: &mut TaskScheduler<TaskKey>) {
        scheduler.cancel(self.invincibility_key());
        self.current_health = self.max_health() as f32;
        self.is_alive = true;
        self.is_invincible = false;
        self.initialized = true;
    }

    pub fn apply_delta(&mut self, hit: Hit, ctx: &mut VitalityCtx<'_>) -> DeltaOutcome {
        if !self.initialized {
            return DeltaOutcome::Ignored(IgnoreReason::Uninitialized);
        }
        if !self.is_alive {
            return DeltaOutcome::Ignored(IgnoreReason::Dead);
        }
        if !self.active {
            return DeltaOutcome::Ignored(IgnoreReason::Inactive);
        }
        if self.is_invincible {
            return DeltaOutcome::Ignored(IgnoreReason::Invincible);
        }
        let mut delta = hit.delta;
        if !delta.is_finite() || delta == 0.0 {
            return DeltaOutcome::Ignored(IgnoreReason::ZeroDelta);
        }

        if delta < 0.0 {
            self.last_attacker = hit.attacker;
            self.last_attack_direction = hit.direction;
        }

        let max_health = self.max_health() as f32;
        if delta > 0.0 && self.current_health >= max_health {
            return DeltaOutcome::Ignored(IgnoreReason::FullHealth);
        }

        let rounded = delta.round() as i32;
        if rounded != 0 {
            let color = if rounded > 0 {
                ColorClass::HealthGained
            } else if hit.is_critical {
                ColorClass::CriticalHit
            } else {
                ColorClass::HealthLost
            };
            ctx.services.effects.notify(ctx.position, rounded, color);
        }

        if delta < 0.0 && delta.abs() <= self.config.damage_resistance as f32 {
            delta = -1.0;
        }

        let before = self.current_health;
        self.current_health = (before + delta).clamp(0.0, max_health);
        let applied = self.current_health - before;
        self.last_delta = applied;

        if self.current_health <= 0.0 {
            self.die(ctx);
            return DeltaOutcome::Killed { applied };
        }

        if delta < 0.0 {
            self.notify(VitalityEvent::Damaged);
        }
        self.notify(VitalityEvent::HealthChanged);
        if delta < 0.0 {
            self.start_invincibility(ctx.scheduler);
        }

        DeltaOutcome::Applied {
            applied,
            current_health: self.current_health,
        }
    }

    /// Brings the unit back regardless of its current state. Returns the
    /// health it was revived with.
    pub fn revive(&mut self, new_health: f32, ctx: &mut VitalityCtx<'_>) -> f32 {
        let max_health = self.max_health() as f32;
        let floor = max_health.min(1.0);
        let new_health = if new_health.is_finite() {
            new_health.clamp(floor, max_health)
        } else {
            max_health
        };

        self.initialized = true;
        self.is_alive = true;
        self.current_health = new_health;
        self.last_attacker = None;
        self.last_attack_direction = Vec3::ZERO;
        self.last_delta = 0.0;

        self.notify(VitalityEvent::HealthChanged);
        if self.active {
            self.start_invincibility(ctx.scheduler);
        }
        new_health
    }

    pub fn revive_max(&mut self, ctx: &mut VitalityCtx<'_>) -> f32 {
        self.revive(self.max_health() as f32, ctx)
    }

    /// Explicit death. Returns `false` when there was nothing to kill.
    pub fn kill(&mut self, ctx: &mut VitalityCtx<'_>) -> bool {
        if !self.initialized || !self.is_alive {
            return false;
        }
        self.last_delta = -self.current_health;
        self.current_health = 0.0;
        self.die(ctx);
        true
    }

    fn die(&mut self, ctx: &mut VitalityCtx<'_>) {
        if !self.is_alive {
            return;
        }
        self.is_alive = false;
        self.end_invincibility(ctx.scheduler);

        if ctx
            .services
            .pool
            .acquire(PooledKind::DeathBurst, ctx.position)
            .is_none()
        {
            debug!(unit = self.owner.0, "death_burst_pool_exhausted");
        }

        self.notify(VitalityEvent::Damaged);
        self.notify(VitalityEvent::HealthChanged);
        self.notify(VitalityEvent::Killed);

        if self.config.deactivate_on_death {
            self.active = false;
        }
        info!(
            unit = self.owner.0,
            attacker = ?self.last_attacker.map(|handle| handle.id.0),
            "unit_killed"
        );
    }

    fn start_invincibility(&mut self, scheduler: &mut TaskScheduler<TaskKey>) {
        let window = self.config.invincibility_window_seconds;
        if window <= 0.0 {
            scheduler.cancel(self.invincibility_key());
            self.is_invincible = false;
            return;
        }
        scheduler.start(self.invincibility_key(), window);
        self.is_invincible = true;
    }

    /// Called when the invincibility task expires or must be cut short.
    pub fn end_invincibility(&mut self, scheduler: &mut TaskScheduler<TaskKey>) {
        scheduler.cancel(self.invincibility_key());
        self.is_invincible = false;
    }

    fn notify(&mut self, event: VitalityEvent) {
        let snapshot = self.snapshot();
        self.observers.notify(event, &snapshot);
    }

    pub fn set_base_max_health(&mut self, value: i32) {
        self.config.base_max_health = value.max(0);
        self.clamp_health();
    }

    pub fn set_bonus_health(&mut self, value: i32) {
        self.bonus_health = value;
        self.clamp_health();
    }

    pub fn set_damage_resistance(&mut self, value: i32) {
        self.config.damage_resistance = value.max(0);
    }

    pub fn set_invincibility_window(&mut self, seconds: f32) {
        self.config.invincibility_window_seconds = non_negative_seconds(seconds);
    }

    fn clamp_health(&mut self) {
        self.current_health = self.current_health.clamp(0.0, self.max_health() as f32);
    }

    pub fn phase(&self) -> VitalityPhase {
        if !self.initialized {
            VitalityPhase::Uninitialized
        } else if !self.is_alive {
            VitalityPhase::Dead
        } else if self.is_invincible {
            VitalityPhase::Invincible
        } else {
            VitalityPhase::Vulnerable
        }
    }

    pub fn current_health(&self) -> f32 {
        self.current_health
    }

    pub fn max_health(&self) -> i32 {
        self.config
            .base_max_health
            .saturating_add(self.bonus_health)
            .max(0)
    }

    pub fn bonus_health(&self) -> i32 {
        self.bonus_health
    }

    pub fn damage_resistance(&self) -> i32 {
        self.config.damage_resistance
    }

    pub fn is_alive(&self) -> bool {
        self.is_alive
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_invincible(&self) -> bool {
        self.is_invincible
    }

    pub fn health_percentage(&self) -> f32 {
        let max_health = self.max_health();
        if max_health == 0 {
            return 0.0;
        }
        self.current_health / max_health as f32
    }

    pub fn is_low_health(&self) -> bool {
        self.health_percentage() <= LOW_HEALTH_PERCENT
    }

    pub fn needs_healing(&self) -> bool {
        self.current_health < self.max_health() as f32
    }

    pub fn can_be_damaged(&self, amount: f32) -> bool {
        self.is_alive && !self.is_invincible && amount.abs() > self.config.damage_resistance as f32
    }

    pub fn last_delta(&self) -> f32 {
        self.last_delta
    }

    pub fn last_attacker(&self) -> Option<EntityHandle> {
        self.last_attacker
    }

    pub fn last_attack_direction(&self) -> Vec3 {
        self.last_attack_direction.normalized()
    }

    pub fn snapshot(&self) -> VitalitySnapshot {
        VitalitySnapshot {
            unit: self.owner,
            current_health: self.current_health,
            max_health: self.max_health(),
            health_percentage: self.health_percentage(),
            is_alive: self.is_alive,
            last_delta: self.last_delta,
            last_attacker: self.last_attacker,
        }
    }
}
