use serde::{Deserialize, Serialize};

use crate::sim::Vec3;

const MIN_THROW_TIME_SECONDS: f32 = 0.1;
const MAX_THROW_TIME_SECONDS: f32 = 4.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UtilityConfig {
    pub name: String,
    pub should_be_thrown: bool,
    pub throw_power: f32,
    pub throw_time_seconds: f32,
    pub count: u32,
}

impl Default for UtilityConfig {
    fn default() -> Self {
        Self {
            name: "Utility".to_string(),
            should_be_thrown: true,
            throw_power: 10.0,
            throw_time_seconds: 1.0,
            count: 3,
        }
    }
}

impl UtilityConfig {
    pub fn sanitized(mut self) -> Self {
        self.throw_time_seconds = if self.throw_time_seconds.is_finite() {
            self.throw_time_seconds
                .clamp(MIN_THROW_TIME_SECONDS, MAX_THROW_TIME_SECONDS)
        } else {
            MIN_THROW_TIME_SECONDS
        };
        if !self.throw_power.is_finite() || self.throw_power < 0.0 {
            self.throw_power = 0.0;
        }
        self
    }
}

/// One consumed utility item. The host instantiates the launched object.
#[derive(Debug, Clone, PartialEq)]
pub struct UtilityLaunch {
    pub name: String,
    pub origin: Vec3,
    pub launch_vector: Vec3,
    pub charge_fraction: f32,
    pub thrown: bool,
}

#[derive(Debug, Clone)]
pub struct UtilityPouch {
    config: UtilityConfig,
    count: u32,
    charge_seconds: f32,
    charging: bool,
}

impl UtilityPouch {
    pub fn new(config: UtilityConfig) -> Self {
        let config = config.sanitized();
        Self {
            count: config.count,
            config,
            charge_seconds: 0.0,
            charging: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn restock(&mut self, amount: u32) {
        self.count = self.count.saturating_add(amount);
    }

    pub fn is_charging(&self) -> bool {
        self.charging
    }

    pub fn charge_fraction(&self) -> f32 {
        (self.charge_seconds / self.config.throw_time_seconds).clamp(0.0, 1.0)
    }

    /// Held input for `dt_seconds`. Throwables charge; anything else is
    /// used on the spot.
    pub fn hold(&mut self, dt_seconds: f32, origin: Vec3, direction: Vec3) -> Option<UtilityLaunch> {
        if self.count == 0 {
            return None;
        }
        if !self.config.should_be_thrown {
            return Some(self.consume(origin, direction));
        }
        if dt_seconds.is_finite() && dt_seconds > 0.0 {
            self.charge_seconds += dt_seconds;
        }
        self.charging = true;
        None
    }

    pub fn release(&mut self, origin: Vec3, direction: Vec3) -> Option<UtilityLaunch> {
        if !self.charging || self.count == 0 || !self.config.should_be_thrown {
            return None;
        }
        Some(self.consume(origin, direction))
    }

    pub fn cancel(&mut self) {
        self.charge_seconds = 0.0;
        self.charging = false;
    }

    fn consume(&mut self, origin: Vec3, direction: Vec3) -> UtilityLaunch {
        let thrown = self.config.should_be_thrown;
        let charge_fraction = self.charge_fraction();
        let launch_vector = if thrown {
            direction
                .normalized()
                .scale(self.config.throw_power * charge_fraction)
        } else {
            Vec3::ZERO
        };
        self.count = self.count.saturating_sub(1);
        self.cancel();
        UtilityLaunch {
            name: self.config.name.clone(),
            origin,
            launch_vector,
            charge_fraction,
            thrown,
        }
    }
}
