use std::collections::BTreeMap;

use super::entity::EntityId;
use crate::behaviour::SlotKind;

/// What a delayed action is for. At most one task exists per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskKey {
    Invincibility(EntityId),
    Attach(EntityId, SlotKind),
}

impl TaskKey {
    pub fn owner(self) -> EntityId {
        match self {
            Self::Invincibility(owner) | Self::Attach(owner, _) => owner,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledTask {
    pub duration_seconds: f32,
    pub elapsed_seconds: f32,
}

impl ScheduledTask {
    pub fn progress(&self) -> f32 {
        if self.duration_seconds <= 0.0 {
            return 1.0;
        }
        (self.elapsed_seconds / self.duration_seconds).clamp(0.0, 1.0)
    }

    fn is_due(&self) -> bool {
        self.elapsed_seconds >= self.duration_seconds
    }
}

/// Host-tick driven countdowns with cancel-and-restart semantics.
#[derive(Debug, Clone)]
pub struct TaskScheduler<K> {
    tasks: BTreeMap<K, ScheduledTask>,
}

impl<K> Default for TaskScheduler<K> {
    fn default() -> Self {
        Self {
            tasks: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Copy> TaskScheduler<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a fresh countdown for `key`, replacing any in-flight one.
    /// Returns `true` when a pending task was replaced.
    pub fn start(&mut self, key: K, duration_seconds: f32) -> bool {
        let duration_seconds = if duration_seconds.is_finite() {
            duration_seconds.max(0.0)
        } else {
            0.0
        };
        self.tasks
            .insert(
                key,
                ScheduledTask {
                    duration_seconds,
                    elapsed_seconds: 0.0,
                },
            )
            .is_some()
    }

    pub fn cancel(&mut self, key: K) -> bool {
        self.tasks.remove(&key).is_some()
    }

    pub fn cancel_where(&mut self, mut predicate: impl FnMut(K) -> bool) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|key, _| !predicate(*key));
        before - self.tasks.len()
    }

    pub fn is_pending(&self, key: K) -> bool {
        self.tasks.contains_key(&key)
    }

    pub fn progress(&self, key: K) -> Option<f32> {
        self.tasks.get(&key).map(ScheduledTask::progress)
    }

    pub fn task(&self, key: K) -> Option<&ScheduledTask> {
        self.tasks.get(&key)
    }

    /// Advances every task and returns the keys that expired, in key order.
    pub fn advance(&mut self, dt_seconds: f32) -> Vec<K> {
        let dt_seconds = if dt_seconds.is_finite() {
            dt_seconds.max(0.0)
        } else {
            0.0
        };
        let mut expired = Vec::new();
        for (key, task) in &mut self.tasks {
            task.elapsed_seconds += dt_seconds;
            if task.is_due() {
                expired.push(*key);
            }
        }
        for key in &expired {
            self.tasks.remove(key);
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
