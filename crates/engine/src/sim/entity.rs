use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

/// Weak reference to an entity. Only valid while the registry still reports
/// the same generation as live for `id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityHandle {
    pub id: EntityId,
    pub generation: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TeamId(pub u32);

#[derive(Debug, Default)]
pub struct EntityIdAllocator {
    next: u64,
}

impl EntityIdAllocator {
    pub fn allocate(&mut self) -> EntityId {
        let id = EntityId(self.next);
        self.next = self.next.saturating_add(1);
        id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LivenessRecord {
    generation: u32,
    live: bool,
}

#[derive(Debug, Default)]
pub struct EntityRegistry {
    allocator: EntityIdAllocator,
    records: BTreeMap<EntityId, LivenessRecord>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self) -> EntityHandle {
        let id = self.allocator.allocate();
        self.records.insert(
            id,
            LivenessRecord {
                generation: 0,
                live: true,
            },
        );
        EntityHandle { id, generation: 0 }
    }

    pub fn despawn(&mut self, id: EntityId) -> bool {
        let Some(record) = self.records.get_mut(&id) else {
            return false;
        };
        if !record.live {
            return false;
        }
        record.live = false;
        record.generation = record.generation.saturating_add(1);
        true
    }

    /// Brings a despawned id back under a fresh generation. Handles taken
    /// before the despawn stay stale.
    pub fn recycle(&mut self, id: EntityId) -> Option<EntityHandle> {
        let record = self.records.get_mut(&id)?;
        if record.live {
            return None;
        }
        record.live = true;
        Some(EntityHandle {
            id,
            generation: record.generation,
        })
    }

    pub fn is_live(&self, handle: EntityHandle) -> bool {
        self.records
            .get(&handle.id)
            .is_some_and(|record| record.live && record.generation == handle.generation)
    }

    pub fn handle_of(&self, id: EntityId) -> Option<EntityHandle> {
        self.records
            .get(&id)
            .filter(|record| record.live)
            .map(|record| EntityHandle {
                id,
                generation: record.generation,
            })
    }

    pub fn live_count(&self) -> usize {
        self.records.values().filter(|record| record.live).count()
    }
}
