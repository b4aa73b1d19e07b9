//! Gameplay behaviour core: unit vitality, interaction targeting, pickups,
//! equipment slots and the world container that routes host events.

pub mod behaviour;
pub mod sim;
mod world;

#[cfg(test)]
mod testing;

pub use behaviour::{
    CollectOutcome, CollectibleConfig, CollectibleKind, CommitOutcome, DeltaOutcome,
    EquippableConfig, EquippableKind, ExperienceLedger, Hit, InteractResult, InteractableConfig,
    PlayerConfig, SlotKind, TransferError, TransferOutcome, UtilityConfig, VitalityConfig,
};
pub use sim::{EntityHandle, EntityId, Services, Vec3};
pub use world::World;
