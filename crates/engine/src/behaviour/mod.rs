mod collectible;
mod equipment;
mod interactable;
mod player;
mod targeting;
mod utility;
mod vitality;

pub use collectible::{
    CollectOutcome, Collectible, CollectibleConfig, CollectibleKind, Collector, ExperienceLedger,
};
pub use equipment::{
    BodyState, CarrierBinding, CasualtyReport, ColliderVolume, Equippable, EquippableConfig,
    EquippableKind, ItemEvent, ItemSignal, Loadout, LoadoutSettings, NoopReason, OwnershipMode,
    ParentNode, SignalInbox, SlotKind, TransferCtx, TransferError, TransferOutcome,
};
pub use interactable::{
    Interactable, InteractableConfig, InteractableEvent, InteractResult, InteractionRecord, Wallet,
};
pub use player::{PlayerConfig, PlayerController};
pub use targeting::{
    CandidateHost, CandidateState, CommitOutcome, ConsiderOutcome, DropOutcome, TargetArbiter,
    Viewpoint,
};
pub use utility::{UtilityConfig, UtilityLaunch, UtilityPouch};
pub use vitality::{
    DeltaOutcome, Hit, IgnoreReason, Vitality, VitalityConfig, VitalityCtx, VitalityEvent,
    VitalityPhase, VitalitySnapshot,
};
