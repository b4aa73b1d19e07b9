mod entity;
mod math;
mod observer;
mod schedule;
mod services;

pub use entity::{EntityHandle, EntityId, EntityIdAllocator, EntityRegistry, TeamId};
pub use math::Vec3;
pub use observer::{ObserverRegistry, SubscriptionId};
pub use schedule::{ScheduledTask, TaskKey, TaskScheduler};
pub use services::{
    ColorClass, EffectSink, PooledKind, PooledObject, PooledSpawner, Services, Silent,
    SoundChannel, SoundClip, UiAttribute, UiChannel, UiPayload,
};
