//! Entities, components and the world that owns them
//!
//! Entities live in an [`EntityManager`] arena and are linked into the
//! spatial map by key. Components live in the [`ComponentManager`], which
//! also broadcasts dirty notifications to subscribed systems.

pub mod component;
pub mod component_manager;
pub mod components;
pub mod entity;
pub mod entity_manager;
pub mod facets;
pub mod world;

#[cfg(test)]
mod tests;

pub use component::{Component, ComponentData, ComponentEntry, ComponentId, DirtyFlags, FacetSlot};
pub use component_manager::{ComponentManager, DirtyComponentHandler, HandlerId};
pub use entity::{Category, Entity, EntityArena, EntityDirtyFlags, EntityFlags, EntityId, EntityKey, LayerFlags};
pub use entity_manager::{DirtyEntityHandler, EntityDescriptor, EntityHandlerId, EntityManager};
pub use facets::{ComponentFacet, FacetFlags, HierarchyFacet, TransformationFacet};
pub use world::World;
