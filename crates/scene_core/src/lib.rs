//! # Scene Core
//!
//! The data layer under a real-time renderer: a region map that buckets
//! entities spatially, entities with hierarchy and transformation facets, a
//! component registry that broadcasts dirty notifications to subscribed
//! systems, and camera frustum math.
//!
//! ## Features
//!
//! - **Region Map**: fixed-size grid cells with per-category entity folders
//! - **Map Queries**: category, AABB and radius filters over one region walk
//! - **Dirty Bus**: synchronous change notifications for renderer facets
//! - **Camera**: perspective and orthographic frusta, world AABB, exposure
//! - **Persistence**: binary scene codec for entities and components
//!
//! ## Quick Start
//!
//! ```rust
//! use scene_core::prelude::*;
//!
//! fn main() -> Result<(), CoreError> {
//!     let mut world = World::from_config(&SceneCoreConfig::default())?;
//!
//!     let rock = world.create_entity(
//!         EntityDescriptor::new(Category::Static).with_facets(FacetFlags::TRANSFORMATION),
//!     );
//!     if let Some(facet) = world.entities_mut().entity_mut(rock).and_then(|e| e.transformation_facet_mut()) {
//!         facet.set_position(Vec3::new(12.0, 40.0, 0.0));
//!     }
//!     world.mark_entity_as_dirty(rock, EntityDirtyFlags::ADD)?;
//!
//!     let found: Vec<_> = world.query(EntityFilter::category(Category::Static))?.collect();
//!     assert_eq!(found, vec![rock]);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod core;

pub mod foundation;
pub mod spatial;
pub mod ecs;
pub mod render;

/// Common imports for scene users
pub mod prelude {
    pub use crate::{
        core::{CameraConfig, Config, CoreError, CoreResult, ErrorKind, MapConfig, SceneCoreConfig},
        ecs::{
            Category, Component, ComponentEntry, ComponentId, ComponentManager, DirtyFlags, Entity,
            EntityDescriptor, EntityDirtyFlags, EntityKey, EntityManager, FacetFlags, FacetSlot,
            LayerFlags, World,
        },
        foundation::math::{Aabb2, Aabb3, Mat3, Mat4, Quat, Transform, Vec2, Vec3, Vec4},
        render::{Camera, View},
        spatial::{EntityCursor, EntityFilter, Map, Region},
    };
}
