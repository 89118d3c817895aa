//! Spatial partition
//!
//! The [`Map`] splits the world into a grid of fixed-size [`Region`]s. Each
//! region keeps one entity folder per category, and queries walk only the
//! regions a bounding box overlaps.
//!
//! # Example
//!
//! ```
//! use scene_core::ecs::entity::{Category, Entity, EntityArena};
//! use scene_core::foundation::math::Vec3;
//! use scene_core::spatial::{EntityFilter, Map};
//!
//! let mut arena = EntityArena::with_key();
//! let mut map = Map::new();
//! map.allocate_map(4, 4).unwrap();
//!
//! let mut tree = Entity::new(0, Category::Static);
//! tree.set_world_position(Vec3::new(40.0, 8.0, 0.0));
//! let key = arena.insert(tree);
//! map.add_entity(&mut arena, key).unwrap();
//!
//! let found: Vec<_> = map.entities(&arena, EntityFilter::category(Category::Static)).unwrap().collect();
//! assert_eq!(found, vec![key]);
//! assert_eq!(map.region_at(arena[key].world_position()).unwrap().id(), 1);
//! ```

pub mod region;
pub mod map;
pub mod walk;
pub mod cursor;

pub use region::{EntityFolder, FolderRef, Region, RegionId};
pub use map::Map;
pub use walk::{Circle, EntityFilter};
pub use cursor::{EntityCursor, MapEntities};
