//! Entity implementation
//!
//! An entity is a named, positioned node that the map buckets into one of
//! its region folders. Entities live in an [`EntityArena`] owned by the
//! entity manager; everything else refers to them through [`EntityKey`].

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};

use crate::ecs::facets::{ComponentFacet, HierarchyFacet, TransformationFacet};
use crate::foundation::codec::{CodecError, SceneReader, SceneWriter};
use crate::foundation::math::{Aabb3, Vec3};
use crate::spatial::region::FolderRef;

new_key_type! {
    /// Generation-checked handle to an entity in the arena
    pub struct EntityKey;
}

/// Slot storage for every live entity
pub type EntityArena = SlotMap<EntityKey, Entity>;

/// Persistent numeric entity identifier
pub type EntityId = u64;

/// Id of an entity that was never registered
pub const INVALID_ENTITY_ID: EntityId = u64::MAX;

/// Entity category, one map folder per category in every region
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    /// Entities that never move
    #[default]
    Static,
    /// Entities that may move every frame
    Dynamic,
}

impl Category {
    /// Number of categories, and of folders per region
    pub const COUNT: usize = 2;

    /// All categories in ascending folder order
    pub const ALL: [Self; Self::COUNT] = [Self::Static, Self::Dynamic];

    /// Folder index of this category
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Category for a folder index
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

bitflags! {
    /// What changed on an entity since the last update
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EntityDirtyFlags: u8 {
        /// Entity was just created
        const CREATE  = 0x01;
        /// Insert the entity into the map
        const ADD     = 0x02;
        /// Entity moved; re-bucket it
        const MOVE    = 0x04;
        /// Take the entity out of the map
        const REMOVE  = 0x08;
        /// Free the entity once removed
        const DESTROY = 0x10;
    }
}

bitflags! {
    /// Render and query layers an entity belongs to; empty is the default layer
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LayerFlags: u8 {
        /// Augmented reality overlay
        const AR             = 0x01;
        /// Transparent effects
        const TRANSPARENT_FX = 0x02;
        /// Skipped by ray casts
        const IGNORE_RAYCAST = 0x04;
        /// Water surfaces
        const WATER          = 0x08;
        /// User interface
        const UI             = 0x10;
    }
}

/// Packed entity state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityFlags {
    /// Pending dirty reasons
    pub dirty: EntityDirtyFlags,
    /// Folder category
    pub category: Category,
    /// Layer membership
    pub layer: LayerFlags,
    /// Entity may move
    pub dynamic: bool,
    /// Entity can be picked in editors
    pub selectable: bool,
    /// Entity takes part in rendering and queries
    pub active: bool,
}

const CATEGORY_SHIFT: u32 = 8;
const LAYER_SHIFT: u32 = 12;
const DYNAMIC_BIT: u32 = 1 << 20;
const SELECTABLE_BIT: u32 = 1 << 21;
const ACTIVE_BIT: u32 = 1 << 22;

impl EntityFlags {
    /// Default flags for a category
    pub fn new(category: Category) -> Self {
        Self {
            dirty: EntityDirtyFlags::empty(),
            category,
            layer: LayerFlags::empty(),
            dynamic: true,
            selectable: true,
            active: true,
        }
    }

    /// Pack into a single word: dirty in bits 0-7, category 8-11,
    /// layer 12-19, then dynamic, selectable and active.
    pub fn to_bits(&self) -> u32 {
        let mut bits = u32::from(self.dirty.bits())
            | ((self.category.index() as u32) << CATEGORY_SHIFT)
            | (u32::from(self.layer.bits()) << LAYER_SHIFT);
        if self.dynamic {
            bits |= DYNAMIC_BIT;
        }
        if self.selectable {
            bits |= SELECTABLE_BIT;
        }
        if self.active {
            bits |= ACTIVE_BIT;
        }
        bits
    }

    /// Unpack a word produced by [`EntityFlags::to_bits`]
    ///
    /// Unknown bits are dropped and an unknown category falls back to static.
    pub fn from_bits(bits: u32) -> Self {
        let category_index = ((bits >> CATEGORY_SHIFT) & 0x0f) as usize;
        Self {
            dirty: EntityDirtyFlags::from_bits_truncate((bits & 0xff) as u8),
            category: Category::from_index(category_index).unwrap_or_default(),
            layer: LayerFlags::from_bits_truncate(((bits >> LAYER_SHIFT) & 0xff) as u8),
            dynamic: bits & DYNAMIC_BIT != 0,
            selectable: bits & SELECTABLE_BIT != 0,
            active: bits & ACTIVE_BIT != 0,
        }
    }
}

impl Default for EntityFlags {
    fn default() -> Self {
        Self::new(Category::default())
    }
}

/// Position of a linked entity inside its folder list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FolderLink {
    /// Folder holding the entity
    pub folder: FolderRef,
    /// Entity in front of this one; `None` at the head
    pub previous: Option<EntityKey>,
    /// Entity behind this one; `None` at the tail
    pub next: Option<EntityKey>,
}

/// Map membership of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Linkage {
    /// Not in any folder
    #[default]
    Unlinked,
    /// In exactly one folder list
    Linked(FolderLink),
}

/// Entity node
#[derive(Debug, Clone)]
pub struct Entity {
    id: EntityId,
    name: String,
    world_position: Vec3,
    world_aabb: Aabb3,
    flags: EntityFlags,
    pub(crate) linkage: Linkage,
    hierarchy: Option<HierarchyFacet>,
    transformation: Option<TransformationFacet>,
    components: Option<ComponentFacet>,
}

impl Entity {
    /// Create an unlinked entity without facets
    pub fn new(id: EntityId, category: Category) -> Self {
        Self {
            id,
            name: String::new(),
            world_position: Vec3::zeros(),
            world_aabb: Aabb3::default(),
            flags: EntityFlags::new(category),
            linkage: Linkage::Unlinked,
            hierarchy: None,
            transformation: None,
            components: None,
        }
    }

    /// Get the entity ID
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Get the entity name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set the entity name
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// World-space position used to pick the region
    pub fn world_position(&self) -> &Vec3 {
        &self.world_position
    }

    /// Set the world position.
    ///
    /// Does not re-bucket the entity; mark it `MOVE` or call
    /// [`crate::spatial::Map::move_entity`] afterwards.
    pub fn set_world_position(&mut self, position: Vec3) {
        self.world_position = position;
    }

    /// World-space bounds
    pub fn world_aabb(&self) -> &Aabb3 {
        &self.world_aabb
    }

    /// Set the world-space bounds
    pub fn set_world_aabb(&mut self, aabb: Aabb3) {
        self.world_aabb = aabb;
    }

    /// All packed flags
    pub fn flags(&self) -> &EntityFlags {
        &self.flags
    }

    /// Folder category
    pub fn category(&self) -> Category {
        self.flags.category
    }

    /// Change the category; only allowed while the entity is outside the map
    pub fn set_category(&mut self, category: Category) -> bool {
        if self.is_in_map() {
            return false;
        }
        self.flags.category = category;
        true
    }

    /// Layer membership
    pub fn layer(&self) -> LayerFlags {
        self.flags.layer
    }

    /// Set layer membership
    pub fn set_layer(&mut self, layer: LayerFlags) {
        self.flags.layer = layer;
    }

    /// Whether the entity may move
    pub fn is_dynamic(&self) -> bool {
        self.flags.dynamic
    }

    /// Set whether the entity may move
    pub fn set_dynamic(&mut self, dynamic: bool) {
        self.flags.dynamic = dynamic;
    }

    /// Whether the entity can be picked
    pub fn is_selectable(&self) -> bool {
        self.flags.selectable
    }

    /// Set whether the entity can be picked
    pub fn set_selectable(&mut self, selectable: bool) {
        self.flags.selectable = selectable;
    }

    /// Whether the entity takes part in rendering
    pub fn is_active(&self) -> bool {
        self.flags.active
    }

    /// Set whether the entity takes part in rendering
    pub fn set_active(&mut self, active: bool) {
        self.flags.active = active;
    }

    /// Pending dirty reasons
    pub fn dirty_flags(&self) -> EntityDirtyFlags {
        self.flags.dirty
    }

    pub(crate) fn set_dirty_flags(&mut self, flags: EntityDirtyFlags) {
        self.flags.dirty = flags;
    }

    /// Map membership
    pub fn linkage(&self) -> &Linkage {
        &self.linkage
    }

    /// Folder holding the entity, `None` when not in the map
    pub fn folder(&self) -> Option<FolderRef> {
        match self.linkage {
            Linkage::Linked(link) => Some(link.folder),
            Linkage::Unlinked => None,
        }
    }

    /// Whether the entity is in a map folder
    pub fn is_in_map(&self) -> bool {
        matches!(self.linkage, Linkage::Linked(_))
    }

    /// Previous entity in the folder list
    pub fn previous(&self) -> Option<EntityKey> {
        match self.linkage {
            Linkage::Linked(link) => link.previous,
            Linkage::Unlinked => None,
        }
    }

    /// Next entity in the folder list
    pub fn next(&self) -> Option<EntityKey> {
        match self.linkage {
            Linkage::Linked(link) => link.next,
            Linkage::Unlinked => None,
        }
    }

    /// Hierarchy facet, if created
    pub fn hierarchy_facet(&self) -> Option<&HierarchyFacet> {
        self.hierarchy.as_ref()
    }

    /// Mutable hierarchy facet
    pub fn hierarchy_facet_mut(&mut self) -> Option<&mut HierarchyFacet> {
        self.hierarchy.as_mut()
    }

    /// Transformation facet, if created
    pub fn transformation_facet(&self) -> Option<&TransformationFacet> {
        self.transformation.as_ref()
    }

    /// Mutable transformation facet
    pub fn transformation_facet_mut(&mut self) -> Option<&mut TransformationFacet> {
        self.transformation.as_mut()
    }

    /// Component facet, if created
    pub fn component_facet(&self) -> Option<&ComponentFacet> {
        self.components.as_ref()
    }

    /// Mutable component facet
    pub fn component_facet_mut(&mut self) -> Option<&mut ComponentFacet> {
        self.components.as_mut()
    }

    pub(crate) fn set_hierarchy_facet(&mut self, facet: Option<HierarchyFacet>) {
        self.hierarchy = facet;
    }

    pub(crate) fn set_transformation_facet(&mut self, facet: Option<TransformationFacet>) {
        self.transformation = facet;
    }

    pub(crate) fn set_component_facet(&mut self, facet: Option<ComponentFacet>) {
        self.components = facet;
    }

    /// Write name, id, world AABB, world position and packed flags
    pub fn write(&self, writer: &mut SceneWriter<'_>) -> Result<(), CodecError> {
        writer.write_str(&self.name)?;
        writer.write_u64(self.id)?;
        writer.write_aabb3(&self.world_aabb)?;
        writer.write_vec3(&self.world_position)?;
        writer.write_u32(self.flags.to_bits())
    }

    /// Read an entity written by [`Entity::write`]; facets are read separately
    pub fn read(reader: &mut SceneReader<'_>) -> Result<Self, CodecError> {
        let name = reader.read_string()?;
        let id = reader.read_u64()?;
        let world_aabb = reader.read_aabb3()?;
        let world_position = reader.read_vec3()?;
        let flags = EntityFlags::from_bits(reader.read_u32()?);

        Ok(Self {
            id,
            name,
            world_position,
            world_aabb,
            flags,
            linkage: Linkage::Unlinked,
            hierarchy: None,
            transformation: None,
            components: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entity_defaults() {
        let entity = Entity::new(3, Category::Dynamic);
        assert_eq!(entity.id(), 3);
        assert!(entity.is_dynamic() && entity.is_selectable() && entity.is_active());
        assert_eq!(entity.layer(), LayerFlags::empty());
        assert!(entity.folder().is_none());
        assert!(entity.previous().is_none() && entity.next().is_none());
    }

    #[test]
    fn test_flag_packing() {
        let flags = EntityFlags {
            dirty: EntityDirtyFlags::ADD | EntityDirtyFlags::MOVE,
            category: Category::Dynamic,
            layer: LayerFlags::WATER | LayerFlags::UI,
            dynamic: false,
            selectable: true,
            active: false,
        };
        let bits = flags.to_bits();
        assert_eq!(bits & 0xff, 0x06);
        assert_eq!((bits >> 8) & 0x0f, 1);
        assert_eq!(EntityFlags::from_bits(bits), flags);
    }

    #[test]
    fn test_category_indexing() {
        assert_eq!(Category::from_index(1), Some(Category::Dynamic));
        assert_eq!(Category::from_index(Category::COUNT), None);
        assert_eq!(Category::ALL.map(Category::index), [0, 1]);
    }

    #[test]
    fn test_write_then_read_keeps_fields() {
        let mut entity = Entity::new(42, Category::Static);
        entity.set_name("crate");
        entity.set_world_position(Vec3::new(1.0, 2.0, 3.0));
        entity.set_world_aabb(Aabb3::new(Vec3::zeros(), Vec3::new(2.0, 4.0, 6.0)));
        entity.set_layer(LayerFlags::IGNORE_RAYCAST);

        let mut bytes = Vec::new();
        entity.write(&mut SceneWriter::new(&mut bytes)).unwrap();
        let mut source = bytes.as_slice();
        let read = Entity::read(&mut SceneReader::new(&mut source)).unwrap();

        assert_eq!(read.name(), "crate");
        assert_eq!(read.id(), 42);
        assert_eq!(read.world_position(), entity.world_position());
        assert_eq!(read.world_aabb(), entity.world_aabb());
        assert_eq!(read.flags(), entity.flags());
        assert!(!read.is_in_map());
    }
}
