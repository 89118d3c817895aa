//! Entity manager
//!
//! Owns every entity, issues ids, maintains the parent/child hierarchy and
//! runs the dirty-entity update: world matrices are rebuilt, the map is
//! told about additions, moves and removals, and subscribers are notified.

use std::collections::{HashMap, HashSet};

use log::{debug, trace};

use crate::core::error::{CoreError, CoreResult};
use crate::ecs::component::ComponentId;
use crate::ecs::entity::{
    Category, Entity, EntityArena, EntityDirtyFlags, EntityId, EntityKey, INVALID_ENTITY_ID,
};
use crate::ecs::facets::{
    ComponentFacet, FacetFlags, HierarchyFacet, PendingHierarchy, TransformationFacet,
};
use crate::foundation::codec::{CodecError, SceneReader, SceneWriter};
use crate::foundation::math::{Mat4, Transform, Vec3};
use crate::spatial::map::Map;

/// What to create
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntityDescriptor {
    /// Folder category
    pub category: Category,
    /// Facets to create with the entity
    pub facets: FacetFlags,
}

impl EntityDescriptor {
    /// Descriptor for a category without facets
    pub fn new(category: Category) -> Self {
        Self {
            category,
            facets: FacetFlags::empty(),
        }
    }

    /// Add facets
    pub fn with_facets(mut self, facets: FacetFlags) -> Self {
        self.facets |= facets;
        self
    }
}

/// Callback invoked after an entity was updated for its dirty flags
pub type DirtyEntityHandler = Box<dyn FnMut(EntityKey, &Entity)>;

/// Opaque handle of a registered dirty-entity handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityHandlerId(u64);

/// Owner of every entity
#[derive(Default)]
pub struct EntityManager {
    arena: EntityArena,
    by_id: HashMap<EntityId, EntityKey>,
    next_id: EntityId,
    handlers: Vec<(EntityHandlerId, DirtyEntityHandler)>,
    next_handler_id: u64,
}

impl std::fmt::Debug for EntityManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityManager")
            .field("entities", &self.arena.len())
            .field("next_id", &self.next_id)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

fn build_entity(id: EntityId, descriptor: EntityDescriptor) -> Entity {
    let mut entity = Entity::new(id, descriptor.category);
    if descriptor.facets.contains(FacetFlags::HIERARCHY) {
        entity.set_hierarchy_facet(Some(HierarchyFacet::default()));
    }
    if descriptor.facets.contains(FacetFlags::TRANSFORMATION) {
        entity.set_transformation_facet(Some(TransformationFacet::default()));
    }
    if descriptor.facets.contains(FacetFlags::COMPONENTS) {
        entity.set_component_facet(Some(ComponentFacet::default()));
    }
    entity
}

impl EntityManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an entity with the next free id
    pub fn create_entity(&mut self, descriptor: EntityDescriptor) -> EntityKey {
        let id = self.next_id;
        self.next_id += 1;
        self.insert(build_entity(id, descriptor))
    }

    /// Create an entity with a chosen id; later ids continue past it
    pub fn create_entity_with_id(&mut self, descriptor: EntityDescriptor, id: EntityId) -> CoreResult<EntityKey> {
        if id == INVALID_ENTITY_ID || self.by_id.contains_key(&id) {
            return Err(CoreError::invariant(format!("entity id {id} is invalid or in use")));
        }
        self.next_id = self.next_id.max(id + 1);
        Ok(self.insert(build_entity(id, descriptor)))
    }

    fn insert(&mut self, entity: Entity) -> EntityKey {
        let id = entity.id();
        let key = self.arena.insert(entity);
        self.by_id.insert(id, key);
        trace!("Created entity {}", id);
        key
    }

    /// Destroy an entity. It must not be in the map.
    ///
    /// The entity leaves its parent's child list and its children become
    /// roots.
    pub fn free_entity(&mut self, key: EntityKey) -> CoreResult<()> {
        let entity = self.arena.get(key).ok_or(CoreError::UnknownEntity)?;
        if entity.is_in_map() {
            return Err(CoreError::invariant(format!(
                "entity {} must be removed from the map before it is freed",
                entity.id()
            )));
        }

        if self.parent(key).is_some() {
            self.unlink_from_parent(key);
        }
        for child in self.children(key) {
            if let Some(hierarchy) = self.arena.get_mut(child).and_then(Entity::hierarchy_facet_mut) {
                hierarchy.set_parent(None);
                hierarchy.set_sibling(None);
            }
        }

        if let Some(entity) = self.arena.remove(key) {
            self.by_id.remove(&entity.id());
            debug!("Freed entity {}", entity.id());
        }
        Ok(())
    }

    /// Entity by key
    pub fn entity(&self, key: EntityKey) -> Option<&Entity> {
        self.arena.get(key)
    }

    /// Mutable entity by key
    pub fn entity_mut(&mut self, key: EntityKey) -> Option<&mut Entity> {
        self.arena.get_mut(key)
    }

    /// Key of the entity with `id`
    pub fn entity_by_id(&self, id: EntityId) -> Option<EntityKey> {
        self.by_id.get(&id).copied()
    }

    /// Number of live entities
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// Whether no entity is alive
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Every live entity, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = (EntityKey, &Entity)> + '_ {
        self.arena.iter()
    }

    /// Entity storage, for map queries
    pub fn arena(&self) -> &EntityArena {
        &self.arena
    }

    pub(crate) fn arena_mut(&mut self) -> &mut EntityArena {
        &mut self.arena
    }

    /// Parent of an entity
    pub fn parent(&self, key: EntityKey) -> Option<EntityKey> {
        self.arena.get(key)?.hierarchy_facet()?.parent()
    }

    /// Children of an entity, most recently attached first
    pub fn children(&self, key: EntityKey) -> Vec<EntityKey> {
        let mut children = Vec::new();
        let mut current = self
            .arena
            .get(key)
            .and_then(Entity::hierarchy_facet)
            .and_then(HierarchyFacet::first_child);

        while let Some(child) = current {
            children.push(child);
            current = self
                .arena
                .get(child)
                .and_then(Entity::hierarchy_facet)
                .and_then(HierarchyFacet::sibling);
        }
        children
    }

    fn world_matrix(&self, key: EntityKey) -> Option<Mat4> {
        self.arena
            .get(key)?
            .transformation_facet()
            .map(|facet| *facet.world_matrix())
    }

    /// Make `child` the first child of `parent`.
    ///
    /// The child's transformation is rebased so its world placement is
    /// unchanged.
    pub fn attach(&mut self, parent: EntityKey, child: EntityKey) -> CoreResult<()> {
        if parent == child {
            return Err(CoreError::invariant("an entity cannot be its own parent"));
        }
        let (Some(parent_entity), Some(child_entity)) = (self.arena.get(parent), self.arena.get(child)) else {
            return Err(CoreError::UnknownEntity);
        };
        let (Some(parent_hierarchy), Some(child_hierarchy)) =
            (parent_entity.hierarchy_facet(), child_entity.hierarchy_facet())
        else {
            return Err(CoreError::invariant("both entities need a hierarchy facet"));
        };
        if child_hierarchy.parent().is_some() {
            return Err(CoreError::invariant(format!("entity {} already has a parent", child_entity.id())));
        }
        let previous_first = parent_hierarchy.first_child();

        let mut ancestor = Some(parent);
        while let Some(current) = ancestor {
            if current == child {
                return Err(CoreError::invariant("attaching would create a hierarchy cycle"));
            }
            ancestor = self.parent(current);
        }

        if let (Some(parent_world), Some(child_world)) = (self.world_matrix(parent), self.world_matrix(child)) {
            let local = parent_world.try_inverse().unwrap_or_else(Mat4::identity) * child_world;
            if let Some(facet) = self.arena[child].transformation_facet_mut() {
                facet.set_transform(&Transform::from_matrix(&local));
            }
        }

        if let Some(hierarchy) = self.arena[child].hierarchy_facet_mut() {
            hierarchy.set_parent(Some(parent));
            hierarchy.set_sibling(previous_first);
        }
        if let Some(hierarchy) = self.arena[parent].hierarchy_facet_mut() {
            hierarchy.set_first_child(Some(child));
        }
        debug!("Attached entity {} to {}", self.arena[child].id(), self.arena[parent].id());
        Ok(())
    }

    /// Detach `child` from its parent; its transformation becomes its
    /// world placement.
    pub fn detach(&mut self, child: EntityKey) -> CoreResult<()> {
        let entity = self.arena.get(child).ok_or(CoreError::UnknownEntity)?;
        if entity.hierarchy_facet().and_then(HierarchyFacet::parent).is_none() {
            return Err(CoreError::invariant(format!("entity {} has no parent", entity.id())));
        }

        self.unlink_from_parent(child);

        if let Some(world) = self.world_matrix(child) {
            if let Some(facet) = self.arena[child].transformation_facet_mut() {
                facet.set_transform(&Transform::from_matrix(&world));
            }
        }
        debug!("Detached entity {}", self.arena[child].id());
        Ok(())
    }

    fn unlink_from_parent(&mut self, child: EntityKey) {
        let Some(parent) = self.parent(child) else {
            return;
        };
        let sibling = self
            .arena
            .get(child)
            .and_then(Entity::hierarchy_facet)
            .and_then(HierarchyFacet::sibling);

        let first_child = self
            .arena
            .get(parent)
            .and_then(Entity::hierarchy_facet)
            .and_then(HierarchyFacet::first_child);

        if first_child == Some(child) {
            if let Some(hierarchy) = self.arena.get_mut(parent).and_then(Entity::hierarchy_facet_mut) {
                hierarchy.set_first_child(sibling);
            }
        } else {
            let previous = self.children(parent).into_iter().find(|candidate| {
                self.arena[*candidate]
                    .hierarchy_facet()
                    .and_then(HierarchyFacet::sibling)
                    == Some(child)
            });
            if let Some(hierarchy) = previous.and_then(|previous| self.arena[previous].hierarchy_facet_mut()) {
                hierarchy.set_sibling(sibling);
            }
        }

        if let Some(hierarchy) = self.arena.get_mut(child).and_then(Entity::hierarchy_facet_mut) {
            hierarchy.set_parent(None);
            hierarchy.set_sibling(None);
        }
    }

    /// Subscribe to dirty-entity notifications
    pub fn register_dirty_entity_handler<F>(&mut self, handler: F) -> EntityHandlerId
    where
        F: FnMut(EntityKey, &Entity) + 'static,
    {
        let id = EntityHandlerId(self.next_handler_id);
        self.next_handler_id += 1;
        self.handlers.push((id, Box::new(handler)));
        id
    }

    /// Unsubscribe a handler; returns false for an unknown handle
    pub fn unregister_dirty_entity_handler(&mut self, handle: EntityHandlerId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(id, _)| *id != handle);
        self.handlers.len() != before
    }

    /// Apply `flags` to an entity and its descendants.
    ///
    /// For each entity, parents first: the world matrix is rebuilt, `ADD`
    /// links it into the map, `REMOVE` unlinks it, anything else re-buckets
    /// it if it is in the map. Handlers then see the entity with `flags`
    /// still set. Afterwards `DESTROY` frees the entity (removing it from
    /// the map if needed) and the flags of survivors are cleared.
    pub fn mark_entity_as_dirty(
        &mut self,
        map: &mut Map,
        key: EntityKey,
        flags: EntityDirtyFlags,
        frame: u64,
    ) -> CoreResult<()> {
        let entity = self.arena.get_mut(key).ok_or(CoreError::UnknownEntity)?;
        entity.set_dirty_flags(flags);
        trace!("Entity {} dirty {:?}", entity.id(), flags);

        self.update_world_matrix(key, frame, true);

        let removing = flags.intersects(EntityDirtyFlags::REMOVE | EntityDirtyFlags::DESTROY);
        if flags.contains(EntityDirtyFlags::ADD) && !removing && !self.arena[key].is_in_map() {
            map.add_entity(&mut self.arena, key)?;
        }

        for child in self.children(key) {
            self.mark_entity_as_dirty(map, child, flags, frame)?;
        }

        if self.arena[key].is_in_map() {
            if removing {
                map.remove_entity(&mut self.arena, key)?;
            } else {
                map.move_entity(&mut self.arena, key)?;
            }
        }

        let entity = &self.arena[key];
        for (_, handler) in &mut self.handlers {
            handler(key, entity);
        }

        if flags.contains(EntityDirtyFlags::DESTROY) {
            self.free_entity(key)?;
        } else {
            self.arena[key].set_dirty_flags(EntityDirtyFlags::empty());
        }
        Ok(())
    }

    /// Rebuild the world matrix of an entity, parents first.
    ///
    /// Ancestors already updated this frame are reused; the entity itself
    /// is rebuilt when `force` is set.
    fn update_world_matrix(&mut self, key: EntityKey, frame: u64, force: bool) {
        let Some(entity) = self.arena.get(key) else {
            return;
        };
        let (parent, up_to_date) = entity
            .hierarchy_facet()
            .map_or((None, false), |hierarchy| (hierarchy.parent(), hierarchy.timestamp() == Some(frame)));
        if up_to_date && !force {
            return;
        }

        if let Some(parent) = parent {
            self.update_world_matrix(parent, frame, false);
        }
        let parent_world = parent.and_then(|parent| self.world_matrix(parent));

        let entity = &mut self.arena[key];
        if let Some(facet) = entity.transformation_facet_mut() {
            let local = facet.local_matrix();
            let world = parent_world.map_or(local, |parent_world| parent_world * local);
            facet.set_world_matrix(world);
            entity.set_world_position(Vec3::new(world.m14, world.m24, world.m34));
        }
        if let Some(hierarchy) = entity.hierarchy_facet_mut() {
            hierarchy.set_timestamp(frame);
        }
    }

    /// Write every entity, then the facets of each in the same order
    pub fn write(&self, writer: &mut SceneWriter<'_>) -> Result<(), CodecError> {
        let mut entities: Vec<&Entity> = self.arena.values().collect();
        entities.sort_by_key(|entity| entity.id());

        writer.write_u32(entities.len() as u32)?;
        for entity in &entities {
            entity.write(writer)?;
        }

        for entity in &entities {
            writer.write_bool(entity.transformation_facet().is_some())?;
            if let Some(facet) = entity.transformation_facet() {
                facet.write(writer)?;
            }
            writer.write_bool(entity.hierarchy_facet().is_some())?;
            if let Some(facet) = entity.hierarchy_facet() {
                facet.write(writer, &self.arena)?;
            }
            writer.write_bool(entity.component_facet().is_some())?;
            if let Some(facet) = entity.component_facet() {
                facet.write(writer)?;
            }
        }
        Ok(())
    }

    /// Read entities written by [`EntityManager::write`].
    ///
    /// Read entities are outside the map; mark them `ADD` to link them.
    /// Hierarchy links may only name entities of the same scene and must
    /// form proper trees. Nothing is added unless the whole scene decodes.
    pub fn read(&mut self, reader: &mut SceneReader<'_>) -> CoreResult<Vec<EntityKey>> {
        let decoded = self.decode(reader)?;
        Ok(self.commit(decoded))
    }

    pub(crate) fn decode(&self, reader: &mut SceneReader<'_>) -> CoreResult<DecodedEntities> {
        let count = reader.read_u32()?;
        let mut entities = Vec::new();
        let mut seen = HashSet::new();

        for _ in 0..count {
            let mut entity = Entity::read(reader)?;
            let id = entity.id();
            if id == INVALID_ENTITY_ID || self.by_id.contains_key(&id) || !seen.insert(id) {
                return Err(CoreError::invariant(format!("entity id {id} read twice or invalid")));
            }
            entity.set_dirty_flags(EntityDirtyFlags::empty());
            entities.push(entity);
        }

        let mut links = Vec::with_capacity(entities.len());
        for entity in &mut entities {
            let transformation = if reader.read_bool()? {
                Some(TransformationFacet::read(reader)?)
            } else {
                None
            };
            let hierarchy = if reader.read_bool()? {
                Some(HierarchyFacet::read(reader)?)
            } else {
                None
            };
            let components = if reader.read_bool()? {
                Some(ComponentFacet::read(reader)?)
            } else {
                None
            };

            entity.set_transformation_facet(transformation);
            entity.set_component_facet(components);
            if hierarchy.is_some() {
                entity.set_hierarchy_facet(Some(HierarchyFacet::default()));
            }
            links.push(hierarchy);
        }

        check_hierarchy(&entities, &links)?;
        Ok(DecodedEntities { entities, links })
    }

    pub(crate) fn commit(&mut self, decoded: DecodedEntities) -> Vec<EntityKey> {
        let keys: Vec<EntityKey> = decoded
            .entities
            .into_iter()
            .map(|entity| {
                self.next_id = self.next_id.max(entity.id() + 1);
                self.insert(entity)
            })
            .collect();

        for (key, links) in keys.iter().zip(decoded.links) {
            let Some(links) = links else { continue };
            let resolve = |id: Option<EntityId>| id.and_then(|id| self.by_id.get(&id).copied());
            let (parent, first_child, sibling) =
                (resolve(links.parent), resolve(links.first_child), resolve(links.sibling));
            if let Some(hierarchy) = self.arena[*key].hierarchy_facet_mut() {
                hierarchy.set_parent(parent);
                hierarchy.set_first_child(first_child);
                hierarchy.set_sibling(sibling);
            }
        }

        debug!("Read {} entities", keys.len());
        keys
    }
}

/// Entities read from a scene but not yet owned by a manager
pub(crate) struct DecodedEntities {
    entities: Vec<Entity>,
    links: Vec<Option<PendingHierarchy>>,
}

impl DecodedEntities {
    /// Components named by the decoded component facets
    pub(crate) fn component_ids(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.entities
            .iter()
            .filter_map(Entity::component_facet)
            .flat_map(|facet| facet.component_ids().iter().copied())
    }
}

/// Every link names a decoded entity with a hierarchy, no entity links to
/// itself, each child list is finite and holds exactly the entities naming
/// that parent, and parent chains end.
fn check_hierarchy(entities: &[Entity], links: &[Option<PendingHierarchy>]) -> CoreResult<()> {
    let index: HashMap<EntityId, usize> =
        entities.iter().enumerate().map(|(slot, entity)| (entity.id(), slot)).collect();
    let lookup = |id: EntityId| -> CoreResult<PendingHierarchy> {
        let slot = index.get(&id).ok_or(CodecError::UnresolvedEntity(id))?;
        links[*slot].ok_or_else(|| CoreError::invariant(format!("entity {id} is linked but has no hierarchy")))
    };

    let mut parented = 0;
    let mut listed = 0;
    for (entity, own) in entities.iter().zip(links) {
        let Some(own) = own else { continue };
        let id = entity.id();

        for target in [own.parent, own.first_child, own.sibling].into_iter().flatten() {
            if target == id {
                return Err(CoreError::invariant(format!("entity {id} links to itself")));
            }
            lookup(target)?;
        }
        if own.parent.is_some() {
            parented += 1;
        } else if own.sibling.is_some() {
            return Err(CoreError::invariant(format!("entity {id} has a sibling but no parent")));
        }

        let mut children = HashSet::new();
        let mut current = own.first_child;
        while let Some(child) = current {
            if !children.insert(child) {
                return Err(CoreError::invariant(format!("children of entity {id} loop")));
            }
            let child_links = lookup(child)?;
            if child_links.parent != Some(id) {
                return Err(CoreError::invariant(format!(
                    "entity {child} is listed under {id} but names another parent"
                )));
            }
            current = child_links.sibling;
        }
        listed += children.len();

        let mut ancestor = own.parent;
        let mut depth = 0;
        while let Some(up) = ancestor {
            depth += 1;
            if up == id || depth > entities.len() {
                return Err(CoreError::invariant(format!("ancestors of entity {id} form a cycle")));
            }
            ancestor = lookup(up)?.parent;
        }
    }

    if listed != parented {
        return Err(CoreError::invariant("a child is missing from its parent's child list"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Quat;
    use approx::assert_relative_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn node() -> EntityDescriptor {
        EntityDescriptor::new(Category::Dynamic)
            .with_facets(FacetFlags::HIERARCHY | FacetFlags::TRANSFORMATION)
    }

    fn place(manager: &mut EntityManager, key: EntityKey, position: Vec3) {
        manager
            .entity_mut(key)
            .and_then(Entity::transformation_facet_mut)
            .unwrap()
            .set_position(position);
    }

    fn map_2x2() -> Map {
        let mut map = Map::new();
        map.allocate_map(2, 2).unwrap();
        map
    }

    #[test]
    fn test_ids_are_monotonic() {
        let mut manager = EntityManager::new();
        let a = manager.create_entity(EntityDescriptor::default());
        let b = manager.create_entity_with_id(EntityDescriptor::default(), 10).unwrap();
        let c = manager.create_entity(EntityDescriptor::default());

        assert_eq!(manager.entity(a).unwrap().id(), 0);
        assert_eq!(manager.entity(b).unwrap().id(), 10);
        assert_eq!(manager.entity(c).unwrap().id(), 11);
        assert_eq!(manager.entity_by_id(10), Some(b));
        assert!(manager.create_entity_with_id(EntityDescriptor::default(), 10).is_err());
        assert!(manager.create_entity_with_id(EntityDescriptor::default(), INVALID_ENTITY_ID).is_err());
    }

    #[test]
    fn test_descriptor_creates_facets() {
        let mut manager = EntityManager::new();
        let key = manager.create_entity(EntityDescriptor::new(Category::Static).with_facets(FacetFlags::COMPONENTS));
        let entity = manager.entity(key).unwrap();
        assert!(entity.component_facet().is_some());
        assert!(entity.hierarchy_facet().is_none());
        assert!(entity.transformation_facet().is_none());
        assert_eq!(entity.category(), Category::Static);
    }

    #[test]
    fn test_free_entity_requires_map_removal() {
        let mut manager = EntityManager::new();
        let mut map = map_2x2();
        let key = manager.create_entity(node());
        manager.mark_entity_as_dirty(&mut map, key, EntityDirtyFlags::ADD, 1).unwrap();

        assert!(manager.free_entity(key).is_err());
        map.remove_entity(manager.arena_mut(), key).unwrap();
        manager.free_entity(key).unwrap();
        assert!(manager.entity(key).is_none());
        assert!(manager.entity_by_id(0).is_none());
        assert!(matches!(manager.free_entity(key), Err(CoreError::UnknownEntity)));
    }

    #[test]
    fn test_add_move_remove_through_dirty_flags() {
        let mut manager = EntityManager::new();
        let mut map = map_2x2();
        let key = manager.create_entity(node());
        place(&mut manager, key, Vec3::new(40.0, 5.0, 0.0));

        manager.mark_entity_as_dirty(&mut map, key, EntityDirtyFlags::ADD, 1).unwrap();
        let entity = manager.entity(key).unwrap();
        assert_eq!(entity.folder().map(|folder| folder.region), Some(1));
        assert_eq!(entity.dirty_flags(), EntityDirtyFlags::empty());
        assert_eq!(map.number_of_entities(), 1);

        place(&mut manager, key, Vec3::new(40.0, 40.0, 0.0));
        manager.mark_entity_as_dirty(&mut map, key, EntityDirtyFlags::MOVE, 2).unwrap();
        assert_eq!(manager.entity(key).unwrap().folder().map(|folder| folder.region), Some(3));
        assert_eq!(manager.entity(key).unwrap().world_position(), &Vec3::new(40.0, 40.0, 0.0));

        manager.mark_entity_as_dirty(&mut map, key, EntityDirtyFlags::REMOVE, 3).unwrap();
        assert!(!manager.entity(key).unwrap().is_in_map());
        assert_eq!(map.number_of_entities(), 0);
    }

    #[test]
    fn test_destroy_frees_after_handlers() {
        let mut manager = EntityManager::new();
        let mut map = map_2x2();
        let key = manager.create_entity(node());
        manager.mark_entity_as_dirty(&mut map, key, EntityDirtyFlags::ADD, 1).unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        manager.register_dirty_entity_handler(move |_, entity| {
            log.borrow_mut().push((entity.id(), entity.dirty_flags(), entity.is_in_map()));
        });

        manager.mark_entity_as_dirty(&mut map, key, EntityDirtyFlags::DESTROY, 2).unwrap();
        assert_eq!(*seen.borrow(), vec![(0, EntityDirtyFlags::DESTROY, false)]);
        assert!(manager.is_empty());
        assert_eq!(map.number_of_entities(), 0);
    }

    #[test]
    fn test_children_follow_parent() {
        let mut manager = EntityManager::new();
        let mut map = map_2x2();
        let parent = manager.create_entity(node());
        let child = manager.create_entity(node());

        place(&mut manager, parent, Vec3::new(10.0, 10.0, 0.0));
        manager.mark_entity_as_dirty(&mut map, parent, EntityDirtyFlags::empty(), 1).unwrap();
        place(&mut manager, child, Vec3::new(12.0, 10.0, 0.0));
        manager.mark_entity_as_dirty(&mut map, child, EntityDirtyFlags::empty(), 1).unwrap();

        manager.attach(parent, child).unwrap();
        let local = *manager.entity(child).unwrap().transformation_facet().unwrap().position();
        assert_relative_eq!(local, Vec3::new(2.0, 0.0, 0.0), epsilon = 1e-5);

        manager.mark_entity_as_dirty(&mut map, parent, EntityDirtyFlags::ADD, 2).unwrap();
        assert!(manager.entity(child).unwrap().is_in_map());
        assert_eq!(map.number_of_entities(), 2);

        place(&mut manager, parent, Vec3::new(50.0, 10.0, 0.0));
        manager.mark_entity_as_dirty(&mut map, parent, EntityDirtyFlags::MOVE, 3).unwrap();
        place(&mut manager, parent, Vec3::new(50.0, 50.0, 0.0));
        manager.mark_entity_as_dirty(&mut map, parent, EntityDirtyFlags::MOVE, 3).unwrap();

        let child_entity = manager.entity(child).unwrap();
        assert_relative_eq!(*child_entity.world_position(), Vec3::new(52.0, 50.0, 0.0), epsilon = 1e-5);
        assert_eq!(child_entity.folder().map(|folder| folder.region), Some(3));
    }

    #[test]
    fn test_rotated_parent_carries_child() {
        let mut manager = EntityManager::new();
        let mut map = map_2x2();
        let parent = manager.create_entity(node());
        let child = manager.create_entity(node());
        manager.attach(parent, child).unwrap();

        place(&mut manager, child, Vec3::new(1.0, 0.0, 0.0));
        place(&mut manager, parent, Vec3::new(10.0, 10.0, 0.0));
        manager
            .entity_mut(parent)
            .and_then(Entity::transformation_facet_mut)
            .unwrap()
            .set_rotation(Quat::from_axis_angle(&Vec3::z_axis(), std::f32::consts::FRAC_PI_2));

        manager.mark_entity_as_dirty(&mut map, parent, EntityDirtyFlags::empty(), 1).unwrap();
        assert_relative_eq!(
            *manager.entity(child).unwrap().world_position(),
            Vec3::new(10.0, 11.0, 0.0),
            epsilon = 1e-5
        );
    }

    #[test]
    fn test_attach_and_detach_links() {
        let mut manager = EntityManager::new();
        let parent = manager.create_entity(node());
        let a = manager.create_entity(node());
        let b = manager.create_entity(node());
        let c = manager.create_entity(node());
        for child in [a, b, c] {
            manager.attach(parent, child).unwrap();
        }
        assert_eq!(manager.children(parent), vec![c, b, a]);
        assert!(manager.attach(parent, a).is_err());
        assert!(manager.attach(a, parent).is_err());
        assert!(manager.attach(a, a).is_err());

        manager.detach(b).unwrap();
        assert_eq!(manager.children(parent), vec![c, a]);
        manager.detach(c).unwrap();
        assert_eq!(manager.children(parent), vec![a]);
        assert!(manager.detach(c).is_err());
        assert_eq!(manager.parent(a), Some(parent));

        manager.free_entity(parent).unwrap();
        assert_eq!(manager.parent(a), None);
    }

    #[test]
    fn test_detach_keeps_world_placement() {
        let mut manager = EntityManager::new();
        let mut map = map_2x2();
        let parent = manager.create_entity(node());
        let child = manager.create_entity(node());
        manager.attach(parent, child).unwrap();
        place(&mut manager, parent, Vec3::new(5.0, 5.0, 0.0));
        place(&mut manager, child, Vec3::new(1.0, 2.0, 0.0));
        manager.mark_entity_as_dirty(&mut map, parent, EntityDirtyFlags::empty(), 1).unwrap();

        manager.detach(child).unwrap();
        let position = *manager.entity(child).unwrap().transformation_facet().unwrap().position();
        assert_relative_eq!(position, Vec3::new(6.0, 7.0, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn test_handlers_can_unregister() {
        let mut manager = EntityManager::new();
        let mut map = map_2x2();
        let key = manager.create_entity(node());
        let calls = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&calls);
        let handle = manager.register_dirty_entity_handler(move |_, _| *counter.borrow_mut() += 1);

        manager.mark_entity_as_dirty(&mut map, key, EntityDirtyFlags::CREATE, 1).unwrap();
        assert!(manager.unregister_dirty_entity_handler(handle));
        manager.mark_entity_as_dirty(&mut map, key, EntityDirtyFlags::CREATE, 2).unwrap();
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn test_write_then_read_restores_hierarchy() {
        let mut manager = EntityManager::new();
        let mut map = map_2x2();
        let parent = manager.create_entity(node().with_facets(FacetFlags::COMPONENTS));
        let child = manager.create_entity(node());
        let loose = manager.create_entity(EntityDescriptor::new(Category::Static));
        manager.entity_mut(parent).unwrap().set_name("root");
        manager.attach(parent, child).unwrap();
        place(&mut manager, parent, Vec3::new(3.0, 4.0, 0.0));
        manager.mark_entity_as_dirty(&mut map, parent, EntityDirtyFlags::empty(), 1).unwrap();

        let mut bytes = Vec::new();
        manager.write(&mut SceneWriter::new(&mut bytes)).unwrap();

        let mut restored = EntityManager::new();
        let mut source = bytes.as_slice();
        let keys = restored.read(&mut SceneReader::new(&mut source)).unwrap();
        assert_eq!(keys.len(), 3);

        let new_parent = restored.entity_by_id(0).unwrap();
        let new_child = restored.entity_by_id(1).unwrap();
        let new_loose = restored.entity_by_id(manager.entity(loose).unwrap().id()).unwrap();
        assert_eq!(restored.entity(new_parent).unwrap().name(), "root");
        assert_eq!(restored.parent(new_child), Some(new_parent));
        assert_eq!(restored.children(new_parent), vec![new_child]);
        assert!(restored.entity(new_parent).unwrap().component_facet().is_some());
        assert!(restored.entity(new_loose).unwrap().transformation_facet().is_none());
        assert_eq!(
            restored.entity(new_child).unwrap().transformation_facet().unwrap().world_matrix(),
            manager.entity(child).unwrap().transformation_facet().unwrap().world_matrix()
        );
        assert_eq!(restored.create_entity(EntityDescriptor::default()), restored.entity_by_id(3).unwrap());
    }

    type Links = (Option<EntityId>, Option<EntityId>, Option<EntityId>);

    /// Scene bytes for hierarchy-only entities given as id, parent,
    /// first child and sibling
    fn linked_scene(nodes: &[(EntityId, Links)]) -> Vec<u8> {
        let mut bytes = Vec::new();
        {
            let mut writer = SceneWriter::new(&mut bytes);
            writer.write_u32(nodes.len() as u32).unwrap();
            for (id, _) in nodes {
                Entity::new(*id, Category::Dynamic).write(&mut writer).unwrap();
            }
            for (_, (parent, first_child, sibling)) in nodes {
                writer.write_bool(false).unwrap();
                writer.write_bool(true).unwrap();
                for link in [parent, first_child, sibling] {
                    writer.write_bool(link.is_some()).unwrap();
                    if let Some(id) = link {
                        writer.write_u64(*id).unwrap();
                    }
                }
                writer.write_bool(false).unwrap();
            }
        }
        bytes
    }

    fn read_scene(manager: &mut EntityManager, bytes: &[u8]) -> CoreResult<Vec<EntityKey>> {
        let mut source = bytes;
        manager.read(&mut SceneReader::new(&mut source))
    }

    #[test]
    fn test_hand_built_tree_is_accepted() {
        let bytes = linked_scene(&[
            (0, (None, Some(1), None)),
            (1, (Some(0), None, Some(2))),
            (2, (Some(0), None, None)),
        ]);
        let mut manager = EntityManager::new();
        read_scene(&mut manager, &bytes).unwrap();
        let root = manager.entity_by_id(0).unwrap();
        let ids: Vec<EntityId> = manager
            .children(root)
            .into_iter()
            .map(|key| manager.entity(key).unwrap().id())
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_bogus_count_ends_in_io_error() {
        let mut manager = EntityManager::new();
        let result = read_scene(&mut manager, &[0xff; 4]);
        assert!(matches!(result, Err(CoreError::Codec(CodecError::Io(_)))));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_self_linked_entity_is_rejected() {
        let bytes = linked_scene(&[(0, (None, Some(0), Some(0)))]);
        let mut manager = EntityManager::new();
        assert!(matches!(
            read_scene(&mut manager, &bytes),
            Err(CoreError::InvariantViolation(_))
        ));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_looping_sibling_chain_is_rejected() {
        let bytes = linked_scene(&[
            (0, (None, Some(1), None)),
            (1, (Some(0), None, Some(2))),
            (2, (Some(0), None, Some(1))),
        ]);
        let mut manager = EntityManager::new();
        assert!(read_scene(&mut manager, &bytes).is_err());
        assert!(manager.is_empty());
    }

    #[test]
    fn test_inconsistent_parent_links_are_rejected() {
        // 1 claims 0 as parent but is not in 0's child list
        let orphaned = linked_scene(&[(0, (None, None, None)), (1, (Some(0), None, None))]);
        // 1 is listed under 0 but names 2 as parent
        let stolen = linked_scene(&[
            (0, (None, Some(1), None)),
            (1, (Some(2), None, None)),
            (2, (None, None, None)),
        ]);
        // 0 and 1 are each other's parent
        let cycle = linked_scene(&[(0, (Some(1), Some(1), None)), (1, (Some(0), Some(0), None))]);
        let dangling = linked_scene(&[(0, (None, Some(9), None))]);

        for bytes in [orphaned, stolen, cycle] {
            let mut manager = EntityManager::new();
            assert!(matches!(
                read_scene(&mut manager, &bytes),
                Err(CoreError::InvariantViolation(_))
            ));
        }
        let mut manager = EntityManager::new();
        assert!(matches!(
            read_scene(&mut manager, &dangling),
            Err(CoreError::Codec(CodecError::UnresolvedEntity(9)))
        ));
    }

    #[test]
    fn test_truncated_read_leaves_manager_untouched() {
        let mut manager = EntityManager::new();
        let existing = manager.create_entity(node());
        let mut bytes = linked_scene(&[(5, (None, None, None)), (6, (None, None, None))]);
        bytes.truncate(bytes.len() - 3);

        assert!(read_scene(&mut manager, &bytes).is_err());
        assert_eq!(manager.len(), 1);
        assert!(manager.entity_by_id(5).is_none());
        let next = manager.create_entity(node());
        assert_eq!(manager.entity(next).unwrap().id(), 1);
        assert!(manager.entity(existing).is_some());
    }
}
