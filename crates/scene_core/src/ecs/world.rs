//! Scene world
//!
//! The context object tying together the region map, the entities, the
//! components and the frame clock. Everything that used to be a process
//! wide singleton lives here and is passed explicitly.
//!
//! Single-threaded: every mutation, dirty dispatch and iteration runs on
//! the calling thread.

use log::{debug, info, warn};

use crate::core::config::SceneCoreConfig;
use crate::core::error::{CoreError, CoreResult};
use crate::ecs::component::ComponentId;
use crate::ecs::component_manager::ComponentManager;
use crate::ecs::components;
use crate::ecs::entity::{EntityDirtyFlags, EntityKey};
use crate::ecs::entity_manager::{EntityDescriptor, EntityManager};
use crate::foundation::codec::{SceneReader, SceneWriter};
use crate::foundation::time::FrameClock;
use crate::spatial::map::Map;
use crate::spatial::cursor::MapEntities;
use crate::spatial::walk::EntityFilter;

/// Map, entities, components and clock of one open scene
#[derive(Debug, Default)]
pub struct World {
    map: Map,
    entities: EntityManager,
    components: ComponentManager,
    clock: FrameClock,
}

impl World {
    /// Empty world without a map; built-in component types are registered
    pub fn new() -> Self {
        let mut world = Self::default();
        components::register_all(&mut world.components);
        world
    }

    /// World with a map sized from the configuration
    pub fn from_config(config: &SceneCoreConfig) -> CoreResult<Self> {
        let mut world = Self::new();
        world.allocate_map(config.map.regions_x, config.map.regions_y)?;
        info!("World created with a {}x{} region map", config.map.regions_x, config.map.regions_y);
        Ok(world)
    }

    /// Allocate the region map
    pub fn allocate_map(&mut self, regions_x: usize, regions_y: usize) -> CoreResult<()> {
        self.map.allocate_map(regions_x, regions_y)
    }

    /// Free the region map, unlinking every entity
    pub fn free_map(&mut self) {
        self.map.free_map(self.entities.arena_mut());
    }

    /// Region map
    pub fn map(&self) -> &Map {
        &self.map
    }

    /// Entity manager
    pub fn entities(&self) -> &EntityManager {
        &self.entities
    }

    /// Mutable entity manager
    pub fn entities_mut(&mut self) -> &mut EntityManager {
        &mut self.entities
    }

    /// Component manager
    pub fn components(&self) -> &ComponentManager {
        &self.components
    }

    /// Mutable component manager
    pub fn components_mut(&mut self) -> &mut ComponentManager {
        &mut self.components
    }

    /// Current frame
    pub fn frame(&self) -> u64 {
        self.clock.frame()
    }

    /// Start the next frame
    pub fn advance_frame(&mut self) -> u64 {
        self.clock.advance()
    }

    /// Create an entity
    pub fn create_entity(&mut self, descriptor: EntityDescriptor) -> EntityKey {
        self.entities.create_entity(descriptor)
    }

    /// Entities of the map selected by `filter`
    pub fn query(&self, filter: EntityFilter) -> CoreResult<MapEntities<'_>> {
        self.map.entities(self.entities.arena(), filter)
    }

    /// Apply dirty flags to an entity and its descendants in the current
    /// frame. Components of destroyed entities lose their host.
    pub fn mark_entity_as_dirty(&mut self, key: EntityKey, flags: EntityDirtyFlags) -> CoreResult<()> {
        let orphans = if flags.contains(EntityDirtyFlags::DESTROY) {
            self.subtree_components(key)
        } else {
            Vec::new()
        };

        let frame = self.clock.frame();
        self.entities.mark_entity_as_dirty(&mut self.map, key, flags, frame)?;

        for id in orphans {
            let host = self.components.entry(id).and_then(|entry| entry.host());
            if host.is_some_and(|host| self.entities.entity(host).is_none()) {
                self.components.restore_host(id, None);
            }
        }
        Ok(())
    }

    fn subtree_components(&self, key: EntityKey) -> Vec<ComponentId> {
        let mut ids = Vec::new();
        let mut pending = vec![key];
        while let Some(current) = pending.pop() {
            if let Some(facet) = self.entities.entity(current).and_then(|entity| entity.component_facet()) {
                ids.extend_from_slice(facet.component_ids());
            }
            pending.extend(self.entities.children(current));
        }
        ids
    }

    /// Host component `id` on entity `key`
    ///
    /// The entity needs a component facet and the component must not be
    /// hosted already.
    pub fn attach_component(&mut self, key: EntityKey, id: ComponentId) -> CoreResult<()> {
        let entity = self.entities.entity(key).ok_or(CoreError::UnknownEntity)?;
        if entity.component_facet().is_none() {
            return Err(CoreError::invariant(format!("entity {} has no component facet", entity.id())));
        }
        let entry = self
            .components
            .entry_mut(id)
            .ok_or_else(|| CoreError::invariant(format!("component {id} does not exist")))?;
        if let Err(error) = entry.attach_to(key) {
            warn!("Attach of component {} rejected: {}", id, error);
            return Err(error);
        }

        if let Some(facet) = self.entities.entity_mut(key).and_then(|entity| entity.component_facet_mut()) {
            facet.add(id);
        }
        debug!("Attached component {} to entity {:?}", id, key);
        Ok(())
    }

    /// Remove component `id` from entity `key`; the entity must host it
    pub fn detach_component(&mut self, key: EntityKey, id: ComponentId) -> CoreResult<()> {
        if self.entities.entity(key).is_none() {
            return Err(CoreError::UnknownEntity);
        }
        let entry = self
            .components
            .entry_mut(id)
            .ok_or_else(|| CoreError::invariant(format!("component {id} does not exist")))?;
        if let Err(error) = entry.detach_from(key) {
            warn!("Detach of component {} rejected: {}", id, error);
            return Err(error);
        }

        if let Some(facet) = self.entities.entity_mut(key).and_then(|entity| entity.component_facet_mut()) {
            facet.remove(id);
        }
        debug!("Detached component {} from entity {:?}", id, key);
        Ok(())
    }

    /// Free an entity that is not in the map; its components lose their
    /// host but stay allocated
    pub fn free_entity(&mut self, key: EntityKey) -> CoreResult<()> {
        let hosted: Vec<ComponentId> = self
            .entities
            .entity(key)
            .and_then(|entity| entity.component_facet())
            .map(|facet| facet.component_ids().to_vec())
            .unwrap_or_default();

        self.entities.free_entity(key)?;
        for id in hosted {
            self.components.restore_host(id, None);
        }
        Ok(())
    }

    /// Write components, then entities
    pub fn write(&self, writer: &mut SceneWriter<'_>) -> CoreResult<()> {
        self.components.write(writer)?;
        self.entities.write(writer)?;
        Ok(())
    }

    /// Read a scene written by [`World::write`] into this world.
    ///
    /// Component hosts are restored from the entities' component facets.
    /// Read entities are outside the map; they are returned so the caller
    /// can mark them `ADD`. On error the world is left as it was.
    pub fn read(&mut self, reader: &mut SceneReader<'_>) -> CoreResult<Vec<EntityKey>> {
        let components = self.components.decode(reader)?;
        let entities = self.entities.decode(reader)?;
        if let Some(missing) = entities
            .component_ids()
            .find(|id| !components.contains(*id) && !self.components.contains(*id))
        {
            return Err(CoreError::invariant(format!("entity references missing component {missing}")));
        }

        self.components.commit(components);
        let keys = self.entities.commit(entities);
        for key in &keys {
            let hosted = self
                .entities
                .entity(*key)
                .and_then(|entity| entity.component_facet())
                .map(|facet| facet.component_ids().to_vec())
                .unwrap_or_default();
            for id in hosted {
                self.components.restore_host(id, Some(*key));
            }
        }
        info!("Read scene with {} entities and {} components", keys.len(), self.components.len());
        Ok(keys)
    }
}

impl Drop for World {
    fn drop(&mut self) {
        self.free_map();
    }
}
