//! Component registry and dirty-notification bus
//!
//! The manager owns every live component and indexes it by id and by
//! concrete type. Systems that keep companion state (renderers, physics)
//! subscribe with [`ComponentManager::register_dirty_component_handler`]
//! and are called synchronously from
//! [`ComponentManager::mark_component_as_dirty`].
//!
//! # Dirty protocol
//!
//! - `CREATE`: the component has no facet yet, allocate one
//! - `INFO` / `MOVE`: the facet exists, refresh it in place
//! - `DESTROY`: release the facet, the component is about to go away
//!
//! Marking overwrites the flags; it never accumulates. Deallocating does
//! not notify, so mark `DESTROY` first when subscribers must react.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};

use log::{debug, trace, warn};
use slotmap::{new_key_type, SlotMap};

use crate::core::error::{CoreError, CoreResult};
use crate::ecs::component::{Component, ComponentData, ComponentEntry, ComponentId, DirtyFlags};
use crate::ecs::entity::EntityKey;
use crate::foundation::codec::{CodecError, SceneReader, SceneWriter};

new_key_type! {
    struct ComponentSlot;
}

/// Callback invoked for every dirty component
pub type DirtyComponentHandler = Box<dyn FnMut(&mut ComponentEntry)>;

/// Opaque handle of a registered dirty handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct ComponentFactory {
    type_id: TypeId,
    create: fn() -> Box<dyn ComponentData>,
}

/// Components read from a scene but not yet owned by a manager
pub(crate) struct DecodedComponents {
    entries: Vec<ComponentEntry>,
}

impl DecodedComponents {
    pub(crate) fn contains(&self, id: ComponentId) -> bool {
        self.entries.iter().any(|entry| entry.id() == id)
    }
}

fn create_default<T: Component>() -> Box<dyn ComponentData> {
    Box::new(T::default())
}

/// Owner of every component
#[derive(Default)]
pub struct ComponentManager {
    storage: SlotMap<ComponentSlot, ComponentEntry>,
    by_id: HashMap<ComponentId, ComponentSlot>,
    by_type: HashMap<TypeId, Vec<ComponentId>>,
    next_id: ComponentId,
    handlers: Vec<(HandlerId, DirtyComponentHandler)>,
    next_handler_id: u64,
    factories: HashMap<&'static str, ComponentFactory>,
}

impl std::fmt::Debug for ComponentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentManager")
            .field("components", &self.storage.len())
            .field("types", &self.by_type.len())
            .field("handlers", &self.handlers.len())
            .field("factories", &self.factories.len())
            .finish()
    }
}

impl ComponentManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` so scenes containing it can be read back
    pub fn register<T: Component>(&mut self) {
        self.factories.insert(
            T::TYPE_NAME,
            ComponentFactory {
                type_id: TypeId::of::<T>(),
                create: create_default::<T>,
            },
        );
        debug!("Registered component type {}", T::TYPE_NAME);
    }

    /// Whether a factory exists for the type name
    pub fn is_registered(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Allocate a default-initialized `T`
    pub fn allocate<T: Component>(&mut self) -> ComponentId {
        self.allocate_with(T::default())
    }

    /// Allocate a component holding `value`
    pub fn allocate_with<T: Component>(&mut self, value: T) -> ComponentId {
        let id = self.next_id;
        self.next_id += 1;
        self.insert_entry(ComponentEntry::new(id, Box::new(value)));
        debug!("Allocated {} component {}", T::TYPE_NAME, id);
        id
    }

    fn insert_entry(&mut self, entry: ComponentEntry) {
        let id = entry.id();
        let type_id = entry.type_id();
        let slot = self.storage.insert(entry);
        self.by_id.insert(id, slot);
        self.by_type.entry(type_id).or_default().push(id);
    }

    /// Remove and drop a component. Unknown ids are ignored.
    ///
    /// No dirty notification is sent; subscribers holding facets must have
    /// been told with `DESTROY` beforehand.
    pub fn deallocate(&mut self, id: ComponentId) -> bool {
        let Some(slot) = self.by_id.remove(&id) else {
            trace!("Deallocate of unknown component {} ignored", id);
            return false;
        };

        if let Some(entry) = self.storage.get(slot) {
            if let Some(bucket) = self.by_type.get_mut(&entry.type_id()) {
                if let Some(position) = bucket.iter().position(|candidate| *candidate == id) {
                    bucket.remove(position);
                }
            }
        }

        if let Some(entry) = self.storage.remove(slot) {
            debug!("Deallocated {} component {}", entry.type_name(), id);
        }
        true
    }

    /// Number of live components
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Whether no component is alive
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Whether the id names a live component
    pub fn contains(&self, id: ComponentId) -> bool {
        self.by_id.contains_key(&id)
    }

    /// Entry of a component
    pub fn entry(&self, id: ComponentId) -> Option<&ComponentEntry> {
        self.storage.get(*self.by_id.get(&id)?)
    }

    /// Mutable entry of a component
    pub fn entry_mut(&mut self, id: ComponentId) -> Option<&mut ComponentEntry> {
        self.storage.get_mut(*self.by_id.get(&id)?)
    }

    /// Component as its concrete type; `None` if missing or of another type
    pub fn get<T: Component>(&self, id: ComponentId) -> Option<&T> {
        self.entry(id)?.downcast_ref::<T>()
    }

    /// Mutable component as its concrete type
    pub fn get_mut<T: Component>(&mut self, id: ComponentId) -> Option<&mut T> {
        self.entry_mut(id)?.downcast_mut::<T>()
    }

    /// Ids of every live `T`, in allocation order
    pub fn component_ids<T: Component>(&self) -> &[ComponentId] {
        match self.by_type.get(&TypeId::of::<T>()) {
            Some(ids) => ids,
            None => &[],
        }
    }

    /// Entries of every live `T`, in allocation order
    pub fn components<T: Component>(&self) -> impl Iterator<Item = &ComponentEntry> + '_ {
        self.component_ids::<T>()
            .iter()
            .filter_map(move |id| self.entry(*id))
    }

    /// Every live component entry, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = &ComponentEntry> + '_ {
        self.storage.values()
    }

    /// Subscribe to dirty notifications
    pub fn register_dirty_component_handler<F>(&mut self, handler: F) -> HandlerId
    where
        F: FnMut(&mut ComponentEntry) + 'static,
    {
        let id = HandlerId(self.next_handler_id);
        self.next_handler_id += 1;
        self.handlers.push((id, Box::new(handler)));
        debug!("Registered dirty component handler {:?}", id);
        id
    }

    /// Unsubscribe a handler; returns false for an unknown handle
    pub fn unregister_dirty_component_handler(&mut self, handle: HandlerId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(id, _)| *id != handle);
        self.handlers.len() != before
    }

    /// Set the component's dirty flags to exactly `flags` and call every
    /// handler in registration order before returning.
    ///
    /// Returns false when the id is unknown; no handler runs in that case.
    pub fn mark_component_as_dirty(&mut self, id: ComponentId, flags: DirtyFlags) -> bool {
        let Some(entry) = self.by_id.get(&id).and_then(|slot| self.storage.get_mut(*slot)) else {
            warn!("Dirty mark for unknown component {} dropped", id);
            return false;
        };

        entry.set_dirty_flags(flags);
        trace!("Component {} dirty {:?}, {} handlers", id, flags, self.handlers.len());

        for (_, handler) in &mut self.handlers {
            handler(entry);
        }
        true
    }

    /// Mark every component `DESTROY`, then drop them all
    pub fn clear(&mut self) {
        let ids: Vec<ComponentId> = self.by_id.keys().copied().collect();
        for id in ids {
            self.mark_component_as_dirty(id, DirtyFlags::DESTROY);
        }
        self.storage.clear();
        self.by_id.clear();
        self.by_type.clear();
        debug!("Cleared all components");
    }

    /// Write every component: count, then type name, id and payload each
    pub fn write(&self, writer: &mut SceneWriter<'_>) -> Result<(), CodecError> {
        let mut entries: Vec<&ComponentEntry> = self.storage.values().collect();
        entries.sort_by_key(|entry| entry.id());

        writer.write_u32(entries.len() as u32)?;
        for entry in entries {
            writer.write_str(entry.type_name())?;
            writer.write_u64(entry.id())?;
            entry.data().write_data(writer)?;
        }
        Ok(())
    }

    /// Read components written by [`ComponentManager::write`].
    ///
    /// Every type must be registered. Restored components keep their ids
    /// and have no host; the world reattaches them from the entity facets.
    /// Nothing is added unless the whole list decodes.
    pub fn read(&mut self, reader: &mut SceneReader<'_>) -> CoreResult<Vec<ComponentId>> {
        let decoded = self.decode(reader)?;
        Ok(self.commit(decoded))
    }

    pub(crate) fn decode(&self, reader: &mut SceneReader<'_>) -> CoreResult<DecodedComponents> {
        let count = reader.read_u32()?;
        let mut entries = Vec::new();
        let mut seen = HashSet::new();

        for _ in 0..count {
            let type_name = reader.read_string()?;
            let id = reader.read_u64()?;
            let factory = self
                .factories
                .get(type_name.as_str())
                .ok_or_else(|| CodecError::UnknownComponentType(type_name.clone()))?;

            let mut entry = ComponentEntry::new(id, (factory.create)());
            debug_assert_eq!(entry.type_id(), factory.type_id);
            entry.data_mut().read_data(reader)?;

            if self.by_id.contains_key(&id) || !seen.insert(id) {
                return Err(CoreError::invariant(format!("component id {id} read twice")));
            }
            entries.push(entry);
        }
        Ok(DecodedComponents { entries })
    }

    pub(crate) fn commit(&mut self, decoded: DecodedComponents) -> Vec<ComponentId> {
        let mut restored = Vec::with_capacity(decoded.entries.len());
        for entry in decoded.entries {
            let id = entry.id();
            self.insert_entry(entry);
            self.next_id = self.next_id.max(id + 1);
            restored.push(id);
        }
        debug!("Read {} components", restored.len());
        restored
    }

    pub(crate) fn restore_host(&mut self, id: ComponentId, host: Option<EntityKey>) {
        if let Some(entry) = self.entry_mut(id) {
            entry.restore_host(host);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Default, PartialEq)]
    struct Glow {
        strength: f32,
    }

    impl Component for Glow {
        const TYPE_NAME: &'static str = "Glow";

        fn write(&self, writer: &mut SceneWriter<'_>) -> Result<(), CodecError> {
            writer.write_f32(self.strength)
        }

        fn read(&mut self, reader: &mut SceneReader<'_>) -> Result<(), CodecError> {
            self.strength = reader.read_f32()?;
            Ok(())
        }
    }

    #[derive(Debug, Default, PartialEq)]
    struct Tag;

    impl Component for Tag {
        const TYPE_NAME: &'static str = "Tag";

        fn write(&self, _writer: &mut SceneWriter<'_>) -> Result<(), CodecError> {
            Ok(())
        }

        fn read(&mut self, _reader: &mut SceneReader<'_>) -> Result<(), CodecError> {
            Ok(())
        }
    }

    #[test]
    fn test_allocate_indexes_by_id_and_type() {
        let mut manager = ComponentManager::new();
        let a = manager.allocate_with(Glow { strength: 1.0 });
        let tag = manager.allocate::<Tag>();
        let b = manager.allocate_with(Glow { strength: 2.0 });

        assert_ne!(a, b);
        assert_eq!(manager.len(), 3);
        assert_eq!(manager.component_ids::<Glow>(), &[a, b]);
        assert_eq!(manager.component_ids::<Tag>(), &[tag]);
        assert_eq!(manager.get::<Glow>(b), Some(&Glow { strength: 2.0 }));
        assert!(manager.get::<Tag>(a).is_none());
    }

    #[test]
    fn test_deallocate_removes_from_both_indices() {
        let mut manager = ComponentManager::new();
        let a = manager.allocate::<Glow>();
        let b = manager.allocate::<Glow>();

        assert!(manager.deallocate(a));
        assert!(!manager.contains(a));
        assert_eq!(manager.component_ids::<Glow>(), &[b]);
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_deallocate_unknown_is_noop() {
        let mut manager = ComponentManager::new();
        let a = manager.allocate::<Glow>();
        assert!(!manager.deallocate(a + 100));
        assert!(manager.deallocate(a));
        assert!(!manager.deallocate(a));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_deallocate_does_not_notify() {
        let mut manager = ComponentManager::new();
        let calls = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&calls);
        manager.register_dirty_component_handler(move |_| *counter.borrow_mut() += 1);

        let id = manager.allocate::<Glow>();
        manager.deallocate(id);
        assert_eq!(*calls.borrow(), 0);
    }

    #[test]
    fn test_dirty_dispatch_reaches_every_handler_once() {
        let mut manager = ComponentManager::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        for name in ["shadow", "light"] {
            let log = Rc::clone(&seen);
            manager.register_dirty_component_handler(move |entry| {
                log.borrow_mut().push((name, entry.id(), entry.dirty_flags()));
            });
        }

        let id = manager.allocate::<Glow>();
        assert!(manager.mark_component_as_dirty(id, DirtyFlags::CREATE));

        assert_eq!(
            *seen.borrow(),
            vec![("shadow", id, DirtyFlags::CREATE), ("light", id, DirtyFlags::CREATE)]
        );
    }

    #[test]
    fn test_dirty_flags_overwrite() {
        let mut manager = ComponentManager::new();
        let id = manager.allocate::<Glow>();
        manager.mark_component_as_dirty(id, DirtyFlags::CREATE);
        manager.mark_component_as_dirty(id, DirtyFlags::INFO);
        assert_eq!(manager.entry(id).unwrap().dirty_flags(), DirtyFlags::INFO);
        assert!(!manager.mark_component_as_dirty(id + 1, DirtyFlags::INFO));
    }

    #[test]
    fn test_handler_owns_facet_lifecycle() {
        use crate::ecs::component::FacetSlot;

        let mut manager = ComponentManager::new();
        manager.register_dirty_component_handler(|entry| {
            if entry.dirty_flags().contains(DirtyFlags::CREATE) {
                entry.set_facet(FacetSlot::Graphic, Box::new(String::from("gpu light")));
            } else if entry.dirty_flags().contains(DirtyFlags::DESTROY) {
                entry.take_facet(FacetSlot::Graphic);
            }
        });

        let id = manager.allocate::<Glow>();
        manager.mark_component_as_dirty(id, DirtyFlags::CREATE);
        assert_eq!(
            manager.entry(id).unwrap().facet_as::<String>(FacetSlot::Graphic).map(String::as_str),
            Some("gpu light")
        );
        manager.mark_component_as_dirty(id, DirtyFlags::DESTROY);
        assert!(manager.entry(id).unwrap().facet(FacetSlot::Graphic).is_none());
    }

    #[test]
    fn test_unregister_handler() {
        let mut manager = ComponentManager::new();
        let calls = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&calls);
        let handle = manager.register_dirty_component_handler(move |_| *counter.borrow_mut() += 1);

        let id = manager.allocate::<Tag>();
        manager.mark_component_as_dirty(id, DirtyFlags::INFO);
        assert!(manager.unregister_dirty_component_handler(handle));
        assert!(!manager.unregister_dirty_component_handler(handle));
        manager.mark_component_as_dirty(id, DirtyFlags::INFO);
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn test_clear_notifies_destroy() {
        let mut manager = ComponentManager::new();
        let destroyed = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&destroyed);
        manager.register_dirty_component_handler(move |entry| {
            assert_eq!(entry.dirty_flags(), DirtyFlags::DESTROY);
            log.borrow_mut().push(entry.id());
        });

        let a = manager.allocate::<Glow>();
        let b = manager.allocate::<Tag>();
        manager.clear();

        let mut ids = destroyed.borrow().clone();
        ids.sort_unstable();
        assert_eq!(ids, vec![a, b]);
        assert!(manager.is_empty());
        assert!(manager.component_ids::<Glow>().is_empty());
    }

    #[test]
    fn test_persisted_components_come_back() {
        let mut manager = ComponentManager::new();
        manager.allocate::<Tag>();
        let glow = manager.allocate_with(Glow { strength: 3.5 });

        let mut bytes = Vec::new();
        manager.write(&mut SceneWriter::new(&mut bytes)).unwrap();

        let mut restored = ComponentManager::new();
        restored.register::<Glow>();
        restored.register::<Tag>();
        let mut source = bytes.as_slice();
        let ids = restored.read(&mut SceneReader::new(&mut source)).unwrap();

        assert_eq!(ids.len(), 2);
        assert_eq!(restored.get::<Glow>(glow), Some(&Glow { strength: 3.5 }));
        let fresh = restored.allocate::<Tag>();
        assert!(fresh > glow);
    }

    #[test]
    fn test_unregistered_type_fails_to_read() {
        let mut manager = ComponentManager::new();
        manager.allocate::<Glow>();
        let mut bytes = Vec::new();
        manager.write(&mut SceneWriter::new(&mut bytes)).unwrap();

        let mut restored = ComponentManager::new();
        let mut source = bytes.as_slice();
        let result = restored.read(&mut SceneReader::new(&mut source));
        assert!(matches!(
            result,
            Err(CoreError::Codec(CodecError::UnknownComponentType(name))) if name == "Glow"
        ));
    }

    #[test]
    fn test_bogus_count_ends_in_io_error() {
        let mut manager = ComponentManager::new();
        manager.register::<Glow>();
        let bytes = [0xff_u8; 4];
        let mut source = &bytes[..];
        let result = manager.read(&mut SceneReader::new(&mut source));
        assert!(matches!(result, Err(CoreError::Codec(CodecError::Io(_)))));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_truncated_read_adds_nothing() {
        let mut source_manager = ComponentManager::new();
        source_manager.allocate_with(Glow { strength: 1.0 });
        source_manager.allocate_with(Glow { strength: 2.0 });
        let mut bytes = Vec::new();
        source_manager.write(&mut SceneWriter::new(&mut bytes)).unwrap();
        bytes.truncate(bytes.len() - 2);

        let mut manager = ComponentManager::new();
        manager.register::<Glow>();
        let mut source = bytes.as_slice();
        assert!(manager.read(&mut SceneReader::new(&mut source)).is_err());
        assert!(manager.is_empty());
        assert_eq!(manager.allocate::<Glow>(), 0);
    }
}
