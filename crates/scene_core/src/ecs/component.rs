//! Component trait and the type-erased component entry
//!
//! A component is plain data attached to at most one entity. The component
//! manager stores each one inside a [`ComponentEntry`] that carries its id,
//! host, dirty flags and the per-system facet slots.

use std::any::{Any, TypeId};
use std::fmt;

use bitflags::bitflags;

use crate::core::error::{CoreError, CoreResult};
use crate::ecs::entity::EntityKey;
use crate::foundation::codec::{CodecError, SceneReader, SceneWriter};

/// Unique component identifier
pub type ComponentId = u64;

bitflags! {
    /// What a dirty notification asks subscribers to do
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DirtyFlags: u32 {
        /// No facet exists yet; allocate one
        const CREATE  = 0x01;
        /// Facet exists; refresh its derived data
        const INFO    = 0x02;
        /// Facet must be released before the component goes away
        const DESTROY = 0x04;
        /// Same meaning as `INFO`, used when the change is a move
        const MOVE    = Self::INFO.bits();
    }
}

/// Slot for a companion object owned by an external system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FacetSlot {
    /// GPU-side counterpart
    Graphic,
    /// Physics-side counterpart
    Physics,
}

impl FacetSlot {
    /// Number of facet slots per component
    pub const COUNT: usize = 2;

    const fn index(self) -> usize {
        self as usize
    }
}

/// Data of a concrete component type
///
/// Components are populated from already-parsed fields and persist
/// themselves through the scene codec.
pub trait Component: Any + fmt::Debug + Default {
    /// Stable name used to find the factory when reading a scene
    const TYPE_NAME: &'static str;

    /// Write the component payload
    fn write(&self, writer: &mut SceneWriter<'_>) -> Result<(), CodecError>;

    /// Read the component payload in place
    fn read(&mut self, reader: &mut SceneReader<'_>) -> Result<(), CodecError>;
}

/// Object-safe view of a [`Component`], implemented for every component type
pub trait ComponentData: Any + fmt::Debug {
    /// Name of the concrete type
    fn type_name(&self) -> &'static str;

    /// Borrow as `Any` for downcasting
    fn as_any(&self) -> &dyn Any;

    /// Mutably borrow as `Any` for downcasting
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Write the payload
    fn write_data(&self, writer: &mut SceneWriter<'_>) -> Result<(), CodecError>;

    /// Read the payload in place
    fn read_data(&mut self, reader: &mut SceneReader<'_>) -> Result<(), CodecError>;
}

impl<T: Component> ComponentData for T {
    fn type_name(&self) -> &'static str {
        T::TYPE_NAME
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn write_data(&self, writer: &mut SceneWriter<'_>) -> Result<(), CodecError> {
        Component::write(self, writer)
    }

    fn read_data(&mut self, reader: &mut SceneReader<'_>) -> Result<(), CodecError> {
        Component::read(self, reader)
    }
}

/// A stored component with its bookkeeping
pub struct ComponentEntry {
    id: ComponentId,
    type_id: TypeId,
    host: Option<EntityKey>,
    dirty: DirtyFlags,
    facets: [Option<Box<dyn Any>>; FacetSlot::COUNT],
    data: Box<dyn ComponentData>,
}

impl fmt::Debug for ComponentEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentEntry")
            .field("id", &self.id)
            .field("type", &self.data.type_name())
            .field("host", &self.host)
            .field("dirty", &self.dirty)
            .field("graphic_facet", &self.facets[FacetSlot::Graphic.index()].is_some())
            .field("physics_facet", &self.facets[FacetSlot::Physics.index()].is_some())
            .field("data", &self.data)
            .finish()
    }
}

impl ComponentEntry {
    pub(crate) fn new(id: ComponentId, data: Box<dyn ComponentData>) -> Self {
        let type_id = Any::type_id(data.as_any());
        Self {
            id,
            type_id,
            host: None,
            dirty: DirtyFlags::empty(),
            facets: [None, None],
            data,
        }
    }

    /// Component id
    pub fn id(&self) -> ComponentId {
        self.id
    }

    /// Concrete type of the payload
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Registered name of the concrete type
    pub fn type_name(&self) -> &'static str {
        self.data.type_name()
    }

    /// Entity hosting the component
    pub fn host(&self) -> Option<EntityKey> {
        self.host
    }

    /// Flags of the most recent dirty notification
    pub fn dirty_flags(&self) -> DirtyFlags {
        self.dirty
    }

    pub(crate) fn set_dirty_flags(&mut self, flags: DirtyFlags) {
        self.dirty = flags;
    }

    /// Set the host. A component is hosted by one entity for its whole
    /// attachment; attaching it elsewhere requires detaching first.
    pub(crate) fn attach_to(&mut self, host: EntityKey) -> CoreResult<()> {
        match self.host {
            None => {
                self.host = Some(host);
                Ok(())
            }
            Some(current) if current == host => Err(CoreError::invariant(format!(
                "component {} is already attached to this entity",
                self.id
            ))),
            Some(_) => Err(CoreError::invariant(format!(
                "component {} is attached to another entity",
                self.id
            ))),
        }
    }

    pub(crate) fn detach_from(&mut self, host: EntityKey) -> CoreResult<()> {
        if self.host != Some(host) {
            return Err(CoreError::invariant(format!(
                "component {} is not hosted by the entity it is detached from",
                self.id
            )));
        }
        self.host = None;
        Ok(())
    }

    pub(crate) fn restore_host(&mut self, host: Option<EntityKey>) {
        self.host = host;
    }

    /// Store a system-owned companion object, returning the previous one
    pub fn set_facet(&mut self, slot: FacetSlot, facet: Box<dyn Any>) -> Option<Box<dyn Any>> {
        self.facets[slot.index()].replace(facet)
    }

    /// Borrow a companion object
    pub fn facet(&self, slot: FacetSlot) -> Option<&dyn Any> {
        self.facets[slot.index()].as_deref()
    }

    /// Borrow a companion object as its concrete type
    pub fn facet_as<F: Any>(&self, slot: FacetSlot) -> Option<&F> {
        self.facet(slot)?.downcast_ref::<F>()
    }

    /// Mutably borrow a companion object as its concrete type
    pub fn facet_as_mut<F: Any>(&mut self, slot: FacetSlot) -> Option<&mut F> {
        self.facets[slot.index()].as_deref_mut()?.downcast_mut::<F>()
    }

    /// Remove and return a companion object
    pub fn take_facet(&mut self, slot: FacetSlot) -> Option<Box<dyn Any>> {
        self.facets[slot.index()].take()
    }

    /// Whether the payload is a `T`
    pub fn is<T: Component>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Payload as `T`
    pub fn downcast_ref<T: Component>(&self) -> Option<&T> {
        self.data.as_any().downcast_ref::<T>()
    }

    /// Mutable payload as `T`
    pub fn downcast_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.data.as_any_mut().downcast_mut::<T>()
    }

    /// Type-erased payload
    pub fn data(&self) -> &dyn ComponentData {
        self.data.as_ref()
    }

    pub(crate) fn data_mut(&mut self) -> &mut dyn ComponentData {
        self.data.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::entity::{Category, Entity, EntityArena};

    #[derive(Debug, Default, PartialEq)]
    struct Marker(u32);

    impl Component for Marker {
        const TYPE_NAME: &'static str = "Marker";

        fn write(&self, writer: &mut SceneWriter<'_>) -> Result<(), CodecError> {
            writer.write_u32(self.0)
        }

        fn read(&mut self, reader: &mut SceneReader<'_>) -> Result<(), CodecError> {
            self.0 = reader.read_u32()?;
            Ok(())
        }
    }

    fn two_hosts() -> (EntityKey, EntityKey) {
        let mut arena = EntityArena::with_key();
        (
            arena.insert(Entity::new(0, Category::Static)),
            arena.insert(Entity::new(1, Category::Static)),
        )
    }

    #[test]
    fn test_entry_downcast() {
        let mut entry = ComponentEntry::new(1, Box::new(Marker(5)));
        assert!(entry.is::<Marker>());
        assert_eq!(entry.type_name(), "Marker");
        assert_eq!(entry.downcast_ref::<Marker>(), Some(&Marker(5)));
        entry.downcast_mut::<Marker>().unwrap().0 = 6;
        assert_eq!(entry.downcast_ref::<Marker>(), Some(&Marker(6)));
    }

    #[test]
    fn test_host_is_set_once() {
        let (first, second) = two_hosts();
        let mut entry = ComponentEntry::new(1, Box::new(Marker(0)));
        entry.attach_to(first).unwrap();
        assert!(entry.attach_to(second).is_err());
        assert!(entry.attach_to(first).is_err());
        assert!(entry.detach_from(second).is_err());
        assert_eq!(entry.host(), Some(first));
        entry.detach_from(first).unwrap();
        entry.attach_to(second).unwrap();
        assert_eq!(entry.host(), Some(second));
    }

    #[test]
    fn test_facet_slots_are_independent() {
        let mut entry = ComponentEntry::new(1, Box::new(Marker(0)));
        assert!(entry.set_facet(FacetSlot::Graphic, Box::new(7_u32)).is_none());
        assert_eq!(entry.facet_as::<u32>(FacetSlot::Graphic), Some(&7));
        assert!(entry.facet(FacetSlot::Physics).is_none());
        *entry.facet_as_mut::<u32>(FacetSlot::Graphic).unwrap() = 8;
        let previous = entry.set_facet(FacetSlot::Graphic, Box::new(9_u32)).unwrap();
        assert_eq!(previous.downcast_ref::<u32>(), Some(&8));
        assert!(entry.take_facet(FacetSlot::Graphic).is_some());
        assert!(entry.facet(FacetSlot::Graphic).is_none());
    }

    #[test]
    fn test_move_aliases_info() {
        assert_eq!(DirtyFlags::MOVE, DirtyFlags::INFO);
    }
}
