//! Entity facets
//!
//! Optional companions an entity may carry: a place in a parent/child
//! hierarchy, a local transformation with its cached world matrix, and the
//! list of components hosted by the entity.

use bitflags::bitflags;

use crate::ecs::component::{Component, ComponentId};
use crate::ecs::component_manager::ComponentManager;
use crate::ecs::entity::{EntityArena, EntityId, EntityKey};
use crate::foundation::codec::{CodecError, SceneReader, SceneWriter};
use crate::foundation::math::{Mat4, Quat, Transform, Vec3};

bitflags! {
    /// Facets to create with an entity
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FacetFlags: u8 {
        /// Parent, first child and sibling links
        const HIERARCHY      = 0x01;
        /// Local transformation and world matrix
        const TRANSFORMATION = 0x02;
        /// Hosted component list
        const COMPONENTS     = 0x04;
    }
}

/// Parent/child links of an entity
///
/// Children form a singly linked list: the parent points at its first child
/// and each child at its next sibling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HierarchyFacet {
    parent: Option<EntityKey>,
    first_child: Option<EntityKey>,
    sibling: Option<EntityKey>,
    timestamp: Option<u64>,
}

/// Hierarchy links read from a scene, still expressed as entity ids
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingHierarchy {
    /// Parent id
    pub parent: Option<EntityId>,
    /// First child id
    pub first_child: Option<EntityId>,
    /// Next sibling id
    pub sibling: Option<EntityId>,
}

impl HierarchyFacet {
    /// Parent entity
    pub fn parent(&self) -> Option<EntityKey> {
        self.parent
    }

    /// First child entity
    pub fn first_child(&self) -> Option<EntityKey> {
        self.first_child
    }

    /// Next sibling entity
    pub fn sibling(&self) -> Option<EntityKey> {
        self.sibling
    }

    /// Frame of the last world matrix update
    pub fn timestamp(&self) -> Option<u64> {
        self.timestamp
    }

    pub(crate) fn set_parent(&mut self, parent: Option<EntityKey>) {
        self.parent = parent;
    }

    pub(crate) fn set_first_child(&mut self, first_child: Option<EntityKey>) {
        self.first_child = first_child;
    }

    pub(crate) fn set_sibling(&mut self, sibling: Option<EntityKey>) {
        self.sibling = sibling;
    }

    pub(crate) fn set_timestamp(&mut self, frame: u64) {
        self.timestamp = Some(frame);
    }

    /// Write parent, first child and sibling as `has-link + id` pairs
    pub fn write(&self, writer: &mut SceneWriter<'_>, arena: &EntityArena) -> Result<(), CodecError> {
        for link in [self.parent, self.first_child, self.sibling] {
            match link.and_then(|key| arena.get(key)) {
                Some(entity) => {
                    writer.write_bool(true)?;
                    writer.write_u64(entity.id())?;
                }
                None => writer.write_bool(false)?,
            }
        }
        Ok(())
    }

    /// Read links written by [`HierarchyFacet::write`]
    pub fn read(reader: &mut SceneReader<'_>) -> Result<PendingHierarchy, CodecError> {
        let mut links = [None; 3];
        for link in &mut links {
            if reader.read_bool()? {
                *link = Some(reader.read_u64()?);
            }
        }
        let [parent, first_child, sibling] = links;
        Ok(PendingHierarchy { parent, first_child, sibling })
    }
}

/// Local transformation and the world matrix derived from it
#[derive(Debug, Clone, PartialEq)]
pub struct TransformationFacet {
    position: Vec3,
    rotation: Quat,
    scale: Vec3,
    world_matrix: Mat4,
}

impl Default for TransformationFacet {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
            world_matrix: Mat4::identity(),
        }
    }
}

impl TransformationFacet {
    /// Position, relative to the parent when the entity has one
    pub fn position(&self) -> &Vec3 {
        &self.position
    }

    /// Set the position
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    /// Rotation, relative to the parent when the entity has one
    pub fn rotation(&self) -> &Quat {
        &self.rotation
    }

    /// Set the rotation
    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation;
    }

    /// Scale factors
    pub fn scale(&self) -> &Vec3 {
        &self.scale
    }

    /// Set the scale factors
    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
    }

    /// Position, rotation and scale as one transform
    pub fn transform(&self) -> Transform {
        Transform {
            position: self.position,
            rotation: self.rotation,
            scale: self.scale,
        }
    }

    /// Replace position, rotation and scale
    pub fn set_transform(&mut self, transform: &Transform) {
        self.position = transform.position;
        self.rotation = transform.rotation;
        self.scale = transform.scale;
    }

    /// Matrix of the local transformation
    pub fn local_matrix(&self) -> Mat4 {
        self.transform().to_matrix()
    }

    /// Cached world matrix from the last update
    pub fn world_matrix(&self) -> &Mat4 {
        &self.world_matrix
    }

    pub(crate) fn set_world_matrix(&mut self, world_matrix: Mat4) {
        self.world_matrix = world_matrix;
    }

    /// Write world matrix, position, rotation and scale
    pub fn write(&self, writer: &mut SceneWriter<'_>) -> Result<(), CodecError> {
        writer.write_mat4(&self.world_matrix)?;
        writer.write_vec3(&self.position)?;
        writer.write_quat(&self.rotation)?;
        writer.write_vec3(&self.scale)
    }

    /// Read a facet written by [`TransformationFacet::write`]
    pub fn read(reader: &mut SceneReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            world_matrix: reader.read_mat4()?,
            position: reader.read_vec3()?,
            rotation: reader.read_quat()?,
            scale: reader.read_vec3()?,
        })
    }
}

/// Components hosted by an entity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentFacet {
    components: Vec<ComponentId>,
}

impl ComponentFacet {
    /// Ids of hosted components in attach order
    pub fn component_ids(&self) -> &[ComponentId] {
        &self.components
    }

    /// Whether a component of type `T` is hosted
    pub fn has_component<T: Component>(&self, components: &ComponentManager) -> bool {
        self.get_component::<T>(components).is_some()
    }

    /// First hosted component of type `T`
    pub fn get_component<'a, T: Component>(&self, components: &'a ComponentManager) -> Option<&'a T> {
        self.components.iter().find_map(|id| components.get::<T>(*id))
    }

    /// Every hosted component of type `T`
    pub fn get_components<'a, T: Component>(
        &'a self,
        components: &'a ComponentManager,
    ) -> impl Iterator<Item = &'a T> + 'a {
        self.components.iter().filter_map(move |id| components.get::<T>(*id))
    }

    pub(crate) fn add(&mut self, id: ComponentId) {
        if !self.components.contains(&id) {
            self.components.push(id);
        }
    }

    pub(crate) fn remove(&mut self, id: ComponentId) -> bool {
        let before = self.components.len();
        self.components.retain(|hosted| *hosted != id);
        self.components.len() != before
    }

    /// Write the hosted component ids
    pub fn write(&self, writer: &mut SceneWriter<'_>) -> Result<(), CodecError> {
        writer.write_u32(self.components.len() as u32)?;
        for id in &self.components {
            writer.write_u64(*id)?;
        }
        Ok(())
    }

    /// Read ids written by [`ComponentFacet::write`]
    pub fn read(reader: &mut SceneReader<'_>) -> Result<Self, CodecError> {
        let count = reader.read_u32()?;
        let components = (0..count)
            .map(|_| reader.read_u64())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { components })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::entity::{Category, Entity};
    use approx::assert_relative_eq;

    #[test]
    fn test_hierarchy_links_written_as_ids() {
        let mut arena = EntityArena::with_key();
        let parent = arena.insert(Entity::new(10, Category::Static));
        let sibling = arena.insert(Entity::new(11, Category::Static));

        let mut facet = HierarchyFacet::default();
        facet.set_parent(Some(parent));
        facet.set_sibling(Some(sibling));

        let mut bytes = Vec::new();
        facet.write(&mut SceneWriter::new(&mut bytes), &arena).unwrap();
        let mut source = bytes.as_slice();
        let pending = HierarchyFacet::read(&mut SceneReader::new(&mut source)).unwrap();

        assert_eq!(
            pending,
            PendingHierarchy { parent: Some(10), first_child: None, sibling: Some(11) }
        );
    }

    #[test]
    fn test_transformation_local_matrix() {
        let mut facet = TransformationFacet::default();
        facet.set_position(Vec3::new(1.0, 2.0, 3.0));
        facet.set_scale(Vec3::new(2.0, 2.0, 2.0));
        let point = facet.local_matrix().transform_point(&nalgebra::Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(point.coords, Vec3::new(3.0, 2.0, 3.0), epsilon = 1e-6);
    }

    #[test]
    fn test_component_facet_add_remove() {
        let mut facet = ComponentFacet::default();
        facet.add(4);
        facet.add(4);
        facet.add(9);
        assert_eq!(facet.component_ids(), &[4, 9]);
        assert!(facet.remove(4));
        assert!(!facet.remove(4));
        assert_eq!(facet.component_ids(), &[9]);
    }
}
