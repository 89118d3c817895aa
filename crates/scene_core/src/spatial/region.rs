//! Map regions
//!
//! A region is one fixed-size cell of the map grid. It keeps one folder per
//! entity category; a folder is the head of an intrusive list threaded
//! through the entities' own links.

use crate::ecs::entity::{Category, EntityKey};
use crate::foundation::math::{Aabb3, Vec3};

/// Index of a region inside its map, row major
pub type RegionId = usize;

/// Region size along X in meters
pub const REGION_SIZE_X: usize = 32;

/// Region size along Y in meters
pub const REGION_SIZE_Y: usize = 32;

/// Maximum number of regions along X
pub const MAX_REGIONS_X: usize = 128;

/// Maximum number of regions along Y
pub const MAX_REGIONS_Y: usize = 128;

/// Maximum number of regions in a map
pub const MAX_REGIONS: usize = MAX_REGIONS_X * MAX_REGIONS_Y;

/// Largest map extent along X in meters
pub const MAX_METERS_X: usize = MAX_REGIONS_X * REGION_SIZE_X;

/// Largest map extent along Y in meters
pub const MAX_METERS_Y: usize = MAX_REGIONS_Y * REGION_SIZE_Y;

/// Address of a folder: its region and category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FolderRef {
    /// Owning region
    pub region: RegionId,
    /// Category of the entities in the folder
    pub category: Category,
}

/// Head of the entity list for one (region, category) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityFolder {
    region: RegionId,
    category: Category,
    pub(crate) head: Option<EntityKey>,
}

impl EntityFolder {
    fn new(region: RegionId, category: Category) -> Self {
        Self {
            region,
            category,
            head: None,
        }
    }

    /// Owning region
    pub fn region(&self) -> RegionId {
        self.region
    }

    /// Category of the folder
    pub fn category(&self) -> Category {
        self.category
    }

    /// Most recently inserted entity
    pub fn head(&self) -> Option<EntityKey> {
        self.head
    }

    /// Whether the folder holds no entity
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Address of this folder
    pub fn folder_ref(&self) -> FolderRef {
        FolderRef {
            region: self.region,
            category: self.category,
        }
    }
}

/// One cell of the map grid
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    id: RegionId,
    position: [usize; 2],
    aabb: Aabb3,
    folders: [EntityFolder; Category::COUNT],
}

impl Region {
    /// Build region `id` of a grid `regions_x` wide
    pub(crate) fn new(id: RegionId, regions_x: usize) -> Self {
        let position = [
            id % regions_x * REGION_SIZE_X,
            id / regions_x * REGION_SIZE_Y,
        ];
        let min = Vec3::new(position[0] as f32, position[1] as f32, 0.0);
        let max = Vec3::new(
            min.x + REGION_SIZE_X as f32,
            min.y + REGION_SIZE_Y as f32,
            0.0,
        );

        Self {
            id,
            position,
            aabb: Aabb3::new(min, max),
            folders: Category::ALL.map(|category| EntityFolder::new(id, category)),
        }
    }

    /// Region index
    pub fn id(&self) -> RegionId {
        self.id
    }

    /// World-space origin in meters
    pub fn position(&self) -> [usize; 2] {
        self.position
    }

    /// Bounds of the region; flat in Z
    pub fn aabb(&self) -> &Aabb3 {
        &self.aabb
    }

    /// Folder of a category
    pub fn folder(&self, category: Category) -> &EntityFolder {
        &self.folders[category.index()]
    }

    pub(crate) fn folder_mut(&mut self, category: Category) -> &mut EntityFolder {
        &mut self.folders[category.index()]
    }

    /// All folders in ascending category order
    pub fn folders(&self) -> &[EntityFolder] {
        &self.folders
    }

    /// Whether every folder is empty
    pub fn is_empty(&self) -> bool {
        self.folders.iter().all(EntityFolder::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_origin_is_row_major() {
        let region = Region::new(5, 4);
        assert_eq!(region.position(), [REGION_SIZE_X, REGION_SIZE_Y]);
        assert_eq!(region.aabb().min, Vec3::new(32.0, 32.0, 0.0));
        assert_eq!(region.aabb().max, Vec3::new(64.0, 64.0, 0.0));
    }

    #[test]
    fn test_folders_per_category() {
        let region = Region::new(2, 3);
        assert!(region.is_empty());
        assert_eq!(region.folders().len(), Category::COUNT);
        let folder = region.folder(Category::Dynamic);
        assert_eq!(folder.region(), 2);
        assert_eq!(folder.category(), Category::Dynamic);
        assert_eq!(folder.folder_ref(), FolderRef { region: 2, category: Category::Dynamic });
    }
}
