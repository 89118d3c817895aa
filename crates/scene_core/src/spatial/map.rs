//! The region map
//!
//! The map is a row-major grid of [`Region`]s covering
//! `regions_x * REGION_SIZE_X` by `regions_y * REGION_SIZE_Y` meters. It
//! buckets entities by world position and category so renderers can visit
//! only the regions overlapping their view.
//!
//! Entities stay in the [`EntityArena`]; the map only threads their links.
//! Every operation that touches links therefore takes the arena.

use log::{debug, error, info, warn};

use crate::core::error::{CoreError, CoreResult};
use crate::ecs::entity::{Category, EntityArena, EntityKey, FolderLink, Linkage};
use crate::foundation::math::{Aabb3, Vec3};
use crate::spatial::region::{
    FolderRef, Region, RegionId, MAX_REGIONS_X, MAX_REGIONS_Y, REGION_SIZE_X, REGION_SIZE_Y,
};

/// Grid of regions owning the entity folders
#[derive(Debug, Default)]
pub struct Map {
    regions: Vec<Region>,
    regions_x: usize,
    regions_y: usize,
    number_of_entities: usize,
}

/// Grid index along one axis, clamped into `[0, count - 1]`
fn axis_index(coordinate: f32, size: usize, count: usize) -> (usize, bool) {
    // `as` saturates: negative and NaN become 0
    let index = coordinate as usize / size;
    let clamped = coordinate < 0.0 || index >= count;
    (index.min(count - 1), clamped)
}

impl Map {
    /// Create an empty map without regions
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate `regions_x * regions_y` regions.
    ///
    /// Fails if a map already exists or the dimensions are zero or above
    /// the maximum. On failure no map is left behind.
    pub fn allocate_map(&mut self, regions_x: usize, regions_y: usize) -> CoreResult<()> {
        if self.has_map() {
            error!("Map allocation refused: a map of {}x{} regions exists", self.regions_x, self.regions_y);
            return Err(CoreError::MapAlreadyAllocated);
        }

        if regions_x == 0 || regions_y == 0 || regions_x > MAX_REGIONS_X || regions_y > MAX_REGIONS_Y {
            error!("Map allocation refused: invalid size {}x{}", regions_x, regions_y);
            return Err(CoreError::InvalidMapSize {
                regions_x,
                regions_y,
                max_x: MAX_REGIONS_X,
                max_y: MAX_REGIONS_Y,
            });
        }

        let count = regions_x * regions_y;
        let mut regions = Vec::new();
        regions.try_reserve_exact(count).map_err(|e| {
            error!("Map allocation of {} regions failed: {}", count, e);
            CoreError::MapAllocationFailed(e.to_string())
        })?;
        regions.extend((0..count).map(|id| Region::new(id, regions_x)));

        self.regions = regions;
        self.regions_x = regions_x;
        self.regions_y = regions_y;
        self.number_of_entities = 0;

        info!(
            "Allocated map of {}x{} regions ({}x{} meters)",
            regions_x,
            regions_y,
            self.number_of_meters_x(),
            self.number_of_meters_y()
        );
        Ok(())
    }

    /// Unlink every entity and drop all regions. Does nothing without a map.
    pub fn free_map(&mut self, arena: &mut EntityArena) {
        if !self.has_map() {
            return;
        }

        for region in &mut self.regions {
            for category in Category::ALL {
                let folder = region.folder_mut(category);
                let mut current = folder.head.take();

                while let Some(key) = current {
                    // Next is read before the entity is unlinked
                    current = arena.get(key).and_then(|entity| entity.next());
                    if let Some(entity) = arena.get_mut(key) {
                        entity.linkage = Linkage::Unlinked;
                    }
                    self.number_of_entities = self.number_of_entities.saturating_sub(1);
                }
            }
        }

        if self.number_of_entities != 0 {
            warn!("Entity counter was {} after unlinking every folder", self.number_of_entities);
        }

        info!("Freed map of {}x{} regions", self.regions_x, self.regions_y);
        self.regions = Vec::new();
        self.regions_x = 0;
        self.regions_y = 0;
        self.number_of_entities = 0;
    }

    /// Whether a map is allocated
    pub fn has_map(&self) -> bool {
        !self.regions.is_empty()
    }

    /// All regions, row major
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Region by index
    pub fn region(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(id)
    }

    /// Index of the region containing `(x, y)`.
    ///
    /// Coordinates outside the map clamp to the nearest edge region on each
    /// axis. Returns `None` only when no map is allocated. Grids that clamp
    /// the flattened row-major index instead wrap an `x` past the right edge
    /// into the next row; here it stays in its own row.
    pub fn region_index_by_position(&self, x: f32, y: f32) -> Option<RegionId> {
        if !self.has_map() {
            return None;
        }

        let (column, clamped_x) = axis_index(x, REGION_SIZE_X, self.regions_x);
        let (row, clamped_y) = axis_index(y, REGION_SIZE_Y, self.regions_y);

        // A coordinate exactly on the far edge is still inside the map
        let outside_x = clamped_x && (x < 0.0 || x > self.number_of_meters_x() as f32);
        let outside_y = clamped_y && (y < 0.0 || y > self.number_of_meters_y() as f32);
        if outside_x || outside_y {
            warn!("Position ({}, {}) is outside the map, clamped to region ({}, {})", x, y, column, row);
        }

        Some(column + row * self.regions_x)
    }

    /// Region containing `(x, y)`, clamped to the map
    pub fn region_by_position(&self, x: f32, y: f32) -> Option<&Region> {
        self.region_index_by_position(x, y)
            .and_then(|id| self.regions.get(id))
    }

    /// Region containing a world position; only X and Y are used
    pub fn region_at(&self, position: &Vec3) -> Option<&Region> {
        self.region_by_position(position.x, position.y)
    }

    /// Number of regions
    pub fn number_of_regions(&self) -> usize {
        self.regions.len()
    }

    /// Number of regions along X
    pub fn number_of_regions_x(&self) -> usize {
        self.regions_x
    }

    /// Number of regions along Y
    pub fn number_of_regions_y(&self) -> usize {
        self.regions_y
    }

    /// Map width in meters
    pub fn number_of_meters_x(&self) -> usize {
        self.regions_x * REGION_SIZE_X
    }

    /// Map depth in meters
    pub fn number_of_meters_y(&self) -> usize {
        self.regions_y * REGION_SIZE_Y
    }

    /// Map area in square meters
    pub fn number_of_square_meters(&self) -> usize {
        self.number_of_meters_x() * self.number_of_meters_y()
    }

    /// Number of entities linked into the map
    pub fn number_of_entities(&self) -> usize {
        self.number_of_entities
    }

    /// Whether `aabb` lies within the map in X and Y
    pub fn is_valid(&self, aabb: &Aabb3) -> bool {
        aabb.min.x >= 0.0
            && aabb.min.y >= 0.0
            && aabb.max.x <= self.number_of_meters_x() as f32
            && aabb.max.y <= self.number_of_meters_y() as f32
    }

    /// Bounds of the whole map, flat in Z
    pub fn aabb(&self) -> Aabb3 {
        Aabb3::new(
            Vec3::zeros(),
            Vec3::new(self.number_of_meters_x() as f32, self.number_of_meters_y() as f32, 0.0),
        )
    }

    /// Link an entity at the front of the folder for its position and category
    pub fn add_entity(&mut self, arena: &mut EntityArena, key: EntityKey) -> CoreResult<()> {
        let entity = arena.get(key).ok_or(CoreError::UnknownEntity)?;
        if entity.is_in_map() {
            return Err(CoreError::invariant(format!("entity {} is already in the map", entity.id())));
        }

        let region = self
            .region_index_by_position(entity.world_position().x, entity.world_position().y)
            .ok_or(CoreError::NoMap)?;
        let folder = FolderRef {
            region,
            category: entity.category(),
        };

        self.push_front(arena, key, folder);
        self.number_of_entities += 1;
        debug!("Added entity to region {} ({:?})", region, folder.category);
        Ok(())
    }

    /// Re-bucket an entity after its world position changed.
    ///
    /// Returns whether the entity was relinked; staying in the same region
    /// leaves its links untouched.
    pub fn move_entity(&mut self, arena: &mut EntityArena, key: EntityKey) -> CoreResult<bool> {
        let entity = arena.get(key).ok_or(CoreError::UnknownEntity)?;
        let Some(current) = entity.folder() else {
            return Err(CoreError::invariant(format!("entity {} is not in the map", entity.id())));
        };

        let region = self
            .region_index_by_position(entity.world_position().x, entity.world_position().y)
            .ok_or(CoreError::NoMap)?;
        if region == current.region {
            return Ok(false);
        }

        self.unlink(arena, key)?;
        self.push_front(
            arena,
            key,
            FolderRef {
                region,
                category: current.category,
            },
        );
        debug!("Moved entity from region {} to {}", current.region, region);
        Ok(true)
    }

    /// Unlink an entity from its folder
    pub fn remove_entity(&mut self, arena: &mut EntityArena, key: EntityKey) -> CoreResult<()> {
        let entity = arena.get(key).ok_or(CoreError::UnknownEntity)?;
        if !entity.is_in_map() {
            return Err(CoreError::invariant(format!("entity {} is not in the map", entity.id())));
        }

        self.unlink(arena, key)?;
        self.number_of_entities -= 1;
        debug!("Removed entity from map");
        Ok(())
    }

    fn push_front(&mut self, arena: &mut EntityArena, key: EntityKey, folder: FolderRef) {
        let slot = self.regions[folder.region].folder_mut(folder.category);
        let head = slot.head.replace(key);

        if let Some(head_key) = head {
            if let Some(Linkage::Linked(link)) = arena.get_mut(head_key).map(|e| &mut e.linkage) {
                link.previous = Some(key);
            }
        }

        if let Some(entity) = arena.get_mut(key) {
            entity.linkage = Linkage::Linked(FolderLink {
                folder,
                previous: None,
                next: head,
            });
        }
    }

    fn unlink(&mut self, arena: &mut EntityArena, key: EntityKey) -> CoreResult<()> {
        let link = match arena.get(key).map(|entity| entity.linkage) {
            Some(Linkage::Linked(link)) => link,
            Some(Linkage::Unlinked) => return Err(CoreError::invariant("unlinking an entity outside the map")),
            None => return Err(CoreError::UnknownEntity),
        };

        let region = self
            .regions
            .get_mut(link.folder.region)
            .ok_or_else(|| CoreError::invariant("entity links a region outside the map"))?;

        match link.previous {
            Some(previous) => {
                if let Some(Linkage::Linked(previous_link)) = arena.get_mut(previous).map(|e| &mut e.linkage) {
                    previous_link.next = link.next;
                }
            }
            None => region.folder_mut(link.folder.category).head = link.next,
        }

        if let Some(next) = link.next {
            if let Some(Linkage::Linked(next_link)) = arena.get_mut(next).map(|e| &mut e.linkage) {
                next_link.previous = link.previous;
            }
        }

        if let Some(entity) = arena.get_mut(key) {
            entity.linkage = Linkage::Unlinked;
        }
        Ok(())
    }
}
