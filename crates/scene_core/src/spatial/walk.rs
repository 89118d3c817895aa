//! Entity filters and the region walk
//!
//! Every map query is one [`EntityFilter`]: an optional category, an
//! optional AABB and an optional circle, combined freely. The AABB selects
//! which regions are walked; the category selects which folders are read;
//! the circle rejects entities by squared distance.

use crate::ecs::entity::{Category, Entity};
use crate::foundation::math::{Aabb3, Vec3};
use crate::spatial::map::Map;
use crate::spatial::region::{RegionId, REGION_SIZE_X, REGION_SIZE_Y};

/// Squared-distance test around a center
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    /// Center of the circle
    pub center: Vec3,
    /// Radius squared
    pub square_radius: f32,
}

impl Circle {
    /// Circle from a radius
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self {
            center,
            square_radius: radius * radius,
        }
    }

    /// Whether `position` lies within the circle, bounds inclusive
    pub fn contains(&self, position: &Vec3) -> bool {
        (position - self.center).norm_squared() <= self.square_radius
    }
}

/// Selection applied while iterating the map
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EntityFilter {
    category: Option<Category>,
    aabb: Option<Aabb3>,
    circle: Option<Circle>,
}

impl EntityFilter {
    /// Every entity in the map
    pub fn all() -> Self {
        Self::default()
    }

    /// Entities of one category
    pub fn category(category: Category) -> Self {
        Self::all().with_category(category)
    }

    /// Entities in the regions overlapping `aabb`
    pub fn aabb(aabb: Aabb3) -> Self {
        Self::all().with_aabb(aabb)
    }

    /// Entities of one category in the regions overlapping `aabb`
    pub fn category_aabb(category: Category, aabb: Aabb3) -> Self {
        Self::aabb(aabb).with_category(category)
    }

    /// Entities in the regions overlapping `aabb` and within `radius` of `center`
    pub fn radius(aabb: Aabb3, center: Vec3, radius: f32) -> Self {
        Self::aabb(aabb).with_circle(Circle::new(center, radius))
    }

    /// [`EntityFilter::radius`] restricted to one category
    pub fn category_radius(category: Category, aabb: Aabb3, center: Vec3, radius: f32) -> Self {
        Self::radius(aabb, center, radius).with_category(category)
    }

    /// Restrict to a category
    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    /// Restrict to the regions overlapping `aabb`
    pub fn with_aabb(mut self, aabb: Aabb3) -> Self {
        self.aabb = Some(aabb);
        self
    }

    /// Restrict by squared distance
    pub fn with_circle(mut self, circle: Circle) -> Self {
        self.circle = Some(circle);
        self
    }

    /// Category restriction
    pub fn category_filter(&self) -> Option<Category> {
        self.category
    }

    /// AABB restriction
    pub fn aabb_filter(&self) -> Option<&Aabb3> {
        self.aabb.as_ref()
    }

    /// Circle restriction
    pub fn circle_filter(&self) -> Option<&Circle> {
        self.circle.as_ref()
    }

    /// Whether the folder of `category` is read
    pub fn accepts_category(&self, category: Category) -> bool {
        self.category.map_or(true, |wanted| wanted == category)
    }

    /// Whether an entity in a walked folder is yielded
    pub fn accepts_entity(&self, entity: &Entity) -> bool {
        self.circle
            .map_or(true, |circle| circle.contains(entity.world_position()))
    }

    pub(crate) fn walk(&self) -> RegionWalk {
        RegionWalk { bounds: self.aabb }
    }
}

/// Order in which regions are visited
///
/// Unbounded walks visit every region by index. Bounded walks start at the
/// region holding the AABB minimum, run right along the row while the next
/// region still starts inside the AABB, then continue on the next row from
/// the AABB's left column until the top edge is passed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct RegionWalk {
    bounds: Option<Aabb3>,
}

impl RegionWalk {
    pub(crate) fn first(&self, map: &Map) -> Option<RegionId> {
        if !map.has_map() {
            return None;
        }
        match &self.bounds {
            None => Some(0),
            Some(aabb) => map.region_index_by_position(aabb.min.x, aabb.min.y),
        }
    }

    pub(crate) fn next(&self, map: &Map, current: RegionId) -> Option<RegionId> {
        let Some(aabb) = &self.bounds else {
            let next = current + 1;
            return (next < map.number_of_regions()).then_some(next);
        };

        let regions_x = map.number_of_regions_x();
        let column = current % regions_x;
        let row = current / regions_x;
        let [origin_x, origin_y] = map.region(current)?.position();

        if ((origin_x + REGION_SIZE_X) as f32) < aabb.max.x && column + 1 < regions_x {
            Some(current + 1)
        } else if ((origin_y + REGION_SIZE_Y) as f32) < aabb.max.y && row + 1 < map.number_of_regions_y() {
            let first_column = map.region_index_by_position(aabb.min.x, aabb.min.y)? % regions_x;
            Some((row + 1) * regions_x + first_column)
        } else {
            None
        }
    }
}
