//! Map iteration
//!
//! [`EntityCursor`] is the explicit begin/next/end protocol used by callers
//! that mutate other state between steps; [`MapEntities`] wraps the same
//! walk as a borrowing [`Iterator`].
//!
//! Within a region, folders are read in ascending category order and each
//! folder from its head, so entities come out most recent first.

use crate::core::error::{CoreError, CoreResult};
use crate::ecs::entity::{Category, EntityArena, EntityKey};
use crate::spatial::map::Map;
use crate::spatial::region::RegionId;
use crate::spatial::walk::{EntityFilter, RegionWalk};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Position {
    region: RegionId,
    category: Category,
    entity: EntityKey,
}

/// Forward-only position in a filtered map walk
///
/// Two cursors are equal when they point at the same entity, or are both
/// at the end.
#[derive(Debug, Clone)]
pub struct EntityCursor {
    filter: EntityFilter,
    walk: RegionWalk,
    position: Option<Position>,
}

impl PartialEq for EntityCursor {
    fn eq(&self, other: &Self) -> bool {
        self.current() == other.current()
    }
}

impl EntityCursor {
    /// A cursor past the last entity
    pub fn end() -> Self {
        let filter = EntityFilter::all();
        Self {
            walk: filter.walk(),
            filter,
            position: None,
        }
    }

    fn begin(map: &Map, arena: &EntityArena, filter: EntityFilter) -> CoreResult<Self> {
        if let Some(aabb) = filter.aabb_filter() {
            if !map.is_valid(aabb) {
                return Err(CoreError::invariant(format!(
                    "query box {:?}..{:?} is outside the map",
                    aabb.min, aabb.max
                )));
            }
        }

        let mut cursor = Self {
            walk: filter.walk(),
            filter,
            position: None,
        };
        cursor.position = cursor.seek(map, arena, None);
        Ok(cursor)
    }

    /// Entity under the cursor, `None` at the end
    pub fn current(&self) -> Option<EntityKey> {
        self.position.map(|position| position.entity)
    }

    /// Whether the cursor is past the last entity
    pub fn is_end(&self) -> bool {
        self.position.is_none()
    }

    /// Filter the cursor was started with
    pub fn filter(&self) -> &EntityFilter {
        &self.filter
    }

    /// Step to the next matching entity.
    ///
    /// The step is computed from the links of the current entity, so it
    /// must still be in the map. To remove the current entity, step first.
    pub fn next(&mut self, map: &Map, arena: &EntityArena) -> CoreResult<Option<EntityKey>> {
        if self.is_end() {
            return Err(CoreError::invariant("entity cursor stepped past the end"));
        }
        self.position = self.seek(map, arena, self.position);
        Ok(self.current())
    }

    fn seek(&self, map: &Map, arena: &EntityArena, from: Option<Position>) -> Option<Position> {
        let mut candidate = self.step(map, arena, from);
        while let Some(position) = candidate {
            let accepted = arena
                .get(position.entity)
                .is_some_and(|entity| self.filter.accepts_entity(entity));
            if accepted {
                return Some(position);
            }
            candidate = self.step(map, arena, Some(position));
        }
        None
    }

    fn step(&self, map: &Map, arena: &EntityArena, from: Option<Position>) -> Option<Position> {
        let (mut region, mut first_category) = match from {
            None => (self.walk.first(map)?, 0),
            Some(position) => {
                if let Some(next) = arena.get(position.entity).and_then(|entity| entity.next()) {
                    return Some(Position { entity: next, ..position });
                }
                (position.region, position.category.index() + 1)
            }
        };

        loop {
            if let Some(position) = self.first_in_region(map, region, first_category) {
                return Some(position);
            }
            region = self.walk.next(map, region)?;
            first_category = 0;
        }
    }

    fn first_in_region(&self, map: &Map, region: RegionId, first_category: usize) -> Option<Position> {
        let cell = map.region(region)?;
        Category::ALL
            .iter()
            .skip(first_category)
            .filter(|category| self.filter.accepts_category(**category))
            .find_map(|category| {
                cell.folder(*category).head().map(|entity| Position {
                    region,
                    category: *category,
                    entity,
                })
            })
    }
}

/// Borrowing iterator over the entities matching a filter
pub struct MapEntities<'a> {
    map: &'a Map,
    arena: &'a EntityArena,
    cursor: EntityCursor,
}

impl Iterator for MapEntities<'_> {
    type Item = EntityKey;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.cursor.current()?;
        self.cursor.position = self.cursor.seek(self.map, self.arena, self.cursor.position);
        Some(current)
    }
}

impl Map {
    /// Cursor at the first entity matching `filter`.
    ///
    /// Fails if the filter's AABB reaches outside the map.
    pub fn entities_begin(&self, arena: &EntityArena, filter: EntityFilter) -> CoreResult<EntityCursor> {
        EntityCursor::begin(self, arena, filter)
    }

    /// Cursor past the last entity, for comparisons
    pub fn entities_end(&self) -> EntityCursor {
        EntityCursor::end()
    }

    /// Step a cursor; see [`EntityCursor::next`]
    pub fn entities_next(&self, arena: &EntityArena, cursor: &mut EntityCursor) -> CoreResult<Option<EntityKey>> {
        cursor.next(self, arena)
    }

    /// Iterator over the entities matching `filter`
    pub fn entities<'a>(&'a self, arena: &'a EntityArena, filter: EntityFilter) -> CoreResult<MapEntities<'a>> {
        Ok(MapEntities {
            map: self,
            arena,
            cursor: EntityCursor::begin(self, arena, filter)?,
        })
    }
}
