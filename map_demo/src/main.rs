//! Region map demo
//!
//! Builds a small scene, moves a few dynamic entities across region
//! borders for several frames and reports what a camera above the scene
//! would see. Pass a `.toml` or `.ron` config path to change the map size.
//!
//! ```text
//! cargo run -p map_demo -- map_demo/scene.toml
//! ```

use std::cell::Cell;
use std::rc::Rc;

use log::{info, warn};
use scene_core::ecs::components::{LightFactory, MeshComponent, SunComponent};
use scene_core::foundation::codec::{SceneReader, SceneWriter};
use scene_core::foundation::logging;
use scene_core::prelude::*;

const FRAMES: u32 = 6;

fn load_config() -> SceneCoreConfig {
    let Some(path) = std::env::args().nth(1) else {
        return SceneCoreConfig::default();
    };
    match SceneCoreConfig::load_from_file(&path) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("Could not load {path}: {error}; using defaults");
            SceneCoreConfig::default()
        }
    }
}

fn spawn(world: &mut World, category: Category, position: Vec3) -> Result<EntityKey, CoreError> {
    let key = world.create_entity(
        EntityDescriptor::new(category)
            .with_facets(FacetFlags::HIERARCHY | FacetFlags::TRANSFORMATION | FacetFlags::COMPONENTS),
    );
    if let Some(facet) = world
        .entities_mut()
        .entity_mut(key)
        .and_then(|entity| entity.transformation_facet_mut())
    {
        facet.set_position(position);
    }
    world.mark_entity_as_dirty(key, EntityDirtyFlags::CREATE | EntityDirtyFlags::ADD)?;
    Ok(key)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config();
    config.validate()?;
    logging::init_with_level(&config.log_level);

    let mut world = World::from_config(&config)?;
    let meters_x = world.map().number_of_meters_x() as f32;
    let meters_y = world.map().number_of_meters_y() as f32;

    let created = Rc::new(Cell::new(0_u32));
    let counter = Rc::clone(&created);
    world.components_mut().register_dirty_component_handler(move |entry| {
        if entry.dirty_flags().contains(DirtyFlags::CREATE) {
            counter.set(counter.get() + 1);
        }
        log::debug!("{} component {} is {:?}", entry.type_name(), entry.id(), entry.dirty_flags());
    });

    let moves = Rc::new(Cell::new(0_u32));
    let move_counter = Rc::clone(&moves);
    world.entities_mut().register_dirty_entity_handler(move |_, entity| {
        if entity.dirty_flags().contains(EntityDirtyFlags::MOVE) {
            move_counter.set(move_counter.get() + 1);
        }
    });

    // A row of static props with meshes
    for index in 0..6 {
        let position = Vec3::new(8.0 + index as f32 * 20.0, 16.0, 0.0);
        let prop = spawn(&mut world, Category::Static, position)?;
        let mesh = world.components_mut().allocate_with(MeshComponent::from_file("crate.obj", 0));
        world.attach_component(prop, mesh)?;
        world.components_mut().mark_component_as_dirty(mesh, DirtyFlags::CREATE);
    }

    // Lit drones that fly diagonally
    let mut drones = Vec::new();
    for index in 0..3 {
        let drone = spawn(&mut world, Category::Dynamic, Vec3::new(4.0, 4.0 + index as f32 * 10.0, 0.0))?;
        let light = world
            .components_mut()
            .allocate_with(LightFactory::point(Vec3::new(1.0, 0.9, 0.7), 2.0, 12.0));
        world.attach_component(drone, light)?;
        world.components_mut().mark_component_as_dirty(light, DirtyFlags::CREATE);
        drones.push(drone);
    }

    let sun = world.components_mut().allocate_with(SunComponent::new(
        Vec3::new(-0.3, -0.4, -1.0),
        Vec3::new(1.0, 0.95, 0.9),
        3.0,
    ));
    world.components_mut().mark_component_as_dirty(sun, DirtyFlags::CREATE);

    for _ in 0..FRAMES {
        world.advance_frame();
        for drone in &drones {
            let Some(facet) = world
                .entities_mut()
                .entity_mut(*drone)
                .and_then(|entity| entity.transformation_facet_mut())
            else {
                continue;
            };
            let next = facet.position() + Vec3::new(9.0, 7.0, 0.0);
            facet.set_position(Vec3::new(next.x.min(meters_x - 1.0), next.y.min(meters_y - 1.0), 0.0));
            world.mark_entity_as_dirty(*drone, EntityDirtyFlags::MOVE)?;
        }
    }

    let mut camera = Camera::from_config(&config.camera);
    let view = View::look_at(Vec3::new(48.0, 48.0, 60.0), Vec3::new(48.0, 48.0, 0.0), Vec3::y());
    camera.update(&view);

    let bounds = camera.world_aabb();
    let visible_area = Aabb3::new(
        Vec3::new(bounds.min.x.max(0.0), bounds.min.y.max(0.0), 0.0),
        Vec3::new(bounds.max.x.min(meters_x), bounds.max.y.min(meters_y), 0.0),
    );
    let visible = world.query(EntityFilter::aabb(visible_area))?.count();
    let nearby = world
        .query(EntityFilter::category_radius(Category::Dynamic, visible_area, Vec3::new(48.0, 48.0, 0.0), 40.0))?
        .count();

    info!(
        "{} entities in {} regions, {} components created, {} drone moves",
        world.map().number_of_entities(),
        world.map().number_of_regions(),
        created.get(),
        moves.get()
    );
    info!("Camera sees {} entities in its regions, {} drones within 40 m", visible, nearby);
    info!("Exposure EV100 {:.2}, frustum radius {:.1} m", camera.ev100(), camera.radius());

    let mut bytes = Vec::new();
    world.write(&mut SceneWriter::new(&mut bytes))?;

    let mut copy = World::from_config(&config)?;
    let mut source = bytes.as_slice();
    let keys = copy.read(&mut SceneReader::new(&mut source))?;
    for key in &keys {
        copy.mark_entity_as_dirty(*key, EntityDirtyFlags::ADD)?;
    }
    if copy.map().number_of_entities() == world.map().number_of_entities() {
        info!("Scene of {} bytes reloaded with {} entities", bytes.len(), keys.len());
    } else {
        warn!(
            "Reloaded scene holds {} entities, expected {}",
            copy.map().number_of_entities(),
            world.map().number_of_entities()
        );
    }

    world.components_mut().clear();
    world.free_map();
    Ok(())
}
