//! Concrete component types
//!
//! Plain data populated from already-parsed fields. Systems interpret them
//! through the dirty bus; none of them carries behavior beyond derived
//! values.

pub mod camera;
pub mod fog;
pub mod light;
pub mod material;
pub mod mesh;
pub mod sky;
pub mod sun;

pub use camera::{CameraComponent, ClearFlags};
pub use fog::VolumeFogComponent;
pub use light::{LightFactory, PointLightComponent, RefreshMode, ShadowType};
pub use material::MaterialComponent;
pub use mesh::{MeshComponent, MeshGeneratorFlags, MeshType};
pub use sky::{SkyComponent, SkyQualityFlags, SkyType};
pub use sun::SunComponent;

use crate::ecs::component_manager::ComponentManager;

/// Register every built-in component type so scenes holding them can be read
pub fn register_all(components: &mut ComponentManager) {
    components.register::<PointLightComponent>();
    components.register::<SunComponent>();
    components.register::<MaterialComponent>();
    components.register::<MeshComponent>();
    components.register::<SkyComponent>();
    components.register::<VolumeFogComponent>();
    components.register::<CameraComponent>();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::component::Component;

    #[test]
    fn test_register_all_names() {
        let mut components = ComponentManager::new();
        register_all(&mut components);
        for name in [
            PointLightComponent::TYPE_NAME,
            SunComponent::TYPE_NAME,
            MaterialComponent::TYPE_NAME,
            MeshComponent::TYPE_NAME,
            SkyComponent::TYPE_NAME,
            VolumeFogComponent::TYPE_NAME,
            CameraComponent::TYPE_NAME,
        ] {
            assert!(components.is_registered(name), "{name} not registered");
        }
    }
}
