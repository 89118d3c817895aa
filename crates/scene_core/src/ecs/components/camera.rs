//! Camera component
//!
//! Stores the authored camera parameters; [`CameraComponent::apply`] turns
//! them into a render [`Camera`].

use bitflags::bitflags;

use crate::ecs::component::Component;
use crate::ecs::entity::LayerFlags;
use crate::foundation::codec::{CodecError, SceneReader, SceneWriter};
use crate::foundation::math::{Aabb2, Vec2, Vec4};
use crate::render::camera::{Camera, CameraMode, Exposure, ProjectionType};

bitflags! {
    /// What is cleared before the camera renders
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ClearFlags: u32 {
        /// Fill with the background colour
        const COLOR = 0x01;
        /// Reset depth
        const DEPTH = 0x02;
        /// Draw the sky
        const SKY   = 0x04;
    }
}

/// Authored camera parameters
#[derive(Debug, Clone, PartialEq)]
pub struct CameraComponent {
    /// Projection family
    pub projection_type: ProjectionType,
    /// Vertical field of view in degrees, perspective only
    pub fov_y_degrees: f32,
    /// Vertical extent in meters, orthographic only
    pub size: f32,
    /// Near plane distance
    pub near: f32,
    /// Far plane distance
    pub far: f32,
    /// Exposure driver
    pub mode: CameraMode,
    /// Physical exposure parameters
    pub exposure: Exposure,
    /// Buffers cleared before rendering
    pub clear_flags: ClearFlags,
    /// Clear colour
    pub background: Vec4,
    /// Rendered layers
    pub culling_mask: LayerFlags,
    /// Normalized viewport
    pub viewport: Aabb2,
    /// Draw order among cameras
    pub depth: i32,
}

impl Default for CameraComponent {
    fn default() -> Self {
        Self {
            projection_type: ProjectionType::Perspective,
            fov_y_degrees: 60.0,
            size: 10.0,
            near: 0.1,
            far: 1000.0,
            mode: CameraMode::Auto,
            exposure: Exposure::default(),
            clear_flags: ClearFlags::COLOR | ClearFlags::DEPTH,
            background: Vec4::new(0.0, 0.0, 0.0, 1.0),
            culling_mask: LayerFlags::all(),
            viewport: Aabb2::default(),
            depth: 0,
        }
    }
}

impl CameraComponent {
    /// Configure `camera` for a render target of the given aspect ratio
    pub fn apply(&self, camera: &mut Camera, aspect: f32) {
        match self.projection_type {
            ProjectionType::Perspective => camera.set_field_of_view(self.fov_y_degrees, aspect, self.near, self.far),
            ProjectionType::Orthographic => {
                camera.set_orthographic_size(self.size * aspect, self.size, self.near, self.far);
            }
        }
        camera.set_mode(self.mode);
        camera.set_exposure(self.exposure);
        camera.set_culling_mask(self.culling_mask);
        camera.set_viewport(self.viewport.min, self.viewport.max);
        camera.set_depth(self.depth);
        camera.set_background(self.background);
    }
}

impl Component for CameraComponent {
    const TYPE_NAME: &'static str = "Camera";

    fn write(&self, writer: &mut SceneWriter<'_>) -> Result<(), CodecError> {
        writer.write_bool(self.projection_type == ProjectionType::Orthographic)?;
        writer.write_f32(self.fov_y_degrees)?;
        writer.write_f32(self.size)?;
        writer.write_f32(self.near)?;
        writer.write_f32(self.far)?;
        writer.write_bool(self.mode == CameraMode::Manual)?;
        writer.write_f32(self.exposure.aperture)?;
        writer.write_f32(self.exposure.shutter_speed)?;
        writer.write_f32(self.exposure.iso)?;
        writer.write_f32(self.exposure.compensation)?;
        writer.write_u32(self.clear_flags.bits())?;
        writer.write_vec4(&self.background)?;
        writer.write_u32(u32::from(self.culling_mask.bits()))?;
        writer.write_vec4(&Vec4::new(
            self.viewport.min.x,
            self.viewport.min.y,
            self.viewport.max.x,
            self.viewport.max.y,
        ))?;
        writer.write_u32(self.depth as u32)
    }

    fn read(&mut self, reader: &mut SceneReader<'_>) -> Result<(), CodecError> {
        self.projection_type = if reader.read_bool()? {
            ProjectionType::Orthographic
        } else {
            ProjectionType::Perspective
        };
        self.fov_y_degrees = reader.read_f32()?;
        self.size = reader.read_f32()?;
        self.near = reader.read_f32()?;
        self.far = reader.read_f32()?;
        self.mode = if reader.read_bool()? { CameraMode::Manual } else { CameraMode::Auto };
        self.exposure = Exposure {
            aperture: reader.read_f32()?,
            shutter_speed: reader.read_f32()?,
            iso: reader.read_f32()?,
            compensation: reader.read_f32()?,
        };
        self.clear_flags = ClearFlags::from_bits_truncate(reader.read_u32()?);
        self.background = reader.read_vec4()?;
        self.culling_mask = LayerFlags::from_bits_truncate(reader.read_u32()? as u8);
        let viewport = reader.read_vec4()?;
        self.viewport = Aabb2::new(Vec2::new(viewport.x, viewport.y), Vec2::new(viewport.z, viewport.w));
        self.depth = reader.read_u32()? as i32;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_apply_orthographic() {
        let component = CameraComponent {
            projection_type: ProjectionType::Orthographic,
            size: 4.0,
            near: 1.0,
            far: 20.0,
            depth: -3,
            ..CameraComponent::default()
        };
        let mut camera = Camera::default();
        component.apply(&mut camera, 2.0);

        assert_eq!(camera.projection_type(), ProjectionType::Orthographic);
        assert_relative_eq!(camera.width(), 8.0);
        assert_relative_eq!(camera.height(), 4.0);
        assert_eq!(camera.depth(), -3);
    }

    #[test]
    fn test_codec_keeps_negative_depth() {
        let component = CameraComponent {
            depth: -7,
            culling_mask: LayerFlags::UI,
            mode: CameraMode::Manual,
            ..CameraComponent::default()
        };
        let mut bytes = Vec::new();
        component.write(&mut SceneWriter::new(&mut bytes)).unwrap();

        let mut restored = CameraComponent::default();
        let mut source = bytes.as_slice();
        restored.read(&mut SceneReader::new(&mut source)).unwrap();
        assert_eq!(restored, component);
    }
}
