//! Directional sun light

use crate::ecs::component::Component;
use crate::ecs::components::light::RefreshMode;
use crate::foundation::codec::{CodecError, SceneReader, SceneWriter};
use crate::foundation::math::Vec3;

/// Infinitely distant light with parallel rays
#[derive(Debug, Clone, PartialEq)]
pub struct SunComponent {
    /// Direction the light travels, normalized
    pub direction: Vec3,
    /// Linear RGB colour
    pub color: Vec3,
    /// Illuminance multiplier
    pub intensity: f32,
    /// Colour temperature in kelvin
    pub temperature: f32,
    /// Shadow refresh policy
    pub refresh_mode: RefreshMode,
}

impl Default for SunComponent {
    fn default() -> Self {
        Self {
            direction: Vec3::new(0.0, 0.0, -1.0),
            color: Vec3::new(1.0, 1.0, 1.0),
            intensity: 1.0,
            temperature: 5500.0,
            refresh_mode: RefreshMode::Realtime,
        }
    }
}

impl SunComponent {
    /// Sun shining along `direction`
    pub fn new(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            direction: direction.try_normalize(f32::EPSILON).unwrap_or(Vec3::new(0.0, 0.0, -1.0)),
            color,
            intensity,
            ..Self::default()
        }
    }
}

impl Component for SunComponent {
    const TYPE_NAME: &'static str = "Sun";

    fn write(&self, writer: &mut SceneWriter<'_>) -> Result<(), CodecError> {
        writer.write_vec3(&self.direction)?;
        writer.write_vec3(&self.color)?;
        writer.write_f32(self.intensity)?;
        writer.write_f32(self.temperature)?;
        writer.write_u32(self.refresh_mode.to_u32())
    }

    fn read(&mut self, reader: &mut SceneReader<'_>) -> Result<(), CodecError> {
        self.direction = reader.read_vec3()?;
        self.color = reader.read_vec3()?;
        self.intensity = reader.read_f32()?;
        self.temperature = reader.read_f32()?;
        self.refresh_mode = RefreshMode::from_u32(reader.read_u32()?);
        Ok(())
    }
}
