//! Volumetric fog component

use crate::ecs::component::Component;
use crate::foundation::codec::{CodecError, SceneReader, SceneWriter};
use crate::foundation::math::Vec3;

/// Participating medium filling the camera frustum
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeFogComponent {
    /// Wind direction, normalized
    pub wind_direction: Vec3,
    /// Wind speed in meters per second
    pub wind_speed: f32,
    /// Linear RGB fog colour
    pub color: Vec3,
    /// Fog colour intensity
    pub intensity: f32,
    /// Distance covered by the froxel grid
    pub frustum_depth: f32,
    /// Darkening inside shadowed fog, 0..1
    pub shadow_intensity: f32,
    /// Scattering coefficient
    pub scattering: f32,
    /// Absorption coefficient
    pub absorption: f32,
    /// Base density
    pub density_level: f32,
    /// Density falloff with height
    pub density_attenuation: f32,
}

impl Default for VolumeFogComponent {
    fn default() -> Self {
        Self {
            wind_direction: Vec3::new(1.0, 0.0, 0.0),
            wind_speed: 0.0,
            color: Vec3::new(1.0, 1.0, 1.0),
            intensity: 1.0,
            frustum_depth: 64.0,
            shadow_intensity: 1.0,
            scattering: 0.5,
            absorption: 0.1,
            density_level: 0.1,
            density_attenuation: 0.0,
        }
    }
}

impl VolumeFogComponent {
    /// Scattering plus absorption
    pub fn extinction(&self) -> f32 {
        self.scattering + self.absorption
    }

    /// Density at `height` meters above the fog base
    pub fn density_at(&self, height: f32) -> f32 {
        self.density_level * (-self.density_attenuation * height.max(0.0)).exp()
    }
}

impl Component for VolumeFogComponent {
    const TYPE_NAME: &'static str = "VolumeFog";

    fn write(&self, writer: &mut SceneWriter<'_>) -> Result<(), CodecError> {
        writer.write_vec3(&self.wind_direction)?;
        writer.write_f32(self.wind_speed)?;
        writer.write_vec3(&self.color)?;
        writer.write_f32(self.intensity)?;
        writer.write_f32(self.frustum_depth)?;
        writer.write_f32(self.shadow_intensity)?;
        writer.write_f32(self.scattering)?;
        writer.write_f32(self.absorption)?;
        writer.write_f32(self.density_level)?;
        writer.write_f32(self.density_attenuation)
    }

    fn read(&mut self, reader: &mut SceneReader<'_>) -> Result<(), CodecError> {
        self.wind_direction = reader.read_vec3()?;
        self.wind_speed = reader.read_f32()?;
        self.color = reader.read_vec3()?;
        self.intensity = reader.read_f32()?;
        self.frustum_depth = reader.read_f32()?;
        self.shadow_intensity = reader.read_f32()?;
        self.scattering = reader.read_f32()?;
        self.absorption = reader.read_f32()?;
        self.density_level = reader.read_f32()?;
        self.density_attenuation = reader.read_f32()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_density_falls_off_with_height() {
        let fog = VolumeFogComponent {
            density_level: 0.2,
            density_attenuation: 0.5,
            ..VolumeFogComponent::default()
        };
        assert_relative_eq!(fog.density_at(0.0), 0.2);
        assert_relative_eq!(fog.density_at(-3.0), 0.2);
        assert_relative_eq!(fog.density_at(2.0), 0.2 * (-1.0_f32).exp());
        assert_relative_eq!(fog.extinction(), 0.6);
    }
}
