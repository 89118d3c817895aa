//! Sky component

use bitflags::bitflags;

use crate::ecs::component::Component;
use crate::foundation::codec::{CodecError, SceneReader, SceneWriter};

/// Sky rendering technique
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SkyType {
    /// Flat background colour
    #[default]
    Color,
    /// Cube map texture
    Cubemap,
    /// Analytic atmosphere driven by the sun
    Atmosphere,
}

bitflags! {
    /// Optional sky features
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SkyQualityFlags: u32 {
        /// Contribute to image based lighting
        const IMAGE_BASED_LIGHTING = 0x01;
        /// Render the sun disk
        const SUN_DISK             = 0x02;
        /// Render clouds
        const CLOUDS               = 0x04;
    }
}

/// Scene background and ambient source
#[derive(Debug, Clone, PartialEq)]
pub struct SkyComponent {
    /// Technique
    pub sky_type: SkyType,
    /// Brightness multiplier
    pub intensity: f32,
    /// Cube map path when `sky_type` is [`SkyType::Cubemap`]
    pub cubemap: String,
    /// Enabled features
    pub quality: SkyQualityFlags,
}

impl Default for SkyComponent {
    fn default() -> Self {
        Self {
            sky_type: SkyType::Color,
            intensity: 1.0,
            cubemap: String::new(),
            quality: SkyQualityFlags::IMAGE_BASED_LIGHTING,
        }
    }
}

impl Component for SkyComponent {
    const TYPE_NAME: &'static str = "Sky";

    fn write(&self, writer: &mut SceneWriter<'_>) -> Result<(), CodecError> {
        writer.write_u32(match self.sky_type {
            SkyType::Color => 0,
            SkyType::Cubemap => 1,
            SkyType::Atmosphere => 2,
        })?;
        writer.write_f32(self.intensity)?;
        writer.write_str(&self.cubemap)?;
        writer.write_u32(self.quality.bits())
    }

    fn read(&mut self, reader: &mut SceneReader<'_>) -> Result<(), CodecError> {
        self.sky_type = match reader.read_u32()? {
            1 => SkyType::Cubemap,
            2 => SkyType::Atmosphere,
            _ => SkyType::Color,
        };
        self.intensity = reader.read_f32()?;
        self.cubemap = reader.read_string()?;
        self.quality = SkyQualityFlags::from_bits_truncate(reader.read_u32()?);
        Ok(())
    }
}
