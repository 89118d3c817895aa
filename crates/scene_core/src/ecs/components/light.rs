//! Point light component
//!
//! Pure data: colour, intensity and shape parameters of a punctual light.
//! Renderers subscribe to the dirty bus and keep their own light object in
//! the graphic facet.

use crate::ecs::component::Component;
use crate::foundation::codec::{CodecError, SceneReader, SceneWriter};
use crate::foundation::math::{utils, Vec3};

/// When a renderer should refresh the light's shadow data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshMode {
    /// Every frame
    #[default]
    Realtime,
    /// Only when marked dirty
    OnDemand,
    /// Never after creation
    Baked,
}

impl RefreshMode {
    pub(crate) fn to_u32(self) -> u32 {
        match self {
            Self::Realtime => 0,
            Self::OnDemand => 1,
            Self::Baked => 2,
        }
    }

    pub(crate) fn from_u32(value: u32) -> Self {
        match value {
            1 => Self::OnDemand,
            2 => Self::Baked,
            _ => Self::Realtime,
        }
    }
}

/// Shadow technique
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShadowType {
    /// No shadows
    #[default]
    None,
    /// Hard-edged shadows
    Hard,
    /// Filtered shadows
    Soft,
}

impl ShadowType {
    fn to_u32(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Hard => 1,
            Self::Soft => 2,
        }
    }

    fn from_u32(value: u32) -> Self {
        match value {
            1 => Self::Hard,
            2 => Self::Soft,
            _ => Self::None,
        }
    }
}

/// Point or spot light. A spot light is a point light whose outer cone is
/// narrower than a half turn.
#[derive(Debug, Clone, PartialEq)]
pub struct PointLightComponent {
    /// Linear RGB colour
    pub color: Vec3,
    /// Luminous intensity multiplier
    pub intensity: f32,
    /// Colour temperature in kelvin
    pub temperature: f32,
    /// Distance at which the light fades out completely
    pub attenuation_radius: f32,
    /// Inner cone angle in degrees
    pub inner_angle: f32,
    /// Outer cone angle in degrees
    pub outer_angle: f32,
    /// Shadow refresh policy
    pub refresh_mode: RefreshMode,
    /// Shadow technique
    pub shadow_type: ShadowType,
    /// Shadow map resolution level
    pub shadow_quality: u32,
    inverse_square_radius: f32,
    angle_scale: f32,
    angle_offset: f32,
}

impl Default for PointLightComponent {
    fn default() -> Self {
        let mut light = Self {
            color: Vec3::new(1.0, 1.0, 1.0),
            intensity: 1.0,
            temperature: 6500.0,
            attenuation_radius: 10.0,
            inner_angle: 180.0,
            outer_angle: 180.0,
            refresh_mode: RefreshMode::default(),
            shadow_type: ShadowType::default(),
            shadow_quality: 1,
            inverse_square_radius: 0.0,
            angle_scale: 0.0,
            angle_offset: 0.0,
        };
        light.update_lightness();
        light
    }
}

impl PointLightComponent {
    /// Recompute the cached attenuation and cone terms after changing the
    /// radius or the cone angles
    pub fn update_lightness(&mut self) {
        let radius = self.attenuation_radius.max(f32::EPSILON);
        self.inverse_square_radius = 1.0 / (radius * radius);

        let outer = self.outer_angle.clamp(0.0, 180.0);
        let inner = self.inner_angle.clamp(0.0, outer);
        let cos_outer = (utils::deg_to_rad(outer) * 0.5).cos();
        let cos_inner = (utils::deg_to_rad(inner) * 0.5).cos();
        self.angle_scale = 1.0 / (cos_inner - cos_outer).max(1e-4);
        self.angle_offset = -cos_outer * self.angle_scale;
    }

    /// `1 / radius²`
    pub fn inverse_square_radius(&self) -> f32 {
        self.inverse_square_radius
    }

    /// Cone falloff scale
    pub fn angle_scale(&self) -> f32 {
        self.angle_scale
    }

    /// Cone falloff offset
    pub fn angle_offset(&self) -> f32 {
        self.angle_offset
    }

    /// Whether the cone is narrower than a full sphere
    pub fn is_spot(&self) -> bool {
        self.outer_angle < 180.0
    }
}

impl Component for PointLightComponent {
    const TYPE_NAME: &'static str = "PointLight";

    fn write(&self, writer: &mut SceneWriter<'_>) -> Result<(), CodecError> {
        writer.write_vec3(&self.color)?;
        writer.write_f32(self.intensity)?;
        writer.write_f32(self.temperature)?;
        writer.write_f32(self.attenuation_radius)?;
        writer.write_f32(self.inner_angle)?;
        writer.write_f32(self.outer_angle)?;
        writer.write_u32(self.refresh_mode.to_u32())?;
        writer.write_u32(self.shadow_type.to_u32())?;
        writer.write_u32(self.shadow_quality)
    }

    fn read(&mut self, reader: &mut SceneReader<'_>) -> Result<(), CodecError> {
        self.color = reader.read_vec3()?;
        self.intensity = reader.read_f32()?;
        self.temperature = reader.read_f32()?;
        self.attenuation_radius = reader.read_f32()?;
        self.inner_angle = reader.read_f32()?;
        self.outer_angle = reader.read_f32()?;
        self.refresh_mode = RefreshMode::from_u32(reader.read_u32()?);
        self.shadow_type = ShadowType::from_u32(reader.read_u32()?);
        self.shadow_quality = reader.read_u32()?;
        self.update_lightness();
        Ok(())
    }
}

/// Constructors for common light setups
pub struct LightFactory;

impl LightFactory {
    /// Omnidirectional light
    pub fn point(color: Vec3, intensity: f32, radius: f32) -> PointLightComponent {
        let mut light = PointLightComponent {
            color,
            intensity,
            attenuation_radius: radius,
            ..PointLightComponent::default()
        };
        light.update_lightness();
        light
    }

    /// Cone light; angles in degrees
    pub fn spot(color: Vec3, intensity: f32, radius: f32, inner_angle: f32, outer_angle: f32) -> PointLightComponent {
        let mut light = PointLightComponent {
            color,
            intensity,
            attenuation_radius: radius,
            inner_angle,
            outer_angle,
            shadow_type: ShadowType::Soft,
            ..PointLightComponent::default()
        };
        light.update_lightness();
        light
    }
}
