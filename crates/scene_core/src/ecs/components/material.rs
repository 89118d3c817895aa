//! Surface material component

use crate::ecs::component::Component;
use crate::foundation::codec::{CodecError, SceneReader, SceneWriter};
use crate::foundation::math::Vec4;

/// Physically based surface description
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialComponent {
    /// Material name
    pub name: String,
    /// Linear RGBA base colour
    pub albedo: Vec4,
    /// Perceptual roughness, 0..1
    pub roughness: f32,
    /// Metalness, 0..1
    pub metalness: f32,
    /// Dielectric reflectance, 0..1
    pub reflectance: f32,
    /// Base colour texture
    pub albedo_texture: Option<String>,
    /// Tangent space normal texture
    pub normal_texture: Option<String>,
    /// Packed roughness/metalness texture
    pub surface_texture: Option<String>,
}

impl Default for MaterialComponent {
    fn default() -> Self {
        Self {
            name: String::new(),
            albedo: Vec4::new(1.0, 1.0, 1.0, 1.0),
            roughness: 0.5,
            metalness: 0.0,
            reflectance: 0.5,
            albedo_texture: None,
            normal_texture: None,
            surface_texture: None,
        }
    }
}

impl MaterialComponent {
    /// Named material with a flat colour
    pub fn new(name: impl Into<String>, albedo: Vec4) -> Self {
        Self {
            name: name.into(),
            albedo,
            ..Self::default()
        }
    }

    /// Builder for roughness and metalness, both clamped to 0..1
    pub fn with_surface(mut self, roughness: f32, metalness: f32) -> Self {
        self.roughness = roughness.clamp(0.0, 1.0);
        self.metalness = metalness.clamp(0.0, 1.0);
        self
    }

    /// Whether the albedo alpha needs blending
    pub fn is_transparent(&self) -> bool {
        self.albedo.w < 1.0
    }
}

fn write_path(writer: &mut SceneWriter<'_>, path: Option<&String>) -> Result<(), CodecError> {
    writer.write_bool(path.is_some())?;
    match path {
        Some(path) => writer.write_str(path),
        None => Ok(()),
    }
}

fn read_path(reader: &mut SceneReader<'_>) -> Result<Option<String>, CodecError> {
    if reader.read_bool()? {
        reader.read_string().map(Some)
    } else {
        Ok(None)
    }
}

impl Component for MaterialComponent {
    const TYPE_NAME: &'static str = "Material";

    fn write(&self, writer: &mut SceneWriter<'_>) -> Result<(), CodecError> {
        writer.write_str(&self.name)?;
        writer.write_vec4(&self.albedo)?;
        writer.write_f32(self.roughness)?;
        writer.write_f32(self.metalness)?;
        writer.write_f32(self.reflectance)?;
        write_path(writer, self.albedo_texture.as_ref())?;
        write_path(writer, self.normal_texture.as_ref())?;
        write_path(writer, self.surface_texture.as_ref())
    }

    fn read(&mut self, reader: &mut SceneReader<'_>) -> Result<(), CodecError> {
        self.name = reader.read_string()?;
        self.albedo = reader.read_vec4()?;
        self.roughness = reader.read_f32()?;
        self.metalness = reader.read_f32()?;
        self.reflectance = reader.read_f32()?;
        self.albedo_texture = read_path(reader)?;
        self.normal_texture = read_path(reader)?;
        self.surface_texture = read_path(reader)?;
        Ok(())
    }
}
