//! Mesh reference component

use bitflags::bitflags;

use crate::ecs::component::Component;
use crate::foundation::codec::{CodecError, SceneReader, SceneWriter};

/// How the mesh is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MeshType {
    /// Loaded from a model file
    #[default]
    File,
    /// Built procedurally
    Generated,
}

bitflags! {
    /// Attributes to generate while loading
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MeshGeneratorFlags: u32 {
        /// Smooth vertex normals
        const NORMALS   = 0x01;
        /// Tangent frames for normal mapping
        const TANGENTS  = 0x02;
        /// Planar texture coordinates
        const TEXCOORDS = 0x04;
        /// Merge duplicate vertices
        const WELD      = 0x08;
    }
}

/// Reference to mesh data owned by the renderer
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MeshComponent {
    /// Model file
    pub file_name: String,
    /// Mesh inside the file
    pub mesh_index: u32,
    /// Source of the geometry
    pub mesh_type: MeshType,
    /// Attributes to generate
    pub generator_flags: MeshGeneratorFlags,
}

impl MeshComponent {
    /// Mesh `index` of a model file
    pub fn from_file(file_name: impl Into<String>, mesh_index: u32) -> Self {
        Self {
            file_name: file_name.into(),
            mesh_index,
            mesh_type: MeshType::File,
            generator_flags: MeshGeneratorFlags::NORMALS,
        }
    }
}

impl Component for MeshComponent {
    const TYPE_NAME: &'static str = "Mesh";

    fn write(&self, writer: &mut SceneWriter<'_>) -> Result<(), CodecError> {
        writer.write_str(&self.file_name)?;
        writer.write_u32(self.mesh_index)?;
        writer.write_u32(match self.mesh_type {
            MeshType::File => 0,
            MeshType::Generated => 1,
        })?;
        writer.write_u32(self.generator_flags.bits())
    }

    fn read(&mut self, reader: &mut SceneReader<'_>) -> Result<(), CodecError> {
        self.file_name = reader.read_string()?;
        self.mesh_index = reader.read_u32()?;
        self.mesh_type = match reader.read_u32()? {
            1 => MeshType::Generated,
            _ => MeshType::File,
        };
        self.generator_flags = MeshGeneratorFlags::from_bits_truncate(reader.read_u32()?);
        Ok(())
    }
}
