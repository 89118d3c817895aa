//! Binary scene codec
//!
//! Entities, facets and components persist themselves through a
//! [`SceneWriter`] / [`SceneReader`] pair. Fields are written in a fixed
//! order, little endian, with no length prefix on scalars. Strings carry a
//! `u32` byte length.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::foundation::math::{Aabb3, Mat4, Quat, Quaternion, Vec3, Vec4};

/// Codec errors
#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A string field was not valid UTF-8
    #[error("Invalid UTF-8 in string field")]
    InvalidUtf8,

    /// No factory registered for a persisted component type
    #[error("Unknown component type: {0}")]
    UnknownComponentType(String),

    /// A persisted link names an entity id that was never read
    #[error("Unresolved entity id: {0}")]
    UnresolvedEntity(u64),
}

/// Writes scene data to any byte sink
pub struct SceneWriter<'a> {
    inner: &'a mut dyn Write,
}

impl<'a> SceneWriter<'a> {
    /// Wrap a byte sink
    pub fn new(inner: &'a mut dyn Write) -> Self {
        Self { inner }
    }

    /// Write a boolean as a single byte
    pub fn write_bool(&mut self, value: bool) -> Result<(), CodecError> {
        self.inner.write_u8(u8::from(value))?;
        Ok(())
    }

    /// Write an unsigned 32-bit integer
    pub fn write_u32(&mut self, value: u32) -> Result<(), CodecError> {
        self.inner.write_u32::<LittleEndian>(value)?;
        Ok(())
    }

    /// Write an unsigned 64-bit integer
    pub fn write_u64(&mut self, value: u64) -> Result<(), CodecError> {
        self.inner.write_u64::<LittleEndian>(value)?;
        Ok(())
    }

    /// Write a 32-bit float
    pub fn write_f32(&mut self, value: f32) -> Result<(), CodecError> {
        self.inner.write_f32::<LittleEndian>(value)?;
        Ok(())
    }

    /// Write a length-prefixed UTF-8 string
    pub fn write_str(&mut self, value: &str) -> Result<(), CodecError> {
        self.write_u32(value.len() as u32)?;
        self.inner.write_all(value.as_bytes())?;
        Ok(())
    }

    /// Write three floats
    pub fn write_vec3(&mut self, value: &Vec3) -> Result<(), CodecError> {
        for component in value.iter() {
            self.write_f32(*component)?;
        }
        Ok(())
    }

    /// Write four floats
    pub fn write_vec4(&mut self, value: &Vec4) -> Result<(), CodecError> {
        for component in value.iter() {
            self.write_f32(*component)?;
        }
        Ok(())
    }

    /// Write a quaternion as `i j k w`
    pub fn write_quat(&mut self, value: &Quat) -> Result<(), CodecError> {
        self.write_vec4(&value.coords)
    }

    /// Write sixteen floats, column major
    pub fn write_mat4(&mut self, value: &Mat4) -> Result<(), CodecError> {
        for component in value.iter() {
            self.write_f32(*component)?;
        }
        Ok(())
    }

    /// Write min then max corner
    pub fn write_aabb3(&mut self, value: &Aabb3) -> Result<(), CodecError> {
        self.write_vec3(&value.min)?;
        self.write_vec3(&value.max)
    }
}

/// Reads scene data from any byte source
pub struct SceneReader<'a> {
    inner: &'a mut dyn Read,
}

impl<'a> SceneReader<'a> {
    /// Wrap a byte source
    pub fn new(inner: &'a mut dyn Read) -> Self {
        Self { inner }
    }

    /// Read a single-byte boolean
    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        Ok(self.inner.read_u8()? != 0)
    }

    /// Read an unsigned 32-bit integer
    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        Ok(self.inner.read_u32::<LittleEndian>()?)
    }

    /// Read an unsigned 64-bit integer
    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        Ok(self.inner.read_u64::<LittleEndian>()?)
    }

    /// Read a 32-bit float
    pub fn read_f32(&mut self) -> Result<f32, CodecError> {
        Ok(self.inner.read_f32::<LittleEndian>()?)
    }

    /// Read a length-prefixed UTF-8 string
    pub fn read_string(&mut self) -> Result<String, CodecError> {
        let length = self.read_u32()?;
        let mut bytes = Vec::new();
        Read::take(&mut *self.inner, u64::from(length)).read_to_end(&mut bytes)?;
        if bytes.len() != length as usize {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }
        String::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)
    }

    /// Read three floats
    pub fn read_vec3(&mut self) -> Result<Vec3, CodecError> {
        Ok(Vec3::new(self.read_f32()?, self.read_f32()?, self.read_f32()?))
    }

    /// Read four floats
    pub fn read_vec4(&mut self) -> Result<Vec4, CodecError> {
        Ok(Vec4::new(
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
        ))
    }

    /// Read a quaternion stored as `i j k w`
    pub fn read_quat(&mut self) -> Result<Quat, CodecError> {
        let coords = self.read_vec4()?;
        Ok(Quat::new_normalize(Quaternion::from(coords)))
    }

    /// Read sixteen floats, column major
    pub fn read_mat4(&mut self) -> Result<Mat4, CodecError> {
        let mut values = [0.0_f32; 16];
        for value in &mut values {
            *value = self.read_f32()?;
        }
        Ok(Mat4::from_column_slice(&values))
    }

    /// Read min then max corner
    pub fn read_aabb3(&mut self) -> Result<Aabb3, CodecError> {
        let min = self.read_vec3()?;
        let max = self.read_vec3()?;
        Ok(Aabb3::new(min, max))
    }
}
