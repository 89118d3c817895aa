//! # Scene Core Configuration
//!
//! Settings for the region map and the default camera, loadable from TOML
//! or RON through the [`Config`] trait.
//!
//! ```toml
//! log_level = "info"
//!
//! [map]
//! regions_x = 4
//! regions_y = 4
//!
//! [camera]
//! fov_y_degrees = 60.0
//! aspect = 1.7777778
//! near = 0.1
//! far = 1000.0
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::spatial::region::{MAX_REGIONS_X, MAX_REGIONS_Y};

/// Configuration loading or validation failure
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The file could not be read or written
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The file contents are not valid for the format
    #[error("Parse error: {0}")]
    Parse(String),

    /// The settings could not be encoded
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Neither `.toml` nor `.ron`
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Values parsed but failed validation
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Toml,
    Ron,
}

impl Format {
    fn of(path: &str) -> Result<Self, ConfigError> {
        match Path::new(path).extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(Self::Toml),
            Some("ron") => Ok(Self::Ron),
            _ => Err(ConfigError::UnsupportedFormat(path.to_string())),
        }
    }
}

/// Settings that round-trip through a TOML or RON file; the format follows
/// the file extension
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load settings from `path`
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let format = Format::of(path)?;
        let contents = std::fs::read_to_string(path)?;
        match format {
            Format::Toml => toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
            Format::Ron => ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
        }
    }

    /// Save settings to `path`
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = match Format::of(path)? {
            Format::Toml => toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?,
            Format::Ron => ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?,
        };
        std::fs::write(path, contents)?;
        Ok(())
    }
}

/// # Map Configuration
///
/// Number of regions along each axis of the grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Regions along X
    pub regions_x: usize,
    /// Regions along Y
    pub regions_y: usize,
}

impl MapConfig {
    /// Create a map configuration
    pub fn new(regions_x: usize, regions_y: usize) -> Self {
        Self { regions_x, regions_y }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.regions_x == 0 || self.regions_y == 0 {
            return Err(ConfigError::Invalid("map must have at least one region per axis".to_string()));
        }
        if self.regions_x > MAX_REGIONS_X || self.regions_y > MAX_REGIONS_Y {
            return Err(ConfigError::Invalid(format!(
                "map of {}x{} regions exceeds the {}x{} maximum",
                self.regions_x, self.regions_y, MAX_REGIONS_X, MAX_REGIONS_Y
            )));
        }
        Ok(())
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Self::new(4, 4)
    }
}

/// # Camera Configuration
///
/// Projection and exposure parameters of the default camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Vertical field of view in degrees
    pub fov_y_degrees: f32,
    /// Width over height
    pub aspect: f32,
    /// Near plane distance
    pub near: f32,
    /// Far plane distance
    pub far: f32,
    /// Aperture as f-number
    pub aperture: f32,
    /// Shutter speed in seconds
    pub shutter_speed: f32,
    /// Sensor sensitivity
    pub iso: f32,
    /// Exposure compensation in stops
    pub exposure_compensation: f32,
}

impl CameraConfig {
    /// Set field of view in degrees
    pub fn with_fov(mut self, fov_y_degrees: f32) -> Self {
        self.fov_y_degrees = fov_y_degrees;
        self
    }

    /// Set clip planes
    pub fn with_clip_planes(mut self, near: f32, far: f32) -> Self {
        self.near = near;
        self.far = far;
        self
    }

    /// Set aspect ratio
    pub fn with_aspect(mut self, aspect: f32) -> Self {
        self.aspect = aspect;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.fov_y_degrees > 0.0 && self.fov_y_degrees < 180.0) {
            return Err(ConfigError::Invalid(format!(
                "field of view {} must be within (0, 180) degrees",
                self.fov_y_degrees
            )));
        }
        if self.aspect <= 0.0 {
            return Err(ConfigError::Invalid("aspect ratio must be positive".to_string()));
        }
        if self.near <= 0.0 {
            return Err(ConfigError::Invalid("near plane must be positive".to_string()));
        }
        if self.far <= self.near {
            return Err(ConfigError::Invalid("far plane must lie beyond the near plane".to_string()));
        }
        if self.aperture <= 0.0 || self.shutter_speed <= 0.0 || self.iso <= 0.0 {
            return Err(ConfigError::Invalid("exposure parameters must be positive".to_string()));
        }
        Ok(())
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_y_degrees: 60.0,
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
            aperture: 16.0,
            shutter_speed: 1.0 / 125.0,
            iso: 100.0,
            exposure_compensation: 0.0,
        }
    }
}

/// # Complete Scene Core Configuration
///
/// Top-level configuration read by applications at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneCoreConfig {
    /// Default log filter passed to the logger
    pub log_level: String,
    /// Region grid
    pub map: MapConfig,
    /// Default camera
    pub camera: CameraConfig,
}

impl SceneCoreConfig {
    /// Set log level
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Set map configuration
    pub fn with_map(mut self, map: MapConfig) -> Self {
        self.map = map;
        self
    }

    /// Set camera configuration
    pub fn with_camera(mut self, camera: CameraConfig) -> Self {
        self.camera = camera;
        self
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.map.validate()?;
        self.camera.validate()?;
        Ok(())
    }
}

impl Default for SceneCoreConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            map: MapConfig::default(),
            camera: CameraConfig::default(),
        }
    }
}

impl Config for SceneCoreConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(SceneCoreConfig::default().validate().is_ok());
    }

    #[test]
    fn test_map_limits() {
        assert!(MapConfig::new(0, 4).validate().is_err());
        assert!(MapConfig::new(MAX_REGIONS_X + 1, 1).validate().is_err());
        assert!(MapConfig::new(MAX_REGIONS_X, MAX_REGIONS_Y).validate().is_ok());
    }

    #[test]
    fn test_camera_clip_planes() {
        let camera = CameraConfig::default().with_clip_planes(10.0, 5.0);
        assert!(matches!(camera.validate(), Err(ConfigError::Invalid(_))));
        let camera = CameraConfig::default().with_clip_planes(0.0, 5.0);
        assert!(camera.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: SceneCoreConfig = toml::from_str("[map]\nregions_x = 8\n").unwrap();
        assert_eq!(config.map, MapConfig::new(8, 4));
        assert_eq!(config.camera, CameraConfig::default());
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_ron_round_trip() {
        let config = SceneCoreConfig::default()
            .with_log_level("debug")
            .with_map(MapConfig::new(2, 3))
            .with_camera(CameraConfig::default().with_fov(45.0).with_aspect(1.0));
        let text = ron::ser::to_string(&config).unwrap();
        let parsed: SceneCoreConfig = ron::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_file_round_trip() {
        let path = std::env::temp_dir().join(format!("scene_core_config_{}.toml", std::process::id()));
        let path = path.to_string_lossy().to_string();
        let config = SceneCoreConfig::default().with_map(MapConfig::new(6, 2));
        config.save_to_file(&path).unwrap();
        let loaded = SceneCoreConfig::load_from_file(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, config);
        assert!(matches!(
            SceneCoreConfig::load_from_file("scene.yaml"),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }
}
