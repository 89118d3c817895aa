//! # Camera Frustum and Projection
//!
//! Holds projection bounds and derives everything renderers consume from
//! them: the projection matrix, the eight frustum corners in camera space,
//! and once per frame the world-space corners, their AABB and the
//! view-projection matrix for a given [`View`].
//!
//! ## Corner Indexing
//! Corners are addressed by OR-ing one constant of each axis:
//! `NEAR`/`FAR`, `LEFT`/`RIGHT`, `BOTTOM`/`TOP`. The far-right-top corner is
//! `FAR | RIGHT | TOP` = 7.
//!
//! ## Conventions
//! Right-handed camera space looking down -Z; projection matrices map depth
//! to [-1, 1].

use log::trace;

use crate::core::config::CameraConfig;
use crate::ecs::entity::LayerFlags;
use crate::foundation::math::{utils, Aabb2, Aabb3, Mat4, Mat4Ext, Vec2, Vec3, Vec4};
use crate::render::view::View;

/// Near plane corner bit (no bit set)
pub const NEAR: usize = 0;
/// Far plane corner bit
pub const FAR: usize = 4;
/// Left side corner bit (no bit set)
pub const LEFT: usize = 0;
/// Right side corner bit
pub const RIGHT: usize = 2;
/// Bottom side corner bit (no bit set)
pub const BOTTOM: usize = 0;
/// Top side corner bit
pub const TOP: usize = 1;

/// Smallest near distance used when deriving bounds from a field of view
const MIN_NEAR: f32 = 1e-6;

/// Projection family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProjectionType {
    /// Frustum diverging with distance
    #[default]
    Perspective,
    /// Box of constant cross section
    Orthographic,
}

/// Who drives the exposure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraMode {
    /// Exposure derived automatically by the renderer
    #[default]
    Auto,
    /// Exposure taken from the physical parameters
    Manual,
}

/// Physical exposure parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Exposure {
    /// Relative aperture (f-number)
    pub aperture: f32,
    /// Shutter time in seconds
    pub shutter_speed: f32,
    /// Sensor sensitivity
    pub iso: f32,
    /// Exposure compensation in stops
    pub compensation: f32,
}

impl Default for Exposure {
    fn default() -> Self {
        Self {
            aperture: 16.0,
            shutter_speed: 1.0 / 125.0,
            iso: 100.0,
            compensation: 0.0,
        }
    }
}

impl Exposure {
    /// Exposure value at ISO 100, compensation applied
    pub fn ev100(&self) -> f32 {
        let aperture = self.aperture * self.aperture;
        let ev = (aperture / self.shutter_speed.max(f32::EPSILON) * 100.0 / self.iso.max(f32::EPSILON)).log2();
        ev - self.compensation
    }
}

/// Frustum and projection of a camera
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    projection_type: ProjectionType,
    left: f32,
    right: f32,
    bottom: f32,
    top: f32,
    near: f32,
    far: f32,
    radius: f32,
    projection: Mat4,
    object_frustum: [Vec3; 8],
    world_frustum: [Vec3; 8],
    world_aabb: Aabb3,
    view_projection: Mat4,
    mode: CameraMode,
    exposure: Exposure,
    culling_mask: LayerFlags,
    viewport: Aabb2,
    depth: i32,
    background: Vec4,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            projection_type: ProjectionType::Perspective,
            left: 0.0,
            right: 0.0,
            bottom: 0.0,
            top: 0.0,
            near: 0.0,
            far: 0.0,
            radius: 0.0,
            projection: Mat4::identity(),
            object_frustum: [Vec3::zeros(); 8],
            world_frustum: [Vec3::zeros(); 8],
            world_aabb: Aabb3::default(),
            view_projection: Mat4::identity(),
            mode: CameraMode::Auto,
            exposure: Exposure::default(),
            culling_mask: LayerFlags::all(),
            viewport: Aabb2::default(),
            depth: 0,
            background: Vec4::new(0.0, 0.0, 0.0, 1.0),
        }
    }
}

fn frustum_corners(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32, far_scale: f32) -> [Vec3; 8] {
    std::array::from_fn(|index| {
        let x = if index & RIGHT != 0 { right } else { left };
        let y = if index & TOP != 0 { top } else { bottom };
        if index & FAR != 0 {
            Vec3::new(x * far_scale, y * far_scale, -far)
        } else {
            Vec3::new(x, y, -near)
        }
    })
}

impl Camera {
    /// Perspective camera configured from settings
    ///
    /// # Arguments
    /// * `config` - field of view, aspect ratio, clip planes and exposure
    ///
    /// # Example
    /// ```rust
    /// use scene_core::core::config::CameraConfig;
    /// use scene_core::render::Camera;
    ///
    /// let camera = Camera::from_config(&CameraConfig::default().with_fov(90.0).with_aspect(1.0));
    /// assert!((camera.fov_y() - 90.0).abs() < 1e-3);
    /// ```
    pub fn from_config(config: &CameraConfig) -> Self {
        let mut camera = Self {
            exposure: Exposure {
                aperture: config.aperture,
                shutter_speed: config.shutter_speed,
                iso: config.iso,
                compensation: config.exposure_compensation,
            },
            ..Self::default()
        };
        camera.set_field_of_view(config.fov_y_degrees, config.aspect, config.near, config.far);
        camera
    }

    /// Set an off-center perspective frustum
    ///
    /// Bounds are given on the near plane. Far corners are the near corners
    /// scaled by `far / near`; the bounding radius is the distance from the
    /// eye to the far-right-top corner.
    ///
    /// # Arguments
    /// * `left`, `right`, `bottom`, `top` - near plane bounds
    /// * `near` - near plane distance, positive
    /// * `far` - far plane distance, greater than `near`
    pub fn set_perspective(&mut self, left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) {
        self.projection_type = ProjectionType::Perspective;
        self.store_bounds(left, right, bottom, top, near, far);

        let far_scale = far / near.max(MIN_NEAR);
        self.object_frustum = frustum_corners(left, right, bottom, top, near, far, far_scale);
        self.radius = self.object_frustum[FAR | RIGHT | TOP].norm();
        self.projection = Mat4::frustum_rh(left, right, bottom, top, near, far);
        trace!("Perspective l={} r={} b={} t={} n={} f={}", left, right, bottom, top, near, far);
    }

    /// Set an orthographic box; far corners share the near bounds
    pub fn set_orthographic(&mut self, left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) {
        self.projection_type = ProjectionType::Orthographic;
        self.store_bounds(left, right, bottom, top, near, far);

        self.object_frustum = frustum_corners(left, right, bottom, top, near, far, 1.0);
        self.radius = self.object_frustum[FAR | RIGHT | TOP].norm();
        self.projection = Mat4::ortho_rh(left, right, bottom, top, near, far);
        trace!("Orthographic l={} r={} b={} t={} n={} f={}", left, right, bottom, top, near, far);
    }

    /// Centered perspective frustum from its near plane size
    pub fn set_perspective_size(&mut self, width: f32, height: f32, near: f32, far: f32) {
        let (half_width, half_height) = (width * 0.5, height * 0.5);
        self.set_perspective(-half_width, half_width, -half_height, half_height, near, far);
    }

    /// Centered orthographic box from its size
    pub fn set_orthographic_size(&mut self, width: f32, height: f32, near: f32, far: f32) {
        let (half_width, half_height) = (width * 0.5, height * 0.5);
        self.set_orthographic(-half_width, half_width, -half_height, half_height, near, far);
    }

    /// Symmetric perspective frustum from a vertical field of view
    ///
    /// `near` is clamped to a small positive value before the bounds are
    /// derived.
    ///
    /// # Arguments
    /// * `fov_y_degrees` - vertical field of view in degrees
    /// * `aspect` - width over height
    pub fn set_field_of_view(&mut self, fov_y_degrees: f32, aspect: f32, near: f32, far: f32) {
        let near = near.max(MIN_NEAR);
        let top = (utils::deg_to_rad(fov_y_degrees) * 0.5).tan() * near;
        let right = top * aspect;
        self.set_perspective(-right, right, -top, top, near, far);
    }

    /// Change the aspect ratio keeping the vertical bounds
    ///
    /// Left and right are recomputed from bottom and top and the whole
    /// projection is rebuilt, so corners and matrix stay consistent.
    pub fn set_aspect_ratio(&mut self, aspect: f32) {
        let (left, right) = (self.bottom * aspect, self.top * aspect);
        let (bottom, top, near, far) = (self.bottom, self.top, self.near, self.far);
        match self.projection_type {
            ProjectionType::Perspective => self.set_perspective(left, right, bottom, top, near, far),
            ProjectionType::Orthographic => self.set_orthographic(left, right, bottom, top, near, far),
        }
    }

    fn store_bounds(&mut self, left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) {
        self.left = left;
        self.right = right;
        self.bottom = bottom;
        self.top = top;
        self.near = near;
        self.far = far;
    }

    /// Bring the world-space frustum, its AABB and the view-projection
    /// matrix up to date with `view`. Call once per frame after the view
    /// moved.
    pub fn update(&mut self, view: &View) {
        let position = view.position();
        let rotation = view.rotation();
        self.world_frustum = self.object_frustum.map(|corner| position + rotation * corner);
        self.world_aabb = Aabb3::from_points(&self.world_frustum).unwrap_or_default();
        self.view_projection = self.projection * view.view_matrix();
        trace!("Camera world AABB {:?} .. {:?}", self.world_aabb.min, self.world_aabb.max);
    }

    /// Projection times view, as of the last [`Camera::update`]
    pub fn view_projection_matrix(&self) -> &Mat4 {
        &self.view_projection
    }

    /// Projection matrix
    pub fn projection_matrix(&self) -> &Mat4 {
        &self.projection
    }

    /// Current projection family
    pub fn projection_type(&self) -> ProjectionType {
        self.projection_type
    }

    /// Frustum corners in camera space
    pub fn object_space_frustum(&self) -> &[Vec3; 8] {
        &self.object_frustum
    }

    /// Frustum corners in world space, as of the last update
    pub fn world_space_frustum(&self) -> &[Vec3; 8] {
        &self.world_frustum
    }

    /// Bounds of the world-space frustum
    pub fn world_aabb(&self) -> &Aabb3 {
        &self.world_aabb
    }

    /// Left bound on the near plane
    pub fn left(&self) -> f32 {
        self.left
    }

    /// Right bound on the near plane
    pub fn right(&self) -> f32 {
        self.right
    }

    /// Bottom bound on the near plane
    pub fn bottom(&self) -> f32 {
        self.bottom
    }

    /// Top bound on the near plane
    pub fn top(&self) -> f32 {
        self.top
    }

    /// Near plane distance
    pub fn near(&self) -> f32 {
        self.near
    }

    /// Far plane distance
    pub fn far(&self) -> f32 {
        self.far
    }

    /// Distance from the eye to the farthest corner
    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Near plane width
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    /// Near plane height
    pub fn height(&self) -> f32 {
        self.top - self.bottom
    }

    /// Width over height; 0 before any projection is set
    pub fn aspect_ratio(&self) -> f32 {
        let height = self.height();
        if height == 0.0 {
            0.0
        } else {
            self.width() / height
        }
    }

    /// Vertical field of view in degrees; 0 for orthographic cameras
    pub fn fov_y(&self) -> f32 {
        if self.projection_type == ProjectionType::Orthographic || self.near <= 0.0 {
            return 0.0;
        }
        utils::rad_to_deg((self.top / self.near).atan() - (self.bottom / self.near).atan())
    }

    /// Exposure driver
    pub fn mode(&self) -> CameraMode {
        self.mode
    }

    /// Set the exposure driver
    pub fn set_mode(&mut self, mode: CameraMode) {
        self.mode = mode;
    }

    /// Physical exposure parameters
    pub fn exposure(&self) -> &Exposure {
        &self.exposure
    }

    /// Replace the exposure parameters
    pub fn set_exposure(&mut self, exposure: Exposure) {
        self.exposure = exposure;
    }

    /// Shorthand for `exposure().ev100()`
    pub fn ev100(&self) -> f32 {
        self.exposure.ev100()
    }

    /// Layers rendered by this camera
    pub fn culling_mask(&self) -> LayerFlags {
        self.culling_mask
    }

    /// Set the rendered layers
    pub fn set_culling_mask(&mut self, mask: LayerFlags) {
        self.culling_mask = mask;
    }

    /// Whether entities on `layer` are rendered. The default (empty) layer
    /// is always rendered.
    pub fn renders_layer(&self, layer: LayerFlags) -> bool {
        layer.is_empty() || self.culling_mask.intersects(layer)
    }

    /// Normalized viewport rectangle
    pub fn viewport(&self) -> &Aabb2 {
        &self.viewport
    }

    /// Set the viewport; `min` and `max` in 0..1
    pub fn set_viewport(&mut self, min: Vec2, max: Vec2) {
        self.viewport = Aabb2::new(min, max);
    }

    /// Draw order among cameras, lower first
    pub fn depth(&self) -> i32 {
        self.depth
    }

    /// Set the draw order
    pub fn set_depth(&mut self, depth: i32) {
        self.depth = depth;
    }

    /// Clear colour
    pub fn background(&self) -> &Vec4 {
        &self.background
    }

    /// Set the clear colour
    pub fn set_background(&mut self, color: Vec4) {
        self.background = color;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Mat3;
    use approx::assert_relative_eq;

    fn square_camera() -> Camera {
        let mut camera = Camera::default();
        camera.set_field_of_view(90.0, 1.0, 1.0, 10.0);
        camera
    }

    #[test]
    fn test_perspective_corners() {
        let camera = square_camera();
        let corners = camera.object_space_frustum();
        assert_relative_eq!(corners[NEAR | LEFT | BOTTOM], Vec3::new(-1.0, -1.0, -1.0), epsilon = 1e-5);
        assert_relative_eq!(corners[NEAR | RIGHT | TOP], Vec3::new(1.0, 1.0, -1.0), epsilon = 1e-5);
        assert_relative_eq!(corners[FAR | RIGHT | BOTTOM], Vec3::new(10.0, -10.0, -10.0), epsilon = 1e-4);
        assert_relative_eq!(corners[FAR | LEFT | TOP], Vec3::new(-10.0, 10.0, -10.0), epsilon = 1e-4);
        assert_relative_eq!(camera.radius(), 300.0_f32.sqrt(), epsilon = 1e-3);
    }

    #[test]
    fn test_world_aabb_with_identity_view() {
        let mut camera = square_camera();
        camera.update(&View::default());

        let aabb = camera.world_aabb();
        assert_relative_eq!(aabb.min, Vec3::new(-10.0, -10.0, -10.0), epsilon = 1e-4);
        assert_relative_eq!(aabb.max, Vec3::new(10.0, 10.0, -1.0), epsilon = 1e-4);
        assert_eq!(camera.world_space_frustum(), camera.object_space_frustum());
    }

    #[test]
    fn test_world_frustum_follows_view() {
        let mut camera = Camera::default();
        camera.set_orthographic_size(2.0, 2.0, 1.0, 5.0);
        // Turned to look along +X
        let rotation = Mat3::from_columns(&[
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(-1.0, 0.0, 0.0),
        ]);
        camera.update(&View::new(Vec3::new(100.0, 0.0, 0.0), rotation));

        let aabb = camera.world_aabb();
        assert_relative_eq!(aabb.min, Vec3::new(101.0, -1.0, -1.0), epsilon = 1e-5);
        assert_relative_eq!(aabb.max, Vec3::new(105.0, 1.0, 1.0), epsilon = 1e-5);
    }

    #[test]
    fn test_orthographic_far_corners_do_not_diverge() {
        let mut camera = Camera::default();
        camera.set_orthographic(-2.0, 2.0, -1.0, 1.0, 0.5, 50.0);
        let corners = camera.object_space_frustum();
        assert_eq!(corners[FAR | RIGHT | TOP], Vec3::new(2.0, 1.0, -50.0));
        assert_eq!(corners[NEAR | RIGHT | TOP], Vec3::new(2.0, 1.0, -0.5));
        assert_eq!(camera.fov_y(), 0.0);
        assert_relative_eq!(camera.aspect_ratio(), 2.0);
    }

    #[test]
    fn test_projection_maps_near_and_far_planes() {
        let camera = square_camera();
        let near = camera.projection_matrix() * Vec4::new(1.0, 1.0, -1.0, 1.0);
        let far = camera.projection_matrix() * Vec4::new(0.0, 0.0, -10.0, 1.0);
        assert_relative_eq!(near.x / near.w, 1.0, epsilon = 1e-5);
        assert_relative_eq!(near.z / near.w, -1.0, epsilon = 1e-5);
        assert_relative_eq!(far.z / far.w, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_aspect_ratio_rebuilds_frustum() {
        let mut camera = square_camera();
        camera.set_aspect_ratio(2.0);

        assert_relative_eq!(camera.aspect_ratio(), 2.0, epsilon = 1e-5);
        assert_relative_eq!(camera.left(), -2.0, epsilon = 1e-5);
        assert_relative_eq!(camera.fov_y(), 90.0, epsilon = 1e-3);
        assert_relative_eq!(camera.object_space_frustum()[FAR | RIGHT | TOP].x, 20.0, epsilon = 1e-4);

        let mut expected = Camera::default();
        expected.set_perspective(-2.0, 2.0, -1.0, 1.0, 1.0, 10.0);
        assert_relative_eq!(*camera.projection_matrix(), *expected.projection_matrix(), epsilon = 1e-5);
    }

    #[test]
    fn test_zero_near_is_clamped() {
        let mut camera = Camera::default();
        camera.set_field_of_view(60.0, 1.5, 0.0, 100.0);
        assert!(camera.near() > 0.0);
        assert!(camera.object_space_frustum().iter().all(|corner| corner.iter().all(|value| value.is_finite())));
    }

    #[test]
    fn test_view_projection_is_product() {
        let mut camera = square_camera();
        let view = View::look_at(Vec3::new(3.0, 4.0, 5.0), Vec3::zeros(), Vec3::y());
        camera.update(&view);
        assert_relative_eq!(
            *camera.view_projection_matrix(),
            camera.projection_matrix() * view.view_matrix(),
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_exposure_and_layers() {
        let mut camera = Camera::from_config(&CameraConfig::default());
        assert_relative_eq!(camera.ev100(), (16.0_f32 * 16.0 * 125.0).log2(), epsilon = 1e-3);
        assert_eq!(camera.mode(), CameraMode::Auto);

        camera.set_culling_mask(LayerFlags::WATER);
        assert!(camera.renders_layer(LayerFlags::empty()));
        assert!(camera.renders_layer(LayerFlags::WATER | LayerFlags::UI));
        assert!(!camera.renders_layer(LayerFlags::UI));
    }
}
