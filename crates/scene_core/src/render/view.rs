//! # Camera View
//!
//! Position and orientation of an observer. A [`View`] owns the rotation
//! from camera space to world space and derives the view matrix from it.
//!
//! ## Conventions
//! Right-handed, camera looks down its local -Z axis:
//! - column 0 of the rotation = right
//! - column 1 of the rotation = up
//! - negated column 2 = view direction

use crate::foundation::math::{Mat3, Mat4, Vec3};

/// Position and camera-to-world rotation of an observer
#[derive(Debug, Clone, PartialEq)]
pub struct View {
    position: Vec3,
    rotation: Mat3,
    view_matrix: Mat4,
}

impl Default for View {
    fn default() -> Self {
        Self::new(Vec3::zeros(), Mat3::identity())
    }
}

impl View {
    /// Create a view and build its matrix
    pub fn new(position: Vec3, rotation: Mat3) -> Self {
        let mut view = Self {
            position,
            rotation,
            view_matrix: Mat4::identity(),
        };
        view.update();
        view
    }

    /// View at `eye` looking at `target`
    ///
    /// Falls back to the identity orientation when `eye` and `target`
    /// coincide or `up` is parallel to the view direction.
    pub fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Self {
        let rotation = (|| {
            let forward = (target - eye).try_normalize(f32::EPSILON)?;
            let right = forward.cross(&up).try_normalize(f32::EPSILON)?;
            let true_up = right.cross(&forward);
            Some(Mat3::from_columns(&[right, true_up, -forward]))
        })()
        .unwrap_or_else(Mat3::identity);

        Self::new(eye, rotation)
    }

    /// World-space position
    pub fn position(&self) -> &Vec3 {
        &self.position
    }

    /// Move the view; call [`View::update`] afterwards
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    /// Camera-to-world rotation
    pub fn rotation(&self) -> &Mat3 {
        &self.rotation
    }

    /// Rotate the view; call [`View::update`] afterwards
    pub fn set_rotation(&mut self, rotation: Mat3) {
        self.rotation = rotation;
    }

    /// Camera right axis in world space
    pub fn right(&self) -> Vec3 {
        self.rotation.column(0).into_owned()
    }

    /// Camera up axis in world space
    pub fn up(&self) -> Vec3 {
        self.rotation.column(1).into_owned()
    }

    /// Direction the camera looks at in world space
    pub fn view_direction(&self) -> Vec3 {
        -self.rotation.column(2).into_owned()
    }

    /// Rebuild the view matrix: transposed rotation, translation `-Rᵀ·p`
    pub fn update(&mut self) {
        let inverse_rotation = self.rotation.transpose();
        let translation = -(inverse_rotation * self.position);

        let mut matrix = inverse_rotation.to_homogeneous();
        matrix.fixed_view_mut::<3, 1>(0, 3).copy_from(&translation);
        self.view_matrix = matrix;
    }

    /// World-to-camera matrix as of the last [`View::update`]
    pub fn view_matrix(&self) -> &Mat4 {
        &self.view_matrix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec4;
    use approx::assert_relative_eq;

    #[test]
    fn test_view_matrix_inverts_placement() {
        let rotation = Mat3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
        let view = View::new(Vec3::new(5.0, 2.0, 1.0), rotation);

        let eye = view.view_matrix() * Vec4::new(5.0, 2.0, 1.0, 1.0);
        assert_relative_eq!(eye, Vec4::new(0.0, 0.0, 0.0, 1.0), epsilon = 1e-6);

        let ahead = view.position() + view.view_direction() * 3.0;
        let ahead = view.view_matrix() * Vec4::new(ahead.x, ahead.y, ahead.z, 1.0);
        assert_relative_eq!(ahead, Vec4::new(0.0, 0.0, -3.0, 1.0), epsilon = 1e-6);
    }

    #[test]
    fn test_look_at_axes() {
        let view = View::look_at(Vec3::new(0.0, 0.0, 10.0), Vec3::zeros(), Vec3::y());
        assert_relative_eq!(view.view_direction(), Vec3::new(0.0, 0.0, -1.0), epsilon = 1e-6);
        assert_relative_eq!(view.right(), Vec3::new(1.0, 0.0, 0.0), epsilon = 1e-6);
        assert_relative_eq!(view.up(), Vec3::new(0.0, 1.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn test_degenerate_look_at_is_identity() {
        let view = View::look_at(Vec3::new(1.0, 1.0, 1.0), Vec3::new(1.0, 1.0, 1.0), Vec3::y());
        assert_eq!(view.rotation(), &Mat3::identity());
    }
}
