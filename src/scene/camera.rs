//! The pinhole camera that spawns primary rays.

pub use super::*;

/// A pinhole camera.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    /// Position in world space.
    pub position: Vec3,
    /// The unit viewing direction.
    pub direction: Vec3,
    /// The unit up vector.
    pub up: Vec3,
    /// The vertical field of view in radians.
    pub field_of_view_y: f32,
    /// Distance to the near plane.
    pub near: f32,
    /// Distance to the far plane.
    pub far: f32,
}

impl Camera {
    /// Looks from `position` at `target`.
    pub fn look_at(
        position: Vec3,
        target: Vec3,
        up: Vec3,
        field_of_view_y: f32,
    ) -> Self {
        Self {
            position,
            direction: (target - position).normalize_or(Vec3::NEG_Z),
            up: up.normalize_or(Vec3::Y),
            field_of_view_y,
            ..Default::default()
        }
    }

    /// Returns the primary ray through the image coordinates `(u, v)` in `[0, 1]`.
    ///
    /// `(0, 0)` is the top left corner.
    pub fn ray(
        &self,
        u: f32,
        v: f32,
        aspect_ratio: f32,
    ) -> Ray {
        let forward = self.direction;
        let right = forward.cross(self.up).normalize_or(Vec3::X);
        let up = right.cross(forward);

        let half_height = (self.field_of_view_y * 0.5).tan();
        let half_width = half_height * aspect_ratio;
        let x = (2.0 * u - 1.0) * half_width;
        let y = (1.0 - 2.0 * v) * half_height;

        Ray {
            origin: self.position,
            direction: (forward + x * right + y * up).normalize(),
            t_min: self.near,
            t_max: self.far,
        }
    }
}

impl Default for Camera {
    #[inline]
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 4.0),
            direction: Vec3::NEG_Z,
            up: Vec3::Y,
            field_of_view_y: std::f32::consts::FRAC_PI_4,
            near: 1e-2,
            far: 1e3,
        }
    }
}
