//! Participating media scenes.

pub mod camera;
pub mod fog;

pub use camera::*;
pub use fog::*;
pub use glam::Vec3;
pub use rand::RngCore;

/// A ray segment `origin + t * direction` for `t` in `[t_min, t_max]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
    pub t_min: f32,
    pub t_max: f32,
}

/// An axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

/// The first scattering event along a primary ray.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScatterPoint {
    /// Position in world space.
    pub position: Vec3,
    /// The unit direction radiance leaves towards the camera.
    pub direction: Vec3,
}

/// The outcome of marching one primary ray.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PrimarySample {
    /// Radiance gathered before the scattering event.
    pub radiance: Vec3,
    /// The weight applied to the radiance leaving the scattering event.
    pub throughput: Vec3,
    /// `None` if the ray escaped the medium.
    pub scatter: Option<ScatterPoint>,
}

/// A scene of participating media.
///
/// The renderer traces primary rays and training paths through it.
pub trait Scene: Send + Sync {
    fn camera(&self) -> Camera;

    /// The region the radiance cache covers.
    fn bounds(&self) -> Aabb;

    /// Marches a primary ray to its first scattering event.
    fn trace_primary(
        &self,
        ray: &Ray,
        rng: &mut dyn RngCore,
    ) -> PrimarySample;

    /// Draws a uniform point inside the medium.
    ///
    /// Training queries fall back to it when a training ray misses.
    fn sample_medium(
        &self,
        rng: &mut dyn RngCore,
    ) -> Vec3;

    /// Estimates the radiance leaving `position` along `direction` with one path.
    fn trace_radiance(
        &self,
        position: Vec3,
        direction: Vec3,
        rng: &mut dyn RngCore,
    ) -> Vec3;
}

impl Aabb {
    #[inline]
    pub fn new(
        min: Vec3,
        max: Vec3,
    ) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    /// Maps `point` into `[0, 1]^3`, clamping outside points.
    pub fn normalize(
        &self,
        point: Vec3,
    ) -> Vec3 {
        ((point - self.min) / self.extent().max(Vec3::splat(f32::EPSILON)))
            .clamp(Vec3::ZERO, Vec3::ONE)
    }
}

impl PrimarySample {
    /// A ray that left the scene carrying `radiance`.
    #[inline]
    pub const fn escaped(radiance: Vec3) -> Self {
        Self {
            radiance,
            throughput: Vec3::ZERO,
            scatter: None,
        }
    }

    #[inline]
    pub const fn is_hit(&self) -> bool {
        self.scatter.is_some()
    }
}
