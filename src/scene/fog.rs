//! A homogeneous fog sphere lit by the sun and the sky.

pub use super::*;

use rand::Rng;
use rand_distr::{Distribution, UnitBall, UnitSphere};
use std::f32::consts::PI;

/// A sphere of homogeneous fog.
///
/// Primary rays always scatter inside the sphere, so the pixel throughput is
/// the probability of interacting with the fog along the ray.
#[derive(Clone, Debug, PartialEq)]
pub struct FogScene {
    pub camera: Camera,
    pub center: Vec3,
    pub radius: f32,
    /// The extinction coefficient.
    pub density: f32,
    /// The single-scattering albedo.
    pub albedo: Vec3,
    /// The Henyey-Greenstein asymmetry in `(-1, 1)`.
    pub anisotropy: f32,
    /// The unit direction towards the sun.
    pub sun_direction: Vec3,
    pub sun_radiance: Vec3,
    pub sky_radiance: Vec3,
    /// Scattering events per training path.
    pub bounce_count: u32,
}

impl FogScene {
    /// Returns the entry and exit distances along the ray.
    pub fn intersect(
        &self,
        origin: Vec3,
        direction: Vec3,
    ) -> Option<(f32, f32)> {
        let offset = origin - self.center;
        let b = offset.dot(direction);
        let c = offset.length_squared() - self.radius * self.radius;
        let discriminant = b * b - c;
        if discriminant < 0.0 {
            return None;
        }
        let root = discriminant.sqrt();
        Some((-b - root, -b + root))
    }

    /// Returns `true` if `point` lies inside the sphere.
    #[inline]
    pub fn contains(
        &self,
        point: Vec3,
    ) -> bool {
        point.distance_squared(self.center) <= self.radius * self.radius
    }

    /// Transmittance from `position` inside the sphere to its boundary.
    pub fn transmittance(
        &self,
        position: Vec3,
        direction: Vec3,
    ) -> f32 {
        match self.intersect(position, direction) {
            Some((_, exit)) => (-self.density * exit.max(0.0)).exp(),
            None => 1.0,
        }
    }

    /// The Henyey-Greenstein phase function.
    ///
    /// `incident` points towards the light and `outgoing` away from the point.
    pub fn phase(
        &self,
        outgoing: Vec3,
        incident: Vec3,
    ) -> f32 {
        let g = self.anisotropy;
        let cos_theta = (-incident).dot(outgoing);
        let denominator = 1.0 + g * g - 2.0 * g * cos_theta;
        (1.0 - g * g) / (4.0 * PI * denominator * denominator.sqrt())
    }

    fn free_flight(
        &self,
        rng: &mut dyn RngCore,
    ) -> f32 {
        -(1.0 - rng.gen::<f32>()).ln() / self.density.max(f32::EPSILON)
    }
}

impl Scene for FogScene {
    fn camera(&self) -> Camera {
        self.camera
    }

    fn bounds(&self) -> Aabb {
        Aabb::new(
            self.center - Vec3::splat(self.radius),
            self.center + Vec3::splat(self.radius),
        )
    }

    fn trace_primary(
        &self,
        ray: &Ray,
        rng: &mut dyn RngCore,
    ) -> PrimarySample {
        let Some((entry, exit)) = self.intersect(ray.origin, ray.direction) else {
            return PrimarySample::escaped(self.sky_radiance);
        };
        let entry = entry.max(ray.t_min);
        let exit = exit.min(ray.t_max);
        if exit <= entry {
            return PrimarySample::escaped(self.sky_radiance);
        }

        let transmittance = (-self.density * (exit - entry)).exp();
        let absorbed = 1.0 - transmittance;
        if absorbed <= 0.0 {
            return PrimarySample::escaped(self.sky_radiance);
        }

        // Truncated exponential distance
        let u = rng.gen::<f32>();
        let distance = -(1.0 - u * absorbed).ln() / self.density;
        let t = (entry + distance).min(exit);

        PrimarySample {
            radiance: transmittance * self.sky_radiance,
            throughput: Vec3::splat(absorbed),
            scatter: Some(ScatterPoint {
                position: ray.origin + t * ray.direction,
                direction: -ray.direction,
            }),
        }
    }

    fn sample_medium(
        &self,
        rng: &mut dyn RngCore,
    ) -> Vec3 {
        let point: [f32; 3] = UnitBall.sample(rng);
        self.center + self.radius * Vec3::from(point)
    }

    fn trace_radiance(
        &self,
        position: Vec3,
        direction: Vec3,
        rng: &mut dyn RngCore,
    ) -> Vec3 {
        let mut radiance = Vec3::ZERO;
        let mut weight = Vec3::ONE;
        let mut position = position;
        let mut outgoing = direction;

        for _ in 0..self.bounce_count {
            // Next event estimation towards the sun
            let sun_weight = self.phase(outgoing, self.sun_direction)
                * self.transmittance(position, self.sun_direction);
            radiance += weight * self.albedo * self.sun_radiance * sun_weight;

            let incident: [f32; 3] = UnitSphere.sample(rng);
            let incident = Vec3::from(incident);
            weight *= self.albedo * self.phase(outgoing, incident) * 4.0 * PI;

            let exit = self
                .intersect(position, incident)
                .map(|(_, exit)| exit.max(0.0))
                .unwrap_or_default();
            let distance = self.free_flight(rng);
            if distance >= exit {
                radiance += weight * self.sky_radiance;
                break;
            }

            position += distance * incident;
            outgoing = -incident;
        }

        radiance
    }
}

impl Default for FogScene {
    #[inline]
    fn default() -> Self {
        Self {
            camera: Camera::default(),
            center: Vec3::ZERO,
            radius: 1.2,
            density: 2.0,
            albedo: Vec3::new(0.9, 0.85, 0.8),
            anisotropy: 0.3,
            sun_direction: Vec3::new(0.5, 1.0, 0.3).normalize(),
            sun_radiance: Vec3::new(3.0, 2.8, 2.5),
            sky_radiance: Vec3::new(0.3, 0.4, 0.6),
            bounce_count: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn primary_hit_and_miss() {
        use super::*;
        use rand::{rngs::StdRng, SeedableRng};

        let scene = FogScene::default();
        let camera = scene.camera();
        let mut rng = StdRng::seed_from_u64(0);

        let center = scene.trace_primary(&camera.ray(0.5, 0.5, 1.0), &mut rng);
        let scatter = center.scatter.unwrap();
        assert!(scatter.position.length() <= scene.radius + 1e-4);
        assert!(center.throughput.x > 0.9);
        assert_eq!(scatter.direction, Vec3::Z);

        let corner = scene.trace_primary(&camera.ray(0.0, 0.0, 1.0), &mut rng);
        assert_eq!(corner, PrimarySample::escaped(scene.sky_radiance));
    }

    #[test]
    fn radiance_is_finite_and_positive() {
        use super::*;
        use rand::{rngs::StdRng, SeedableRng};

        let scene = FogScene::default();
        let mut rng = StdRng::seed_from_u64(1);

        let mean = (0..4096)
            .map(|_| scene.trace_radiance(Vec3::ZERO, Vec3::Z, &mut rng))
            .fold(Vec3::ZERO, |sum, radiance| sum + radiance)
            / 4096.0;
        assert!(mean.is_finite());
        assert!(mean.min_element() > 0.0);
    }

    #[test]
    fn medium_samples_stay_inside() {
        use super::*;
        use rand::{rngs::StdRng, SeedableRng};

        let scene = FogScene {
            center: Vec3::new(1.0, -2.0, 0.5),
            radius: 0.75,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(4);

        let points = (0..4096)
            .map(|_| scene.sample_medium(&mut rng))
            .collect::<Vec<_>>();
        assert!(points.iter().all(|point| scene.contains(*point)));

        // Uniform in volume, so about one eighth lies within half the radius
        let inner = points
            .iter()
            .filter(|point| point.distance(scene.center) < scene.radius * 0.5)
            .count() as f32
            / 4096.0;
        assert!((inner - 0.125).abs() < 0.03, "{inner}");
    }

    #[test]
    fn black_fog() {
        use super::*;
        use rand::{rngs::StdRng, SeedableRng};

        let scene = FogScene {
            albedo: Vec3::ZERO,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..64 {
            let radiance = scene.trace_radiance(Vec3::ZERO, Vec3::X, &mut rng);
            assert_eq!(radiance, Vec3::ZERO);
        }
    }

    #[test]
    fn phase_is_normalized() {
        use super::*;
        use rand::{rngs::StdRng, SeedableRng};

        let scene = FogScene::default();
        let mut rng = StdRng::seed_from_u64(3);
        let integral = (0..65536)
            .map(|_| {
                let incident: [f32; 3] = UnitSphere.sample(&mut rng);
                let incident = Vec3::from(incident);
                scene.phase(Vec3::Z, incident) * 4.0 * PI
            })
            .sum::<f32>()
            / 65536.0;
        assert!((integral - 1.0).abs() < 0.05, "{integral}");
    }
}
