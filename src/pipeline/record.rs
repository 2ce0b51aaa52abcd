//! Record layouts of the shared buffers.

pub use super::*;

use bytemuck::{Pod, Zeroable};
use std::f32::consts::{PI, TAU};

/// Floats per feature record.
pub const FEATURE_RECORD_LEN: usize = 5;

/// Floats per target record.
pub const TARGET_RECORD_LEN: usize = 4;

/// Floats per prediction record.
pub const PREDICTION_RECORD_LEN: usize = 4;

/// The slot of a pixel without a scattering event.
pub const NO_SLOT: u32 = u32::MAX;

/// The network input of one query.
///
/// ## Layout
///
/// ```plaintext
/// [x, y, z, theta / pi, phi / 2pi]
/// ```
///
/// The position is normalized to the scene bounds and both angles to `[0, 1]`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct FeatureRecord {
    pub position: [f32; 3],
    pub direction: [f32; 2],
}

/// The radiance target of one training query, in RGBA.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct TargetRecord {
    pub radiance: [f32; 4],
}

/// The radiance prediction of one query, in RGBA.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PredictionRecord {
    pub radiance: [f32; 4],
}

/// The per-pixel state kept by the graphics side between generation and compositing.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct PixelRecord {
    /// Radiance traced before the scattering event.
    pub radiance: [f32; 3],
    /// The weight of the cache prediction.
    pub throughput: [f32; 3],
    /// The compacted inference slot, or [`NO_SLOT`].
    pub slot: u32,
}

impl FeatureRecord {
    pub fn new(
        position: Vec3,
        direction: Vec3,
        bounds: &Aabb,
    ) -> Self {
        let position = bounds.normalize(position);
        let direction = direction.normalize_or(Vec3::Z);
        let theta = direction.z.clamp(-1.0, 1.0).acos();
        let phi = direction.y.atan2(direction.x).rem_euclid(TAU);

        Self {
            position: position.to_array(),
            direction: [theta / PI, phi / TAU],
        }
    }
}

impl TargetRecord {
    #[inline]
    pub fn new(radiance: Vec3) -> Self {
        Self {
            radiance: radiance.extend(1.0).to_array(),
        }
    }
}

impl PredictionRecord {
    #[inline]
    pub fn rgb(&self) -> Vec3 {
        Vec3::from_slice(&self.radiance[..3])
    }
}

impl PixelRecord {
    #[inline]
    pub fn new(
        sample: &PrimarySample,
        slot: Option<u32>,
    ) -> Self {
        Self {
            radiance: sample.radiance.to_array(),
            throughput: sample.throughput.to_array(),
            slot: slot.unwrap_or(NO_SLOT),
        }
    }

    #[inline]
    pub fn slot(&self) -> Option<usize> {
        (self.slot != NO_SLOT).then_some(self.slot as usize)
    }
}

impl Default for PixelRecord {
    #[inline]
    fn default() -> Self {
        Self {
            radiance: [0.0; 3],
            throughput: [0.0; 3],
            slot: NO_SLOT,
        }
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn layout() {
        use super::*;

        assert_eq!(
            std::mem::size_of::<FeatureRecord>(),
            FEATURE_RECORD_LEN * 4
        );
        assert_eq!(std::mem::size_of::<TargetRecord>(), TARGET_RECORD_LEN * 4);
        assert_eq!(
            std::mem::size_of::<PredictionRecord>(),
            PREDICTION_RECORD_LEN * 4
        );

        let floats = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0];
        let records = bytemuck::cast_slice::<f32, FeatureRecord>(&floats);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].position, [0.6, 0.7, 0.8]);
        assert_eq!(records[1].direction, [0.9, 1.0]);
    }

    #[test]
    fn feature_normalization() {
        use super::*;

        let bounds = Aabb::new(Vec3::splat(-2.0), Vec3::splat(2.0));

        let record = FeatureRecord::new(Vec3::new(0.0, 2.0, -4.0), Vec3::Z, &bounds);
        assert_eq!(record.position, [0.5, 1.0, 0.0]);
        assert_eq!(record.direction[0], 0.0);

        let record = FeatureRecord::new(Vec3::ZERO, Vec3::NEG_Y, &bounds);
        assert!((record.direction[0] - 0.5).abs() < 1e-6);
        assert!((record.direction[1] - 0.75).abs() < 1e-6);

        for direction in [Vec3::X, Vec3::NEG_X, Vec3::NEG_Z, Vec3::ONE] {
            let record = FeatureRecord::new(Vec3::ZERO, direction, &bounds);
            assert!(record.direction.iter().all(|x| (0.0..=1.0).contains(x)));
        }
    }

    #[test]
    fn pixel_slot() {
        use super::*;

        let sample = PrimarySample::escaped(Vec3::ONE);
        assert_eq!(PixelRecord::new(&sample, None).slot(), None);
        assert_eq!(PixelRecord::new(&sample, Some(7)).slot(), Some(7));
    }
}
