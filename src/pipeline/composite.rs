//! The compositor and its output image.

pub use super::*;

use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use std::sync::Arc;

/// A linear RGBA image in row-major order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<[f32; 4]>,
}

/// The image the next composite writes into.
pub type ImageTarget = Arc<Mutex<Arc<RwLock<Image>>>>;

/// Blends the primary radiance with the cache prediction of every pixel.
///
/// `color = radiance + throughput * prediction[slot]`
///
/// Pixels without a slot keep their primary radiance.
pub struct Compositor {
    predictions: SharedBuffer,
    pixels: PixelBuffer,
    target: ImageTarget,
}

impl Image {
    pub fn new(
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            width,
            height,
            pixels: vec![[0.0; 4]; width as usize * height as usize],
        }
    }

    #[inline]
    pub fn get(
        &self,
        x: u32,
        y: u32,
    ) -> Option<[f32; 4]> {
        if x >= self.width {
            return None;
        }
        self.pixels
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Mean of the squared RGB differences.
    ///
    /// Returns `None` if the sizes differ.
    pub fn mean_squared_error(
        &self,
        other: &Self,
    ) -> Option<f64> {
        if self.width != other.width
            || self.height != other.height
            || self.pixels.len() != other.pixels.len()
        {
            return None;
        }
        if self.pixels.is_empty() {
            return Some(0.0);
        }

        let sum = self
            .pixels
            .par_iter()
            .zip(other.pixels.par_iter())
            .map(|(a, b)| {
                (0..3)
                    .map(|c| (a[c] as f64 - b[c] as f64).powi(2))
                    .sum::<f64>()
            })
            .sum::<f64>();
        Some(sum / (self.pixels.len() * 3) as f64)
    }

    /// Relative difference of the mean RGB values against `reference`.
    ///
    /// Returns `None` if the sizes differ.
    pub fn relative_bias(
        &self,
        reference: &Self,
    ) -> Option<[f64; 3]> {
        if self.width != reference.width || self.height != reference.height {
            return None;
        }
        let own = self.mean();
        let reference = reference.mean();
        Some([0, 1, 2].map(|c| (own[c] - reference[c]) / reference[c].max(f64::EPSILON)))
    }

    /// Mean RGB value.
    pub fn mean(&self) -> [f64; 3] {
        let count = self.pixels.len().max(1) as f64;
        let sum = self.pixels.iter().fold([0.0; 3], |sum, pixel| {
            [
                sum[0] + pixel[0] as f64,
                sum[1] + pixel[1] as f64,
                sum[2] + pixel[2] as f64,
            ]
        });
        sum.map(|value| value / count)
    }
}

impl Compositor {
    pub fn new(
        buffers: &FrameBuffers,
        pixels: PixelBuffer,
        target: ImageTarget,
    ) -> Self {
        Self {
            predictions: buffers.infer_predictions.to_owned(),
            pixels,
            target,
        }
    }
}

impl ComputePass for Compositor {
    fn label(&self) -> &str {
        "composite"
    }

    fn dispatch(
        &self,
        constants: &PushConstants,
    ) -> Result<()> {
        let predictions = self.predictions.read()?;
        let predictions =
            bytemuck::try_cast_slice::<f32, PredictionRecord>(&predictions[..])?;
        let pixels = self.pixels.read();
        let target = self.target.lock().to_owned();
        let mut image = target.write();

        if image.pixels.len() != pixels.len() {
            return Err(Error::Layout(format!(
                "The image has {} pixels, not {}",
                image.pixels.len(),
                pixels.len(),
            )));
        }

        image
            .pixels
            .par_iter_mut()
            .zip(pixels.par_iter())
            .for_each(|(color, pixel)| {
                let mut radiance = Vec3::from(pixel.radiance);
                let prediction = pixel.slot().and_then(|slot| predictions.get(slot));
                if let Some(prediction) = prediction {
                    radiance +=
                        Vec3::from(pixel.throughput) * prediction.rgb().max(Vec3::ZERO);
                }
                *color = radiance.extend(1.0).to_array();
            });

        #[cfg(debug_assertions)]
        log::debug!(
            target: "nrc_renderer::pipeline",
            "composite > frame {}",
            constants.frame_index,
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn composite_blends_by_slot() {
        use super::*;
        use std::time::Duration;

        let instance = Instance::new();
        let device = GraphicsDevice::new(&instance, Duration::from_secs(1)).unwrap();
        let domain = Arc::new(HandoffDomain::new());
        let config = NrcConfig::new(2, 2, 0, 0)
            .with_train_samples_per_pixel(0)
            .with_batch_size(4);
        let plan = BatchPlan::new(&config).unwrap();
        let buffers = FrameBuffers::new(&device, &plan, &domain).unwrap();

        {
            let mut predictions = buffers.infer_predictions.write().unwrap();
            predictions.copy_from_slice(&[
                1.0, 2.0, 3.0, 1.0, //
                -1.0, 0.5, 0.0, 1.0, //
                // Padding
                f32::NAN, f32::NAN, f32::NAN, f32::NAN, //
                f32::NAN, f32::NAN, f32::NAN, f32::NAN,
            ]);
        }
        let pixels = PixelBuffer::new(RwLock::new(vec![
            PixelRecord {
                radiance: [0.5; 3],
                throughput: [0.5; 3],
                slot: 0,
            },
            PixelRecord {
                radiance: [0.25; 3],
                throughput: [0.0; 3],
                slot: NO_SLOT,
            },
            PixelRecord {
                radiance: [0.0; 3],
                throughput: [1.0; 3],
                slot: 1,
            },
            PixelRecord {
                radiance: [1.0; 3],
                throughput: [1.0; 3],
                slot: NO_SLOT,
            },
        ]));
        let image = Arc::new(RwLock::new(Image::new(2, 2)));
        let target = ImageTarget::new(Mutex::new(image.to_owned()));

        Compositor::new(&buffers, pixels, target)
            .dispatch(&PushConstants::default())
            .unwrap();

        let image = image.read();
        assert_eq!(image.get(0, 0), Some([1.0, 1.5, 2.0, 1.0]));
        assert_eq!(image.get(1, 0), Some([0.25, 0.25, 0.25, 1.0]));
        assert_eq!(image.get(0, 1), Some([0.0, 0.5, 0.0, 1.0]));
        assert_eq!(image.get(1, 1), Some([1.0, 1.0, 1.0, 1.0]));
        assert_eq!(image.get(2, 0), None);
    }

    #[test]
    fn mean_squared_error() {
        use super::*;

        let a = Image::new(2, 1);
        let mut b = Image::new(2, 1);
        b.pixels[1] = [1.0, 1.0, 1.0, 0.0];

        assert_eq!(a.mean_squared_error(&a), Some(0.0));
        assert_eq!(a.mean_squared_error(&b), Some(0.5));
        assert_eq!(a.mean_squared_error(&Image::new(1, 2)), None);
        assert_eq!(b.mean(), [0.5; 3]);

        let mut c = Image::new(2, 1);
        c.pixels[0] = [0.5, 0.5, 0.5, 1.0];
        assert_eq!(b.relative_bias(&c), Some([1.0; 3]));
        assert_eq!(b.relative_bias(&b), Some([0.0; 3]));
        assert_eq!(b.relative_bias(&Image::new(1, 2)), None);
    }
}
