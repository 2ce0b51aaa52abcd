//! Converged Monte Carlo images to compare frames against.

pub use super::*;

use rand::Rng;
use rayon::prelude::*;
use std::sync::Arc;

/// Renders the scene with full paths and no cache.
///
/// ## Details
///
/// Every sample traces the primary ray with [`Scene::trace_primary`] and
/// replaces the cache lookup with one [`Scene::trace_radiance`] path. The
/// average over `sample_count` samples is the expectation the composited
/// frames converge to.
#[derive(Clone)]
pub struct ReferenceRenderer {
    scene: Arc<dyn Scene>,
    width: u32,
    height: u32,
    sample_count: u32,
    seed: u64,
}

impl ReferenceRenderer {
    pub fn new(
        scene: Arc<dyn Scene>,
        width: u32,
        height: u32,
        sample_count: u32,
        seed: u64,
    ) -> Self {
        Self {
            scene,
            width,
            height,
            sample_count,
            seed,
        }
    }

    /// Matches the image size and the seed of a session.
    pub fn from_config(
        config: &NrcConfig,
        scene: Arc<dyn Scene>,
        sample_count: u32,
    ) -> Self {
        Self::new(
            scene,
            config.render_width,
            config.render_height,
            sample_count,
            config.seed,
        )
    }

    #[inline]
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn render(&self) -> Result<Image> {
        if self.sample_count == 0 || self.width == 0 || self.height == 0 {
            return Err(Error::Configuration(
                format!(
                    "reference ({}x{}, {} samples)",
                    self.width, self.height, self.sample_count
                ),
                "non-empty".into(),
            ));
        }

        let width = self.width as u64;
        let height = self.height as u64;
        let aspect_ratio = width as f32 / height as f32;
        let camera = self.scene.camera();

        let mut image = Image::new(self.width, self.height);
        image
            .pixels
            .par_iter_mut()
            .enumerate()
            .for_each(|(index, color)| {
                let index = index as u64;
                let sum = (0..self.sample_count as u64)
                    .map(|sample_index| {
                        let constants = PushConstants {
                            frame_index: sample_index,
                            seed: self.seed,
                        };
                        let mut rng =
                            sample_rng(&constants, SampleStream::Reference, index);
                        let u = ((index % width) as f32 + rng.gen::<f32>()) / width as f32;
                        let v = ((index / width) as f32 + rng.gen::<f32>()) / height as f32;
                        let ray = camera.ray(u, v, aspect_ratio);

                        let sample = self.scene.trace_primary(&ray, &mut rng);
                        match sample.scatter {
                            Some(scatter) => {
                                sample.radiance
                                    + sample.throughput
                                        * self.scene.trace_radiance(
                                            scatter.position,
                                            scatter.direction,
                                            &mut rng,
                                        )
                            },
                            None => sample.radiance,
                        }
                    })
                    .fold(Vec3::ZERO, |sum, radiance| sum + radiance);
                let radiance = sum / self.sample_count as f32;
                *color = radiance.extend(1.0).to_array();
            });

        log::info!(
            target: "nrc_renderer::pipeline",
            "reference > {}x{} at {} samples per pixel",
            self.width,
            self.height,
            self.sample_count,
        );

        Ok(image)
    }
}

impl std::fmt::Debug for ReferenceRenderer {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ReferenceRenderer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sample_count", &self.sample_count)
            .field("seed", &self.seed)
            .finish()
    }
}
