//! The ray and feature generator.

pub use super::*;

use rand::Rng;
use rand_distr::{Distribution, UnitSphere};
use rayon::prelude::*;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// Traces the primary rays and the training paths of a frame.
///
/// ## Outputs
///
/// * `infer_features` - One record per hit pixel in compacted slots, zeros after them.
/// * `train_features` and `train_targets` - One record per training sample.
/// * `pixels` - The primary radiance, throughput and slot of every pixel.
pub struct FeatureGenerator {
    scene: Arc<dyn Scene>,
    render_width: u32,
    render_height: u32,
    train_width: u32,
    train_height: u32,
    samples_per_pixel: u32,
    infer_features: SharedBuffer,
    train_features: SharedBuffer,
    train_targets: SharedBuffer,
    pixels: PixelBuffer,
    hit_count: AtomicU64,
}

impl FeatureGenerator {
    pub fn new(
        config: &NrcConfig,
        scene: Arc<dyn Scene>,
        buffers: &FrameBuffers,
        pixels: PixelBuffer,
    ) -> Self {
        Self {
            scene,
            render_width: config.render_width,
            render_height: config.render_height,
            train_width: config.train_width,
            train_height: config.train_height,
            samples_per_pixel: config.train_samples_per_pixel,
            infer_features: buffers.infer_features.to_owned(),
            train_features: buffers.train_features.to_owned(),
            train_targets: buffers.train_targets.to_owned(),
            pixels,
            hit_count: Default::default(),
        }
    }

    /// Pixels with a scattering event in the latest frame.
    #[inline]
    pub fn hit_count(&self) -> u64 {
        self.hit_count.load(Ordering::Relaxed)
    }

    fn generate_infer(
        &self,
        constants: &PushConstants,
        camera: &Camera,
        bounds: &Aabb,
    ) -> Result<()> {
        let width = self.render_width as u64;
        let height = self.render_height as u64;
        let aspect_ratio = width as f32 / height as f32;

        let samples = (0..width * height)
            .into_par_iter()
            .map(|index| {
                let mut rng = sample_rng(constants, SampleStream::Primary, index);
                let u = ((index % width) as f32 + rng.gen::<f32>()) / width as f32;
                let v = ((index / width) as f32 + rng.gen::<f32>()) / height as f32;
                let ray = camera.ray(u, v, aspect_ratio);
                self.scene.trace_primary(&ray, &mut rng)
            })
            .collect::<Vec<_>>();

        // Exclusive scan of the hit flags
        let slots = samples
            .iter()
            .scan(0_u32, |hit_count, sample| {
                let slot = sample.is_hit().then_some(*hit_count);
                *hit_count += sample.is_hit() as u32;
                Some(slot)
            })
            .collect::<Vec<_>>();

        let mut features = self.infer_features.write()?;
        features.fill(0.0);
        let records = bytemuck::try_cast_slice_mut::<f32, FeatureRecord>(&mut features[..])?;
        let mut pixels = self.pixels.write();
        pixels.resize(samples.len(), Default::default());

        let mut hit_count = 0;
        for ((sample, slot), pixel) in
            samples.iter().zip(&slots).zip(pixels.iter_mut())
        {
            if let (Some(scatter), Some(slot)) = (sample.scatter, slot) {
                records[*slot as usize] =
                    FeatureRecord::new(scatter.position, scatter.direction, bounds);
                hit_count += 1;
            }
            *pixel = PixelRecord::new(sample, *slot);
        }
        self.hit_count.store(hit_count, Ordering::Relaxed);

        #[cfg(debug_assertions)]
        log::debug!(
            target: "nrc_renderer::pipeline",
            "generate > frame {} > {hit_count} of {} pixels hit",
            constants.frame_index,
            samples.len(),
        );

        Ok(())
    }

    fn generate_train(
        &self,
        constants: &PushConstants,
        camera: &Camera,
        bounds: &Aabb,
    ) -> Result<()> {
        let width = self.train_width as u64;
        let height = self.train_height as u64;
        let samples_per_pixel = self.samples_per_pixel as u64;
        let aspect_ratio = self.render_width as f32 / self.render_height as f32;
        let count = width * height * samples_per_pixel;
        if count == 0 {
            return Ok(());
        }

        let samples = (0..count)
            .into_par_iter()
            .map(|index| {
                let mut rng = sample_rng(constants, SampleStream::Train, index);
                let pixel = index / samples_per_pixel;
                let u = ((pixel % width) as f32 + rng.gen::<f32>()) / width as f32;
                let v = ((pixel / width) as f32 + rng.gen::<f32>()) / height as f32;
                let ray = camera.ray(u, v, aspect_ratio);

                let (position, direction) =
                    match self.scene.trace_primary(&ray, &mut rng).scatter {
                        Some(scatter) => (scatter.position, scatter.direction),
                        None => {
                            let position = self.scene.sample_medium(&mut rng);
                            let direction: [f32; 3] = UnitSphere.sample(&mut rng);
                            (position, Vec3::from(direction))
                        },
                    };
                let radiance = self.scene.trace_radiance(position, direction, &mut rng);

                (
                    FeatureRecord::new(position, direction, bounds),
                    TargetRecord::new(radiance),
                )
            })
            .collect::<Vec<_>>();

        let mut features = self.train_features.write()?;
        let mut targets = self.train_targets.write()?;
        let feature_records =
            bytemuck::try_cast_slice_mut::<f32, FeatureRecord>(&mut features[..])?;
        let target_records =
            bytemuck::try_cast_slice_mut::<f32, TargetRecord>(&mut targets[..])?;

        for ((feature, target), (feature_record, target_record)) in samples
            .into_iter()
            .zip(feature_records.iter_mut().zip(target_records.iter_mut()))
        {
            *feature_record = feature;
            *target_record = target;
        }

        Ok(())
    }
}

impl ComputePass for FeatureGenerator {
    fn label(&self) -> &str {
        "generate"
    }

    fn dispatch(
        &self,
        constants: &PushConstants,
    ) -> Result<()> {
        let camera = self.scene.camera();
        let bounds = self.scene.bounds();
        self.generate_infer(constants, &camera, &bounds)?;
        self.generate_train(constants, &camera, &bounds)?;
        Ok(())
    }
}
