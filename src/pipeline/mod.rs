//! The per-frame graphics passes and the buffers they share with the tensor runtime.

pub mod composite;
pub mod generate;
pub mod record;
pub mod reference;
pub mod schedule;

pub use crate::{config::*, graphics::*, scene::*};
pub use composite::*;
pub use generate::*;
pub use record::*;
pub use reference::*;
pub use schedule::*;

use parking_lot::RwLock;
use rand::{rngs::StdRng, SeedableRng};
use std::sync::Arc;

/// Pixel records kept by the graphics side.
pub type PixelBuffer = Arc<RwLock<Vec<PixelRecord>>>;

/// The four exported buffers of a session.
#[derive(Clone, Debug)]
pub struct FrameBuffers {
    pub infer_features: SharedBuffer,
    pub infer_predictions: SharedBuffer,
    pub train_features: SharedBuffer,
    pub train_targets: SharedBuffer,
}

/// The handles of [`FrameBuffers`] given to the tensor runtime.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FrameBufferHandles {
    pub infer_features: ExternalMemoryDescriptor,
    pub infer_predictions: ExternalMemoryDescriptor,
    pub train_features: ExternalMemoryDescriptor,
    pub train_targets: ExternalMemoryDescriptor,
}

/// The tensor-side views of [`FrameBuffers`].
#[derive(Clone, Debug)]
pub struct ImportedFrameBuffers {
    pub infer_features: ImportedBuffer,
    pub infer_predictions: ImportedBuffer,
    pub train_features: ImportedBuffer,
    pub train_targets: ImportedBuffer,
}

impl FrameBuffers {
    /// Allocates the buffers sized by `plan`.
    pub fn new(
        device: &GraphicsDevice,
        plan: &BatchPlan,
        domain: &Arc<HandoffDomain>,
    ) -> Result<Self> {
        let infer_count = plan.infer_record_count as usize;
        let train_count = plan.train_record_count as usize;
        let layouts = [
            ("infer_features", infer_count, FEATURE_RECORD_LEN),
            ("infer_predictions", infer_count, PREDICTION_RECORD_LEN),
            ("train_features", train_count, FEATURE_RECORD_LEN),
            ("train_targets", train_count, TARGET_RECORD_LEN),
        ];

        let mut buffers = Vec::with_capacity(layouts.len());
        for (label, record_count, record_len) in layouts {
            let buffer = record_count
                .checked_mul(record_len)
                .ok_or_else(|| {
                    Error::ResourceExhaustion(format!(
                        "{label} of {record_count} records overflows the element count"
                    ))
                })
                .and_then(|element_count| {
                    device.create_shared_buffer(label, element_count, domain)
                });
            match buffer {
                Ok(buffer) => buffers.push(buffer),
                Err(error) => {
                    // Release what was exported so far
                    for buffer in &buffers {
                        device.instance().close_handle(buffer.descriptor().handle);
                    }
                    return Err(error);
                },
            }
        }

        let mut buffers = buffers.into_iter();
        match (buffers.next(), buffers.next(), buffers.next(), buffers.next()) {
            (
                Some(infer_features),
                Some(infer_predictions),
                Some(train_features),
                Some(train_targets),
            ) => Ok(Self {
                infer_features,
                infer_predictions,
                train_features,
                train_targets,
            }),
            _ => Err(Error::ResourceExhaustion(
                "Allocating frame buffers".into(),
            )),
        }
    }

    pub fn handles(&self) -> FrameBufferHandles {
        FrameBufferHandles {
            infer_features: self.infer_features.descriptor(),
            infer_predictions: self.infer_predictions.descriptor(),
            train_features: self.train_features.descriptor(),
            train_targets: self.train_targets.descriptor(),
        }
    }

    /// Total size of the buffers in bytes.
    pub fn size_bytes(&self) -> u64 {
        [
            &self.infer_features,
            &self.infer_predictions,
            &self.train_features,
            &self.train_targets,
        ]
        .iter()
        .map(|buffer| buffer.descriptor().size_bytes)
        .sum()
    }
}

impl FrameBufferHandles {
    pub fn iter(&self) -> impl Iterator<Item = &ExternalMemoryDescriptor> {
        [
            &self.infer_features,
            &self.infer_predictions,
            &self.train_features,
            &self.train_targets,
        ]
        .into_iter()
    }
}

impl ImportedFrameBuffers {
    pub fn import(
        instance: &Instance,
        handles: &FrameBufferHandles,
    ) -> Result<Self> {
        Ok(Self {
            infer_features: ImportedBuffer::import(instance, &handles.infer_features)?,
            infer_predictions: ImportedBuffer::import(
                instance,
                &handles.infer_predictions,
            )?,
            train_features: ImportedBuffer::import(instance, &handles.train_features)?,
            train_targets: ImportedBuffer::import(instance, &handles.train_targets)?,
        })
    }
}

/// Random streams of a frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u64)]
pub enum SampleStream {
    Primary = 1,
    Train = 2,
    Reference = 3,
}

/// Returns an independent generator for one sample of one frame.
pub fn sample_rng(
    constants: &PushConstants,
    stream: SampleStream,
    index: u64,
) -> StdRng {
    let key = mix(constants.seed ^ mix(stream as u64));
    let key = mix(key ^ constants.frame_index);
    StdRng::seed_from_u64(mix(key ^ index))
}

/// The SplitMix64 finalizer.
#[inline]
const fn mix(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
