//! The neural radiance cache and the tensor runtime side of the bridge.

pub mod bridge;
pub mod encoding;
pub mod loss;
pub mod model;
pub mod network;

pub use crate::pipeline::*;
pub use bridge::*;
pub use burn::{
    module::{AutodiffModule, Module, Param},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Tensor,
    },
};
pub use encoding::*;
pub use loss::*;
pub use model::*;
pub use network::*;

/// A cache driven through batch buffers only.
///
/// ## Details
///
/// Both slices hold whole batches of records laid out as
/// [`FeatureRecord`], [`PredictionRecord`] and [`TargetRecord`].
pub trait RadianceCache: Send {
    /// Writes one prediction record per feature record.
    fn infer(
        &mut self,
        features: &[f32],
        predictions: &mut [f32],
    ) -> Result<()>;

    /// Performs one gradient step.
    ///
    /// It returns the loss, or `None` if training has stopped.
    fn train(
        &mut self,
        features: &[f32],
        targets: &[f32],
    ) -> Result<Option<f32>>;
}
