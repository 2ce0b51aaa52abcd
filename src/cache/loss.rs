//! Training losses.

pub use super::*;

/// The bias of the relative L2 denominator.
pub const RELATIVE_L2_EPSILON: f64 = 1e-2;

impl LossFunction {
    /// Reduces the per-channel loss to its mean.
    ///
    /// ## Shapes
    ///
    /// * `prediction` - `[N, 3]`
    /// * `target` - `[N, 3]`
    /// * `output` - `[1]`
    pub fn forward<B: Backend>(
        &self,
        prediction: Tensor<B, 2>,
        target: Tensor<B, 2>,
    ) -> Tensor<B, 1> {
        match self {
            Self::L2 => {
                let error = prediction.sub(target);
                error.to_owned().mul(error).mean()
            },
            Self::RelativeL2 => {
                let scale = prediction.to_owned().detach();
                let scale = scale.to_owned().mul(scale).add_scalar(RELATIVE_L2_EPSILON);
                let error = prediction.sub(target);
                error.to_owned().mul(error).div(scale).mean()
            },
            Self::Log => {
                let error = prediction
                    .clamp_min(0.0)
                    .log1p()
                    .sub(target.clamp_min(0.0).log1p());
                error.to_owned().mul(error).mean()
            },
        }
    }
}
