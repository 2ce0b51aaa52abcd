//! One-blob encoding.

pub use super::*;

/// Gaussian kernels centered on `bin_count` equal bins of `[0, 1]`.
///
/// `x -> exp(-(x - c_k)^2 / (2 * sigma^2))`, `c_k = (k + 0.5) / bin_count`,
/// `sigma = 1 / bin_count`
#[derive(Module, Clone, Debug)]
pub struct OneBlobEncoding {
    pub bin_count: usize,
}

impl OneBlobConfig {
    pub fn init(&self) -> OneBlobEncoding {
        OneBlobEncoding {
            bin_count: self.bin_count as usize,
        }
    }
}

impl OneBlobEncoding {
    /// ## Shapes
    ///
    /// * `input` - `[N, D]` in `[0, 1]`
    /// * `output` - `[N, D * bin_count]`
    pub fn forward<B: Backend>(
        &self,
        input: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        let bin_count = self.bin_count.max(1) as f64;
        let sigma = 1.0 / bin_count;
        let scale = -0.5 / (sigma * sigma);

        let kernels = (0..self.bin_count)
            .map(|k| {
                let center = (k as f64 + 0.5) / bin_count;
                input
                    .to_owned()
                    .sub_scalar(center)
                    .powf_scalar(2.0)
                    .mul_scalar(scale)
                    .exp()
            })
            .collect::<Vec<_>>();
        Tensor::cat(kernels, 1)
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn forward() {
        use super::*;

        use burn::{backend::NdArray, tensor::TensorData};

        let device = Default::default();
        let encoding = OneBlobConfig::new().with_bin_count(2).init();
        let input = Tensor::<NdArray<f32>, 2>::from_data([[0.25, 0.75]], &device);

        let output = encoding.forward(input);
        // Offsets of 0 and 0.5 from the centers, sigma = 0.5
        let far = (-0.5_f32).exp();
        output
            .into_data()
            .assert_approx_eq(&TensorData::from([[1.0, far, far, 1.0]]), 5);
    }
}
