//! Frequency encoding.

pub use super::*;

use std::f64::consts::PI;

/// Sine and cosine bands at doubling frequencies.
///
/// `x -> [sin(2^k * pi * x), cos(2^k * pi * x)] for k in 0..freq_count`
#[derive(Module, Clone, Debug)]
pub struct FrequencyEncoding {
    pub freq_count: usize,
}

impl FrequencyConfig {
    pub fn init(&self) -> FrequencyEncoding {
        FrequencyEncoding {
            freq_count: self.freq_count as usize,
        }
    }
}

impl FrequencyEncoding {
    /// ## Shapes
    ///
    /// * `input` - `[N, D]`
    /// * `output` - `[N, D * 2 * freq_count]`
    pub fn forward<B: Backend>(
        &self,
        input: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        let bands = (0..self.freq_count)
            .flat_map(|k| {
                let scaled = input.to_owned().mul_scalar(PI * (1 << k) as f64);
                [scaled.to_owned().sin(), scaled.cos()]
            })
            .collect::<Vec<_>>();
        Tensor::cat(bands, 1)
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn forward() {
        use super::*;

        use burn::{backend::NdArray, tensor::TensorData};

        let device = Default::default();
        let encoding = FrequencyConfig::new().with_freq_count(2).init();
        let input = Tensor::<NdArray<f32>, 2>::from_data([[0.5, 0.25]], &device);

        let output = encoding.forward(input);
        let s = std::f32::consts::FRAC_1_SQRT_2;
        output.into_data().assert_approx_eq(
            &TensorData::from([[1.0, s, 0.0, s, 0.0, 1.0, -1.0, 0.0]]),
            5,
        );
    }
}
