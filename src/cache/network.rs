//! The cache network.

pub use super::*;

use burn::{
    nn::{Linear, LinearConfig, Relu},
    tensor::TensorData,
};

/// Fully fused MLP over encoded positions and directions.
///
/// ```plaintext
/// [position | direction] -> encode -> (Linear -> ReLU) x depth -> Linear -> RGB
/// ```
#[derive(Debug, Module)]
pub struct CacheNetwork<B: Backend> {
    pub position: PositionEncoder<B>,
    pub direction: DirectionEncoder,
    pub hidden: Vec<Linear<B>>,
    pub output: Linear<B>,
    pub activation: Relu,
}

impl<B: Backend> CacheNetwork<B> {
    pub fn new(
        config: &NrcConfig,
        device: &B::Device,
    ) -> Self {
        let width = config.network_width as usize;
        let hidden = (0..config.network_depth as usize)
            .map(|layer| {
                let input_count = if layer == 0 {
                    config.input_feature_count()
                } else {
                    width
                };
                LinearConfig::new(input_count, width).init(device)
            })
            .collect();

        Self {
            position: PositionEncoder::new(config, device),
            direction: DirectionEncoder::new(config),
            hidden,
            output: LinearConfig::new(width, 3).init(device),
            activation: Relu::new(),
        }
    }

    /// Predicts RGB radiance of feature records.
    ///
    /// ## Shapes
    ///
    /// * `features` - `[N * 5]`
    /// * `output` - `[N, 3]`
    pub fn forward(
        &self,
        features: &[f32],
        device: &B::Device,
    ) -> Result<Tensor<B, 2>> {
        let records = bytemuck::try_cast_slice::<_, FeatureRecord>(features)?;
        let record_count = records.len();

        let positions = records
            .iter()
            .flat_map(|record| record.position)
            .collect::<Vec<_>>();
        let directions = records
            .iter()
            .flat_map(|record| record.direction)
            .collect::<Vec<_>>();

        let positions = self.position.forward(positions, device);
        let directions = self.direction.forward(Tensor::<B, 2>::from_data(
            TensorData::new(directions, [record_count, 2]),
            device,
        ));

        let mut hidden = Tensor::cat(vec![positions, directions], 1);
        for layer in &self.hidden {
            hidden = self.activation.forward(layer.forward(hidden));
        }

        Ok(self.output.forward(hidden))
    }

    /// Moves every parameter toward `current`.
    ///
    /// `self = decay * self + (1 - decay) * current`
    pub fn blend(
        mut self,
        current: &Self,
        decay: f64,
    ) -> Self {
        if let (Some(shadow), Some(current)) =
            (&mut self.position.hash_grid, &current.position.hash_grid)
        {
            shadow.table = blend_param(&shadow.table, &current.table, decay);
        }
        for (shadow, current) in self.hidden.iter_mut().zip(&current.hidden) {
            blend_linear(shadow, current, decay);
        }
        blend_linear(&mut self.output, &current.output, decay);

        self
    }
}

fn blend_linear<B: Backend>(
    shadow: &mut Linear<B>,
    current: &Linear<B>,
    decay: f64,
) {
    shadow.weight = blend_param(&shadow.weight, &current.weight, decay);
    if let (Some(bias), Some(current)) = (&shadow.bias, &current.bias) {
        shadow.bias = Some(blend_param(bias, current, decay));
    }
}

fn blend_param<B: Backend, const D: usize>(
    shadow: &Param<Tensor<B, D>>,
    current: &Param<Tensor<B, D>>,
    decay: f64,
) -> Param<Tensor<B, D>> {
    Param::from_tensor(
        shadow
            .val()
            .mul_scalar(decay)
            .add(current.val().mul_scalar(1.0 - decay)),
    )
}
