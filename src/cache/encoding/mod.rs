//! Input encodings of the cache network.

pub mod frequency;
pub mod hash_grid;
pub mod one_blob;

pub use super::*;
pub use frequency::*;
pub use hash_grid::*;
pub use one_blob::*;

use burn::tensor::TensorData;

/// The position encoding chosen at construction.
#[derive(Debug, Module)]
pub struct PositionEncoder<B: Backend> {
    pub hash_grid: Option<HashGrid<B>>,
    pub frequency: Option<FrequencyEncoding>,
}

/// The direction encoding chosen at construction.
#[derive(Module, Clone, Debug)]
pub struct DirectionEncoder {
    pub one_blob: Option<OneBlobEncoding>,
    pub frequency: Option<FrequencyEncoding>,
}

impl<B: Backend> PositionEncoder<B> {
    pub fn new(
        config: &NrcConfig,
        device: &B::Device,
    ) -> Self {
        match config.position_encoding {
            PositionEncoding::HashGrid => Self {
                hash_grid: Some(config.hash_grid.init(device)),
                frequency: None,
            },
            PositionEncoding::Frequency => Self {
                hash_grid: None,
                frequency: Some(config.position_frequency.init()),
            },
            PositionEncoding::Identity => Self {
                hash_grid: None,
                frequency: None,
            },
        }
    }

    /// ## Shapes
    ///
    /// * `positions` - `[N * 3]`
    /// * `output` - `[N, position_feature_count]`
    pub fn forward(
        &self,
        positions: Vec<f32>,
        device: &B::Device,
    ) -> Tensor<B, 2> {
        if let Some(hash_grid) = &self.hash_grid {
            return hash_grid.forward(&positions, device);
        }

        let point_count = positions.len() / 3;
        let positions =
            Tensor::from_data(TensorData::new(positions, [point_count, 3]), device);
        match &self.frequency {
            Some(frequency) => frequency.forward(positions),
            None => positions,
        }
    }
}

impl DirectionEncoder {
    pub fn new(config: &NrcConfig) -> Self {
        match config.direction_encoding {
            DirectionEncoding::OneBlob => Self {
                one_blob: Some(config.one_blob.init()),
                frequency: None,
            },
            DirectionEncoding::Frequency => Self {
                one_blob: None,
                frequency: Some(config.direction_frequency.init()),
            },
            DirectionEncoding::Identity => Self {
                one_blob: None,
                frequency: None,
            },
        }
    }

    /// ## Shapes
    ///
    /// * `directions` - `[N, 2]`
    /// * `output` - `[N, direction_feature_count]`
    pub fn forward<B: Backend>(
        &self,
        directions: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        match (&self.one_blob, &self.frequency) {
            (Some(one_blob), _) => one_blob.forward(directions),
            (None, Some(frequency)) => frequency.forward(directions),
            (None, None) => directions,
        }
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn feature_counts_match_config() {
        use super::*;
        use burn::backend::NdArray;

        let device = Default::default();
        let positions = vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6];
        let directions =
            Tensor::<NdArray<f32>, 2>::from_data([[0.1, 0.2], [0.3, 0.4]], &device);

        for (position_encoding, direction_encoding) in [
            (PositionEncoding::HashGrid, DirectionEncoding::OneBlob),
            (PositionEncoding::Frequency, DirectionEncoding::Frequency),
            (PositionEncoding::Identity, DirectionEncoding::Identity),
        ] {
            let config = NrcConfig::new(16, 16, 4, 4)
                .with_position_encoding(position_encoding)
                .with_direction_encoding(direction_encoding)
                .with_hash_grid(HashGridConfig::new().with_table_size(1 << 8));

            let position = PositionEncoder::<NdArray<f32>>::new(&config, &device)
                .forward(positions.to_owned(), &device);
            let direction = DirectionEncoder::new(&config).forward(directions.to_owned());

            assert_eq!(position.dims(), [2, config.position_feature_count()]);
            assert_eq!(direction.dims(), [2, config.direction_feature_count()]);
        }
    }
}
