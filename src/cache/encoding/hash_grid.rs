//! Multi-resolution hash grid encoding.

pub use super::*;

use burn::tensor::{Distribution, Int, TensorData};
use rayon::prelude::*;

/// Corners of a grid cell.
pub const CORNER_COUNT: usize = 8;

/// The spatial hash primes.
pub const HASH_PRIMES: [u32; 3] = [1, 2654435761, 805459861];

/// Trainable feature tables over nested grids.
///
/// ## Details
///
/// Each level maps the vertices of a grid to `table_size` entries of
/// `feature_count` features, densely if the grid fits and by spatial hash
/// otherwise. A position reads the trilinear interpolation of its cell corners
/// at every level.
#[derive(Debug, Module)]
pub struct HashGrid<B: Backend> {
    /// `[level_count * table_size, feature_count]`
    pub table: Param<Tensor<B, 2>>,
    pub level_count: usize,
    pub table_size: usize,
    pub feature_count: usize,
    pub min_resolution: usize,
    pub max_resolution: usize,
}

/// The table rows and interpolation weights of a batch.
#[derive(Clone, Debug, PartialEq)]
pub struct HashGridCorners {
    /// `[N * level_count * 8]`
    pub indices: Vec<i32>,
    /// `[N * level_count * 8]`
    pub weights: Vec<f32>,
}

impl HashGridConfig {
    /// Initialize the tables with small uniform values.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> HashGrid<B> {
        let level_count = self.level_count as usize;
        let table_size = self.table_size as usize;
        let feature_count = self.feature_count as usize;
        let table = Tensor::random(
            [level_count * table_size, feature_count],
            Distribution::Uniform(-1e-4, 1e-4),
            device,
        );

        HashGrid {
            table: Param::from_tensor(table),
            level_count,
            table_size,
            feature_count,
            min_resolution: self.min_resolution as usize,
            max_resolution: self.max_resolution as usize,
        }
    }
}

impl<B: Backend> HashGrid<B> {
    pub fn config(&self) -> HashGridConfig {
        HashGridConfig {
            level_count: self.level_count as u32,
            table_size: self.table_size as u32,
            feature_count: self.feature_count as u32,
            min_resolution: self.min_resolution as u32,
            max_resolution: self.max_resolution as u32,
        }
    }

    /// Encodes normalized positions.
    ///
    /// ## Shapes
    ///
    /// * `positions` - `[N * 3]` in `[0, 1]`
    /// * `output` - `[N, level_count * feature_count]`
    pub fn forward(
        &self,
        positions: &[f32],
        device: &B::Device,
    ) -> Tensor<B, 2> {
        let point_count = positions.len() / 3;
        let level_count = self.level_count;
        let feature_count = self.feature_count;
        let row_count = point_count * level_count * CORNER_COUNT;

        let corners =
            hash_grid_corners(positions, &self.config().resolutions(), self.table_size);
        let indices = Tensor::<B, 1, Int>::from_data(
            TensorData::new(corners.indices, [row_count]),
            device,
        );
        let weights = Tensor::<B, 2>::from_data(
            TensorData::new(corners.weights, [row_count, 1]),
            device,
        )
        .repeat_dim(1, feature_count);

        self.table
            .val()
            .select(0, indices)
            .mul(weights)
            .reshape([point_count, level_count, CORNER_COUNT, feature_count])
            .sum_dim(2)
            .reshape([point_count, level_count * feature_count])
    }
}

/// Computes the table rows and trilinear weights of every cell corner.
///
/// Positions outside `[0, 1]` are clamped.
pub fn hash_grid_corners(
    positions: &[f32],
    resolutions: &[u32],
    table_size: usize,
) -> HashGridCorners {
    let point_count = positions.len() / 3;
    let stride = resolutions.len() * CORNER_COUNT;
    let mut indices = vec![0_i32; point_count * stride];
    let mut weights = vec![0.0_f32; point_count * stride];

    indices
        .par_chunks_mut(stride.max(1))
        .zip(weights.par_chunks_mut(stride.max(1)))
        .zip(positions.par_chunks_exact(3))
        .for_each(|((indices, weights), position)| {
            for (level, &resolution) in resolutions.iter().enumerate() {
                let resolution = resolution.max(1);
                let mut cell = [0_u32; 3];
                let mut fraction = [0.0_f32; 3];
                for axis in 0..3 {
                    let scaled = position[axis].clamp(0.0, 1.0) * resolution as f32;
                    let floor = (scaled.floor() as u32).min(resolution - 1);
                    cell[axis] = floor;
                    fraction[axis] = scaled - floor as f32;
                }

                let offset = level * table_size;
                for corner in 0..CORNER_COUNT {
                    let mut vertex = cell;
                    let mut weight = 1.0;
                    for axis in 0..3 {
                        if corner >> axis & 1 == 1 {
                            vertex[axis] += 1;
                            weight *= fraction[axis];
                        } else {
                            weight *= 1.0 - fraction[axis];
                        }
                    }

                    let slot = level * CORNER_COUNT + corner;
                    indices[slot] =
                        (offset + grid_index(vertex, resolution, table_size)) as i32;
                    weights[slot] = weight;
                }
            }
        });

    HashGridCorners { indices, weights }
}

/// Maps a grid vertex to its table entry.
#[inline]
pub fn grid_index(
    vertex: [u32; 3],
    resolution: u32,
    table_size: usize,
) -> usize {
    let side = resolution as u64 + 1;
    if side * side * side <= table_size as u64 {
        return (vertex[0] as u64 + vertex[1] as u64 * side + vertex[2] as u64 * side * side)
            as usize;
    }

    let hash = (vertex[0].wrapping_mul(HASH_PRIMES[0]))
        ^ (vertex[1].wrapping_mul(HASH_PRIMES[1]))
        ^ (vertex[2].wrapping_mul(HASH_PRIMES[2]));
    hash as usize % table_size
}
