//! Session configuration.
//!
//! Every option is fixed at construction. Changing any of them requires
//! building a new session.

pub use crate::error::Error;
pub use burn::config::Config;

use std::time::Duration;

/// The loss between predicted and target radiance.
#[derive(Config, Copy, Debug, Eq, PartialEq)]
pub enum LossFunction {
    /// `(P - T)^2`
    L2,
    /// `(P - T)^2 / (sg(P)^2 + 0.01)`
    RelativeL2,
    /// `(ln(1 + P) - ln(1 + T))^2`
    Log,
}

/// The encoding applied to the position before the first layer.
#[derive(Config, Copy, Debug, Eq, PartialEq)]
pub enum PositionEncoding {
    /// Multi-resolution hash grid with trainable tables.
    HashGrid,
    /// Sine and cosine frequency bands.
    Frequency,
    /// The normalized position as is.
    Identity,
}

/// The encoding applied to the direction before the first layer.
#[derive(Config, Copy, Debug, Eq, PartialEq)]
pub enum DirectionEncoding {
    /// Gaussian kernels over fixed bins.
    OneBlob,
    /// Sine and cosine frequency bands.
    Frequency,
    /// The normalized spherical direction as is.
    Identity,
}

/// The gradient step rule.
#[derive(Config, Copy, Debug, Eq, PartialEq)]
pub enum OptimizerKind {
    Adam,
    Sgd,
}

/// The configuration of the multi-resolution hash grid encoding.
#[derive(Config, Copy, Debug, PartialEq)]
pub struct HashGridConfig {
    /// Level count.
    #[config(default = 16)]
    pub level_count: u32,
    /// Entries per level. It should be a power of two.
    #[config(default = 16384)]
    pub table_size: u32,
    /// Features per entry.
    #[config(default = 2)]
    pub feature_count: u32,
    /// Grid resolution of the coarsest level.
    #[config(default = 16)]
    pub min_resolution: u32,
    /// Grid resolution of the finest level.
    #[config(default = 512)]
    pub max_resolution: u32,
}

/// The configuration of a frequency encoding.
#[derive(Config, Copy, Debug, PartialEq)]
pub struct FrequencyConfig {
    /// Frequency bands per component.
    #[config(default = 6)]
    pub freq_count: u32,
}

/// The configuration of the one-blob encoding.
#[derive(Config, Copy, Debug, PartialEq)]
pub struct OneBlobConfig {
    /// Bins per component.
    #[config(default = 4)]
    pub bin_count: u32,
}

/// The configuration of a renderer session.
#[derive(Config, Debug, PartialEq)]
pub struct NrcConfig {
    /// Width of the rendered image.
    pub render_width: u32,
    /// Height of the rendered image.
    pub render_height: u32,
    /// Width of the training sample grid.
    pub train_width: u32,
    /// Height of the training sample grid.
    pub train_height: u32,
    /// Training samples per training pixel. `0` freezes the cache.
    #[config(default = 1)]
    pub train_samples_per_pixel: u32,

    /// Records per batch. It should be a power of two dividing both record counts.
    #[config(default = 16384)]
    pub batch_size: u32,
    #[config(default = 1e-2)]
    pub learning_rate: f64,
    #[config(default = "LossFunction::RelativeL2")]
    pub loss_function: LossFunction,
    #[config(default = "OptimizerKind::Adam")]
    pub optimizer: OptimizerKind,
    /// Decay of the parameter shadow used for inference. `0.0` disables it.
    #[config(default = 0.9)]
    pub ema_decay: f64,
    /// Stop training after this many batches.
    pub train_batch_limit: Option<u64>,

    #[config(default = "PositionEncoding::HashGrid")]
    pub position_encoding: PositionEncoding,
    #[config(default = "HashGridConfig::new()")]
    pub hash_grid: HashGridConfig,
    #[config(default = "FrequencyConfig::new().with_freq_count(12)")]
    pub position_frequency: FrequencyConfig,
    #[config(default = "DirectionEncoding::OneBlob")]
    pub direction_encoding: DirectionEncoding,
    #[config(default = "OneBlobConfig::new()")]
    pub one_blob: OneBlobConfig,
    #[config(default = "FrequencyConfig::new().with_freq_count(4)")]
    pub direction_frequency: FrequencyConfig,

    /// Hidden layer width.
    #[config(default = 64)]
    pub network_width: u32,
    /// Hidden layer count.
    #[config(default = 4)]
    pub network_depth: u32,

    /// Seed of the frame random sequence and the parameter initialization.
    #[config(default = 0x3D65)]
    pub seed: u64,
    /// Upper bound of any semaphore wait, in milliseconds.
    #[config(default = 10_000)]
    pub sync_timeout_ms: u64,
}

/// Upper bound of [`NrcConfig::network_width`].
pub const NETWORK_WIDTH_MAX: u32 = 1024;
/// Upper bound of [`NrcConfig::network_depth`].
pub const NETWORK_DEPTH_MAX: u32 = 32;
/// Upper bound of [`HashGridConfig::level_count`].
pub const HASH_GRID_LEVEL_COUNT_MAX: u32 = 32;
/// Bounds of [`HashGridConfig::table_size`].
pub const HASH_GRID_TABLE_SIZE_RANGE: (u32, u32) = (1 << 4, 1 << 24);
/// Upper bound of [`FrequencyConfig::freq_count`].
pub const FREQUENCY_COUNT_MAX: u32 = 16;
/// Upper bound of [`OneBlobConfig::bin_count`].
pub const ONE_BLOB_BIN_COUNT_MAX: u32 = 64;

macro_rules! ensure {
    ($condition: expr, $subject: expr, $expected: expr $(,)?) => {
        if !$condition {
            return Err(Error::Configuration($subject.into(), $expected.into()));
        }
    };
}

impl NrcConfig {
    /// Derives the training grid from a sample ratio of the render pixels.
    ///
    /// `train_width * train_height ≈ render_width * render_height * ratio`
    pub fn with_train_ratio(
        mut self,
        ratio: f64,
    ) -> Self {
        let scale = ratio.clamp(0.0, 1.0).sqrt();
        self.train_width = (self.render_width as f64 * scale).round() as u32;
        self.train_height = (self.render_height as f64 * scale).round() as u32;
        self
    }

    /// `renderWidth * renderHeight`
    #[inline]
    pub const fn infer_record_count(&self) -> u64 {
        self.render_width as u64 * self.render_height as u64
    }

    /// `trainWidth * trainHeight * trainSamplesPerPixel`
    #[inline]
    pub const fn train_record_count(&self) -> u64 {
        self.train_width as u64
            * self.train_height as u64
            * self.train_samples_per_pixel as u64
    }

    #[inline]
    pub const fn is_training_enabled(&self) -> bool {
        self.train_record_count() != 0
    }

    #[inline]
    pub fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }

    /// Feature count after the position encoding.
    pub fn position_feature_count(&self) -> usize {
        match self.position_encoding {
            PositionEncoding::HashGrid => {
                (self.hash_grid.level_count * self.hash_grid.feature_count)
                    as usize
            },
            PositionEncoding::Frequency => {
                3 * 2 * self.position_frequency.freq_count as usize
            },
            PositionEncoding::Identity => 3,
        }
    }

    /// Feature count after the direction encoding.
    pub fn direction_feature_count(&self) -> usize {
        match self.direction_encoding {
            DirectionEncoding::OneBlob => 2 * self.one_blob.bin_count as usize,
            DirectionEncoding::Frequency => {
                2 * 2 * self.direction_frequency.freq_count as usize
            },
            DirectionEncoding::Identity => 2,
        }
    }

    /// Width of the first network layer.
    #[inline]
    pub fn input_feature_count(&self) -> usize {
        self.position_feature_count() + self.direction_feature_count()
    }

    /// Checks every constraint that would make the session unusable.
    ///
    /// It runs before any device resource is created.
    pub fn validate(&self) -> crate::error::Result<()> {
        let batch_size = self.batch_size as u64;

        ensure!(
            self.batch_size.is_power_of_two(),
            format!("batch_size ({})", self.batch_size),
            "a power of two",
        );
        ensure!(
            self.render_width != 0 && self.render_height != 0,
            format!(
                "render size ({}x{})",
                self.render_width, self.render_height
            ),
            "non-empty",
        );
        ensure!(
            self.infer_record_count() % batch_size == 0,
            format!(
                "render pixel count ({})",
                self.infer_record_count()
            ),
            format!("a multiple of batch_size ({batch_size})"),
        );
        ensure!(
            self.train_width <= self.render_width
                && self.train_height <= self.render_height,
            format!("train size ({}x{})", self.train_width, self.train_height),
            format!(
                "no larger than render size ({}x{})",
                self.render_width, self.render_height
            ),
        );
        ensure!(
            self.train_samples_per_pixel == 0
                || (self.train_width != 0 && self.train_height != 0),
            format!("train size ({}x{})", self.train_width, self.train_height),
            "non-empty while training is enabled",
        );
        ensure!(
            self.train_record_count() % batch_size == 0,
            format!(
                "train sample count ({})",
                self.train_record_count()
            ),
            format!("a multiple of batch_size ({batch_size})"),
        );
        ensure!(
            self.learning_rate.is_finite() && self.learning_rate > 0.0,
            format!("learning_rate ({})", self.learning_rate),
            "finite and positive",
        );
        ensure!(
            (0.0..1.0).contains(&self.ema_decay),
            format!("ema_decay ({})", self.ema_decay),
            "in [0, 1)",
        );
        ensure!(
            (1..=NETWORK_WIDTH_MAX).contains(&self.network_width),
            format!("network_width ({})", self.network_width),
            format!("in [1, {NETWORK_WIDTH_MAX}]"),
        );
        ensure!(
            (1..=NETWORK_DEPTH_MAX).contains(&self.network_depth),
            format!("network_depth ({})", self.network_depth),
            format!("in [1, {NETWORK_DEPTH_MAX}]"),
        );
        ensure!(
            self.sync_timeout_ms != 0,
            "sync_timeout_ms (0)",
            "positive",
        );

        match self.position_encoding {
            PositionEncoding::HashGrid => self.hash_grid.validate()?,
            PositionEncoding::Frequency => self.position_frequency.validate()?,
            PositionEncoding::Identity => {},
        }
        match self.direction_encoding {
            DirectionEncoding::OneBlob => self.one_blob.validate()?,
            DirectionEncoding::Frequency => self.direction_frequency.validate()?,
            DirectionEncoding::Identity => {},
        }

        Ok(())
    }
}

impl HashGridConfig {
    pub fn validate(&self) -> crate::error::Result<()> {
        let (table_size_min, table_size_max) = HASH_GRID_TABLE_SIZE_RANGE;

        ensure!(
            (1..=HASH_GRID_LEVEL_COUNT_MAX).contains(&self.level_count),
            format!("hash_grid.level_count ({})", self.level_count),
            format!("in [1, {HASH_GRID_LEVEL_COUNT_MAX}]"),
        );
        ensure!(
            self.table_size.is_power_of_two()
                && (table_size_min..=table_size_max).contains(&self.table_size),
            format!("hash_grid.table_size ({})", self.table_size),
            format!("a power of two in [{table_size_min}, {table_size_max}]"),
        );
        ensure!(
            matches!(self.feature_count, 1 | 2 | 4 | 8),
            format!("hash_grid.feature_count ({})", self.feature_count),
            "one of 1, 2, 4 or 8",
        );
        ensure!(
            self.min_resolution != 0
                && self.min_resolution <= self.max_resolution,
            format!(
                "hash_grid resolutions ({}..{})",
                self.min_resolution, self.max_resolution
            ),
            "positive and ascending",
        );

        Ok(())
    }

    /// Grid resolution of every level, growing geometrically.
    pub fn resolutions(&self) -> Vec<u32> {
        let level_count = self.level_count.max(1);
        if level_count == 1 {
            return vec![self.min_resolution];
        }
        let min = self.min_resolution as f64;
        let max = self.max_resolution as f64;
        let growth = ((max.ln() - min.ln()) / (level_count - 1) as f64).exp();
        (0..level_count)
            .map(|level| (min * growth.powi(level as i32)).floor() as u32)
            .collect()
    }
}

impl FrequencyConfig {
    pub fn validate(&self) -> crate::error::Result<()> {
        ensure!(
            (1..=FREQUENCY_COUNT_MAX).contains(&self.freq_count),
            format!("freq_count ({})", self.freq_count),
            format!("in [1, {FREQUENCY_COUNT_MAX}]"),
        );
        Ok(())
    }
}

impl OneBlobConfig {
    pub fn validate(&self) -> crate::error::Result<()> {
        ensure!(
            (1..=ONE_BLOB_BIN_COUNT_MAX).contains(&self.bin_count),
            format!("one_blob.bin_count ({})", self.bin_count),
            format!("in [1, {ONE_BLOB_BIN_COUNT_MAX}]"),
        );
        Ok(())
    }
}

impl Default for HashGridConfig {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Default for FrequencyConfig {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Default for OneBlobConfig {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}
