//! The trainable cache model.

pub use super::*;

use burn::{
    optim::{AdamConfig, GradientsParams, Optimizer, SgdConfig},
    tensor::TensorData,
};
use std::fmt;

/// Second moment decay of the Adam optimizer.
pub const ADAM_BETA_2: f32 = 0.99;

/// An optimizer bound to [`CacheNetwork`].
pub trait ParameterStepper<B: AutodiffBackend>: Send {
    fn step(
        &mut self,
        learning_rate: f64,
        network: CacheNetwork<B>,
        grads: GradientsParams,
    ) -> CacheNetwork<B>;
}

/// The network, its optimizer state and its inference shadow.
///
/// ## Details
///
/// The parameters live for the whole session and are updated by one gradient
/// step per training batch. If `ema_decay` is positive, inference reads an
/// exponential moving average of the parameters instead of the latest ones.
pub struct CacheModel<B: AutodiffBackend> {
    network: CacheNetwork<B>,
    shadow: Option<CacheNetwork<B::InnerBackend>>,
    optimizer: Box<dyn ParameterStepper<B>>,
    device: B::Device,
    loss_function: LossFunction,
    learning_rate: f64,
    ema_decay: f64,
    train_batch_limit: Option<u64>,
    trained_batch_count: u64,
}

impl<B, O> ParameterStepper<B> for O
where
    B: AutodiffBackend,
    O: Optimizer<CacheNetwork<B>, B>,
{
    #[inline]
    fn step(
        &mut self,
        learning_rate: f64,
        network: CacheNetwork<B>,
        grads: GradientsParams,
    ) -> CacheNetwork<B> {
        <O as Optimizer<CacheNetwork<B>, B>>::step(self, learning_rate, network, grads)
    }
}

impl<B: AutodiffBackend> CacheModel<B> {
    /// Initializes the parameters from `config.seed`.
    pub fn new(
        config: &NrcConfig,
        device: &B::Device,
    ) -> Result<Self> {
        config.validate()?;

        B::seed(config.seed);
        let network = CacheNetwork::<B>::new(config, device);
        let shadow = (config.ema_decay > 0.0).then(|| network.valid());
        let optimizer: Box<dyn ParameterStepper<B>> = match config.optimizer {
            OptimizerKind::Adam => Box::new(
                AdamConfig::new()
                    .with_beta_2(ADAM_BETA_2)
                    .init::<B, CacheNetwork<B>>(),
            ),
            OptimizerKind::Sgd => {
                Box::new(SgdConfig::new().init::<B, CacheNetwork<B>>())
            },
        };

        log::info!(
            target: "nrc_renderer::cache",
            "model > {} parameters, {:?}, {:?}",
            network.num_params(),
            config.optimizer,
            config.loss_function,
        );

        Ok(Self {
            network,
            shadow,
            optimizer,
            device: device.to_owned(),
            loss_function: config.loss_function,
            learning_rate: config.learning_rate,
            ema_decay: config.ema_decay,
            train_batch_limit: config.train_batch_limit,
            trained_batch_count: 0,
        })
    }

    #[inline]
    pub fn network(&self) -> &CacheNetwork<B> {
        &self.network
    }

    #[inline]
    pub fn trained_batch_count(&self) -> u64 {
        self.trained_batch_count
    }

    /// Returns `true` once `train_batch_limit` batches were trained.
    #[inline]
    pub fn is_training_finished(&self) -> bool {
        self.train_batch_limit
            .is_some_and(|limit| self.trained_batch_count >= limit)
    }
}

impl<B: AutodiffBackend> RadianceCache for CacheModel<B> {
    fn infer(
        &mut self,
        features: &[f32],
        predictions: &mut [f32],
    ) -> Result<()> {
        let records =
            bytemuck::try_cast_slice_mut::<_, PredictionRecord>(predictions)?;
        if features.len() / FEATURE_RECORD_LEN != records.len() {
            return Err(Error::Layout(format!(
                "{} feature floats for {} prediction records",
                features.len(),
                records.len(),
            )));
        }

        let output = match &self.shadow {
            Some(shadow) => shadow.forward(features, &self.device)?,
            None => self.network.valid().forward(features, &self.device)?,
        };
        let output = output.into_data().convert::<f32>().to_vec::<f32>()?;

        records
            .iter_mut()
            .zip(output.chunks_exact(3))
            .for_each(|(record, rgb)| {
                record.radiance = [rgb[0], rgb[1], rgb[2], 1.0];
            });

        Ok(())
    }

    fn train(
        &mut self,
        features: &[f32],
        targets: &[f32],
    ) -> Result<Option<f32>> {
        if self.is_training_finished() {
            return Ok(None);
        }

        let record_count = bytemuck::try_cast_slice::<_, TargetRecord>(targets)?.len();
        if features.len() / FEATURE_RECORD_LEN != record_count {
            return Err(Error::Layout(format!(
                "{} feature floats for {record_count} target records",
                features.len(),
            )));
        }

        let prediction = self.network.forward(features, &self.device)?;
        let target = Tensor::<B, 2>::from_data(
            TensorData::new(targets.to_vec(), [record_count, TARGET_RECORD_LEN]),
            &self.device,
        )
        .slice([0..record_count, 0..3]);

        let loss = self.loss_function.forward(prediction, target);
        let grads = GradientsParams::from_grads(loss.backward(), &self.network);
        let loss = loss.into_scalar().elem::<f32>();

        self.network = self.optimizer.step(
            self.learning_rate,
            self.network.to_owned(),
            grads,
        );
        self.trained_batch_count += 1;

        if let Some(shadow) = self.shadow.take() {
            self.shadow = Some(shadow.blend(&self.network.valid(), self.ema_decay));
        }

        if !loss.is_finite() {
            log::warn!(
                target: "nrc_renderer::cache",
                "train > non-finite loss at batch {}",
                self.trained_batch_count,
            );
        }

        Ok(Some(loss))
    }
}

impl<B: AutodiffBackend> fmt::Debug for CacheModel<B> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("CacheModel")
            .field("network", &self.network)
            .field("shadow", &self.shadow.is_some())
            .field("loss_function", &self.loss_function)
            .field("learning_rate", &self.learning_rate)
            .field("ema_decay", &self.ema_decay)
            .field("train_batch_limit", &self.train_batch_limit)
            .field("trained_batch_count", &self.trained_batch_count)
            .finish()
    }
}
