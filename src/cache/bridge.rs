//! The tensor runtime side of the hand-off.

pub use super::*;

use std::{
    sync::mpsc,
    thread,
    time::{Duration, Instant},
};

/// The outcome of one tensor-active phase.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TrainReport {
    pub frame_index: u64,
    pub infer_batch_count: u64,
    /// Batches that performed a gradient step.
    pub train_batch_count: u64,
    /// Mean loss of the trained batches, or `None` if none was trained.
    pub mean_loss: Option<f32>,
    pub duration: Duration,
}

/// Imports the shared objects and drives a [`RadianceCache`] over them.
pub struct CacheBridge {
    cache: Box<dyn RadianceCache>,
    plan: BatchPlan,
    buffers: ImportedFrameBuffers,
    sync: SyncPair,
    timeout: Duration,
}

/// The in-order stream of the tensor runtime.
///
/// Each enqueued frame waits on the start semaphore, infers, trains, posts a
/// [`TrainReport`] and signals the finished semaphore. The first failure
/// aborts the semaphore pair and stops the stream.
pub struct TensorStream {
    sender: Option<mpsc::Sender<u64>>,
    reports: mpsc::Receiver<Result<TrainReport>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl CacheBridge {
    /// Imports the buffers and semaphores from their handles.
    pub fn new(
        instance: &Instance,
        cache: Box<dyn RadianceCache>,
        plan: BatchPlan,
        buffers: &FrameBufferHandles,
        sync: &SyncHandlePair,
        timeout: Duration,
    ) -> Result<Self> {
        let buffers = ImportedFrameBuffers::import(instance, buffers)?;
        let sync = instance.import_sync_pair(sync)?;

        Ok(Self {
            cache,
            plan,
            buffers,
            sync,
            timeout,
        })
    }

    #[inline]
    pub fn plan(&self) -> &BatchPlan {
        &self.plan
    }

    /// Waits for the buffers, then infers every batch and trains every batch.
    ///
    /// The buffers stay owned by the tensor side until [`Self::finish`].
    pub fn run_frame(
        &mut self,
        frame_index: u64,
    ) -> Result<TrainReport> {
        self.sync.start.wait(self.timeout)?;
        let started = Instant::now();

        {
            let features = self.buffers.infer_features.read()?;
            let mut predictions = self.buffers.infer_predictions.write()?;
            for batch in self.plan.infer_batches() {
                self.cache.infer(
                    &features[batch.elements(FEATURE_RECORD_LEN)],
                    &mut predictions[batch.elements(PREDICTION_RECORD_LEN)],
                )?;
            }
        }

        let mut loss_sum = 0.0;
        let mut train_batch_count = 0;
        if self.plan.train_batch_count() != 0 {
            let features = self.buffers.train_features.read()?;
            let targets = self.buffers.train_targets.read()?;
            for batch in self.plan.train_batches() {
                let loss = self.cache.train(
                    &features[batch.elements(FEATURE_RECORD_LEN)],
                    &targets[batch.elements(TARGET_RECORD_LEN)],
                )?;
                match loss {
                    Some(loss) => {
                        loss_sum += loss as f64;
                        train_batch_count += 1;
                    },
                    None => break,
                }
            }
        }

        Ok(TrainReport {
            frame_index,
            infer_batch_count: self.plan.infer_batch_count(),
            train_batch_count,
            mean_loss: (train_batch_count != 0)
                .then(|| (loss_sum / train_batch_count as f64) as f32),
            duration: started.elapsed(),
        })
    }

    /// Returns the buffers to the graphics side.
    #[inline]
    pub fn finish(&self) -> Result<()> {
        self.sync.finished.signal()
    }

    #[inline]
    pub fn abort(
        &self,
        reason: &str,
    ) {
        self.sync.abort(reason);
    }
}

impl TensorStream {
    pub fn spawn(mut bridge: CacheBridge) -> Result<Self> {
        let (sender, receiver) = mpsc::channel::<u64>();
        let (report_sender, reports) = mpsc::channel();

        let worker = thread::Builder::new()
            .name("nrc-tensor-stream".into())
            .spawn(move || {
                for frame_index in receiver {
                    let result = bridge.run_frame(frame_index);
                    let failure = match &result {
                        Ok(_) => None,
                        Err(error) => Some(error.to_owned()),
                    };

                    // Reports are posted before the buffers are handed back
                    let _ = report_sender.send(result);
                    let failure = match failure {
                        Some(error) => Some(error),
                        None => bridge.finish().err(),
                    };

                    if let Some(error) = failure {
                        log::error!(
                            target: "nrc_renderer::cache",
                            "stream > frame {frame_index}: {error}",
                        );
                        bridge.abort(&error.to_string());
                        break;
                    }
                }
            })
            .map_err(|error| {
                Error::ResourceExhaustion(format!(
                    "Spawning the tensor stream thread: {error}"
                ))
            })?;

        Ok(Self {
            sender: Some(sender),
            reports,
            worker: Some(worker),
        })
    }

    /// Enqueues the tensor-active phase of a frame without waiting for it.
    pub fn enqueue(
        &self,
        frame_index: u64,
    ) -> Result<()> {
        self.sender
            .as_ref()
            .ok_or_else(|| Error::DeviceLost("The tensor stream is shut down".into()))?
            .send(frame_index)
            .map_err(|_| Error::DeviceLost("The tensor stream exited".into()))
    }

    /// Drains the reports posted so far.
    pub fn try_reports(&self) -> Vec<Result<TrainReport>> {
        self.reports.try_iter().collect()
    }
}

impl Drop for TensorStream {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!(target: "nrc_renderer::cache", "stream > panicked");
            }
        }
    }
}

impl std::fmt::Debug for CacheBridge {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("CacheBridge")
            .field("plan", &self.plan)
            .field("buffers", &self.buffers)
            .field("sync", &self.sync)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl std::fmt::Debug for TensorStream {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("TensorStream")
            .field("running", &self.worker.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    const TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

    /// Predicts a constant and reports the mean target as loss.
    struct ConstantCache {
        value: f32,
        limit: u64,
        trained: u64,
    }

    impl super::RadianceCache for ConstantCache {
        fn infer(
            &mut self,
            _features: &[f32],
            predictions: &mut [f32],
        ) -> super::Result<()> {
            predictions.fill(self.value);
            Ok(())
        }

        fn train(
            &mut self,
            _features: &[f32],
            targets: &[f32],
        ) -> super::Result<Option<f32>> {
            if self.trained == self.limit {
                return Ok(None);
            }
            self.trained += 1;
            Ok(Some(targets.iter().sum::<f32>() / targets.len() as f32))
        }
    }

    struct Setup {
        instance: super::Instance,
        domain: std::sync::Arc<super::HandoffDomain>,
        buffers: super::FrameBuffers,
        pair: super::SyncPair,
        bridge: super::CacheBridge,
    }

    fn setup(limit: u64) -> Setup {
        use super::*;
        use std::sync::Arc;

        let instance = Instance::new();
        let device = GraphicsDevice::new(&instance, TIMEOUT).unwrap();
        let domain = Arc::new(HandoffDomain::new());
        let config = NrcConfig::new(8, 8, 8, 8).with_batch_size(16);
        let plan = BatchPlan::new(&config).unwrap();
        let buffers = FrameBuffers::new(&device, &plan, &domain).unwrap();
        let (pair, handles) = device.create_sync_pair("bridge", &domain);

        let cache = ConstantCache {
            value: 0.5,
            limit,
            trained: 0,
        };
        let bridge = CacheBridge::new(
            &instance,
            Box::new(cache),
            plan,
            &buffers.handles(),
            &handles,
            TIMEOUT,
        )
        .unwrap();

        Setup {
            instance,
            domain,
            buffers,
            pair,
            bridge,
        }
    }

    #[test]
    fn run_frame() {
        use super::*;

        let Setup {
            domain,
            buffers,
            pair,
            mut bridge,
            ..
        } = setup(2);

        buffers.train_targets.write().unwrap().fill(1.0);
        pair.start.signal().unwrap();

        let report = bridge.run_frame(7).unwrap();
        assert_eq!(report.frame_index, 7);
        assert_eq!(report.infer_batch_count, 4);
        assert_eq!(report.train_batch_count, 2);
        assert_eq!(report.mean_loss, Some(1.0));
        assert_eq!(domain.state(), HandoffState::TensorActive);

        bridge.finish().unwrap();
        pair.finished.wait(TIMEOUT).unwrap();
        assert!(buffers
            .infer_predictions
            .read()
            .unwrap()
            .iter()
            .all(|value| *value == 0.5));
    }

    #[test]
    fn stream_reports_before_finished() {
        use super::*;

        let Setup {
            instance,
            domain,
            pair,
            bridge,
            ..
        } = setup(u64::MAX);
        let stream = TensorStream::spawn(bridge).unwrap();

        for frame_index in 0..3 {
            pair.start.signal().unwrap();
            stream.enqueue(frame_index).unwrap();
            pair.finished.wait(TIMEOUT).unwrap();

            let reports = stream.try_reports();
            assert_eq!(reports.len(), 1);
            let report = reports[0].to_owned().unwrap();
            assert_eq!(report.frame_index, frame_index);
            assert_eq!(report.train_batch_count, 4);
            assert_eq!(report.mean_loss, Some(0.0));
        }

        assert_eq!(domain.state(), HandoffState::GraphicsActive);
        assert_eq!(instance.open_handle_count(), 6);
    }

    #[test]
    fn stream_failure_aborts_pair() {
        use super::*;

        let Setup { pair, bridge, .. } = setup(u64::MAX);
        let stream = TensorStream::spawn(bridge).unwrap();

        pair.start.abort("test");
        stream.enqueue(0).unwrap();
        assert!(matches!(
            pair.finished.wait(TIMEOUT),
            Err(Error::DeviceLost(_))
        ));

        drop(stream);
        assert!(matches!(pair.start.signal(), Err(Error::DeviceLost(_))));
    }
}
