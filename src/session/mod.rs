//! The frame orchestrator.

pub use crate::cache::*;

use humansize::{format_size, BINARY};
use parking_lot::RwLock;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

/// The fence bound in units of the semaphore wait bound.
pub const FENCE_TIMEOUT_FACTOR: u32 = 2;

/// A renderer session.
///
/// ## Details
///
/// Every frame runs the same chain:
///
/// ```plaintext
/// graphics: generate -> signal start
/// tensor:   wait start -> infer -> train -> signal finished
/// graphics: wait finished -> composite -> fence
/// ```
///
/// The buffers are single-buffered, so a frame is generated only after the
/// previous one was composited. The host blocks on nothing but that fence.
pub struct NrcSession {
    config: NrcConfig,
    plan: BatchPlan,
    instance: Instance,
    domain: Arc<HandoffDomain>,
    graphics: Option<GraphicsDevice>,
    stream: Option<TensorStream>,
    buffers: FrameBuffers,
    sync: SyncPair,
    sync_handles: SyncHandlePair,
    generator: Arc<FeatureGenerator>,
    generate_commands: Arc<CommandBuffer>,
    composite_commands: Arc<CommandBuffer>,
    target: ImageTarget,
    in_flight: Option<InFlightFrame>,
    frame_count: u64,
    last_stats: Option<FrameStats>,
}

/// The output of [`NrcSession::render_frame`].
///
/// The image is written once the frame completes on the graphics queue.
#[derive(Clone, Debug)]
pub struct FrameImage {
    frame_index: u64,
    fence: Arc<Fence>,
    image: Arc<RwLock<Image>>,
    timeout: Duration,
}

/// Statistics of a completed frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameStats {
    pub frame_index: u64,
    /// Pixels whose prediction was composited.
    pub hit_count: u64,
    pub infer_batch_count: u64,
    pub train_batch_count: u64,
    pub mean_loss: Option<f32>,
    /// Time spent by the tensor runtime after the start semaphore.
    pub tensor_duration: Duration,
    /// Time spent by the host in [`NrcSession::render_frame`].
    pub submit_duration: Duration,
}

#[derive(Debug)]
struct InFlightFrame {
    frame_index: u64,
    fence: Arc<Fence>,
    submit_duration: Duration,
    report: Option<TrainReport>,
}

impl NrcSession {
    /// Builds a session training a [`CacheModel`] on `device`.
    ///
    /// The configuration is validated before any resource is created.
    pub fn new<B: AutodiffBackend>(
        instance: &Instance,
        config: NrcConfig,
        scene: Arc<dyn Scene>,
        device: &B::Device,
    ) -> Result<Self> {
        config.validate()?;
        let cache = CacheModel::<B>::new(&config, device)?;
        Self::with_cache(instance, config, scene, Box::new(cache))
    }

    /// Builds a session around any [`RadianceCache`].
    pub fn with_cache(
        instance: &Instance,
        config: NrcConfig,
        scene: Arc<dyn Scene>,
        cache: Box<dyn RadianceCache>,
    ) -> Result<Self> {
        let plan = BatchPlan::new(&config)?;
        let timeout = config.sync_timeout();

        let graphics = GraphicsDevice::new(instance, timeout)?;
        let domain = Arc::new(HandoffDomain::new());
        let buffers = FrameBuffers::new(&graphics, &plan, &domain)?;
        let (sync, sync_handles) = graphics.create_sync_pair("nrc", &domain);

        let stream = CacheBridge::new(
            instance,
            cache,
            plan,
            &buffers.handles(),
            &sync_handles,
            timeout,
        )
        .and_then(TensorStream::spawn);
        let stream = match stream {
            Ok(stream) => stream,
            Err(error) => {
                close_handles(instance, &buffers.handles(), &sync_handles);
                return Err(error);
            },
        };

        let pixels = PixelBuffer::default();
        let target = ImageTarget::default();
        let generator = Arc::new(FeatureGenerator::new(
            &config,
            scene,
            &buffers,
            pixels.to_owned(),
        ));
        let compositor = Arc::new(Compositor::new(&buffers, pixels, target.to_owned()));
        let generate_commands =
            Arc::new(CommandBuffer::new("generate").record(generator.to_owned()));
        let composite_commands =
            Arc::new(CommandBuffer::new("composite").record(compositor));

        log::info!(
            target: "nrc_renderer::session",
            "create > {}x{} render, {}x{}x{} train, {} inference and {} training batches of {}, {} shared",
            config.render_width,
            config.render_height,
            config.train_width,
            config.train_height,
            config.train_samples_per_pixel,
            plan.infer_batch_count(),
            plan.train_batch_count(),
            plan.batch_size,
            format_size(buffers.size_bytes(), BINARY),
        );

        Ok(Self {
            config,
            plan,
            instance: instance.to_owned(),
            domain,
            graphics: Some(graphics),
            stream: Some(stream),
            buffers,
            sync,
            sync_handles,
            generator,
            generate_commands,
            composite_commands,
            target,
            in_flight: None,
            frame_count: 0,
            last_stats: None,
        })
    }

    #[inline]
    pub fn config(&self) -> &NrcConfig {
        &self.config
    }

    #[inline]
    pub fn plan(&self) -> &BatchPlan {
        &self.plan
    }

    #[inline]
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Frames submitted so far.
    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Statistics of the latest frame observed complete.
    ///
    /// A frame is observed by the next [`Self::render_frame`] or by
    /// [`Self::wait_idle`].
    #[inline]
    pub fn last_stats(&self) -> Option<&FrameStats> {
        self.last_stats.as_ref()
    }

    #[inline]
    pub fn handoff_state(&self) -> HandoffState {
        self.domain.state()
    }

    /// The bound of a frame fence wait.
    ///
    /// A frame spans two semaphore waits on the graphics queue, so a hung
    /// side fails the queue with its own semaphore before the fence expires.
    #[inline]
    pub fn fence_timeout(&self) -> Duration {
        self.config.sync_timeout() * FENCE_TIMEOUT_FACTOR
    }

    /// The latest semaphore events, oldest first.
    #[inline]
    pub fn sync_trace(&self) -> Vec<SyncEvent> {
        self.domain.trace()
    }

    /// Submits one frame and returns without waiting for it.
    ///
    /// It blocks only until the previous frame completes, since the shared
    /// buffers and command buffers are reused.
    pub fn render_frame(&mut self) -> Result<FrameImage> {
        let started = Instant::now();
        self.wait_idle()?;

        let graphics = self
            .graphics
            .as_ref()
            .ok_or_else(|| Error::DeviceLost("The session is destroyed".into()))?;
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| Error::DeviceLost("The session is destroyed".into()))?;

        let frame_index = self.frame_count;
        let constants = PushConstants {
            frame_index,
            seed: self.config.seed,
        };
        let image = Arc::new(RwLock::new(Image::new(
            self.config.render_width,
            self.config.render_height,
        )));
        *self.target.lock() = image.to_owned();

        graphics.submit(Submission {
            command_buffer: self.generate_commands.to_owned(),
            constants,
            signals: vec![self.sync.start.to_owned()],
            ..Default::default()
        })?;
        stream.enqueue(frame_index)?;

        let fence = Arc::new(Fence::new());
        graphics.submit(Submission {
            waits: vec![self.sync.finished.to_owned()],
            command_buffer: self.composite_commands.to_owned(),
            constants,
            fence: Some(fence.to_owned()),
            ..Default::default()
        })?;

        self.frame_count += 1;
        self.in_flight = Some(InFlightFrame {
            frame_index,
            fence: fence.to_owned(),
            submit_duration: started.elapsed(),
            report: None,
        });

        Ok(FrameImage {
            frame_index,
            fence,
            image,
            timeout: self.fence_timeout(),
        })
    }

    /// Blocks until the frame in flight completes and records its statistics.
    pub fn wait_idle(&mut self) -> Result<()> {
        let Some(mut frame) = self.in_flight.take() else {
            return Ok(());
        };

        if let Err(error) = frame.fence.wait(self.fence_timeout()) {
            log::error!(
                target: "nrc_renderer::session",
                "frame {} > {error}",
                frame.frame_index,
            );
            return Err(error);
        }

        if let Some(stream) = &self.stream {
            for report in stream.try_reports() {
                let report = report?;
                if report.frame_index == frame.frame_index {
                    frame.report = Some(report);
                }
            }
        }

        let report = frame.report.unwrap_or_default();
        let stats = FrameStats {
            frame_index: frame.frame_index,
            hit_count: self.generator.hit_count(),
            infer_batch_count: report.infer_batch_count,
            train_batch_count: report.train_batch_count,
            mean_loss: report.mean_loss,
            tensor_duration: report.duration,
            submit_duration: frame.submit_duration,
        };

        #[cfg(debug_assertions)]
        log::debug!(
            target: "nrc_renderer::session",
            "frame {} > {} hits, {} + {} batches, loss {:?}, tensor {:?}, submit {:?}",
            stats.frame_index,
            stats.hit_count,
            stats.infer_batch_count,
            stats.train_batch_count,
            stats.mean_loss,
            stats.tensor_duration,
            stats.submit_duration,
        );

        self.last_stats = Some(stats);
        Ok(())
    }

    /// Waits for the frame in flight and releases every resource.
    pub fn destroy(mut self) -> Result<()> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<()> {
        let Some(graphics) = self.graphics.take() else {
            return Ok(());
        };
        let result = self.wait_idle();

        self.sync.abort("The session is destroyed");
        drop(self.stream.take());
        drop(graphics);

        let closed =
            close_handles(&self.instance, &self.buffers.handles(), &self.sync_handles);

        log::info!(
            target: "nrc_renderer::session",
            "destroy > {} frames, {closed} handles closed",
            self.frame_count,
        );

        result
    }
}

impl Drop for NrcSession {
    fn drop(&mut self) {
        if let Err(error) = self.teardown() {
            log::warn!(target: "nrc_renderer::session", "destroy > {error}");
        }
    }
}

impl FrameImage {
    #[inline]
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.fence.is_signaled()
    }

    /// Blocks until the frame completes and returns its image.
    pub fn wait(&self) -> Result<Image> {
        self.fence.wait(self.timeout)?;
        Ok(self.image.read().to_owned())
    }
}

impl std::fmt::Debug for NrcSession {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("NrcSession")
            .field("config", &self.config)
            .field("plan", &self.plan)
            .field("state", &self.domain.state())
            .field("frame_count", &self.frame_count)
            .field("destroyed", &self.graphics.is_none())
            .finish()
    }
}

/// Returns the number of handles that were open.
fn close_handles(
    instance: &Instance,
    buffers: &FrameBufferHandles,
    sync: &SyncHandlePair,
) -> usize {
    buffers
        .iter()
        .map(|descriptor| descriptor.handle)
        .chain([sync.start.handle, sync.finished.handle])
        .filter(|handle| instance.close_handle(*handle))
        .count()
}
