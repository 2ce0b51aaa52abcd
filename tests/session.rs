use burn::backend::{Autodiff, NdArray};
use nrc_renderer::session::*;
use std::{sync::Arc, thread, time::Duration};

type B = Autodiff<NdArray<f32>>;

fn config() -> NrcConfig {
    NrcConfig::new(32, 32, 16, 16)
        .with_batch_size(256)
        .with_hash_grid(
            HashGridConfig::new()
                .with_level_count(4)
                .with_table_size(1 << 10),
        )
        .with_network_width(16)
        .with_network_depth(2)
        .with_sync_timeout_ms(60_000)
}

fn session(
    instance: &Instance,
    config: NrcConfig,
) -> NrcSession {
    NrcSession::new::<B>(
        instance,
        config,
        Arc::new(FogScene::default()),
        &Default::default(),
    )
    .unwrap()
}

/// Writes `value` for real records and NaN for the zero padding records.
struct MarkingCache {
    value: f32,
    mark_padding: bool,
}

impl RadianceCache for MarkingCache {
    fn infer(
        &mut self,
        features: &[f32],
        predictions: &mut [f32],
    ) -> Result<()> {
        for (feature, prediction) in features
            .chunks_exact(FEATURE_RECORD_LEN)
            .zip(predictions.chunks_exact_mut(PREDICTION_RECORD_LEN))
        {
            let is_padding = feature.iter().all(|value| *value == 0.0);
            let value = if is_padding && self.mark_padding {
                f32::NAN
            } else {
                self.value
            };
            prediction.copy_from_slice(&[value, value, value, 1.0]);
        }
        Ok(())
    }

    fn train(
        &mut self,
        _features: &[f32],
        _targets: &[f32],
    ) -> Result<Option<f32>> {
        Ok(Some(0.0))
    }
}

/// Stalls the first inference past the semaphore wait bound.
struct StallingCache {
    delay: Duration,
    stalled: bool,
}

impl RadianceCache for StallingCache {
    fn infer(
        &mut self,
        _features: &[f32],
        predictions: &mut [f32],
    ) -> Result<()> {
        if !self.stalled {
            self.stalled = true;
            thread::sleep(self.delay);
        }
        predictions.fill(0.0);
        Ok(())
    }

    fn train(
        &mut self,
        _features: &[f32],
        _targets: &[f32],
    ) -> Result<Option<f32>> {
        Ok(Some(0.0))
    }
}

#[test]
fn frames_render_and_train() {
    let instance = Instance::new();
    let mut session = session(&instance, config());

    let mut losses = Vec::new();
    for _ in 0..4 {
        let image = session.render_frame().unwrap().wait().unwrap();
        assert_eq!((image.width, image.height), (32, 32));
        assert!(image
            .pixels
            .iter()
            .all(|pixel| pixel.iter().all(|value| value.is_finite()) && pixel[3] == 1.0));

        session.wait_idle().unwrap();
        let stats = session.last_stats().copied().unwrap();
        assert_eq!(stats.infer_batch_count, 4);
        assert_eq!(stats.train_batch_count, 1);
        losses.extend(stats.mean_loss);
    }

    assert_eq!(losses.len(), 4);
    assert!(losses.iter().all(|loss| loss.is_finite()));
    session.destroy().unwrap();
}

#[test]
fn handoff_alternates_every_frame() {
    let instance = Instance::new();
    let mut session = session(&instance, config());

    for _ in 0..5 {
        session.render_frame().unwrap();
    }
    session.wait_idle().unwrap();

    let events = session
        .sync_trace()
        .into_iter()
        .map(|event| event.event)
        .collect::<Vec<_>>();
    assert_eq!(events.len(), 5 * 4);
    for cycle in events.chunks_exact(4) {
        assert_eq!(
            cycle,
            [
                HandoffEvent::SignalStart,
                HandoffEvent::WaitStart,
                HandoffEvent::SignalFinished,
                HandoffEvent::WaitFinished,
            ]
        );
    }
    assert_eq!(session.handoff_state(), HandoffState::GraphicsActive);
}

#[test]
fn frozen_cache_skips_training() {
    let instance = Instance::new();
    let config = config().with_train_samples_per_pixel(0);
    assert!(!config.is_training_enabled());

    let mut session = session(&instance, config);
    assert_eq!(session.plan().train_batch_count(), 0);

    let image = session.render_frame().unwrap().wait().unwrap();
    assert!(image
        .pixels
        .iter()
        .all(|pixel| pixel.iter().all(|value| value.is_finite())));

    session.wait_idle().unwrap();
    let stats = session.last_stats().copied().unwrap();
    assert_eq!(stats.infer_batch_count, 4);
    assert_eq!(stats.train_batch_count, 0);
    assert_eq!(stats.mean_loss, None);
}

#[test]
fn padding_never_reaches_the_image() {
    let render = |mark_padding| {
        let instance = Instance::new();
        let mut session = NrcSession::with_cache(
            &instance,
            config(),
            Arc::new(FogScene::default()),
            Box::new(MarkingCache {
                value: 0.25,
                mark_padding,
            }),
        )
        .unwrap();

        let image = session.render_frame().unwrap().wait().unwrap();
        session.wait_idle().unwrap();
        let hit_count = session.last_stats().map(|stats| stats.hit_count);
        (image, hit_count)
    };

    let (marked, hit_count) = render(true);
    let (plain, _) = render(false);

    // The fog sphere covers part of the view, so padding slots exist
    let hit_count = hit_count.unwrap();
    assert!(hit_count > 0 && hit_count < 32 * 32, "{hit_count}");

    assert!(marked
        .pixels
        .iter()
        .all(|pixel| pixel.iter().all(|value| value.is_finite())));
    assert_eq!(marked, plain);
    assert_eq!(marked.mean_squared_error(&plain), Some(0.0));
}

#[test]
fn destroy_closes_every_handle() {
    let instance = Instance::new();
    let before = instance.open_handle_count();

    let mut session = session(&instance, config());
    assert_eq!(instance.open_handle_count(), before + 6);

    session.render_frame().unwrap();
    session.destroy().unwrap();
    assert_eq!(instance.open_handle_count(), before);

    {
        let _session = self::session(&instance, config());
        assert_eq!(instance.open_handle_count(), before + 6);
    }
    assert_eq!(instance.open_handle_count(), before);
}

#[test]
fn invalid_configs_fail_before_any_resource() {
    let instance = Instance::new();
    let scene: Arc<dyn Scene> = Arc::new(FogScene::default());

    let accepted = NrcConfig::new(768, 768, 16, 16).with_batch_size(128);
    assert_eq!(accepted.infer_record_count(), 589824);
    assert_eq!(accepted.validate(), Ok(()));

    for config in [
        NrcConfig::new(100, 100, 16, 16).with_batch_size(128),
        NrcConfig::new(32, 32, 10, 10).with_batch_size(256),
        config().with_batch_size(100),
        config().with_network_width(0),
    ] {
        let result = NrcSession::new::<B>(
            &instance,
            config,
            scene.to_owned(),
            &Default::default(),
        );
        assert!(matches!(result, Err(Error::Configuration(..))));
        assert_eq!(instance.open_handle_count(), 0);
    }
}

#[test]
fn stalled_tensor_side_times_out() {
    let instance = Instance::new();
    let config = config().with_sync_timeout_ms(250);
    let mut session = NrcSession::with_cache(
        &instance,
        config,
        Arc::new(FogScene::default()),
        Box::new(StallingCache {
            delay: Duration::from_millis(1500),
            stalled: false,
        }),
    )
    .unwrap();
    assert_eq!(session.fence_timeout(), Duration::from_millis(500));

    // The queue reports the semaphore that expired, not the frame fence
    let result = session.render_frame().unwrap().wait();
    assert!(
        matches!(
            &result,
            Err(Error::SynchronizationTimeout { semaphore, .. }) if semaphore == "nrc.finished"
        ),
        "{result:?}",
    );

    assert!(matches!(
        session.render_frame(),
        Err(Error::SynchronizationTimeout { .. })
    ));
    assert!(session.render_frame().is_err());

    session.destroy().unwrap();
    assert_eq!(instance.open_handle_count(), 0);
}
