use burn::backend::{Autodiff, NdArray};
use nrc_renderer::session::*;
use std::sync::Arc;

type B = Autodiff<NdArray<f32>>;

#[test]
fn error_against_reference_falls_as_frames_accumulate() {
    let instance = Instance::new();
    // Bright enough that the untrained cache is far from the reference
    let scene: Arc<dyn Scene> = Arc::new(FogScene {
        sun_radiance: Vec3::new(9.0, 8.4, 7.5),
        ..Default::default()
    });
    let config = NrcConfig::new(16, 16, 16, 16)
        .with_batch_size(256)
        .with_hash_grid(
            HashGridConfig::new()
                .with_level_count(4)
                .with_table_size(1 << 10),
        )
        .with_network_width(16)
        .with_network_depth(2)
        .with_learning_rate(2e-2)
        .with_ema_decay(0.0)
        .with_sync_timeout_ms(60_000);

    let reference = ReferenceRenderer::from_config(&config, scene.to_owned(), 512)
        .render()
        .unwrap();
    let mut session =
        NrcSession::new::<B>(&instance, config, scene, &Default::default()).unwrap();

    let frames = (0..96)
        .map(|_| session.render_frame().unwrap().wait().unwrap())
        .collect::<Vec<_>>();
    session.destroy().unwrap();

    // Average the latest frames to separate the cache error from the noise
    let latest = &frames[frames.len() - 16..];
    let mut accumulated = Image::new(16, 16);
    for frame in latest {
        for (sum, pixel) in accumulated.pixels.iter_mut().zip(&frame.pixels) {
            for (sum, value) in sum.iter_mut().zip(pixel) {
                *sum += value / latest.len() as f32;
            }
        }
    }

    let first = frames[0].mean_squared_error(&reference).unwrap();
    let last = accumulated.mean_squared_error(&reference).unwrap();
    assert!(last < first * 0.5, "{first} -> {last}");
}
