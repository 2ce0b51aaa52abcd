use burn::backend::{Autodiff, NdArray};
use nrc_renderer::cache::*;

type B = Autodiff<NdArray<f32>>;

const BATCH_COUNT: usize = 10_000;
const WINDOW: usize = 500;

#[test]
fn loss_decreases_on_constant_target() {
    let device = Default::default();
    let config = NrcConfig::new(8, 8, 8, 8)
        .with_batch_size(64)
        .with_loss_function(LossFunction::L2)
        .with_optimizer(OptimizerKind::Sgd)
        .with_learning_rate(1e-2)
        .with_ema_decay(0.0)
        .with_position_encoding(PositionEncoding::Identity)
        .with_direction_encoding(DirectionEncoding::Identity)
        .with_network_width(16)
        .with_network_depth(2);
    let mut model = CacheModel::<B>::new(&config, &device).unwrap();

    let bounds = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
    let features = (0..64)
        .flat_map(|index| {
            let t = index as f32 / 64.0;
            let position = Vec3::new(t * 2.0 - 1.0, (t * 7.0).sin(), (t * 3.0).cos());
            let direction = Vec3::new((t * 5.0).cos(), (t * 5.0).sin(), t - 0.5);
            let record = FeatureRecord::new(position, direction, &bounds);
            record.position.into_iter().chain(record.direction)
        })
        .collect::<Vec<_>>();
    let targets = (0..64)
        .flat_map(|_| TargetRecord::new(Vec3::new(0.6, 0.4, 0.2)).radiance)
        .collect::<Vec<_>>();

    let losses = (0..BATCH_COUNT)
        .map(|_| model.train(&features, &targets).unwrap().unwrap())
        .collect::<Vec<_>>();
    assert!(losses.iter().all(|loss| loss.is_finite()));

    // Trailing moving average at the end of every window
    let averages = losses
        .windows(WINDOW)
        .step_by(WINDOW)
        .map(|window| window.iter().map(|loss| *loss as f64).sum::<f64>() / WINDOW as f64)
        .collect::<Vec<_>>();
    assert_eq!(averages.len(), BATCH_COUNT / WINDOW);
    for pair in averages.windows(2) {
        assert!(pair[1] <= pair[0] + 1e-9, "{averages:?}");
    }
    assert!(averages[averages.len() - 1] < averages[0] * 0.1, "{averages:?}");

    // The predictions approach the target
    let mut predictions = vec![0.0; 64 * PREDICTION_RECORD_LEN];
    model.infer(&features, &mut predictions).unwrap();
    for record in predictions.chunks_exact(PREDICTION_RECORD_LEN) {
        assert!((record[0] - 0.6).abs() < 0.1, "{record:?}");
        assert!((record[2] - 0.2).abs() < 0.1, "{record:?}");
        assert_eq!(record[3], 1.0);
    }
}
