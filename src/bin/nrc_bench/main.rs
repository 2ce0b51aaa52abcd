//! Renders frames of the built-in fog scene and logs the training progress.
//!
//! Every frame is compared against a converged Monte Carlo reference.
//!
//! ```plaintext
//! nrc-bench [CONFIG.json] [FRAME_COUNT] [REFERENCE_SAMPLES]
//! ```

use nrc_renderer::{
    backend::{Autodiff, Wgpu, WgpuDevice},
    session::*,
};
use std::{env, process::ExitCode, sync::Arc, time::Instant};

const FRAME_COUNT_DEFAULT: u64 = 100;
const REFERENCE_SAMPLES_DEFAULT: u32 = 256;

fn main() -> ExitCode {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            log::error!(target: "nrc_bench", "{error}");
            ExitCode::FAILURE
        },
    }
}

fn run() -> Result<()> {
    let mut args = env::args().skip(1);
    let config = match args.next() {
        Some(path) => NrcConfig::load(&path).map_err(|error| {
            Error::Configuration(format!("The config file {path}"), format!("{error:?}"))
        })?,
        None => NrcConfig::new(256, 256, 128, 128),
    };
    let frame_count = match args.next() {
        Some(count) => count.parse::<u64>().map_err(|error| {
            Error::Configuration(format!("The frame count {count}"), error.to_string())
        })?,
        None => FRAME_COUNT_DEFAULT,
    };
    let reference_samples = match args.next() {
        Some(count) => count.parse::<u32>().map_err(|error| {
            Error::Configuration(
                format!("The reference sample count {count}"),
                error.to_string(),
            )
        })?,
        None => REFERENCE_SAMPLES_DEFAULT,
    };

    let instance = Instance::new();
    let scene = Arc::new(FogScene::default());
    let device = WgpuDevice::default();

    let started = Instant::now();
    let reference =
        ReferenceRenderer::from_config(&config, scene.to_owned(), reference_samples)
            .render()?;
    log::info!(
        target: "nrc_bench",
        "reference in {:.2?}, mean color {:?}",
        started.elapsed(),
        reference.mean(),
    );

    let mut session =
        NrcSession::new::<Autodiff<Wgpu>>(&instance, config, scene, &device)?;

    let started = Instant::now();
    let mut last = None::<Image>;
    for _ in 0..frame_count {
        let frame = session.render_frame()?;
        let image = frame.wait()?;
        session.wait_idle()?;

        let mse = image.mean_squared_error(&reference).unwrap_or(f64::NAN);
        let bias = image.relative_bias(&reference).unwrap_or([f64::NAN; 3]);
        if let Some(stats) = session.last_stats() {
            log::info!(
                target: "nrc_bench",
                "frame {:>5} > loss {:>10.6} | mse {:>10.6} | rbias {:>7.3} | tensor {:>8.2?} | submit {:>8.2?}",
                stats.frame_index,
                stats.mean_loss.unwrap_or(f32::NAN),
                mse,
                bias.iter().sum::<f64>() / 3.0,
                stats.tensor_duration,
                stats.submit_duration,
            );
        }
        last = Some(image);
    }

    let elapsed = started.elapsed();
    log::info!(
        target: "nrc_bench",
        "{frame_count} frames in {elapsed:.2?} ({:.2} fps), mean color {:?}",
        frame_count as f64 / elapsed.as_secs_f64().max(f64::EPSILON),
        last.map(|image| image.mean()).unwrap_or_default(),
    );

    session.destroy()
}
