use std::sync::Arc;

use clap::Parser;
use eyre::{Result, WrapErr};
use tracing::{error, info};

use osprey_detect::{select_detector, ClassVocabulary, DetectionStage, PriorityFilter};
use osprey_tracker::{BoxRenderer, SpatialTracker};
use osprey_types::{parse_config_file, FramePool, OspreyConfig, ShutdownFlag};
use zoom_calib::CalibrationTable;

mod capture;
mod logging;
mod pipeline;

use pipeline::{spawn_fps_reporter, ProcessStage, StageCounters};

/// Autonomous PTZ tracking broadcaster: ingest an RTSP stream, track the
/// configured priority classes, keep the target centered, rebroadcast with
/// overlays.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct OspreyArgs {
    /// Path to the TOML configuration file.
    config_file: std::path::PathBuf,

    /// End the run successfully as soon as the first object locks
    /// (overrides the config file).
    #[arg(long)]
    exit_on_first_track: bool,
}

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("osprey: {e:#}");
            1
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    dotenv::dotenv().ok();
    color_eyre::install()?;

    let args = OspreyArgs::parse();
    let mut cfg: OspreyConfig =
        parse_config_file(&args.config_file).wrap_err("loading configuration")?;
    if args.exit_on_first_track {
        cfg.pipeline.exit_on_first_track = true;
    }

    logging::initiate_logging(cfg.log_file.as_deref())
        .map_err(|e| eyre::eyre!("logging setup failed: {e}"))?;
    info!(config = %args.config_file.display(), "osprey starting");

    let shutdown = ShutdownFlag::new();
    run_pipeline(&cfg, shutdown.clone())?;

    match shutdown.reason() {
        Some(reason) => {
            error!("fatal: {reason}");
            eprintln!("osprey: {reason}");
        }
        None => info!("clean shutdown"),
    }
    Ok(shutdown.exit_code())
}

fn run_pipeline(cfg: &OspreyConfig, shutdown: ShutdownFlag) -> Result<()> {
    // Startup, leaves first: calibration, vocabulary, detector.
    let calib = Arc::new(
        CalibrationTable::from_config(&cfg.calibration).wrap_err("loading calibration table")?,
    );
    let vocab = ClassVocabulary::load(&cfg.detector.class_names_path)
        .wrap_err("loading class vocabulary")?;
    let detector = select_detector(None, cfg.detector.input_size);
    let detection = DetectionStage::new(
        detector,
        vocab,
        PriorityFilter::new(cfg.detector.clone()),
        cfg.detector.input_size,
    );

    let tracker = SpatialTracker::new(
        cfg.tracker.clone(),
        calib,
        cfg.ptz.soft_limits,
    );

    // The runtime hosts the PTZ worker and the signal handler; frame work
    // stays on plain threads.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("osprey-runtime")
        .build()
        .wrap_err("building tokio runtime")?;

    let (ptz, _ptz_join) = runtime
        .block_on(ptz_isapi::start(&cfg.ptz, shutdown.clone()))
        .wrap_err("bringing up PTZ controller")?;
    ptz.on_arrival(|pose| tracing::debug!(%pose, "camera arrived"));

    {
        let flag = shutdown.clone();
        runtime.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
                flag.request();
            }
        });
    }

    // Video path: probe dimensions from the stream, then wire the stages.
    let dims = capture::probe_dimensions(&cfg.rtsp_url).wrap_err("probing RTSP stream")?;
    info!(width = dims.0, height = dims.1, "stream dimensions");

    let writer = encoder_writer::EncoderWriter::launch(
        &cfg.encoder,
        dims.0,
        dims.1,
        shutdown.clone(),
    )
    .wrap_err("launching encoder")?;

    let queue_capacity = cfg.pipeline.queue_capacity;
    // One pool slot per queue entry plus one in flight per worker.
    let pool = FramePool::new(
        queue_capacity + cfg.encoder.queue_capacity + 4,
        dims.0 as usize * dims.1 as usize * 3,
    );
    let (frame_tx, frame_rx) = crossbeam_channel::bounded(queue_capacity);

    let capture_join = capture::spawn_capture(
        cfg.rtsp_url.clone(),
        dims,
        pool,
        frame_tx,
        shutdown.clone(),
    );

    let counters = Arc::new(StageCounters::default());
    spawn_fps_reporter(counters.clone(), shutdown.clone());

    let process_join = ProcessStage {
        rx: frame_rx,
        detection,
        tracker,
        ptz,
        writer,
        renderer: BoxRenderer::default(),
        pipeline_cfg: cfg.pipeline.clone(),
        counters,
        shutdown: shutdown.clone(),
    }
    .spawn();

    // The process thread ends on shutdown or on pipeline failure; everything
    // else observes the flag at its next suspension point.
    process_join.join().ok();
    shutdown.request();
    capture_join.join().ok();
    runtime.shutdown_timeout(std::time::Duration::from_secs(1));
    Ok(())
}
