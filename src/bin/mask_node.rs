//! mask_node - depth-anchored object masking daemon
//!
//! This daemon:
//! 1. Feeds color + depth frames from the configured camera into the pipeline
//! 2. Runs the in-process detector on every snapshot it is handed
//! 3. Logs results, object poses and the optional circle path
//! 4. Accepts commands on stdin and an optional periodic trigger

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::{self, BufRead, IsTerminal};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use depth_mask::config::MaskNodeConfig;
use depth_mask::ingest::SyntheticCamera;
use depth_mask::ui::{CycleDisplay, UiMode};
use depth_mask::{
    ChannelSink, DepthPoseService, DetectionPipeline, DetectorBackend, PipelineError,
    PipelineOutput, StubBackend,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Correlate color, depth and detector output into depth-anchored object masks"
)]
struct Args {
    /// JSON config file.
    #[arg(long, env = "MASK_NODE_CONFIG")]
    config: Option<PathBuf>,

    /// Request the closest object every N seconds.
    #[arg(long, env = "MASK_AUTO_TRIGGER_SECS")]
    auto_trigger_secs: Option<u64>,

    /// Ignore stdin commands.
    #[arg(long)]
    no_stdin: bool,

    /// Status display: auto, plain or pretty.
    #[arg(long)]
    ui: Option<String>,
}

enum Command {
    Trigger,
    Request,
    Publish(usize),
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    match line.trim() {
        "a" => Some(Command::Trigger),
        "s" => Some(Command::Request),
        "q" => Some(Command::Quit),
        other => match other.parse::<usize>() {
            Ok(id @ 1..=9) => Some(Command::Publish(id)),
            _ => None,
        },
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = MaskNodeConfig::load_from(args.config.as_deref())?;

    log::info!(
        "mask_node {} starting: mask path {}, circle path {}, query timeout {:?}",
        env!("CARGO_PKG_VERSION"),
        enabled(!config.disable_mask_depth),
        enabled(!config.disable_circle_depth),
        config.query_timeout
    );

    let (sink, outputs) = ChannelSink::new();
    let pipeline = Arc::new(DetectionPipeline::new(
        config.pipeline_settings(),
        Arc::new(sink),
    ));
    let running = Arc::new(AtomicBool::new(true));
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

    let camera = spawn_camera(&config, Arc::clone(&pipeline), Arc::clone(&running))?;

    let display = CycleDisplay::new(UiMode::parse(args.ui.as_deref()), io::stderr().is_terminal());
    spawn_router(outputs, Arc::clone(&pipeline), display);

    let service = DepthPoseService::new(Arc::clone(&pipeline));
    if !config.disable_mask_depth {
        if let Some(secs) = args.auto_trigger_secs.filter(|s| *s > 0) {
            spawn_auto_trigger(
                service.clone(),
                Duration::from_secs(secs),
                config.query_timeout,
                Arc::clone(&running),
            );
        }
    }

    if !args.no_stdin {
        spawn_commands(
            Arc::clone(&pipeline),
            service,
            config.clone(),
            shutdown_tx.clone(),
        );
        log::info!("commands: a = trigger, s = request closest, 1-9 = publish object, q = quit");
    }

    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let _ = shutdown_rx.recv();
    log::info!("shutdown requested, stopping camera feed...");
    running.store(false, Ordering::SeqCst);
    camera
        .join()
        .map_err(|_| anyhow!("camera thread panicked"))??;
    Ok(())
}

fn enabled(on: bool) -> &'static str {
    if on {
        "enabled"
    } else {
        "disabled"
    }
}

fn spawn_camera(
    config: &MaskNodeConfig,
    pipeline: Arc<DetectionPipeline>,
    running: Arc<AtomicBool>,
) -> Result<thread::JoinHandle<Result<()>>> {
    let mut camera = SyntheticCamera::new(config.camera_config())?;
    let period = Duration::from_secs_f64(1.0 / config.camera.fps as f64);
    let url = config.camera.url.clone();

    Ok(thread::spawn(move || {
        let mut last_health_log = Instant::now();
        while running.load(Ordering::SeqCst) {
            let started = Instant::now();
            let (color, depth) = camera.next_images();
            if let Err(e) = pipeline.on_color_image(&color) {
                log::warn!("color frame skipped: {}", e);
            }
            if let Err(e) = pipeline.on_depth_image(&depth) {
                log::warn!("depth frame skipped: {}", e);
            }

            if last_health_log.elapsed() >= Duration::from_secs(30) {
                log::info!(
                    "camera frames={} url={} state={:?}",
                    camera.frames_captured(),
                    url,
                    pipeline.state()
                );
                last_health_log = Instant::now();
            }
            thread::sleep(period.saturating_sub(started.elapsed()));
        }
        Ok(())
    }))
}

/// Drain pipeline outputs: run the detector on snapshots, report everything else.
fn spawn_router(
    outputs: Receiver<PipelineOutput>,
    pipeline: Arc<DetectionPipeline>,
    mut display: CycleDisplay,
) {
    let mut detector = StubBackend::new();
    thread::spawn(move || {
        if let Err(e) = detector.warm_up() {
            log::warn!("detector {} warm-up failed: {}", detector.name(), e);
        }
        for output in outputs {
            match output {
                PipelineOutput::DetectorInput(generation, frame) => match detector.detect(&frame) {
                    Ok(batch) => {
                        if let Err(e) = pipeline.on_detection_batch_for(generation, &batch) {
                            log::warn!("detector {} output rejected: {}", detector.name(), e);
                        }
                    }
                    Err(e) => log::error!("detector {} failed: {}", detector.name(), e),
                },
                PipelineOutput::CycleStatus(status) => display.update(status),
                PipelineOutput::MaskedResult(frame) => {
                    log::debug!("masked result {}x{}", frame.width(), frame.height());
                }
                PipelineOutput::ObjectPose(pose) => {
                    log::info!("object pose: x={} y={} depth={}", pose.x, pose.y, pose.depth);
                }
                PipelineOutput::CirclePose(pose) => {
                    log::debug!("circle pose: x={} y={} depth={}", pose.x, pose.y, pose.depth);
                }
                PipelineOutput::CircleResult(_) => {}
            }
        }
    });
}

fn spawn_auto_trigger(
    service: DepthPoseService,
    interval: Duration,
    timeout: Duration,
    running: Arc<AtomicBool>,
) {
    thread::spawn(move || {
        while running.load(Ordering::SeqCst) {
            thread::sleep(interval);
            request_closest(&service, timeout);
        }
    });
}

/// Read commands until `q` or end of input. Returns whether `q` was seen.
fn read_commands<R: BufRead>(input: R, mut run: impl FnMut(Command)) -> bool {
    for line in input.lines() {
        let Ok(line) = line else { break };
        match parse_command(&line) {
            Some(Command::Quit) => return true,
            Some(command) => run(command),
            None if !line.trim().is_empty() => log::warn!("unknown command '{}'", line.trim()),
            None => {}
        }
    }
    false
}

fn spawn_commands(
    pipeline: Arc<DetectionPipeline>,
    service: DepthPoseService,
    config: MaskNodeConfig,
    shutdown: Sender<()>,
) {
    thread::spawn(move || {
        let quit = read_commands(io::stdin().lock(), |command| {
            if config.disable_mask_depth {
                log::warn!("mask path disabled; command ignored");
                return;
            }
            match command {
                Command::Trigger => {
                    if let Err(e) = pipeline.trigger() {
                        log::warn!("trigger failed: {}", e);
                    }
                }
                Command::Request => {
                    let service = service.clone();
                    let timeout = config.query_timeout;
                    thread::spawn(move || request_closest(&service, timeout));
                }
                Command::Publish(id) => {
                    if let Err(e) = pipeline.publish_object(id) {
                        log::warn!("publish failed: {}", e);
                    }
                }
                Command::Quit => {}
            }
        });
        if quit {
            let _ = shutdown.send(());
        } else {
            // Closed stdin (supervisors, `< /dev/null`) is not a shutdown request.
            log::info!("stdin closed; commands disabled, Ctrl-C to stop");
        }
    });
}

fn request_closest(service: &DepthPoseService, timeout: Duration) {
    match service.call(timeout) {
        Ok(response) => match response.pose {
            Some(pose) if response.success => log::info!(
                "closest object at x={} y={} depth={}",
                pose.x,
                pose.y,
                pose.depth
            ),
            _ => log::info!("request finished: no object found"),
        },
        Err(PipelineError::NotReady { missing }) => {
            log::warn!("request skipped: waiting for first {} frame", missing)
        }
        Err(e) => log::warn!("request failed: {}", e),
    }
}
