//! Live patch host.
//!
//! Audio is driven by a headless clock thread that renders one block per
//! block period into a scratch buffer. The main thread runs the control loop:
//! source polling, cooking, and health reporting.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use clap::Args;
use kiln_config::RuntimeConfig;
use kiln_core::{AudioBlockRunner, Runtime};
use kiln_patch::{FilePatchLoader, OperatorRegistry};

#[derive(Args)]
pub struct RunArgs {
    /// Patch file (TOML)
    patch: PathBuf,

    /// Runtime configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stop after this many seconds
    #[arg(long)]
    seconds: Option<f64>,
}

pub fn run(args: RunArgs) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => RuntimeConfig::load(path)?,
        None => RuntimeConfig::default(),
    };

    let loader = FilePatchLoader::new(args.patch.clone(), Arc::new(OperatorRegistry::new()));
    let (mut runtime, runner) = Runtime::new(config.runtime_settings(), loader);
    let summary = runtime.reload()?;
    tracing::info!(
        patch = %args.patch.display(),
        generation = summary.generation,
        operators = runtime.nodes().len(),
        "patch loaded"
    );

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let audio = {
        let running = Arc::clone(&running);
        let period = config.block_period();
        let samples = config.audio.block_frames * config.audio.channels;
        thread::Builder::new()
            .name("kiln-audio".into())
            .spawn(move || audio_clock(&runner, &running, period, samples))?
    };

    let deadline = args
        .seconds
        .map(|s| Instant::now() + Duration::from_secs_f64(s.max(0.0)));
    let tick_period = config.tick_period();
    let report_interval = config.report_interval();
    let mut last_tick = Instant::now();
    let mut last_poll = last_tick;
    let mut last_report = last_tick;
    let mut warned = false;

    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        if deadline.is_some_and(|d| now >= d) {
            break;
        }

        if config.reload.watch && now.duration_since(last_poll) >= config.poll_interval() {
            last_poll = now;
            match runtime.reload_if_needed() {
                Some(Ok(summary)) => tracing::info!(
                    generation = summary.generation,
                    restored = summary.restore.restored.len(),
                    fresh = summary.restore.fresh.len(),
                    discarded = summary.restore.discarded.len(),
                    pause_us = summary.pause.as_micros() as u64,
                    "patch reloaded"
                ),
                // Failures are logged by the runtime; the previous graph keeps running.
                Some(Err(_)) | None => {}
            }
        }

        runtime.tick(now.duration_since(last_tick).as_secs_f64());
        last_tick = now;

        let diagnostics = runtime.diagnostics();
        if diagnostics.audio_load >= config.diagnostics.load_warn_threshold {
            if !warned {
                tracing::warn!(load = diagnostics.audio_load, "audio load above threshold");
                warned = true;
            }
        } else {
            warned = false;
        }

        if report_interval.is_some_and(|i| now.duration_since(last_report) >= i) {
            last_report = now;
            tracing::info!(
                generation = diagnostics.generation,
                load = diagnostics.audio_load,
                peak = diagnostics.peak_load,
                dropped_events = diagnostics.dropped_events,
                skipped_blocks = diagnostics.skipped_blocks,
                "health"
            );
            runtime.reset_peak_load();
        }

        thread::sleep(tick_period.saturating_sub(now.elapsed()));
    }

    running.store(false, Ordering::SeqCst);
    audio
        .join()
        .map_err(|_| anyhow::anyhow!("audio thread panicked"))?;
    tracing::info!(generation = runtime.generation(), "stopped");
    Ok(())
}

fn audio_clock(runner: &AudioBlockRunner, running: &AtomicBool, period: Duration, samples: usize) {
    let mut buffer = vec![0.0f32; samples];
    let mut next = Instant::now();
    while running.load(Ordering::Relaxed) {
        runner.process(&mut buffer);
        next += period;
        let now = Instant::now();
        if next > now {
            thread::sleep(next - now);
        } else {
            // Fell behind; resynchronize instead of bursting.
            next = now;
        }
    }
}
