use flipbook::cli::Args;
use flipbook::core::event_bus::{BoxedEvent, EventBus, downcast_event};
use flipbook::core::events::{
    DelayChangedEvent, FrameChangedEvent, FrameEnabledChangedEvent, LoadCompleteEvent,
    LoadFailedEvent, LoopModeChangedEvent, PlayStateChangedEvent, StatusChangedEvent,
};
use flipbook::Animator;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Longest single sleep of the update loop
const MAX_WAIT: Duration = Duration::from_millis(100);

/// Timeout for the initial load when no duration is given
const LOAD_TIMEOUT: Duration = Duration::from_secs(120);

fn init_logging(args: &Args) -> Result<()> {
    // Determine log level based on verbosity flags
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        // File logging with specified verbosity level
        let log_path = log_path_opt
            .clone()
            .unwrap_or_else(|| PathBuf::from("flipbook.log"));

        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .filter_module("ureq", log::LevelFilter::Warn) // HTTP client spam
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Console logging with specified verbosity level (respects RUST_LOG if set)
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };

        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .filter_module("ureq", log::LevelFilter::Warn)
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

/// One output line per notification
fn describe(event: &BoxedEvent) -> Option<String> {
    if let Some(e) = downcast_event::<FrameChangedEvent>(event) {
        return Some(format!("frame {} {}", e.frame, e.url));
    }
    if let Some(e) = downcast_event::<PlayStateChangedEvent>(event) {
        return Some(format!("play {:?}", e.mode));
    }
    if let Some(e) = downcast_event::<LoopModeChangedEvent>(event) {
        return Some(format!("loop {}", e.mode));
    }
    if let Some(e) = downcast_event::<FrameEnabledChangedEvent>(event) {
        let what = if e.enabled { "enabled" } else { "disabled" };
        return Some(format!("{} {}", what, e.frame));
    }
    if let Some(e) = downcast_event::<DelayChangedEvent>(event) {
        return Some(format!("delay {}ms dwell {}ms", e.delay_ms, e.dwell_ms));
    }
    if let Some(e) = downcast_event::<LoadFailedEvent>(event) {
        return Some(format!("failed {} {}: {}", e.frame, e.url, e.error));
    }
    if let Some(e) = downcast_event::<LoadCompleteEvent>(event) {
        return Some(format!("loaded {:?}: {} ok, {} failed", e.mode, e.loaded, e.failed));
    }
    if let Some(e) = downcast_event::<StatusChangedEvent>(event) {
        return Some(format!("status {}", e.message.as_deref().unwrap_or("-")));
    }
    None
}

fn print_events(bus: &EventBus) {
    for event in bus.poll() {
        if let Some(line) = describe(&event) {
            println!("{}", line);
        }
    }
}

fn main() -> Result<()> {
    // Parse command-line arguments first (needed for log setup)
    let args = Args::parse();
    init_logging(&args)?;

    info!("Flipbook starting...");
    debug!("Command-line args: {:?}", args);

    let config = args.animator_config()?;
    if config.images.is_empty() {
        use clap::CommandFactory;
        let mut cmd = Args::command();
        let _ = cmd.print_help();
        println!();
        return Ok(());
    }

    let bus = EventBus::new();
    let mut animator = Animator::new(config, &bus);
    print_events(&bus);

    match args.duration {
        Some(secs) => {
            anyhow::ensure!(secs.is_finite(), "Invalid duration: {}", secs);
            let until = Instant::now() + Duration::from_secs_f64(secs.max(0.0));
            if args.autoplay {
                animator.play();
            }
            while Instant::now() < until {
                let left = until.saturating_duration_since(Instant::now());
                animator.wait(left.min(MAX_WAIT));
                print_events(&bus);
            }
        }
        None => {
            if !animator.wait_for_load(LOAD_TIMEOUT) {
                warn!("Images still loading after {}s", LOAD_TIMEOUT.as_secs());
            }
            print_events(&bus);
            if args.autoplay {
                // Runs until interrupted
                animator.play();
                loop {
                    animator.wait(MAX_WAIT);
                    print_events(&bus);
                }
            }
        }
    }

    animator.destroy();
    print_events(&bus);
    info!("Flipbook finished");
    Ok(())
}
