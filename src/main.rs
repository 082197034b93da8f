//! Recoil Engine - Recoil Compensation Engine
//!
//! Entry point for the engine binary.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use recoil_engine::config::{Config, LoggingConfig};
use recoil_engine::engine::{ControllerOptions, RecoilController, StartMode};
use recoil_engine::input::{CursorSink, HoldForTrigger, RecordingCursor, TriggerSource};
use recoil_engine::pattern::displacement_sums;
use recoil_engine::timing::TimingOracle;

/// Command-line arguments for recoil-engine
#[derive(Parser, Debug)]
#[command(name = "recoil-engine")]
#[command(version, about = "Recoil compensation engine", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "RECOIL_CONFIG", default_value = "recoil.toml")]
    config: String,

    /// Verbose logging (can be specified multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load the configuration and report validation results
    Validate,

    /// Print a weapon's calculated pattern and its displacement sums
    ShowPattern {
        /// Weapon name (pattern id)
        weapon: String,

        /// Emit the calculated pattern as JSON
        #[arg(long)]
        json: bool,
    },

    /// Play one sequence against a synthetic trigger and report precision
    Simulate {
        /// Weapon name (pattern id)
        weapon: String,

        /// How long the synthetic trigger stays held, milliseconds
        #[arg(long, default_value = "3000")]
        hold_ms: u64,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Config is loaded before the subscriber exists so its logging section
    // can shape the subscriber; load-time tracing calls are no-ops.
    let config = Config::load(&args.config)?;
    let _guard = init_logging(&args, &config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        profile = if cfg!(debug_assertions) { "debug" } else { "release" },
        config = %args.config,
        "recoil-engine starting"
    );

    match args.command {
        Command::Validate => validate(&config),
        Command::ShowPattern { weapon, json } => show_pattern(&config, &weapon, json),
        Command::Simulate { weapon, hold_ms } => simulate(&config, &weapon, hold_ms),
    }
}

fn validate(config: &Config) -> Result<()> {
    let (store, table) = config.build_profiles()?;
    println!(
        "configuration valid: {} profiles, {} weapon ids",
        store.len(),
        table.len()
    );
    for name in store.names() {
        println!("  {name}");
    }
    Ok(())
}

fn show_pattern(config: &Config, weapon: &str, json: bool) -> Result<()> {
    let (store, _table) = config.build_profiles()?;
    let profile = store
        .get(weapon)
        .ok_or_else(|| anyhow!("unknown weapon: '{weapon}'"))?;

    let pattern = profile.calculated_pattern();

    if json {
        let rendered = serde_json::to_string_pretty(pattern.as_slice())
            .context("failed to serialize pattern")?;
        println!("{rendered}");
        return Ok(());
    }

    println!(
        "{} ({}): {} points, multiple={}, length={}",
        profile.name(),
        profile.display_name(),
        pattern.len(),
        profile.multiple(),
        profile.length(),
    );
    for (i, point) in pattern.iter().enumerate() {
        println!(
            "  [{i:3}] dx={:+7.2} dy={:+7.2} delay={:6.2}ms",
            point.dx, point.dy, point.delay_ms
        );
    }

    let (sx, sy) = displacement_sums(&pattern);
    println!("displacement sums: x={sx:+.2} y={sy:+.2}");
    Ok(())
}

fn simulate(config: &Config, weapon: &str, hold_ms: u64) -> Result<()> {
    let (store, _table) = config.build_profiles()?;
    let profile = store
        .get(weapon)
        .ok_or_else(|| anyhow!("unknown weapon: '{weapon}'"))?;

    let trigger = Arc::new(HoldForTrigger::new(Duration::from_millis(hold_ms)));
    let cursor = Arc::new(RecordingCursor::new());
    let oracle = Arc::new(TimingOracle::with_strategy(config.engine.timing));

    let controller = RecoilController::new(
        Arc::clone(&store),
        Arc::clone(&trigger) as Arc<dyn TriggerSource>,
        Arc::clone(&cursor) as Arc<dyn CursorSink>,
        oracle,
        ControllerOptions {
            poll_interval_ms: config.engine.poll_interval_ms,
            stop_timeout: Duration::from_millis(config.engine.stop_timeout_ms),
        },
    );

    controller.set_weapon(Some(weapon))?;
    controller.start(StartMode::Manual)?;

    info!(weapon, hold_ms, "simulation running");
    std::thread::sleep(Duration::from_millis(hold_ms + 200));
    controller.stop()?;

    let (emitted_x, emitted_y) = cursor.totals();
    let pattern = profile.calculated_pattern();
    let (raw_x, raw_y) = displacement_sums(&pattern[1..]);

    println!("simulation finished: {} cursor moves", cursor.count());
    println!("  emitted displacement: x={emitted_x:+} y={emitted_y:+}");
    println!("  pattern displacement: x={raw_x:+.2} y={raw_y:+.2}");
    Ok(())
}

fn init_logging(
    args: &Args,
    logging: &LoggingConfig,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let log_level = match args.verbose {
        0 => logging.level.clone(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("recoil_engine={log_level},warn"))
    });

    if let Some(log_dir) = &logging.log_dir {
        let appender = tracing_appender::rolling::daily(log_dir, "recoil-engine.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stdout))
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false),
            )
            .init();
        Ok(Some(guard))
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stdout))
            .init();
        Ok(None)
    }
}
