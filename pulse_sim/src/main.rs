//! Pulse demo CLI
//!
//! Play scripted scenarios headlessly (checked, exportable) or in real time
//! with toasts printed to the terminal.

use clap::Parser;
use pulse_core::config::validate_acceleration;
use pulse_core::{
    ControlCommand, DemoEngine, DomainEvent, EngineConfig, EventFilter, LiveCounters, RecentEvents,
    ScenarioId,
};
use pulse_env::{DemoContext, TokioContext};
use pulse_sim::{ScenarioResult, ScenarioRunner};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Pulse demo-mode event simulation CLI
#[derive(Parser, Debug)]
#[command(name = "pulse-sim")]
#[command(about = "Play scripted care-coordination scenarios", long_about = None)]
struct Args {
    /// Master seed for payload generation (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (new_patient_onboarding, high_risk_recovery, pa_success,
    /// adverse_event_handling, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Virtual seconds per real second (1-100)
    #[arg(short, long, default_value = "10")]
    acceleration: f64,

    /// Wall-clock tick interval in milliseconds
    #[arg(long, default_value = "50")]
    tick_ms: u64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export the recorded run to a JSON file
    #[arg(long)]
    export: Option<String>,

    /// Play against the system clock, printing toasts as they arrive
    #[arg(long)]
    realtime: bool,

    /// With --realtime, read control commands from stdin
    #[arg(long, requires = "realtime")]
    interactive: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    if !args.json {
        info!("Pulse demo simulator v0.1.0");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    // Parse scenarios
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args.scenario.parse().unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            eprintln!(
                "Available scenarios: {}, all",
                ScenarioId::all().iter().map(|s| s.name()).collect::<Vec<_>>().join(", ")
            );
            std::process::exit(1);
        })]
    };

    let acceleration = validate_acceleration(args.acceleration).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });
    let tick = Duration::from_millis(args.tick_ms.max(1));

    // Determine base seed
    let seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    if args.realtime {
        if scenarios.len() > 1 && args.interactive {
            eprintln!("Error: --interactive plays a single scenario, not 'all'");
            std::process::exit(1);
        }
        let mut all_complete = true;
        for scenario in &scenarios {
            all_complete &=
                run_realtime(seed, *scenario, acceleration, tick, args.interactive).await;
        }
        if !all_complete {
            std::process::exit(1);
        }
        return;
    }

    let runner = ScenarioRunner::new(seed)
        .with_acceleration(acceleration)
        .with_tick_interval(tick);

    // Handle --export mode
    if let Some(export_path) = &args.export {
        if scenarios.len() > 1 {
            eprintln!("Error: --export only supports a single scenario, not 'all'");
            std::process::exit(1);
        }

        let export = runner.run_with_export(scenarios[0]);
        match export.write_to_file(export_path) {
            Ok(()) => info!("Exported {} events to {}", export.events.len(), export_path),
            Err(e) => {
                error!("Failed to write export: {}", e);
                std::process::exit(1);
            }
        }
        if !export.passed() {
            std::process::exit(1);
        }
        return;
    }

    let results: Vec<ScenarioResult> = scenarios.iter().map(|s| runner.run(*s)).collect();
    let failed_count = results.iter().filter(|r| !r.passed).count();

    if args.json {
        let summary = serde_json::json!({
            "total": results.len(),
            "passed": results.len() - failed_count,
            "failed": failed_count,
            "results": results,
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => error!("Failed to render summary: {}", e),
        }
    } else {
        for result in &results {
            if result.passed {
                info!(
                    "✓ {} (seed={}) PASSED: {} events in {:.1}s, {} evicted",
                    result.scenario,
                    result.seed,
                    result.events_delivered,
                    result.completion_ms as f64 / 1000.0,
                    result.notifications_evicted
                );
            } else {
                error!(
                    "✗ {} (seed={}) FAILED: {}",
                    result.scenario,
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", results.len());
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, results.len());
        }
    }

    // Exit with proper code for CI
    if failed_count > 0 {
        std::process::exit(1);
    }
}

/// Plays one scenario against the system clock. Returns whether the
/// script finished.
async fn run_realtime(
    seed: u64,
    scenario: ScenarioId,
    acceleration: f64,
    tick: Duration,
    interactive: bool,
) -> bool {
    let context = TokioContext::shared();
    let config = EngineConfig::default()
        .with_seed(seed)
        .with_tick_interval(tick)
        .with_scenario(scenario)
        .with_acceleration(acceleration);
    let mut engine = DemoEngine::new(Arc::clone(&context), config);

    engine.subscribe(EventFilter::All, |event: &DomainEvent| {
        println!("[{}] {}", clock_label(event.virtual_timestamp), event.headline());
        Ok(())
    });
    let counters = LiveCounters::attach(&engine.bus());
    let feed = RecentEvents::attach(
        &engine.bus(),
        EventFilter::All,
        engine.config().recent_events_capacity,
    );

    info!(
        "▶ {} at {}x ({}s of script)",
        scenario.label(),
        acceleration,
        scenario.scenario().duration.as_secs()
    );
    if interactive {
        info!(
            "Commands: play, pause, toggle, reset, speed <1-100>, scenario <id>, \
             dismiss <n>, status, quit"
        );
    }

    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = interactive;
    let mut last = context.now();

    engine.play();
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = context.now();
                engine.tick(now.saturating_sub(last));
                last = now;

                let drained = engine.notifications().pending_timers() == 0;
                if !interactive && engine.is_complete() && drained {
                    break;
                }
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match line.trim() {
                    "" => {}
                    "quit" | "exit" => break,
                    "status" => print_status(&engine, &counters, &feed),
                    text => match text.parse::<ControlCommand>() {
                        Ok(command) => {
                            if command == ControlCommand::Reset {
                                counters.reset();
                                feed.clear();
                            }
                            engine.apply(command);
                        }
                        Err(e) => warn!("{}", e),
                    },
                },
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to read stdin: {}", e);
                    stdin_open = false;
                }
            },
        }
    }

    let run = engine.run();
    info!(
        "■ {} stopped: {} events at {}",
        run.scenario_id,
        run.events_emitted_count,
        clock_label(run.virtual_time)
    );
    run.is_complete
}

fn print_status<Ctx: DemoContext>(
    engine: &DemoEngine<Ctx>,
    counters: &LiveCounters,
    feed: &RecentEvents,
) {
    let run = engine.run();
    info!(
        "{} {} | {}x | {} | {}/{} events",
        if run.is_playing { "▶" } else { "⏸" },
        run.scenario_id,
        run.acceleration_factor,
        clock_label(run.virtual_time),
        run.events_emitted_count,
        run.scenario_events
    );
    for record in engine.notifications().records() {
        info!("  {} [{:?}] {}", record.id, record.state, record.headline);
    }

    let kpis = counters.snapshot();
    info!(
        "  calls: {} active, {} resolved, {} escalated | frictions: {} | updates: {}",
        kpis.active_calls,
        kpis.calls_resolved,
        kpis.calls_escalated,
        kpis.friction_total(),
        kpis.patient_updates
    );
    for (metric, reading) in &kpis.metrics {
        info!("  {} = {} ({:+.1}%)", metric, reading.value, reading.change_pct);
    }
    if let Some(latest) = feed.latest() {
        info!("  last of {} recent: {}", feed.len(), latest.headline());
    }
}

/// Virtual time as `mm:ss.s`.
fn clock_label(time: Duration) -> String {
    let tenths = time.as_millis() / 100;
    format!("{:02}:{:02}.{}", tenths / 600, (tenths / 10) % 60, tenths % 10)
}
