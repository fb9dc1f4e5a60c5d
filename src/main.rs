//! Zonewatch CLI
//!
//! Usage:
//!   zonewatch --policy policy.json --check-policy              # Validate and summarize policy
//!   zonewatch --policy policy.json --evaluate snapshot.json    # One-shot compliance
//!   zonewatch --policy policy.json --replay frames.jsonl       # Deterministic replay
//!   zonewatch --policy policy.json --live < frames.jsonl       # Workers + ticker on wall clock
//!   zonewatch ... --json                                       # JSON lines output

use std::collections::HashMap;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::Parser;
use colored::Colorize;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader as AsyncBufReader};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use zonewatch::core::{
    parse_snapshot, run_compliance_ticker, spawn_source_worker, BroadcastSink, ComplianceEngine, PresenceLog,
    PresenceSource, Replay, ReplayOutput, SourceWorker,
};
use zonewatch::types::{ComplianceEvent, FrameSample, PresenceEvent, ZoneComplianceModel};
use zonewatch::{Error, Result, Settings, VERSION};

#[derive(Parser, Debug)]
#[command(
    name = "zonewatch",
    version = VERSION,
    about = "Zonewatch - presence behavior and zone staffing compliance",
    long_about = "Zonewatch turns per-frame face observations into debounced presence\n\
                  states (active / idle / away) and checks every zone's head-count\n\
                  against its staffing regulation.\n\n\
                  Modes:\n  \
                  --check-policy  Validate the policy document\n  \
                  --evaluate      Evaluate one presence snapshot\n  \
                  --replay        Replay recorded frames on sample time\n  \
                  --live          Read frames from stdin, tick on wall clock\n\n\
                  Zone states:\n  \
                  INITIALIZING        - Never observed\n  \
                  UNKNOWN             - Signal lost\n  \
                  COMPLIANT           - Staffing satisfied\n  \
                  UNDERSTAFFED        - Required role below minimum\n  \
                  OVERSTAFFED         - Role above maximum\n  \
                  UNAUTHORIZED_PERSON - Forbidden or unpermitted role present\n  \
                  CRITICAL_VIOLATION  - Violation held past its escalation window"
)]
struct Args {
    #[command(flatten)]
    settings: Settings,

    /// Validate the policy and print a summary
    #[arg(long)]
    check_policy: bool,

    /// Evaluate a presence snapshot (JSON array of presence records)
    #[arg(long, value_name = "FILE")]
    evaluate: Option<PathBuf>,

    /// Evaluation instant for --evaluate (RFC 3339); defaults to the newest record
    #[arg(long, value_name = "TIMESTAMP")]
    at: Option<DateTime<Utc>>,

    /// Replay frames from a JSONL file
    #[arg(long, value_name = "FILE")]
    replay: Option<PathBuf>,

    /// Read JSONL frames from stdin and run the live pipeline
    #[arg(long)]
    live: bool,

    /// Output as JSON lines
    #[arg(long)]
    json: bool,

    /// Disable colors in output
    #[arg(long)]
    no_color: bool,

    /// Log filter level (overrides RUST_LOG)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.log_level.as_deref());
    if args.no_color {
        colored::control::set_override(false);
    }

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("zonewatch: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(format!("zonewatch={}", level)),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("zonewatch=info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();
}

async fn run(args: &Args) -> Result<()> {
    args.settings.validate()?;
    let model = load_model(args.settings.policy.as_deref())?;

    if args.check_policy {
        let model = model.ok_or_else(|| Error::InvalidPolicy("--check-policy needs --policy".into()))?;
        print_policy_summary(&model, args);
        Ok(())
    } else if let Some(path) = &args.evaluate {
        let model = model.ok_or_else(|| Error::InvalidPolicy("--evaluate needs --policy".into()))?;
        run_evaluate(model, path, args)
    } else if let Some(path) = &args.replay {
        run_replay(model, path, args)
    } else if args.live {
        run_live(model, args).await
    } else {
        Err(Error::InvalidSetting {
            name: "mode",
            reason: "one of --check-policy, --evaluate, --replay or --live is required".into(),
        })
    }
}

fn load_model(path: Option<&Path>) -> Result<Option<Arc<ZoneComplianceModel>>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let model = ZoneComplianceModel::load(path)?;
    info!(
        path = %path.display(),
        roles = model.role_count(),
        zones = model.zones().len(),
        regulations = model.regulation_count(),
        "policy loaded"
    );
    Ok(Some(Arc::new(model)))
}

/// Parse one JSONL line; bad lines are logged and skipped
fn parse_frame(line: &str, line_no: usize) -> Option<FrameSample> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str(line) {
        Ok(frame) => Some(frame),
        Err(source) => {
            warn!("{}", Error::InputParse { line: line_no, source });
            None
        }
    }
}

// =============================================================================
// MODES
// =============================================================================

fn print_policy_summary(model: &ZoneComplianceModel, args: &Args) {
    if args.json {
        print_json(&serde_json::json!({
            "roles": model.role_count(),
            "zones": model.zones().len(),
            "regulations": model.regulation_count(),
            "staleness_window_seconds": model.staleness_window().num_seconds(),
        }));
        return;
    }

    print_header("Policy", args.no_color);
    println!("roles: {}  regulations: {}", model.role_count(), model.regulation_count());
    println!("staleness window: {}s", model.staleness_window().num_seconds());
    println!();
    for zone in model.zones() {
        let regulation = model.regulation_for(&zone.zone_type);
        let label = match regulation {
            Some(reg) => reg.regulation_id.clone().unwrap_or_else(|| zone.zone_type.clone()),
            None => "no regulation".yellow().to_string(),
        };
        println!("{:<16} type={:<14} cameras=[{}] {}", zone.zone_id, zone.zone_type, zone.camera_ids.join(","), label);
    }
}

fn run_evaluate(model: Arc<ZoneComplianceModel>, path: &Path, args: &Args) -> Result<()> {
    let text = std::fs::read_to_string(path).map_err(|source| Error::Io { path: path.to_path_buf(), source })?;
    let snapshot =
        parse_snapshot(&text).map_err(|source| Error::SnapshotParse { path: path.to_path_buf(), source })?;

    let now = args
        .at
        .or_else(|| snapshot.iter().filter_map(|r| r.last_seen_ts).max())
        .unwrap_or_else(Utc::now);
    let engine = ComplianceEngine::new(model);
    let result = engine.evaluate_source(&snapshot, now);

    if args.json {
        for event in &result.events {
            print_json(event);
        }
    } else {
        print_header("Evaluate", args.no_color);
        for report in &result.zones {
            if args.no_color {
                println!("{}", report.to_parseable_string(now));
            } else {
                println!("{}", report.to_terminal_string(now));
            }
        }
    }
    Ok(())
}

fn run_replay(model: Option<Arc<ZoneComplianceModel>>, path: &Path, args: &Args) -> Result<()> {
    let file = std::fs::File::open(path).map_err(|source| Error::Io { path: path.to_path_buf(), source })?;
    let settings = &args.settings;
    let mut replay = Replay::new(
        settings.tracker(),
        settings.subject_retention_seconds,
        settings.compliance_tick_seconds,
        model.map(ComplianceEngine::new),
    );

    let mut frames = 0usize;
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| Error::Io { path: path.to_path_buf(), source })?;
        let Some(frame) = parse_frame(&line, idx + 1) else {
            continue;
        };
        frames += 1;
        for output in replay.push(&frame) {
            print_output(&output, args.json, args.no_color);
        }
    }
    for output in replay.finish() {
        print_output(&output, args.json, args.no_color);
    }
    info!(frames, "replay finished");
    Ok(())
}

async fn run_live(model: Option<Arc<ZoneComplianceModel>>, args: &Args) -> Result<()> {
    let settings = &args.settings;
    let log = Arc::new(PresenceLog::new());
    let (presence_tx, presence_rx) = broadcast::channel::<PresenceEvent>(1024);
    let sink = Arc::new(BroadcastSink::new(1024));
    let (stop_tx, stop_rx) = watch::channel(false);

    if !args.json {
        print_header("Live", args.no_color);
    }

    let printer = tokio::spawn(print_live(presence_rx, sink.subscribe(), args.json, args.no_color));

    let ticker = model.map(|model| {
        let engine = Arc::new(ComplianceEngine::new(model));
        let source: Arc<dyn PresenceSource> = log.clone();
        tokio::spawn(run_compliance_ticker(
            engine,
            source,
            sink.clone(),
            std::time::Duration::from_secs(settings.compliance_tick_seconds),
            stop_rx,
        ))
    });

    let mut workers: HashMap<String, mpsc::Sender<FrameSample>> = HashMap::new();
    let mut handles = Vec::new();
    let mut lines = AsyncBufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0usize;

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("stdin: {}", e);
                break;
            }
        };
        line_no += 1;
        let Some(frame) = parse_frame(&line, line_no) else {
            continue;
        };

        let tx = workers.entry(frame.source_id.clone()).or_insert_with(|| {
            let worker = SourceWorker::new(
                frame.source_id.clone(),
                settings.tracker(),
                settings.subject_retention_seconds,
                Arc::clone(&log),
            )
            .with_events(presence_tx.clone());
            let (tx, handle) = spawn_source_worker(worker, 256);
            handles.push(handle);
            tx
        });
        if tx.send(frame).await.is_err() {
            warn!("source worker gone, frame dropped");
        }
    }

    // Drain workers, then stop the ticker
    workers.clear();
    for handle in handles {
        if let Err(e) = handle.await {
            warn!("source worker failed: {}", e);
        }
    }
    let _ = stop_tx.send(true);
    if let Some(ticker) = ticker {
        if let Err(e) = ticker.await {
            warn!("compliance ticker failed: {}", e);
        }
    }
    drop(presence_tx);
    drop(sink);
    if let Err(e) = printer.await {
        warn!("printer failed: {}", e);
    }
    Ok(())
}

async fn print_live(
    mut presence: broadcast::Receiver<PresenceEvent>,
    mut compliance: broadcast::Receiver<ComplianceEvent>,
    json: bool,
    no_color: bool,
) {
    let mut presence_open = true;
    let mut compliance_open = true;
    while presence_open || compliance_open {
        tokio::select! {
            ev = presence.recv(), if presence_open => match ev {
                Ok(ev) => print_output(&ReplayOutput::Presence(ev), json, no_color),
                Err(broadcast::error::RecvError::Lagged(n)) => warn!(skipped = n, "presence output lagging"),
                Err(broadcast::error::RecvError::Closed) => presence_open = false,
            },
            ev = compliance.recv(), if compliance_open => match ev {
                Ok(ev) => print_output(&ReplayOutput::Compliance(ev), json, no_color),
                Err(broadcast::error::RecvError::Lagged(n)) => warn!(skipped = n, "compliance output lagging"),
                Err(broadcast::error::RecvError::Closed) => compliance_open = false,
            },
        }
    }
    debug!("output closed");
}

// =============================================================================
// OUTPUT
// =============================================================================

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{}", line),
        Err(e) => warn!("serialize output: {}", e),
    }
}

fn print_output(output: &ReplayOutput, json: bool, no_color: bool) {
    if json {
        print_json(output);
        return;
    }
    let line = match output {
        ReplayOutput::Presence(ev) => format_presence(ev, no_color),
        ReplayOutput::Compliance(ev) => format_compliance(ev, no_color),
    };
    println!("{}", line);
}

fn format_presence(ev: &PresenceEvent, no_color: bool) -> String {
    let rule = ev.payload.get("rule").and_then(|v| v.as_str()).unwrap_or("-");
    let motion = ev.payload.get("motion_state").and_then(|v| v.as_str()).unwrap_or("-");
    let ts = ev.ts.format("%H:%M:%S");
    if no_color {
        format!(
            "presence | ts={} | subject={} | source={} | status={} | motion={} | rule={}",
            ts,
            ev.subject_key(),
            ev.source_id,
            ev.event,
            motion,
            rule
        )
    } else {
        format!(
            "{} {:<20} {:<10} {} {} {}",
            ts.to_string().dimmed(),
            ev.subject_key(),
            ev.source_id,
            ev.event.as_str().to_uppercase().color(ev.event.color()).bold(),
            motion,
            rule.dimmed()
        )
    }
}

fn format_compliance(ev: &ComplianceEvent, no_color: bool) -> String {
    let violations = if ev.violations.is_empty() { "-".to_string() } else { ev.violations.join(",") };
    if no_color {
        format!(
            "compliance | ts={} | zone={} | state={} | since={} | violations=[{}] | severity={}",
            ev.ts, ev.zone_id, ev.state, ev.since, violations, ev.severity
        )
    } else {
        format!(
            "{} {:<16} {} since {} | {}",
            ev.ts.dimmed(),
            ev.zone_id,
            ev.state.as_str().color(ev.state.color()).bold(),
            ev.since,
            violations
        )
    }
}

fn print_header(mode: &str, no_color: bool) {
    let title = format!("Zonewatch v{} - {}", VERSION, mode);
    if no_color {
        println!("========================================");
        println!("  {}", title);
        println!("========================================");
    } else {
        println!("{}", "════════════════════════════════════════".bold());
        println!("  {}", title.bold());
        println!("{}", "════════════════════════════════════════".bold());
    }
    println!();
}
