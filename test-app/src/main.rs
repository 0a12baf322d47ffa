// rdmx test application -- CLI tool for exercising an rdmx session against
// the simulated fixture from rdmx-test-harness.
//
// Usage:
//   rdmx-test-app info
//   rdmx-test-app discover
//   rdmx-test-app get 0x0060
//   rdmx-test-app get 0x00E1 --payload "01"
//   rdmx-test-app set 0x0082 "48 65 6C 6C 6F"
//   rdmx-test-app query-all --export scorecard.csv
//   rdmx-test-app identify on
//   rdmx-test-app address set 17
//
// Output and diagnostics:
//   rdmx-test-app --refresh 40 fade --from 0 --to 255 --duration 5
//   rdmx-test-app chase --dwell-ms 200 --duration 4
//   rdmx-test-app flicker --duration 10
//   rdmx-test-app stress-rdm --pid 0x0060 --iterations 200
//   rdmx-test-app stress-dmx --duration 5
//
// Set RUST_LOG=rdmx_session=debug for session internals.

use std::fs::File;
use std::future::Future;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

use rdmx::session::diagnostics::RdmStressParams;
use rdmx::{
    Error, ParameterDescriptor, PidReply, ResponseStatus, Session, SessionBuilder, SessionEvent,
    SupportState, Uid,
};
use rdmx_test_harness::SimulatedFixture;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// rdmx test application -- drives a DMX/RDM session from the command line.
#[derive(Parser)]
#[command(name = "rdmx-test-app", version, about)]
struct Cli {
    /// DMX output refresh rate in Hz (1..=44).
    #[arg(long, default_value_t = 25)]
    refresh: u32,

    /// Initial fixture footprint before DEVICE_INFO resizes it.
    #[arg(long, default_value_t = 16)]
    footprint: u16,

    /// Parameter catalog CSV loaded through the adapter.
    #[arg(long, default_value = "rdm_map.csv")]
    catalog: PathBuf,

    /// Adapter index to open.
    #[arg(long, default_value_t = 0)]
    adapter: usize,

    /// Target device UID (MMMM:DDDDDDDD). Defaults to the first device
    /// found by discovery.
    #[arg(long)]
    target: Option<Uid>,

    /// Round-trip time reported by the simulated fixture, in microseconds.
    #[arg(long, default_value_t = 850)]
    latency_us: u64,

    /// Leave DMX output stopped.
    #[arg(long)]
    no_output: bool,

    #[command(subcommand)]
    command: Command,
}

/// Parse a hex string like "0x0060" or "60" into a u16.
fn parse_hex_u16(s: &str) -> std::result::Result<u16, String> {
    let s = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u16::from_str_radix(s, 16).map_err(|e| format!("invalid PID: {e}"))
}

#[derive(Subcommand)]
enum Command {
    /// Print adapter, device and output information.
    Info,

    /// Run RDM discovery and list the devices found.
    Discover,

    /// GET one parameter.
    Get {
        /// Parameter ID in hex.
        #[arg(value_parser = parse_hex_u16)]
        pid: u16,

        /// Request payload as hex bytes ("01 02" or "0102").
        #[arg(long, default_value = "")]
        payload: String,
    },

    /// SET one parameter.
    Set {
        /// Parameter ID in hex.
        #[arg(value_parser = parse_hex_u16)]
        pid: u16,

        /// Payload as hex bytes.
        payload: String,
    },

    /// GET every catalog parameter and print the scorecard.
    QueryAll {
        /// Also write the parameter table as CSV.
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Cross-check SUPPORTED_PARAMETERS against the catalog.
    Supported,

    /// Toggle identify mode on the target.
    Identify {
        #[arg(value_enum)]
        state: OnOff,
    },

    /// Remote DMX start address operations.
    Address {
        #[command(subcommand)]
        action: AddressAction,
    },

    /// Query and print DEVICE_INFO.
    DeviceInfo,

    /// Ping-pong fade every channel between two levels.
    Fade {
        #[arg(long, default_value_t = 0)]
        from: u8,

        #[arg(long, default_value_t = 255)]
        to: u8,

        /// Seconds per half cycle.
        #[arg(long, default_value_t = 2.0)]
        period: f64,

        /// Seconds to run before stopping (0 = until Ctrl-C).
        #[arg(long, default_value_t = 6)]
        duration: u64,
    },

    /// Light one channel at a time.
    Chase {
        /// Milliseconds per channel (minimum 50).
        #[arg(long, default_value_t = 250)]
        dwell_ms: u64,

        /// Seconds to run before stopping (0 = until Ctrl-C).
        #[arg(long, default_value_t = 5)]
        duration: u64,
    },

    /// Send frames at the refresh rate and report timing jitter.
    Flicker {
        /// Seconds to run.
        #[arg(long, default_value_t = 10)]
        duration: u64,

        /// Global level held during the run.
        #[arg(long, default_value_t = 255)]
        level: u8,
    },

    /// Repeat one GET and report latency statistics.
    StressRdm {
        #[arg(long, value_parser = parse_hex_u16, default_value = "0x0060")]
        pid: u16,

        #[arg(long, default_value_t = 100)]
        iterations: u32,
    },

    /// Send alternating full/zero frames as fast as possible.
    StressDmx {
        /// Seconds to run.
        #[arg(long, default_value_t = 5)]
        duration: u64,
    },

    /// Query everything and write the parameter table as CSV.
    Export {
        /// Output path (stdout when omitted).
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Print session events for a while (Ctrl-C to stop).
    Monitor {
        /// Seconds to monitor (0 = until Ctrl-C).
        #[arg(long, default_value_t = 10)]
        duration: u64,
    },

    /// Discover, read DEVICE_INFO and dump the raw frame log.
    Log,
}

#[derive(Clone, Copy, ValueEnum)]
enum OnOff {
    On,
    Off,
}

#[derive(Subcommand)]
enum AddressAction {
    /// Read DMX_START_ADDRESS from the target.
    Get,
    /// Write DMX_START_ADDRESS (1..=512).
    Set { address: u16 },
}

// ---------------------------------------------------------------------------
// Session construction
// ---------------------------------------------------------------------------

async fn open_session(cli: &Cli) -> Result<Session> {
    let fixture = SimulatedFixture {
        latency: Duration::from_micros(cli.latency_us),
        ..SimulatedFixture::default()
    };
    let (transport, _handle) = fixture.into_transport();

    let session = SessionBuilder::new()
        .refresh_rate(cli.refresh)
        .footprint(cli.footprint)
        .catalog_path(&cli.catalog)
        .auto_start(!cli.no_output)
        .build_with_transport(Box::new(transport))
        .await
        .context("failed to build session")?;

    let devices = session.list_devices().await?;
    if cli.adapter >= devices {
        bail!("adapter index {} out of range ({devices} found)", cli.adapter);
    }
    let info = session
        .connect(cli.adapter)
        .await
        .with_context(|| format!("failed to open adapter {}", cli.adapter))?;
    tracing::info!(firmware = %info.firmware, serial = %info.serial_hex(), "adapter open");
    Ok(session)
}

/// Resolve the command target: `--target` if given, else the first
/// discovered device.
async fn resolve_target(session: &Session, explicit: Option<Uid>) -> Result<Uid> {
    if let Some(uid) = explicit {
        return Ok(uid);
    }
    let uids = session.discover().await?;
    match uids.first() {
        Some(uid) => Ok(*uid),
        None => bail!("no RDM devices found"),
    }
}

/// Await `op`, cancelling the running activity on Ctrl-C and waiting for it
/// to wind down.
async fn until_interrupted<T>(
    session: &Session,
    op: impl Future<Output = rdmx::Result<T>>,
) -> rdmx::Result<T> {
    tokio::pin!(op);
    tokio::select! {
        result = &mut op => result,
        _ = tokio::signal::ctrl_c() => {
            if let Some(kind) = session.cancel_activity().await {
                eprintln!("\nCancelling {kind}...");
            }
            op.await
        }
    }
}

/// Sleep for `secs` seconds, or until Ctrl-C when `secs` is zero.
async fn run_for(secs: u64) {
    if secs == 0 {
        let _ = tokio::signal::ctrl_c().await;
        return;
    }
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
        _ = tokio::signal::ctrl_c() => {}
    }
}

/// Print progress events in place until aborted.
fn spawn_progress(mut events: broadcast::Receiver<SessionEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SessionEvent::Progress { done, total, label }) => {
                    print!("\r\x1b[K[{done}/{total}] {label}");
                    io::stdout().flush().ok();
                }
                Ok(SessionEvent::ActivityStatus { text }) => {
                    print!("\r\x1b[K{text}");
                    io::stdout().flush().ok();
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn finish_progress(task: JoinHandle<()>) {
    task.abort();
    println!();
}

// ---------------------------------------------------------------------------
// Output formatting
// ---------------------------------------------------------------------------

fn print_reply(pid: u16, reply: &PidReply) {
    let result = &reply.result;
    println!("PID 0x{pid:04X}");
    println!("  Status:   {}", result.status.label());
    if let Some(reason) = result.nack_reason() {
        println!("  Reason:   {reason}");
    }
    println!(
        "  Latency:  {} us ({:?})",
        result.latency_us(),
        result.latency_grade()
    );
    if !reply.decoded.value.is_empty() {
        println!("  Value:    {}", reply.decoded.value);
    }
    if !reply.decoded.raw_hex.is_empty() {
        println!("  Raw:      {}", reply.decoded.raw_hex);
    }
}

fn cancelled_suffix(cancelled: bool) -> &'static str {
    if cancelled { " (cancelled)" } else { "" }
}

fn print_scorecard(card: &rdmx::Scorecard) {
    println!(
        "Scorecard: {} pass, {} warn, {} fail, {} timeout ({} queried)",
        card.pass,
        card.warn,
        card.fail,
        card.timeout,
        card.total()
    );
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_info(session: &Session, target: Option<Uid>) -> Result<()> {
    let uid = resolve_target(session, target).await?;
    let info = session.device_info(uid).await?;
    let snap = session.snapshot().await?;

    println!("Adapter");
    if let Some(conn) = &snap.connection {
        println!("  Index:          {}", conn.index);
        println!("  Firmware:       {}", conn.firmware);
        println!("  Serial:         {}", conn.serial_hex());
    }
    println!();
    println!("Device {uid}");
    match info {
        Some(d) => {
            println!("  RDM protocol:   {}.{}", d.protocol_major, d.protocol_minor);
            println!("  Model ID:       0x{:04X}", d.model_id);
            println!("  Category:       0x{:04X}", d.category);
            println!(
                "  Software:       {}.{}.{}",
                d.software_major, d.software_minor, d.software_build
            );
            println!("  Footprint:      {}", d.footprint);
            println!(
                "  Personality:    {} of {}",
                d.current_personality, d.personality_count
            );
            println!("  Start address:  {}", d.start_address);
            println!("  Sub-devices:    {}", d.sub_device_count);
            println!("  Sensors:        {}", d.sensor_count);
        }
        None => println!("  DEVICE_INFO not available"),
    }
    println!();
    println!("Output");
    println!("  Running:        {}", snap.output_running);
    println!("  Refresh:        {} Hz", snap.refresh_hz);
    println!("  Start address:  {}", snap.start_address);
    println!("  Channels:       {}", snap.footprint());
    println!("  Catalog:        {} parameters", snap.pids.len());
    Ok(())
}

async fn cmd_discover(session: &Session) -> Result<()> {
    let uids = session.discover().await?;
    if uids.is_empty() {
        println!("No RDM devices found.");
        return Ok(());
    }
    println!("Found {} device(s):", uids.len());
    for uid in uids {
        println!("  {uid}");
    }
    Ok(())
}

async fn cmd_get(session: &Session, target: Option<Uid>, pid: u16, payload: &str) -> Result<()> {
    let uid = resolve_target(session, target).await?;
    let Some(reply) = session.query_pid_hex(uid, pid, payload).await? else {
        bail!("invalid hex payload: {payload:?}");
    };
    print_reply(pid, &reply);
    Ok(())
}

async fn cmd_set(session: &Session, target: Option<Uid>, pid: u16, payload: &str) -> Result<()> {
    let uid = resolve_target(session, target).await?;
    ensure_settable(&session.catalog().await?, pid)?;
    let Some(reply) = session.set_pid_hex(uid, pid, payload).await? else {
        bail!("invalid hex payload: {payload:?}");
    };
    print_reply(pid, &reply);
    if reply.result.status != ResponseStatus::Ack {
        bail!("SET 0x{pid:04X} was not acknowledged");
    }
    Ok(())
}

/// Refuse a SET the catalog marks GET-only. PIDs outside the catalog pass.
fn ensure_settable(catalog: &[ParameterDescriptor], pid: u16) -> Result<()> {
    match catalog.iter().find(|d| d.pid == pid) {
        Some(d) if !d.command_class.supports_set() => {
            bail!("0x{pid:04X} {} does not support SET", d.name)
        }
        _ => Ok(()),
    }
}

async fn cmd_query_all(
    session: &Session,
    target: Option<Uid>,
    export: Option<PathBuf>,
) -> Result<()> {
    let uid = resolve_target(session, target).await?;
    let progress = spawn_progress(session.subscribe());
    let result = until_interrupted(session, session.query_all_pids(uid)).await;
    finish_progress(progress);

    let card = match result {
        Ok(card) => card,
        Err(Error::Cancelled) => {
            println!("Batch query cancelled.");
            session.scorecard().await?
        }
        Err(e) => return Err(e.into()),
    };

    let snap = session.snapshot().await?;
    println!();
    println!(
        "{:<8} {:<30} {:<8} {:<10} {:>8}  Value",
        "PID", "Name", "Class", "Status", "Latency"
    );
    for row in &snap.pids {
        let status = row.status().map(|s| s.label()).unwrap_or("-");
        let latency = row
            .result
            .as_ref()
            .map(|r| format!("{}us", r.latency_us()))
            .unwrap_or_default();
        println!(
            "0x{:04X}   {:<30} {:<8} {:<10} {:>8}  {}",
            row.descriptor.pid,
            row.descriptor.name,
            row.descriptor.command_class,
            status,
            latency,
            row.value
        );
    }
    println!();
    print_scorecard(&card);

    if let Some(path) = export {
        let file = File::create(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        session.export_csv(file).await?;
        println!("Exported to {}", path.display());
    }
    Ok(())
}

async fn cmd_supported(session: &Session, target: Option<Uid>) -> Result<()> {
    let uid = resolve_target(session, target).await?;
    let check = session.query_supported(uid).await?;
    println!("Device lists {} parameter(s).", check.supported.len());

    let snap = session.snapshot().await?;
    let missing: Vec<_> = snap
        .pids
        .iter()
        .filter(|row| row.support == SupportState::Missing)
        .collect();
    for row in &snap.pids {
        println!(
            "  0x{:04X} {:<30} {}",
            row.descriptor.pid, row.descriptor.name, row.support
        );
    }
    if !missing.is_empty() {
        println!();
        println!("Mandatory parameters not listed:");
        for row in missing {
            println!("  0x{:04X} {}", row.descriptor.pid, row.descriptor.name);
        }
    }
    Ok(())
}

async fn cmd_identify(session: &Session, target: Option<Uid>, state: OnOff) -> Result<()> {
    let uid = resolve_target(session, target).await?;
    let on = matches!(state, OnOff::On);
    let result = session.identify(uid, on).await?;
    println!(
        "Identify {}: {}",
        if on { "ON" } else { "OFF" },
        result.status.label()
    );
    Ok(())
}

async fn cmd_address(session: &Session, target: Option<Uid>, action: AddressAction) -> Result<()> {
    let uid = resolve_target(session, target).await?;
    match action {
        AddressAction::Get => match session.get_start_address(uid).await? {
            Some(address) => println!("DMX start address: {address}"),
            None => bail!("device did not report a start address"),
        },
        AddressAction::Set { address } => {
            let Some(result) = session.set_start_address(uid, address).await? else {
                bail!("start address {address} outside 1..=512");
            };
            println!("Set start address {address}: {}", result.status.label());
            if result.status != ResponseStatus::Ack {
                bail!("device rejected start address {address}");
            }
        }
    }
    Ok(())
}

async fn cmd_device_info(session: &Session, target: Option<Uid>) -> Result<()> {
    let uid = resolve_target(session, target).await?;
    let reply = session.query_pid(uid, rdmx::PID_DEVICE_INFO, &[]).await?;
    print_reply(rdmx::PID_DEVICE_INFO, &reply);
    Ok(())
}

async fn cmd_fade(session: &Session, from: u8, to: u8, period: f64, duration: u64) -> Result<()> {
    if !(period.is_finite() && period > 0.0) {
        bail!("--period must be positive");
    }
    let progress = spawn_progress(session.subscribe());
    session
        .start_fade(from, to, Duration::from_secs_f64(period))
        .await?;
    run_for(duration).await;
    session.stop_effect().await?;
    finish_progress(progress);
    println!("Frames sent: {}", session.frame_count());
    Ok(())
}

async fn cmd_chase(session: &Session, dwell_ms: u64, duration: u64) -> Result<()> {
    let progress = spawn_progress(session.subscribe());
    session
        .start_chase(Duration::from_millis(dwell_ms))
        .await?;
    run_for(duration).await;
    session.stop_effect().await?;
    finish_progress(progress);
    println!("Frames sent: {}", session.frame_count());
    Ok(())
}

async fn cmd_flicker(session: &Session, duration: u64, level: u8) -> Result<()> {
    session.set_global_level(level).await?;
    let progress = spawn_progress(session.subscribe());
    let report = until_interrupted(
        session,
        session.flicker_finder(Duration::from_secs(duration)),
    )
    .await;
    finish_progress(progress);
    let report = report?;

    println!("Flicker finder{}", cancelled_suffix(report.cancelled));
    println!("  Frames:         {}", report.frames);
    println!("  Failures:       {}", report.failures);
    println!("  Max jitter:     {:.2} ms", report.max_jitter_ms);
    println!("  Avg jitter:     {:.2} ms", report.avg_jitter_ms);
    println!(
        "  Verdict:        {}",
        if report.degraded { "DEGRADED" } else { "OK" }
    );
    if report.degraded {
        bail!("output timing degraded");
    }
    Ok(())
}

async fn cmd_stress_rdm(
    session: &Session,
    target: Option<Uid>,
    pid: u16,
    iterations: u32,
) -> Result<()> {
    let uid = resolve_target(session, target).await?;
    let params = RdmStressParams {
        target: uid,
        pid,
        iterations,
    };
    let progress = spawn_progress(session.subscribe());
    let report = until_interrupted(session, session.rdm_stress(params)).await;
    finish_progress(progress);
    let report = report?;

    println!("RDM stress 0x{:04X}{}", report.pid, cancelled_suffix(report.cancelled));
    println!("  Completed:      {}/{}", report.completed, report.iterations);
    println!("  ACK:            {}", report.ack);
    println!("  NACK:           {}", report.nack);
    println!("  Timeout:        {}", report.timeout);
    println!("  Other:          {}", report.other);
    println!("  Success:        {:.1}%", report.success_percent());
    if report.ack > 0 {
        println!(
            "  Latency:        min {} / avg {:.0} / max {} us",
            report.min_latency_us, report.avg_latency_us, report.max_latency_us
        );
    }
    if report.completed > report.ack {
        bail!(
            "{} out of {} transactions were not acknowledged",
            report.completed - report.ack,
            report.completed
        );
    }
    Ok(())
}

async fn cmd_stress_dmx(session: &Session, duration: u64) -> Result<()> {
    session.stop_output().await;
    let progress = spawn_progress(session.subscribe());
    let run = session.dmx_stress(Duration::from_secs(duration));
    let report = until_interrupted(session, run).await;
    finish_progress(progress);
    let report = report?;

    println!("DMX throughput{}", cancelled_suffix(report.cancelled));
    println!("  Frames:         {}", report.frames);
    println!("  Failures:       {}", report.failures);
    println!("  Elapsed:        {:.3} s", report.elapsed.as_secs_f64());
    println!("  Rate:           {:.1} frames/sec", report.fps());
    Ok(())
}

async fn cmd_export(session: &Session, target: Option<Uid>, output: Option<PathBuf>) -> Result<()> {
    let uid = resolve_target(session, target).await?;
    session.query_all_pids(uid).await?;
    match output {
        Some(path) => {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            session.export_csv(file).await?;
            eprintln!("Exported to {}", path.display());
        }
        None => session.export_csv(io::stdout().lock()).await?,
    }
    Ok(())
}

async fn cmd_monitor(session: &Session, duration: u64) -> Result<()> {
    let mut events = session.subscribe();
    println!("Monitoring session events (Ctrl-C to stop)...");

    let watch = async {
        loop {
            match events.recv().await {
                Ok(SessionEvent::Log(entry)) => println!("[log]   {}", entry.display_line()),
                Ok(event) => println!("[event] {event:?}"),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    println!("[warning] missed {n} events (consumer too slow)");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    println!("Event channel closed.");
                    break;
                }
            }
        }
    };

    tokio::select! {
        _ = watch => {}
        _ = run_for(duration) => println!("Monitor stopped."),
    }
    Ok(())
}

async fn cmd_log(session: &Session, target: Option<Uid>) -> Result<()> {
    let uid = resolve_target(session, target).await?;
    session.device_info(uid).await?;
    print!("{}", session.log_text().await?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let session = open_session(&cli).await?;
    let target = cli.target;

    let outcome = match cli.command {
        Command::Info => cmd_info(&session, target).await,
        Command::Discover => cmd_discover(&session).await,
        Command::Monitor { duration } => cmd_monitor(&session, duration).await,
        Command::Fade {
            from,
            to,
            period,
            duration,
        } => cmd_fade(&session, from, to, period, duration).await,
        Command::Chase { dwell_ms, duration } => cmd_chase(&session, dwell_ms, duration).await,
        Command::Flicker { duration, level } => cmd_flicker(&session, duration, level).await,
        Command::StressDmx { duration } => cmd_stress_dmx(&session, duration).await,
        Command::Get { pid, payload } => cmd_get(&session, target, pid, &payload).await,
        Command::Set { pid, payload } => cmd_set(&session, target, pid, &payload).await,
        Command::QueryAll { export } => cmd_query_all(&session, target, export).await,
        Command::Supported => cmd_supported(&session, target).await,
        Command::Identify { state } => cmd_identify(&session, target, state).await,
        Command::Address { action } => cmd_address(&session, target, action).await,
        Command::DeviceInfo => cmd_device_info(&session, target).await,
        Command::StressRdm { pid, iterations } => {
            cmd_stress_rdm(&session, target, pid, iterations).await
        }
        Command::Export { output } => cmd_export(&session, target, output).await,
        Command::Log => cmd_log(&session, target).await,
    };

    session.shutdown().await.context("shutdown failed")?;
    outcome
}
