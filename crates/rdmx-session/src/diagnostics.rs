//! Line diagnostics: flicker finder, transaction stress and frame
//! throughput.
//!
//! Each run checks its cancellation token between iterations and returns
//! whatever it measured so far, flagged as cancelled. Only a transport
//! failure during a transaction stress run ends a diagnostic with `Err`.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use rdmx_core::error::Result;
use rdmx_core::types::{
    CommandKind, DMX_FRAME_LEN, DMX_START_CODE, DmxFrame, ResponseStatus, Uid,
};

use crate::arbiter::ChannelArbiter;
use crate::emitter::refresh_interval;
use crate::executor::TransactionExecutor;

/// Progress callback: `(done, total, text)`. `total` is 0 when open-ended.
pub type ProgressFn<'a> = &'a (dyn Fn(u32, u32, String) + Send + Sync);

fn broadcast_frame(level: u8) -> DmxFrame {
    let mut frame = [level; DMX_FRAME_LEN];
    frame[0] = DMX_START_CODE;
    frame
}

// ---------------------------------------------------------------------------
// Flicker finder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlickerParams {
    pub duration: Duration,
    pub refresh_hz: u32,
    /// Level written to every slot.
    pub level: u8,
    /// Jitter above this marks the run degraded.
    pub jitter_threshold: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FlickerReport {
    pub frames: u32,
    pub failures: u32,
    pub max_jitter_ms: f64,
    pub avg_jitter_ms: f64,
    pub degraded: bool,
    pub cancelled: bool,
}

impl fmt::Display for FlickerReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.cancelled {
            write!(f, "Stopped after {} frames | ", self.frames)?;
        } else {
            let mark = if self.degraded { "DEGRADED" } else { "OK" };
            write!(f, "{mark}: {} frames | ", self.frames)?;
        }
        write!(
            f,
            "{} failures | Avg jitter: {:.1}ms | Max jitter: {:.1}ms",
            self.failures, self.avg_jitter_ms, self.max_jitter_ms
        )
    }
}

/// Send a constant frame at the refresh interval and measure how far each
/// tick drifts from the interval.
///
/// Sends through [`ChannelArbiter::direct`], bypassing arbitration.
pub async fn flicker_finder(
    arbiter: &ChannelArbiter,
    params: FlickerParams,
    cancel: &CancellationToken,
    progress: ProgressFn<'_>,
) -> FlickerReport {
    let frame = broadcast_frame(params.level);
    let hz = params.refresh_hz.max(1);
    let delay = refresh_interval(hz);
    let expected_ms = 1000.0 / f64::from(hz);
    let total = (params.duration.as_secs_f64() * f64::from(hz)) as u32;
    let threshold_ms = params.jitter_threshold.as_secs_f64() * 1000.0;

    let mut report = FlickerReport::default();
    let mut sum_jitter_ms = 0.0;
    let start = Instant::now();
    let mut last = start;

    while start.elapsed() < params.duration {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }
        let now = Instant::now();
        let delta_ms = (now - last).as_secs_f64() * 1000.0;
        last = now;

        let sent = arbiter.direct().await.send_frame(&frame).await;
        report.frames += 1;
        if let Err(e) = sent {
            debug!(error = %e, "flicker frame failed");
            report.failures += 1;
        }

        // The first delta measures nothing but setup.
        if report.frames > 1 {
            let jitter = (delta_ms - expected_ms).abs();
            report.max_jitter_ms = report.max_jitter_ms.max(jitter);
            sum_jitter_ms += jitter;
        }
        progress(
            report.frames,
            total,
            format!(
                "Frame {} | Fails: {} | MaxJitter: {:.1}ms",
                report.frames, report.failures, report.max_jitter_ms
            ),
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                report.cancelled = true;
                break;
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }

    if report.frames > 1 {
        report.avg_jitter_ms = sum_jitter_ms / f64::from(report.frames - 1);
    }
    report.degraded = report.failures > 0 || report.max_jitter_ms > threshold_ms;
    info!(
        frames = report.frames,
        failures = report.failures,
        max_jitter_ms = report.max_jitter_ms,
        degraded = report.degraded,
        "flicker finder finished"
    );
    report
}

// ---------------------------------------------------------------------------
// Transaction stress
// ---------------------------------------------------------------------------

/// Default number of GETs in a stress run.
pub const DEFAULT_STRESS_ITERATIONS: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RdmStressParams {
    pub target: Uid,
    pub pid: u16,
    pub iterations: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RdmStressReport {
    pub pid: u16,
    pub iterations: u32,
    /// Iterations actually run.
    pub completed: u32,
    pub ack: u32,
    pub nack: u32,
    pub timeout: u32,
    /// ACK_TIMER, checksum errors and invalid responses.
    pub other: u32,
    /// Over ACKed iterations only.
    pub min_latency_us: u64,
    pub avg_latency_us: f64,
    pub max_latency_us: u64,
    pub cancelled: bool,
}

impl RdmStressReport {
    pub fn success_percent(&self) -> f64 {
        if self.iterations == 0 {
            return 0.0;
        }
        f64::from(self.ack) / f64::from(self.iterations) * 100.0
    }
}

impl fmt::Display for RdmStressReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "PID 0x{:04X}: {}/{} iterations{}",
            self.pid,
            self.completed,
            self.iterations,
            if self.cancelled { " (stopped)" } else { "" }
        )?;
        writeln!(
            f,
            "ACK: {} ({:.1}%) | NACK: {} | TO: {} | Err: {}",
            self.ack,
            self.success_percent(),
            self.nack,
            self.timeout,
            self.other
        )?;
        write!(
            f,
            "Latency Avg: {:.0}us | Min: {}us | Max: {}us",
            self.avg_latency_us, self.min_latency_us, self.max_latency_us
        )
    }
}

/// GET one parameter repeatedly under normal arbitration.
///
/// Individual NACKs and timeouts are tallied; only an `Err` from the
/// transport ends the run early.
pub async fn rdm_stress(
    executor: &TransactionExecutor,
    params: RdmStressParams,
    cancel: &CancellationToken,
    progress: ProgressFn<'_>,
) -> Result<RdmStressReport> {
    let mut report = RdmStressReport {
        pid: params.pid,
        iterations: params.iterations,
        ..RdmStressReport::default()
    };
    let mut min_us = u64::MAX;
    let mut sum_us: u64 = 0;

    for i in 0..params.iterations {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }
        let result = executor
            .execute(CommandKind::Get, params.target, params.pid, &[])
            .await?;
        report.completed += 1;
        match result.status {
            ResponseStatus::Ack => {
                report.ack += 1;
                let us = result.latency_us();
                min_us = min_us.min(us);
                report.max_latency_us = report.max_latency_us.max(us);
                sum_us = sum_us.saturating_add(us);
            }
            ResponseStatus::Nack => report.nack += 1,
            ResponseStatus::Timeout => report.timeout += 1,
            _ => report.other += 1,
        }

        if i % 10 == 0 {
            progress(
                i + 1,
                params.iterations,
                format!(
                    "Progress: {}/{} | ACK: {} | NACK: {} | TO: {}",
                    i + 1,
                    params.iterations,
                    report.ack,
                    report.nack,
                    report.timeout
                ),
            );
            tokio::task::yield_now().await;
        }
    }

    if report.ack > 0 {
        report.min_latency_us = min_us;
        report.avg_latency_us = sum_us as f64 / f64::from(report.ack);
    }
    info!(
        pid = format_args!("0x{:04X}", params.pid),
        completed = report.completed,
        ack = report.ack,
        "transaction stress finished"
    );
    Ok(report)
}

// ---------------------------------------------------------------------------
// Throughput stress
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ThroughputReport {
    pub frames: u32,
    pub failures: u32,
    pub elapsed: Duration,
    pub cancelled: bool,
}

impl ThroughputReport {
    pub fn fps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        f64::from(self.frames) / secs
    }
}

impl fmt::Display for ThroughputReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} frames in {:.1}s ({:.0} fps) | Failures: {} | Pattern: alternating 0/255",
            if self.cancelled { "Stopped" } else { "Done" },
            self.frames,
            self.elapsed.as_secs_f64(),
            self.fps(),
            self.failures
        )
    }
}

/// Send alternating full/zero broadcast frames as fast as the transport
/// accepts them for `duration`.
pub async fn throughput(
    arbiter: &ChannelArbiter,
    duration: Duration,
    cancel: &CancellationToken,
    progress: ProgressFn<'_>,
) -> ThroughputReport {
    let full = broadcast_frame(255);
    let zero = broadcast_frame(0);
    let mut report = ThroughputReport::default();
    let start = Instant::now();

    while start.elapsed() < duration {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }
        let frame = if report.frames % 2 == 0 { &full } else { &zero };
        if arbiter.direct().await.send_frame(frame).await.is_err() {
            report.failures += 1;
        }
        report.frames += 1;

        if report.frames % 50 == 0 {
            report.elapsed = start.elapsed();
            progress(
                report.frames,
                0,
                format!(
                    "Frames: {} | {:.0} fps | Fails: {}",
                    report.frames,
                    report.fps(),
                    report.failures
                ),
            );
            tokio::task::yield_now().await;
        }
    }

    report.elapsed = start.elapsed();
    info!(
        frames = report.frames,
        failures = report.failures,
        fps = report.fps(),
        "throughput stress finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::Mutex;

    use rdmx_core::types::TransactionResult;
    use rdmx_test_harness::{MockHandle, MockTransport};

    fn arbiter() -> (Arc<ChannelArbiter>, MockHandle) {
        let mock = MockTransport::new();
        let handle = mock.handle();
        handle.set_open(true);
        (Arc::new(ChannelArbiter::new(Box::new(mock))), handle)
    }

    fn flicker(secs: u64) -> FlickerParams {
        FlickerParams {
            duration: Duration::from_secs(secs),
            refresh_hz: 25,
            level: 80,
            jitter_threshold: Duration::from_millis(10),
        }
    }

    fn no_progress(_: u32, _: u32, _: String) {}

    #[tokio::test(start_paused = true)]
    async fn flicker_clean_run() {
        let (arbiter, handle) = arbiter();
        let report = flicker_finder(&arbiter, flicker(1), &CancellationToken::new(), &no_progress).await;

        assert_eq!(report.frames, 25);
        assert_eq!(report.failures, 0);
        assert!(report.max_jitter_ms < 1.0);
        assert!(!report.degraded);
        assert!(!report.cancelled);

        let frame = handle.last_frame().unwrap();
        assert_eq!(frame[0], 0);
        assert!(frame[1..].iter().all(|&b| b == 80));
    }

    #[tokio::test(start_paused = true)]
    async fn flicker_failures_degrade() {
        let (arbiter, handle) = arbiter();
        handle.set_frame_failure(true);
        let report = flicker_finder(&arbiter, flicker(1), &CancellationToken::new(), &no_progress).await;
        assert_eq!(report.failures, report.frames);
        assert!(report.degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn flicker_slow_sends_degrade() {
        let (arbiter, handle) = arbiter();
        handle.set_frame_delay(Duration::from_millis(15));
        let report = flicker_finder(&arbiter, flicker(1), &CancellationToken::new(), &no_progress).await;
        assert_eq!(report.failures, 0);
        assert!(report.max_jitter_ms > 10.0);
        assert!(report.degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn flicker_cancelled() {
        let (arbiter, _handle) = arbiter();
        let cancel = CancellationToken::new();
        let stop = cancel.clone();
        let progress = move |done: u32, _: u32, _: String| {
            if done == 3 {
                stop.cancel();
            }
        };
        let report = flicker_finder(&arbiter, flicker(10), &cancel, &progress).await;
        assert!(report.cancelled);
        assert_eq!(report.frames, 3);
    }

    #[tokio::test]
    async fn rdm_stress_tallies() {
        let (arbiter, handle) = arbiter();
        let executor = TransactionExecutor::new(arbiter);
        let pid = 0x0060;
        for us in [500, 900, 700] {
            handle.respond(
                CommandKind::Get,
                pid,
                TransactionResult::ack(&[0x01], Duration::from_micros(us)),
            );
        }
        handle.respond(CommandKind::Get, pid, TransactionResult::nack(0, Duration::ZERO));
        // Remaining iterations fall through to the default timeout.

        let params = RdmStressParams {
            target: Uid::from_parts(0x4845, 1),
            pid,
            iterations: 6,
        };
        let report = rdm_stress(&executor, params, &CancellationToken::new(), &no_progress)
            .await
            .unwrap();

        assert_eq!(report.completed, 6);
        assert_eq!(report.ack, 3);
        assert_eq!(report.nack, 1);
        assert_eq!(report.timeout, 2);
        assert_eq!(report.min_latency_us, 500);
        assert_eq!(report.max_latency_us, 900);
        assert!((report.avg_latency_us - 700.0).abs() < f64::EPSILON);
        assert!((report.success_percent() - 50.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn rdm_stress_progress_every_ten() {
        let (arbiter, _handle) = arbiter();
        let executor = TransactionExecutor::new(arbiter);
        let calls = Mutex::new(Vec::new());
        let progress = |done: u32, total: u32, _: String| calls.lock().unwrap().push((done, total));
        let params = RdmStressParams {
            target: Uid::BROADCAST,
            pid: 0x0082,
            iterations: 25,
        };
        rdm_stress(&executor, params, &CancellationToken::new(), &progress)
            .await
            .unwrap();
        assert_eq!(*calls.lock().unwrap(), vec![(1, 25), (11, 25), (21, 25)]);
    }

    #[tokio::test]
    async fn rdm_stress_stops_on_connection_loss() {
        let (arbiter, handle) = arbiter();
        let executor = TransactionExecutor::new(arbiter);
        handle.set_transact_error(Some("adapter gone"));
        let params = RdmStressParams {
            target: Uid::BROADCAST,
            pid: 0x0082,
            iterations: 10,
        };
        let result = rdm_stress(&executor, params, &CancellationToken::new(), &no_progress).await;
        assert!(result.is_err());
        assert_eq!(handle.requests().len(), 1);
    }

    #[tokio::test]
    async fn rdm_stress_no_acks_reports_zero_latency() {
        let (arbiter, _handle) = arbiter();
        let executor = TransactionExecutor::new(arbiter);
        let params = RdmStressParams {
            target: Uid::BROADCAST,
            pid: 0x0082,
            iterations: 3,
        };
        let report = rdm_stress(&executor, params, &CancellationToken::new(), &no_progress)
            .await
            .unwrap();
        assert_eq!(report.timeout, 3);
        assert_eq!(report.min_latency_us, 0);
        assert_eq!(report.avg_latency_us, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn throughput_alternates_frames() {
        let (arbiter, handle) = arbiter();
        handle.set_frame_delay(Duration::from_millis(1));
        let report = throughput(
            &arbiter,
            Duration::from_millis(200),
            &CancellationToken::new(),
            &no_progress,
        )
        .await;

        assert!(report.frames >= 190 && report.frames <= 200, "{}", report.frames);
        assert_eq!(report.failures, 0);
        assert!(report.fps() > 900.0);

        let frames = handle.frames();
        assert!(frames[0][1..].iter().all(|&b| b == 255));
        assert!(frames[1][1..].iter().all(|&b| b == 0));
        assert_eq!(frames[1][0], 0);
    }

    #[tokio::test(start_paused = true)]
    async fn throughput_honours_cancel() {
        let (arbiter, handle) = arbiter();
        handle.set_frame_delay(Duration::from_millis(1));
        let cancel = CancellationToken::new();
        let stop = cancel.clone();
        let progress = move |done: u32, _: u32, _: String| {
            if done >= 100 {
                stop.cancel();
            }
        };
        let report = throughput(&arbiter, Duration::from_secs(60), &cancel, &progress).await;
        assert!(report.cancelled);
        assert_eq!(report.frames, 100);
    }
}
