//! Animated output effects.
//!
//! Effects drive the fixture channel table through a [`ChannelSink`] until
//! their cancellation token fires. Whatever way an effect ends, its last
//! act is to zero every channel.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::emitter::refresh_interval;

/// Where an effect writes channel levels and status text.
#[async_trait]
pub trait ChannelSink: Send + Sync {
    /// The 1-based channel indices currently configured.
    async fn channel_indices(&self) -> Vec<u16>;

    /// Set every channel to `level`.
    async fn fill(&self, level: u8);

    /// Set channel `index` to `level` and every other channel to zero.
    async fn solo(&self, index: u16, level: u8);

    /// Publish a one-line status.
    async fn status(&self, text: String);
}

/// Triangle fade parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeParams {
    pub from: u8,
    pub to: u8,
    /// Time for one half of the triangle.
    pub duration: Duration,
    pub refresh_hz: u32,
}

impl FadeParams {
    /// Number of intervals per half: `max(1, trunc(duration * refresh_hz))`.
    pub fn steps(&self) -> u32 {
        let steps = (self.duration.as_secs_f64() * f64::from(self.refresh_hz)) as u32;
        steps.max(1)
    }

    /// Time between steps.
    pub fn step_delay(&self) -> Duration {
        refresh_interval(self.refresh_hz)
    }
}

/// Chase parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChaseParams {
    /// Time each channel stays lit. Clamped to at least [`MIN_CHASE_DWELL`].
    pub dwell: Duration,
}

/// Shortest chase dwell.
pub const MIN_CHASE_DWELL: Duration = Duration::from_millis(50);

impl ChaseParams {
    pub fn effective_dwell(&self) -> Duration {
        self.dwell.max(MIN_CHASE_DWELL)
    }
}

/// Level at step `s` of `steps` going from `from` to `to`, truncated.
pub fn fade_level(from: u8, to: u8, s: u32, steps: u32) -> u8 {
    let t = s as f32 / steps.max(1) as f32;
    let level = f32::from(from) + (f32::from(to) - f32::from(from)) * t;
    level as u8
}

/// Sleep for `delay` unless cancelled first. Returns `false` on cancel.
async fn pause(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

/// Run one half of the triangle. Returns `false` if cancelled.
async fn fade_half<S>(
    sink: &S,
    from: u8,
    to: u8,
    steps: u32,
    delay: Duration,
    arrow: char,
    cancel: &CancellationToken,
) -> bool
where
    S: ChannelSink + ?Sized,
{
    for s in 0..=steps {
        if cancel.is_cancelled() {
            return false;
        }
        let level = fade_level(from, to, s, steps);
        sink.fill(level).await;
        sink.status(format!("Fade {arrow} {level}")).await;
        if !pause(delay, cancel).await {
            return false;
        }
    }
    true
}

/// Fade all channels up and down between two levels until cancelled.
pub async fn run_fade<S>(sink: &S, params: FadeParams, cancel: CancellationToken)
where
    S: ChannelSink + ?Sized,
{
    let steps = params.steps();
    let delay = params.step_delay();
    debug!(from = params.from, to = params.to, steps, ?delay, "fade started");
    sink.status("Auto-Fade running...".to_string()).await;

    loop {
        if !fade_half(sink, params.from, params.to, steps, delay, '\u{25B2}', &cancel).await {
            break;
        }
        if !fade_half(sink, params.to, params.from, steps, delay, '\u{25BC}', &cancel).await {
            break;
        }
    }

    sink.fill(0).await;
    sink.status("Fade stopped".to_string()).await;
    debug!("fade stopped");
}

/// Light one channel at a time, in index order, until cancelled.
pub async fn run_chase<S>(sink: &S, params: ChaseParams, cancel: CancellationToken)
where
    S: ChannelSink + ?Sized,
{
    if sink.channel_indices().await.is_empty() {
        return;
    }
    let dwell = params.effective_dwell();
    debug!(?dwell, "chase started");
    sink.status("Chase running...".to_string()).await;

    'outer: loop {
        let indices = sink.channel_indices().await;
        if indices.is_empty() {
            break;
        }
        for index in indices {
            if cancel.is_cancelled() {
                break 'outer;
            }
            sink.solo(index, 255).await;
            sink.status(format!("Chase: Ch {index}")).await;
            if !pause(dwell, &cancel).await {
                break 'outer;
            }
        }
    }

    sink.fill(0).await;
    sink.status("Chase stopped".to_string()).await;
    debug!("chase stopped");
}
