// Kind collector: drives one metric kind end-to-end on its own timer.
// Probe -> window set -> averaged fragment once every window is full.

use tokio::sync::mpsc;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use crate::models::{Fragment, MetricKind};
use crate::probe::MetricSource;
use crate::window::WindowSet;

pub struct KindCollector<S, W> {
    kind: MetricKind,
    source: S,
    windows: W,
}

impl<S, W> KindCollector<S, W>
where
    S: MetricSource,
    W: WindowSet<Sample = S::Sample>,
{
    pub fn new(source: S, max_history: usize) -> Self {
        Self {
            kind: source.kind(),
            source,
            windows: W::with_max_history(max_history),
        }
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn windows(&self) -> &W {
        &self.windows
    }

    /// One tick: probe, record, and average if every window is full.
    ///
    /// A failed probe is logged and the tick is skipped: nothing is recorded and
    /// nothing is emitted. The next tick is the retry.
    pub async fn collect_once(&mut self) -> Option<Fragment> {
        let sample = match self.source.probe().await {
            Ok(sample) => sample,
            Err(e) => {
                tracing::warn!(
                    kind = %self.kind,
                    error = %e,
                    operation = "probe",
                    "metric probe failed; skipping tick"
                );
                return None;
            }
        };
        self.windows.push(sample);
        match self.windows.mean() {
            Some(mean) => Some(mean.into()),
            None => {
                tracing::trace!(kind = %self.kind, "window warming up");
                None
            }
        }
    }

    /// Runs until `cancel` fires or the combiner drops its receiver.
    /// Blocks on `tx` while the combiner is not ready for the next fragment.
    pub async fn run(
        mut self,
        period: Duration,
        tx: mpsc::Sender<Fragment>,
        cancel: CancellationToken,
    ) {
        let mut tick = interval(period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tick.tick() => {
                    let fragment = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        fragment = self.collect_once() => fragment,
                    };
                    let Some(fragment) = fragment else {
                        continue;
                    };
                    tracing::debug!(kind = %self.kind, "fragment ready");
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        sent = tx.send(fragment) => {
                            if sent.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        }
        tracing::debug!(kind = %self.kind, "Collector shutting down");
    }
}
