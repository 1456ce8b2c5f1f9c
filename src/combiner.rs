// Fan-in: one fragment from every enabled kind per cycle -> one snapshot -> sink.

use tokio::sync::mpsc;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use crate::models::{Fragment, MetricKind, Snapshot};
use crate::pipeline::{PipelineError, SnapshotSink};

struct Lane {
    kind: MetricKind,
    rx: mpsc::Receiver<Fragment>,
}

/// Rendezvous point for the kind collectors of one session.
///
/// Each cycle waits on every lane in kind order with no timeout, so a kind that
/// is warming up or skipped a probe holds back the whole snapshot.
pub struct Combiner {
    lanes: Vec<Lane>,
    period: Duration,
}

impl Combiner {
    pub fn new(lanes: Vec<(MetricKind, mpsc::Receiver<Fragment>)>, period: Duration) -> Self {
        let mut lanes: Vec<Lane> = lanes
            .into_iter()
            .map(|(kind, rx)| Lane { kind, rx })
            .collect();
        lanes.sort_by_key(|l| l.kind);
        Self { lanes, period }
    }

    pub fn kinds(&self) -> Vec<MetricKind> {
        self.lanes.iter().map(|l| l.kind).collect()
    }

    /// Waits for one fragment per lane and assembles them.
    /// Returns `Ok(None)` on cancellation; nothing partial is returned.
    pub async fn next_snapshot(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<Snapshot>, PipelineError> {
        let mut fragments = Vec::with_capacity(self.lanes.len());
        for lane in &mut self.lanes {
            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(None),
                received = lane.rx.recv() => received,
            };
            match received {
                Some(fragment) => fragments.push(fragment),
                None if cancel.is_cancelled() => return Ok(None),
                None => return Err(PipelineError::LaneClosed(lane.kind)),
            }
        }

        let mut snapshot = Snapshot::new(now_millis());
        for fragment in fragments {
            snapshot.merge(fragment);
        }
        Ok(Some(snapshot))
    }

    /// Emits snapshots in cycle order until cancelled or the sink fails.
    /// Returns the number of snapshots delivered.
    pub async fn run<K: SnapshotSink>(
        mut self,
        sink: &mut K,
        cancel: &CancellationToken,
    ) -> Result<u64, PipelineError> {
        let mut tick = interval(self.period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut sent: u64 = 0;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tick.tick() => {}
            }
            let Some(snapshot) = self.next_snapshot(cancel).await? else {
                break;
            };
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                delivered = sink.send(snapshot) => delivered?,
            }
            sent += 1;
            tracing::debug!(snapshots_sent = sent, "snapshot delivered");
        }
        Ok(sent)
    }
}

fn now_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_else(|e| {
        tracing::warn!(error = %e, operation = "get_timestamp", "system time error");
        0
    })
}
