// Per-session pipeline: kind collectors on their own timers, fanned into one combiner,
// torn down as a unit on cancellation or sink failure.

use std::future::Future;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::collector::KindCollector;
use crate::combiner::Combiner;
use crate::models::{Fragment, MetricKind, Snapshot};
use crate::probe::MetricSource;
use crate::window::{Averaged, Keyed, KeyedWindows, SingleWindow, WindowSet};

pub const DEFAULT_INTERVAL_SECS: i64 = 5;
pub const DEFAULT_DURATION_SECS: i64 = 15;

/// Fragments buffered per kind between a collector and the combiner.
const FRAGMENT_CHANNEL_CAPACITY: usize = 1;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("subscriber closed the stream")]
    Closed,
    #[error("send timed out after {0:?}")]
    Timeout(Duration),
    #[error("encoding snapshot: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("transport: {0}")]
    Transport(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error("{0} collector stopped unexpectedly")]
    LaneClosed(MetricKind),
}

/// Where snapshots go. Implemented by the WebSocket transport; a send error ends the session.
pub trait SnapshotSink: Send {
    fn send(&mut self, snapshot: Snapshot) -> impl Future<Output = Result<(), SinkError>> + Send;
}

impl SnapshotSink for mpsc::Sender<Snapshot> {
    async fn send(&mut self, snapshot: Snapshot) -> Result<(), SinkError> {
        mpsc::Sender::send(self, snapshot)
            .await
            .map_err(|_| SinkError::Closed)
    }
}

/// Session parameters after default substitution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParams {
    pub interval: Duration,
    pub duration: Duration,
    /// Samples per window: floor(duration / interval), at least 1.
    pub max_history: usize,
}

impl StreamParams {
    /// Non-positive values fall back to 5 s / 15 s.
    pub fn new(interval_secs: i64, duration_secs: i64) -> Self {
        let interval_secs = if interval_secs <= 0 {
            DEFAULT_INTERVAL_SECS
        } else {
            interval_secs
        };
        let duration_secs = if duration_secs <= 0 {
            DEFAULT_DURATION_SECS
        } else {
            duration_secs
        };
        let max_history = usize::try_from(duration_secs / interval_secs)
            .unwrap_or(1)
            .max(1);
        Self {
            interval: Duration::from_secs(interval_secs.unsigned_abs()),
            duration: Duration::from_secs(duration_secs.unsigned_abs()),
            max_history,
        }
    }
}

impl Default for StreamParams {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL_SECS, DEFAULT_DURATION_SECS)
    }
}

/// Collectors and lanes for one streaming session. Collectors start as they are
/// registered; dropping the pipeline without running it aborts them.
pub struct Pipeline {
    params: StreamParams,
    cancel: CancellationToken,
    tasks: JoinSet<()>,
    lanes: Vec<(MetricKind, mpsc::Receiver<Fragment>)>,
}

impl Pipeline {
    pub fn new(params: StreamParams, cancel: CancellationToken) -> Self {
        Self {
            params,
            cancel,
            tasks: JoinSet::new(),
            lanes: Vec::new(),
        }
    }

    pub fn kinds(&self) -> Vec<MetricKind> {
        let mut kinds: Vec<MetricKind> = self.lanes.iter().map(|(k, _)| *k).collect();
        kinds.sort();
        kinds
    }

    /// Registers a collector that keeps one window (load average, CPU).
    pub fn spawn_scalar<S>(&mut self, source: S)
    where
        S: MetricSource,
        S::Sample: Averaged + Into<Fragment>,
    {
        self.spawn_collector::<S, SingleWindow<S::Sample>>(source);
    }

    /// Registers a collector that keeps one window per device or mount point.
    pub fn spawn_keyed<S, T>(&mut self, source: S)
    where
        S: MetricSource<Sample = Vec<T>>,
        T: Averaged + Keyed + Send + 'static,
        Vec<T>: Into<Fragment>,
    {
        self.spawn_collector::<S, KeyedWindows<T>>(source);
    }

    /// Registers a collector with an explicit window-set strategy. A second
    /// collector for an already registered kind is ignored.
    pub fn spawn_collector<S, W>(&mut self, source: S)
    where
        S: MetricSource,
        W: WindowSet<Sample = S::Sample>,
    {
        let kind = source.kind();
        if self.lanes.iter().any(|(k, _)| *k == kind) {
            tracing::warn!(kind = %kind, "collector already registered; ignoring");
            return;
        }
        let (tx, rx) = mpsc::channel(FRAGMENT_CHANNEL_CAPACITY);
        let collector = KindCollector::<S, W>::new(source, self.params.max_history);
        let span = tracing::debug_span!("collector", kind = %kind);
        self.tasks.spawn(
            collector
                .run(self.params.interval, tx, self.cancel.clone())
                .instrument(span),
        );
        self.lanes.push((kind, rx));
    }

    /// Runs the combiner until cancellation or sink failure, then stops and joins
    /// every collector. Returns the number of snapshots delivered.
    pub async fn run<K: SnapshotSink>(mut self, sink: &mut K) -> Result<u64, PipelineError> {
        let lanes = std::mem::take(&mut self.lanes);
        let combiner = Combiner::new(lanes, self.params.interval);
        tracing::debug!(
            kinds = ?combiner.kinds(),
            max_history = self.params.max_history,
            "pipeline started"
        );

        let result = combiner.run(sink, &self.cancel).await;
        self.cancel.cancel();

        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined
                && e.is_panic()
            {
                tracing::error!(error = %e, "collector task panicked");
            }
        }
        result
    }
}
