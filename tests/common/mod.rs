// Shared test helpers: scripted metric sources and sinks

#![allow(dead_code)]

use hostpulse::models::{CpuUsage, DiskStat, LoadAverage, MetricKind, Snapshot};
use hostpulse::pipeline::{SinkError, SnapshotSink};
use hostpulse::probe::{MetricSource, ProbeError};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Replays a fixed script of probe results; `None` entries are probe failures.
/// Once exhausted it repeats the last entry.
pub struct ScriptedSource<T> {
    kind: MetricKind,
    script: Vec<Option<T>>,
    calls: Arc<AtomicUsize>,
}

impl<T: Clone + Send + 'static> ScriptedSource<T> {
    pub fn new(kind: MetricKind, script: Vec<Option<T>>) -> Self {
        assert!(!script.is_empty(), "script must not be empty");
        Self {
            kind,
            script,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn constant(kind: MetricKind, value: T) -> Self {
        Self::new(kind, vec![Some(value)])
    }

    /// Shared probe counter, readable after the source moves into a collector.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl<T: Clone + Send + Sync + 'static> MetricSource for ScriptedSource<T> {
    type Sample = T;

    fn kind(&self) -> MetricKind {
        self.kind
    }

    async fn probe(&mut self) -> Result<T, ProbeError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let entry = &self.script[n.min(self.script.len() - 1)];
        entry.clone().ok_or_else(|| ProbeError::Malformed {
            what: "scripted",
            detail: format!("failure at probe {}", n + 1),
        })
    }
}

pub fn cpu(user: f64, system: f64, idle: f64) -> CpuUsage {
    CpuUsage { user, system, idle }
}

pub fn load(one: f64, five: f64, fifteen: f64) -> LoadAverage {
    LoadAverage { one, five, fifteen }
}

pub fn disk(device: &str, tps: f64, kb_total: f64) -> DiskStat {
    DiskStat {
        device: device.into(),
        tps,
        kb_total,
    }
}

/// Accepts `limit` snapshots, then fails every send.
pub struct FailingSink {
    pub delivered: Vec<Snapshot>,
    limit: usize,
}

impl FailingSink {
    pub fn after(limit: usize) -> Self {
        Self {
            delivered: Vec::new(),
            limit,
        }
    }
}

impl SnapshotSink for FailingSink {
    async fn send(&mut self, snapshot: Snapshot) -> Result<(), SinkError> {
        if self.delivered.len() >= self.limit {
            return Err(SinkError::Transport("connection reset".into()));
        }
        self.delivered.push(snapshot);
        Ok(())
    }
}
