// Sliding windows: bounded FIFO history per tracked key, averaged once full.
// Owned exclusively by one kind collector; nothing here is shared across tasks.

use std::collections::{BTreeMap, VecDeque};

use crate::models::{CpuUsage, DiskStat, FilesystemStat, Fragment, LoadAverage};

/// Rounds half-up to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0 + 0.5).floor() / 100.0
}

fn field_mean<T>(samples: &VecDeque<T>, field: impl Fn(&T) -> f64) -> f64 {
    let sum: f64 = samples.iter().map(field).sum();
    round2(sum / samples.len() as f64)
}

/// A sample type whose per-field arithmetic mean is itself a sample.
pub trait Averaged: Clone {
    /// `samples` is never empty.
    fn mean(samples: &VecDeque<Self>) -> Self;
}

/// A sample that belongs to one sub-entity (device, mount point).
pub trait Keyed {
    fn key(&self) -> &str;
}

impl Averaged for LoadAverage {
    fn mean(samples: &VecDeque<Self>) -> Self {
        LoadAverage {
            one: field_mean(samples, |s| s.one),
            five: field_mean(samples, |s| s.five),
            fifteen: field_mean(samples, |s| s.fifteen),
        }
    }
}

impl Averaged for CpuUsage {
    fn mean(samples: &VecDeque<Self>) -> Self {
        CpuUsage {
            user: field_mean(samples, |s| s.user),
            system: field_mean(samples, |s| s.system),
            idle: field_mean(samples, |s| s.idle),
        }
    }
}

impl Averaged for DiskStat {
    fn mean(samples: &VecDeque<Self>) -> Self {
        DiskStat {
            device: newest(samples).device.clone(),
            tps: field_mean(samples, |s| s.tps),
            kb_total: field_mean(samples, |s| s.kb_total),
        }
    }
}

impl Averaged for FilesystemStat {
    fn mean(samples: &VecDeque<Self>) -> Self {
        let latest = newest(samples);
        FilesystemStat {
            filesystem: latest.filesystem.clone(),
            mountpoint: latest.mountpoint.clone(),
            used_mb: field_mean(samples, |s| s.used_mb),
            used_percent: field_mean(samples, |s| s.used_percent),
            inodes_used: field_mean(samples, |s| s.inodes_used),
            inodes_percent: field_mean(samples, |s| s.inodes_percent),
        }
    }
}

fn newest<T>(samples: &VecDeque<T>) -> &T {
    // Callers only average non-empty windows.
    &samples[samples.len() - 1]
}

impl Keyed for DiskStat {
    fn key(&self) -> &str {
        &self.device
    }
}

impl Keyed for FilesystemStat {
    fn key(&self) -> &str {
        &self.mountpoint
    }
}

/// Bounded FIFO of the most recent `max_history` samples.
#[derive(Debug, Clone)]
pub struct SlidingWindow<T> {
    samples: VecDeque<T>,
    max_history: usize,
}

impl<T> SlidingWindow<T> {
    /// A capacity of zero is raised to one.
    pub fn new(max_history: usize) -> Self {
        let max_history = max_history.max(1);
        Self {
            samples: VecDeque::with_capacity(max_history),
            max_history,
        }
    }

    /// Appends at the tail, evicting the oldest sample when full.
    pub fn push(&mut self, sample: T) {
        if self.samples.len() == self.max_history {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn ready(&self) -> bool {
        self.samples.len() == self.max_history
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.samples.iter()
    }
}

impl<T: Averaged> SlidingWindow<T> {
    /// Per-field mean of the window; `None` until the window is full.
    pub fn mean(&self) -> Option<T> {
        self.ready().then(|| T::mean(&self.samples))
    }
}

/// How a kind collector stores its history: one window, or one window per key.
pub trait WindowSet: Send + 'static {
    /// What one successful probe yields.
    type Sample: Send + 'static;
    /// What the set averages to once ready.
    type Output: Into<Fragment> + Send + 'static;

    fn with_max_history(max_history: usize) -> Self;
    fn push(&mut self, sample: Self::Sample);
    fn ready(&self) -> bool;
    fn mean(&self) -> Option<Self::Output>;
}

/// Strategy for scalar kinds (load average, CPU).
#[derive(Debug, Clone)]
pub struct SingleWindow<T>(SlidingWindow<T>);

impl<T> SingleWindow<T> {
    pub fn window(&self) -> &SlidingWindow<T> {
        &self.0
    }
}

impl<T> WindowSet for SingleWindow<T>
where
    T: Averaged + Into<Fragment> + Send + 'static,
{
    type Sample = T;
    type Output = T;

    fn with_max_history(max_history: usize) -> Self {
        SingleWindow(SlidingWindow::new(max_history))
    }

    fn push(&mut self, sample: T) {
        self.0.push(sample);
    }

    fn ready(&self) -> bool {
        self.0.ready()
    }

    fn mean(&self) -> Option<T> {
        self.0.mean()
    }
}

#[derive(Debug, Clone)]
struct KeyedEntry<T> {
    window: SlidingWindow<T>,
    /// Consecutive successful probes that did not report this key.
    missed: usize,
}

/// Strategy for keyed kinds (disk, filesystem). Windows are created lazily the
/// first time a key is seen and iterate in key order.
///
/// A key missing from `max_history` consecutive probes is dropped: by then
/// every sample it holds predates the averaging horizon.
#[derive(Debug, Clone)]
pub struct KeyedWindows<T> {
    windows: BTreeMap<String, KeyedEntry<T>>,
    max_history: usize,
}

impl<T> KeyedWindows<T> {
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.windows.keys().map(String::as_str)
    }

    pub fn window(&self, key: &str) -> Option<&SlidingWindow<T>> {
        self.windows.get(key).map(|e| &e.window)
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

impl<T> WindowSet for KeyedWindows<T>
where
    T: Averaged + Keyed + Send + 'static,
    Vec<T>: Into<Fragment>,
{
    type Sample = Vec<T>;
    type Output = Vec<T>;

    fn with_max_history(max_history: usize) -> Self {
        Self {
            windows: BTreeMap::new(),
            max_history: max_history.max(1),
        }
    }

    fn push(&mut self, samples: Vec<T>) {
        // One sample per key per probe; a repeated key keeps its last row.
        let mut latest: BTreeMap<String, T> = BTreeMap::new();
        for sample in samples {
            latest.insert(sample.key().to_string(), sample);
        }

        let max_history = self.max_history;
        self.windows.retain(|key, entry| {
            if latest.contains_key(key) {
                return true;
            }
            entry.missed += 1;
            if entry.missed >= max_history {
                tracing::debug!(key = %key, missed = entry.missed, "dropping stale window");
                return false;
            }
            true
        });

        for (key, sample) in latest {
            let entry = self.windows.entry(key).or_insert_with(|| KeyedEntry {
                window: SlidingWindow::new(max_history),
                missed: 0,
            });
            entry.missed = 0;
            entry.window.push(sample);
        }
    }

    fn ready(&self) -> bool {
        !self.windows.is_empty() && self.windows.values().all(|e| e.window.ready())
    }

    fn mean(&self) -> Option<Vec<T>> {
        if !self.ready() {
            return None;
        }
        self.windows.values().map(|e| e.window.mean()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpu(user: f64, system: f64, idle: f64) -> CpuUsage {
        CpuUsage { user, system, idle }
    }

    fn disk(device: &str, tps: f64, kb_total: f64) -> DiskStat {
        DiskStat {
            device: device.into(),
            tps,
            kb_total,
        }
    }

    #[test]
    fn round2_is_half_up() {
        assert_eq!(round2(1.005_000_1), 1.01);
        assert_eq!(round2(2.344), 2.34);
        assert_eq!(round2(2.345_000_1), 2.35);
        assert_eq!(round2(10.0), 10.0);
        assert_eq!(round2(0.0), 0.0);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let mut w: SlidingWindow<CpuUsage> = SlidingWindow::new(0);
        assert_eq!(w.max_history(), 1);
        assert!(!w.ready());
        w.push(cpu(1.0, 2.0, 97.0));
        assert!(w.ready());
        assert_eq!(w.mean(), Some(cpu(1.0, 2.0, 97.0)));
    }

    #[test]
    fn mean_is_none_until_full() {
        let mut w = SlidingWindow::new(3);
        w.push(cpu(5.0, 10.0, 85.0));
        w.push(cpu(10.0, 20.0, 70.0));
        assert!(!w.ready());
        assert_eq!(w.mean(), None);
        w.push(cpu(15.0, 30.0, 55.0));
        assert!(w.ready());
        assert_eq!(w.mean(), Some(cpu(10.0, 20.0, 70.0)));
    }

    #[test]
    fn push_into_full_window_evicts_oldest() {
        let mut w = SlidingWindow::new(3);
        for s in [
            cpu(5.0, 10.0, 85.0),
            cpu(10.0, 20.0, 70.0),
            cpu(15.0, 30.0, 55.0),
            cpu(20.0, 40.0, 40.0),
        ] {
            w.push(s);
        }
        assert_eq!(w.len(), 3);
        assert_eq!(w.iter().next(), Some(&cpu(10.0, 20.0, 70.0)));
        assert_eq!(w.mean(), Some(cpu(15.0, 30.0, 55.0)));
    }

    #[test]
    fn constant_input_averages_to_the_constant() {
        let sample = LoadAverage {
            one: 0.37,
            five: 1.21,
            fifteen: 2.99,
        };
        let mut w = SlidingWindow::new(4);
        for _ in 0..9 {
            w.push(sample);
            if w.ready() {
                assert_eq!(w.mean(), Some(sample));
            }
        }
    }

    #[test]
    fn mean_rounds_each_field() {
        let mut w = SlidingWindow::new(3);
        w.push(cpu(1.0, 0.0, 0.0));
        w.push(cpu(1.0, 0.0, 0.0));
        w.push(cpu(2.0, 1.0, 0.5));
        let m = w.mean().unwrap();
        assert_eq!(m.user, 1.33);
        assert_eq!(m.system, 0.33);
        assert_eq!(m.idle, 0.17);
    }

    #[test]
    fn keyed_windows_need_every_key_ready() {
        let mut set: KeyedWindows<DiskStat> = KeyedWindows::with_max_history(2);
        set.push(vec![disk("sda", 10.0, 60.0)]);
        assert!(!set.ready());
        set.push(vec![disk("sda", 20.0, 120.0)]);
        assert!(set.ready());
        assert_eq!(set.mean(), Some(vec![disk("sda", 15.0, 90.0)]));

        // A new device resets collective readiness.
        set.push(vec![disk("sda", 30.0, 180.0), disk("sdb", 1.0, 1.0)]);
        assert!(!set.ready());
        assert_eq!(set.mean(), None);

        set.push(vec![disk("sda", 40.0, 240.0), disk("sdb", 3.0, 3.0)]);
        assert!(set.ready());
        assert_eq!(
            set.mean(),
            Some(vec![disk("sda", 35.0, 210.0), disk("sdb", 2.0, 2.0)])
        );
    }

    #[test]
    fn keyed_windows_are_not_ready_without_keys() {
        let mut set: KeyedWindows<DiskStat> = KeyedWindows::with_max_history(1);
        assert!(!set.ready());
        set.push(vec![]);
        assert!(!set.ready());
        assert_eq!(set.mean(), None);
    }

    #[test]
    fn keyed_windows_keep_last_row_for_repeated_key() {
        let mut set: KeyedWindows<DiskStat> = KeyedWindows::with_max_history(3);
        set.push(vec![disk("sda", 1.0, 1.0), disk("sda", 2.0, 2.0)]);
        assert_eq!(set.window("sda").map(SlidingWindow::len), Some(1));
        assert_eq!(set.window("sda").and_then(|w| w.iter().next()).map(|s| s.tps), Some(2.0));
    }

    #[test]
    fn vanished_key_keeps_history_until_it_expires() {
        let mut set: KeyedWindows<DiskStat> = KeyedWindows::with_max_history(3);
        for i in 0..3 {
            let v = f64::from(i);
            set.push(vec![disk("sda", v, v), disk("sdb", 5.0, 5.0)]);
        }
        assert!(set.ready());

        // sdb disappears: it still reports its stale mean for two more probes.
        set.push(vec![disk("sda", 3.0, 3.0)]);
        set.push(vec![disk("sda", 4.0, 4.0)]);
        assert_eq!(set.len(), 2);
        let mean = set.mean().unwrap();
        assert_eq!(mean[1], disk("sdb", 5.0, 5.0));

        // Third consecutive miss drops it.
        set.push(vec![disk("sda", 5.0, 5.0)]);
        assert_eq!(set.keys().collect::<Vec<_>>(), vec!["sda"]);
        assert_eq!(set.mean(), Some(vec![disk("sda", 4.0, 4.0)]));
    }

    #[test]
    fn flapping_key_stall_is_bounded() {
        let mut set: KeyedWindows<DiskStat> = KeyedWindows::with_max_history(2);
        set.push(vec![disk("sda", 1.0, 1.0)]);
        set.push(vec![disk("sda", 1.0, 1.0), disk("usb0", 9.0, 9.0)]);
        assert!(!set.ready());
        set.push(vec![disk("sda", 1.0, 1.0)]);
        assert!(!set.ready());
        set.push(vec![disk("sda", 1.0, 1.0)]);
        assert!(set.ready());
        assert_eq!(set.mean(), Some(vec![disk("sda", 1.0, 1.0)]));
    }

    #[test]
    fn filesystem_mean_keeps_latest_identity() {
        let fs = |name: &str, used: f64| FilesystemStat {
            filesystem: name.into(),
            mountpoint: "/".into(),
            used_mb: used,
            used_percent: 40.0,
            inodes_used: 1000.0,
            inodes_percent: 1.0,
        };
        let mut set: KeyedWindows<FilesystemStat> = KeyedWindows::with_max_history(2);
        set.push(vec![fs("/dev/sda1", 100.0)]);
        set.push(vec![fs("/dev/mapper/root", 200.0)]);
        let mean = set.mean().unwrap();
        assert_eq!(mean.len(), 1);
        assert_eq!(mean[0].filesystem, "/dev/mapper/root");
        assert_eq!(mean[0].used_mb, 150.0);
    }
}
