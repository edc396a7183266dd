//! Rolling CPU history keyed by pid.
//!
//! This is the only mutable state shared between scans. Each pid owns one
//! `SampleWindow` inside a `DashMap`; appending and averaging happen under
//! that entry's shard lock, so concurrent scans never observe a torn window.
//! Entries for pids that disappear are not purged.

mod window;

pub use window::{SampleWindow, DEFAULT_WINDOW};

use dashmap::DashMap;
use serde::Serialize;

/// Statistics about the history map.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryStats {
    pub window_size: usize,
    pub tracked_pids: usize,
    pub total_samples: usize,
}

/// Per-pid rolling CPU samples.
#[derive(Debug)]
pub struct CpuHistory {
    windows: DashMap<u32, SampleWindow>,
    window_size: usize,
}

impl Default for CpuHistory {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl CpuHistory {
    pub fn new(window_size: usize) -> Self {
        Self {
            windows: DashMap::new(),
            window_size: window_size.max(1),
        }
    }

    /// Appends a sample for `pid` and returns the new rolling average.
    ///
    /// If the pid doesn't have a window yet, one is created.
    pub fn record(&self, pid: u32, sample: f64) -> f64 {
        let mut window = self
            .windows
            .entry(pid)
            .or_insert_with(|| SampleWindow::new(self.window_size));
        window.push(sample);
        window.average().unwrap_or(sample)
    }

    /// Rolling average for `pid`, if any samples were recorded.
    pub fn average(&self, pid: u32) -> Option<f64> {
        self.windows.get(&pid).and_then(|w| w.average())
    }

    pub fn latest(&self, pid: u32) -> Option<f64> {
        self.windows.get(&pid).and_then(|w| w.latest())
    }

    /// Retained samples for `pid`, oldest first.
    pub fn samples(&self, pid: u32) -> Option<Vec<f64>> {
        self.windows.get(&pid).map(|w| w.samples())
    }

    pub fn tracked_pids(&self) -> usize {
        self.windows.len()
    }

    pub fn stats(&self) -> HistoryStats {
        HistoryStats {
            window_size: self.window_size,
            tracked_pids: self.windows.len(),
            total_samples: self.windows.iter().map(|e| e.value().len()).sum(),
        }
    }
}
