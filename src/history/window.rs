//! Fixed-size sample window.
//!
//! A circular buffer of CPU samples with predictable memory usage. Once the
//! window is full, the oldest sample is overwritten.

/// Default number of samples kept per pid.
pub const DEFAULT_WINDOW: usize = 10;

/// A circular buffer of `f64` samples with fixed capacity.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    samples: Vec<f64>,
    capacity: usize,
    write_index: usize,
    count: usize,
}

impl SampleWindow {
    /// Creates a window holding at most `capacity` samples (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: vec![0.0; capacity],
            capacity,
            write_index: 0,
            count: 0,
        }
    }

    /// Pushes a new sample, evicting the oldest when full.
    pub fn push(&mut self, sample: f64) {
        self.samples[self.write_index] = sample;
        self.write_index = (self.write_index + 1) % self.capacity;

        if self.count < self.capacity {
            self.count += 1;
        }
    }

    /// Most recently pushed sample.
    pub fn latest(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        let idx = (self.write_index + self.capacity - 1) % self.capacity;
        Some(self.samples[idx])
    }

    /// Arithmetic mean of the retained samples.
    pub fn average(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        let sum: f64 = self.iter_ordered().sum();
        Some(sum / self.count as f64)
    }

    /// Returns all samples in chronological order (oldest to newest).
    pub fn samples(&self) -> Vec<f64> {
        self.iter_ordered().collect()
    }

    fn iter_ordered(&self) -> impl Iterator<Item = f64> + '_ {
        let start = if self.count < self.capacity {
            0
        } else {
            self.write_index
        };
        (0..self.count).map(move |i| self.samples[(start + i) % self.capacity])
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_push_and_read() {
        let mut w = SampleWindow::new(3);
        assert!(w.is_empty());
        assert_eq!(w.capacity(), 3);
        assert_eq!(w.latest(), None);
        assert_eq!(w.average(), None);

        w.push(5.0);
        assert_eq!(w.len(), 1);
        assert_eq!(w.latest(), Some(5.0));
        assert_eq!(w.average(), Some(5.0));
    }

    #[test]
    fn test_window_wraparound() {
        let mut w = SampleWindow::new(3);
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            w.push(v);
        }

        // Only the last 3 samples remain, oldest first
        assert_eq!(w.samples(), vec![3.0, 4.0, 5.0]);
        assert_eq!(w.latest(), Some(5.0));
        assert_eq!(w.average(), Some(4.0));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut w = SampleWindow::new(0);
        w.push(1.0);
        w.push(2.0);
        assert_eq!(w.capacity(), 1);
        assert_eq!(w.samples(), vec![2.0]);
    }
}
