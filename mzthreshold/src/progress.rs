//! Cooperative cancellation and progress reporting hooks for long-running detection.
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// A flag polled by the detector before each scan is processed.
pub trait CancellationToken {
    fn is_canceled(&self) -> bool;
}

/// A token that is never canceled
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverCancel;

impl CancellationToken for NeverCancel {
    fn is_canceled(&self) -> bool {
        false
    }
}

impl CancellationToken for AtomicBool {
    fn is_canceled(&self) -> bool {
        self.load(Ordering::Acquire)
    }
}

impl<T: CancellationToken + ?Sized> CancellationToken for Arc<T> {
    fn is_canceled(&self) -> bool {
        (**self).is_canceled()
    }
}

impl<T: CancellationToken + ?Sized> CancellationToken for &T {
    fn is_canceled(&self) -> bool {
        (**self).is_canceled()
    }
}

/// Receives the fraction of work completed, a non-decreasing value in `[0, 1]`.
pub trait ProgressSink {
    fn update(&mut self, fraction: f64);
}

/// Discards all progress updates
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn update(&mut self, _fraction: f64) {}
}

/// Forwards progress updates to a closure
pub struct ProgressCallback<F: FnMut(f64)>(pub F);

impl<F: FnMut(f64)> ProgressSink for ProgressCallback<F> {
    fn update(&mut self, fraction: f64) {
        (self.0)(fraction)
    }
}

/// A progress value that can be shared with and polled from another thread
#[derive(Debug, Default, Clone)]
pub struct SharedProgress {
    bits: Arc<AtomicU64>,
}

impl SharedProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently reported fraction
    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }
}

impl ProgressSink for SharedProgress {
    fn update(&mut self, fraction: f64) {
        self.bits.store(fraction.to_bits(), Ordering::Release);
    }
}

/// Converts per-scan steps of the two detection passes into a monotone
/// fraction for a [`ProgressSink`]
pub(crate) struct ProgressCounter<'a, P: ProgressSink + ?Sized> {
    sink: &'a mut P,
    processed: usize,
    total: usize,
}

impl<'a, P: ProgressSink + ?Sized> ProgressCounter<'a, P> {
    /// `n_scans` is the number of scans in one pass, both passes are counted
    pub(crate) fn new(sink: &'a mut P, n_scans: usize) -> Self {
        Self {
            sink,
            processed: 0,
            total: 2 * n_scans,
        }
    }

    pub(crate) fn step(&mut self) {
        self.advance(1)
    }

    pub(crate) fn advance(&mut self, n: usize) {
        self.processed = (self.processed + n).min(self.total);
        let fraction = self.fraction();
        self.sink.update(fraction);
    }

    pub(crate) fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.processed as f64 / self.total as f64
        }
    }

    pub(crate) fn finish(&mut self) {
        self.processed = self.total;
        self.sink.update(1.0);
    }
}
