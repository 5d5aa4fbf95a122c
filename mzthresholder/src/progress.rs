use std::iter::Sum;
use std::ops::{Add, AddAssign};

use mzthreshold::ProgressSink;
use tracing::info;

/// Counts accumulated over one or more runs
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ProgressRecord {
    pub runs: usize,
    pub spectra_read: usize,
    pub scans_used: usize,
    pub peaks: usize,
}

impl Add for ProgressRecord {
    type Output = ProgressRecord;

    fn add(self, rhs: Self) -> Self::Output {
        let mut dup = self;
        dup += rhs;
        dup
    }
}

impl AddAssign for ProgressRecord {
    fn add_assign(&mut self, rhs: Self) {
        self.runs += rhs.runs;
        self.spectra_read += rhs.spectra_read;
        self.scans_used += rhs.scans_used;
        self.peaks += rhs.peaks;
    }
}

impl Sum for ProgressRecord {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

/// Logs detection progress for one run each time another tenth is completed
#[derive(Debug, Clone)]
pub struct LogProgress<'a> {
    source: &'a str,
    next_step: u32,
}

impl<'a> LogProgress<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            next_step: 1,
        }
    }
}

impl ProgressSink for LogProgress<'_> {
    fn update(&mut self, fraction: f64) {
        let step = (fraction * 10.0).floor() as u32;
        if step >= self.next_step {
            info!("{}: {}% complete", self.source, step.min(10) * 10);
            self.next_step = step + 1;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_record_sum() {
        let a = ProgressRecord {
            runs: 1,
            spectra_read: 10,
            scans_used: 8,
            peaks: 3,
        };
        let total: ProgressRecord = [a, a].into_iter().sum();
        assert_eq!(total.runs, 2);
        assert_eq!(total.scans_used, 16);
        assert_eq!(total.peaks, 6);
    }

    #[test]
    fn test_log_steps() {
        let mut sink = LogProgress::new("test");
        sink.update(0.05);
        assert_eq!(sink.next_step, 1);
        sink.update(0.25);
        assert_eq!(sink.next_step, 3);
        sink.update(0.29);
        assert_eq!(sink.next_step, 3);
        sink.update(1.0);
        assert_eq!(sink.next_step, 11);
    }
}
