//! Adaptive per-m/z-bin noise floor estimation.
//!
//! Every scan is divided into fixed width m/z bins and the most intense point
//! in each bin is recorded. The threshold of a bin is a quantile of those
//! maxima over the whole run, so a bin that carries a persistent chemical
//! background gets a higher floor than a bin that is usually empty.
use std::collections::BTreeMap;

use num_traits::Float;
use tracing::debug;

use crate::detector::DetectionError;
use crate::progress::{CancellationToken, ProgressCounter, ProgressSink};
use crate::scan::{Scan, ScanOrderGuard};

/// Compute the `q`-quantile of a sample sorted in ascending order.
///
/// This uses linear interpolation between the two closest ranks, placing the
/// quantile at position `q * (n - 1)`. An empty sample has a quantile of zero,
/// `q <= 0` gives the minimum and `q >= 1` gives the maximum.
pub fn quantile<T: Float>(sorted: &[T], q: f64) -> T {
    quantile_by(sorted.len(), q, |i| sorted[i])
}

/// The same as [`quantile`], but reads the `i`th smallest value of an `n` element sample from `value_at`.
fn quantile_by<T: Float, F: Fn(usize) -> T>(n: usize, q: f64, value_at: F) -> T {
    if n == 0 {
        return T::zero();
    }
    if q <= 0.0 {
        return value_at(0);
    }
    if q >= 1.0 {
        return value_at(n - 1);
    }
    let h = q * (n - 1) as f64;
    let lo = h.floor() as usize;
    let frac = h - lo as f64;
    let lo_val = value_at(lo);
    if lo + 1 >= n || frac == 0.0 {
        return lo_val;
    }
    let hi_val = value_at(lo + 1);
    let frac = T::from(frac).unwrap_or_else(T::zero);
    lo_val + (hi_val - lo_val) * frac
}

/// The per-bin intensity floor for a run.
///
/// Only bins with a nonzero threshold are stored, so the table's size follows
/// the data rather than the number of bins its m/z range spans.
#[derive(Debug, Clone, PartialEq)]
pub struct ChromatographicThresholds {
    pub start_mz: f64,
    pub bin_width: f64,
    n_bins: usize,
    thresholds: BTreeMap<usize, f32>,
}

impl ChromatographicThresholds {
    /// Build a table from one threshold per bin, starting at `start_mz`
    pub fn new(start_mz: f64, bin_width: f64, thresholds: Vec<f32>) -> Self {
        let n_bins = thresholds.len();
        let thresholds = thresholds
            .into_iter()
            .enumerate()
            .filter(|(_, v)| *v > 0.0)
            .collect();
        Self {
            start_mz,
            bin_width,
            n_bins,
            thresholds,
        }
    }

    /// Create an all-zero threshold table covering `mz_range`, which filters nothing
    pub fn zeros(mz_range: Option<(f64, f64)>, bin_width: f64) -> Self {
        let (start_mz, n_bins) = Self::layout(mz_range, bin_width);
        Self {
            start_mz,
            bin_width,
            n_bins,
            thresholds: BTreeMap::new(),
        }
    }

    /// The first bin's start and the number of bins needed to cover `mz_range`.
    /// A span too large to count saturates at `usize::MAX` bins.
    fn layout(mz_range: Option<(f64, f64)>, bin_width: f64) -> (f64, usize) {
        match mz_range {
            Some((start, end)) => {
                let n = ((end - start) / bin_width).ceil();
                let n = if n.is_nan() { 1 } else { n as usize };
                (start, n.max(1))
            }
            None => (0.0, 0),
        }
    }

    /// The number of bins covered, including those with a zero threshold
    pub fn len(&self) -> usize {
        self.n_bins
    }

    pub fn is_empty(&self) -> bool {
        self.n_bins == 0
    }

    /// The threshold of one bin, zero for bins that are unobserved or out of range
    pub fn get(&self, bin: usize) -> f32 {
        self.thresholds.get(&bin).copied().unwrap_or_default()
    }

    /// Iterate over the bins with a nonzero threshold in ascending bin order
    pub fn iter_nonzero(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.thresholds.iter().map(|(bin, v)| (*bin, *v))
    }

    /// The bin an m/z falls into. Values outside the covered range are clamped
    /// to the first or last bin.
    pub fn bin_for(&self, mz: f64) -> Option<usize> {
        if self.is_empty() {
            return None;
        }
        let bin = ((mz - self.start_mz) / self.bin_width).floor();
        if bin <= 0.0 {
            Some(0)
        } else {
            Some((bin as usize).min(self.n_bins - 1))
        }
    }

    /// The threshold that applies at `mz`, zero if no bins exist
    pub fn threshold_at(&self, mz: f64) -> f32 {
        self.bin_for(mz).map(|i| self.get(i)).unwrap_or_default()
    }

    /// Estimate the thresholds from all `scans`.
    ///
    /// When `q <= 0` the scans are not visited and an all-zero table is returned.
    #[tracing::instrument(skip_all, level = "debug")]
    pub(crate) fn estimate<'a, I, C, P>(
        scans: I,
        mz_range: Option<(f64, f64)>,
        bin_width: f64,
        q: f64,
        cancel: &C,
        progress: &mut ProgressCounter<'_, P>,
    ) -> Result<Self, DetectionError>
    where
        I: IntoIterator<Item = &'a Scan>,
        C: CancellationToken + ?Sized,
        P: ProgressSink + ?Sized,
    {
        let mut table = Self::zeros(mz_range, bin_width);
        if q <= 0.0 || table.is_empty() {
            return Ok(table);
        }

        // Bins missing from a scan's maxima count as zeros for that scan
        let mut bin_maxima: BTreeMap<usize, Vec<f32>> = BTreeMap::new();
        let mut scan_maxima: BTreeMap<usize, f32> = BTreeMap::new();
        let mut guard = ScanOrderGuard::default();
        let mut n_scans = 0usize;

        for scan in scans {
            if cancel.is_canceled() {
                return Err(DetectionError::Canceled);
            }
            guard.check(scan)?;
            for (mz, inten) in scan.iter() {
                let Some(bin) = table.bin_for(mz) else {
                    continue;
                };
                let v = scan_maxima.entry(bin).or_insert(inten);
                if *v < inten {
                    *v = inten;
                }
            }
            for (bin, v) in std::mem::take(&mut scan_maxima) {
                bin_maxima.entry(bin).or_default().push(v);
            }
            n_scans += 1;
            progress.step();
        }

        for (bin, mut maxima) in bin_maxima {
            maxima.sort_by(|a, b| a.total_cmp(b));
            let n_zeros = n_scans - maxima.len();
            let threshold = quantile_by(n_scans, q, |i| {
                if i < n_zeros {
                    0.0
                } else {
                    maxima[i - n_zeros]
                }
            });
            if threshold > 0.0 {
                table.thresholds.insert(bin, threshold);
            }
        }

        debug!(
            "Estimated chromatographic thresholds over {} bins from {} scans, {} nonzero",
            table.n_bins,
            n_scans,
            table.thresholds.len()
        );
        Ok(table)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::progress::{NeverCancel, NoProgress};

    #[test]
    fn test_quantile() {
        let vals = [10.0f32, 20.0, 30.0, 40.0];
        assert_eq!(quantile(&vals, 0.5), 25.0);
        assert_eq!(quantile(&vals, 0.0), 10.0);
        assert_eq!(quantile(&vals, 1.0), 40.0);
        assert!((quantile(&vals, 0.25) - 17.5).abs() < 1e-6);
        assert_eq!(quantile::<f64>(&[], 0.5), 0.0);
        assert_eq!(quantile(&[7.0f64], 0.9), 7.0);
    }

    #[test]
    fn test_bin_for() {
        let table = ChromatographicThresholds::zeros(Some((100.0, 101.0)), 0.25);
        assert_eq!(table.len(), 4);
        assert_eq!(table.bin_for(100.0), Some(0));
        assert_eq!(table.bin_for(100.3), Some(1));
        assert_eq!(table.bin_for(101.0), Some(3));
        assert_eq!(table.bin_for(99.0), Some(0));
        assert_eq!(table.bin_for(250.0), Some(3));

        let table = ChromatographicThresholds::zeros(None, 0.25);
        assert!(table.is_empty());
        assert_eq!(table.threshold_at(100.0), 0.0);

        let table = ChromatographicThresholds::zeros(Some((100.0, 100.0)), 0.25);
        assert_eq!(table.len(), 1);
    }

    fn dense(table: &ChromatographicThresholds) -> Vec<f32> {
        (0..table.len()).map(|bin| table.get(bin)).collect()
    }

    fn estimate(scans: &[Scan], range: (f64, f64), q: f64) -> ChromatographicThresholds {
        let mut sink = NoProgress;
        let mut counter = ProgressCounter::new(&mut sink, scans.len());
        ChromatographicThresholds::estimate(scans, Some(range), 1.0, q, &NeverCancel, &mut counter)
            .unwrap()
    }

    #[test]
    fn test_estimate_bin_maxima() {
        let scans: Vec<_> = [10.0f32, 20.0, 30.0, 40.0]
            .into_iter()
            .enumerate()
            .map(|(i, v)| Scan::from_pairs(i, i as f64, [(100.2, v / 2.0), (100.5, v), (101.5, 1.0)]))
            .collect();
        let table = estimate(&scans, (100.0, 102.0), 0.5);
        assert_eq!(table.len(), 2);
        assert_eq!(dense(&table), vec![25.0, 1.0]);
    }

    #[test]
    fn test_estimate_implicit_zeros() {
        let scans = vec![
            Scan::from_pairs(0, 0.0, [(100.5, 50.0)]),
            Scan::from_pairs(1, 1.0, [(102.5, 8.0)]),
            Scan::from_pairs(2, 2.0, [(100.5, 70.0)]),
        ];
        let table = estimate(&scans, (100.0, 103.0), 0.5);
        // bin 0 holds [0, 50, 70], bin 1 is never observed, bin 2 holds [0, 0, 8]
        assert_eq!(dense(&table), vec![50.0, 0.0, 0.0]);
        assert_eq!(table.iter_nonzero().collect::<Vec<_>>(), vec![(0, 50.0)]);

        let table = estimate(&scans, (100.0, 103.0), 0.0);
        assert_eq!(dense(&table), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_estimate_many_narrow_bins() {
        let scans: Vec<_> = (0..3)
            .map(|i| Scan::from_pairs(i, i as f64, [(50.0, 10.0), (1000.0, 20.0), (2000.0, 30.0)]))
            .collect();
        let mut sink = NoProgress;
        let mut counter = ProgressCounter::new(&mut sink, scans.len());
        let table = ChromatographicThresholds::estimate(
            &scans,
            Some((50.0, 2000.0)),
            1e-12,
            0.5,
            &NeverCancel,
            &mut counter,
        )
        .unwrap();
        assert!(table.len() > 1_000_000_000_000);
        assert_eq!(table.iter_nonzero().count(), 3);
        assert_eq!(table.threshold_at(50.0), 10.0);
        assert_eq!(table.threshold_at(2000.0), 30.0);
        assert_eq!(table.threshold_at(1500.0), 0.0);
    }

    #[test]
    fn test_unbounded_range_layout() {
        let table = ChromatographicThresholds::zeros(Some((100.0, f64::INFINITY)), 1.0);
        assert_eq!(table.len(), usize::MAX);
        assert_eq!(table.threshold_at(1e300), 0.0);

        let table = ChromatographicThresholds::zeros(Some((f64::NAN, 200.0)), 1.0);
        assert_eq!(table.len(), 1);
        assert_eq!(table.threshold_at(150.0), 0.0);
    }

    #[test]
    fn test_estimate_cancel() {
        let scans = vec![Scan::from_pairs(0, 0.0, [(100.5, 50.0)])];
        let mut sink = NoProgress;
        let mut counter = ProgressCounter::new(&mut sink, scans.len());
        let cancel = std::sync::atomic::AtomicBool::new(true);
        let res = ChromatographicThresholds::estimate(
            &scans,
            Some((100.0, 101.0)),
            1.0,
            0.5,
            &cancel,
            &mut counter,
        );
        assert_eq!(res, Err(DetectionError::Canceled));
    }
}
