//! Single-scan peak detection by recursive thresholding.
//!
//! A scan is cut into maximal runs of points above a threshold. Runs that are
//! too narrow are noise, runs of acceptable width are peaks, and runs that are
//! too wide are re-examined with their own lowest intensity as the threshold.
//! Raising the threshold separates humps that merged at the lower level.
use tracing::trace;

/// A contiguous stretch of points strictly above a threshold, indices inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Run {
    start: usize,
    end: usize,
    apex: usize,
    depth: usize,
}

/// Constant time leftmost arg-min and arg-max queries over one scan's
/// intensities, built the first time a run needs splitting.
#[derive(Debug, Clone)]
struct RangeExtrema<'a> {
    values: &'a [f32],
    minima: Vec<Vec<usize>>,
    maxima: Vec<Vec<usize>>,
}

impl<'a> RangeExtrema<'a> {
    fn new(values: &'a [f32]) -> Self {
        let minima = Self::sparse_table(values, |a, b| b < a);
        let maxima = Self::sparse_table(values, |a, b| b > a);
        Self {
            values,
            minima,
            maxima,
        }
    }

    fn pick(values: &[f32], prefer: fn(f32, f32) -> bool, a: usize, b: usize) -> usize {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        if prefer(values[first], values[second]) {
            second
        } else {
            first
        }
    }

    /// Level `k` holds the extremum of every window of `2^k` points
    fn sparse_table(values: &[f32], prefer: fn(f32, f32) -> bool) -> Vec<Vec<usize>> {
        let n = values.len();
        let mut levels: Vec<Vec<usize>> = vec![(0..n).collect()];
        let mut span = 1;
        while span * 2 <= n {
            let prev = &levels[levels.len() - 1];
            let next: Vec<usize> = (0..=n - span * 2)
                .map(|i| Self::pick(values, prefer, prev[i], prev[i + span]))
                .collect();
            levels.push(next);
            span *= 2;
        }
        levels
    }

    fn query(&self, levels: &[Vec<usize>], prefer: fn(f32, f32) -> bool, start: usize, end: usize) -> usize {
        let len = end - start + 1;
        let k = (usize::BITS - 1 - len.leading_zeros()) as usize;
        let level = &levels[k];
        Self::pick(self.values, prefer, level[start], level[end + 1 - (1 << k)])
    }

    fn argmin(&self, start: usize, end: usize) -> usize {
        self.query(&self.minima, |a, b| b < a, start, end)
    }

    fn argmax(&self, start: usize, end: usize) -> usize {
        self.query(&self.maxima, |a, b| b > a, start, end)
    }

    /// Split `run` into the maximal runs strictly above its own minimum
    fn split(&self, run: &Run, pending: &mut Vec<(usize, usize)>, out: &mut Vec<Run>) {
        let floor = self.values[self.argmin(run.start, run.end)];
        pending.clear();
        pending.push((run.start, run.end));
        while let Some((start, end)) = pending.pop() {
            let low = self.argmin(start, end);
            if self.values[low] > floor {
                out.push(Run {
                    start,
                    end,
                    apex: self.argmax(start, end),
                    depth: run.depth + 1,
                });
                continue;
            }
            if low > start {
                pending.push((start, low - 1));
            }
            if low < end {
                pending.push((low + 1, end));
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecursiveSplitter {
    pub noise_level: f32,
    pub min_width: f64,
    pub max_width: f64,
}

impl RecursiveSplitter {
    pub fn new(noise_level: f32, min_width: f64, max_width: f64) -> Self {
        Self {
            noise_level,
            min_width,
            max_width,
        }
    }

    fn runs_above(intensities: &[f32], threshold: f32, runs: &mut Vec<Run>) {
        let mut i = 0;
        while i < intensities.len() {
            if intensities[i] <= threshold {
                i += 1;
                continue;
            }
            let start = i;
            let mut apex = i;
            while i < intensities.len() && intensities[i] > threshold {
                if intensities[i] > intensities[apex] {
                    apex = i;
                }
                i += 1;
            }
            runs.push(Run {
                start,
                end: i - 1,
                apex,
                depth: 0,
            });
        }
    }

    /// Find the apex indices of the peaks in one scan's m/z-sorted arrays, appending
    /// them to `acc` in ascending order. Returns the number of indices added.
    pub fn find_apexes(&self, mzs: &[f64], intensities: &[f32], acc: &mut Vec<usize>) -> usize {
        let n = mzs.len().min(intensities.len());
        if n == 0 {
            return 0;
        }
        let intensities = &intensities[..n];
        let offset = acc.len();
        let mut stack = Vec::new();
        Self::runs_above(intensities, self.noise_level, &mut stack);
        let mut extrema: Option<RangeExtrema> = None;
        let mut pending = Vec::new();
        let mut max_depth = 0;

        while let Some(run) = stack.pop() {
            max_depth = max_depth.max(run.depth);
            let width = mzs[run.end] - mzs[run.start];
            if width > self.max_width {
                // Every point equal to the run's minimum drops out, so sub-runs always shrink
                extrema
                    .get_or_insert_with(|| RangeExtrema::new(intensities))
                    .split(&run, &mut pending, &mut stack);
            } else if width >= self.min_width {
                acc.push(run.apex);
            }
        }

        acc[offset..].sort_unstable();
        let k = acc.len() - offset;
        trace!("Found {k} apexes in {n} points, split depth {max_depth}");
        k
    }

    pub fn apexes(&self, mzs: &[f64], intensities: &[f32]) -> Vec<usize> {
        let mut acc = Vec::new();
        self.find_apexes(mzs, intensities, &mut acc);
        acc
    }
}
