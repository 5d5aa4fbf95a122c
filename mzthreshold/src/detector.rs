//! The detection driver, tying threshold estimation, single-scan peak splitting,
//! trace matching and peak assembly together over one run.
use thiserror::Error;
use tracing::{debug, trace};

use crate::matcher::{CandidatePeak, TraceMatcher};
use crate::params::{DetectionParams, ParameterError};
use crate::peak::{PeakAssembler, PeakList};
use crate::progress::{CancellationToken, NeverCancel, NoProgress, ProgressCounter, ProgressSink};
use crate::scan::{DataError, Scan, ScanOrderGuard, ScanSource};
use crate::splitter::RecursiveSplitter;
use crate::threshold::ChromatographicThresholds;
use crate::trace::{Trace, TraceArena};

/// The ways a detection run can fail to produce a [`PeakList`]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectionError {
    #[error("Invalid detection parameters: {0}")]
    Configuration(
        #[from]
        #[source]
        ParameterError,
    ),
    #[error("Invalid scan data: {0}")]
    Data(
        #[from]
        #[source]
        DataError,
    ),
    #[error("Peak detection was canceled")]
    Canceled,
}

impl DetectionError {
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}

/// Detects chromatographic peaks in a run by recursive thresholding.
///
/// A detector holds only validated parameters, so one instance may be reused
/// for any number of runs, including from several threads at once.
#[derive(Debug, Clone, PartialEq)]
pub struct RecursiveThresholdDetector {
    params: DetectionParams,
}

impl RecursiveThresholdDetector {
    /// Create a detector, rejecting invalid parameters before any data is seen
    pub fn new(params: DetectionParams) -> Result<Self, DetectionError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn builder() -> DetectorBuilder {
        DetectorBuilder::default()
    }

    pub fn params(&self) -> &DetectionParams {
        &self.params
    }

    pub fn splitter(&self) -> RecursiveSplitter {
        RecursiveSplitter::new(
            self.params.noise_level,
            self.params.min_width,
            self.params.max_width,
        )
    }

    /// Run detection to completion without cancellation or progress reporting
    pub fn detect<S: ScanSource + ?Sized>(&self, source: &S) -> Result<PeakList, DetectionError> {
        self.detect_with(source, &NeverCancel, &mut NoProgress)
    }

    /// Run detection, polling `cancel` before each scan of either pass and reporting
    /// the completed fraction to `progress`.
    ///
    /// A canceled run returns [`DetectionError::Canceled`] and discards every
    /// trace it had built.
    pub fn detect_with<S, C, P>(
        &self,
        source: &S,
        cancel: &C,
        progress: &mut P,
    ) -> Result<PeakList, DetectionError>
    where
        S: ScanSource + ?Sized,
        C: CancellationToken + ?Sized,
        P: ProgressSink + ?Sized,
    {
        let ms_level = self.params.ms_level;
        let n_scans = source.scan_count(ms_level);
        let mut counter = ProgressCounter::new(progress, n_scans);
        debug!("Detecting peaks in {n_scans} MS{ms_level} scans");

        let thresholds = if self.params.uses_chromatographic_threshold() {
            ChromatographicThresholds::estimate(
                source.scans_at_level(ms_level),
                source.mz_range(ms_level),
                self.params.bin_width,
                self.params.threshold_quantile,
                cancel,
                &mut counter,
            )?
        } else {
            counter.advance(n_scans);
            ChromatographicThresholds::zeros(None, self.params.bin_width)
        };

        let peaks = self.track(source, &thresholds, cancel, &mut counter)?;
        counter.finish();
        Ok(peaks)
    }

    /// Find the candidates of one scan that clear both the noise level and the
    /// chromatographic threshold of their bin
    fn candidates_in(
        &self,
        scan: &Scan,
        splitter: &RecursiveSplitter,
        thresholds: &ChromatographicThresholds,
        apexes: &mut Vec<usize>,
        candidates: &mut Vec<CandidatePeak>,
    ) {
        apexes.clear();
        candidates.clear();
        splitter.find_apexes(&scan.mzs, &scan.intensities, apexes);
        candidates.extend(apexes.iter().filter_map(|&i| {
            let mz = scan.mzs[i];
            let intensity = scan.intensities[i];
            (intensity >= self.params.noise_level && intensity >= thresholds.threshold_at(mz))
                .then(|| CandidatePeak::new(scan.index, i, mz, intensity))
        }));
    }

    fn close_all(assembler: &mut PeakAssembler, traces: Vec<Trace>, peaks: &mut PeakList) {
        for trace in traces {
            if let Some(peak) = assembler.finalize(&trace) {
                trace!(
                    "Accepted trace {} as peak {} at m/z {:0.4}, time {:0.3}",
                    trace.id(),
                    peak.id,
                    peak.mz,
                    peak.time
                );
                peaks.push(peak);
            }
        }
    }

    #[tracing::instrument(skip_all, level = "debug")]
    fn track<S, C, P>(
        &self,
        source: &S,
        thresholds: &ChromatographicThresholds,
        cancel: &C,
        progress: &mut ProgressCounter<'_, P>,
    ) -> Result<PeakList, DetectionError>
    where
        S: ScanSource + ?Sized,
        C: CancellationToken + ?Sized,
        P: ProgressSink + ?Sized,
    {
        let splitter = self.splitter();
        let mut matcher = TraceMatcher::new(self.params.mz_tolerance, self.params.int_tolerance);
        let mut assembler = PeakAssembler::new(
            self.params.minimum_peak_duration,
            self.params.minimum_peak_height,
        );
        let mut arena = TraceArena::new();
        let mut peaks = PeakList::default();
        let mut guard = ScanOrderGuard::default();

        let mut apexes = Vec::new();
        let mut candidates = Vec::new();
        let mut n_candidates = 0usize;

        for scan in source.scans_at_level(self.params.ms_level) {
            if cancel.is_canceled() {
                debug!("Canceled at scan {} with {} open traces", scan.index, arena.len());
                return Err(DetectionError::Canceled);
            }
            guard.check(scan)?;

            self.candidates_in(scan, &splitter, thresholds, &mut apexes, &mut candidates);
            n_candidates += candidates.len();

            matcher.connect(&mut arena, &mut candidates, scan.time);
            Self::close_all(&mut assembler, arena.take_closing(), &mut peaks);
            matcher.spawn_unconnected(&mut arena, &candidates, scan.time);
            progress.step();
        }

        let n_open = arena.len();
        Self::close_all(&mut assembler, arena.drain(), &mut peaks);
        debug!(
            "Accepted {} peaks from {n_candidates} candidates, {n_open} traces open at the end of the run",
            peaks.len()
        );
        Ok(peaks)
    }
}

/// Assembles a [`RecursiveThresholdDetector`] from groups of related parameters
#[derive(Debug, Default, Clone)]
pub struct DetectorBuilder {
    params: DetectionParams,
}

impl DetectorBuilder {
    pub fn params(&mut self, params: DetectionParams) -> &mut Self {
        self.params = params;
        self
    }

    pub fn ms_level(&mut self, ms_level: u8) -> &mut Self {
        self.params.ms_level = ms_level;
        self
    }

    /// Configure the chromatographic threshold pass, a `quantile` of zero disables it
    pub fn chromatographic_threshold(&mut self, bin_width: f64, quantile: f64) -> &mut Self {
        self.params.bin_width = bin_width;
        self.params.threshold_quantile = quantile;
        self
    }

    pub fn noise_level(&mut self, noise_level: f32) -> &mut Self {
        self.params.noise_level = noise_level;
        self
    }

    pub fn width_range(&mut self, min_width: f64, max_width: f64) -> &mut Self {
        self.params.min_width = min_width;
        self.params.max_width = max_width;
        self
    }

    pub fn tolerances(&mut self, mz_tolerance: f64, int_tolerance: f64) -> &mut Self {
        self.params.mz_tolerance = mz_tolerance;
        self.params.int_tolerance = int_tolerance;
        self
    }

    pub fn peak_filter(&mut self, minimum_peak_duration: f64, minimum_peak_height: f32) -> &mut Self {
        self.params.minimum_peak_duration = minimum_peak_duration;
        self.params.minimum_peak_height = minimum_peak_height;
        self
    }

    pub fn build(&self) -> Result<RecursiveThresholdDetector, DetectionError> {
        RecursiveThresholdDetector::new(self.params)
    }
}

/// Detect the peaks of `source` with `params` in one call
pub fn detect_peaks<S: ScanSource + ?Sized>(
    source: &S,
    params: DetectionParams,
) -> Result<PeakList, DetectionError> {
    RecursiveThresholdDetector::new(params)?.detect(source)
}
