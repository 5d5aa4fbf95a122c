//! Parameters controlling detection, and their validation.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A parameter value that cannot be used to run the detector
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParameterError {
    #[error("{name} must be a finite number greater than zero, got {value}")]
    NotPositive { name: &'static str, value: f64 },
    #[error("{name} must be a finite number greater than or equal to zero, got {value}")]
    Negative { name: &'static str, value: f64 },
    #[error("{name} must be between 0 and 1, got {value}")]
    NotAFraction { name: &'static str, value: f64 },
    #[error("max_width ({max_width}) must be greater than min_width ({min_width})")]
    EmptyWidthRange { min_width: f64, max_width: f64 },
}

/// The complete set of parameters for one detection run.
///
/// m/z widths and tolerances are in Daltons, durations are in the same unit as
/// [`Scan::time`](crate::Scan::time).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DetectionParams {
    /// The width of the m/z bins used to estimate the chromatographic threshold
    pub bin_width: f64,
    /// The quantile of per-scan bin maxima used as each bin's threshold. Values
    /// at or below zero skip threshold estimation.
    pub threshold_quantile: f64,
    /// The absolute intensity below which signal is never considered
    pub noise_level: f32,
    /// The largest m/z difference allowed when extending a trace
    pub mz_tolerance: f64,
    /// The relative intensity margin used by the trace shape heuristic
    pub int_tolerance: f64,
    /// The narrowest m/z width a single-scan peak may have
    pub min_width: f64,
    /// The widest m/z width a single-scan peak may have before it is split
    pub max_width: f64,
    /// The shortest retention time span an accepted peak may cover
    pub minimum_peak_duration: f64,
    /// The smallest apex intensity an accepted peak may have
    pub minimum_peak_height: f32,
    /// The MS level of the scans to use
    pub ms_level: u8,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            bin_width: 0.25,
            threshold_quantile: 0.0,
            noise_level: 4.0,
            mz_tolerance: 0.2,
            int_tolerance: 0.15,
            min_width: 0.0,
            max_width: 1.0,
            minimum_peak_duration: 0.0,
            minimum_peak_height: 15.0,
            ms_level: 1,
        }
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ParameterError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ParameterError::NotPositive { name, value })
    }
}

fn non_negative(name: &'static str, value: f64) -> Result<(), ParameterError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ParameterError::Negative { name, value })
    }
}

fn fraction(name: &'static str, value: f64) -> Result<(), ParameterError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ParameterError::NotAFraction { name, value })
    }
}

impl DetectionParams {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bin_width: f64,
        threshold_quantile: f64,
        noise_level: f32,
        mz_tolerance: f64,
        int_tolerance: f64,
        min_width: f64,
        max_width: f64,
        minimum_peak_duration: f64,
        minimum_peak_height: f32,
    ) -> Self {
        Self {
            bin_width,
            threshold_quantile,
            noise_level,
            mz_tolerance,
            int_tolerance,
            min_width,
            max_width,
            minimum_peak_duration,
            minimum_peak_height,
            ms_level: 1,
        }
    }

    /// Check every parameter against its allowed range, reporting the first violation.
    pub fn validate(&self) -> Result<(), ParameterError> {
        positive("bin_width", self.bin_width)?;
        fraction("threshold_quantile", self.threshold_quantile)?;
        non_negative("noise_level", self.noise_level as f64)?;
        positive("mz_tolerance", self.mz_tolerance)?;
        fraction("int_tolerance", self.int_tolerance)?;
        non_negative("min_width", self.min_width)?;
        positive("max_width", self.max_width)?;
        if self.max_width <= self.min_width {
            return Err(ParameterError::EmptyWidthRange {
                min_width: self.min_width,
                max_width: self.max_width,
            });
        }
        non_negative("minimum_peak_duration", self.minimum_peak_duration)?;
        non_negative("minimum_peak_height", self.minimum_peak_height as f64)?;
        Ok(())
    }

    /// Whether the chromatographic threshold pass will run
    pub fn uses_chromatographic_threshold(&self) -> bool {
        self.threshold_quantile > 0.0
    }

    pub fn bin_width(mut self, bin_width: f64) -> Self {
        self.bin_width = bin_width;
        self
    }

    pub fn threshold_quantile(mut self, threshold_quantile: f64) -> Self {
        self.threshold_quantile = threshold_quantile;
        self
    }

    pub fn noise_level(mut self, noise_level: f32) -> Self {
        self.noise_level = noise_level;
        self
    }

    pub fn mz_tolerance(mut self, mz_tolerance: f64) -> Self {
        self.mz_tolerance = mz_tolerance;
        self
    }

    pub fn int_tolerance(mut self, int_tolerance: f64) -> Self {
        self.int_tolerance = int_tolerance;
        self
    }

    pub fn width_range(mut self, min_width: f64, max_width: f64) -> Self {
        self.min_width = min_width;
        self.max_width = max_width;
        self
    }

    pub fn minimum_peak_duration(mut self, minimum_peak_duration: f64) -> Self {
        self.minimum_peak_duration = minimum_peak_duration;
        self
    }

    pub fn minimum_peak_height(mut self, minimum_peak_height: f32) -> Self {
        self.minimum_peak_height = minimum_peak_height;
        self
    }

    pub fn ms_level(mut self, ms_level: u8) -> Self {
        self.ms_level = ms_level;
        self
    }
}
