//! Finalized chromatographic peaks and the list they are collected into.
use std::cmp::Ordering;
use std::ops::{Index, Sub};

use itertools::{Itertools, MinMaxResult};

use mzpeaks::{
    feature::Feature,
    feature_map::FeatureMap,
    prelude::*,
    Time, MZ,
};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::trace::{Trace, TracePoint};

/// A point of a finalized peak
pub type PeakPoint = TracePoint;

/// A closed interval of values
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ValueRange<T> {
    pub start: T,
    pub end: T,
}

impl<T: Copy + PartialOrd + Sub<Output = T>> ValueRange<T> {
    pub fn new(start: T, end: T) -> Self {
        Self { start, end }
    }

    /// The smallest range covering every value, or `None` for an empty iterator
    pub fn spanning<I: IntoIterator<Item = T>>(values: I) -> Option<Self> {
        match values
            .into_iter()
            .minmax_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
        {
            MinMaxResult::NoElements => None,
            MinMaxResult::OneElement(v) => Some(Self::new(v, v)),
            MinMaxResult::MinMax(lo, hi) => Some(Self::new(lo, hi)),
        }
    }

    pub fn length(&self) -> T {
        self.end - self.start
    }

    pub fn contains(&self, value: T) -> bool {
        self.start <= value && value <= self.end
    }
}

/// A detected chromatographic peak.
///
/// `mz` is the median m/z of the points, `time` and `height` come from the
/// most intense point, and `area` integrates intensity over retention time.
#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Peak {
    pub id: usize,
    pub mz: f64,
    pub time: f64,
    pub height: f32,
    pub area: f64,
    pub apex_scan_index: usize,
    pub mz_range: ValueRange<f64>,
    pub time_range: ValueRange<f64>,
    pub intensity_range: ValueRange<f32>,
    pub points: Vec<PeakPoint>,
}

impl Peak {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The retention time span covered by the peak
    pub fn duration(&self) -> f64 {
        self.time_range.length()
    }
}

impl PartialOrd for Peak {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match self.mz.partial_cmp(&other.mz) {
            Some(Ordering::Equal) => self.time.partial_cmp(&other.time),
            ord => ord,
        }
    }
}

impl CoordinateLike<MZ> for Peak {
    fn coordinate(&self) -> f64 {
        self.mz
    }
}

impl CoordinateLike<Time> for Peak {
    fn coordinate(&self) -> f64 {
        self.time
    }
}

impl IntensityMeasurement for Peak {
    fn intensity(&self) -> f32 {
        self.height
    }
}

impl From<&Peak> for Feature<MZ, Time> {
    fn from(peak: &Peak) -> Self {
        let mut feature = Feature::default();
        for point in peak.points.iter() {
            feature.push_raw(point.mz, point.time, point.intensity);
        }
        feature
    }
}

fn median(mut values: Vec<f64>) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    match n {
        0 => 0.0,
        _ if n % 2 == 1 => values[n / 2],
        _ => (values[n / 2 - 1] + values[n / 2]) / 2.0,
    }
}

/// Trapezoidal integral of intensity over retention time
fn trapezoid_area(points: &[PeakPoint]) -> f64 {
    points
        .windows(2)
        .map(|w| (w[1].time - w[0].time) * (w[0].intensity as f64 + w[1].intensity as f64) / 2.0)
        .sum()
}

/// Summarizes closed traces and decides which become peaks.
#[derive(Debug, Clone, PartialEq)]
pub struct PeakAssembler {
    pub minimum_peak_duration: f64,
    pub minimum_peak_height: f32,
    next_id: usize,
}

impl PeakAssembler {
    pub fn new(minimum_peak_duration: f64, minimum_peak_height: f32) -> Self {
        Self {
            minimum_peak_duration,
            minimum_peak_height,
            next_id: 1,
        }
    }

    /// Compute the summary statistics of a trace without assigning an id or applying
    /// the acceptance filter. Returns `None` for a trace without points.
    pub fn summarize(trace: &Trace) -> Option<Peak> {
        let points = trace.points();
        let apex = points
            .iter()
            .copied()
            .reduce(|best, p| if p.intensity > best.intensity { p } else { best })?;
        Some(Peak {
            id: 0,
            mz: median(points.iter().map(|p| p.mz).collect()),
            time: apex.time,
            height: apex.intensity,
            area: trapezoid_area(points),
            apex_scan_index: apex.scan_index,
            mz_range: ValueRange::spanning(points.iter().map(|p| p.mz))?,
            time_range: ValueRange::spanning(points.iter().map(|p| p.time))?,
            intensity_range: ValueRange::spanning(points.iter().map(|p| p.intensity))?,
            points: points.to_vec(),
        })
    }

    pub fn accepts(&self, peak: &Peak) -> bool {
        peak.duration() >= self.minimum_peak_duration && peak.height >= self.minimum_peak_height
    }

    /// Summarize a closed trace and, if it passes the duration and height filters,
    /// give it the next id.
    pub fn finalize(&mut self, trace: &Trace) -> Option<Peak> {
        let mut peak = Self::summarize(trace)?;
        if !self.accepts(&peak) {
            return None;
        }
        peak.id = self.next_id;
        self.next_id += 1;
        Some(peak)
    }
}

/// The accepted peaks of one run, in finalization order.
#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PeakList {
    peaks: Vec<Peak>,
}

impl PeakList {
    pub fn new(peaks: Vec<Peak>) -> Self {
        Self { peaks }
    }

    pub fn push(&mut self, peak: Peak) {
        self.peaks.push(peak)
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&Peak> {
        self.peaks.get(i)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Peak> {
        self.peaks.iter()
    }

    pub fn as_slice(&self) -> &[Peak] {
        &self.peaks
    }

    pub fn into_inner(self) -> Vec<Peak> {
        self.peaks
    }

    /// Convert every peak into an m/z by time feature
    pub fn to_feature_map(&self) -> FeatureMap<MZ, Time, Feature<MZ, Time>> {
        FeatureMap::new(self.peaks.iter().map(Feature::from).collect())
    }
}

impl Index<usize> for PeakList {
    type Output = Peak;

    fn index(&self, index: usize) -> &Self::Output {
        &self.peaks[index]
    }
}

impl IntoIterator for PeakList {
    type Item = Peak;
    type IntoIter = std::vec::IntoIter<Peak>;

    fn into_iter(self) -> Self::IntoIter {
        self.peaks.into_iter()
    }
}

impl<'a> IntoIterator for &'a PeakList {
    type Item = &'a Peak;
    type IntoIter = std::slice::Iter<'a, Peak>;

    fn into_iter(self) -> Self::IntoIter {
        self.peaks.iter()
    }
}

impl FromIterator<Peak> for PeakList {
    fn from_iter<T: IntoIterator<Item = Peak>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
