//! Recursive threshold detection of chromatographic peaks in LC-MS runs.
//!
//! Each scan is split into single-scan peaks by repeatedly raising an intensity
//! threshold over regions that are too wide, and the resulting apexes are
//! linked across scans into traces by a greedy, scored matching that respects
//! the rise-then-fall shape of a chromatographic peak.
//!
//! ```
//! use mzthreshold::{detect_peaks, DetectionParams, Scan};
//!
//! let scans: Vec<Scan> = [10.0, 100.0, 10.0]
//!     .into_iter()
//!     .enumerate()
//!     .map(|(i, inten)| Scan::from_pairs(i, i as f64, [(100.0, inten)]))
//!     .collect();
//!
//! let params = DetectionParams::default()
//!     .noise_level(5.0)
//!     .mz_tolerance(0.01)
//!     .minimum_peak_height(50.0);
//! let peaks = detect_peaks(&scans, params).unwrap();
//! assert_eq!(peaks.len(), 1);
//! assert_eq!(peaks[0].height, 100.0);
//! ```
pub mod detector;
pub mod matcher;
pub mod params;
pub mod peak;
pub mod progress;
pub mod scan;
pub mod splitter;
pub mod threshold;
pub mod trace;

pub use detector::{detect_peaks, DetectionError, DetectorBuilder, RecursiveThresholdDetector};
pub use matcher::{CandidatePeak, MatchCandidate, TraceMatcher};
pub use params::{DetectionParams, ParameterError};
pub use peak::{Peak, PeakAssembler, PeakList, PeakPoint, ValueRange};
pub use progress::{CancellationToken, NeverCancel, NoProgress, ProgressCallback, ProgressSink, SharedProgress};
pub use scan::{DataError, Scan, ScanSource};
pub use splitter::RecursiveSplitter;
pub use threshold::{quantile, ChromatographicThresholds};
pub use trace::{Trace, TraceArena, TraceId, TracePoint, Trend};
