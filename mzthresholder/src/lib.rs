mod args;
mod driver;
mod progress;
mod source;
mod time_range;
mod write;

pub use args::OutputFormat;
pub use driver::{MZThresholder, MZThresholderError};
pub use progress::{LogProgress, ProgressRecord};
pub use source::{collect_scans, read_scans, scan_from_spectrum, RunScans};
pub use time_range::{TimeRange, TimeRangeParseError};
pub use write::{write_json, write_table, OutputSink, PeakRecord, RunPeaks};
