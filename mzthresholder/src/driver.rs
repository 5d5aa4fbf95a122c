use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;

use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tracing::{debug, info, warn};

use mzthreshold::{DetectionError, DetectionParams, ParameterError, RecursiveThresholdDetector};

use crate::args::{
    fraction, non_negative_float_f32, non_negative_float_f64, positive_float_f64, OutputFormat,
};
use crate::progress::{LogProgress, ProgressRecord};
use crate::source::read_scans;
use crate::time_range::TimeRange;
use crate::write::{write_json, write_table, OutputSink, RunPeaks};

#[derive(Debug, Error)]
pub enum MZThresholderError {
    #[error("An IO error occurred: {0}")]
    IOError(
        #[source]
        #[from]
        io::Error,
    ),
    #[error("No input files were given")]
    NoInputFiles,
    #[error("Failed to read {0}: {1}")]
    InputError(String, #[source] io::Error),
    #[error("Invalid detection parameters: {0}")]
    ParameterError(
        #[source]
        #[from]
        ParameterError,
    ),
    #[error("Peak detection failed for {0}: {1}")]
    DetectionError(String, #[source] DetectionError),
    #[error("The output file format for {0} was either unknown or not supported, pass --format")]
    OutputFormatUnknownOrNotSupportedError(String),
    #[error("Failed to write a peak table: {0}")]
    TableWriteError(
        #[source]
        #[from]
        csv::Error,
    ),
    #[error("Failed to write JSON: {0}")]
    JSONWriteError(
        #[source]
        #[from]
        serde_json::Error,
    ),
    #[error("Failed to build the thread pool: {0}")]
    ThreadPoolError(
        #[source]
        #[from]
        rayon::ThreadPoolBuildError,
    ),
    #[error("Failed to read the configuration: {0}")]
    ConfigurationError(
        #[source]
        #[from]
        figment::Error,
    ),
}

/// Chromatographic peak detection by recursive thresholding.
///
/// Read one or more LC-MS runs, trace the local maxima of each scan through
/// retention time, and write out a table of the detected peaks.
#[derive(Parser, Debug, Clone, Deserialize, Serialize)]
#[command(author, version)]
pub struct MZThresholder {
    /// The paths to read spectra from, each run is processed independently.
    ///
    /// Input files may also be listed in a configuration file.
    #[arg()]
    pub input_files: Vec<PathBuf>,

    /// The path to write the peak table to, or if '-' is passed, write to STDOUT.
    ///
    /// The format is inferred from the extension unless `--format` is given, and
    /// a trailing `.gz` compresses the output.
    #[arg(short = 'o', long = "output-file", default_value = "-")]
    pub output_file: PathBuf,

    /// The format to write the peak table in
    #[arg(short = 'f', long = "format")]
    pub format: Option<OutputFormat>,

    /// The path to write a log file to, in addition to STDERR
    #[arg(short = 'l', long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// A TOML configuration file to read additional parameters from.
    ///
    /// Configurations are also read from `mzthresholder.toml` in the working directory.
    /// Environment variables prefixed with `MZTHRESHOLDER_` will be read too.
    #[arg(long = "config-file")]
    pub config_file: Option<PathBuf>,

    /// The number of threads to use, passing a value < 1 to use all available threads
    #[arg(
        short='t',
        long="threads",
        default_value_t=-1,
    )]
    pub threads: i32,

    /// The time range to process, denoted (start?)-(stop?)
    #[arg(
        short='r',
        long="time-range",
        value_parser=TimeRange::from_str,
        value_name="BEGIN-END",
        long_help=r#"The time range to process, denoted (start?)-(stop?)

If a start is not specified, processing begins from the start of the run.
If a stop is not specified, processing stops at the end of the run.
"#
    )]
    pub time_range: Option<TimeRange>,

    /// The MS level of the spectra to detect peaks in
    #[arg(short = 'L', long = "ms-level", default_value_t = 1)]
    pub ms_level: u8,

    /// The m/z width of the bins used to estimate chromatographic thresholds
    #[arg(short = 'b', long = "bin-width", default_value_t = 0.25, value_parser = positive_float_f64)]
    pub bin_width: f64,

    /// The intensity quantile of each m/z bin that candidates must reach, 0 disables the estimate
    #[arg(short = 'q', long = "threshold-quantile", default_value_t = 0.0, value_parser = fraction)]
    pub threshold_quantile: f64,

    /// The intensity floor below which signal is never considered
    #[arg(short = 'n', long = "noise-level", default_value_t = 4.0, value_parser = non_negative_float_f32)]
    pub noise_level: f32,

    /// The largest m/z difference between a trace and a candidate that may be connected
    #[arg(short = 'm', long = "mz-tolerance", default_value_t = 0.2, value_parser = positive_float_f64)]
    pub mz_tolerance: f64,

    /// The relative intensity change that counts as a rise or fall of a trace
    #[arg(short = 'i', long = "int-tolerance", default_value_t = 0.15, value_parser = fraction)]
    pub int_tolerance: f64,

    /// The narrowest m/z run that yields a candidate peak
    #[arg(long = "min-width", default_value_t = 0.0, value_parser = non_negative_float_f64)]
    pub min_width: f64,

    /// The widest m/z run accepted before it is split at a higher threshold
    #[arg(long = "max-width", default_value_t = 1.0, value_parser = positive_float_f64)]
    pub max_width: f64,

    /// The shortest retention time span a peak may cover
    #[arg(short = 'd', long = "min-peak-duration", default_value_t = 0.0, value_parser = non_negative_float_f64)]
    pub minimum_peak_duration: f64,

    /// The lowest apex intensity a peak may have
    #[arg(short = 'H', long = "min-peak-height", default_value_t = 15.0, value_parser = non_negative_float_f32)]
    pub minimum_peak_height: f32,
}

impl MZThresholder {
    /// Layer the configuration sources over these arguments, later sources taking
    /// precedence: the arguments themselves, `mzthresholder.toml`, `--config-file`,
    /// then `MZTHRESHOLDER_` environment variables.
    pub fn figment(&self) -> Figment {
        let mut config = Figment::new()
            .merge(Serialized::defaults(self))
            .merge(Toml::file("mzthresholder.toml"));
        if let Some(path) = self.config_file.as_ref() {
            config = config.merge(Toml::file_exact(path));
        }
        config.merge(Env::prefixed("MZTHRESHOLDER_"))
    }

    /// The fully layered configuration
    pub fn configured(&self) -> Result<Self, MZThresholderError> {
        Ok(self.figment().extract()?)
    }

    fn create_threadpool(&self) -> Result<rayon::ThreadPool, MZThresholderError> {
        let num_threads = if self.threads > 0 {
            self.threads as usize
        } else {
            thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
        };
        debug!("Using {} threads", num_threads);
        Ok(rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()?)
    }

    pub fn detection_params(&self) -> DetectionParams {
        DetectionParams::new(
            self.bin_width,
            self.threshold_quantile,
            self.noise_level,
            self.mz_tolerance,
            self.int_tolerance,
            self.min_width,
            self.max_width,
            self.minimum_peak_duration,
            self.minimum_peak_height,
        )
        .ms_level(self.ms_level)
    }

    /// Resolve the output format and whether to compress it
    pub fn output_format(&self) -> Result<(OutputFormat, bool), MZThresholderError> {
        let (inferred, compressed) = OutputFormat::infer_from_path(&self.output_file);
        match self.format.or(inferred) {
            Some(format) => Ok((format, compressed)),
            None => Err(MZThresholderError::OutputFormatUnknownOrNotSupportedError(
                self.output_file.display().to_string(),
            )),
        }
    }

    pub fn main(&self) -> Result<(), MZThresholderError> {
        info!(
            "mzthresholder v{}",
            option_env!("CARGO_PKG_VERSION").unwrap_or("unknown")
        );
        for path in self.input_files.iter() {
            info!("Input: {}", path.display());
        }
        info!("Output: {}", self.output_file.display());
        if tracing::enabled!(tracing::Level::DEBUG) {
            match toml::to_string_pretty(self) {
                Ok(text) => debug!("Effective configuration:\n{text}"),
                Err(e) => warn!("Failed to render the configuration: {e}"),
            }
        }
        if self.input_files.is_empty() {
            return Err(MZThresholderError::NoInputFiles);
        }

        let params = self.detection_params();
        params.validate()?;
        let (format, compressed) = self.output_format()?;
        debug!("Writing {format} output (compressed? {compressed})");

        let detector = RecursiveThresholdDetector::new(params)
            .map_err(|e| MZThresholderError::DetectionError("configuration".into(), e))?;

        let start = Instant::now();
        let runs = self
            .create_threadpool()?
            .install(|| self.process_all(&detector))?;

        let prog: ProgressRecord = runs.iter().map(|(_, p)| *p).sum();
        info!("Runs: {}", prog.runs);
        info!("Spectra Read: {} | Scans Used: {}", prog.spectra_read, prog.scans_used);
        info!("Peaks: {}", prog.peaks);

        let runs: Vec<RunPeaks> = runs.into_iter().map(|(run, _)| run).collect();
        self.write_output(format, compressed, &runs)?;

        let elapsed = Instant::now() - start;
        info!("Total Elapsed Time: {:0.3?}", elapsed);
        Ok(())
    }

    /// Detect peaks in every input in parallel. The first failure cancels the
    /// runs still in progress.
    fn process_all(
        &self,
        detector: &RecursiveThresholdDetector,
    ) -> Result<Vec<(RunPeaks, ProgressRecord)>, MZThresholderError> {
        let failed = AtomicBool::new(false);
        let results: Vec<_> = self
            .input_files
            .par_iter()
            .map(|path| {
                let result = self.process_run(detector, path, &failed);
                if result.is_err() {
                    failed.store(true, Ordering::SeqCst);
                }
                result
            })
            .collect();

        let mut runs = Vec::with_capacity(results.len());
        let mut first_error = None;
        for result in results {
            match result {
                Ok(run) => runs.push(run),
                Err(MZThresholderError::DetectionError(source, e)) if e.is_canceled() => {
                    warn!("Canceled detection for {source}")
                }
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(runs),
        }
    }

    fn process_run(
        &self,
        detector: &RecursiveThresholdDetector,
        path: &Path,
        cancel: &AtomicBool,
    ) -> Result<(RunPeaks, ProgressRecord), MZThresholderError> {
        let source = path.display().to_string();
        let started = Instant::now();
        let run = read_scans(path, self.ms_level, self.time_range)
            .map_err(|e| MZThresholderError::InputError(source.clone(), e))?;
        info!(
            "{source}: {} MS{} scans of {} spectra",
            run.scans.len(),
            self.ms_level,
            run.spectra_read
        );

        let mut progress = LogProgress::new(&source);
        let peaks = detector
            .detect_with(&run.scans, cancel, &mut progress)
            .map_err(|e| MZThresholderError::DetectionError(source.clone(), e))?;

        info!(
            "{source}: {} peaks in {:0.3?}",
            peaks.len(),
            Instant::now() - started
        );
        let prog = ProgressRecord {
            runs: 1,
            spectra_read: run.spectra_read,
            scans_used: run.scans.len(),
            peaks: peaks.len(),
        };
        Ok((RunPeaks { source, peaks }, prog))
    }

    fn write_output(
        &self,
        format: OutputFormat,
        compressed: bool,
        runs: &[RunPeaks],
    ) -> Result<(), MZThresholderError> {
        let sink = OutputSink::create(&self.output_file, compressed)?;
        let sink = match format {
            OutputFormat::Tsv | OutputFormat::Csv => write_table(sink, format.delimiter(), runs)?,
            OutputFormat::Json => write_json(sink, runs)?,
        };
        sink.finish()?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults_match_library() {
        let args = MZThresholder::parse_from(["mzthresholder", "run.mzML"]);
        assert_eq!(args.detection_params(), DetectionParams::default());
        assert_eq!(args.output_format().unwrap(), (OutputFormat::Tsv, false));
    }

    #[test]
    fn test_output_format() {
        let args = MZThresholder::parse_from(["mzthresholder", "run.mzML", "-o", "peaks.mgf"]);
        assert!(matches!(
            args.output_format(),
            Err(MZThresholderError::OutputFormatUnknownOrNotSupportedError(_))
        ));
        let args =
            MZThresholder::parse_from(["mzthresholder", "run.mzML", "-o", "peaks.out", "-f", "json"]);
        assert_eq!(args.output_format().unwrap(), (OutputFormat::Json, false));
    }
}
