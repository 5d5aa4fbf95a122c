use std::fs;
use std::io::{self, Write};
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use mzthreshold::{Peak, PeakList};

use crate::args::OutputFormat;

/// The peaks detected in one input file
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunPeaks {
    pub source: String,
    pub peaks: PeakList,
}

/// One flattened row of a peak table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeakRecord<'a> {
    pub source: &'a str,
    pub id: usize,
    pub mz: f64,
    pub time: f64,
    pub height: f32,
    pub area: f64,
    pub apex_scan_index: usize,
    pub mz_start: f64,
    pub mz_end: f64,
    pub time_start: f64,
    pub time_end: f64,
    pub intensity_start: f32,
    pub intensity_end: f32,
    pub n_points: usize,
}

impl<'a> PeakRecord<'a> {
    pub fn new(source: &'a str, peak: &Peak) -> Self {
        Self {
            source,
            id: peak.id,
            mz: peak.mz,
            time: peak.time,
            height: peak.height,
            area: peak.area,
            apex_scan_index: peak.apex_scan_index,
            mz_start: peak.mz_range.start,
            mz_end: peak.mz_range.end,
            time_start: peak.time_range.start,
            time_end: peak.time_range.end,
            intensity_start: peak.intensity_range.start,
            intensity_end: peak.intensity_range.end,
            n_points: peak.len(),
        }
    }
}

/// A plain or gzip compressed output stream
pub enum OutputSink {
    Plain(Box<dyn Write>),
    Gzip(GzEncoder<Box<dyn Write>>),
}

impl OutputSink {
    /// Open `path` for writing, with `-` meaning STDOUT
    pub fn create(path: &Path, compressed: bool) -> io::Result<Self> {
        let handle: Box<dyn Write> = if path == Path::new("-") {
            Box::new(io::BufWriter::new(io::stdout()))
        } else {
            Box::new(io::BufWriter::new(fs::File::create(path)?))
        };
        if compressed {
            Ok(Self::Gzip(GzEncoder::new(handle, Compression::best())))
        } else {
            Ok(Self::Plain(handle))
        }
    }

    /// Flush all buffered output, writing the gzip trailer if there is one
    pub fn finish(self) -> io::Result<()> {
        match self {
            Self::Plain(mut handle) => handle.flush(),
            Self::Gzip(encoder) => encoder.finish()?.flush(),
        }
    }
}

impl Write for OutputSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(handle) => handle.write(buf),
            Self::Gzip(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(handle) => handle.flush(),
            Self::Gzip(encoder) => encoder.flush(),
        }
    }
}

/// Write one row per peak as delimited text, returning the writer once it is flushed
pub fn write_table<W: Write>(writer: W, delimiter: u8, runs: &[RunPeaks]) -> Result<W, csv::Error> {
    let mut table = csv::WriterBuilder::default()
        .has_headers(true)
        .delimiter(delimiter)
        .from_writer(writer);
    for run in runs {
        for peak in run.peaks.iter() {
            table.serialize(PeakRecord::new(&run.source, peak))?;
        }
    }
    table.flush()?;
    table.into_inner().map_err(|e| e.into_error().into())
}

/// Write every run with its full peak records as one JSON document
pub fn write_json<W: Write>(mut writer: W, runs: &[RunPeaks]) -> Result<W, serde_json::Error> {
    serde_json::to_writer_pretty(&mut writer, runs)?;
    writer.write_all(b"\n").map_err(serde_json::Error::io)?;
    Ok(writer)
}
