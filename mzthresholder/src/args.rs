use std::fmt::Display;
use std::path::Path;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// The table formats peaks can be written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    /// Tab-separated values, one row per peak
    Tsv,
    /// Comma-separated values, one row per peak
    Csv,
    /// A JSON document holding each run's peaks with their points
    Json,
}

impl OutputFormat {
    fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "tsv" | "txt" | "tab" => Some(Self::Tsv),
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Infer the format of an output path and whether it should be gzip compressed.
    ///
    /// `-` means STDOUT, which is never compressed and defaults to TSV.
    pub fn infer_from_path(path: &Path) -> (Option<Self>, bool) {
        if path == Path::new("-") {
            return (Some(Self::Tsv), false);
        }
        let compressed = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"));
        let inner = if compressed {
            path.file_stem().map(Path::new)
        } else {
            Some(path)
        };
        let format = inner
            .and_then(|p| p.extension())
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension);
        (format, compressed)
    }

    pub fn delimiter(&self) -> u8 {
        match self {
            Self::Csv => b',',
            _ => b'\t',
        }
    }
}

impl Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub(crate) fn non_negative_float_f32(s: &str) -> Result<f32, String> {
    let value = s.parse::<f32>().map_err(|e| e.to_string())?;
    if value < 0.0 {
        Err(format!("`{s}` is less than zero"))
    } else {
        Ok(value)
    }
}

pub(crate) fn non_negative_float_f64(s: &str) -> Result<f64, String> {
    let value = s.parse::<f64>().map_err(|e| e.to_string())?;
    if value < 0.0 {
        Err(format!("`{s}` is less than zero"))
    } else {
        Ok(value)
    }
}

pub(crate) fn positive_float_f64(s: &str) -> Result<f64, String> {
    let value = s.parse::<f64>().map_err(|e| e.to_string())?;
    if value <= 0.0 || !value.is_finite() {
        Err(format!("`{s}` must be a positive number"))
    } else {
        Ok(value)
    }
}

pub(crate) fn fraction(s: &str) -> Result<f64, String> {
    let value = s.parse::<f64>().map_err(|e| e.to_string())?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("`{s}` is not between 0 and 1"))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_infer_format() {
        assert_eq!(
            OutputFormat::infer_from_path(Path::new("-")),
            (Some(OutputFormat::Tsv), false)
        );
        assert_eq!(
            OutputFormat::infer_from_path(Path::new("out/peaks.csv")),
            (Some(OutputFormat::Csv), false)
        );
        assert_eq!(
            OutputFormat::infer_from_path(Path::new("peaks.JSON.gz")),
            (Some(OutputFormat::Json), true)
        );
        assert_eq!(
            OutputFormat::infer_from_path(Path::new("peaks.tsv.gz")),
            (Some(OutputFormat::Tsv), true)
        );
        assert_eq!(
            OutputFormat::infer_from_path(Path::new("peaks.mzML")),
            (None, false)
        );
    }

    #[test]
    fn test_value_parsers() {
        assert_eq!(fraction("0.25"), Ok(0.25));
        assert!(fraction("1.5").is_err());
        assert!(positive_float_f64("0").is_err());
        assert_eq!(non_negative_float_f64("0"), Ok(0.0));
        assert!(non_negative_float_f32("-1").is_err());
    }
}
