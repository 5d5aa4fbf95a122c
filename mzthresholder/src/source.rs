use std::io;
use std::path::Path;

use itertools::Itertools;
use mzdata::prelude::*;
use mzdata::spectrum::MultiLayerSpectrum;
use mzdata::MZReader;
use tracing::debug;

use mzthreshold::Scan;

use crate::time_range::TimeRange;

/// The scans of one input file selected for detection
#[derive(Debug, Default, Clone)]
pub struct RunScans {
    pub scans: Vec<Scan>,
    /// The number of spectra read from the file, including those not selected
    pub spectra_read: usize,
}

/// Convert a spectrum into a scan with its points in ascending m/z order
pub fn scan_from_spectrum(spectrum: &MultiLayerSpectrum) -> Scan {
    let (mzs, intensities): (Vec<f64>, Vec<f32>) = spectrum
        .peaks()
        .iter()
        .map(|p| (p.mz, p.intensity))
        .sorted_by(|a, b| a.0.total_cmp(&b.0))
        .unzip();
    Scan::new(
        spectrum.index(),
        spectrum.start_time(),
        spectrum.ms_level(),
        mzs,
        intensities,
    )
}

/// Collect the spectra at `ms_level` within `time_range`, stopping at the first
/// spectrum past the end of the range.
pub fn collect_scans<I>(spectra: I, ms_level: u8, time_range: Option<TimeRange>) -> RunScans
where
    I: IntoIterator<Item = MultiLayerSpectrum>,
{
    let time_range = time_range.unwrap_or_default();
    let mut run = RunScans::default();
    for spectrum in spectra {
        run.spectra_read += 1;
        let time = spectrum.start_time();
        if time_range.is_past(time) {
            break;
        }
        if spectrum.ms_level() != ms_level || !time_range.contains(time) {
            continue;
        }
        run.scans.push(scan_from_spectrum(&spectrum));
    }
    run
}

/// Open a supported mass spectrometry file and read its selected scans
pub fn read_scans(path: &Path, ms_level: u8, time_range: Option<TimeRange>) -> io::Result<RunScans> {
    let reader = MZReader::open_path(path)?;
    let run = collect_scans(reader, ms_level, time_range);
    debug!(
        "Read {} spectra from {}, kept {} MS{ms_level} scans",
        run.spectra_read,
        path.display(),
        run.scans.len()
    );
    Ok(run)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_read_scans() -> io::Result<()> {
        let path = Path::new("tests/data/small_run.mgf");
        let run = read_scans(path, 2, None)?;
        assert_eq!(run.spectra_read, 4);
        assert_eq!(run.scans.len(), 4);
        assert_eq!(run.scans[0].mzs, vec![100.0, 250.0]);
        assert_eq!(run.scans[0].intensities, vec![10.0, 5.0]);
        assert!(run.scans.iter().all(|s| s.validate().is_ok()));

        let run = read_scans(path, 1, None)?;
        assert!(run.scans.is_empty());

        // The spectrum at 3 minutes ends the read
        let run = read_scans(path, 2, Some(TimeRange::new(1.5, 2.5)))?;
        assert_eq!(run.spectra_read, 3);
        assert_eq!(run.scans.len(), 1);
        assert!((run.scans[0].time - 2.0).abs() < 1e-9);
        Ok(())
    }
}
