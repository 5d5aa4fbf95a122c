//! The input data model: individual scans and the sources that supply them.
use thiserror::Error;

/// A problem with the scan data itself, detected before the scan is used.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    #[error("Scan {scan_index} has {mz_len} m/z values but {intensity_len} intensity values")]
    MismatchedArrays {
        scan_index: usize,
        mz_len: usize,
        intensity_len: usize,
    },
    #[error("Scan {scan_index} is not sorted by m/z at point {point_index}")]
    UnsortedMasses {
        scan_index: usize,
        point_index: usize,
    },
    #[error("Scan {scan_index} has a non-finite or negative value at point {point_index}")]
    NonFiniteValue {
        scan_index: usize,
        point_index: usize,
    },
    #[error("Scan {scan_index} at time {time} arrived after scan {previous_index} at time {previous_time}")]
    ScanOutOfOrder {
        scan_index: usize,
        time: f64,
        previous_index: usize,
        previous_time: f64,
    },
}

/// A single mass spectrum acquired at one retention time.
///
/// The m/z and intensity arrays are parallel and must be sorted by m/z.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Scan {
    pub index: usize,
    pub time: f64,
    pub ms_level: u8,
    pub mzs: Vec<f64>,
    pub intensities: Vec<f32>,
}

impl Scan {
    pub fn new(index: usize, time: f64, ms_level: u8, mzs: Vec<f64>, intensities: Vec<f32>) -> Self {
        Self {
            index,
            time,
            ms_level,
            mzs,
            intensities,
        }
    }

    /// Build an MS1 scan from `(m/z, intensity)` pairs, which are assumed to be in m/z order.
    pub fn from_pairs<I: IntoIterator<Item = (f64, f32)>>(index: usize, time: f64, pairs: I) -> Self {
        let (mzs, intensities) = pairs.into_iter().unzip();
        Self::new(index, time, 1, mzs, intensities)
    }

    pub fn len(&self) -> usize {
        self.mzs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mzs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, f32)> + '_ {
        self.mzs.iter().copied().zip(self.intensities.iter().copied())
    }

    /// The smallest and largest m/z in the scan, if it has any points
    pub fn mz_range(&self) -> Option<(f64, f64)> {
        match (self.mzs.first(), self.mzs.last()) {
            (Some(lo), Some(hi)) => Some((*lo, *hi)),
            _ => None,
        }
    }

    /// Check the invariants the detector relies upon.
    pub fn validate(&self) -> Result<(), DataError> {
        if self.mzs.len() != self.intensities.len() {
            return Err(DataError::MismatchedArrays {
                scan_index: self.index,
                mz_len: self.mzs.len(),
                intensity_len: self.intensities.len(),
            });
        }
        let mut last_mz = f64::NEG_INFINITY;
        for (i, (mz, inten)) in self.iter().enumerate() {
            if !mz.is_finite() || !inten.is_finite() || inten < 0.0 {
                return Err(DataError::NonFiniteValue {
                    scan_index: self.index,
                    point_index: i,
                });
            }
            if mz < last_mz {
                return Err(DataError::UnsortedMasses {
                    scan_index: self.index,
                    point_index: i,
                });
            }
            last_mz = mz;
        }
        Ok(())
    }
}

/// Supplies the scans of one run in increasing retention time order.
pub trait ScanSource {
    /// Iterate over the scans with the requested MS level, in acquisition order
    fn scans_at_level(&self, ms_level: u8) -> impl Iterator<Item = &Scan>;

    /// The number of scans with the requested MS level
    fn scan_count(&self, ms_level: u8) -> usize {
        self.scans_at_level(ms_level).count()
    }

    /// The m/z range spanned by all scans with the requested MS level, or `None`
    /// if none of them have any points.
    fn mz_range(&self, ms_level: u8) -> Option<(f64, f64)> {
        self.scans_at_level(ms_level)
            .filter_map(|s| s.mz_range())
            .fold(None, |acc, (lo, hi)| match acc {
                Some((a, b)) => Some((lo.min(a), hi.max(b))),
                None => Some((lo, hi)),
            })
    }
}

impl ScanSource for [Scan] {
    fn scans_at_level(&self, ms_level: u8) -> impl Iterator<Item = &Scan> {
        self.iter().filter(move |s| s.ms_level == ms_level)
    }
}

impl ScanSource for Vec<Scan> {
    fn scans_at_level(&self, ms_level: u8) -> impl Iterator<Item = &Scan> {
        self.as_slice().scans_at_level(ms_level)
    }
}

/// Tracks the ordering of scans as they are consumed from a [`ScanSource`]
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct ScanOrderGuard {
    last: Option<(usize, f64)>,
}

impl ScanOrderGuard {
    pub(crate) fn check(&mut self, scan: &Scan) -> Result<(), DataError> {
        scan.validate()?;
        if let Some((previous_index, previous_time)) = self.last {
            if scan.index <= previous_index || scan.time < previous_time || scan.time.is_nan() {
                return Err(DataError::ScanOutOfOrder {
                    scan_index: scan.index,
                    time: scan.time,
                    previous_index,
                    previous_time,
                });
            }
        } else if scan.time.is_nan() {
            return Err(DataError::ScanOutOfOrder {
                scan_index: scan.index,
                time: scan.time,
                previous_index: scan.index,
                previous_time: f64::NAN,
            });
        }
        self.last = Some((scan.index, scan.time));
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_validate() {
        let scan = Scan::from_pairs(0, 1.0, [(100.0, 5.0), (100.5, 3.0)]);
        assert!(scan.validate().is_ok());

        let scan = Scan::new(1, 1.0, 1, vec![100.0, 101.0], vec![1.0]);
        assert!(matches!(
            scan.validate(),
            Err(DataError::MismatchedArrays { mz_len: 2, intensity_len: 1, .. })
        ));

        let scan = Scan::from_pairs(2, 1.0, [(101.0, 5.0), (100.5, 3.0)]);
        assert_eq!(
            scan.validate(),
            Err(DataError::UnsortedMasses {
                scan_index: 2,
                point_index: 1
            })
        );

        let scan = Scan::from_pairs(3, 1.0, [(101.0, f32::NAN)]);
        assert!(matches!(scan.validate(), Err(DataError::NonFiniteValue { .. })));
    }

    #[test]
    fn test_source_filtering() {
        let mut scans = vec![
            Scan::from_pairs(0, 0.1, [(200.0, 5.0), (300.0, 1.0)]),
            Scan::from_pairs(1, 0.2, [(50.0, 5.0)]),
            Scan::from_pairs(2, 0.3, []),
        ];
        scans[1].ms_level = 2;
        assert_eq!(scans.scan_count(1), 2);
        assert_eq!(scans.scan_count(2), 1);
        assert_eq!(scans.mz_range(1), Some((200.0, 300.0)));
        assert_eq!(scans.mz_range(2), Some((50.0, 50.0)));
        assert_eq!(scans.mz_range(3), None);
    }

    #[test]
    fn test_order_guard() {
        let mut guard = ScanOrderGuard::default();
        assert!(guard.check(&Scan::from_pairs(0, 0.5, [])).is_ok());
        assert!(guard.check(&Scan::from_pairs(1, 0.5, [])).is_ok());
        assert!(matches!(
            guard.check(&Scan::from_pairs(2, 0.4, [])),
            Err(DataError::ScanOutOfOrder { scan_index: 2, previous_index: 1, .. })
        ));
        assert!(guard.check(&Scan::from_pairs(1, 0.9, [])).is_err());
    }
}
