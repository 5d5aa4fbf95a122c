use std::{num::ParseFloatError, ops::Range, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A retention time window in minutes, open-ended ranges use 0 and infinity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, time: f64) -> bool {
        self.start <= time && time <= self.end
    }

    /// Whether `time` falls after the end of the window
    pub fn is_past(&self, time: f64) -> bool {
        time > self.end
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        Self {
            start: 0.0,
            end: f64::INFINITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimeRangeParseError {
    #[error("Failed to parse time range start {0}")]
    MalformedStart(#[source] ParseFloatError),
    #[error("Failed to parse time range end {0}")]
    MalformedEnd(#[source] ParseFloatError),
}

impl FromStr for TimeRange {
    type Err = TimeRangeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let sep = [' ', ':', '-']
            .into_iter()
            .find(|c| s.contains(*c))
            .unwrap_or(' ');
        let mut tokens = s.splitn(2, sep).map(str::trim);
        let start_s = tokens.next().unwrap_or_default();
        let start = if start_s.is_empty() {
            0.0
        } else {
            start_s.parse().map_err(TimeRangeParseError::MalformedStart)?
        };
        let end_s = tokens.next().unwrap_or_default();
        let end = if end_s.is_empty() {
            f64::INFINITY
        } else {
            end_s.parse().map_err(TimeRangeParseError::MalformedEnd)?
        };
        Ok(TimeRange { start, end })
    }
}

impl From<Range<f64>> for TimeRange {
    fn from(value: Range<f64>) -> Self {
        Self::new(value.start, value.end)
    }
}

impl From<(f64, f64)> for TimeRange {
    fn from(value: (f64, f64)) -> Self {
        Self::new(value.0, value.1)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_time_fromstr() -> Result<(), TimeRangeParseError> {
        let t: TimeRange = "52.0-".parse()?;
        assert_eq!(t.start, 52.0);
        assert_eq!(t.end, f64::INFINITY);

        let t: TimeRange = "-52.0".parse()?;
        assert_eq!(t.start, 0.0);
        assert_eq!(t.end, 52.0);

        let t: TimeRange = "32-52.0".parse()?;
        assert_eq!(t, TimeRange::from(32.0..52.0));

        let t: TimeRange = "32:52.0".parse()?;
        assert_eq!(t, TimeRange::from((32.0, 52.0)));

        let t: TimeRange = "-".parse()?;
        assert_eq!(t, TimeRange::default());

        let t: TimeRange = "12".parse()?;
        assert_eq!(t.start, 12.0);
        assert_eq!(t.end, f64::INFINITY);
        Ok(())
    }

    #[test]
    fn test_time_fromstr_malformed() {
        assert!(matches!(
            "a-".parse::<TimeRange>(),
            Err(TimeRangeParseError::MalformedStart(_))
        ));
        assert!(matches!(
            "-b".parse::<TimeRange>(),
            Err(TimeRangeParseError::MalformedEnd(_))
        ));
        // Both ends are bad, the start is reported first
        let err = "a-b".parse::<TimeRange>().unwrap_err();
        assert!(matches!(err, TimeRangeParseError::MalformedStart(_)));
        assert!(err.to_string().starts_with("Failed to parse time range start"));
    }

    #[test]
    fn test_contains() {
        let t = TimeRange::new(1.0, 2.0);
        assert!(t.contains(1.0));
        assert!(t.contains(2.0));
        assert!(!t.contains(0.5));
        assert!(t.is_past(2.5));
        assert!(!t.is_past(0.5));
    }
}
