//! Scoring and greedy assignment of single-scan candidates to active traces.
use mzpeaks::{prelude::*, MZ};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::trace::{Trace, TraceArena, TraceId, TracePoint};

/// A local intensity maximum found in one scan
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CandidatePeak {
    pub scan_index: usize,
    pub point_index: usize,
    pub mz: f64,
    pub intensity: f32,
    pub connected: bool,
}

impl CandidatePeak {
    pub fn new(scan_index: usize, point_index: usize, mz: f64, intensity: f32) -> Self {
        Self {
            scan_index,
            point_index,
            mz,
            intensity,
            connected: false,
        }
    }
}

impl PartialOrd for CandidatePeak {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        match self.mz.partial_cmp(&other.mz) {
            Some(std::cmp::Ordering::Equal) => self.intensity.partial_cmp(&other.intensity),
            ord => ord,
        }
    }
}

impl CoordinateLike<MZ> for CandidatePeak {
    fn coordinate(&self) -> f64 {
        self.mz
    }
}

impl IntensityMeasurement for CandidatePeak {
    fn intensity(&self) -> f32 {
        self.intensity
    }
}

/// A possible pairing of a trace with a candidate from the current scan
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchCandidate {
    pub trace: TraceId,
    /// The position of the candidate in the current scan's candidate list
    pub candidate: usize,
    pub score: f64,
}

impl MatchCandidate {
    fn order(&self, other: &Self) -> std::cmp::Ordering {
        self.score
            .total_cmp(&other.score)
            .then(self.candidate.cmp(&other.candidate))
            .then(self.trace.cmp(&other.trace))
    }
}

/// Extends active traces with the candidates of the next scan.
///
/// Every trace and every candidate takes part in at most one connection per
/// scan. Pairs are considered from best to worst score, with ties broken by
/// candidate position and then by trace id.
#[derive(Debug, Default, Clone)]
pub struct TraceMatcher {
    pub mz_tolerance: f64,
    pub int_tolerance: f64,
    matches: Vec<MatchCandidate>,
}

impl TraceMatcher {
    pub fn new(mz_tolerance: f64, int_tolerance: f64) -> Self {
        Self {
            mz_tolerance,
            int_tolerance,
            matches: Vec::new(),
        }
    }

    /// Score extending `trace` with `candidate`. Lower is better, `None` means the
    /// pair may not be connected at all.
    ///
    /// The candidate must lie within the m/z tolerance of both the trace's
    /// predicted m/z and its most recent point.
    pub fn score(&self, trace: &Trace, candidate: &CandidatePeak) -> Option<f64> {
        let mz_delta = (trace.predicted_mz() - candidate.mz).abs();
        if mz_delta > self.mz_tolerance {
            return None;
        }
        let last = trace.last()?;
        if (last.mz - candidate.mz).abs() > self.mz_tolerance {
            return None;
        }
        let shape_delta = trace.shape_penalty(candidate.intensity, self.int_tolerance)?;
        Some(mz_delta.hypot(shape_delta))
    }

    /// Collect every finite-score pairing between the live traces and `candidates`, best first.
    ///
    /// `candidates` must be sorted by m/z.
    pub fn score_all(&mut self, arena: &TraceArena, candidates: &[CandidatePeak]) -> &[MatchCandidate] {
        self.matches.clear();
        for id in arena.ids() {
            let Some(trace) = arena.get(id) else {
                continue;
            };
            let predicted = trace.predicted_mz();
            // Same comparison as `score`, so the window never drops a pair it would accept
            let lo = candidates.partition_point(|c| predicted - c.mz > self.mz_tolerance);
            for (offset, candidate) in candidates[lo..].iter().enumerate() {
                if candidate.mz - predicted > self.mz_tolerance {
                    break;
                }
                if let Some(score) = self.score(trace, candidate) {
                    self.matches.push(MatchCandidate {
                        trace: id,
                        candidate: lo + offset,
                        score,
                    });
                }
            }
        }
        self.matches.sort_by(|a, b| a.order(b));
        &self.matches
    }

    /// Greedily connect candidates of the scan acquired at `time` to traces, marking
    /// both sides as consumed. Returns the number of connections made.
    pub fn connect(&mut self, arena: &mut TraceArena, candidates: &mut [CandidatePeak], time: f64) -> usize {
        self.score_all(arena, candidates);
        let mut n_connected = 0;
        for m in self.matches.iter() {
            let candidate = &mut candidates[m.candidate];
            if candidate.connected {
                continue;
            }
            let Some(trace) = arena.get_mut(m.trace) else {
                continue;
            };
            if trace.growing {
                continue;
            }
            trace.push(
                TracePoint::new(candidate.scan_index, time, candidate.mz, candidate.intensity),
                self.int_tolerance,
            );
            trace.growing = true;
            candidate.connected = true;
            n_connected += 1;
        }
        trace!(
            "Connected {n_connected} of {} candidates from {} pairs",
            candidates.len(),
            self.matches.len()
        );
        n_connected
    }

    /// Start a new trace for every candidate that was not connected. Returns the
    /// number of traces spawned.
    pub fn spawn_unconnected(&self, arena: &mut TraceArena, candidates: &[CandidatePeak], time: f64) -> usize {
        let mut n_spawned = 0;
        for candidate in candidates.iter().filter(|c| !c.connected) {
            arena.spawn(TracePoint::new(
                candidate.scan_index,
                time,
                candidate.mz,
                candidate.intensity,
            ));
            n_spawned += 1;
        }
        n_spawned
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn candidates(scan_index: usize, points: &[(f64, f32)]) -> Vec<CandidatePeak> {
        points
            .iter()
            .enumerate()
            .map(|(i, (mz, inten))| CandidatePeak::new(scan_index, i, *mz, *inten))
            .collect()
    }

    #[test]
    fn test_score() {
        let matcher = TraceMatcher::new(0.05, 0.1);
        let trace = Trace::new(TraceId(0), TracePoint::new(0, 0.0, 100.0, 50.0));
        let c = CandidatePeak::new(1, 0, 100.03, 80.0);
        assert!((matcher.score(&trace, &c).unwrap() - 0.03).abs() < 1e-9);
        let c = CandidatePeak::new(1, 0, 100.06, 80.0);
        assert_eq!(matcher.score(&trace, &c), None);
        let c = CandidatePeak::new(1, 0, 100.0, 10.0);
        assert_eq!(matcher.score(&trace, &c), None);
        assert_eq!(c.coordinate(), 100.0);
        assert_eq!(c.intensity(), 10.0);
    }

    #[test]
    fn test_greedy_assignment() {
        let mut arena = TraceArena::new();
        let a = arena.spawn(TracePoint::new(0, 0.0, 100.00, 50.0));
        let b = arena.spawn(TracePoint::new(0, 0.0, 100.04, 50.0));
        let mut matcher = TraceMatcher::new(0.05, 0.1);

        // Both traces prefer the candidate at 100.01, only one may have it
        let mut found = candidates(1, &[(100.01, 60.0), (100.30, 60.0)]);
        let pairs = matcher.score_all(&arena, &found).to_vec();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].trace, a);

        let n = matcher.connect(&mut arena, &mut found, 1.0);
        assert_eq!(n, 1);
        assert!(found[0].connected);
        assert!(!found[1].connected);
        assert_eq!(arena.get(a).unwrap().len(), 2);
        assert_eq!(arena.get(b).unwrap().len(), 1);

        let closed = arena.take_closing();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].id(), b);

        assert_eq!(matcher.spawn_unconnected(&mut arena, &found, 1.0), 1);
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_score_bounds_step_from_last_point() {
        let matcher = TraceMatcher::new(0.015, 0.1);
        let mut trace = Trace::new(TraceId(0), TracePoint::new(0, 0.0, 100.00, 10.0));
        for (i, mz) in [100.00, 100.00, 100.01].into_iter().enumerate() {
            trace.push(TracePoint::new(i + 1, i as f64 + 1.0, mz, 20.0 + i as f32), 0.1);
        }
        assert_eq!(trace.predicted_mz(), 100.0);
        // Within tolerance of the median but 0.02 away from the last point
        let c = CandidatePeak::new(4, 0, 99.99, 40.0);
        assert_eq!(matcher.score(&trace, &c), None);
        let c = CandidatePeak::new(4, 0, 100.005, 40.0);
        assert!(matcher.score(&trace, &c).is_some());
    }

    #[test]
    fn test_window_edges_match_score() {
        // Candidates sit exactly at the tolerance, where rounding decides the outcome
        let mz_tolerance = 0.1;
        let mut matcher = TraceMatcher::new(mz_tolerance, 0.1);
        for predicted in [0.2, 100.2, 733.37, 1999.9] {
            let mut arena = TraceArena::new();
            let id = arena.spawn(TracePoint::new(0, 0.0, predicted, 50.0));
            let found = candidates(1, &[(predicted - mz_tolerance, 60.0), (predicted + mz_tolerance, 60.0)]);
            let trace = arena.get(id).unwrap();
            let accepted = found.iter().filter(|c| matcher.score(trace, c).is_some()).count();
            assert_eq!(matcher.score_all(&arena, &found).len(), accepted);
        }
    }

    #[test]
    fn test_tie_break() {
        let mut arena = TraceArena::new();
        let a = arena.spawn(TracePoint::new(0, 0.0, 100.0, 50.0));
        let b = arena.spawn(TracePoint::new(0, 0.0, 100.0, 50.0));
        let mut matcher = TraceMatcher::new(0.05, 0.1);
        let mut found = candidates(1, &[(100.0, 60.0)]);
        matcher.connect(&mut arena, &mut found, 1.0);
        assert!(arena.get(a).unwrap().is_growing());
        assert!(!arena.get(b).unwrap().is_growing());
    }
}
