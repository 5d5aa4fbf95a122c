//! Chromatographic traces under construction and the arena that owns them.
use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;

use identity_hash::{BuildIdentityHasher, IdentityHashable};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A stable handle to a [`Trace`] held in a [`TraceArena`]. Ids are handed out
/// in spawn order and never reused within a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TraceId(pub usize);

impl Hash for TraceId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_usize(self.0);
    }
}

impl IdentityHashable for TraceId {}

impl Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One scan's contribution to a trace
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TracePoint {
    pub scan_index: usize,
    pub time: f64,
    pub mz: f64,
    pub intensity: f32,
}

impl TracePoint {
    pub fn new(scan_index: usize, time: f64, mz: f64, intensity: f32) -> Self {
        Self {
            scan_index,
            time,
            mz,
            intensity,
        }
    }
}

/// The direction a trace's intensity profile has taken so far.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trend {
    /// Still rising, or has not yet fallen by more than the tolerance
    #[default]
    Ascending,
    /// Has passed its apex and is falling
    Descending,
    /// Rose again after it started falling
    Broken,
}

impl Trend {
    fn next(self, previous: f32, current: f32, int_tolerance: f64) -> Self {
        let (previous, current) = (previous as f64, current as f64);
        match self {
            Self::Ascending if current <= previous * (1.0 - int_tolerance) => Self::Descending,
            Self::Descending if current >= previous * (1.0 + int_tolerance) => Self::Broken,
            _ => self,
        }
    }
}

/// A chromatographic peak being assembled scan by scan.
///
/// The points are kept in acquisition order. The median m/z and the intensity
/// trend are maintained as points are added so matching never needs to
/// revisit the full history.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    id: TraceId,
    points: Vec<TracePoint>,
    sorted_mzs: Vec<f64>,
    trend: Trend,
    pub(crate) growing: bool,
}

impl Trace {
    pub fn new(id: TraceId, point: TracePoint) -> Self {
        Self {
            id,
            points: vec![point],
            sorted_mzs: vec![point.mz],
            trend: Trend::Ascending,
            growing: false,
        }
    }

    pub fn id(&self) -> TraceId {
        self.id
    }

    pub fn points(&self) -> &[TracePoint] {
        &self.points
    }

    pub fn into_points(self) -> Vec<TracePoint> {
        self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last(&self) -> Option<&TracePoint> {
        self.points.last()
    }

    pub fn trend(&self) -> Trend {
        self.trend
    }

    pub fn is_growing(&self) -> bool {
        self.growing
    }

    /// The median m/z of the trace, used to predict where the next point will fall
    pub fn predicted_mz(&self) -> f64 {
        let n = self.sorted_mzs.len();
        if n == 0 {
            return 0.0;
        }
        let mid = n / 2;
        if n % 2 == 1 {
            self.sorted_mzs[mid]
        } else {
            (self.sorted_mzs[mid - 1] + self.sorted_mzs[mid]) / 2.0
        }
    }

    /// The shape contribution to the match score for extending this trace with a
    /// point of the given intensity, or `None` if the point would contradict the
    /// trace's trend.
    pub fn shape_penalty(&self, intensity: f32, int_tolerance: f64) -> Option<f64> {
        let last = self.points.last()?;
        let (previous, next) = (last.intensity as f64, intensity as f64);
        if self.points.len() == 1 {
            if next >= previous || next > previous * (1.0 - int_tolerance) {
                return Some(0.0);
            }
            return None;
        }
        match self.trend {
            Trend::Ascending => Some(0.0),
            Trend::Descending => {
                if next >= previous * (1.0 + int_tolerance) {
                    None
                } else {
                    Some(0.0)
                }
            }
            Trend::Broken => None,
        }
    }

    /// Append a point from a later scan, updating the cached median and trend
    pub(crate) fn push(&mut self, point: TracePoint, int_tolerance: f64) {
        if let Some(last) = self.points.last() {
            debug_assert!(
                last.scan_index < point.scan_index,
                "trace {} extended out of scan order",
                self.id
            );
            self.trend = self.trend.next(last.intensity, point.intensity, int_tolerance);
        }
        let i = self.sorted_mzs.partition_point(|mz| *mz < point.mz);
        self.sorted_mzs.insert(i, point.mz);
        self.points.push(point);
    }
}

/// Index-stable storage for the traces of one run.
#[derive(Debug, Default, Clone)]
pub struct TraceArena {
    traces: HashMap<TraceId, Trace, BuildIdentityHasher<TraceId>>,
    next_id: usize,
}

impl TraceArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    /// Start a new single-point trace, returning its id
    pub fn spawn(&mut self, point: TracePoint) -> TraceId {
        let id = TraceId(self.next_id);
        self.next_id += 1;
        self.traces.insert(id, Trace::new(id, point));
        id
    }

    pub fn get(&self, id: TraceId) -> Option<&Trace> {
        self.traces.get(&id)
    }

    pub fn get_mut(&mut self, id: TraceId) -> Option<&mut Trace> {
        self.traces.get_mut(&id)
    }

    /// The ids of all live traces in ascending order
    pub fn ids(&self) -> Vec<TraceId> {
        let mut ids: Vec<_> = self.traces.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = &Trace> {
        self.traces.values()
    }

    /// Remove every trace that was not extended in the current scan, returning them
    /// in ascending id order. The traces that remain have their growing flag cleared.
    pub fn take_closing(&mut self) -> Vec<Trace> {
        let closing: Vec<TraceId> = self
            .traces
            .values()
            .filter(|t| !t.growing)
            .map(|t| t.id)
            .collect();
        let mut closed: Vec<Trace> = closing
            .into_iter()
            .filter_map(|id| self.traces.remove(&id))
            .collect();
        closed.sort_unstable_by_key(|t| t.id);
        for trace in self.traces.values_mut() {
            trace.growing = false;
        }
        closed
    }

    /// Remove all remaining traces in ascending id order
    pub fn drain(&mut self) -> Vec<Trace> {
        let mut traces: Vec<_> = self.traces.drain().map(|(_, t)| t).collect();
        traces.sort_unstable_by_key(|t| t.id);
        traces
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn point(scan_index: usize, mz: f64, intensity: f32) -> TracePoint {
        TracePoint::new(scan_index, scan_index as f64, mz, intensity)
    }

    fn build(intensities: &[f32], tol: f64) -> Trace {
        let mut trace = Trace::new(TraceId(0), point(0, 100.0, intensities[0]));
        for (i, v) in intensities.iter().enumerate().skip(1) {
            trace.push(point(i, 100.0, *v), tol);
        }
        trace
    }

    #[test]
    fn test_median() {
        let mut trace = Trace::new(TraceId(0), point(0, 100.3, 1.0));
        assert_eq!(trace.predicted_mz(), 100.3);
        trace.push(point(1, 100.1, 1.0), 0.1);
        assert!((trace.predicted_mz() - 100.2).abs() < 1e-9);
        trace.push(point(2, 100.2, 1.0), 0.1);
        assert_eq!(trace.predicted_mz(), 100.2);
        assert_eq!(trace.len(), 3);
    }

    #[test]
    fn test_single_point_shape() {
        let trace = build(&[100.0], 0.1);
        assert_eq!(trace.shape_penalty(150.0, 0.1), Some(0.0));
        assert_eq!(trace.shape_penalty(95.0, 0.1), Some(0.0));
        assert_eq!(trace.shape_penalty(80.0, 0.1), None);
        assert_eq!(trace.shape_penalty(10.0, 0.1), None);
    }

    #[test]
    fn test_trend() {
        let trace = build(&[10.0, 50.0, 100.0], 0.1);
        assert_eq!(trace.trend(), Trend::Ascending);
        // An ascending trace is allowed to turn over by any amount
        assert_eq!(trace.shape_penalty(5.0, 0.1), Some(0.0));

        let trace = build(&[10.0, 100.0, 40.0], 0.1);
        assert_eq!(trace.trend(), Trend::Descending);
        assert_eq!(trace.shape_penalty(20.0, 0.1), Some(0.0));
        assert_eq!(trace.shape_penalty(42.0, 0.1), Some(0.0));
        assert_eq!(trace.shape_penalty(45.0, 0.1), None);

        let trace = build(&[10.0, 100.0, 40.0, 80.0], 0.1);
        assert_eq!(trace.trend(), Trend::Broken);
        assert_eq!(trace.shape_penalty(1.0, 0.1), None);
    }

    #[test]
    fn test_arena_partitioning() {
        let mut arena = TraceArena::new();
        let a = arena.spawn(point(0, 100.0, 10.0));
        let b = arena.spawn(point(0, 200.0, 10.0));
        let c = arena.spawn(point(0, 300.0, 10.0));
        assert_eq!(arena.ids(), vec![a, b, c]);

        let trace = arena.get_mut(b).unwrap();
        trace.push(point(1, 200.0, 20.0), 0.1);
        trace.growing = true;

        let closed = arena.take_closing();
        assert_eq!(closed.iter().map(|t| t.id()).collect::<Vec<_>>(), vec![a, c]);
        assert_eq!(arena.ids(), vec![b]);
        assert!(!arena.get(b).unwrap().is_growing());

        let d = arena.spawn(point(1, 400.0, 10.0));
        assert_eq!(d, TraceId(3));
        let rest = arena.drain();
        assert_eq!(rest.iter().map(|t| t.id()).collect::<Vec<_>>(), vec![b, d]);
        assert!(arena.is_empty());
    }
}
