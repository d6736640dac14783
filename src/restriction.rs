use itertools::Itertools;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A route interval with a fixed desired speed and open-lane count.
///
/// The interval runs from its `start` to the start of the next
/// restriction, or to the end of the route for the last one.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Restriction {
    /// The position where the interval begins, in m.
    pub start: f64,
    /// The desired speed over the interval, in m/s.
    pub desired_vel: f64,
    /// The number of open lanes over the interval, from 1 to 3.
    pub lanes: u8,
}

/// A configuration rejected when building a [RestrictionTable].
#[derive(Clone, Debug, Error, PartialEq)]
pub enum RestrictionError {
    #[error("the table must contain at least one restriction")]
    Empty,
    #[error("the first restriction must start at the route origin, found {0} m")]
    MissingOrigin(f64),
    #[error("restriction starts must be strictly ascending ({0} m follows {1} m)")]
    Unsorted(f64, f64),
    #[error("restriction at {pos} m is beyond the {length} m route")]
    OutOfRange { pos: f64, length: f64 },
    #[error("the open-lane count must be between 1 and 3, found {0}")]
    LaneCount(u8),
}

/// Piecewise-constant route configuration: desired speed and open-lane
/// count, keyed by position.
#[derive(Clone, Debug)]
pub struct RestrictionTable {
    /// The length of the route in m.
    length: f64,
    /// The restrictions, ascending by start position.
    segments: Vec<Restriction>,
}

/// Which of the three lanes are open under a given lane count.
/// Lanes close from the median side inward: the kerb-side pair
/// survives two open lanes, the centre lane alone survives one.
fn open_lanes(lanes: u8) -> [bool; 3] {
    [lanes >= 3, true, lanes >= 2]
}

impl RestrictionTable {
    /// Builds a table from a list of restrictions over a route of the
    /// given length.
    pub fn new(length: f64, segments: Vec<Restriction>) -> Result<Self, RestrictionError> {
        let first = segments.first().ok_or(RestrictionError::Empty)?;
        if first.start != 0.0 {
            return Err(RestrictionError::MissingOrigin(first.start));
        }
        for segment in &segments {
            if !(1..=3).contains(&segment.lanes) {
                return Err(RestrictionError::LaneCount(segment.lanes));
            }
            if segment.start >= length {
                return Err(RestrictionError::OutOfRange {
                    pos: segment.start,
                    length,
                });
            }
        }
        if let Some((a, b)) = segments
            .iter()
            .tuple_windows()
            .find(|(a, b)| b.start <= a.start)
        {
            return Err(RestrictionError::Unsorted(b.start, a.start));
        }
        Ok(Self { length, segments })
    }

    /// Builds a table with a single restriction covering the route.
    pub fn uniform(length: f64, desired_vel: f64, lanes: u8) -> Self {
        debug_assert!((1..=3).contains(&lanes));
        Self {
            length,
            segments: vec![Restriction {
                start: 0.0,
                desired_vel,
                lanes,
            }],
        }
    }

    /// The length of the route in m.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// The restriction in force at the given position: the last one
    /// starting at or before it.
    pub fn at(&self, pos: f64) -> &Restriction {
        self.segments
            .iter()
            .rev()
            .find(|r| r.start <= pos)
            .unwrap_or(&self.segments[0])
    }

    /// The positions at which a lane stops being open, as (lane, start)
    /// pairs in route order. The stretch before the first restriction
    /// counts as fully open, so a route that opens with a reduced lane
    /// count closes the missing lanes at the origin.
    pub(crate) fn lane_drops(&self) -> Vec<(usize, f64)> {
        let before = std::iter::once(3).chain(self.segments.iter().map(|r| r.lanes));
        let mut drops = vec![];
        for (prev, segment) in before.zip(self.segments.iter()) {
            let was = open_lanes(prev);
            let now = open_lanes(segment.lanes);
            for lane in 0..3 {
                if was[lane] && !now[lane] {
                    drops.push((lane, segment.start));
                }
            }
        }
        drops
    }
}
