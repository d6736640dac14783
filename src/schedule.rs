#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A scheduled vehicle appearance.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpawnEvent {
    /// The tick index at which the vehicle appears.
    pub tick: usize,
    /// The initial speed in m/s.
    pub vel: f64,
    /// The lane the vehicle appears in.
    pub lane: usize,
}

/// The vehicle appearance schedule consumed by the simulation.
///
/// At most one appearance is honoured per tick; a tick with no entry
/// is a no-op.
#[derive(Clone, Debug, Default)]
pub struct AppearanceSchedule {
    entries: Vec<SpawnEvent>,
}

impl AppearanceSchedule {
    /// Creates a schedule from a list of appearances.
    pub fn new(entries: Vec<SpawnEvent>) -> Self {
        Self { entries }
    }

    /// The number of scheduled appearances.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the schedule is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The first entry scheduled for the given tick, with its index
    /// in the schedule.
    pub(crate) fn at_tick(&self, tick: usize) -> Option<(usize, &SpawnEvent)> {
        self.entries
            .iter()
            .enumerate()
            .find(|(_, event)| event.tick == tick)
    }
}

impl FromIterator<SpawnEvent> for AppearanceSchedule {
    fn from_iter<T: IntoIterator<Item = SpawnEvent>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
