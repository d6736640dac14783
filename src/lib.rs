pub use lane_change::{LaneChangeParams, LaneChangePolicy};
pub use restriction::{Restriction, RestrictionError, RestrictionTable};
pub use schedule::{AppearanceSchedule, SpawnEvent};
pub use simulation::{Simulation, SimulationAttributes, VehicleRecord};
use slotmap::{new_key_type, SlotMap};
pub use slotmap::{Key, KeyData};
pub use util::Interval;
pub use vehicle::acceleration::ModelParams;
pub use vehicle::{TrajectorySample, Vehicle, VehicleKind};

mod debug;
mod lane_change;
mod restriction;
mod schedule;
mod simulation;
mod util;
mod vehicle;

new_key_type! {
    /// Unique ID of a [Vehicle].
    pub struct VehicleId;
}

type VehicleSet = SlotMap<VehicleId, Vehicle>;
