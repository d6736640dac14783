use crate::restriction::Restriction;
use crate::util::Interval;
use crate::vehicle::acceleration::Motion;
use crate::VehicleId;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub mod acceleration;

/// A simulated vehicle.
#[derive(Clone, Debug)]
pub struct Vehicle {
    /// The vehicle's ID.
    pub(crate) id: VehicleId,
    /// Whether this is an ordinary car or a lane-end marker.
    kind: VehicleKind,
    /// Half the vehicle's length in m.
    half_len: f64,
    /// The lane the vehicle occupies, from 0 (median side) to 2 (kerb side).
    lane: usize,
    /// The longitudinal position of the centre of the vehicle, in m.
    pos: f64,
    /// The velocity in m/s. Never negative.
    vel: f64,
    /// The acceleration in m/s^2, recomputed after every integration.
    acc: f64,
    /// The desired speed in m/s, overridden by route restrictions.
    desired_vel: f64,
    /// The number of lanes open at the vehicle's position.
    lanes_open: u8,
    /// The politeness factor weighing other vehicles' disadvantage
    /// into this vehicle's lane-change incentive.
    politeness: f64,
    /// Net distance to the current leader in m, kept for inspection.
    gap: f64,
    /// The leader this vehicle follows, if any.
    leader: Option<VehicleId>,
    /// The leader seen at the last eligibility check.
    observed_leader: Option<VehicleId>,
    /// Simulated time at which the lane-change wait last restarted.
    last_change: f64,
    /// The vehicle's recorded (position, time) history.
    trajectory: Vec<TrajectorySample>,
}

/// Distinguishes ordinary cars from the markers parked at lane ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VehicleKind {
    /// A scheduled car, tagged with its appearance schedule index.
    Car(usize),
    /// An immobile marker closing a lane. It is never updated and
    /// never removed; it exists to be discovered as a leader.
    LaneEnd,
}

/// The attributes of a newly created vehicle.
#[derive(Clone, Copy, Debug)]
pub struct VehicleAttributes {
    /// The vehicle length in m.
    pub length: f64,
    /// The desired speed in m/s until a restriction overrides it.
    pub desired_vel: f64,
    /// The politeness factor applied to lane-change incentives.
    pub politeness: f64,
}

/// A single point of a vehicle's trajectory.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrajectorySample {
    /// The longitudinal position in m.
    pub pos: f64,
    /// The simulated time in s.
    pub time: f64,
}

impl VehicleKind {
    /// Whether the vehicle takes part in the per-tick update.
    pub fn is_car(&self) -> bool {
        matches!(self, VehicleKind::Car(_))
    }
}

impl Vehicle {
    /// Creates a new vehicle.
    pub(crate) fn new(
        id: VehicleId,
        kind: VehicleKind,
        attributes: &VehicleAttributes,
        lane: usize,
        pos: f64,
        vel: f64,
        now: f64,
    ) -> Self {
        Self {
            id,
            kind,
            half_len: 0.5 * attributes.length,
            lane,
            pos,
            vel,
            acc: 0.0,
            desired_vel: attributes.desired_vel,
            lanes_open: 3,
            politeness: attributes.politeness,
            gap: f64::INFINITY,
            leader: None,
            observed_leader: None,
            last_change: now,
            trajectory: vec![TrajectorySample { pos, time: now }],
        }
    }

    /// Creates the immobile marker that closes a lane at `pos`.
    pub(crate) fn lane_end(id: VehicleId, lane: usize, pos: f64, length: f64) -> Self {
        let attributes = VehicleAttributes {
            length,
            desired_vel: 1.0,
            politeness: 0.0,
        };
        Self::new(id, VehicleKind::LaneEnd, &attributes, lane, pos, 1.0, 0.0)
    }

    /// Gets the vehicle's ID.
    pub fn id(&self) -> VehicleId {
        self.id
    }

    /// Whether this is an ordinary car or a lane-end marker.
    pub fn kind(&self) -> VehicleKind {
        self.kind
    }

    /// The vehicle's length in m.
    pub fn length(&self) -> f64 {
        2.0 * self.half_len
    }

    /// The lane the vehicle occupies.
    pub fn lane(&self) -> usize {
        self.lane
    }

    /// The longitudinal position of the centre of the vehicle in m.
    pub fn pos(&self) -> f64 {
        self.pos
    }

    /// The longitudinal position of the rear of the vehicle in m.
    pub fn pos_rear(&self) -> f64 {
        self.pos - self.half_len
    }

    /// The longitudinal position of the front of the vehicle in m.
    pub fn pos_front(&self) -> f64 {
        self.pos + self.half_len
    }

    /// The longitudinal extent of the vehicle.
    pub fn extent(&self) -> Interval {
        Interval::disc(self.pos, self.half_len)
    }

    /// The vehicle's velocity in m/s.
    pub fn vel(&self) -> f64 {
        self.vel
    }

    /// The vehicle's acceleration in m/s^2.
    pub fn acc(&self) -> f64 {
        self.acc
    }

    /// The desired speed in m/s at the vehicle's position.
    pub fn desired_vel(&self) -> f64 {
        self.desired_vel
    }

    /// The number of lanes open at the vehicle's position.
    pub fn lanes_open(&self) -> u8 {
        self.lanes_open
    }

    /// The vehicle's politeness factor.
    pub fn politeness(&self) -> f64 {
        self.politeness
    }

    /// Net distance to the current leader in m, as of the last update.
    pub fn gap(&self) -> f64 {
        self.gap
    }

    /// The leader this vehicle follows, if any.
    pub fn leader(&self) -> Option<VehicleId> {
        self.leader
    }

    /// The vehicle's recorded (position, time) history.
    pub fn trajectory(&self) -> &[TrajectorySample] {
        &self.trajectory
    }

    /// The quantities the car following model reads from this vehicle.
    pub(crate) fn motion(&self) -> Motion {
        Motion {
            pos: self.pos,
            vel: self.vel,
            desired_vel: self.desired_vel,
        }
    }

    /// Adopts the desired speed and open-lane count of a restriction.
    pub(crate) fn apply_restriction(&mut self, restriction: &Restriction) {
        self.desired_vel = restriction.desired_vel;
        self.lanes_open = restriction.lanes;
    }

    pub(crate) fn set_lane(&mut self, lane: usize) {
        self.lane = lane;
    }

    pub(crate) fn set_leader(&mut self, leader: Option<VehicleId>) {
        self.leader = leader;
    }

    pub(crate) fn set_acceleration(&mut self, acc: f64) {
        self.acc = acc;
    }

    pub(crate) fn set_gap(&mut self, gap: f64) {
        self.gap = gap;
    }

    /// Restarts the observation window when the leader's identity has
    /// changed since the last check, so the vehicle watches a leader
    /// that just cut in before reacting to it.
    pub(crate) fn observe_leader(&mut self, now: f64) {
        if self.leader != self.observed_leader {
            self.observed_leader = self.leader;
            self.last_change = now;
        }
    }

    /// Whether the lane-change wait has elapsed.
    pub(crate) fn cooled_down(&self, now: f64, cooldown: f64) -> bool {
        now - self.last_change > cooldown
    }

    /// Restarts the lane-change wait, on an accepted change.
    pub(crate) fn restart_cooldown(&mut self, now: f64) {
        self.last_change = now;
    }

    /// Integrates the vehicle's position and velocity.
    ///
    /// # Parameters
    /// * `dt` - The time step in seconds
    pub(crate) fn integrate(&mut self, dt: f64) {
        self.pos += self.vel * dt + 0.5 * self.acc * dt * dt;
        self.vel = f64::max(self.vel + self.acc * dt, 0.0);
    }

    /// Appends a trajectory sample at the given simulated time.
    pub(crate) fn record(&mut self, now: f64) {
        self.trajectory.push(TrajectorySample {
            pos: self.pos,
            time: now,
        });
    }

    /// Consumes the vehicle, yielding its trajectory for archival.
    pub(crate) fn into_trajectory(self) -> Vec<TrajectorySample> {
        self.trajectory
    }
}
