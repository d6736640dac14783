use crate::debug::trace_lane_change;
#[cfg(feature = "debug")]
use crate::debug::take_trace;
use crate::lane_change::{self, EvaluateInput, LaneChangeModel, LaneChangeParams};
use crate::restriction::RestrictionTable;
use crate::schedule::AppearanceSchedule;
use crate::vehicle::acceleration::{AccelerationModel, ModelParams};
use crate::vehicle::{TrajectorySample, Vehicle, VehicleAttributes, VehicleKind};
use crate::{VehicleId, VehicleSet};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use slotmap::{Key, SlotMap};

/// The attributes of a simulation.
#[derive(Clone, Copy, Debug)]
pub struct SimulationAttributes {
    /// The uniform vehicle length in m.
    pub vehicle_length: f64,
    /// The desired speed in m/s assigned to spawned vehicles.
    pub desired_vel: f64,
    /// The mean of the politeness distribution.
    pub politeness_mean: f64,
    /// The standard deviation of the politeness distribution.
    pub politeness_stddev: f64,
    /// The seed of the politeness sampling stream.
    pub seed: u64,
    /// The car following model parameters.
    pub following: ModelParams,
    /// The lane-change model parameters.
    pub lane_change: LaneChangeParams,
}

/// The archived lifetime of a vehicle that left the route.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VehicleRecord {
    /// The index of the schedule entry that created the vehicle.
    pub schedule_index: usize,
    /// The vehicle's full (position, time) history.
    pub trajectory: Vec<TrajectorySample>,
}

/// A traffic simulation over a single group of up to three lanes.
pub struct Simulation {
    /// The vehicles being simulated.
    vehicles: VehicleSet,
    /// The registry order, sorted ascending by position once per step.
    order: Vec<VehicleId>,
    /// The route configuration.
    restrictions: RestrictionTable,
    /// The vehicle appearance schedule.
    schedule: AppearanceSchedule,
    /// The car following model.
    following: AccelerationModel,
    /// The lane-change model.
    lane_change: LaneChangeModel,
    attributes: SimulationAttributes,
    /// The politeness distribution sampled at vehicle creation.
    politeness: Normal<f64>,
    rng: StdRng,
    /// The current tick of simulation.
    frame: usize,
    /// The accumulated simulated time in s.
    time: f64,
    /// The simulated times of all accepted lane changes.
    changes: Vec<f64>,
    /// The trajectories of vehicles that left the route.
    records: Vec<VehicleRecord>,
    /// Decision traces from the previously simulated step.
    #[cfg(feature = "debug")]
    debug: serde_json::Value,
}

impl Default for SimulationAttributes {
    fn default() -> Self {
        Self {
            vehicle_length: 5.0,
            desired_vel: 90.0 / 3.6,
            politeness_mean: 0.2,
            politeness_stddev: 0.1,
            seed: 0,
            following: ModelParams::default(),
            lane_change: LaneChangeParams::default(),
        }
    }
}

impl Simulation {
    /// Creates a new simulation over the given route, with lane-end
    /// markers already in place.
    pub fn new(
        attributes: SimulationAttributes,
        restrictions: RestrictionTable,
        schedule: AppearanceSchedule,
    ) -> Self {
        let politeness = Normal::new(attributes.politeness_mean, attributes.politeness_stddev)
            .expect("Invalid standard deviation");
        let following = AccelerationModel::new(
            &attributes.following,
            restrictions.length(),
            attributes.vehicle_length,
        );
        let lane_change = LaneChangeModel::new(
            attributes.lane_change,
            restrictions.length(),
            attributes.vehicle_length,
        );
        let mut sim = Self {
            vehicles: SlotMap::with_key(),
            order: vec![],
            restrictions,
            schedule,
            following,
            lane_change,
            attributes,
            politeness,
            rng: StdRng::seed_from_u64(attributes.seed),
            frame: 0,
            time: 0.0,
            changes: vec![],
            records: vec![],
            #[cfg(feature = "debug")]
            debug: serde_json::Value::Null,
        };
        sim.place_lane_ends();
        sim
    }

    /// Clears all vehicles and outputs while keeping the configured
    /// route and schedule, then re-places the lane-end markers.
    pub fn reset(&mut self) {
        self.vehicles.clear();
        self.order.clear();
        self.rng = StdRng::seed_from_u64(self.attributes.seed);
        self.frame = 0;
        self.time = 0.0;
        self.changes.clear();
        self.records.clear();
        self.place_lane_ends();
    }

    /// Advances the simulation by `dt` seconds: spawns any scheduled
    /// vehicle, re-sorts the registry, applies restrictions, lane
    /// changes and kinematics to every car, and removes vehicles that
    /// left the route.
    ///
    /// For a realistic simulation, do not use a time step greater
    /// than around 0.2.
    pub fn step(&mut self, dt: f64) {
        self.spawn();
        self.sort_registry();
        self.time += dt;
        for idx in 0..self.order.len() {
            let id = self.order[idx];
            if !self.vehicles[id].kind().is_car() {
                continue;
            }
            self.apply_restriction(id);
            self.consider_lane_change(idx);
            self.advance_vehicle(id, dt);
        }
        self.remove_exited();
        self.frame += 1;

        #[cfg(feature = "debug")]
        {
            self.debug = take_trace();
        }
    }

    /// Gets the current simulation frame index.
    pub fn frame(&self) -> usize {
        self.frame
    }

    /// Gets the accumulated simulated time in s.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Returns an iterator over all the vehicles in the simulation.
    pub fn iter_vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.values()
    }

    /// Gets a reference to the vehicle with the given ID.
    pub fn get_vehicle(&self, vehicle_id: VehicleId) -> &Vehicle {
        &self.vehicles[vehicle_id]
    }

    /// The simulated times of all accepted lane changes.
    pub fn lane_change_times(&self) -> &[f64] {
        &self.changes
    }

    /// The trajectories of vehicles that left the route.
    pub fn records(&self) -> &[VehicleRecord] {
        &self.records
    }

    /// Gets the decision traces for the previously simulated step.
    #[cfg(feature = "debug")]
    pub fn debug(&mut self) -> serde_json::Value {
        self.debug.clone()
    }

    /// Parks an immobile marker at every position where a lane stops
    /// being open, forcing upstream vehicles out of the lane.
    fn place_lane_ends(&mut self) {
        let half_len = 0.5 * self.attributes.vehicle_length;
        for (lane, pos) in self.restrictions.lane_drops() {
            let id = self.vehicles.insert_with_key(|id| {
                Vehicle::lane_end(id, lane, pos + half_len, 2.0 * half_len)
            });
            self.order.push(id);
            log::debug!("lane {} closes at {:.1} m", lane, pos);
        }
    }

    /// Spawns at most one scheduled vehicle at the route origin and
    /// hands it the first same-lane registry member as its leader.
    fn spawn(&mut self) {
        let Some((index, event)) = self.schedule.at_tick(self.frame) else {
            return;
        };
        let event = *event;
        let attributes = VehicleAttributes {
            length: self.attributes.vehicle_length,
            desired_vel: self.attributes.desired_vel,
            politeness: self.politeness.sample(&mut self.rng),
        };
        let pos = -0.5 * self.attributes.vehicle_length;
        let now = self.time;
        let id = self.vehicles.insert_with_key(|id| {
            Vehicle::new(
                id,
                VehicleKind::Car(index),
                &attributes,
                event.lane,
                pos,
                event.vel,
                now,
            )
        });
        // The scan runs over the previous step's order, so the first
        // same-lane member is the nearest one already on the route.
        let leader = self
            .order
            .iter()
            .copied()
            .find(|v| self.vehicles[*v].lane() == event.lane);
        self.vehicles[id].set_leader(leader);
        self.order.push(id);
        log::debug!(
            "vehicle {} spawned in lane {} at {:.2} m/s",
            index,
            event.lane,
            event.vel
        );
    }

    /// Sorts the registry ascending by position. Neighbour discovery
    /// in the lane-change phase relies on this exact ordering.
    fn sort_registry(&mut self) {
        let vehicles = &self.vehicles;
        self.order
            .sort_by(|a, b| vehicles[*a].pos().total_cmp(&vehicles[*b].pos()));
        debug_assert!(self
            .order
            .windows(2)
            .all(|w| vehicles[w[0]].pos() <= vehicles[w[1]].pos()));
    }

    /// Applies the restriction in force at the vehicle's front edge.
    fn apply_restriction(&mut self, id: VehicleId) {
        let front = self.vehicles[id].pos_front();
        let restriction = *self.restrictions.at(front);
        self.vehicles[id].apply_restriction(&restriction);
    }

    /// Runs the lane-change eligibility and decision procedure for
    /// the vehicle at `idx` in the registry order, rewiring leaders
    /// and recording the change if one is accepted.
    fn consider_lane_change(&mut self, idx: usize) {
        let id = self.order[idx];
        let now = self.time;
        let cooldown = self.lane_change.cooldown();
        {
            let vehicle = &mut self.vehicles[id];
            vehicle.observe_leader(now);
            if vehicle.lanes_open() == 1 || !vehicle.cooled_down(now, cooldown) {
                return;
            }
        }

        let follower = lane_change::follower_of(&self.vehicles, &self.order, id);
        let old_leader = self.vehicles[id].leader();
        let lane = self.vehicles[id].lane();
        let lanes_open = self.vehicles[id].lanes_open();

        for (target, toward_kerb) in lane_change::candidates(lane, lanes_open) {
            let input = EvaluateInput {
                idm: &self.following,
                vehicles: &self.vehicles,
                order: &self.order,
                idx,
                follower,
            };
            let Some(change) = self.lane_change.evaluate(&input, target, toward_kerb) else {
                continue;
            };

            // Exactly three references move: the subject adopts the
            // target-lane leader, the target-lane follower adopts the
            // subject, and the old follower closes the vacated gap.
            self.vehicles[id].set_leader(change.neighbours.leader);
            if let Some(new_follower) = change.neighbours.follower {
                self.vehicles[new_follower].set_leader(Some(id));
            }
            if let Some(follower) = follower {
                self.vehicles[follower].set_leader(old_leader);
            }
            let vehicle = &mut self.vehicles[id];
            vehicle.set_lane(change.target_lane);
            vehicle.restart_cooldown(now);
            self.changes.push(now);
            trace_lane_change(id.data().as_ffi(), lane, change.target_lane);
            log::debug!(
                "lane change {} -> {} at t={:.2} s",
                lane,
                change.target_lane,
                now
            );
            break;
        }
    }

    /// Integrates the vehicle's kinematics, then recomputes its
    /// acceleration and diagnostic gap from its current leader and
    /// records a trajectory sample.
    fn advance_vehicle(&mut self, id: VehicleId, dt: f64) {
        let leader = self.vehicles[id]
            .leader()
            .and_then(|l| self.vehicles.get(l))
            .map(|l| l.motion());
        let vehicle = &mut self.vehicles[id];
        vehicle.integrate(dt);
        let motion = vehicle.motion();
        let acc = self.following.acceleration(Some(&motion), leader.as_ref());
        let gap = self.following.gap(&motion, leader.as_ref());
        vehicle.set_acceleration(acc);
        vehicle.set_gap(gap);
        vehicle.record(self.time);
    }

    /// Removes every car whose leading edge has passed the route end,
    /// archiving its trajectory and clearing any leader reference
    /// that pointed to it.
    fn remove_exited(&mut self) {
        let length = self.restrictions.length();
        let exited: Vec<VehicleId> = self
            .order
            .iter()
            .copied()
            .filter(|id| {
                let vehicle = &self.vehicles[*id];
                vehicle.kind().is_car() && vehicle.pos_front() > length
            })
            .collect();
        for id in exited {
            self.order.retain(|v| *v != id);
            if let Some(vehicle) = self.vehicles.remove(id) {
                for (_, other) in self.vehicles.iter_mut() {
                    if other.leader() == Some(id) {
                        other.set_leader(None);
                    }
                }
                if let VehicleKind::Car(index) = vehicle.kind() {
                    log::debug!("vehicle {} left the route at t={:.2} s", index, self.time);
                    self.records.push(VehicleRecord {
                        schedule_index: index,
                        trajectory: vehicle.into_trajectory(),
                    });
                }
            }
        }
    }
}

impl VehicleRecord {
    /// Every `step`-th trajectory sample, for plotting consumers.
    pub fn thinned(&self, step: usize) -> impl Iterator<Item = TrajectorySample> + '_ {
        self.trajectory.iter().step_by(step.max(1)).copied()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::schedule::AppearanceSchedule;

    fn empty_sim(restrictions: RestrictionTable) -> Simulation {
        Simulation::new(
            SimulationAttributes::default(),
            restrictions,
            AppearanceSchedule::default(),
        )
    }

    fn put_car(
        sim: &mut Simulation,
        lane: usize,
        pos: f64,
        vel: f64,
        politeness: f64,
    ) -> VehicleId {
        let attributes = VehicleAttributes {
            length: 5.0,
            desired_vel: 25.0,
            politeness,
        };
        let index = sim.vehicles.len();
        let id = sim.vehicles.insert_with_key(|id| {
            Vehicle::new(
                id,
                VehicleKind::Car(index),
                &attributes,
                lane,
                pos,
                vel,
                0.0,
            )
        });
        sim.order.push(id);
        id
    }

    #[test]
    fn registry_sorts_ascending_by_position() {
        let mut sim = empty_sim(RestrictionTable::uniform(1500.0, 25.0, 2));
        put_car(&mut sim, 1, 50.0, 20.0, 0.2);
        put_car(&mut sim, 2, 10.0, 20.0, 0.2);
        put_car(&mut sim, 1, 30.0, 20.0, 0.2);
        sim.sort_registry();
        let positions: Vec<f64> = sim.order.iter().map(|id| sim.vehicles[*id].pos()).collect();
        assert_eq!(positions, vec![10.0, 30.0, 50.0]);
    }

    #[test]
    fn accepted_change_rewires_exactly_three_references() {
        let mut sim = empty_sim(RestrictionTable::uniform(1500.0, 25.0, 3));
        let f = put_car(&mut sim, 1, 60.0, 20.0, 0.2);
        let s = put_car(&mut sim, 1, 100.0, 20.0, 0.2);
        let l = put_car(&mut sim, 1, 110.0, 10.0, 0.2);
        let pf = put_car(&mut sim, 2, 40.0, 20.0, 0.2);
        let pl = put_car(&mut sim, 2, 200.0, 22.0, 0.2);
        let x = put_car(&mut sim, 0, 80.0, 20.0, 0.2);
        sim.vehicles[f].set_leader(Some(s));
        sim.vehicles[s].set_leader(Some(l));
        sim.vehicles[pf].set_leader(Some(pl));
        for id in [f, s, l, pf, pl, x] {
            sim.vehicles[id].observe_leader(0.0);
        }
        sim.sort_registry();
        sim.time = 10.0;

        let idx = sim.order.iter().position(|v| *v == s).unwrap();
        sim.consider_lane_change(idx);

        assert_eq!(sim.vehicles[s].lane(), 2);
        assert_eq!(sim.vehicles[s].leader(), Some(pl));
        assert_eq!(sim.vehicles[pf].leader(), Some(s));
        assert_eq!(sim.vehicles[f].leader(), Some(l));
        assert_eq!(sim.vehicles[l].leader(), None);
        assert_eq!(sim.vehicles[pl].leader(), None);
        assert_eq!(sim.vehicles[x].leader(), None);
        assert_eq!(sim.lane_change_times(), &[10.0]);

        // The wait restarts on acceptance, so an immediate retry is
        // not even evaluated.
        sim.consider_lane_change(idx);
        assert_eq!(sim.lane_change_times().len(), 1);
    }

    #[test]
    fn halts_behind_a_lane_end_when_no_lane_is_open() {
        let mut sim = empty_sim(RestrictionTable::uniform(1500.0, 25.0, 1));
        let end = sim
            .vehicles
            .insert_with_key(|id| Vehicle::lane_end(id, 1, 100.0, 5.0));
        sim.order.push(end);
        let car = put_car(&mut sim, 1, 10.0, 15.0, 0.2);
        sim.vehicles[car].set_leader(Some(end));

        for _ in 0..2000 {
            sim.step(0.1);
            let vehicle = &sim.vehicles[car];
            assert!(vehicle.vel() >= 0.0);
            assert!(vehicle.acc() >= -9.0);
            assert!(vehicle.gap() > 0.0);
            assert!(vehicle.pos_front() < sim.vehicles[end].pos_rear());
        }
        assert!(sim.lane_change_times().is_empty());
        assert_eq!(sim.vehicles[car].lane(), 1);
    }

    #[test]
    fn reset_keeps_the_route_and_replaces_markers() {
        let table = RestrictionTable::new(
            1500.0,
            vec![
                crate::Restriction {
                    start: 0.0,
                    desired_vel: 25.0,
                    lanes: 2,
                },
                crate::Restriction {
                    start: 500.0,
                    desired_vel: 25.0,
                    lanes: 1,
                },
            ],
        )
        .unwrap();
        let mut sim = empty_sim(table);
        put_car(&mut sim, 1, 10.0, 15.0, 0.2);
        sim.step(0.1);
        sim.reset();
        assert_eq!(sim.frame(), 0);
        assert_eq!(sim.time(), 0.0);
        // Only the lane-end markers survive: lane 0 closed at the
        // origin, lane 2 closed at 500 m.
        let kinds: Vec<VehicleKind> = sim.iter_vehicles().map(|v| v.kind()).collect();
        assert_eq!(kinds, vec![VehicleKind::LaneEnd, VehicleKind::LaneEnd]);
    }
}
