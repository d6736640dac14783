use crate::util::Interval;
use crate::vehicle::acceleration::{AccelerationModel, Motion};
use crate::{VehicleId, VehicleSet};
use smallvec::SmallVec;

/// Selects between the two lane-change incentive formulations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LaneChangePolicy {
    /// Both directions are weighed alike, with the old and new
    /// followers' disadvantages both entering the incentive.
    Symmetric,
    /// Direction-biased keep-kerbside rule: only the relevant
    /// neighbour's disadvantage is weighed, and the threshold is
    /// lowered toward the kerb and raised toward the median.
    KerbBiased,
}

/// The parameters of the lane-change model.
#[derive(Clone, Copy, Debug)]
pub struct LaneChangeParams {
    /// The incentive formulation in use.
    pub policy: LaneChangePolicy,
    /// The braking the new follower may be asked to accept, a positive
    /// number in m/s<sup>2</sup>.
    pub safe_braking: f64,
    /// The acceleration advantage a change must clear, in m/s<sup>2</sup>.
    pub threshold: f64,
    /// The threshold bias applied by the keep-kerbside rule, in
    /// m/s<sup>2</sup>.
    pub kerb_bias: f64,
    /// The speed below which a slow leader counts as congested rather
    /// than merely slow, in m/s.
    pub critical_vel: f64,
    /// The wait between lane-change decisions, in simulated seconds.
    pub cooldown: f64,
}

impl Default for LaneChangeParams {
    fn default() -> Self {
        Self {
            policy: LaneChangePolicy::KerbBiased,
            safe_braking: 3.0,
            threshold: 0.5,
            kerb_bias: 0.3,
            critical_vel: 70.0 / 3.6,
            cooldown: 2.0,
        }
    }
}

/// The lane-change decision model.
#[derive(Clone, Debug)]
pub struct LaneChangeModel {
    params: LaneChangeParams,
    /// The length of the route in m.
    route_len: f64,
    /// The uniform vehicle length in m.
    veh_len: f64,
}

/// The target-lane vehicles a lane change puts in play.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Neighbours {
    /// The nearest target-lane vehicle behind the subject.
    pub follower: Option<VehicleId>,
    /// The nearest target-lane vehicle ahead of the subject.
    pub leader: Option<VehicleId>,
}

/// An accepted lane change and the neighbours to rewire.
#[derive(Clone, Copy, Debug)]
pub(crate) struct LaneChange {
    /// The lane the subject moves into.
    pub target_lane: usize,
    /// The subject's new leader and follower in the target lane.
    pub neighbours: Neighbours,
}

/// Inputs into [`LaneChangeModel::evaluate`] shared by every
/// candidate lane.
#[derive(Clone, Copy)]
pub(crate) struct EvaluateInput<'a> {
    /// The car following model used for counterfactual accelerations.
    pub idm: &'a AccelerationModel,
    /// The vehicles being simulated.
    pub vehicles: &'a VehicleSet,
    /// The registry order, ascending by position.
    pub order: &'a [VehicleId],
    /// The index of the subject vehicle in `order`.
    pub idx: usize,
    /// The vehicle currently following the subject, if any.
    pub follower: Option<VehicleId>,
}

/// The candidate target lanes for a vehicle, in priority order, as
/// (lane, toward-kerb) pairs. Centre-lane vehicles try the kerb side
/// first and the median side only when all three lanes are open;
/// outer-lane vehicles may only move toward the centre.
pub(crate) fn candidates(lane: usize, lanes_open: u8) -> SmallVec<[(usize, bool); 2]> {
    let mut out = SmallVec::new();
    match lane {
        1 => {
            out.push((2, true));
            if lanes_open >= 3 {
                out.push((0, false));
            }
        }
        2 => out.push((1, false)),
        _ => out.push((1, true)),
    }
    out
}

/// The nearest target-lane members behind and ahead of `order[idx]`.
/// Relies on `order` being sorted ascending by position.
pub(crate) fn neighbours(
    vehicles: &VehicleSet,
    order: &[VehicleId],
    idx: usize,
    lane: usize,
) -> Neighbours {
    let follower = order[..idx]
        .iter()
        .rev()
        .copied()
        .find(|id| vehicles[*id].lane() == lane);
    let leader = order[idx + 1..]
        .iter()
        .copied()
        .find(|id| vehicles[*id].lane() == lane);
    Neighbours { follower, leader }
}

/// The last registry member whose leader is the given vehicle.
pub(crate) fn follower_of(
    vehicles: &VehicleSet,
    order: &[VehicleId],
    id: VehicleId,
) -> Option<VehicleId> {
    order
        .iter()
        .copied()
        .filter(|v| vehicles[*v].leader() == Some(id))
        .last()
}

impl LaneChangeModel {
    /// Creates a new lane-change model.
    ///
    /// # Parameters
    /// * `route_len` - The length of the route in m
    /// * `vehicle_length` - The uniform vehicle length in m
    pub fn new(params: LaneChangeParams, route_len: f64, vehicle_length: f64) -> Self {
        Self {
            params,
            route_len,
            veh_len: vehicle_length,
        }
    }

    /// The wait between lane-change decisions, in simulated seconds.
    pub(crate) fn cooldown(&self) -> f64 {
        self.params.cooldown
    }

    /// Evaluates a change into the given lane, returning the accepted
    /// change or `None`.
    ///
    /// # Parameters
    /// * `lane` - The target lane
    /// * `toward_kerb` - Whether the move is toward the kerb side
    pub(crate) fn evaluate(
        &self,
        input: &EvaluateInput,
        lane: usize,
        toward_kerb: bool,
    ) -> Option<LaneChange> {
        let EvaluateInput {
            idm,
            vehicles,
            order,
            idx,
            follower,
        } = *input;
        let subject = &vehicles[order[idx]];
        let near = neighbours(vehicles, order, idx, lane);

        // Hard no-overlap rule: a change may not start within one
        // vehicle length of either target-lane neighbour. Missing
        // neighbours sit one length beyond the route ends.
        let half = 0.5 * self.veh_len;
        let behind = near
            .follower
            .map(|id| vehicles[id].extent())
            .unwrap_or_else(|| Interval::disc(-self.veh_len, half));
        let ahead = near
            .leader
            .map(|id| vehicles[id].extent())
            .unwrap_or_else(|| Interval::disc(self.route_len + self.veh_len, half));
        if subject.extent().clearance_with(&behind) <= 0.0
            || subject.extent().clearance_with(&ahead) <= 0.0
        {
            return None;
        }

        let motion = |id: Option<VehicleId>| {
            id.and_then(|id| vehicles.get(id)).map(|v| v.motion())
        };
        let sub = subject.motion();
        let cur_leader = motion(subject.leader());
        let new_leader = motion(near.leader);
        let new_follower = motion(near.follower);
        let old_follower = motion(follower);

        // The subject's acceleration with and without the change.
        let stay = idm.acceleration(Some(&sub), cur_leader.as_ref());
        let go = idm.acceleration(Some(&sub), new_leader.as_ref());
        // The new follower's acceleration once the subject merges in;
        // this one also carries the safety criterion.
        let nf_merged = idm.acceleration(new_follower.as_ref(), Some(&sub));
        if nf_merged < -self.params.safe_braking {
            return None;
        }

        let p = subject.politeness();
        let accepted = match self.params.policy {
            LaneChangePolicy::Symmetric => {
                let fol_keeps = idm.acceleration(old_follower.as_ref(), Some(&sub));
                let fol_freed = idm.acceleration(old_follower.as_ref(), cur_leader.as_ref());
                let nf_now = idm.acceleration(new_follower.as_ref(), new_leader.as_ref());
                go - stay + p * ((nf_merged - nf_now) + (fol_freed - fol_keeps))
                    > self.params.threshold
            }
            LaneChangePolicy::KerbBiased if toward_kerb => {
                let fol_keeps = idm.acceleration(old_follower.as_ref(), Some(&sub));
                let fol_freed = idm.acceleration(old_follower.as_ref(), cur_leader.as_ref());
                let go = self
                    .anticipated(&sub, cur_leader.as_ref(), stay, go)
                    .unwrap_or(go);
                go - stay + p * (fol_freed - fol_keeps)
                    > self.params.threshold - self.params.kerb_bias
            }
            LaneChangePolicy::KerbBiased => {
                let nf_now = idm.acceleration(new_follower.as_ref(), new_leader.as_ref());
                let stay = self
                    .anticipated(&sub, new_leader.as_ref(), stay, go)
                    .unwrap_or(stay);
                go - stay + p * (nf_merged - nf_now)
                    > self.params.threshold + self.params.kerb_bias
            }
        };

        accepted.then_some(LaneChange {
            target_lane: lane,
            neighbours: near,
        })
    }

    /// Caps a counterfactual at the worse of the two accelerations
    /// when the reference leader is slower than the subject but still
    /// above the congestion-critical speed.
    fn anticipated(&self, sub: &Motion, reference: Option<&Motion>, stay: f64, go: f64) -> Option<f64> {
        match reference {
            Some(leader) if sub.vel > leader.vel && leader.vel > self.params.critical_vel => {
                Some(f64::min(go, stay))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::vehicle::acceleration::ModelParams;
    use crate::vehicle::{Vehicle, VehicleAttributes, VehicleKind};
    use slotmap::SlotMap;

    fn put(
        vehicles: &mut VehicleSet,
        order: &mut Vec<VehicleId>,
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
        let id = vehicles.insert_with_key(|id| {
            Vehicle::new(id, VehicleKind::Car(0), &attributes, lane, pos, vel, 0.0)
        });
        order.push(id);
        id
    }

    fn idm() -> AccelerationModel {
        AccelerationModel::new(&ModelParams::default(), 1500.0, 5.0)
    }

    fn model(policy: LaneChangePolicy) -> LaneChangeModel {
        let params = LaneChangeParams {
            policy,
            ..Default::default()
        };
        LaneChangeModel::new(params, 1500.0, 5.0)
    }

    #[test]
    fn centre_lane_prefers_the_kerb_side() {
        assert_eq!(candidates(1, 3).as_slice(), &[(2, true), (0, false)]);
        assert_eq!(candidates(1, 2).as_slice(), &[(2, true)]);
        assert_eq!(candidates(2, 3).as_slice(), &[(1, false)]);
        assert_eq!(candidates(0, 3).as_slice(), &[(1, true)]);
    }

    #[test]
    fn neighbours_are_the_nearest_target_lane_members() {
        let mut vehicles = SlotMap::with_key();
        let mut order = vec![];
        let a = put(&mut vehicles, &mut order, 2, 10.0, 20.0, 0.2);
        let b = put(&mut vehicles, &mut order, 2, 40.0, 20.0, 0.2);
        let s = put(&mut vehicles, &mut order, 1, 60.0, 20.0, 0.2);
        let c = put(&mut vehicles, &mut order, 2, 90.0, 20.0, 0.2);
        let _d = put(&mut vehicles, &mut order, 2, 120.0, 20.0, 0.2);

        let near = neighbours(&vehicles, &order, 2, 2);
        assert_eq!(near.follower, Some(b));
        assert_eq!(near.leader, Some(c));
        let near = neighbours(&vehicles, &order, 2, 0);
        assert_eq!(near.follower, None);
        assert_eq!(near.leader, None);

        vehicles[a].set_leader(Some(s));
        vehicles[b].set_leader(Some(s));
        assert_eq!(follower_of(&vehicles, &order, s), Some(b));
    }

    #[test]
    fn overlap_is_rejected_outright() {
        let mut vehicles = SlotMap::with_key();
        let mut order = vec![];
        put(&mut vehicles, &mut order, 2, 58.0, 20.0, 0.2);
        put(&mut vehicles, &mut order, 1, 60.0, 20.0, 0.2);
        let idm = idm();
        let input = EvaluateInput {
            idm: &idm,
            vehicles: &vehicles,
            order: &order,
            idx: 1,
            follower: None,
        };
        assert!(model(LaneChangePolicy::Symmetric)
            .evaluate(&input, 2, true)
            .is_none());
    }

    #[test]
    fn politeness_weighs_the_new_followers_disadvantage() {
        let build = |politeness: f64| {
            let mut vehicles: VehicleSet = SlotMap::with_key();
            let mut order = vec![];
            let pf = put(&mut vehicles, &mut order, 2, 70.0, 20.0, 0.2);
            let s = put(&mut vehicles, &mut order, 1, 100.0, 20.0, politeness);
            let l = put(&mut vehicles, &mut order, 1, 140.0, 15.0, 0.2);
            let pl = put(&mut vehicles, &mut order, 2, 160.0, 25.0, 0.2);
            vehicles[s].set_leader(Some(l));
            vehicles[pf].set_leader(Some(pl));
            (vehicles, order, pf, pl)
        };
        let idm = idm();
        let model = model(LaneChangePolicy::Symmetric);

        let (vehicles, order, pf, pl) = build(0.0);
        let input = EvaluateInput {
            idm: &idm,
            vehicles: &vehicles,
            order: &order,
            idx: 1,
            follower: None,
        };
        let change = model.evaluate(&input, 2, true).unwrap();
        assert_eq!(change.target_lane, 2);
        assert_eq!(change.neighbours.follower, Some(pf));
        assert_eq!(change.neighbours.leader, Some(pl));

        // An extremely polite driver stays put in the same situation.
        let (vehicles, order, _, _) = build(3.0);
        let input = EvaluateInput {
            idm: &idm,
            vehicles: &vehicles,
            order: &order,
            idx: 1,
            follower: None,
        };
        assert!(model.evaluate(&input, 2, true).is_none());
    }

    #[test]
    fn a_slow_leader_above_the_critical_speed_caps_the_gain() {
        let build = |leader_vel: f64| {
            let mut vehicles: VehicleSet = SlotMap::with_key();
            let mut order = vec![];
            let s = put(&mut vehicles, &mut order, 1, 100.0, 25.0, 0.2);
            let l = put(&mut vehicles, &mut order, 1, 180.0, leader_vel, 0.2);
            put(&mut vehicles, &mut order, 2, 400.0, 25.0, 0.2);
            vehicles[s].set_leader(Some(l));
            (vehicles, order)
        };
        let idm = idm();
        let model = model(LaneChangePolicy::KerbBiased);

        // A slow leader still above the critical speed caps the
        // apparent gain away, so the move is declined.
        let (vehicles, order) = build(21.0);
        let input = EvaluateInput {
            idm: &idm,
            vehicles: &vehicles,
            order: &order,
            idx: 0,
            follower: None,
        };
        assert!(model.evaluate(&input, 2, true).is_none());

        // A congested leader disables the anticipation and the same
        // move is accepted.
        let (vehicles, order) = build(15.0);
        let input = EvaluateInput {
            idm: &idm,
            vehicles: &vehicles,
            order: &order,
            idx: 0,
            follower: None,
        };
        assert!(model.evaluate(&input, 2, true).is_some());
    }
}
