/// The floor applied to the following gap before it divides the
/// desired gap, in m. A pathological overlap must not divide by a
/// non-positive value.
const GAP_FLOOR: f64 = 0.1;

/// The longitudinal car following model (intelligent driver model).
#[derive(Clone, Debug)]
pub struct AccelerationModel {
    headway: f64,
    min_gap: f64,
    max_acc: f64,
    max_dec: f64,
    exponent: f64,
    /// 1 / (2 sqrt(a b)), precomputed for the desired-gap term.
    inv_sqrt_ab: f64,
    /// The gap substituted when there is no leader, in m.
    open_road: f64,
    /// The uniform vehicle length in m.
    veh_len: f64,
}

/// The parameters of the acceleration model.
#[derive(Clone, Copy, Debug)]
pub struct ModelParams {
    /// The desired gap between this and the vehicle ahead in seconds.
    pub time_headway: f64,
    /// The minimum gap between two standing vehicles in m.
    pub min_gap: f64,
    /// The maximum acceleration in m/s<sup>2</sup>.
    pub max_acceleration: f64,
    /// The comfortable deceleration in m/s<sup>2</sup>, a positive number.
    pub comf_deceleration: f64,
    /// The maximum deceleration in m/s<sup>2</sup>, a negative number.
    pub max_deceleration: f64,
    /// The free-flow acceleration exponent.
    pub accel_exponent: f64,
}

/// A snapshot of the quantities the model reads from one vehicle.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Motion {
    /// The longitudinal position of the centre of the vehicle in m.
    pub pos: f64,
    /// The velocity in m/s.
    pub vel: f64,
    /// The desired speed in m/s.
    pub desired_vel: f64,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            time_headway: 1.5,
            min_gap: 0.1,
            max_acceleration: 0.8,
            comf_deceleration: 3.0,
            max_deceleration: -9.0,
            accel_exponent: 4.0,
        }
    }
}

impl AccelerationModel {
    /// Creates a new acceleration model.
    ///
    /// # Parameters
    /// * `open_road` - The gap substituted when there is no leader, in m
    /// * `vehicle_length` - The uniform vehicle length in m
    pub fn new(params: &ModelParams, open_road: f64, vehicle_length: f64) -> Self {
        AccelerationModel {
            headway: params.time_headway,
            min_gap: params.min_gap,
            max_acc: params.max_acceleration,
            max_dec: params.max_deceleration,
            exponent: params.accel_exponent,
            inv_sqrt_ab: 1.0 / (2.0 * (params.max_acceleration * params.comf_deceleration).sqrt()),
            open_road,
            veh_len: vehicle_length,
        }
    }

    /// The acceleration of `subject` when following `leader`.
    ///
    /// A missing leader stands for an open road ahead; a missing
    /// subject stands for a vehicle that does not exist in the
    /// scenario under evaluation and yields zero.
    pub(crate) fn acceleration(&self, subject: Option<&Motion>, leader: Option<&Motion>) -> f64 {
        let Some(subject) = subject else {
            return 0.0;
        };

        let desired_gap = match leader {
            Some(leader) => {
                let appr = subject.vel - leader.vel;
                self.min_gap
                    + f64::max(
                        0.0,
                        subject.vel * (self.headway + appr * self.inv_sqrt_ab),
                    )
            }
            None => self.min_gap,
        };
        let gap = f64::max(self.gap(subject, leader), GAP_FLOOR);

        let free = (subject.vel / subject.desired_vel).powf(self.exponent);
        let term = desired_gap / gap;
        f64::max(self.max_dec, self.max_acc * (1.0 - free - term * term))
    }

    /// Net distance from `subject` to the rear of `leader`, or the
    /// open-road distance when there is no leader.
    pub(crate) fn gap(&self, subject: &Motion, leader: Option<&Motion>) -> f64 {
        match leader {
            Some(leader) => leader.pos - subject.pos - self.veh_len,
            None => self.open_road,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn model() -> AccelerationModel {
        AccelerationModel::new(&ModelParams::default(), 1500.0, 5.0)
    }

    fn motion(pos: f64, vel: f64) -> Motion {
        Motion {
            pos,
            vel,
            desired_vel: 25.0,
        }
    }

    #[test]
    fn free_flow_matches_the_closed_form() {
        let acc = model().acceleration(Some(&motion(0.0, 12.5)), None);
        let expect = 0.8 * (1.0 - (12.5f64 / 25.0).powf(4.0) - (0.1f64 / 1500.0).powi(2));
        assert_approx_eq!(acc, expect, 1e-12);
    }

    #[test]
    fn free_flow_settles_at_the_desired_speed() {
        // At v = v0 only the residual open-road gap term remains.
        let acc = model().acceleration(Some(&motion(0.0, 25.0)), None);
        assert!(acc < 0.0);
        assert!(acc.abs() < 1e-6);
    }

    #[test]
    fn missing_subject_contributes_nothing() {
        let acc = model().acceleration(None, Some(&motion(50.0, 10.0)));
        assert_eq!(acc, 0.0);
    }

    #[test]
    fn braking_behind_a_slower_leader() {
        // 10 m back from a leader going 5 m/s slower, both near v0.
        let acc = model().acceleration(Some(&motion(0.0, 25.0)), Some(&motion(10.0, 20.0)));
        assert!(acc < 0.0);
        assert!(acc >= ModelParams::default().max_deceleration);
    }

    #[test]
    fn never_under_the_deceleration_floor() {
        let m = model();
        let floor = ModelParams::default().max_deceleration;
        for vel in [0.0, 1.0, 5.0, 15.0, 25.0, 40.0] {
            for lead_pos in [-5.0, 0.0, 5.1, 10.0, 50.0, 400.0] {
                for lead_vel in [0.0, 1.0, 10.0, 25.0, 40.0] {
                    let acc = m.acceleration(
                        Some(&motion(0.0, vel)),
                        Some(&motion(lead_pos, lead_vel)),
                    );
                    assert!(acc >= floor, "vel {vel} lead {lead_pos} @ {lead_vel}");
                    assert!(acc.is_finite());
                }
            }
        }
    }

    #[test]
    fn overlapping_gap_is_floored() {
        // A leader parked on top of the subject must not divide by a
        // non-positive gap.
        let acc = model().acceleration(Some(&motion(0.0, 10.0)), Some(&motion(2.0, 0.0)));
        assert!(acc.is_finite());
        assert_approx_eq!(acc, -9.0);
    }

    #[test]
    fn open_road_gap_is_the_route_length() {
        let m = model();
        assert_eq!(m.gap(&motion(100.0, 20.0), None), 1500.0);
        assert_eq!(m.gap(&motion(100.0, 20.0), Some(&motion(130.0, 20.0))), 25.0);
    }
}
