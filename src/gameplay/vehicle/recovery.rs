use super::body::VehicleBody;
use bevy::math::Vec3;
use rand::Rng;

#[derive(Debug, Clone, Copy)]
pub struct RecoveryParams {
    pub sample_interval_ticks: u32,
    pub strikes_to_escalate: u32,
    pub attempts_before_reset: u32,
    pub upright_threshold: f32,
    pub impulse: f32,
    pub impulse_offset: f32,
    pub reset_lift: f32,
}

impl Default for RecoveryParams {
    fn default() -> Self {
        Self {
            sample_interval_ticks: 30,
            strikes_to_escalate: 3,
            attempts_before_reset: 3,
            upright_threshold: 0.1,
            impulse: 300.0,
            impulse_offset: 5.0,
            reset_lift: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecoveryAction {
    /// Upward kick at an off-center local point so the car tumbles back over.
    Impulse { impulse: Vec3, local_point: Vec3 },
    /// Level the body and drop it back in from `lift` units up.
    HardReset { lift: f32 },
}

/// Watches the upright value and escalates when the car stays flipped.
///
/// Samples once every `sample_interval_ticks` calls. Three consecutive
/// flipped samples count as an upset; a single upright sample clears the
/// streak. The first two upsets answer with a randomized impulse, the third
/// with a hard reset, after which the attempt counter starts over.
#[derive(Debug, Clone, Default)]
pub struct UpsetRecovery {
    params: RecoveryParams,
    tick_count: u32,
    strikes: u32,
    attempts: u32,
}

impl UpsetRecovery {
    pub fn new(params: RecoveryParams) -> Self {
        Self {
            params,
            tick_count: 0,
            strikes: 0,
            attempts: 0,
        }
    }

    pub fn reset(&mut self) {
        self.tick_count = 0;
        self.strikes = 0;
        self.attempts = 0;
    }

    pub fn strikes(&self) -> u32 {
        self.strikes
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn tick<R: Rng>(&mut self, upright_value: f32, rng: &mut R) -> Option<RecoveryAction> {
        self.tick_count = self.tick_count.wrapping_add(1);
        if self.tick_count % self.params.sample_interval_ticks != 0 {
            return None;
        }

        if upright_value > self.params.upright_threshold {
            self.strikes = 0;
            return None;
        }

        self.strikes += 1;
        if self.strikes < self.params.strikes_to_escalate {
            return None;
        }

        self.strikes = 0;
        self.attempts += 1;

        if self.attempts >= self.params.attempts_before_reset {
            self.attempts = 0;
            return Some(RecoveryAction::HardReset {
                lift: self.params.reset_lift,
            });
        }

        let offset = self.params.impulse_offset;
        let local_point = Vec3::new(
            rng.gen_range(-offset..=offset),
            0.0,
            rng.gen_range(-offset..=offset),
        );
        Some(RecoveryAction::Impulse {
            impulse: Vec3::new(0.0, self.params.impulse, 0.0),
            local_point,
        })
    }
}

pub fn apply_recovery_action(body: &mut impl VehicleBody, action: &RecoveryAction) {
    match action {
        RecoveryAction::Impulse {
            impulse,
            local_point,
        } => body.apply_upset_impulse(*impulse, *local_point),
        RecoveryAction::HardReset { lift } => body.reset_upright(*lift),
    }
}

#[cfg(test)]
mod tests {
    use super::super::body::fake::{BodyCall, FakeBody};
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const FLIPPED: f32 = -0.8;
    const LEVEL: f32 = 1.0;

    fn recovery() -> UpsetRecovery {
        UpsetRecovery::new(RecoveryParams::default())
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn run_ticks(
        recovery: &mut UpsetRecovery,
        rng: &mut StdRng,
        upright: f32,
        ticks: u32,
    ) -> Vec<RecoveryAction> {
        (0..ticks)
            .filter_map(|_| recovery.tick(upright, rng))
            .collect()
    }

    #[test]
    fn third_consecutive_flipped_sample_triggers_exactly_one_action() {
        let mut recovery = recovery();
        let mut rng = rng();

        // Samples land on ticks 30, 60 and 90; nothing before the third.
        let actions = run_ticks(&mut recovery, &mut rng, FLIPPED, 89);
        assert!(actions.is_empty());

        let action = recovery.tick(FLIPPED, &mut rng);
        assert!(matches!(action, Some(RecoveryAction::Impulse { .. })));
        assert_eq!(recovery.strikes(), 0);
        assert_eq!(recovery.attempts(), 1);
    }

    #[test]
    fn upright_sample_clears_the_strike_streak() {
        let mut recovery = recovery();
        let mut rng = rng();

        run_ticks(&mut recovery, &mut rng, FLIPPED, 60);
        assert_eq!(recovery.strikes(), 2);

        run_ticks(&mut recovery, &mut rng, LEVEL, 30);
        assert_eq!(recovery.strikes(), 0);

        // The streak starts over, so two more flipped samples stay silent.
        let actions = run_ticks(&mut recovery, &mut rng, FLIPPED, 60);
        assert!(actions.is_empty());
    }

    #[test]
    fn threshold_is_exclusive_above() {
        let mut recovery = recovery();
        let mut rng = rng();

        // Exactly at the threshold still counts as flipped.
        let actions = run_ticks(&mut recovery, &mut rng, 0.1, 90);
        assert_eq!(actions.len(), 1);

        let mut recovery = UpsetRecovery::new(RecoveryParams::default());
        let actions = run_ticks(&mut recovery, &mut rng, 0.11, 90);
        assert!(actions.is_empty());
    }

    #[test]
    fn impulse_point_stays_within_the_configured_offset() {
        for seed in 0..20 {
            let mut recovery = recovery();
            let mut seeded = StdRng::seed_from_u64(seed);
            let actions = run_ticks(&mut recovery, &mut seeded, FLIPPED, 90);
            let [RecoveryAction::Impulse {
                impulse,
                local_point,
            }] = actions[..]
            else {
                panic!("expected a single impulse");
            };

            assert_eq!(impulse, Vec3::new(0.0, 300.0, 0.0));
            assert!(local_point.x.abs() <= 5.0);
            assert!(local_point.z.abs() <= 5.0);
            assert_eq!(local_point.y, 0.0);
        }
    }

    #[test]
    fn third_escalation_is_a_hard_reset_and_restarts_the_cycle() {
        let mut recovery = recovery();
        let mut rng = rng();

        let actions = run_ticks(&mut recovery, &mut rng, FLIPPED, 270);
        assert_eq!(actions.len(), 3);
        assert!(matches!(actions[0], RecoveryAction::Impulse { .. }));
        assert!(matches!(actions[1], RecoveryAction::Impulse { .. }));
        assert_eq!(actions[2], RecoveryAction::HardReset { lift: 10.0 });
        assert_eq!(recovery.attempts(), 0);

        // After the reset the escalation ladder starts from impulses again.
        let actions = run_ticks(&mut recovery, &mut rng, FLIPPED, 90);
        assert!(matches!(actions[..], [RecoveryAction::Impulse { .. }]));
    }

    #[test]
    fn actions_route_to_the_body() {
        let mut body = FakeBody::level();

        apply_recovery_action(
            &mut body,
            &RecoveryAction::Impulse {
                impulse: Vec3::new(0.0, 300.0, 0.0),
                local_point: Vec3::new(2.0, 0.0, -3.0),
            },
        );
        apply_recovery_action(&mut body, &RecoveryAction::HardReset { lift: 10.0 });

        assert_eq!(
            body.calls,
            vec![
                BodyCall::Impulse {
                    impulse: Vec3::new(0.0, 300.0, 0.0),
                    local_point: Vec3::new(2.0, 0.0, -3.0),
                },
                BodyCall::Reset { lift: 10.0 },
            ]
        );
    }
}
