use bevy::math::Vec3;

/// Per-tick output of the input aggregation pass. Forces are in the same
/// units the chassis solver consumes; `reactor_on` drives the exhaust
/// emitter instead of mutating it from inside the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControlSignal {
    pub engine_force: f32,
    pub braking_force: f32,
    pub steering_angle: f32,
    pub reactor_on: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GamepadSnapshot {
    pub dpad_left: bool,
    pub dpad_right: bool,
    pub accelerate: bool,
    pub reverse: bool,
    pub brake: bool,
}

/// What the surrounding app hands the controller each tick. Absent devices
/// are `None`/zero and fall through to the idle branch.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputSnapshot {
    pub touch_count: u8,
    pub gamepad: Option<GamepadSnapshot>,
    pub tilt_sample: Option<Vec3>,
}

#[derive(Debug, Clone, Copy)]
pub struct DriveTuning {
    pub engine_force: f32,
    pub idle_brake_force: f32,
    pub hard_brake_force: f32,
    pub steering_clamp: f32,
    pub steering_increment: f32,
    pub steering_decay: f32,
    pub center_steering_relax: f32,
    pub tilt_filter_factor: f32,
    pub tilt_steering_gain: f32,
}

impl Default for DriveTuning {
    fn default() -> Self {
        Self {
            engine_force: 300.0,
            idle_brake_force: 3.0,
            hard_brake_force: 100.0,
            steering_clamp: 0.6,
            steering_increment: 0.03,
            steering_decay: 0.8,
            center_steering_relax: 0.9,
            tilt_filter_factor: 0.5,
            tilt_steering_gain: 1.3,
        }
    }
}

/// Reduces touch count, gamepad digital state, and the filtered tilt
/// reading to one steering angle and one engine/brake pair per tick.
///
/// All smoothing state (low-pass tilt estimate, leaky steering
/// accumulator) lives on this struct so a fresh controller starts neutral
/// and tests can drive it with injected snapshots.
#[derive(Debug, Clone)]
pub struct DriveController {
    tuning: DriveTuning,
    filtered_tilt: Vec3,
    tilt_orientation: f32,
    steering_accum: f32,
}

impl DriveController {
    pub fn new(tuning: DriveTuning) -> Self {
        Self {
            tuning,
            filtered_tilt: Vec3::ZERO,
            tilt_orientation: 0.0,
            steering_accum: 0.0,
        }
    }

    /// Swaps the tuning constants without disturbing the smoothing state.
    pub fn set_tuning(&mut self, tuning: DriveTuning) {
        self.tuning = tuning;
    }

    pub fn tuning(&self) -> DriveTuning {
        self.tuning
    }

    pub fn reset(&mut self) {
        self.filtered_tilt = Vec3::ZERO;
        self.tilt_orientation = 0.0;
        self.steering_accum = 0.0;
    }

    pub fn steering_accumulator(&self) -> f32 {
        self.steering_accum
    }

    pub fn filtered_tilt(&self) -> Vec3 {
        self.filtered_tilt
    }

    pub fn tick(&mut self, input: &InputSnapshot) -> ControlSignal {
        // The low-pass filter runs whenever a sample arrived, even while a
        // gamepad owns steering, so the estimate stays warm.
        if let Some(raw) = input.tilt_sample {
            self.ingest_tilt(raw);
        }

        let tuning = self.tuning;
        let mut engine_force = 0.0;
        let mut braking_force = 0.0;
        let mut reactor_on = false;

        // 1 touch = accelerate, 2 = reverse, 3 = brake, anything else idles.
        match input.touch_count {
            1 => {
                engine_force = tuning.engine_force;
                reactor_on = true;
            }
            2 => engine_force = -tuning.engine_force,
            3 => braking_force = tuning.hard_brake_force,
            _ => braking_force = tuning.idle_brake_force,
        }

        let orientation = match input.gamepad {
            Some(pad) => {
                self.advance_steering_accumulator(pad.dpad_left, pad.dpad_right);

                if pad.accelerate {
                    engine_force = tuning.engine_force;
                    reactor_on = true;
                } else if pad.reverse {
                    engine_force = -tuning.engine_force;
                    reactor_on = false;
                } else if pad.brake {
                    braking_force = tuning.hard_brake_force;
                    reactor_on = false;
                } else {
                    braking_force = tuning.idle_brake_force;
                    reactor_on = false;
                }

                self.steering_accum
            }
            None => self.tilt_orientation,
        };

        let mut steering_angle = -orientation;
        if orientation == 0.0 {
            steering_angle *= tuning.center_steering_relax;
        }
        steering_angle = steering_angle.clamp(-tuning.steering_clamp, tuning.steering_clamp);

        ControlSignal {
            engine_force,
            braking_force,
            steering_angle,
            reactor_on,
        }
    }

    fn ingest_tilt(&mut self, raw: Vec3) {
        let factor = self.tuning.tilt_filter_factor;
        self.filtered_tilt = raw * factor + self.filtered_tilt * (1.0 - factor);

        // Landscape tilt: the y axis carries the steering lean, the x axis
        // sign tells which way the device is held.
        self.tilt_orientation = if self.filtered_tilt.x > 0.0 {
            self.filtered_tilt.y * self.tuning.tilt_steering_gain
        } else {
            -self.filtered_tilt.y * self.tuning.tilt_steering_gain
        };
    }

    // When the held direction reverses, the opposing charge decays before
    // the new increment applies. Intentionally kept in that order; the
    // control feel was tuned around it.
    fn advance_steering_accumulator(&mut self, left: bool, right: bool) {
        let tuning = self.tuning;
        if right {
            if self.steering_accum < 0.0 {
                self.steering_accum *= tuning.steering_decay;
            }
            self.steering_accum += tuning.steering_increment;
            if self.steering_accum > 1.0 {
                self.steering_accum = 1.0;
            }
        } else if left {
            if self.steering_accum > 0.0 {
                self.steering_accum *= tuning.steering_decay;
            }
            self.steering_accum -= tuning.steering_increment;
            if self.steering_accum < -1.0 {
                self.steering_accum = -1.0;
            }
        } else {
            self.steering_accum *= tuning.steering_decay;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> DriveController {
        DriveController::new(DriveTuning::default())
    }

    fn touches(count: u8) -> InputSnapshot {
        InputSnapshot {
            touch_count: count,
            ..Default::default()
        }
    }

    #[test]
    fn touch_count_maps_to_forces() {
        let mut controller = controller();

        let signal = controller.tick(&touches(1));
        assert_eq!(signal.engine_force, 300.0);
        assert_eq!(signal.braking_force, 0.0);
        assert!(signal.reactor_on);

        let signal = controller.tick(&touches(2));
        assert_eq!(signal.engine_force, -300.0);
        assert!(!signal.reactor_on);

        let signal = controller.tick(&touches(3));
        assert_eq!(signal.engine_force, 0.0);
        assert_eq!(signal.braking_force, 100.0);

        for idle_count in [0, 4, 7] {
            let signal = controller.tick(&touches(idle_count));
            assert_eq!(signal.engine_force, 0.0);
            assert_eq!(signal.braking_force, 3.0);
            assert!(!signal.reactor_on);
        }
    }

    #[test]
    fn gamepad_buttons_override_touch_forces() {
        let mut controller = controller();
        let snapshot = InputSnapshot {
            touch_count: 3,
            gamepad: Some(GamepadSnapshot {
                accelerate: true,
                ..Default::default()
            }),
            ..Default::default()
        };

        let signal = controller.tick(&snapshot);
        assert_eq!(signal.engine_force, 300.0);
        assert!(signal.reactor_on);
    }

    #[test]
    fn idle_gamepad_applies_idle_brake() {
        let mut controller = controller();
        let snapshot = InputSnapshot {
            touch_count: 1,
            gamepad: Some(GamepadSnapshot::default()),
            ..Default::default()
        };

        let signal = controller.tick(&snapshot);
        assert_eq!(signal.braking_force, 3.0);
        assert!(!signal.reactor_on);
    }

    #[test]
    fn steering_accumulator_stays_in_unit_range() {
        let mut controller = controller();
        let hold_right = InputSnapshot {
            gamepad: Some(GamepadSnapshot {
                dpad_right: true,
                ..Default::default()
            }),
            ..Default::default()
        };
        let hold_left = InputSnapshot {
            gamepad: Some(GamepadSnapshot {
                dpad_left: true,
                ..Default::default()
            }),
            ..Default::default()
        };

        for _ in 0..500 {
            controller.tick(&hold_right);
            assert!(controller.steering_accumulator() <= 1.0);
        }
        assert_eq!(controller.steering_accumulator(), 1.0);

        for _ in 0..500 {
            controller.tick(&hold_left);
            let accum = controller.steering_accumulator();
            assert!((-1.0..=1.0).contains(&accum));
        }
        assert_eq!(controller.steering_accumulator(), -1.0);
    }

    #[test]
    fn direction_reversal_decays_before_incrementing() {
        let mut controller = controller();
        let hold_right = InputSnapshot {
            gamepad: Some(GamepadSnapshot {
                dpad_right: true,
                ..Default::default()
            }),
            ..Default::default()
        };
        for _ in 0..10 {
            controller.tick(&hold_right);
        }
        let charged = controller.steering_accumulator();
        assert!(charged > 0.0);

        let hold_left = InputSnapshot {
            gamepad: Some(GamepadSnapshot {
                dpad_left: true,
                ..Default::default()
            }),
            ..Default::default()
        };
        controller.tick(&hold_left);

        // Positive charge decays by 0.8 first, then the 0.03 step applies.
        let expected = charged * 0.8 - 0.03;
        assert!((controller.steering_accumulator() - expected).abs() < 1e-6);
    }

    #[test]
    fn released_dpad_leaks_accumulator_toward_zero() {
        let mut controller = controller();
        let hold_right = InputSnapshot {
            gamepad: Some(GamepadSnapshot {
                dpad_right: true,
                ..Default::default()
            }),
            ..Default::default()
        };
        for _ in 0..40 {
            controller.tick(&hold_right);
        }

        let released = InputSnapshot {
            gamepad: Some(GamepadSnapshot::default()),
            ..Default::default()
        };
        let mut previous = controller.steering_accumulator();
        for _ in 0..60 {
            controller.tick(&released);
            let current = controller.steering_accumulator();
            assert!(current.abs() <= previous.abs());
            previous = current;
        }
        assert!(previous.abs() < 1e-4);
    }

    #[test]
    fn steering_angle_clamps_for_extreme_tilt() {
        let mut controller = controller();
        let snapshot = InputSnapshot {
            tilt_sample: Some(Vec3::new(1.0, 5.0, 0.0)),
            ..Default::default()
        };

        for _ in 0..20 {
            let signal = controller.tick(&snapshot);
            assert!(signal.steering_angle >= -0.6);
            assert!(signal.steering_angle <= 0.6);
        }
        // Long-held hard tilt pins the clamp.
        assert_eq!(controller.tick(&snapshot).steering_angle, -0.6);
    }

    #[test]
    fn tilt_low_pass_filter_halves_each_step() {
        let mut controller = controller();

        controller.tick(&InputSnapshot {
            tilt_sample: Some(Vec3::new(1.0, 0.8, 0.0)),
            ..Default::default()
        });
        assert_eq!(controller.filtered_tilt(), Vec3::new(0.5, 0.4, 0.0));

        controller.tick(&InputSnapshot {
            tilt_sample: Some(Vec3::new(1.0, 0.8, 0.0)),
            ..Default::default()
        });
        assert_eq!(controller.filtered_tilt(), Vec3::new(0.75, 0.6, 0.0));
    }

    #[test]
    fn tilt_orientation_flips_with_device_side() {
        let mut controller = controller();

        let signal = controller.tick(&InputSnapshot {
            tilt_sample: Some(Vec3::new(1.0, 0.2, 0.0)),
            ..Default::default()
        });
        let steering_right_side_up = signal.steering_angle;

        let mut flipped = DriveController::new(DriveTuning::default());
        let signal = flipped.tick(&InputSnapshot {
            tilt_sample: Some(Vec3::new(-1.0, 0.2, 0.0)),
            ..Default::default()
        });

        assert!((signal.steering_angle + steering_right_side_up).abs() < 1e-6);
    }

    #[test]
    fn neutral_input_steers_straight() {
        let mut controller = controller();
        let signal = controller.tick(&InputSnapshot::default());
        assert_eq!(signal.steering_angle, 0.0);
        assert_eq!(signal.engine_force, 0.0);
        assert_eq!(signal.braking_force, 3.0);
    }
}
