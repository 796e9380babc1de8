use super::control::ControlSignal;
use bevy::math::Vec3;

pub const WHEEL_FRONT_LEFT: usize = 0;
pub const WHEEL_FRONT_RIGHT: usize = 1;
pub const WHEEL_REAR_LEFT: usize = 2;
pub const WHEEL_REAR_RIGHT: usize = 3;
pub const WHEEL_COUNT: usize = 4;

/// Seam between the control logic and whatever actually simulates the car.
/// Wheel indices follow the constants above: fronts steer, rears drive.
pub trait VehicleBody {
    fn set_steering_angle(&mut self, wheel: usize, angle: f32);
    fn apply_engine_force(&mut self, wheel: usize, force: f32);
    fn apply_braking_force(&mut self, wheel: usize, force: f32);

    /// Vertical component of the body-up axis in world space. 1.0 is level,
    /// values near zero or below mean the car is on its side or roof.
    fn upright_value(&self) -> f32;

    fn apply_upset_impulse(&mut self, impulse: Vec3, local_point: Vec3);

    /// Level the body, raise it by `lift` units, and zero its motion.
    fn reset_upright(&mut self, lift: f32);
}

/// Routes one control signal to the wheels: both fronts get the steering
/// angle, both rears get the engine and braking forces.
pub fn apply_control(body: &mut impl VehicleBody, signal: &ControlSignal) {
    body.set_steering_angle(WHEEL_FRONT_LEFT, signal.steering_angle);
    body.set_steering_angle(WHEEL_FRONT_RIGHT, signal.steering_angle);
    body.apply_engine_force(WHEEL_REAR_LEFT, signal.engine_force);
    body.apply_engine_force(WHEEL_REAR_RIGHT, signal.engine_force);
    body.apply_braking_force(WHEEL_REAR_LEFT, signal.braking_force);
    body.apply_braking_force(WHEEL_REAR_RIGHT, signal.braking_force);
}
