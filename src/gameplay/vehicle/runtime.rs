use std::f32::consts::FRAC_PI_2;

use super::body::{self, VehicleBody};
use super::camera::{self, FollowParams};
use super::control::InputSnapshot;
use super::recovery;
use super::*;

/// Borrowed view of the player chassis that satisfies the actuation seam.
/// Steering and forces land in `WheelActuation` for the suspension solver;
/// recovery writes straight to the rapier components.
pub(super) struct RapierVehicleBody<'a> {
    pub actuation: &'a mut WheelActuation,
    pub transform: &'a mut Transform,
    pub velocity: &'a mut Velocity,
    pub impulse: &'a mut ExternalImpulse,
    pub local_center_of_mass: Vec3,
}

impl VehicleBody for RapierVehicleBody<'_> {
    fn set_steering_angle(&mut self, wheel: usize, angle: f32) {
        self.actuation.steering[wheel] = angle;
    }

    fn apply_engine_force(&mut self, wheel: usize, force: f32) {
        self.actuation.engine[wheel] = force;
    }

    fn apply_braking_force(&mut self, wheel: usize, force: f32) {
        self.actuation.brake[wheel] = force;
    }

    fn upright_value(&self) -> f32 {
        (self.transform.rotation * Vec3::Y).y
    }

    fn apply_upset_impulse(&mut self, impulse: Vec3, local_point: Vec3) {
        let point_world = self.transform.transform_point(local_point);
        let center_of_mass_world = self.transform.transform_point(self.local_center_of_mass);
        *self.impulse += ExternalImpulse::at_point(impulse, point_world, center_of_mass_world);
    }

    fn reset_upright(&mut self, lift: f32) {
        self.transform.rotation = Quat::IDENTITY;
        self.transform.translation.y += lift;
        *self.velocity = Velocity::zero();
    }
}

pub(super) fn sync_fixed_timestep_from_config(
    config: Res<GameConfig>,
    mut fixed_time: ResMut<Time<Fixed>>,
) {
    if !config.is_changed() {
        return;
    }
    fixed_time.set_timestep_hz(config.game.app.fixed_timestep_hz as f64);
}

pub(super) fn sync_rapier_gravity_from_config(
    config: Res<GameConfig>,
    mut rapier_config_query: Query<&mut RapierConfiguration, With<DefaultRapierContext>>,
) {
    if !config.is_changed() {
        return;
    }
    let room = config.starting_room();
    for mut rapier_config in rapier_config_query.iter_mut() {
        rapier_config.gravity = Vec3::new(0.0, -room.gravity, 0.0);
    }
}

/// Pushes reloaded tuning into the live controller. The recovery watchdog
/// is rebuilt with the new parameters, which also clears its counters.
pub(super) fn sync_controller_tuning_from_config(
    config: Res<GameConfig>,
    mut controller: ResMut<DriveControllerState>,
    mut recovery_state: ResMut<RecoveryState>,
) {
    if !config.is_changed() {
        return;
    }
    let vehicle = config.default_vehicle();
    controller.0.set_tuning(drive_tuning_from_config(vehicle));
    recovery_state.0 = UpsetRecovery::new(recovery_params_from_config(vehicle));
}

fn any_pressed(keyboard: &ButtonInput<KeyCode>, keys: &[KeyCode]) -> bool {
    keys.iter().any(|key| keyboard.pressed(*key))
}

/// Real touches always win over the keyboard proxy and pass through
/// unclamped; four or more fingers must reach the controller as-is so it
/// falls back to the idle brake instead of the three-finger hard brake.
fn merged_touch_count(real_touches: usize, keyboard_touches: u8) -> u8 {
    if real_touches > 0 {
        real_touches.min(u8::MAX as usize) as u8
    } else {
        keyboard_touches
    }
}

/// Folds touches, a connected gamepad, and the keyboard into one input
/// snapshot. Keyboard throttle keys stand in for touch counts; the steer
/// keys ride the same digital-steering path a real dpad would, and the
/// synthetic pad lingers until the steering accumulator has drained.
pub(super) fn read_drive_input(
    keyboard: Res<ButtonInput<KeyCode>>,
    bindings: Res<DriveInputBindings>,
    touches: Res<Touches>,
    gamepads: Query<&Gamepad>,
    controller: Res<DriveControllerState>,
    mut input: ResMut<DriveInputState>,
) {
    let keyboard_touches = if any_pressed(&keyboard, &bindings.brake) {
        3
    } else if any_pressed(&keyboard, &bindings.reverse) {
        2
    } else if any_pressed(&keyboard, &bindings.accelerate) {
        1
    } else {
        0
    };
    input.touch_count = merged_touch_count(touches.iter().count(), keyboard_touches);

    let pad = gamepads.iter().next();
    let steer_left = any_pressed(&keyboard, &bindings.steer_left);
    let steer_right = any_pressed(&keyboard, &bindings.steer_right);
    let accumulator_live = controller.0.steering_accumulator().abs() > 1e-4;

    if pad.is_some() || steer_left || steer_right || accumulator_live {
        input.gamepad = Some(GamepadSnapshot {
            dpad_left: steer_left || pad.is_some_and(|pad| pad.pressed(GamepadButton::DPadLeft)),
            dpad_right: steer_right
                || pad.is_some_and(|pad| pad.pressed(GamepadButton::DPadRight)),
            accelerate: any_pressed(&keyboard, &bindings.accelerate)
                || pad.is_some_and(|pad| pad.pressed(GamepadButton::West)),
            reverse: any_pressed(&keyboard, &bindings.reverse)
                || pad.is_some_and(|pad| pad.pressed(GamepadButton::South)),
            brake: any_pressed(&keyboard, &bindings.brake)
                || pad.is_some_and(|pad| pad.pressed(GamepadButton::East)),
        });
    } else {
        input.gamepad = None;
    }
}

const EMULATED_TILT_LEAN: f32 = 0.45;

/// Arrow keys stand in for a tilted device: a constant lean on the y axis
/// with the device held right side up. Releasing both keys keeps feeding a
/// level sample so the low-pass filter relaxes back to center.
pub(super) fn emulate_tilt_from_keyboard(
    keyboard: Res<ButtonInput<KeyCode>>,
    bindings: Res<DriveInputBindings>,
    input: Res<DriveInputState>,
    mut tilt: ResMut<TiltFeed>,
) {
    // A live pad or steer keys own steering; leave the feed alone.
    if input.gamepad.is_some() {
        return;
    }

    let tilt_left = any_pressed(&keyboard, &bindings.tilt_left);
    let tilt_right = any_pressed(&keyboard, &bindings.tilt_right);
    let lean = match (tilt_left, tilt_right) {
        (true, false) => -EMULATED_TILT_LEAN,
        (false, true) => EMULATED_TILT_LEAN,
        _ => 0.0,
    };
    tilt.latest = Some(Vec3::new(1.0, lean, 0.0));
}

pub(super) fn request_scene_restart(
    keyboard: Res<ButtonInput<KeyCode>>,
    mut restart_events: MessageWriter<SceneRestartEvent>,
) {
    if keyboard.just_pressed(KeyCode::KeyR) {
        restart_events.write(SceneRestartEvent);
    }
}

pub(super) fn handle_scene_restart(
    mut commands: Commands,
    mut restart_events: MessageReader<SceneRestartEvent>,
    mut controller: ResMut<DriveControllerState>,
    mut recovery_state: ResMut<RecoveryState>,
    mut telemetry: ResMut<VehicleTelemetry>,
    mut tilt: ResMut<TiltFeed>,
    despawn_query: Query<Entity, Or<(With<PlayerVehicle>, With<PlayroomRoot>)>>,
) {
    if restart_events.read().count() == 0 {
        return;
    }

    for entity in despawn_query.iter() {
        commands.entity(entity).try_despawn();
    }
    controller.0.reset();
    recovery_state.0.reset();
    *telemetry = VehicleTelemetry::default();
    tilt.latest = None;
    info!("Restarting playroom scene");
}

pub(super) fn toggle_camera_viewpoint(
    keyboard: Res<ButtonInput<KeyCode>>,
    mut toggle_events: MessageReader<CameraViewToggleEvent>,
    mut viewpoint: ResMut<CameraViewpoint>,
) {
    let mut flips = toggle_events.read().count();
    if keyboard.just_pressed(KeyCode::KeyC) {
        flips += 1;
    }
    if flips % 2 == 1 {
        viewpoint.in_car = !viewpoint.in_car;
        info!(in_car = viewpoint.in_car, "Switched camera viewpoint");
    }
}

pub(super) fn apply_camera_viewpoint(
    viewpoint: Res<CameraViewpoint>,
    mut chase_query: Query<&mut Camera, (With<ChaseCamera>, Without<InCarCamera>)>,
    mut in_car_query: Query<&mut Camera, (With<InCarCamera>, Without<ChaseCamera>)>,
) {
    if !viewpoint.is_changed() {
        return;
    }
    for mut chase_camera in chase_query.iter_mut() {
        chase_camera.is_active = !viewpoint.in_car;
    }
    for mut in_car_camera in in_car_query.iter_mut() {
        in_car_camera.is_active = viewpoint.in_car;
    }
}

fn step_chase_camera(
    camera_transform: &mut Transform,
    vehicle_translation: Vec3,
    params: &FollowParams,
) {
    let target = camera::follow_target(vehicle_translation, params);
    camera_transform.translation =
        camera::damped_step(camera_transform.translation, target, params.damping);
    camera_transform.look_at(vehicle_translation, Vec3::Y);
}

/// Runs every frame, in-car view included, so the chase camera never goes
/// stale while it is inactive and switching back to it resumes smoothly.
pub(super) fn camera_follow_vehicle(
    config: Res<GameConfig>,
    vehicle_query: Query<&Transform, (With<PlayerVehicle>, Without<ChaseCamera>)>,
    mut camera_query: Query<&mut Transform, (With<ChaseCamera>, Without<PlayerVehicle>)>,
) {
    let Ok(vehicle_transform) = vehicle_query.single() else {
        return;
    };
    let Ok(mut camera_transform) = camera_query.single_mut() else {
        return;
    };

    let camera_config = &config.game.camera;
    let params = FollowParams {
        height: camera_config.follow_height,
        distance: camera_config.follow_distance,
        damping: camera_config.damping,
    };
    step_chase_camera(&mut camera_transform, vehicle_transform.translation, &params);
}

/// Keeps the overhead spotlight over the car, or over a point a little
/// ahead of the hood while riding in-car.
pub(super) fn place_car_spotlight(
    config: Res<GameConfig>,
    viewpoint: Res<CameraViewpoint>,
    vehicle_query: Query<&Transform, (With<PlayerVehicle>, Without<CarSpotlight>)>,
    mut spotlight_query: Query<&mut Transform, (With<CarSpotlight>, Without<PlayerVehicle>)>,
) {
    let Ok(vehicle_transform) = vehicle_query.single() else {
        return;
    };
    let Ok(mut spotlight_transform) = spotlight_query.single_mut() else {
        return;
    };

    let camera_config = &config.game.camera;
    let mut anchor = vehicle_transform.translation;
    if viewpoint.in_car {
        anchor += (vehicle_transform.rotation * Vec3::NEG_Z) * camera_config.spotlight_lookahead;
    }
    spotlight_transform.translation = anchor + Vec3::Y * camera_config.spotlight_height;
    spotlight_transform.look_at(anchor, Vec3::NEG_Z);
}

pub(super) fn update_reactor_glow(mut glow_query: Query<(&ReactorEmitter, &mut PointLight)>) {
    for (emitter, mut light) in glow_query.iter_mut() {
        light.intensity = if emitter.birth_rate > 0.0 {
            REACTOR_GLOW_INTENSITY
        } else {
            0.0
        };
    }
}

pub(super) fn update_wheel_visuals(
    vehicle_query: Query<(&WheelActuation, &SuspensionState), With<PlayerVehicle>>,
    mut wheel_query: Query<(&WheelVisual, &mut Transform)>,
) {
    let Ok((actuation, suspension)) = vehicle_query.single() else {
        return;
    };
    for (visual, mut wheel_transform) in wheel_query.iter_mut() {
        wheel_transform.translation =
            visual.hardpoint_local - Vec3::Y * suspension.spring_length[visual.wheel];
        // Cylinder meshes stand on their y axis, so the axle roll comes from
        // the z pre-rotation and steering yaws on top of it.
        wheel_transform.rotation = Quat::from_rotation_y(actuation.steering[visual.wheel])
            * Quat::from_rotation_z(FRAC_PI_2);
    }
}

pub(super) fn drive_vehicle(
    input: Res<DriveInputState>,
    mut tilt: ResMut<TiltFeed>,
    mut controller: ResMut<DriveControllerState>,
    mut vehicle_query: Query<
        (
            &mut Transform,
            &mut Velocity,
            &mut ExternalImpulse,
            &mut WheelActuation,
            Option<&ReadMassProperties>,
        ),
        With<PlayerVehicle>,
    >,
    mut reactor_query: Query<&mut ReactorEmitter>,
) {
    let Ok((mut transform, mut velocity, mut impulse, mut actuation, mass_properties)) =
        vehicle_query.single_mut()
    else {
        return;
    };

    let snapshot = InputSnapshot {
        touch_count: input.touch_count,
        gamepad: input.gamepad,
        tilt_sample: tilt.latest.take(),
    };
    let signal = controller.0.tick(&snapshot);

    let mut vehicle_body = RapierVehicleBody {
        actuation: &mut actuation,
        transform: &mut transform,
        velocity: &mut velocity,
        impulse: &mut impulse,
        local_center_of_mass: mass_properties
            .map(|props| props.local_center_of_mass)
            .unwrap_or(Vec3::ZERO),
    };
    body::apply_control(&mut vehicle_body, &signal);

    for mut emitter in reactor_query.iter_mut() {
        emitter.birth_rate = if signal.reactor_on {
            emitter.default_birth_rate
        } else {
            0.0
        };
    }
}

pub(super) fn run_upset_recovery(
    mut recovery_state: ResMut<RecoveryState>,
    mut rng: ResMut<GameRng>,
    mut vehicle_query: Query<
        (
            &mut Transform,
            &mut Velocity,
            &mut ExternalImpulse,
            &mut WheelActuation,
            Option<&ReadMassProperties>,
        ),
        With<PlayerVehicle>,
    >,
    mut recovery_events: MessageWriter<UpsetRecoveryEvent>,
) {
    let Ok((mut transform, mut velocity, mut impulse, mut actuation, mass_properties)) =
        vehicle_query.single_mut()
    else {
        return;
    };

    let mut vehicle_body = RapierVehicleBody {
        actuation: &mut actuation,
        transform: &mut transform,
        velocity: &mut velocity,
        impulse: &mut impulse,
        local_center_of_mass: mass_properties
            .map(|props| props.local_center_of_mass)
            .unwrap_or(Vec3::ZERO),
    };

    let upright_value = vehicle_body.upright_value();
    let Some(action) = recovery_state.0.tick(upright_value, &mut rng.0) else {
        return;
    };

    recovery::apply_recovery_action(&mut vehicle_body, &action);
    match action {
        RecoveryAction::Impulse { local_point, .. } => {
            info!(upright_value, ?local_point, "Nudging flipped vehicle");
        }
        RecoveryAction::HardReset { lift } => {
            warn!(upright_value, lift, "Hard-resetting flipped vehicle");
        }
    }
    recovery_events.write(UpsetRecoveryEvent {
        action,
        upright_value,
    });
}

pub(super) fn update_vehicle_telemetry(
    input: Res<DriveInputState>,
    recovery_state: Res<RecoveryState>,
    mut telemetry: ResMut<VehicleTelemetry>,
    vehicle_query: Query<
        (&Transform, &Velocity, &WheelActuation, &SuspensionState),
        With<PlayerVehicle>,
    >,
    reactor_query: Query<&ReactorEmitter>,
) {
    let Ok((transform, velocity, actuation, suspension)) = vehicle_query.single() else {
        return;
    };

    let speed = velocity.linvel.length();
    telemetry.speed_mps = speed;
    telemetry.speed_kph = speed * SPEED_MPS_TO_KPH;
    telemetry.steering_angle = actuation.steering[body::WHEEL_FRONT_LEFT];
    telemetry.engine_force = actuation.engine[body::WHEEL_REAR_LEFT];
    telemetry.braking_force = actuation.brake[body::WHEEL_REAR_LEFT];
    telemetry.reactor_on = reactor_query.iter().any(|emitter| emitter.birth_rate > 0.0);
    telemetry.upright_value = (transform.rotation * Vec3::Y).y;
    telemetry.grounded_wheels = suspension.grounded_count();
    telemetry.touch_count = input.touch_count;
    telemetry.gamepad_connected = input.gamepad.is_some();
    telemetry.recovery_strikes = recovery_state.0.strikes();
    telemetry.recovery_attempts = recovery_state.0.attempts();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_touches_pass_through_unclamped() {
        assert_eq!(merged_touch_count(4, 0), 4);
        assert_eq!(merged_touch_count(5, 3), 5);
        assert_eq!(merged_touch_count(0, 2), 2);
        assert_eq!(merged_touch_count(usize::MAX, 0), u8::MAX);
    }

    #[test]
    fn four_finger_touch_falls_back_to_the_idle_brake() {
        let mut controller = super::super::control::DriveController::new(Default::default());
        let snapshot = InputSnapshot {
            touch_count: merged_touch_count(4, 0),
            gamepad: None,
            tilt_sample: None,
        };

        let signal = controller.tick(&snapshot);

        assert_eq!(signal.engine_force, 0.0);
        assert_eq!(signal.braking_force, controller.tuning().idle_brake_force);
        assert!(!signal.reactor_on);
    }

    #[test]
    fn chase_camera_tracks_from_a_stale_position() {
        let params = FollowParams {
            height: 30.0,
            distance: 25.0,
            damping: 0.3,
        };
        let vehicle_translation = Vec3::new(40.0, 0.5, -16.0);
        let mut camera_transform = Transform::from_xyz(0.0, 30.0, 25.0);
        let target = camera::follow_target(vehicle_translation, &params);

        let initial_gap = (camera_transform.translation - target).length();
        for _ in 0..60 {
            step_chase_camera(&mut camera_transform, vehicle_translation, &params);
        }
        let settled_gap = (camera_transform.translation - target).length();

        assert!(settled_gap < initial_gap * 1e-3);
        let forward = camera_transform.rotation * Vec3::NEG_Z;
        let to_vehicle = (vehicle_translation - camera_transform.translation).normalize();
        assert!(forward.dot(to_vehicle) > 0.999);
    }

    #[test]
    fn rapier_body_reports_upright_from_world_up() {
        let mut actuation = WheelActuation::default();
        let mut transform = Transform::from_rotation(Quat::from_rotation_z(std::f32::consts::PI));
        let mut velocity = Velocity::zero();
        let mut impulse = ExternalImpulse::default();
        let vehicle_body = RapierVehicleBody {
            actuation: &mut actuation,
            transform: &mut transform,
            velocity: &mut velocity,
            impulse: &mut impulse,
            local_center_of_mass: Vec3::ZERO,
        };

        assert!((vehicle_body.upright_value() + 1.0).abs() < 1e-5);
    }

    #[test]
    fn reset_upright_levels_and_lifts_the_body() {
        let mut actuation = WheelActuation::default();
        let mut transform =
            Transform::from_xyz(3.0, 1.0, -2.0).with_rotation(Quat::from_rotation_x(1.2));
        let mut velocity = Velocity {
            linvel: Vec3::new(4.0, -1.0, 0.5),
            angvel: Vec3::new(0.0, 2.0, 0.0),
        };
        let mut impulse = ExternalImpulse::default();
        let mut vehicle_body = RapierVehicleBody {
            actuation: &mut actuation,
            transform: &mut transform,
            velocity: &mut velocity,
            impulse: &mut impulse,
            local_center_of_mass: Vec3::ZERO,
        };

        vehicle_body.reset_upright(10.0);

        assert_eq!(transform.rotation, Quat::IDENTITY);
        assert_eq!(transform.translation, Vec3::new(3.0, 11.0, -2.0));
        assert_eq!(velocity.linvel, Vec3::ZERO);
        assert_eq!(velocity.angvel, Vec3::ZERO);
    }

    #[test]
    fn control_signal_lands_in_the_actuation_slots() {
        let mut actuation = WheelActuation::default();
        let mut transform = Transform::IDENTITY;
        let mut velocity = Velocity::zero();
        let mut impulse = ExternalImpulse::default();
        let mut vehicle_body = RapierVehicleBody {
            actuation: &mut actuation,
            transform: &mut transform,
            velocity: &mut velocity,
            impulse: &mut impulse,
            local_center_of_mass: Vec3::ZERO,
        };

        body::apply_control(
            &mut vehicle_body,
            &super::super::control::ControlSignal {
                engine_force: 300.0,
                braking_force: 3.0,
                steering_angle: 0.25,
                reactor_on: true,
            },
        );

        assert_eq!(actuation.steering[body::WHEEL_FRONT_LEFT], 0.25);
        assert_eq!(actuation.steering[body::WHEEL_FRONT_RIGHT], 0.25);
        assert_eq!(actuation.engine[body::WHEEL_REAR_LEFT], 300.0);
        assert_eq!(actuation.brake[body::WHEEL_REAR_RIGHT], 3.0);
    }
}
