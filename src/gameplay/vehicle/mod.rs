pub mod body;
pub mod camera;
pub mod control;
pub mod recovery;

mod chassis;
mod runtime;
mod scene;

use crate::config::{GameConfig, VehicleConfig};
use crate::states::GameState;
use bevy::prelude::*;
use bevy_rapier3d::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use body::WHEEL_COUNT;
use chassis::*;
use control::{DriveController, DriveTuning, GamepadSnapshot};
use recovery::{RecoveryAction, RecoveryParams, UpsetRecovery};
use runtime::*;
use scene::*;

const SPEED_MPS_TO_KPH: f32 = 3.6;
const WHEEL_VISUAL_WIDTH: f32 = 0.35;
const REACTOR_GLOW_INTENSITY: f32 = 420_000.0;
const REACTOR_LOCAL_OFFSET: Vec3 = Vec3::new(0.0, 0.1, 2.2);

pub struct VehicleGameplayPlugin;

impl Plugin for VehicleGameplayPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<DriveInputState>()
            .init_resource::<DriveInputBindings>()
            .init_resource::<TiltFeed>()
            .init_resource::<DriveControllerState>()
            .init_resource::<RecoveryState>()
            .init_resource::<GameRng>()
            .init_resource::<VehicleTelemetry>()
            .init_resource::<CameraViewpoint>()
            .add_message::<UpsetRecoveryEvent>()
            .add_message::<SceneRestartEvent>()
            .add_message::<CameraViewToggleEvent>()
            .add_systems(OnEnter(GameState::Driving), spawn_vehicle_scene)
            .add_systems(
                Update,
                (
                    sync_fixed_timestep_from_config,
                    sync_rapier_gravity_from_config,
                    sync_controller_tuning_from_config,
                    read_drive_input,
                    emulate_tilt_from_keyboard,
                    request_scene_restart,
                    handle_scene_restart,
                    respawn_vehicle_scene,
                )
                    .chain()
                    .run_if(in_state(GameState::Driving))
                    .run_if(resource_exists::<GameConfig>),
            )
            .add_systems(
                Update,
                (
                    toggle_camera_viewpoint,
                    apply_camera_viewpoint,
                    camera_follow_vehicle,
                    place_car_spotlight,
                    update_reactor_glow,
                    update_wheel_visuals,
                )
                    .chain()
                    .run_if(in_state(GameState::Driving))
                    .run_if(resource_exists::<GameConfig>),
            )
            .add_systems(
                FixedUpdate,
                (
                    drive_vehicle,
                    solve_wheel_forces,
                    run_upset_recovery,
                    update_vehicle_telemetry,
                )
                    .chain()
                    .run_if(in_state(GameState::Driving))
                    .run_if(resource_exists::<GameConfig>),
            );
    }
}

#[derive(Component)]
pub struct PlayerVehicle;

/// Root of all room geometry and props; despawned wholesale on restart.
#[derive(Component)]
pub struct PlayroomRoot;

#[derive(Component)]
pub struct ChaseCamera;

#[derive(Component)]
pub struct InCarCamera;

#[derive(Component)]
pub struct CarSpotlight;

#[derive(Component, Debug, Clone, Copy)]
pub struct WheelVisual {
    pub wheel: usize,
    pub hardpoint_local: Vec3,
}

/// Exhaust emitter state. Rendering is a glow light on the same entity;
/// `birth_rate` is what the control signal drives.
#[derive(Component, Debug, Clone, Copy)]
pub struct ReactorEmitter {
    pub birth_rate: f32,
    pub default_birth_rate: f32,
}

/// Per-wheel actuation written by the controller and consumed by the
/// suspension solver on the same tick.
#[derive(Component, Debug, Clone, Copy)]
pub struct WheelActuation {
    pub steering: [f32; WHEEL_COUNT],
    pub engine: [f32; WHEEL_COUNT],
    pub brake: [f32; WHEEL_COUNT],
}

impl Default for WheelActuation {
    fn default() -> Self {
        Self {
            steering: [0.0; WHEEL_COUNT],
            engine: [0.0; WHEEL_COUNT],
            brake: [0.0; WHEEL_COUNT],
        }
    }
}

#[derive(Component, Debug, Clone, Copy)]
pub struct SuspensionState {
    pub spring_length: [f32; WHEEL_COUNT],
    pub prev_compression: [f32; WHEEL_COUNT],
    pub grounded: [bool; WHEEL_COUNT],
}

impl SuspensionState {
    fn at_rest(rest_length: f32) -> Self {
        Self {
            spring_length: [rest_length; WHEEL_COUNT],
            prev_compression: [0.0; WHEEL_COUNT],
            grounded: [false; WHEEL_COUNT],
        }
    }

    pub fn grounded_count(&self) -> u32 {
        self.grounded.iter().filter(|grounded| **grounded).count() as u32
    }
}

#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct DriveInputState {
    pub touch_count: u8,
    pub gamepad: Option<GamepadSnapshot>,
}

#[derive(Resource, Debug, Clone)]
pub struct DriveInputBindings {
    pub accelerate: Vec<KeyCode>,
    pub reverse: Vec<KeyCode>,
    pub brake: Vec<KeyCode>,
    pub steer_left: Vec<KeyCode>,
    pub steer_right: Vec<KeyCode>,
    pub tilt_left: Vec<KeyCode>,
    pub tilt_right: Vec<KeyCode>,
}

impl Default for DriveInputBindings {
    fn default() -> Self {
        Self {
            accelerate: vec![KeyCode::KeyW, KeyCode::ArrowUp],
            reverse: vec![KeyCode::KeyS, KeyCode::ArrowDown],
            brake: vec![KeyCode::Space],
            steer_left: vec![KeyCode::KeyA],
            steer_right: vec![KeyCode::KeyD],
            tilt_left: vec![KeyCode::ArrowLeft],
            tilt_right: vec![KeyCode::ArrowRight],
        }
    }
}

/// Latest accelerometer-style sample, newest wins. The fixed-tick consumer
/// drains it so a stalled feed falls back to the no-sample path.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct TiltFeed {
    pub latest: Option<Vec3>,
}

#[derive(Resource, Debug, Clone)]
pub struct DriveControllerState(pub DriveController);

impl Default for DriveControllerState {
    fn default() -> Self {
        Self(DriveController::new(DriveTuning::default()))
    }
}

#[derive(Resource, Debug, Clone, Default)]
pub struct RecoveryState(pub UpsetRecovery);

#[derive(Resource)]
pub struct GameRng(pub StdRng);

impl Default for GameRng {
    fn default() -> Self {
        Self(StdRng::from_entropy())
    }
}

#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct CameraViewpoint {
    pub in_car: bool,
}

#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct VehicleTelemetry {
    pub speed_mps: f32,
    pub speed_kph: f32,
    pub steering_angle: f32,
    pub engine_force: f32,
    pub braking_force: f32,
    pub reactor_on: bool,
    pub upright_value: f32,
    pub grounded_wheels: u32,
    pub touch_count: u8,
    pub gamepad_connected: bool,
    pub recovery_strikes: u32,
    pub recovery_attempts: u32,
}

#[derive(Message, Debug, Clone, Copy)]
pub struct UpsetRecoveryEvent {
    pub action: RecoveryAction,
    pub upright_value: f32,
}

#[derive(Message, Debug, Clone, Copy)]
pub struct SceneRestartEvent;

#[derive(Message, Debug, Clone, Copy)]
pub struct CameraViewToggleEvent;

fn drive_tuning_from_config(vehicle: &VehicleConfig) -> DriveTuning {
    DriveTuning {
        engine_force: vehicle.engine_force,
        idle_brake_force: vehicle.idle_brake_force,
        hard_brake_force: vehicle.hard_brake_force,
        steering_clamp: vehicle.steering_clamp,
        steering_increment: vehicle.steering_increment,
        steering_decay: vehicle.steering_decay,
        center_steering_relax: vehicle.center_steering_relax,
        tilt_filter_factor: vehicle.tilt_filter_factor,
        tilt_steering_gain: vehicle.tilt_steering_gain,
    }
}

fn recovery_params_from_config(vehicle: &VehicleConfig) -> RecoveryParams {
    RecoveryParams {
        sample_interval_ticks: vehicle.recovery_sample_interval_ticks,
        strikes_to_escalate: vehicle.recovery_strikes_to_escalate,
        attempts_before_reset: vehicle.recovery_attempts_before_reset,
        upright_threshold: vehicle.recovery_upright_threshold,
        impulse: vehicle.recovery_impulse,
        impulse_offset: vehicle.recovery_impulse_offset,
        reset_lift: vehicle.recovery_reset_lift,
    }
}
