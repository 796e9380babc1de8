use crate::config::GameConfig;
use crate::gameplay::vehicle::{DriveControllerState, PlayerVehicle, VehicleTelemetry};
use crate::states::GameState;
use bevy::diagnostic::{DiagnosticsStore, FrameTimeDiagnosticsPlugin};
use bevy::prelude::*;
use bevy_rapier3d::prelude::ExternalImpulse;

// Strong enough to roll the default buggy onto its roof.
const FLIP_TEST_TORQUE_IMPULSE: f32 = 620.0;

pub struct DebugOverlayPlugin;

impl Plugin for DebugOverlayPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<KeybindOverlayState>()
            .add_systems(Update, spawn_debug_overlay)
            .add_systems(Update, toggle_keybind_overlay)
            .add_systems(Update, sync_keybind_overlay_visibility)
            .add_systems(
                Update,
                (update_debug_overlay_text, flip_vehicle_for_testing)
                    .run_if(in_state(GameState::Driving))
                    .run_if(resource_exists::<GameConfig>),
            );
    }
}

#[derive(Component)]
struct DebugOverlayText;

#[derive(Component)]
struct KeybindOverlayText;

#[derive(Resource, Debug, Clone, Default)]
struct KeybindOverlayState {
    visible: bool,
}

fn spawn_debug_overlay(
    mut commands: Commands,
    keybind_overlay: Res<KeybindOverlayState>,
    config: Option<Res<GameConfig>>,
    existing_overlay: Query<Entity, With<DebugOverlayText>>,
) {
    if !existing_overlay.is_empty() {
        return;
    }

    let Some(config) = config else {
        return;
    };

    if !config.game.app.debug_overlay {
        return;
    }

    commands.spawn((
        DebugOverlayText,
        Text::new("debug overlay initializing..."),
        TextFont {
            font_size: 16.0,
            ..default()
        },
        TextColor(Color::srgb(0.92, 0.95, 0.97)),
        Node {
            position_type: PositionType::Absolute,
            left: Val::Px(12.0),
            top: Val::Px(12.0),
            ..default()
        },
        ZIndex(100),
    ));

    commands.spawn((
        KeybindOverlayText,
        Text::new(keybind_overlay_text()),
        TextFont {
            font_size: 15.0,
            ..default()
        },
        TextColor(Color::srgb(0.90, 0.94, 0.97)),
        BackgroundColor(Color::srgba(0.06, 0.08, 0.10, 0.82)),
        BorderColor::all(Color::srgba(0.60, 0.68, 0.74, 0.9)),
        Node {
            position_type: PositionType::Absolute,
            left: Val::Px(12.0),
            top: Val::Px(190.0),
            padding: UiRect::axes(Val::Px(10.0), Val::Px(8.0)),
            border: UiRect::all(Val::Px(1.0)),
            ..default()
        },
        if keybind_overlay.visible {
            Visibility::Inherited
        } else {
            Visibility::Hidden
        },
        ZIndex(100),
    ));
}

fn update_debug_overlay_text(
    diagnostics: Res<DiagnosticsStore>,
    telemetry: Res<VehicleTelemetry>,
    controller: Res<DriveControllerState>,
    mut overlay_query: Query<&mut Text, With<DebugOverlayText>>,
) {
    let Ok(mut text) = overlay_query.single_mut() else {
        return;
    };

    let fps = diagnostics
        .get(&FrameTimeDiagnosticsPlugin::FPS)
        .and_then(|value| value.smoothed())
        .unwrap_or(0.0);

    let filtered_tilt = controller.0.filtered_tilt();

    *text = Text::new(format!(
        "FPS: {fps:>5.1}\nSpeed: {speed:>6.1} kph ({mps:>5.1} m/s)\nSteering: {steering:+.3} | Accumulator: {accum:+.3}\nFiltered Tilt: ({tx:+.2}, {ty:+.2})\nEngine: {engine:>5.0} | Brake: {brake:>5.0} | Reactor: {reactor}\nUpright: {upright:+.2} | Grounded Wheels: {wheels}/4\nTouches: {touches} | Gamepad: {gamepad}\nRecovery: {strikes} strikes, {attempts} attempts\nHotkeys: H help | T flip car | F5 reload config",
        speed = telemetry.speed_kph,
        mps = telemetry.speed_mps,
        steering = telemetry.steering_angle,
        accum = controller.0.steering_accumulator(),
        tx = filtered_tilt.x,
        ty = filtered_tilt.y,
        engine = telemetry.engine_force,
        brake = telemetry.braking_force,
        reactor = if telemetry.reactor_on { "on" } else { "off" },
        upright = telemetry.upright_value,
        wheels = telemetry.grounded_wheels,
        touches = telemetry.touch_count,
        gamepad = if telemetry.gamepad_connected { "yes" } else { "no" },
        strikes = telemetry.recovery_strikes,
        attempts = telemetry.recovery_attempts,
    ));
}

fn toggle_keybind_overlay(
    keyboard: Res<ButtonInput<KeyCode>>,
    mut state: ResMut<KeybindOverlayState>,
    config: Option<Res<GameConfig>>,
) {
    let Some(config) = config else {
        return;
    };

    if !config.game.app.debug_overlay {
        return;
    }

    if keyboard.just_pressed(KeyCode::KeyH) {
        state.visible = !state.visible;
        info!(
            "Debug keybind panel {}.",
            if state.visible { "shown" } else { "hidden" }
        );
    }
}

fn sync_keybind_overlay_visibility(
    state: Res<KeybindOverlayState>,
    mut query: Query<&mut Visibility, With<KeybindOverlayText>>,
) {
    if !state.is_changed() {
        return;
    }

    let next_visibility = if state.visible {
        Visibility::Inherited
    } else {
        Visibility::Hidden
    };

    for mut visibility in &mut query {
        *visibility = next_visibility;
    }
}

/// Kicks the car with a roll impulse so the recovery ladder can be watched
/// without hunting for a real crash.
fn flip_vehicle_for_testing(
    keyboard: Res<ButtonInput<KeyCode>>,
    config: Res<GameConfig>,
    mut vehicle_query: Query<&mut ExternalImpulse, With<PlayerVehicle>>,
) {
    if !config.game.app.debug_overlay {
        return;
    }
    if !keyboard.just_pressed(KeyCode::KeyT) {
        return;
    }

    let Ok(mut impulse) = vehicle_query.single_mut() else {
        return;
    };
    impulse.torque_impulse += Vec3::Z * FLIP_TEST_TORQUE_IMPULSE;
    info!("Applied flip-test torque impulse");
}

fn keybind_overlay_text() -> &'static str {
    "Keybinds\n\
H - Toggle this panel\n\
W / Up - Accelerate\n\
S / Down - Reverse\n\
Space - Brake\n\
A / D - Digital steering\n\
Left / Right - Emulated tilt steering\n\
C - Toggle chase / in-car camera\n\
R - Restart scene\n\
T - Flip the car (recovery test)\n\
F5 - Hot-reload config\n\
Esc - Pause / resume\n\
Q - Quit from pause"
}
