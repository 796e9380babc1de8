use crate::config::GameConfig;
use crate::gameplay::vehicle::ChaseCamera;
use bevy::app::AppExit;
use bevy::prelude::*;
use bevy_rapier3d::prelude::*;

#[derive(States, Debug, Clone, Copy, Eq, PartialEq, Hash, Default)]
pub enum GameState {
    #[default]
    Boot,
    Driving,
    Pause,
}

pub struct GameStatePlugin;

impl Plugin for GameStatePlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, setup_camera)
            .add_systems(OnEnter(GameState::Boot), enter_boot)
            .add_systems(Update, boot_to_driving.run_if(in_state(GameState::Boot)))
            .add_systems(OnEnter(GameState::Driving), enter_driving)
            .add_systems(
                Update,
                driving_controls.run_if(in_state(GameState::Driving)),
            )
            .add_systems(OnEnter(GameState::Pause), enter_pause)
            .add_systems(OnExit(GameState::Pause), exit_pause)
            .add_systems(Update, pause_controls.run_if(in_state(GameState::Pause)));
    }
}

#[derive(Component)]
struct PauseOverlayRoot;

fn setup_camera(mut commands: Commands) {
    commands.spawn((
        Name::new("ChaseCamera"),
        ChaseCamera,
        Camera3d::default(),
        Transform::from_xyz(0.0, 30.0, 25.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));
}

fn enter_boot() {
    info!("Entered state: Boot");
}

fn boot_to_driving(
    config: Option<Res<GameConfig>>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    if config.is_some() {
        next_state.set(GameState::Driving);
    }
}

fn enter_driving() {
    info!("Entered state: Driving");
}

fn driving_controls(
    keyboard: Res<ButtonInput<KeyCode>>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    if keyboard.just_pressed(KeyCode::Escape) {
        next_state.set(GameState::Pause);
    }
}

/// Pause freezes the physics pipeline in place instead of tearing the scene
/// down, so resuming picks up mid-jump if that is where the car was.
fn enter_pause(
    mut commands: Commands,
    mut rapier_config_query: Query<&mut RapierConfiguration, With<DefaultRapierContext>>,
) {
    for mut rapier_config in rapier_config_query.iter_mut() {
        rapier_config.physics_pipeline_active = false;
    }

    commands
        .spawn((
            Name::new("PauseOverlay"),
            PauseOverlayRoot,
            Node {
                width: Val::Percent(100.0),
                height: Val::Percent(100.0),
                flex_direction: FlexDirection::Column,
                justify_content: JustifyContent::Center,
                align_items: AlignItems::Center,
                row_gap: Val::Px(12.0),
                ..default()
            },
            BackgroundColor(Color::srgba(0.01, 0.02, 0.03, 0.85)),
            ZIndex(300),
        ))
        .with_children(|overlay| {
            overlay.spawn((
                Text::new("PAUSED"),
                TextFont {
                    font_size: 52.0,
                    ..default()
                },
                TextColor(Color::srgb(0.94, 0.97, 1.00)),
            ));
            overlay.spawn((
                Text::new("Esc - Resume\nQ - Quit"),
                TextFont {
                    font_size: 22.0,
                    ..default()
                },
                TextColor(Color::srgb(0.90, 0.94, 0.98)),
            ));
        });

    info!("Entered state: Pause");
}

fn exit_pause(
    mut commands: Commands,
    mut rapier_config_query: Query<&mut RapierConfiguration, With<DefaultRapierContext>>,
    overlay_query: Query<Entity, With<PauseOverlayRoot>>,
) {
    for mut rapier_config in rapier_config_query.iter_mut() {
        rapier_config.physics_pipeline_active = true;
    }
    for entity in &overlay_query {
        commands.entity(entity).try_despawn();
    }
}

fn pause_controls(
    keyboard: Res<ButtonInput<KeyCode>>,
    mut next_state: ResMut<NextState<GameState>>,
    mut exit: MessageWriter<AppExit>,
) {
    if keyboard.just_pressed(KeyCode::Escape) {
        next_state.set(GameState::Driving);
    }

    if keyboard.just_pressed(KeyCode::KeyQ) {
        exit.write(AppExit::Success);
    }
}
