use std::f32::consts::PI;

use crate::config::GameConfig;
use crate::gameplay::vehicle::{CameraViewToggleEvent, SceneRestartEvent, VehicleTelemetry};
use crate::states::GameState;
use bevy::prelude::*;
use bevy_egui::{egui, EguiContexts, EguiPrimaryContextPass};

const HUD_PANEL_Z_INDEX: i32 = 190;
const HUD_PANEL_BG: Color = Color::srgba(0.06, 0.09, 0.12, 0.86);
const HUD_PANEL_BORDER: Color = Color::srgba(0.58, 0.68, 0.76, 0.92);
const HUD_TEXT_PRIMARY: Color = Color::srgb(0.94, 0.97, 1.0);
const HUD_TEXT_MUTED: Color = Color::srgb(0.76, 0.83, 0.9);

const GAUGE_SIZE: egui::Vec2 = egui::vec2(220.0, 130.0);
const GAUGE_ARC_SEGMENTS: usize = 48;
const GAUGE_MAJOR_TICKS: u32 = 5;

pub struct GameHudPlugin;

impl Plugin for GameHudPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(OnEnter(GameState::Driving), spawn_game_hud)
            .add_systems(
                Update,
                update_game_hud
                    .run_if(in_state(GameState::Driving))
                    .run_if(resource_exists::<GameConfig>),
            )
            .add_systems(
                EguiPrimaryContextPass,
                speedometer_ui
                    .run_if(in_state(GameState::Driving))
                    .run_if(resource_exists::<GameConfig>),
            );
    }
}

#[derive(Component)]
struct GameHudRoot;

#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
enum HudTextKind {
    Drive,
    Recovery,
}

fn spawn_game_hud(mut commands: Commands, existing_hud: Query<Entity, With<GameHudRoot>>) {
    if !existing_hud.is_empty() {
        return;
    }

    commands
        .spawn((
            Name::new("GameHudRoot"),
            GameHudRoot,
            Node {
                position_type: PositionType::Absolute,
                right: Val::Px(12.0),
                top: Val::Px(10.0),
                flex_direction: FlexDirection::Column,
                row_gap: Val::Px(6.0),
                padding: UiRect::all(Val::Px(12.0)),
                border: UiRect::all(Val::Px(1.0)),
                ..default()
            },
            BackgroundColor(HUD_PANEL_BG),
            BorderColor::all(HUD_PANEL_BORDER),
            ZIndex(HUD_PANEL_Z_INDEX),
        ))
        .with_children(|panel| {
            panel.spawn((
                HudTextKind::Drive,
                Text::new("Speed 0.0 kph"),
                TextFont {
                    font_size: 22.0,
                    ..default()
                },
                TextColor(HUD_TEXT_PRIMARY),
            ));
            panel.spawn((
                HudTextKind::Recovery,
                Text::new("Upright 1.00"),
                TextFont {
                    font_size: 16.0,
                    ..default()
                },
                TextColor(HUD_TEXT_MUTED),
            ));
        });
}

fn update_game_hud(
    telemetry: Res<VehicleTelemetry>,
    mut text_query: Query<(&HudTextKind, &mut Text)>,
) {
    for (kind, mut text) in &mut text_query {
        match kind {
            HudTextKind::Drive => {
                *text = Text::new(format!(
                    "Speed {speed:.1} kph | Steering {steering:+.2}\nEngine {engine:.0} | Brake {brake:.0}{reactor}",
                    speed = telemetry.speed_kph,
                    steering = telemetry.steering_angle,
                    engine = telemetry.engine_force,
                    brake = telemetry.braking_force,
                    reactor = if telemetry.reactor_on { " | reactor" } else { "" },
                ));
            }
            HudTextKind::Recovery => {
                *text = Text::new(format!(
                    "Upright {upright:+.2} | Wheels {wheels}/4 | Strikes {strikes} | Attempts {attempts}",
                    upright = telemetry.upright_value,
                    wheels = telemetry.grounded_wheels,
                    strikes = telemetry.recovery_strikes,
                    attempts = telemetry.recovery_attempts,
                ));
            }
        }
    }
}

/// Needle rotation in radians for a dial that sweeps half a turn from the
/// zero stop. Speeds past the dial maximum pin the needle.
fn needle_angle(speed_kph: f32, max_speed_kph: f32) -> f32 {
    let max = max_speed_kph.max(1.0);
    -speed_kph.clamp(0.0, max) * PI / max
}

fn dial_point(center: egui::Pos2, radius: f32, angle: f32) -> egui::Pos2 {
    // Angle 0 points at the left stop; the sweep is negative toward the
    // right stop, mirroring the needle rotation convention.
    let theta = PI + angle;
    center + egui::vec2(theta.cos() * radius, -theta.sin() * radius)
}

fn speedometer_ui(
    mut egui_contexts: EguiContexts,
    config: Res<GameConfig>,
    telemetry: Res<VehicleTelemetry>,
    mut camera_toggles: MessageWriter<CameraViewToggleEvent>,
    mut restarts: MessageWriter<SceneRestartEvent>,
) {
    let Ok(ctx) = egui_contexts.ctx_mut() else {
        return;
    };

    let max_speed = config.game.gauge.max_speed_kph;
    egui::Window::new("Speedometer")
        .anchor(egui::Align2::LEFT_BOTTOM, egui::vec2(12.0, -12.0))
        .resizable(false)
        .title_bar(false)
        .show(ctx, |ui| {
            let (response, painter) = ui.allocate_painter(GAUGE_SIZE, egui::Sense::hover());
            let rect = response.rect;
            let center = egui::pos2(rect.center().x, rect.bottom() - 18.0);
            let radius = (rect.width() / 2.0 - 12.0).min(rect.height() - 30.0);

            let arc_points: Vec<egui::Pos2> = (0..=GAUGE_ARC_SEGMENTS)
                .map(|segment| {
                    let angle = -(segment as f32 / GAUGE_ARC_SEGMENTS as f32) * PI;
                    dial_point(center, radius, angle)
                })
                .collect();
            painter.add(egui::Shape::line(
                arc_points,
                egui::Stroke::new(2.0, egui::Color32::from_gray(190)),
            ));

            for tick in 0..=GAUGE_MAJOR_TICKS {
                let fraction = tick as f32 / GAUGE_MAJOR_TICKS as f32;
                let angle = -fraction * PI;
                painter.line_segment(
                    [
                        dial_point(center, radius - 8.0, angle),
                        dial_point(center, radius, angle),
                    ],
                    egui::Stroke::new(2.0, egui::Color32::from_gray(190)),
                );
                painter.text(
                    dial_point(center, radius - 20.0, angle),
                    egui::Align2::CENTER_CENTER,
                    format!("{:.0}", fraction * max_speed),
                    egui::FontId::proportional(10.0),
                    egui::Color32::from_gray(160),
                );
            }

            let needle = needle_angle(telemetry.speed_kph, max_speed);
            painter.line_segment(
                [center, dial_point(center, radius - 12.0, needle)],
                egui::Stroke::new(3.0, egui::Color32::from_rgb(230, 80, 60)),
            );
            painter.circle_filled(center, 4.0, egui::Color32::from_gray(220));
            painter.text(
                egui::pos2(center.x, rect.bottom() - 4.0),
                egui::Align2::CENTER_BOTTOM,
                format!("{:.0} kph", telemetry.speed_kph),
                egui::FontId::proportional(14.0),
                egui::Color32::from_gray(220),
            );

            ui.horizontal(|ui| {
                if ui.button("Camera (C)").clicked() {
                    camera_toggles.write(CameraViewToggleEvent);
                }
                if ui.button("Restart (R)").clicked() {
                    restarts.write(SceneRestartEvent);
                }
            });
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needle_rests_at_the_zero_stop() {
        assert_eq!(needle_angle(0.0, 250.0), 0.0);
    }

    #[test]
    fn needle_sweeps_half_a_turn_at_the_dial_maximum() {
        assert!((needle_angle(250.0, 250.0) + PI).abs() < 1e-6);
        assert!((needle_angle(125.0, 250.0) + PI / 2.0).abs() < 1e-6);
    }

    #[test]
    fn needle_pins_past_the_dial_maximum() {
        assert_eq!(needle_angle(900.0, 250.0), needle_angle(250.0, 250.0));
        assert_eq!(needle_angle(-40.0, 250.0), 0.0);
    }
}
