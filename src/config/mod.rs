use bevy::prelude::*;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_DIR: &str = "config";

pub struct ConfigPlugin;

impl Plugin for ConfigPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, load_game_config)
            .add_systems(Update, reload_game_config_hotkey);
    }
}

fn load_game_config(mut commands: Commands) {
    let config = GameConfig::load_from_dir(Path::new(CONFIG_DIR)).unwrap_or_else(|error| {
        panic!("failed to load configuration from `{CONFIG_DIR}`: {error}");
    });

    log_config_summary("Loaded", &config);
    info!("Press F5 to hot-reload config files from `{CONFIG_DIR}`.");

    commands.insert_resource(config);
}

fn reload_game_config_hotkey(
    keyboard: Res<ButtonInput<KeyCode>>,
    game_config: Option<ResMut<GameConfig>>,
) {
    if !keyboard.just_pressed(KeyCode::F5) {
        return;
    }

    let Some(mut current_config) = game_config else {
        warn!("Config hot-reload requested, but `GameConfig` resource is not initialized yet.");
        return;
    };

    match GameConfig::load_from_dir(Path::new(CONFIG_DIR)) {
        Ok(new_config) => {
            *current_config = new_config;
            log_config_summary("Hot-reloaded", &current_config);
        }
        Err(error) => {
            error!("Config hot-reload failed; keeping previous config: {error}");
        }
    }
}

fn log_config_summary(prefix: &str, config: &GameConfig) {
    info!(
        "{prefix} config: {} vehicles, {} rooms, default vehicle `{}` in `{}`.",
        config.vehicles_by_id.len(),
        config.rooms_by_id.len(),
        config.game.app.default_vehicle,
        config.game.app.starting_room
    );
}

#[derive(Resource, Debug, Clone)]
pub struct GameConfig {
    pub game: GameFile,
    pub vehicles: VehiclesFile,
    pub rooms: RoomsFile,
    pub vehicles_by_id: HashMap<String, VehicleConfig>,
    pub rooms_by_id: HashMap<String, RoomConfig>,
}

impl GameConfig {
    pub fn load_from_dir(config_dir: &Path) -> Result<Self, ConfigError> {
        let game: GameFile = read_toml(&config_dir.join("game.toml"))?;
        let vehicles: VehiclesFile = read_toml(&config_dir.join("vehicles.toml"))?;
        let rooms: RoomsFile = read_toml(&config_dir.join("rooms.toml"))?;

        let config = Self {
            vehicles_by_id: to_index("vehicles.toml::vehicles", &vehicles.vehicles)?,
            rooms_by_id: to_index("rooms.toml::rooms", &rooms.rooms)?,
            game,
            vehicles,
            rooms,
        };

        config.validate_references()?;
        Ok(config)
    }

    // Both lookups are guaranteed by validate_references.
    pub fn default_vehicle(&self) -> &VehicleConfig {
        &self.vehicles_by_id[&self.game.app.default_vehicle]
    }

    pub fn starting_room(&self) -> &RoomConfig {
        &self.rooms_by_id[&self.game.app.starting_room]
    }

    fn validate_references(&self) -> Result<(), ConfigError> {
        if !self
            .vehicles_by_id
            .contains_key(&self.game.app.default_vehicle)
        {
            return Err(ConfigError::Validation(format!(
                "game.toml::app.default_vehicle references unknown vehicle id `{}`",
                self.game.app.default_vehicle
            )));
        }

        if !self.rooms_by_id.contains_key(&self.game.app.starting_room) {
            return Err(ConfigError::Validation(format!(
                "game.toml::app.starting_room references unknown room id `{}`",
                self.game.app.starting_room
            )));
        }

        if self.game.app.fixed_timestep_hz <= 0.0 {
            return Err(ConfigError::Validation(
                "game.toml::app.fixed_timestep_hz must be > 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.game.camera.damping) {
            return Err(ConfigError::Validation(
                "game.toml::camera.damping must be within [0, 1]".to_string(),
            ));
        }

        if self.game.gauge.max_speed_kph <= 0.0 {
            return Err(ConfigError::Validation(
                "game.toml::gauge.max_speed_kph must be > 0".to_string(),
            ));
        }

        for (index, vehicle) in self.vehicles.vehicles.iter().enumerate() {
            if vehicle.chassis_mass <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "vehicles.toml::vehicles[{index}].chassis_mass must be > 0"
                )));
            }
            if vehicle.engine_force <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "vehicles.toml::vehicles[{index}].engine_force must be > 0"
                )));
            }
            if vehicle.idle_brake_force < 0.0 || vehicle.hard_brake_force < 0.0 {
                return Err(ConfigError::Validation(format!(
                    "vehicles.toml::vehicles[{index}] brake forces must be >= 0"
                )));
            }
            if vehicle.hard_brake_force < vehicle.idle_brake_force {
                return Err(ConfigError::Validation(format!(
                    "vehicles.toml::vehicles[{index}].hard_brake_force must be >= idle_brake_force"
                )));
            }
            if vehicle.steering_clamp <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "vehicles.toml::vehicles[{index}].steering_clamp must be > 0"
                )));
            }
            if vehicle.steering_increment <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "vehicles.toml::vehicles[{index}].steering_increment must be > 0"
                )));
            }
            if !(0.0..1.0).contains(&vehicle.steering_decay) {
                return Err(ConfigError::Validation(format!(
                    "vehicles.toml::vehicles[{index}].steering_decay must be within [0, 1)"
                )));
            }
            if !(0.0..=1.0).contains(&vehicle.tilt_filter_factor) {
                return Err(ConfigError::Validation(format!(
                    "vehicles.toml::vehicles[{index}].tilt_filter_factor must be within [0, 1]"
                )));
            }
            if vehicle.wheel_radius <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "vehicles.toml::vehicles[{index}].wheel_radius must be > 0"
                )));
            }
            if vehicle.suspension_rest_length <= 0.0 || vehicle.suspension_travel <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "vehicles.toml::vehicles[{index}] suspension lengths must be > 0"
                )));
            }
            if vehicle.suspension_stiffness <= 0.0 || vehicle.suspension_damping < 0.0 {
                return Err(ConfigError::Validation(format!(
                    "vehicles.toml::vehicles[{index}] suspension stiffness must be > 0 and damping >= 0"
                )));
            }
            if vehicle.front_axle_offset <= vehicle.rear_axle_offset {
                return Err(ConfigError::Validation(format!(
                    "vehicles.toml::vehicles[{index}].front_axle_offset must be > rear_axle_offset"
                )));
            }
            if vehicle.recovery_sample_interval_ticks == 0 {
                return Err(ConfigError::Validation(format!(
                    "vehicles.toml::vehicles[{index}].recovery_sample_interval_ticks must be >= 1"
                )));
            }
            if vehicle.recovery_strikes_to_escalate == 0 {
                return Err(ConfigError::Validation(format!(
                    "vehicles.toml::vehicles[{index}].recovery_strikes_to_escalate must be >= 1"
                )));
            }
            if vehicle.recovery_attempts_before_reset == 0 {
                return Err(ConfigError::Validation(format!(
                    "vehicles.toml::vehicles[{index}].recovery_attempts_before_reset must be >= 1"
                )));
            }
            if !(-1.0..=1.0).contains(&vehicle.recovery_upright_threshold) {
                return Err(ConfigError::Validation(format!(
                    "vehicles.toml::vehicles[{index}].recovery_upright_threshold must be within [-1, 1]"
                )));
            }
            if vehicle.recovery_impulse <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "vehicles.toml::vehicles[{index}].recovery_impulse must be > 0"
                )));
            }
            if vehicle.recovery_impulse_offset < 0.0 {
                return Err(ConfigError::Validation(format!(
                    "vehicles.toml::vehicles[{index}].recovery_impulse_offset must be >= 0"
                )));
            }
            if vehicle.recovery_reset_lift <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "vehicles.toml::vehicles[{index}].recovery_reset_lift must be > 0"
                )));
            }
        }

        for (index, room) in self.rooms.rooms.iter().enumerate() {
            if room.gravity <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "rooms.toml::rooms[{index}].gravity must be > 0 (downward magnitude)"
                )));
            }
            if room.floor_half_extent <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "rooms.toml::rooms[{index}].floor_half_extent must be > 0"
                )));
            }
            if room.wall_height <= 0.0 || room.ceiling_height <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "rooms.toml::rooms[{index}] wall and ceiling heights must be > 0"
                )));
            }
            if room.block_scatter_radius > room.floor_half_extent {
                return Err(ConfigError::Validation(format!(
                    "rooms.toml::rooms[{index}].block_scatter_radius must fit inside floor_half_extent"
                )));
            }
            if room.ball_radius <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "rooms.toml::rooms[{index}].ball_radius must be > 0"
                )));
            }
            if !(0.0..=1.0).contains(&room.ball_restitution) {
                return Err(ConfigError::Validation(format!(
                    "rooms.toml::rooms[{index}].ball_restitution must be within [0, 1]"
                )));
            }
        }

        Ok(())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: Box<toml::de::Error>,
    },
    Validation(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read `{}`: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "failed to parse `{}`: {source}", path.display())
            }
            Self::Validation(message) => write!(f, "{message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source: Box::new(source),
    })
}

fn to_index<T>(label: &str, rows: &[T]) -> Result<HashMap<String, T>, ConfigError>
where
    T: HasId + Clone,
{
    let mut map = HashMap::new();

    for row in rows {
        let id = row.id();
        if id.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "{label} contains an empty id"
            )));
        }

        if map.insert(id.to_string(), row.clone()).is_some() {
            return Err(ConfigError::Validation(format!(
                "{label} contains duplicate id `{id}`"
            )));
        }
    }

    Ok(map)
}

trait HasId {
    fn id(&self) -> &str;
}

#[derive(Debug, Clone, Deserialize)]
pub struct GameFile {
    pub app: AppConfig,
    pub camera: CameraConfig,
    pub gauge: GaugeConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub fixed_timestep_hz: f32,
    pub default_vehicle: String,
    pub starting_room: String,
    pub debug_overlay: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    pub follow_height: f32,
    pub follow_distance: f32,
    pub damping: f32,
    pub in_car_offset: [f32; 3],
    pub spotlight_height: f32,
    pub spotlight_lookahead: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GaugeConfig {
    pub max_speed_kph: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VehiclesFile {
    pub vehicles: Vec<VehicleConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VehicleConfig {
    pub id: String,
    pub chassis_mass: f32,
    pub chassis_restitution: f32,
    pub chassis_friction: f32,
    pub chassis_half_extents: [f32; 3],

    pub engine_force: f32,
    pub idle_brake_force: f32,
    pub hard_brake_force: f32,
    pub steering_clamp: f32,
    pub steering_increment: f32,
    pub steering_decay: f32,
    pub center_steering_relax: f32,
    pub tilt_filter_factor: f32,
    pub tilt_steering_gain: f32,

    pub wheel_radius: f32,
    pub wheel_half_track: f32,
    pub front_axle_offset: f32,
    pub rear_axle_offset: f32,
    pub suspension_rest_length: f32,
    pub suspension_travel: f32,
    pub suspension_stiffness: f32,
    pub suspension_damping: f32,
    pub longitudinal_grip: f32,
    pub lateral_grip: f32,

    pub recovery_sample_interval_ticks: u32,
    pub recovery_strikes_to_escalate: u32,
    pub recovery_attempts_before_reset: u32,
    pub recovery_upright_threshold: f32,
    pub recovery_impulse: f32,
    pub recovery_impulse_offset: f32,
    pub recovery_reset_lift: f32,
}

impl HasId for VehicleConfig {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoomsFile {
    pub rooms: Vec<RoomConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoomConfig {
    pub id: String,
    pub gravity: f32,
    pub floor_half_extent: f32,
    pub wall_height: f32,
    pub ceiling_height: f32,
    pub vehicle_spawn: [f32; 3],
    pub block_count: u32,
    pub block_scatter_radius: f32,
    pub block_half_extent: f32,
    pub block_restitution: f32,
    pub block_friction: f32,
    pub ball_radius: f32,
    pub ball_restitution: f32,
    pub ball_spawn: [f32; 3],
    pub book_half_extents: [f32; 3],
    pub book_spawn: [f32; 3],
}

impl HasId for RoomConfig {
    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_vehicle(id: &str) -> VehicleConfig {
        VehicleConfig {
            id: id.to_string(),
            chassis_mass: 80.0,
            chassis_restitution: 0.1,
            chassis_friction: 0.5,
            chassis_half_extents: [1.1, 0.5, 2.0],
            engine_force: 300.0,
            idle_brake_force: 3.0,
            hard_brake_force: 100.0,
            steering_clamp: 0.6,
            steering_increment: 0.03,
            steering_decay: 0.8,
            center_steering_relax: 0.9,
            tilt_filter_factor: 0.5,
            tilt_steering_gain: 1.3,
            wheel_radius: 0.6,
            wheel_half_track: 1.1,
            front_axle_offset: 1.4,
            rear_axle_offset: -1.4,
            suspension_rest_length: 0.9,
            suspension_travel: 0.5,
            suspension_stiffness: 5200.0,
            suspension_damping: 620.0,
            longitudinal_grip: 5.5,
            lateral_grip: 7.0,
            recovery_sample_interval_ticks: 30,
            recovery_strikes_to_escalate: 3,
            recovery_attempts_before_reset: 3,
            recovery_upright_threshold: 0.1,
            recovery_impulse: 300.0,
            recovery_impulse_offset: 5.0,
            recovery_reset_lift: 10.0,
        }
    }

    fn sample_room(id: &str) -> RoomConfig {
        RoomConfig {
            id: id.to_string(),
            gravity: 9.81,
            floor_half_extent: 40.0,
            wall_height: 20.0,
            ceiling_height: 20.0,
            vehicle_spawn: [0.0, 2.0, 10.0],
            block_count: 12,
            block_scatter_radius: 18.0,
            block_half_extent: 1.2,
            block_restitution: 0.25,
            block_friction: 0.6,
            ball_radius: 2.2,
            ball_restitution: 0.9,
            ball_spawn: [-8.0, 4.0, -6.0],
            book_half_extents: [4.0, 0.3, 3.0],
            book_spawn: [9.0, 0.35, -4.0],
        }
    }

    fn sample_config() -> GameConfig {
        let vehicle = sample_vehicle("rc_buggy");
        let room = sample_room("playroom");
        GameConfig {
            game: GameFile {
                app: AppConfig {
                    fixed_timestep_hz: 60.0,
                    default_vehicle: "rc_buggy".to_string(),
                    starting_room: "playroom".to_string(),
                    debug_overlay: true,
                },
                camera: CameraConfig {
                    follow_height: 30.0,
                    follow_distance: 25.0,
                    damping: 0.3,
                    in_car_offset: [0.0, 3.5, 0.6],
                    spotlight_height: 12.0,
                    spotlight_lookahead: 4.0,
                },
                gauge: GaugeConfig {
                    max_speed_kph: 250.0,
                },
            },
            vehicles_by_id: HashMap::from([("rc_buggy".to_string(), vehicle.clone())]),
            rooms_by_id: HashMap::from([("playroom".to_string(), room.clone())]),
            vehicles: VehiclesFile {
                vehicles: vec![vehicle],
            },
            rooms: RoomsFile { rooms: vec![room] },
        }
    }

    #[test]
    fn sample_config_passes_validation() {
        sample_config()
            .validate_references()
            .expect("sample config should validate");
    }

    #[test]
    fn validation_fails_for_missing_vehicle_reference() {
        let mut config = sample_config();
        config.game.app.default_vehicle = "missing_vehicle".to_string();

        let error = config
            .validate_references()
            .expect_err("validation should fail");
        let message = error.to_string();

        assert!(message.contains("default_vehicle"));
        assert!(message.contains("missing_vehicle"));
    }

    #[test]
    fn validation_rejects_out_of_range_steering_decay() {
        let mut config = sample_config();
        config.vehicles.vehicles[0].steering_decay = 1.0;

        let error = config
            .validate_references()
            .expect_err("validation should fail");
        assert!(error.to_string().contains("steering_decay"));
    }
}
