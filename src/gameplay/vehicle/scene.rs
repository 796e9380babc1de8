use std::f32::consts::FRAC_PI_2;

use rand::Rng;

use super::chassis::wheel_hardpoints;
use super::*;
use crate::config::{RoomConfig, VehicleConfig};

const FLOOR_THICKNESS: f32 = 1.0;
const WALL_THICKNESS: f32 = 1.0;

pub(super) fn spawn_vehicle_scene(
    commands: Commands,
    meshes: ResMut<Assets<Mesh>>,
    materials: ResMut<Assets<StandardMaterial>>,
    config: Res<GameConfig>,
    rng: ResMut<GameRng>,
    existing_query: Query<(), Or<(With<PlayerVehicle>, With<PlayroomRoot>)>>,
) {
    respawn_vehicle_scene(commands, meshes, materials, config, rng, existing_query);
}

/// Rebuilds the playroom whenever nothing from the previous one is left.
/// Restart tears the old scene down one frame earlier, so this doubles as
/// the restart path.
pub(super) fn respawn_vehicle_scene(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    config: Res<GameConfig>,
    mut rng: ResMut<GameRng>,
    existing_query: Query<(), Or<(With<PlayerVehicle>, With<PlayroomRoot>)>>,
) {
    if !existing_query.is_empty() {
        return;
    }

    let room = config.starting_room();
    let vehicle = config.default_vehicle();
    let in_car_offset = Vec3::from_array(config.game.camera.in_car_offset);
    spawn_playroom(&mut commands, &mut meshes, &mut materials, room, &mut rng.0);
    spawn_player_vehicle(
        &mut commands,
        &mut meshes,
        &mut materials,
        room,
        vehicle,
        in_car_offset,
    );
    info!(
        room = room.id.as_str(),
        vehicle = vehicle.id.as_str(),
        "Spawned playroom scene"
    );
}

fn spawn_playroom(
    commands: &mut Commands,
    meshes: &mut Assets<Mesh>,
    materials: &mut Assets<StandardMaterial>,
    room: &RoomConfig,
    rng: &mut impl Rng,
) {
    let half = room.floor_half_extent;
    let floor_material = materials.add(StandardMaterial {
        base_color: Color::srgb(0.55, 0.45, 0.35),
        perceptual_roughness: 0.9,
        ..Default::default()
    });
    let wall_material = materials.add(StandardMaterial {
        base_color: Color::srgb(0.75, 0.72, 0.65),
        perceptual_roughness: 1.0,
        ..Default::default()
    });
    let block_material = materials.add(StandardMaterial {
        base_color: Color::srgb(0.85, 0.3, 0.25),
        ..Default::default()
    });
    let ball_material = materials.add(StandardMaterial {
        base_color: Color::srgb(0.2, 0.4, 0.85),
        perceptual_roughness: 0.3,
        ..Default::default()
    });
    let book_material = materials.add(StandardMaterial {
        base_color: Color::srgb(0.3, 0.55, 0.3),
        ..Default::default()
    });

    commands
        .spawn((
            PlayroomRoot,
            Transform::IDENTITY,
            Visibility::default(),
            Name::new("playroom"),
        ))
        .with_children(|root| {
            // Floor slab, top surface at y = 0.
            root.spawn((
                Mesh3d(meshes.add(Cuboid::new(half * 2.0, FLOOR_THICKNESS, half * 2.0))),
                MeshMaterial3d(floor_material.clone()),
                Transform::from_xyz(0.0, -FLOOR_THICKNESS / 2.0, 0.0),
                RigidBody::Fixed,
                Collider::cuboid(half, FLOOR_THICKNESS / 2.0, half),
                Friction::coefficient(1.0),
                Restitution::coefficient(0.0),
            ));

            let wall_half_height = room.wall_height / 2.0;
            for (position, wall_half_extents) in [
                (
                    Vec3::new(half, wall_half_height, 0.0),
                    Vec3::new(WALL_THICKNESS / 2.0, wall_half_height, half),
                ),
                (
                    Vec3::new(-half, wall_half_height, 0.0),
                    Vec3::new(WALL_THICKNESS / 2.0, wall_half_height, half),
                ),
                (
                    Vec3::new(0.0, wall_half_height, half),
                    Vec3::new(half, wall_half_height, WALL_THICKNESS / 2.0),
                ),
                (
                    Vec3::new(0.0, wall_half_height, -half),
                    Vec3::new(half, wall_half_height, WALL_THICKNESS / 2.0),
                ),
            ] {
                root.spawn((
                    Mesh3d(meshes.add(Cuboid::from_size(wall_half_extents * 2.0))),
                    MeshMaterial3d(wall_material.clone()),
                    Transform::from_translation(position),
                    RigidBody::Fixed,
                    Collider::cuboid(
                        wall_half_extents.x,
                        wall_half_extents.y,
                        wall_half_extents.z,
                    ),
                ));
            }

            // Invisible lid so recovery impulses cannot punt anything out of
            // the room.
            root.spawn((
                Transform::from_xyz(0.0, room.ceiling_height, 0.0),
                RigidBody::Fixed,
                Collider::cuboid(half, WALL_THICKNESS / 2.0, half),
            ));

            for _ in 0..room.block_count {
                let scatter = room.block_scatter_radius;
                let position = Vec3::new(
                    rng.gen_range(-scatter..=scatter),
                    room.block_half_extent + rng.gen_range(0.0..=2.0),
                    rng.gen_range(-scatter..=scatter),
                );
                root.spawn((
                    Mesh3d(
                        meshes.add(Cuboid::from_size(Vec3::splat(room.block_half_extent * 2.0))),
                    ),
                    MeshMaterial3d(block_material.clone()),
                    Transform::from_translation(position)
                        .with_rotation(Quat::from_rotation_y(rng.gen_range(0.0..FRAC_PI_2))),
                    RigidBody::Dynamic,
                    Collider::cuboid(
                        room.block_half_extent,
                        room.block_half_extent,
                        room.block_half_extent,
                    ),
                    Restitution::coefficient(room.block_restitution),
                    Friction::coefficient(room.block_friction),
                ));
            }

            root.spawn((
                Mesh3d(meshes.add(Sphere::new(room.ball_radius))),
                MeshMaterial3d(ball_material),
                Transform::from_translation(Vec3::from_array(room.ball_spawn)),
                RigidBody::Dynamic,
                Collider::ball(room.ball_radius),
                Restitution::coefficient(room.ball_restitution),
            ));

            let book = Vec3::from_array(room.book_half_extents);
            root.spawn((
                Mesh3d(meshes.add(Cuboid::from_size(book * 2.0))),
                MeshMaterial3d(book_material),
                Transform::from_translation(Vec3::from_array(room.book_spawn)),
                RigidBody::Fixed,
                Collider::cuboid(book.x, book.y, book.z),
            ));

            root.spawn((
                PointLight {
                    intensity: 2_000_000.0,
                    range: half * 4.0,
                    shadows_enabled: true,
                    ..Default::default()
                },
                Transform::from_xyz(0.0, room.ceiling_height - 2.0, 0.0),
            ));

            root.spawn((
                CarSpotlight,
                SpotLight {
                    intensity: 1_500_000.0,
                    range: half * 2.0,
                    outer_angle: 0.7,
                    shadows_enabled: true,
                    ..Default::default()
                },
                Transform::from_xyz(0.0, 12.0, 0.0).looking_at(Vec3::ZERO, Vec3::NEG_Z),
            ));
        });
}

fn spawn_player_vehicle(
    commands: &mut Commands,
    meshes: &mut Assets<Mesh>,
    materials: &mut Assets<StandardMaterial>,
    room: &RoomConfig,
    vehicle: &VehicleConfig,
    in_car_offset: Vec3,
) {
    let half_extents = Vec3::from_array(vehicle.chassis_half_extents);
    let hardpoints = wheel_hardpoints(vehicle);

    let chassis_material = materials.add(StandardMaterial {
        base_color: Color::srgb(0.9, 0.75, 0.1),
        perceptual_roughness: 0.4,
        ..Default::default()
    });
    let wheel_material = materials.add(StandardMaterial {
        base_color: Color::srgb(0.08, 0.08, 0.08),
        perceptual_roughness: 0.8,
        ..Default::default()
    });
    let wheel_mesh = meshes.add(Cylinder::new(vehicle.wheel_radius, WHEEL_VISUAL_WIDTH));

    commands
        .spawn((
            PlayerVehicle,
            Name::new("player_vehicle"),
            Mesh3d(meshes.add(Cuboid::from_size(half_extents * 2.0))),
            MeshMaterial3d(chassis_material),
            Transform::from_translation(Vec3::from_array(room.vehicle_spawn)),
            RigidBody::Dynamic,
            Collider::cuboid(half_extents.x, half_extents.y, half_extents.z),
            ColliderMassProperties::Mass(vehicle.chassis_mass),
            Restitution::coefficient(vehicle.chassis_restitution),
            Friction::coefficient(vehicle.chassis_friction),
            (
                Velocity::zero(),
                ExternalForce::default(),
                ExternalImpulse::default(),
                Damping {
                    linear_damping: 0.05,
                    angular_damping: 0.8,
                },
                GravityScale(1.0),
                ReadMassProperties::default(),
                WheelActuation::default(),
                SuspensionState::at_rest(vehicle.suspension_rest_length),
            ),
        ))
        .with_children(|car| {
            for (wheel, hardpoint_local) in hardpoints.into_iter().enumerate() {
                car.spawn((
                    WheelVisual {
                        wheel,
                        hardpoint_local,
                    },
                    Mesh3d(wheel_mesh.clone()),
                    MeshMaterial3d(wheel_material.clone()),
                    Transform::from_translation(
                        hardpoint_local - Vec3::Y * vehicle.suspension_rest_length,
                    )
                    .with_rotation(Quat::from_rotation_z(FRAC_PI_2)),
                ));
            }

            car.spawn((
                ReactorEmitter {
                    birth_rate: 0.0,
                    default_birth_rate: 1.0,
                },
                PointLight {
                    intensity: 0.0,
                    color: Color::srgb(1.0, 0.55, 0.15),
                    range: 8.0,
                    ..Default::default()
                },
                Transform::from_translation(REACTOR_LOCAL_OFFSET),
            ));

            car.spawn((
                InCarCamera,
                Camera3d::default(),
                Camera {
                    is_active: false,
                    order: 1,
                    ..Default::default()
                },
                Transform::from_translation(in_car_offset)
                    .looking_at(in_car_offset + Vec3::new(0.0, -0.1, -1.0) * 20.0, Vec3::Y),
            ));
        });
}
