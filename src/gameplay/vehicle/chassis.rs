use super::*;
use crate::config::VehicleConfig;

const GROUND_RAYCAST_SLACK: f32 = 1.5;
const GROUND_EPSILON: f32 = 0.05;
const SUSPENSION_FORCE_CLAMP_N: f32 = 2_400.0;
const MIN_DRIVEABLE_GROUND_NORMAL_Y: f32 = 0.35;
const MIN_SUSPENSION_DOWN_ALIGNMENT: f32 = 0.1;
const TRACTION_FLOOR: f32 = 0.3;
const BRAKE_SPEED_DEADBAND_MPS: f32 = 0.15;
const LATERAL_FRICTION_CLAMP_RATIO: f32 = 1.6;

/// Wheel attachment points in chassis space. Forward is -Z, so the front
/// axle sits at negative z. Order matches the wheel index constants.
pub(super) fn wheel_hardpoints(vehicle: &VehicleConfig) -> [Vec3; WHEEL_COUNT] {
    let underside_y = -vehicle.chassis_half_extents[1];
    let track = vehicle.wheel_half_track;
    let front_z = -vehicle.front_axle_offset;
    let rear_z = -vehicle.rear_axle_offset;
    [
        Vec3::new(-track, underside_y, front_z),
        Vec3::new(track, underside_y, front_z),
        Vec3::new(-track, underside_y, rear_z),
        Vec3::new(track, underside_y, rear_z),
    ]
}

#[derive(Debug, Clone, Copy)]
struct WheelSample {
    compression: f32,
    compression_ratio: f32,
    support_force: f32,
    ground_normal: Vec3,
}

/// Raycast one wheel straight down the chassis up-axis and evaluate the
/// spring at the hit distance. Mirrors the per-axle sampling the control
/// tick relies on: no hit within reach means the wheel carries nothing.
#[allow(clippy::too_many_arguments)]
fn sample_wheel_suspension(
    rapier_context: &RapierContext<'_>,
    chassis_entity: Entity,
    hardpoint_world: Vec3,
    down_world: Vec3,
    prev_compression: f32,
    vehicle: &VehicleConfig,
    dt: f32,
) -> (f32, WheelSample, bool) {
    let rest_length = vehicle.suspension_rest_length.max(0.01);
    let min_length = (rest_length - vehicle.suspension_travel).max(0.02);
    let max_length = rest_length + vehicle.suspension_travel;
    let max_compression = (rest_length - min_length).max(0.001);

    let down_alignment = down_world.dot(Vec3::NEG_Y);
    let detached = WheelSample {
        compression: 0.0,
        compression_ratio: 0.0,
        support_force: 0.0,
        ground_normal: Vec3::Y,
    };
    if down_world.length_squared() <= f32::EPSILON {
        return (max_length, detached, false);
    }

    let ray_length = max_length + vehicle.wheel_radius + GROUND_RAYCAST_SLACK;
    let ray_filter = QueryFilter::only_fixed()
        .exclude_sensors()
        .exclude_rigid_body(chassis_entity);
    let hit = rapier_context.cast_ray_and_get_normal(
        hardpoint_world,
        down_world,
        ray_length,
        false,
        ray_filter,
    );
    let hit_toi = hit.map(|(_, intersection)| intersection.time_of_impact);
    let hit_normal = hit
        .map(|(_, intersection)| intersection.normal.normalize_or_zero())
        .unwrap_or(Vec3::Y);

    let contact_length = hit_toi
        .map(|toi| (toi - vehicle.wheel_radius).max(0.0))
        .unwrap_or(max_length + GROUND_RAYCAST_SLACK);
    let grounded = contact_length <= (max_length + GROUND_EPSILON)
        && hit_normal.y >= MIN_DRIVEABLE_GROUND_NORMAL_Y
        && down_alignment >= MIN_SUSPENSION_DOWN_ALIGNMENT;

    let spring_length = if grounded {
        contact_length.clamp(min_length, max_length)
    } else {
        max_length
    };
    let compression = (rest_length - spring_length).clamp(0.0, max_compression);
    let compression_velocity = (compression - prev_compression) / dt.max(0.000_1);
    let support_force = if grounded {
        ((compression * vehicle.suspension_stiffness)
            + (compression_velocity * vehicle.suspension_damping))
            .clamp(0.0, SUSPENSION_FORCE_CLAMP_N)
            * hit_normal.y.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let compression_ratio = (compression / max_compression).clamp(0.0, 1.0);

    (
        spring_length,
        WheelSample {
            compression,
            compression_ratio,
            support_force,
            ground_normal: hit_normal,
        },
        grounded,
    )
}

/// Converts the per-wheel actuation into rapier forces: spring support at
/// each contact, drive and brake along the steered wheel heading, and a
/// lateral friction term that keeps the tires from skating sideways.
pub(super) fn solve_wheel_forces(
    time: Res<Time>,
    config: Res<GameConfig>,
    rapier_context: ReadRapierContext,
    mut player_query: Query<
        (
            Entity,
            &Transform,
            &Velocity,
            &WheelActuation,
            &mut SuspensionState,
            &mut ExternalForce,
            Option<&ReadMassProperties>,
        ),
        With<PlayerVehicle>,
    >,
) {
    let Ok(rapier_context) = rapier_context.single() else {
        return;
    };
    let Ok((
        chassis_entity,
        transform,
        velocity,
        actuation,
        mut suspension,
        mut external_force,
        mass_properties,
    )) = player_query.single_mut()
    else {
        return;
    };

    let vehicle = config.default_vehicle();
    let dt = time.delta_secs().max(0.000_1);

    let body_mass = mass_properties
        .map(|props| props.mass)
        .unwrap_or(vehicle.chassis_mass)
        .max(0.25);
    let local_center_of_mass = mass_properties
        .map(|props| props.local_center_of_mass)
        .unwrap_or(Vec3::ZERO);
    let center_of_mass_world = transform.transform_point(local_center_of_mass);
    let down_world = transform.rotation * Vec3::NEG_Y;
    let hardpoints = wheel_hardpoints(vehicle);

    *external_force = ExternalForce::default();

    for wheel in 0..WHEEL_COUNT {
        let hardpoint_world = transform.transform_point(hardpoints[wheel]);
        let (spring_length, sample, grounded) = sample_wheel_suspension(
            &rapier_context,
            chassis_entity,
            hardpoint_world,
            down_world,
            suspension.prev_compression[wheel],
            vehicle,
            dt,
        );

        suspension.spring_length[wheel] = spring_length;
        suspension.prev_compression[wheel] = sample.compression;
        suspension.grounded[wheel] = grounded;

        if sample.support_force > f32::EPSILON {
            *external_force += ExternalForce::at_point(
                Vec3::Y * sample.support_force,
                hardpoint_world,
                center_of_mass_world,
            );
        }

        if !grounded {
            continue;
        }

        // Steered heading, flattened onto the contact plane.
        let wheel_forward_world = transform.rotation
            * (Quat::from_rotation_y(actuation.steering[wheel]) * Vec3::NEG_Z);
        let forward_on_ground = (wheel_forward_world
            - sample.ground_normal * wheel_forward_world.dot(sample.ground_normal))
        .normalize_or_zero();
        if forward_on_ground.length_squared() <= f32::EPSILON {
            continue;
        }

        let traction =
            TRACTION_FLOOR + ((1.0 - TRACTION_FLOOR) * sample.compression_ratio.clamp(0.0, 1.0));

        let engine_force = actuation.engine[wheel];
        if engine_force.abs() > f32::EPSILON {
            *external_force += ExternalForce::at_point(
                forward_on_ground * engine_force * traction,
                hardpoint_world,
                center_of_mass_world,
            );
        }

        let contact_arm = hardpoint_world - center_of_mass_world;
        let point_velocity = velocity.linvel + velocity.angvel.cross(contact_arm);
        let longitudinal_speed = point_velocity.dot(forward_on_ground);

        let brake_force = actuation.brake[wheel];
        if brake_force > f32::EPSILON && longitudinal_speed.abs() > BRAKE_SPEED_DEADBAND_MPS {
            *external_force += ExternalForce::at_point(
                forward_on_ground * (-longitudinal_speed.signum() * brake_force * traction),
                hardpoint_world,
                center_of_mass_world,
            );
        }

        let lateral_dir = sample.ground_normal.cross(forward_on_ground).normalize_or_zero();
        let lateral_speed = point_velocity.dot(lateral_dir);
        if lateral_speed.abs() > f32::EPSILON {
            let per_wheel_mass = body_mass / WHEEL_COUNT as f32;
            let raw_friction = -lateral_speed * vehicle.lateral_grip * per_wheel_mass;
            let clamp = (sample.support_force * LATERAL_FRICTION_CLAMP_RATIO)
                .max(vehicle.longitudinal_grip * per_wheel_mass);
            *external_force += ExternalForce::at_point(
                lateral_dir * raw_friction.clamp(-clamp, clamp),
                hardpoint_world,
                center_of_mass_world,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VehicleConfig;

    fn vehicle() -> VehicleConfig {
        VehicleConfig {
            id: "rc_buggy".to_string(),
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

    #[test]
    fn hardpoints_put_the_front_axle_forward() {
        let points = wheel_hardpoints(&vehicle());

        // Forward is -Z.
        assert!(points[body::WHEEL_FRONT_LEFT].z < points[body::WHEEL_REAR_LEFT].z);
        assert!(points[body::WHEEL_FRONT_RIGHT].z < points[body::WHEEL_REAR_RIGHT].z);
        assert_eq!(points[body::WHEEL_FRONT_LEFT].x, -1.1);
        assert_eq!(points[body::WHEEL_FRONT_RIGHT].x, 1.1);
        for point in points {
            assert_eq!(point.y, -0.5);
        }
    }

    #[test]
    fn hardpoints_are_mirrored_across_the_centerline() {
        let points = wheel_hardpoints(&vehicle());
        assert_eq!(
            points[body::WHEEL_FRONT_LEFT].x,
            -points[body::WHEEL_FRONT_RIGHT].x
        );
        assert_eq!(
            points[body::WHEEL_REAR_LEFT].z,
            points[body::WHEEL_REAR_RIGHT].z
        );
    }
}
