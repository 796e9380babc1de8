use bevy::math::Vec3;

#[derive(Debug, Clone, Copy)]
pub struct FollowParams {
    pub height: f32,
    pub distance: f32,
    pub damping: f32,
}

impl Default for FollowParams {
    fn default() -> Self {
        Self {
            height: 30.0,
            distance: 25.0,
            damping: 0.3,
        }
    }
}

/// Chase-camera goal: over the car at a fixed height, pulled back along
/// world +Z. The car's own height never leaks into the target.
pub fn follow_target(vehicle_position: Vec3, params: &FollowParams) -> Vec3 {
    Vec3::new(
        vehicle_position.x,
        params.height,
        vehicle_position.z + params.distance,
    )
}

/// One frame of critically-soft pursuit: move a fixed fraction of the
/// remaining distance, per axis.
pub fn damped_step(current: Vec3, target: Vec3, damping: f32) -> Vec3 {
    current + (target - current) * damping
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follow_target_tracks_ground_position_only() {
        let params = FollowParams::default();
        let target = follow_target(Vec3::new(4.0, 17.0, -6.0), &params);
        assert_eq!(target, Vec3::new(4.0, 30.0, 19.0));
    }

    #[test]
    fn damped_step_covers_the_documented_fraction() {
        let stepped = damped_step(Vec3::ZERO, Vec3::new(10.0, 30.0, 25.0), 0.3);
        assert_eq!(stepped, Vec3::new(3.0, 9.0, 7.5));
    }

    #[test]
    fn damped_step_converges_on_a_fixed_target() {
        let target = Vec3::new(-12.0, 30.0, 40.0);
        let mut camera = Vec3::new(100.0, 0.0, -100.0);

        for _ in 0..60 {
            camera = damped_step(camera, target, 0.3);
        }

        assert!((camera - target).length() < 1e-3);
    }

    #[test]
    fn zero_damping_never_moves() {
        let start = Vec3::new(1.0, 2.0, 3.0);
        assert_eq!(damped_step(start, Vec3::new(9.0, 9.0, 9.0), 0.0), start);
    }
}
