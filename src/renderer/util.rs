use glam::Vec3;

pub fn calculate_pitch(forward: Vec3) -> f32 {
    let forward = forward.normalize();
    forward.y.clamp(-1.0, 1.0).asin()
}

pub fn calculate_yaw(forward: Vec3) -> f32 {
    let forward = forward.normalize();
    forward.z.atan2(forward.x)
}

pub fn calculate_direction(pitch: f32, yaw: f32) -> Vec3 {
    Vec3::new(
        yaw.cos() * pitch.cos(),
        pitch.sin(),
        yaw.sin() * pitch.cos(),
    )
}

/// Number of workgroups needed to cover `invocations`, rounding the last partial group up
pub fn workgroup_count(invocations: u32, workgroup_size: u32) -> u32 {
    invocations.div_ceil(workgroup_size)
}

pub fn pad_uniform_buffer_size(size: u64, min_alignment: u64) -> u64 {
    if min_alignment > 0 {
        (size + min_alignment - 1) & !(min_alignment - 1)
    } else {
        size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workgroups_round_up() {
        assert_eq!(workgroup_count(0, 64), 0);
        assert_eq!(workgroup_count(1, 64), 1);
        assert_eq!(workgroup_count(64, 64), 1);
        assert_eq!(workgroup_count(65, 64), 2);
        assert_eq!(workgroup_count(128, 64), 2);
    }

    #[test]
    fn uniform_size_padding() {
        assert_eq!(pad_uniform_buffer_size(432, 256), 512);
        assert_eq!(pad_uniform_buffer_size(512, 256), 512);
        assert_eq!(pad_uniform_buffer_size(432, 0), 432);
        assert_eq!(pad_uniform_buffer_size(1, 64), 64);
    }

    #[test]
    fn direction_round_trips_through_angles() {
        let direction = Vec3::new(0.3, -0.4, -0.8).normalize();
        let rebuilt = calculate_direction(calculate_pitch(direction), calculate_yaw(direction));
        assert!(rebuilt.abs_diff_eq(direction, 1e-5));
    }
}
