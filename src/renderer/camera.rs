use crate::renderer::util;
use glam::{Mat4, Vec3, Vec4};

pub struct Camera {
    position: Vec3,
    forward: Vec3,
    up: Vec3,
    right: Vec3,
    world_up: Vec3,
    fov_y_deg: f32,
    aspect_ratio: f32,
    near: f32,
    far: f32,
    frustum_culling: bool,
}

impl Camera {
    const DEFAULT_FOV_Y_DEG: f32 = 50.0;

    pub fn new() -> Self {
        Self {
            position: Vec3::new(0.0, 2.0, 10.0),
            forward: Vec3::NEG_Z,
            up: Vec3::Y,
            right: Vec3::X,
            world_up: Vec3::Y,
            fov_y_deg: Self::DEFAULT_FOV_Y_DEG,
            aspect_ratio: 16.0 / 9.0,
            near: 0.1,
            far: 100.0,
            frustum_culling: true,
        }
    }

    pub fn set_perspective(&mut self, fov_y_deg: f32, aspect_ratio: f32, near: f32, far: f32) {
        assert!(near > 0.0 && far > near, "invalid clip distances {near}..{far}");
        self.fov_y_deg = fov_y_deg;
        self.aspect_ratio = aspect_ratio;
        self.near = near;
        self.far = far;
    }

    pub fn set_aspect_ratio(&mut self, aspect_ratio: f32) {
        if aspect_ratio.is_finite() && aspect_ratio > 0.0 {
            self.aspect_ratio = aspect_ratio;
        }
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    pub fn look_at(&mut self, target: Vec3) {
        if target == self.position {
            return;
        }
        self.look_to(target - self.position);
    }

    pub fn look_to(&mut self, direction: Vec3) {
        let forward = direction.normalize_or_zero();
        // Looking straight along the world up axis leaves the basis undefined
        if forward == Vec3::ZERO || forward.cross(self.world_up).length_squared() < 1e-8 {
            return;
        }
        self.forward = forward;
        self.right = self.forward.cross(self.world_up).normalize();
        self.up = self.right.cross(self.forward).normalize();
    }

    pub fn set_frustum_culling(&mut self, enabled: bool) {
        self.frustum_culling = enabled;
    }

    pub fn is_frustum_culling_enabled(&self) -> bool {
        self.frustum_culling
    }

    pub fn get_viewproj_mat(&self) -> Mat4 {
        self.get_proj_mat() * self.get_view_mat()
    }

    pub fn get_view_mat(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward, self.up)
    }

    pub fn get_inverse_view_mat(&self) -> Mat4 {
        self.get_view_mat().inverse()
    }

    /// Right-handed perspective with a [0, 1] depth range and Vulkan's downward Y axis
    pub fn get_proj_mat(&self) -> Mat4 {
        let mut proj = Mat4::perspective_rh(
            self.fov_y_deg.to_radians(),
            self.aspect_ratio,
            self.near,
            self.far,
        );
        proj.y_axis.y *= -1.0;
        proj
    }

    pub fn view_frustum(&self) -> ViewFrustum {
        ViewFrustum::new(
            self.position,
            self.forward,
            self.right,
            self.up,
            self.fov_y_deg.to_radians(),
            self.aspect_ratio,
            self.near,
            self.far,
        )
    }

    pub fn get_position(&self) -> Vec3 {
        self.position
    }

    pub fn get_forward(&self) -> Vec3 {
        self.forward
    }

    pub fn get_up(&self) -> Vec3 {
        self.up
    }

    pub fn get_right(&self) -> Vec3 {
        self.right
    }

    pub fn get_pitch(&self) -> f32 {
        util::calculate_pitch(self.forward)
    }

    pub fn get_yaw(&self) -> f32 {
        util::calculate_yaw(self.forward)
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

/// Six half-spaces bounding the camera's view volume.
///
/// Each plane is stored as `(normal, d)` with the normal pointing into the
/// volume, so a point `p` is inside when `normal.dot(p) + d >= 0` holds for
/// every plane. Planes are ordered near, far, left, right, top, bottom.
/// Corners are ordered near then far, each as bottom-left, bottom-right,
/// top-right, top-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewFrustum {
    pub planes: [Vec4; 6],
    pub corners: [Vec3; 8],
}

impl ViewFrustum {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        position: Vec3,
        forward: Vec3,
        right: Vec3,
        up: Vec3,
        fov_y_rad: f32,
        aspect_ratio: f32,
        near: f32,
        far: f32,
    ) -> Self {
        let tan_half_fov = (fov_y_rad * 0.5).tan();
        let far_half_v = far * tan_half_fov;
        let far_half_h = far_half_v * aspect_ratio;
        let near_half_v = near * tan_half_fov;
        let near_half_h = near_half_v * aspect_ratio;

        let to_far = forward * far;
        let left_edge = to_far - right * far_half_h;
        let right_edge = to_far + right * far_half_h;
        let top_edge = to_far + up * far_half_v;
        let bottom_edge = to_far - up * far_half_v;

        let planes = [
            plane_from_point_normal(position + forward * near, forward),
            plane_from_point_normal(position + to_far, -forward),
            plane_from_point_normal(position, left_edge.cross(up)),
            plane_from_point_normal(position, up.cross(right_edge)),
            plane_from_point_normal(position, top_edge.cross(right)),
            plane_from_point_normal(position, right.cross(bottom_edge)),
        ];

        let rect = |distance: f32, half_h: f32, half_v: f32| {
            let center = position + forward * distance;
            [
                center - right * half_h - up * half_v,
                center + right * half_h - up * half_v,
                center + right * half_h + up * half_v,
                center - right * half_h + up * half_v,
            ]
        };
        let [n0, n1, n2, n3] = rect(near, near_half_h, near_half_v);
        let [f0, f1, f2, f3] = rect(far, far_half_h, far_half_v);

        Self {
            planes,
            corners: [n0, n1, n2, n3, f0, f1, f2, f3],
        }
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        self.intersects_sphere(point, 0.0)
    }

    /// Conservative test, a sphere straddling a plane counts as visible
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.truncate().dot(center) + plane.w >= -radius)
    }
}

fn plane_from_point_normal(point: Vec3, normal: Vec3) -> Vec4 {
    let normal = normal.normalize();
    normal.extend(-normal.dot(point))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_camera() -> Camera {
        let mut camera = Camera::new();
        camera.set_perspective(60.0, 1.5, 0.5, 50.0);
        camera.set_position(Vec3::new(1.0, 2.0, 3.0));
        camera.look_to(Vec3::new(0.3, -0.2, -1.0));
        camera
    }

    #[test]
    fn points_along_view_axis_are_inside() {
        let camera = test_camera();
        let frustum = camera.view_frustum();
        let eye = camera.get_position();
        let forward = camera.get_forward();

        assert!(frustum.contains_point(eye + forward * 1.0));
        assert!(frustum.contains_point(eye + forward * 49.0));
    }

    #[test]
    fn points_outside_each_boundary_are_rejected() {
        let camera = test_camera();
        let frustum = camera.view_frustum();
        let eye = camera.get_position();
        let forward = camera.get_forward();
        let right = camera.get_right();
        let up = camera.get_up();

        // Behind the eye, in front of the near plane, past the far plane
        assert!(!frustum.contains_point(eye - forward * 2.0));
        assert!(!frustum.contains_point(eye + forward * 0.25));
        assert!(!frustum.contains_point(eye + forward * 51.0));

        // Well off to each side at mid depth
        let mid = eye + forward * 10.0;
        assert!(!frustum.contains_point(mid + right * 40.0));
        assert!(!frustum.contains_point(mid - right * 40.0));
        assert!(!frustum.contains_point(mid + up * 40.0));
        assert!(!frustum.contains_point(mid - up * 40.0));
    }

    #[test]
    fn spheres_straddling_a_plane_are_kept() {
        let camera = test_camera();
        let frustum = camera.view_frustum();
        let eye = camera.get_position();
        let forward = camera.get_forward();

        let behind_far = eye + forward * 51.0;
        assert!(!frustum.intersects_sphere(behind_far, 0.5));
        assert!(frustum.intersects_sphere(behind_far, 2.0));
    }

    #[test]
    fn corners_lie_on_the_volume_boundary() {
        let camera = test_camera();
        let frustum = camera.view_frustum();

        for corner in frustum.corners {
            for plane in frustum.planes {
                assert!(plane.truncate().dot(corner) + plane.w > -1e-3);
            }
        }
    }

    #[test]
    fn corners_project_to_clip_space_edges() {
        let camera = test_camera();
        let frustum = camera.view_frustum();
        let viewproj = camera.get_viewproj_mat();

        let project = |p: Vec3| {
            let clip = viewproj * p.extend(1.0);
            clip.truncate() / clip.w
        };

        // Near bottom-left: x = -1, y = +1 (Vulkan Y points down), depth 0
        assert!(project(frustum.corners[0]).abs_diff_eq(Vec3::new(-1.0, 1.0, 0.0), 1e-3));
        // Far top-right
        assert!(project(frustum.corners[6]).abs_diff_eq(Vec3::new(1.0, -1.0, 1.0), 1e-3));
    }

    #[test]
    fn inverse_view_undoes_view() {
        let camera = test_camera();
        let product = camera.get_view_mat() * camera.get_inverse_view_mat();
        assert!(product.abs_diff_eq(Mat4::IDENTITY, 1e-4));
    }

    #[test]
    fn look_to_ignores_degenerate_directions() {
        let mut camera = Camera::new();
        camera.look_to(Vec3::Y);
        assert_eq!(camera.get_forward(), Vec3::NEG_Z);
        camera.look_to(Vec3::ZERO);
        assert_eq!(camera.get_forward(), Vec3::NEG_Z);
    }
}
