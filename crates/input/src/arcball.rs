use glam::{Mat3, Mat4, Quat, Vec2, Vec3, Vec4, Vec4Swizzles};

/// Closest the eye may get to the pivot.
const MIN_DISTANCE: f32 = 1e-3;

/// Arcball camera orbiting a pivot point.
///
/// The view transform is `translation * rotation * center_translation`:
/// move the pivot to the origin, rotate, then back off along -Z.
#[derive(Debug, Clone)]
pub struct ArcballCamera {
    center_translation: Mat4,
    translation: Mat4,
    rotation: Quat,
    camera: Mat4,
    inv_camera: Mat4,
}

impl ArcballCamera {
    /// Camera at `eye` looking at `center`. `up` only needs to be roughly up.
    pub fn new(eye: Vec3, center: Vec3, up: Vec3) -> Self {
        let mut dir = center - eye;
        if !dir.is_finite() || dir.length() < MIN_DISTANCE {
            dir = Vec3::NEG_Z;
        }
        let z_axis = dir.normalize();
        let x_axis = z_axis
            .cross(up)
            .try_normalize()
            .unwrap_or_else(|| z_axis.any_orthonormal_vector());
        let y_axis = x_axis.cross(z_axis).normalize();
        let x_axis = z_axis.cross(y_axis).normalize();

        let rotation =
            Quat::from_mat3(&Mat3::from_cols(x_axis, y_axis, -z_axis).transpose()).normalize();

        let mut camera = Self {
            center_translation: Mat4::from_translation(-center),
            translation: Mat4::from_translation(Vec3::new(0.0, 0.0, -dir.length())),
            rotation,
            camera: Mat4::IDENTITY,
            inv_camera: Mat4::IDENTITY,
        };
        camera.update_camera();
        camera
    }

    /// Rotate using the previous and current cursor positions in NDC.
    pub fn rotate(&mut self, prev: Vec2, cur: Vec2) {
        let prev = prev.clamp(Vec2::NEG_ONE, Vec2::ONE);
        let cur = cur.clamp(Vec2::NEG_ONE, Vec2::ONE);

        let prev_ball = screen_to_arcball(prev);
        let cur_ball = screen_to_arcball(cur);

        self.rotation = (cur_ball * prev_ball * self.rotation).normalize();
        self.update_camera();
    }

    /// Pan the pivot by a cursor delta in NDC, scaled by the orbit distance.
    pub fn pan(&mut self, delta: Vec2) {
        let zoom_amount = self.distance();
        let motion =
            self.inv_camera * Vec4::new(delta.x * zoom_amount, delta.y * zoom_amount, 0.0, 0.0);

        self.center_translation = Mat4::from_translation(motion.xyz()) * self.center_translation;
        self.update_camera();
    }

    /// Move the eye towards (positive) or away from (negative) the pivot.
    pub fn zoom(&mut self, amount: f32) {
        self.translation = Mat4::from_translation(Vec3::new(0.0, 0.0, amount)) * self.translation;
        self.translation.w_axis.z = self.translation.w_axis.z.min(-MIN_DISTANCE);
        self.update_camera();
    }

    /// View-from-world transform.
    pub fn view_matrix(&self) -> Mat4 {
        self.camera
    }

    pub fn eye_pos(&self) -> Vec3 {
        self.inv_camera.transform_point3(Vec3::ZERO)
    }

    pub fn eye_dir(&self) -> Vec3 {
        self.inv_camera.transform_vector3(Vec3::NEG_Z).normalize()
    }

    pub fn up_dir(&self) -> Vec3 {
        self.inv_camera.transform_vector3(Vec3::Y).normalize()
    }

    /// Pivot point the camera orbits around.
    pub fn center(&self) -> Vec3 {
        -self.center_translation.w_axis.xyz()
    }

    /// Distance from the eye to the pivot.
    pub fn distance(&self) -> f32 {
        self.translation.w_axis.z.abs()
    }

    fn update_camera(&mut self) {
        self.camera = self.translation * Mat4::from_quat(self.rotation) * self.center_translation;
        self.inv_camera = self.camera.inverse();
    }
}

/// Project an NDC point onto the unit arcball as a pure quaternion.
fn screen_to_arcball(p: Vec2) -> Quat {
    let dist = p.dot(p);
    if dist <= 1.0 {
        Quat::from_xyzw(p.x, p.y, (1.0 - dist).sqrt(), 0.0)
    } else {
        let proj = p.normalize();
        Quat::from_xyzw(proj.x, proj.y, 0.0, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: Vec3, b: Vec3) {
        assert!((a - b).length() < 1e-4, "{a} != {b}");
    }

    #[test]
    fn look_at_basis() {
        let cam = ArcballCamera::new(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        assert_close(cam.eye_pos(), Vec3::new(0.0, 0.0, 5.0));
        assert_close(cam.eye_dir(), Vec3::NEG_Z);
        assert_close(cam.up_dir(), Vec3::Y);
        assert!((cam.distance() - 5.0).abs() < 1e-5);
        assert_close(cam.center(), Vec3::ZERO);
    }

    #[test]
    fn off_axis_pivot() {
        let center = Vec3::new(1.0, 2.0, 3.0);
        let cam = ArcballCamera::new(center + Vec3::new(4.0, 0.0, 0.0), center, Vec3::Y);
        assert_close(cam.eye_pos(), center + Vec3::new(4.0, 0.0, 0.0));
        assert_close(cam.eye_dir(), Vec3::NEG_X);
        assert_close(cam.center(), center);
    }

    #[test]
    fn degenerate_up_still_yields_basis() {
        let cam = ArcballCamera::new(Vec3::new(0.0, 5.0, 0.0), Vec3::ZERO, Vec3::Y);
        let dir = cam.eye_dir();
        let up = cam.up_dir();
        assert!(dir.is_finite() && up.is_finite());
        assert!(dir.dot(up).abs() < 1e-4);
    }

    #[test]
    fn rotation_keeps_distance_to_pivot() {
        let mut cam = ArcballCamera::new(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        cam.rotate(Vec2::new(0.0, 0.0), Vec2::new(0.3, 0.1));
        assert!((cam.eye_pos().length() - 5.0).abs() < 1e-4);
        assert!(cam.eye_dir().dot(Vec3::NEG_Z) < 0.9999);
        // Still looking at the pivot.
        assert_close(cam.eye_dir(), (-cam.eye_pos()).normalize());
    }

    #[test]
    fn rotate_without_motion_is_identity() {
        let mut cam = ArcballCamera::new(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        cam.rotate(Vec2::new(0.2, 0.2), Vec2::new(0.2, 0.2));
        assert_close(cam.eye_pos(), Vec3::new(0.0, 0.0, 5.0));
        assert_close(cam.up_dir(), Vec3::Y);
    }

    #[test]
    fn zoom_moves_towards_pivot_and_stops() {
        let mut cam = ArcballCamera::new(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        cam.zoom(2.0);
        assert!((cam.distance() - 3.0).abs() < 1e-5);
        cam.zoom(100.0);
        assert!(cam.distance() >= MIN_DISTANCE);
        assert_close(cam.eye_dir(), Vec3::NEG_Z);
    }

    #[test]
    fn pan_moves_pivot_and_eye_together() {
        let mut cam = ArcballCamera::new(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        let eye_before = cam.eye_pos();
        cam.pan(Vec2::new(0.1, 0.0));
        let moved = cam.eye_pos() - eye_before;
        assert!(moved.length() > 0.0);
        assert!(moved.z.abs() < 1e-5);
        // The pivot travels with the eye.
        assert_close(cam.center(), moved);
        assert!((cam.distance() - 5.0).abs() < 1e-5);
    }
}
