use glam::Vec3;

/// Camera/view configuration consumed by every render backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraParams {
    /// Eye position in world space.
    pub pos: Vec3,
    /// View direction (need not be normalized).
    pub dir: Vec3,
    /// Up vector (need not be orthogonal to `dir`).
    pub up: Vec3,
    /// Vertical field of view in degrees.
    pub fovy: f32,
}

impl Default for CameraParams {
    fn default() -> Self {
        Self {
            pos: Vec3::new(0.0, 0.0, 5.0),
            dir: Vec3::NEG_Z,
            up: Vec3::Y,
            fovy: 65.0,
        }
    }
}

/// Perspective image plane derived from a camera.
///
/// The primary ray through normalized screen position `(sx, sy)`, with
/// `(0, 0)` the top-left corner of the image, is
/// `normalize(dir_00 + sx * du + sy * dv)` starting at `origin`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImagePlane {
    pub origin: Vec3,
    pub dir_00: Vec3,
    pub du: Vec3,
    pub dv: Vec3,
}

impl CameraParams {
    pub fn image_plane(&self, aspect: f32) -> ImagePlane {
        let dir = self.dir.normalize();
        let right = dir.cross(self.up).normalize();
        let up = right.cross(dir);

        let height = 2.0 * (self.fovy.to_radians() * 0.5).tan();
        let width = height * aspect;
        let du = right * width;
        let dv = -up * height;

        ImagePlane {
            origin: self.pos,
            dir_00: dir - 0.5 * du - 0.5 * dv,
            du,
            dv,
        }
    }
}

impl ImagePlane {
    pub fn ray_dir(&self, sx: f32, sy: f32) -> Vec3 {
        (self.dir_00 + sx * self.du + sy * self.dv).normalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_ray_follows_dir() {
        let cam = CameraParams {
            dir: Vec3::new(0.0, 0.0, -3.0),
            ..CameraParams::default()
        };
        let plane = cam.image_plane(16.0 / 9.0);
        let d = plane.ray_dir(0.5, 0.5);
        assert!((d - Vec3::NEG_Z).length() < 1e-6);
    }

    #[test]
    fn top_left_ray_points_up_and_left() {
        let plane = CameraParams::default().image_plane(1.0);
        let d = plane.ray_dir(0.0, 0.0);
        assert!(d.x < 0.0);
        assert!(d.y > 0.0);
        assert!(d.z < 0.0);
    }

    #[test]
    fn vertical_extent_matches_fov() {
        let cam = CameraParams {
            fovy: 90.0,
            ..CameraParams::default()
        };
        let plane = cam.image_plane(1.0);
        // 90 degree fov spans 45 degrees from the centre to the top edge.
        let top = plane.ray_dir(0.5, 0.0);
        assert!((top.angle_between(Vec3::NEG_Z) - 45.0_f32.to_radians()).abs() < 1e-5);
    }
}
