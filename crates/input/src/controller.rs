use crate::arcball::ArcballCamera;
use glam::{Vec2, Vec3};
use rtobj_common::{Bounds, CameraParams};

/// Fraction of the orbit distance covered by one scroll line at
/// `motion_speed * dt == 1`.
const ZOOM_SCALE: f32 = 0.1;
/// Largest fraction of the orbit distance a single scroll event may cover.
const MAX_ZOOM_STEP: f32 = 0.9;

/// Pointer buttons held during a motion event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PointerButtons {
    pub primary: bool,
    pub secondary: bool,
}

/// Pointer input consumed by the camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    /// Cursor moved to `position`, in window pixels with the origin top-left.
    Motion {
        position: Vec2,
        buttons: PointerButtons,
    },
    /// Wheel scrolled by `delta` lines; positive zooms in.
    Scroll { delta: f32 },
    /// Cursor left the window; the next motion starts a fresh drag.
    Left,
}

/// Arcball camera driven by pointer events.
///
/// Primary-button drags orbit, secondary-button drags pan, scrolling zooms.
#[derive(Debug, Clone)]
pub struct CameraController {
    arcball: ArcballCamera,
    inv_screen: Vec2,
    motion_speed: f32,
    prev_cursor: Option<Vec2>,
}

impl CameraController {
    pub fn new(arcball: ArcballCamera, motion_speed: f32, screen: [u32; 2]) -> Self {
        let mut controller = Self {
            arcball,
            inv_screen: Vec2::ONE,
            motion_speed,
            prev_cursor: None,
        };
        controller.set_screen(screen);
        controller
    }

    /// Update the pixel to NDC mapping after a resize.
    pub fn set_screen(&mut self, screen: [u32; 2]) {
        self.inv_screen = Vec2::new(1.0 / screen[0].max(1) as f32, 1.0 / screen[1].max(1) as f32);
        self.prev_cursor = None;
    }

    /// Re-centre on `bounds` and back off far enough to see all of it.
    pub fn frame_bounds(&mut self, bounds: &Bounds) {
        let radius = bounds.radius();
        if !radius.is_finite() || radius <= 0.0 {
            return;
        }
        let center = bounds.center();
        self.arcball = ArcballCamera::new(center + Vec3::Z * radius * 2.5, center, Vec3::Y);
        tracing::debug!(
            "camera framed on ({:.2}, {:.2}, {:.2}), radius {radius:.2}",
            center.x,
            center.y,
            center.z
        );
    }

    /// Consume one pointer event. Events carrying non-finite values are ignored.
    pub fn mouse(&mut self, event: PointerEvent, dt: f32) {
        match event {
            PointerEvent::Motion { position, buttons } => {
                if !position.is_finite() {
                    return;
                }
                let cur = self.to_ndc(position);
                if let Some(prev) = self.prev_cursor {
                    if buttons.primary {
                        self.arcball.rotate(prev, cur);
                    } else if buttons.secondary {
                        self.arcball.pan(cur - prev);
                    }
                }
                self.prev_cursor = Some(cur);
            }
            PointerEvent::Scroll { delta } => {
                if !delta.is_finite() || !dt.is_finite() {
                    return;
                }
                let step =
                    (delta * self.motion_speed * dt * ZOOM_SCALE).clamp(-MAX_ZOOM_STEP, MAX_ZOOM_STEP);
                let distance = self.arcball.distance();
                self.arcball.zoom(step * distance);
            }
            PointerEvent::Left => {
                self.prev_cursor = None;
            }
        }
    }

    pub fn eye_pos(&self) -> Vec3 {
        self.arcball.eye_pos()
    }

    pub fn eye_dir(&self) -> Vec3 {
        self.arcball.eye_dir()
    }

    pub fn up_dir(&self) -> Vec3 {
        self.arcball.up_dir()
    }

    pub fn arcball(&self) -> &ArcballCamera {
        &self.arcball
    }

    /// Current camera as renderer parameters.
    pub fn params(&self, fovy: f32) -> CameraParams {
        CameraParams {
            pos: self.eye_pos(),
            dir: self.eye_dir(),
            up: self.up_dir(),
            fovy,
        }
    }

    fn to_ndc(&self, p: Vec2) -> Vec2 {
        Vec2::new(
            p.x * 2.0 * self.inv_screen.x - 1.0,
            1.0 - 2.0 * p.y * self.inv_screen.y,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCREEN: [u32; 2] = [1280, 720];

    fn controller() -> CameraController {
        CameraController::new(
            ArcballCamera::new(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, Vec3::Y),
            100.0,
            SCREEN,
        )
    }

    fn motion(x: f32, y: f32, primary: bool, secondary: bool) -> PointerEvent {
        PointerEvent::Motion {
            position: Vec2::new(x, y),
            buttons: PointerButtons { primary, secondary },
        }
    }

    fn assert_orthonormal(c: &CameraController) {
        let dir = c.eye_dir();
        let up = c.up_dir();
        assert!((dir.length() - 1.0).abs() < 1e-3, "dir {dir}");
        assert!((up.length() - 1.0).abs() < 1e-3, "up {up}");
        assert!(dir.dot(up).abs() < 1e-3, "dir {dir} up {up}");
        // Right-handed: right x up points back along -dir.
        let right = dir.cross(up);
        assert!((right.cross(up) + dir).length() < 1e-3);
    }

    /// Small deterministic generator so the sequence is reproducible.
    struct Lcg(u64);

    impl Lcg {
        fn next_f32(&mut self) -> f32 {
            self.0 = self
                .0
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (self.0 >> 40) as f32 / (1u64 << 24) as f32
        }
    }

    #[test]
    fn basis_stays_orthonormal_under_random_input() {
        let mut c = controller();
        let mut rng = Lcg(7);
        for _ in 0..5_000 {
            let kind = rng.next_f32();
            let event = if kind < 0.1 {
                PointerEvent::Scroll {
                    delta: rng.next_f32() * 6.0 - 3.0,
                }
            } else if kind < 0.12 {
                PointerEvent::Left
            } else {
                motion(
                    rng.next_f32() * 1600.0 - 160.0,
                    rng.next_f32() * 900.0 - 90.0,
                    rng.next_f32() < 0.6,
                    rng.next_f32() < 0.3,
                )
            };
            c.mouse(event, 0.016);
            assert_orthonormal(&c);
        }
    }

    #[test]
    fn hover_does_not_move_camera() {
        let mut c = controller();
        let before = c.params(65.0);
        c.mouse(motion(100.0, 100.0, false, false), 0.016);
        c.mouse(motion(500.0, 300.0, false, false), 0.016);
        assert_eq!(c.params(65.0), before);
    }

    #[test]
    fn primary_drag_orbits() {
        let mut c = controller();
        c.mouse(motion(640.0, 360.0, true, false), 0.016);
        c.mouse(motion(760.0, 360.0, true, false), 0.016);
        assert!(c.eye_pos().x.abs() > 1e-3);
        assert!((c.eye_pos().length() - 10.0).abs() < 1e-3);
    }

    #[test]
    fn first_motion_only_records_cursor() {
        let mut c = controller();
        let before = c.eye_pos();
        c.mouse(motion(10.0, 10.0, true, false), 0.016);
        assert_eq!(c.eye_pos(), before);
    }

    #[test]
    fn leaving_window_restarts_drag() {
        let mut c = controller();
        c.mouse(motion(640.0, 360.0, true, false), 0.016);
        c.mouse(PointerEvent::Left, 0.016);
        let before = c.eye_pos();
        c.mouse(motion(10.0, 10.0, true, false), 0.016);
        assert_eq!(c.eye_pos(), before);
    }

    #[test]
    fn secondary_drag_pans() {
        let mut c = controller();
        c.mouse(motion(640.0, 360.0, false, true), 0.016);
        c.mouse(motion(700.0, 360.0, false, true), 0.016);
        assert!(c.arcball().center().length() > 1e-3);
        assert!((c.eye_dir() - Vec3::NEG_Z).length() < 1e-4);
    }

    #[test]
    fn scroll_zooms_in_and_out() {
        let mut c = controller();
        c.mouse(PointerEvent::Scroll { delta: 1.0 }, 0.016);
        let closer = c.arcball().distance();
        assert!(closer < 10.0);
        c.mouse(PointerEvent::Scroll { delta: -2.0 }, 0.016);
        assert!(c.arcball().distance() > closer);
    }

    #[test]
    fn malformed_events_are_ignored() {
        let mut c = controller();
        let before = c.params(65.0);
        c.mouse(PointerEvent::Scroll { delta: f32::NAN }, 0.016);
        c.mouse(motion(f32::INFINITY, 0.0, true, false), 0.016);
        c.mouse(PointerEvent::Scroll { delta: 1.0 }, f32::NAN);
        assert_eq!(c.params(65.0), before);
    }

    #[test]
    fn frame_bounds_centres_model() {
        let mut c = controller();
        let mut bounds = Bounds::EMPTY;
        bounds.grow(Vec3::new(10.0, 0.0, 0.0));
        bounds.grow(Vec3::new(12.0, 2.0, 2.0));
        c.frame_bounds(&bounds);
        assert!((c.arcball().center() - Vec3::new(11.0, 1.0, 1.0)).length() < 1e-4);
        let to_center = (c.arcball().center() - c.eye_pos()).normalize();
        assert!((to_center - c.eye_dir()).length() < 1e-4);
        let view = c.arcball().view_matrix();
        assert!(view.transform_point3(c.arcball().center()).z < 0.0);
    }

    #[test]
    fn frame_bounds_ignores_empty_bounds() {
        let mut c = controller();
        let before = c.eye_pos();
        c.frame_bounds(&Bounds::EMPTY);
        assert_eq!(c.eye_pos(), before);
    }
}
