use rtobj_common::CameraParams;
use rtobj_input::{CameraController, PointerEvent};
use std::collections::VecDeque;
use std::time::Duration;
use winit::keyboard::KeyCode;

/// Frames kept for the rolling frame-time average.
pub const FRAME_HISTORY: usize = 120;
/// Time step handed to the camera for every pointer event.
const INPUT_DT: f32 = 0.016;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Terminated,
}

/// Input the loop reacts to, already stripped of windowing details.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    Quit,
    CloseRequested,
    Key { key: KeyCode, pressed: bool },
    Pointer(PointerEvent),
}

/// Whether the overlay wants the current input for itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UiFocus {
    pub keyboard: bool,
    pub pointer: bool,
}

/// Rolling frame-time statistics.
#[derive(Debug, Clone, Default)]
pub struct FrameTimer {
    frames: VecDeque<Duration>,
    total: Duration,
    render_time: Duration,
}

impl FrameTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the wall time of one frame.
    pub fn record(&mut self, frame: Duration) {
        if self.frames.len() == FRAME_HISTORY {
            if let Some(oldest) = self.frames.pop_front() {
                self.total -= oldest;
            }
        }
        self.frames.push_back(frame);
        self.total += frame;
    }

    pub fn set_render_time(&mut self, render: Duration) {
        self.render_time = render;
    }

    /// Time spent in the last `render` call.
    pub fn render_time(&self) -> Duration {
        self.render_time
    }

    /// Average frame time over the window, zero before the first frame.
    pub fn average(&self) -> Duration {
        if self.frames.is_empty() {
            return Duration::ZERO;
        }
        self.total / self.frames.len() as u32
    }

    pub fn average_ms(&self) -> f64 {
        self.average().as_secs_f64() * 1e3
    }

    pub fn fps(&self) -> f64 {
        let secs = self.average().as_secs_f64();
        if secs > 0.0 { 1.0 / secs } else { 0.0 }
    }
}

/// Loop state, camera and frame timing, independent of the window system.
pub struct ViewerState {
    loop_state: LoopState,
    controller: CameraController,
    fovy: f32,
    last_camera: Option<CameraParams>,
    timer: FrameTimer,
}

impl ViewerState {
    pub fn new(controller: CameraController, fovy: f32) -> Self {
        Self {
            loop_state: LoopState::Running,
            controller,
            fovy,
            last_camera: None,
            timer: FrameTimer::new(),
        }
    }

    /// Apply one input event. Pointer input the overlay claimed does not
    /// reach the camera; Escape only quits while the overlay is not typing.
    pub fn handle(&mut self, event: InputEvent, focus: UiFocus) -> LoopState {
        if self.loop_state == LoopState::Terminated {
            return self.loop_state;
        }
        match event {
            InputEvent::Quit | InputEvent::CloseRequested => {
                self.loop_state = LoopState::Terminated;
            }
            InputEvent::Key {
                key: KeyCode::Escape,
                pressed: true,
            } if !focus.keyboard => {
                tracing::debug!("escape pressed, shutting down");
                self.loop_state = LoopState::Terminated;
            }
            InputEvent::Key { .. } => {}
            InputEvent::Pointer(pointer) => {
                if focus.pointer {
                    // The overlay has the cursor; forget it so the next
                    // camera drag starts where it resumes.
                    self.controller.mouse(PointerEvent::Left, INPUT_DT);
                } else {
                    self.controller.mouse(pointer, INPUT_DT);
                }
            }
        }
        self.loop_state
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.controller.set_screen([width, height]);
    }

    /// Current camera and whether it differs from the one returned last time.
    pub fn camera(&mut self) -> (CameraParams, bool) {
        let params = self.controller.params(self.fovy);
        let changed = self.last_camera != Some(params);
        self.last_camera = Some(params);
        (params, changed)
    }

    pub fn timer(&self) -> &FrameTimer {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut FrameTimer {
        &mut self.timer
    }
}
