//! Input sampling: cursor-relative steering plus pause toggling.

use macroquad::prelude::{is_key_down, mouse_position, screen_height, screen_width, KeyCode};

/// One sampled input frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputSample {
    pub direction_x: f32,
    pub direction_y: f32,
    pub toggle_pause: bool,
}

/// Turns raw cursor state into normalized steering vectors. The own entity
/// is always drawn at the screen center, so the steering direction is just
/// the cursor offset from center, normalized.
pub struct InputManager {
    prev_key_p: bool,
}

impl InputManager {
    pub fn new() -> Self {
        Self { prev_key_p: false }
    }

    pub fn sample(&mut self) -> InputSample {
        let (mouse_x, mouse_y) = mouse_position();
        let (direction_x, direction_y) = steer_towards(
            mouse_x - screen_width() / 2.0,
            mouse_y - screen_height() / 2.0,
        );

        let key_p = is_key_down(KeyCode::P);
        let toggle_pause = key_p && !self.prev_key_p;
        self.prev_key_p = key_p;

        InputSample {
            direction_x,
            direction_y,
            toggle_pause,
        }
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalizes a cursor offset into a unit steering vector; a centered (or
/// degenerate) cursor steers nowhere.
pub fn steer_towards(dx: f32, dy: f32) -> (f32, f32) {
    if !dx.is_finite() || !dy.is_finite() {
        return (0.0, 0.0);
    }
    let magnitude = (dx * dx + dy * dy).sqrt();
    if magnitude > 0.0 {
        (dx / magnitude, dy / magnitude)
    } else {
        (0.0, 0.0)
    }
}
