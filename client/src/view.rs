//! Presentation boundary.
//!
//! Rendering is outside the core: the reconciler exposes state, a view
//! draws it. The trait is the whole contract; the core never probes a
//! backend for capabilities, it just calls `frame` and treats an error as
//! "skip this frame".

use crate::game::{Reconciler, SessionPhase};
use macroquad::prelude::{
    clear_background, draw_circle, draw_circle_lines, draw_text, Color, BLACK, DARKGRAY, WHITE,
};
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ViewError {
    #[error("presentation backend unavailable")]
    Unavailable,
}

/// One received chat line, kept briefly for display.
#[derive(Debug, Clone)]
pub struct ChatLine {
    pub name: String,
    pub message: String,
    pub received: Instant,
}

/// Rendering capability implemented by the presentation layer.
pub trait ArenaView {
    /// Draws one frame of the current state. Errors degrade to a skipped
    /// frame; they never stop the reconciler.
    fn frame(&mut self, state: &Reconciler, chat: &[ChatLine]) -> Result<(), ViewError>;

    /// False once the user closed the window; the client loop then exits.
    fn is_open(&self) -> bool;
}

/// No-op backend for headless runs and tests.
pub struct HeadlessView;

impl ArenaView for HeadlessView {
    fn frame(&mut self, _state: &Reconciler, _chat: &[ChatLine]) -> Result<(), ViewError> {
        Ok(())
    }

    fn is_open(&self) -> bool {
        true
    }
}

const FOOD_COLORS: [Color; 6] = [
    Color::new(1.0, 0.34, 0.34, 1.0),
    Color::new(0.34, 1.0, 0.34, 1.0),
    Color::new(0.34, 0.34, 1.0, 1.0),
    Color::new(1.0, 1.0, 0.34, 1.0),
    Color::new(1.0, 0.34, 1.0, 1.0),
    Color::new(0.34, 1.0, 1.0, 1.0),
];

/// Macroquad-backed view. The camera keeps the own entity centered; remote
/// entities and food are drawn relative to it.
pub struct MacroquadView {
    width: f32,
    height: f32,
}

impl MacroquadView {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    fn camera_offset(&self, state: &Reconciler) -> (f32, f32) {
        match state.own.as_ref() {
            Some(own) if own.current_x.is_finite() && own.current_y.is_finite() => (
                own.current_x - self.width / 2.0,
                own.current_y - self.height / 2.0,
            ),
            _ => (0.0, 0.0),
        }
    }
}

impl ArenaView for MacroquadView {
    fn frame(&mut self, state: &Reconciler, chat: &[ChatLine]) -> Result<(), ViewError> {
        clear_background(Color::new(0.86, 0.87, 0.86, 1.0));

        if state.phase != SessionPhase::Active {
            draw_text("waiting for name registration...", 40.0, 60.0, 24.0, BLACK);
            return Ok(());
        }

        let (cam_x, cam_y) = self.camera_offset(state);

        for food in &state.foods {
            let color = FOOD_COLORS[(food.color_index as usize) % FOOD_COLORS.len()];
            draw_circle(food.x - cam_x, food.y - cam_y, food.size / 2.0, color);
        }

        for remote in state.remotes.values() {
            let e = &remote.entity;
            draw_circle(
                e.current_x - cam_x,
                e.current_y - cam_y,
                e.current_size / 2.0,
                DARKGRAY,
            );
            draw_text(
                &remote.name,
                e.current_x - cam_x,
                e.current_y - cam_y - e.current_size / 2.0 - 6.0,
                18.0,
                BLACK,
            );
        }

        if let Some(own) = state.own.as_ref() {
            draw_circle(
                self.width / 2.0,
                self.height / 2.0,
                own.current_size / 2.0,
                Color::new(0.2, 0.5, 0.9, 1.0),
            );
            draw_circle_lines(
                self.width / 2.0,
                self.height / 2.0,
                own.current_size / 2.0,
                2.0,
                BLACK,
            );
            draw_text(
                &state.own_name,
                self.width / 2.0,
                self.height / 2.0 - own.current_size / 2.0 - 6.0,
                18.0,
                BLACK,
            );
        }

        for (i, entry) in state.scoreboard.iter().enumerate() {
            draw_text(
                &format!("{}. {} ({:.0})", i + 1, entry.name, entry.size),
                self.width - 220.0,
                30.0 + i as f32 * 22.0,
                18.0,
                BLACK,
            );
        }

        for (i, line) in chat.iter().rev().take(5).enumerate() {
            draw_text(
                &format!("{}: {}", line.name, line.message),
                20.0,
                self.height - 30.0 - i as f32 * 22.0,
                18.0,
                WHITE,
            );
        }

        Ok(())
    }

    fn is_open(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_view_always_succeeds() {
        let mut view = HeadlessView;
        let state = Reconciler::new();
        assert!(view.frame(&state, &[]).is_ok());
        assert!(view.is_open());
    }

    #[test]
    fn test_camera_centers_own_entity() {
        let view = MacroquadView::new(800.0, 600.0);
        let mut state = Reconciler::new();
        state.on_connected(1);
        state.on_admitted(&shared::PlayerInfo {
            x: 500.0,
            y: 400.0,
            size: 20.0,
            name: "me".to_string(),
        });

        let (cam_x, cam_y) = view.camera_offset(&state);
        assert_eq!(cam_x, 100.0);
        assert_eq!(cam_y, 100.0);
    }

    #[test]
    fn test_camera_falls_back_without_own_entity() {
        let view = MacroquadView::new(800.0, 600.0);
        let state = Reconciler::new();
        assert_eq!(view.camera_offset(&state), (0.0, 0.0));
    }
}
