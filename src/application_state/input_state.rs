//! # Input State
//!
//! Pointer button states and the per-frame sculpt request built from them.
//! The world-space point under the pointer comes from an external ray cast;
//! this module only pairs it with the brush mode implied by the buttons.

use std::collections::HashMap;

use cgmath::Point3;
use winit::event::MouseButton;

/// Represents the state of a button across two consecutive frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RawInputState {
    /// Button is not pressed
    #[default]
    NotPressed,
    /// Button was just pressed this frame
    Pressed,
    /// Button has been held down for multiple frames
    Held,
    /// Button was just released this frame
    Released,
}

impl RawInputState {
    /// Determines if the input is actively down (either pressed or held)
    pub fn is_active(&self) -> bool {
        matches!(self, RawInputState::Pressed | RawInputState::Held)
    }

    /// Derives the transition from the previous and current raw states
    pub fn from_raw_states(previous: bool, current: bool) -> Self {
        match (previous, current) {
            (false, true) => RawInputState::Pressed,
            (true, true) => RawInputState::Held,
            (true, false) => RawInputState::Released,
            (false, false) => RawInputState::NotPressed,
        }
    }
}

/// What the brush does this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BrushMode {
    /// Lower density inside the brush, adding material
    Build,
    /// Raise density inside the brush, carving material away
    Erase,
    /// No edit this frame
    #[default]
    None,
}

impl BrushMode {
    /// Maps held buttons to a mode. Erase takes precedence when both are held.
    pub fn from_buttons(build_active: bool, erase_active: bool) -> Self {
        match (build_active, erase_active) {
            (_, true) => BrushMode::Erase,
            (true, false) => BrushMode::Build,
            (false, false) => BrushMode::None,
        }
    }
}

/// The per-frame request handed to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SculptInput {
    /// Surface point under the pointer, `None` when the ray hit nothing
    pub world_point: Option<Point3<f32>>,
    /// Requested brush mode
    pub mode: BrushMode,
}

impl SculptInput {
    /// A frame with no edit.
    pub fn idle() -> Self {
        Self::default()
    }

    /// Adds material around `point`.
    pub fn build(point: Point3<f32>) -> Self {
        Self {
            world_point: Some(point),
            mode: BrushMode::Build,
        }
    }

    /// Removes material around `point`.
    pub fn erase(point: Point3<f32>) -> Self {
        Self {
            world_point: Some(point),
            mode: BrushMode::Erase,
        }
    }

    /// Builds the request from processed button states. The left button
    /// builds and the right button erases.
    pub fn from_pointer(input: &ProcessedInputState, world_point: Option<Point3<f32>>) -> Self {
        let mode = BrushMode::from_buttons(
            input.get_mouse_button_state(MouseButton::Left).is_active(),
            input.get_mouse_button_state(MouseButton::Right).is_active(),
        );
        Self { world_point, mode }
    }

    /// Returns the point and erase flag when this frame should edit the field.
    pub fn edit(&self) -> Option<(Point3<f32>, bool)> {
        let point = self.world_point?;
        match self.mode {
            BrushMode::Build => Some((point, false)),
            BrushMode::Erase => Some((point, true)),
            BrushMode::None => None,
        }
    }
}

/// A snapshot of the processed pointer button states.
#[derive(Debug, Default)]
pub struct ProcessedInputState {
    /// Current state of mouse buttons
    pub mouse_button_states: HashMap<MouseButton, RawInputState>,
}

impl ProcessedInputState {
    /// Gets the state of a mouse button
    pub fn get_mouse_button_state(&self, button: MouseButton) -> RawInputState {
        self.mouse_button_states
            .get(&button)
            .copied()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pointer(left: RawInputState, right: RawInputState) -> ProcessedInputState {
        let mut mouse_button_states = HashMap::new();
        mouse_button_states.insert(MouseButton::Left, left);
        mouse_button_states.insert(MouseButton::Right, right);
        ProcessedInputState {
            mouse_button_states,
        }
    }

    #[test]
    fn transitions_follow_previous_and_current() {
        assert_eq!(RawInputState::from_raw_states(false, true), RawInputState::Pressed);
        assert_eq!(RawInputState::from_raw_states(true, true), RawInputState::Held);
        assert_eq!(RawInputState::from_raw_states(true, false), RawInputState::Released);
        assert!(!RawInputState::Released.is_active());
    }

    #[test]
    fn right_button_wins() {
        let input = pointer(RawInputState::Held, RawInputState::Pressed);
        let sculpt = SculptInput::from_pointer(&input, Some(Point3::new(1.0, 2.0, 3.0)));
        assert_eq!(sculpt.mode, BrushMode::Erase);
        assert_eq!(sculpt.edit(), Some((Point3::new(1.0, 2.0, 3.0), true)));
    }

    #[test]
    fn no_point_means_no_edit() {
        let input = pointer(RawInputState::Held, RawInputState::NotPressed);
        let sculpt = SculptInput::from_pointer(&input, None);
        assert_eq!(sculpt.mode, BrushMode::Build);
        assert_eq!(sculpt.edit(), None);
    }

    #[test]
    fn released_button_is_idle() {
        let input = pointer(RawInputState::Released, RawInputState::NotPressed);
        let sculpt = SculptInput::from_pointer(&input, Some(Point3::new(0.0, 0.0, 0.0)));
        assert_eq!(sculpt.mode, BrushMode::None);
        assert_eq!(sculpt.edit(), None);
    }
}
