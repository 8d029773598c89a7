//! # Input Manager
//!
//! Tracks the sculpt buttons across frames and turns them, together with the
//! externally ray-cast surface point, into one `SculptInput` per frame.

use std::collections::HashMap;

use cgmath::Point3;
use winit::event::{ElementState, MouseButton, WindowEvent};

use super::input_state::{ProcessedInputState, RawInputState, SculptInput};

const SCULPT_BUTTONS: [MouseButton; 2] = [MouseButton::Left, MouseButton::Right];

/// Tracks pointer buttons and the surface point under the pointer.
#[derive(Debug)]
pub struct InputManager {
    /// Button states as of the previous frame
    pub mouse_button_inputs_old: HashMap<MouseButton, bool>,
    /// Button states as of the latest event
    pub mouse_button_inputs_new: HashMap<MouseButton, bool>,
    /// Surface point reported by the last ray cast
    pub hit_point: Option<Point3<f32>>,
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}

impl InputManager {
    /// Creates a manager with every sculpt button released and no hit point.
    pub fn new() -> Self {
        let mut mouse_button_inputs_old = HashMap::new();
        let mut mouse_button_inputs_new = HashMap::new();
        for button in SCULPT_BUTTONS {
            mouse_button_inputs_old.insert(button, false);
            mouse_button_inputs_new.insert(button, false);
        }

        Self {
            mouse_button_inputs_old,
            mouse_button_inputs_new,
            hit_point: None,
        }
    }

    /// Processes a window event, recording sculpt button changes.
    pub fn intake_input(&mut self, event: &WindowEvent) {
        if let WindowEvent::MouseInput { button, state, .. } = event {
            self.intake_mouse_button(*button, *state);
        }
    }

    /// Records a button press or release. Buttons other than the sculpt
    /// buttons are ignored.
    pub fn intake_mouse_button(&mut self, button: MouseButton, state: ElementState) {
        if let Some(button_state) = self.mouse_button_inputs_new.get_mut(&button) {
            *button_state = state == ElementState::Pressed;
        }
    }

    /// Stores the result of this frame's pointer ray cast.
    pub fn intake_hit_point(&mut self, hit_point: Option<Point3<f32>>) {
        self.hit_point = hit_point;
    }

    /// Translates the raw booleans into pressed/held/released transitions.
    pub fn create_processed_input_state(&self) -> ProcessedInputState {
        let mouse_button_states = self
            .mouse_button_inputs_new
            .iter()
            .map(|(button, &new_state)| {
                let old_state = self
                    .mouse_button_inputs_old
                    .get(button)
                    .copied()
                    .unwrap_or(false);
                (*button, RawInputState::from_raw_states(old_state, new_state))
            })
            .collect();

        ProcessedInputState {
            mouse_button_states,
        }
    }

    /// Produces this frame's sculpt request and rolls button state forward.
    pub fn take_frame_input(&mut self) -> SculptInput {
        let processed = self.create_processed_input_state();
        let input = SculptInput::from_pointer(&processed, self.hit_point.take());
        self.move_old_states();
        input
    }

    /// Copies the current button states into the previous-frame slots.
    pub fn move_old_states(&mut self) {
        for (button, new_state) in self.mouse_button_inputs_new.iter() {
            if let Some(old_state) = self.mouse_button_inputs_old.get_mut(button) {
                *old_state = *new_state;
            }
        }
    }

    /// Releases every button, e.g. when the window loses focus.
    pub fn reset_inputs(&mut self) {
        for state in self.mouse_button_inputs_new.values_mut() {
            *state = false;
        }
        self.move_old_states();
        self.hit_point = None;
    }
}
