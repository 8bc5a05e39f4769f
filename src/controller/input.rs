//! Platform-agnostic pointer input for the desktop camera controllers

/// Platform-independent input events. Coordinates are logical pixels relative
/// to the canvas/window origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    PointerDown { button: MouseButton, x: f32, y: f32 },
    PointerMove { x: f32, y: f32 },
    PointerUp { button: MouseButton },
    Wheel { delta_y: f32, mode: WheelDeltaMode },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    /// Back, forward and other extra buttons have no camera action
    pub fn from_web_button(button: i16) -> Option<Self> {
        match button {
            0 => Some(MouseButton::Left),
            1 => Some(MouseButton::Middle),
            2 => Some(MouseButton::Right),
            _ => None,
        }
    }
}

/// Unit of a wheel delta, as reported by `WheelEvent.deltaMode`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WheelDeltaMode {
    Pixel,
    Line,
    Page,
}

impl WheelDeltaMode {
    pub fn from_dom(mode: u32) -> Self {
        match mode {
            1 => WheelDeltaMode::Line,
            2 => WheelDeltaMode::Page,
            _ => WheelDeltaMode::Pixel,
        }
    }
}

#[cfg(target_arch = "wasm32")]
pub mod wasm {
    use super::*;
    use web_sys::{MouseEvent, WheelEvent};

    pub fn mouse_down_to_input(e: &MouseEvent) -> Option<InputEvent> {
        Some(InputEvent::PointerDown {
            button: MouseButton::from_web_button(e.button())?,
            x: e.client_x() as f32,
            y: e.client_y() as f32,
        })
    }

    pub fn mouse_move_to_input(e: &MouseEvent) -> InputEvent {
        InputEvent::PointerMove { x: e.client_x() as f32, y: e.client_y() as f32 }
    }

    pub fn mouse_up_to_input(e: &MouseEvent) -> Option<InputEvent> {
        Some(InputEvent::PointerUp { button: MouseButton::from_web_button(e.button())? })
    }

    pub fn wheel_to_input(e: &WheelEvent) -> InputEvent {
        InputEvent::Wheel { delta_y: e.delta_y() as f32, mode: WheelDeltaMode::from_dom(e.delta_mode()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_web_button_mapping() {
        assert_eq!(MouseButton::from_web_button(0), Some(MouseButton::Left));
        assert_eq!(MouseButton::from_web_button(1), Some(MouseButton::Middle));
        assert_eq!(MouseButton::from_web_button(2), Some(MouseButton::Right));
    }

    #[test]
    fn test_back_and_forward_buttons_are_dropped() {
        assert_eq!(MouseButton::from_web_button(3), None);
        assert_eq!(MouseButton::from_web_button(4), None);
    }

    #[test]
    fn test_wheel_delta_mode_from_dom() {
        assert_eq!(WheelDeltaMode::from_dom(0), WheelDeltaMode::Pixel);
        assert_eq!(WheelDeltaMode::from_dom(1), WheelDeltaMode::Line);
        assert_eq!(WheelDeltaMode::from_dom(2), WheelDeltaMode::Page);
    }
}
