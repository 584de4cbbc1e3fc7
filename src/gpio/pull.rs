use rppal::gpio::{InputPin, Pin};
use log::warn;

/// Internal resistor applied to an input pin.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Pull {
    None,
    Up,
    Down
}

impl From<&str> for Pull {
    fn from(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "up" => Pull::Up,
            "down" => Pull::Down,
            _ => Pull::None
        }
    }
}

impl From<&Option<String>> for Pull {
    fn from(name: &Option<String>) -> Self {
        name.as_deref().map_or(Pull::None, Pull::from)
    }
}

pub fn make_input_pin(pin: Pin, pull: Pull) -> InputPin {
    match pull {
        Pull::Up => pin.into_input_pullup(),
        Pull::Down => pin.into_input_pulldown(),
        Pull::None => {
            warn!("Pin {} is floating. Consider using internal pull resistor instead.", pin.pin());
            pin.into_input()
        }
    }
}
