#![cfg(feature = "rpi")]

mod debounce;
mod pull;

pub use debounce::*;
pub use pull::*;
use rppal::gpio::{Gpio, OutputPin};

use std::sync::{mpsc, Mutex, Arc, atomic::{AtomicBool, Ordering}};
use std::time::Duration;
use std::thread;
use log::{info, trace};
use crate::config::*;
use crate::engine::KeyCapture;
use crate::error::HardwareError;
use crate::lock;
use crate::phone::*;

const KEYPAD_ROW_BOUNCE: Duration = Duration::from_micros(850);
const KEYPAD_SCAN_INTERVAL: Duration = Duration::from_micros(1000);
const KEYPAD_COL_COUNT: usize = 3;
const KEYPAD_ROW_COUNT: usize = 4;
const KEYPAD_DIGITS: &[u8; KEYPAD_COL_COUNT * KEYPAD_ROW_COUNT] = b"123456789*0#";

fn init_error(err: rppal::gpio::Error) -> HardwareError {
    HardwareError::Init(err.to_string())
}

pub fn open_gpio() -> Result<Gpio, HardwareError> {
    Gpio::new().map_err(init_error)
}

fn soft_input(gpio: &Gpio, pin: u8, pull: Pull, bounce_time: Duration) -> Result<SoftInputPin, HardwareError> {
    let pin = gpio.get(pin).map_err(init_error)?;
    make_input_pin(pin, pull).debounce(bounce_time).map_err(init_error)
}

/// Switchhook wired to a GPIO input.
pub struct GpioHookSensor {
    pin: Mutex<SoftInputPin>,
    /// Level the pin reads while the handset is on the hook.
    on_hook_high: bool,
}

impl GpioHookSensor {
    pub fn new(gpio: &Gpio, config: &HookPinConfig) -> Result<Self, HardwareError> {
        let bounce_time = Duration::from_millis(config.bounce_ms.unwrap_or(0));
        let pin = soft_input(gpio, config.pin, Pull::from(&config.pull), bounce_time)?;
        info!("Switchhook on pin {} (on-hook {}).", config.pin, if config.on_hook_high { "high" } else { "low" });
        Ok(Self {
            pin: Mutex::new(pin),
            on_hook_high: config.on_hook_high,
        })
    }
}

impl HookSensor for GpioHookSensor {
    fn is_off_hook(&self) -> Result<bool, HardwareError> {
        Ok(lock(&self.pin).is_high() != self.on_hook_high)
    }
}

/// 4x3 matrix keypad: row inputs pulled down, column outputs driven high.
///
/// A row going high starts a scan that drops the columns one at a time until the
/// row follows; that column locates the key. The row falling again releases it.
pub struct GpioKeypad {
    rows: Vec<SoftInputPin>,
    cols: Arc<Mutex<[OutputPin; KEYPAD_COL_COUNT]>>,
}

impl GpioKeypad {
    pub fn new(gpio: &Gpio, config: &KeypadConfig) -> Result<Self, HardwareError> {
        let rows = config.rows
            .iter()
            .map(|pin| soft_input(gpio, *pin, Pull::Down, KEYPAD_ROW_BOUNCE))
            .collect::<Result<Vec<_>, _>>()?;
        let output = |pin: u8| gpio.get(pin).map(|p| p.into_output()).map_err(init_error);
        let cols = [output(config.cols[0])?, output(config.cols[1])?, output(config.cols[2])?];
        Ok(Self {
            rows,
            cols: Arc::new(Mutex::new(cols)),
        })
    }
}

impl KeySource for GpioKeypad {
    fn listen(&mut self, capture: Arc<KeyCapture>) -> Result<(), HardwareError> {
        // Set the cols initially high
        for col in lock(&self.cols).iter_mut() {
            col.set_high();
        }

        let (tx_keypad, rx_keypad) = mpsc::channel::<(usize, bool)>();
        let cols = Arc::clone(&self.cols);
        let suppress_row_events = Arc::new(AtomicBool::new(false));
        let suppress_row_events_cl = Arc::clone(&suppress_row_events);

        thread::Builder::new().name("keypad".into()).spawn(move || {
            let mut held: [Option<char>; KEYPAD_ROW_COUNT] = [None; KEYPAD_ROW_COUNT];

            while let Ok((row_index, row_high)) = rx_keypad.recv() {
                if !row_high {
                    if let Some(digit) = held[row_index].take() {
                        capture.release(KeyInput::Char(digit));
                    }
                    continue
                }
                if held[row_index].is_some() {
                    continue
                }

                let mut cols = lock(&cols);
                // Turn off each col until row turns off
                for col_index in 0..KEYPAD_COL_COUNT {
                    cols[col_index].set_low();
                    if rx_keypad.recv_timeout(KEYPAD_SCAN_INTERVAL) == Ok((row_index, false)) {
                        let digit = KEYPAD_DIGITS[row_index * KEYPAD_COL_COUNT + col_index] as char;
                        trace!("Keypad row {} col {} -> '{}'", row_index, col_index, digit);
                        capture.press(KeyInput::Char(digit));
                        held[row_index] = Some(digit);
                        break
                    }
                }

                // Turn cols back on
                suppress_row_events_cl.store(true, Ordering::SeqCst);
                for col in cols.iter_mut() {
                    col.set_high();
                }
                thread::sleep(KEYPAD_SCAN_INTERVAL);
                suppress_row_events_cl.store(false, Ordering::SeqCst);
            }
        }).map_err(|err| HardwareError::Init(err.to_string()))?;

        // Create input handler for each keypad row
        for (i, row) in self.rows.iter_mut().enumerate() {
            let tx_keypad = tx_keypad.clone();
            let suppress_row_events = Arc::clone(&suppress_row_events);
            row.on_changed(move |state| {
                if suppress_row_events.load(Ordering::SeqCst) { return }
                let _ = tx_keypad.send((i, state));
            });
        }

        info!("Keypad initialized.");
        Ok(())
    }
}
