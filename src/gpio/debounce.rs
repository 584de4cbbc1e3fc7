use std::thread;
use std::sync::{Mutex, Arc, mpsc};
use std::time::{Instant, Duration};
use log::trace;
use rppal::gpio::{Error, InputPin, Level, Trigger};
use crate::lock;

/// Enables a digital input to be wrapped into a debounced input.
pub trait Debounce<T> where T: Debounced {
    fn debounce(self, time: Duration) -> Result<T, Error>;
}

/// Represents a debounced digital input.
pub trait Debounced {
    fn on_changed<C>(&mut self, callback: C)
        where C: FnMut(bool) + Send + 'static;

    fn is_high(&self) -> bool;
}

/// Simple wrapper around `rppal::gpio::pin::InputPin` to add debouncing.
pub struct SoftInputPin {
    pin: InputPin,
    state: Arc<Mutex<SoftInputState>>,
}

struct SoftInputState {
    bounce_time: Duration,
    last_changed: Instant,
    last_value: bool,
    change_callback: Option<Box<dyn FnMut(bool) + Send + 'static>>
}

impl SoftInputState {
    fn change_last_value(&mut self, new_value: bool) {
        self.last_changed = Instant::now();
        self.last_value = new_value;
        if let Some(callback) = self.change_callback.as_mut() {
            callback(new_value);
        }
    }
}

impl SoftInputPin {
    fn new(pin: InputPin, bounce_time: Duration) -> Result<Self, Error> {
        let state = SoftInputState {
            last_changed: Instant::now(),
            bounce_time,
            last_value: pin.is_high(),
            change_callback: None
        };

        let mut s = Self {
            pin,
            state: Arc::new(Mutex::new(state)),
        };
        s.start_handler_thread()?;
        Ok(s)
    }

    fn start_handler_thread(&mut self) -> Result<(), Error> {
        let (tx_handler, rx) = mpsc::channel::<bool>();
        let state = Arc::clone(&self.state);
        let pin_id = self.pin.pin();

        thread::spawn(move || {
            while let Ok(new_value) = rx.recv() {
                let bounce_time = {
                    let mut state = lock(&state);
                    // Ignore this event if the state hasn't changed
                    if new_value == state.last_value {
                        continue
                    }
                    trace!("Pin {} changed to {} after {:?}", pin_id, new_value, state.last_changed.elapsed());
                    state.change_last_value(new_value);
                    state.bounce_time
                };

                thread::sleep(bounce_time);

                // Edges seen during the bounce collapse into the level the pin settled on
                let next_value = rx.try_iter().last().unwrap_or(new_value);
                let mut state = lock(&state);
                if next_value != state.last_value {
                    state.change_last_value(next_value);
                }
            }
        });

        self.pin.set_async_interrupt(Trigger::Both, move |level| {
            // The handler only goes away with the pin
            let _ = tx_handler.send(level == Level::High);
        })
    }
}

impl Debounce<SoftInputPin> for InputPin {
    fn debounce(self, time: Duration) -> Result<SoftInputPin, Error> {
        SoftInputPin::new(self, time)
    }
}

impl Debounced for SoftInputPin {
    fn on_changed<C>(&mut self, callback: C)
    where C: FnMut(bool) + Send + 'static {
        lock(&self.state).change_callback = Some(Box::new(callback));
    }

    fn is_high(&self) -> bool {
        lock(&self.state).last_value
    }
}
