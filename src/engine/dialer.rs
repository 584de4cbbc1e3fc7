use std::time::{Duration, Instant};
use indexmap::IndexMap;
use crate::config::asset_name;

/// Dialable numbers and the sound asset each one leads to. Read-only after startup.
#[derive(Clone, Debug, Default)]
pub struct ContactDirectory {
    contacts: IndexMap<String, String>,
}

impl ContactDirectory {
    pub fn new<'a>(contacts: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        Self {
            contacts: contacts
                .into_iter()
                .map(|(number, sound)| (number.clone(), asset_name(sound).to_owned()))
                .collect(),
        }
    }

    /// Returns the sound asset name for a number.
    pub fn lookup(&self, number: &str) -> Option<&str> {
        self.contacts.get(number).map(String::as_str)
    }

    pub fn sounds(&self) -> impl Iterator<Item = &str> {
        self.contacts.values().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }
}

/// Outcome of resolving a dialed number.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// The number belongs to a contact.
    Contact { number: String, sound: String },
    /// Nobody has this number.
    WrongNumber(String),
}

/// Accumulates dialed digits and decides when the number is complete.
pub struct Dialer {
    /// The number dialed so far.
    digits: String,
    /// Set once a number has resolved to a contact; cleared on hang-up.
    call_active: bool,
    /// Time after the last digit before the number is resolved.
    dial_delay: Duration,
    directory: ContactDirectory,
}

impl Dialer {
    pub fn new(directory: ContactDirectory, dial_delay: Duration) -> Self {
        Self {
            digits: String::new(),
            call_active: false,
            dial_delay,
            directory,
        }
    }

    pub fn directory(&self) -> &ContactDirectory {
        &self.directory
    }

    pub fn digits(&self) -> &str {
        &self.digits
    }

    #[inline]
    pub fn is_call_active(&self) -> bool {
        self.call_active
    }

    /// Appends a digit. Digits are refused while a call is active.
    pub fn accumulate(&mut self, digit: char) -> bool {
        if self.call_active {
            return false
        }
        self.digits.push(digit);
        true
    }

    /// Indicates whether the dial delay has passed since the last key press with a number pending.
    pub fn check_timeout(&self, last_key_time: Instant, now: Instant) -> bool {
        !self.call_active
            && !self.digits.is_empty()
            && now.saturating_duration_since(last_key_time) > self.dial_delay
    }

    /// Looks up the dialed number and clears it.
    pub fn resolve(&mut self) -> Resolution {
        let number = std::mem::take(&mut self.digits);
        match self.directory.lookup(&number) {
            Some(sound) => {
                self.call_active = true;
                Resolution::Contact { sound: sound.to_owned(), number }
            },
            None => Resolution::WrongNumber(number),
        }
    }

    /// Returns to the idle state. Returns `true` if there were digits to clear.
    pub fn reset(&mut self) -> bool {
        self.call_active = false;
        let had_digits = !self.digits.is_empty();
        self.digits.clear();
        had_digits
    }
}
