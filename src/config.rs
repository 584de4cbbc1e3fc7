use std::fs;
use std::time::Duration;
use indexmap::IndexMap;
use serde::Deserialize;
use toml;
use crate::engine::Language;
use crate::error::ConfigError;

#[allow(non_camel_case_types)]
type ms = u64;

/// Characters a keypad can produce.
pub const KEYPAD_CHARS: &str = "0123456789*#";

#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "kebab-case")]
pub struct PhoneConfig {
    /// Number of times per second to poll the switchhook and update the phone state.
    /// The default of 50 gives the 20 ms cadence the hook needs.
    #[serde(default = "default_tick_rate")]
    pub tick_rate: f64,

    /// Delay (in seconds) to wait after the last digit is dialed,
    /// before the phone attempts to resolve the number.
    #[serde(default = "default_dial_delay")]
    pub dial_delay: f32,

    /// Two-letter code of the language selected at startup.
    #[serde(default = "default_language")]
    pub language: String,

    /// Log level filter name (`"trace"` through `"off"`).
    pub log_level: Option<String>,

    /// Sound configuration.
    pub sound: SoundConfig,

    /// Incoming ring configuration.
    #[serde(default)]
    pub ring: RingConfig,

    /// Dialable numbers and the sound asset each one plays.
    #[serde(default)]
    pub contacts: IndexMap<String, String>,

    /// Callers that can ring the phone remotely.
    #[serde(default)]
    pub incoming: IndexMap<String, IncomingCallerConfig>,

    /// GPIO configuration.
    pub gpio: Option<GpioConfig>,
}

fn default_tick_rate() -> f64 { 50.0 }
fn default_dial_delay() -> f32 { 3.0 }
fn default_language() -> String { String::from("de") }

#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "kebab-case")]
pub struct SoundConfig {
    /// Directory that sound assets are loaded from.
    /// Language-specific assets live in its `deu/` and `eng/` subdirectories.
    pub root: String,
    /// Looped while the handset is off-hook and nothing has been dialed.
    pub dial_tone: String,
    /// Played after a contact's message and after an incoming ring's message.
    pub terminator: String,
    /// Played when the dialed number is not in the contact list.
    pub wrong_number: String,
    /// Played before a contact's message, if set.
    pub ringback: Option<String>,
    /// Prefix of the per-digit key tone assets. Key tones are named after their digit by default.
    #[serde(default)]
    pub key_tone_prefix: String,
    /// Looped while an incoming ring waits for pickup.
    pub ring_tone: String,
    /// Volume of the ring tone.
    #[serde(default = "default_ring_volume")]
    pub ring_volume: f32,
}

fn default_ring_volume() -> f32 { 1.5 }

#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "kebab-case", default)]
pub struct RingConfig {
    /// Pause (in milliseconds) between pickup and the start of the caller's message.
    pub pickup_grace_ms: ms,
    /// Seconds to ring before giving up. Rings until pickup if unset.
    pub timeout_secs: Option<f32>,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            pickup_grace_ms: 500,
            timeout_secs: None,
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "kebab-case")]
pub struct IncomingCallerConfig {
    /// Per-language message asset played after pickup.
    pub sound: String,
    /// Message volume.
    #[serde(default = "default_caller_volume")]
    pub volume: f32,
}

fn default_caller_volume() -> f32 { 1.0 }

#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "kebab-case")]
pub struct GpioConfig {
    /// Input configuration for the switchhook.
    pub hook: HookPinConfig,
    /// Matrix keypad pins.
    pub keypad: Option<KeypadConfig>,
}

#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "kebab-case")]
pub struct HookPinConfig {
    /// BCM pin number of the input.
    pub pin: u8,
    /// Bounce time (ms) of the input.
    pub bounce_ms: Option<ms>,
    /// Name of the resistor type to use. Defaults to "none".
    pub pull: Option<String>,
    /// Logic level read while the handset rests on the hook. Defaults to high.
    #[serde(default = "default_on_hook_high")]
    pub on_hook_high: bool,
}

fn default_on_hook_high() -> bool { true }

#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "kebab-case")]
pub struct KeypadConfig {
    /// BCM pin numbers of keypad row inputs.
    pub rows: [u8; 4],
    /// BCM pin numbers of keypad column outputs.
    pub cols: [u8; 3],
}

impl PhoneConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.tick_rate).unwrap_or(Duration::MAX)
    }

    pub fn dial_delay(&self) -> Duration {
        Duration::try_from_secs_f32(self.dial_delay).unwrap_or(Duration::MAX)
    }

    pub fn ring_timeout(&self) -> Option<Duration> {
        self.ring.timeout_secs.map(|secs| Duration::try_from_secs_f32(secs).unwrap_or(Duration::MAX))
    }

    pub fn language(&self) -> Result<Language, ConfigError> {
        Language::from_code(&self.language).map_err(|err| ConfigError::Invalid(err.to_string()))
    }

    /// Checks the values serde can't.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(msg: String) -> Result<(), ConfigError> {
            Err(ConfigError::Invalid(msg))
        }

        if !self.tick_rate.is_finite() || self.tick_rate <= 0.0 {
            return invalid(format!("tick-rate must be positive (got {})", self.tick_rate))
        }
        check_secs("tick-rate", 1.0 / self.tick_rate)?;
        if !self.dial_delay.is_finite() || self.dial_delay <= 0.0 {
            return invalid(format!("dial-delay must be positive (got {})", self.dial_delay))
        }
        check_secs("dial-delay", self.dial_delay.into())?;
        self.language()?;

        let sound = &self.sound;
        for (key, name) in [
            ("root", &sound.root),
            ("dial-tone", &sound.dial_tone),
            ("terminator", &sound.terminator),
            ("wrong-number", &sound.wrong_number),
            ("ring-tone", &sound.ring_tone),
        ] {
            if name.trim().is_empty() {
                return invalid(format!("sound.{} must not be empty", key))
            }
        }
        check_volume("sound.ring-volume", sound.ring_volume)?;

        if let Some(timeout) = self.ring.timeout_secs {
            if !timeout.is_finite() || timeout <= 0.0 {
                return invalid(format!("ring.timeout-secs must be positive (got {})", timeout))
            }
            check_secs("ring.timeout-secs", timeout.into())?;
        }

        for (number, sound) in &self.contacts {
            if number.is_empty() || !number.chars().all(|c| KEYPAD_CHARS.contains(c)) {
                return invalid(format!("contact number '{}' may only contain the keys {}", number, KEYPAD_CHARS))
            }
            if sound.trim().is_empty() {
                return invalid(format!("contact '{}' has no sound", number))
            }
        }

        for (caller, incoming) in &self.incoming {
            if incoming.sound.trim().is_empty() {
                return invalid(format!("incoming caller '{}' has no sound", caller))
            }
            check_volume(&format!("incoming.{}.volume", caller), incoming.volume)?;
        }

        Ok(())
    }
}

/// Rejects spans too long to fit in a `Duration`.
fn check_secs(key: &str, secs: f64) -> Result<(), ConfigError> {
    match Duration::try_from_secs_f64(secs) {
        Ok(_) => Ok(()),
        Err(_) => Err(ConfigError::Invalid(format!("{} gives an out-of-range duration ({} s)", key, secs))),
    }
}

fn check_volume(key: &str, volume: f32) -> Result<(), ConfigError> {
    if !volume.is_finite() || volume < 0.0 {
        return Err(ConfigError::Invalid(format!("{} must be a non-negative number (got {})", key, volume)))
    }
    Ok(())
}

/// Strips a trailing `.wav` so config entries can name assets either way.
pub fn asset_name(name: &str) -> &str {
    let name = name.trim();
    name.strip_suffix(".wav").unwrap_or(name)
}

pub fn parse_config(src: &str) -> Result<PhoneConfig, ConfigError> {
    let config: PhoneConfig = toml::from_str(src)?;
    config.validate()?;
    Ok(config)
}

pub fn load_config(path: &str) -> Result<PhoneConfig, ConfigError> {
    let config_str = fs::read_to_string(path)?;
    parse_config(&config_str)
}
