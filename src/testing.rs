//! Fakes and fixtures shared by unit tests.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use crate::config::parse_config;
use crate::engine::{NotificationSink, Phone, KeyCapture};
use crate::error::{HardwareError, PlaybackError};
use crate::lock;
use crate::phone::{HookSensor, KeyInput, VirtualSwitchhook};
use crate::sound::*;

/// Output device that records what it was asked to play. Nothing finishes until told to.
#[derive(Default)]
pub struct FakeAudio {
    tokens: TokenSource,
    started: Mutex<Vec<(PlaybackToken, PcmBuffer)>>,
    finished: Mutex<HashSet<PlaybackToken>>,
    auto_finish: AtomicBool,
    stops: AtomicUsize,
}

impl FakeAudio {
    pub fn new() -> Self {
        Default::default()
    }

    /// Makes every playback count as finished as soon as it starts.
    pub fn set_auto_finish(&self, auto_finish: bool) {
        self.auto_finish.store(auto_finish, Ordering::SeqCst);
    }

    pub fn finish_all(&self) {
        let started = lock(&self.started);
        lock(&self.finished).extend(started.iter().map(|(token, _)| *token));
    }

    /// Library keys of every started playback, oldest first.
    pub fn started(&self) -> Vec<String> {
        lock(&self.started).iter().map(|(_, buffer)| buffer.source.clone()).collect()
    }

    /// First sample of every started playback, oldest first.
    pub fn first_samples(&self) -> Vec<i16> {
        lock(&self.started).iter().map(|(_, buffer)| buffer.samples.first().copied().unwrap_or(0)).collect()
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn playing_count(&self) -> usize {
        let started = lock(&self.started);
        let finished = lock(&self.finished);
        started.iter().filter(|(token, _)| !finished.contains(token)).count()
    }
}

impl AudioOutput for FakeAudio {
    fn start(&self, buffer: PcmBuffer) -> Result<PlaybackToken, PlaybackError> {
        let token = self.tokens.next();
        lock(&self.started).push((token, buffer));
        if self.auto_finish.load(Ordering::SeqCst) {
            lock(&self.finished).insert(token);
        }
        Ok(token)
    }

    fn is_finished(&self, token: PlaybackToken) -> bool {
        self.auto_finish.load(Ordering::SeqCst) || lock(&self.finished).contains(&token)
    }

    fn stop_all(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.finish_all();
    }
}

/// Switchhook that can be told to fail.
#[derive(Default)]
pub struct FakeHook {
    hook: VirtualSwitchhook,
    failing: AtomicBool,
}

impl FakeHook {
    pub fn set_off_hook(&self, off_hook: bool) {
        self.hook.set_off_hook(off_hook);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl HookSensor for FakeHook {
    fn is_off_hook(&self) -> Result<bool, HardwareError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(HardwareError::Read("hook pin unavailable".into()))
        }
        self.hook.is_off_hook()
    }
}

/// Notification sink that keeps every update.
#[derive(Default)]
pub struct RecordingSink {
    updates: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn updates(&self) -> Vec<String> {
        lock(&self.updates).clone()
    }
}

impl NotificationSink for RecordingSink {
    fn on_digits_changed(&self, digits: &str) {
        lock(&self.updates).push(digits.to_owned());
    }
}

/// Library of short 16-bit tones stored under the given keys.
pub fn library_with(keys: &[&str]) -> SoundLibrary {
    let mut library = SoundLibrary::new("test-sounds");
    for key in keys {
        library.insert(*key, Sound {
            channels: 1,
            sample_rate: 8000,
            samples: PcmSamples::I16(vec![1000; 8]),
        });
    }
    library
}

pub const TEST_CONFIG: &str = r#"
    tick-rate = 1000.0
    dial-delay = 3.0

    [sound]
    root = "test-sounds"
    dial-tone = "dial"
    terminator = "beep.wav"
    wrong-number = "wrong"
    ringback = "ringback"
    ring-tone = "ring"
    ring-volume = 1.0

    [ring]
    pickup-grace-ms = 1

    [contacts]
    "110" = "police"
    "555" = "ghost"

    [incoming]
    mom = { sound = "mom", volume = 0.5 }
    boss = { sound = "boss" }
"#;

const TEST_SOUNDS: &[&str] = &[
    "dial", "beep", "wrong", "ringback", "ring",
    "deu/police", "eng/police", "deu/mom", "eng/mom",
    "0", "1", "2", "3", "4", "5", "6", "7", "8", "9", "*", "#",
];

/// A phone wired to fakes.
pub struct Rig {
    pub phone: Arc<Phone>,
    pub audio: Arc<FakeAudio>,
    pub hook: Arc<FakeHook>,
    pub display: Arc<RecordingSink>,
}

impl Rig {
    pub fn history_labels(&self) -> Vec<String> {
        self.phone.history().into_iter().map(|entry| entry.label).collect()
    }
}

pub fn rig() -> Rig {
    rig_with(TEST_CONFIG)
}

pub fn rig_with(config_src: &str) -> Rig {
    let config = parse_config(config_src).unwrap();
    let audio = Arc::new(FakeAudio::new());
    let hook = Arc::new(FakeHook::default());
    let display = Arc::new(RecordingSink::default());
    let phone = Phone::new(
        &config,
        Arc::new(library_with(TEST_SOUNDS)),
        Arc::clone(&audio) as Arc<dyn AudioOutput>,
        Arc::clone(&hook) as Arc<dyn HookSensor>,
        Arc::clone(&display) as Arc<dyn NotificationSink>,
    ).unwrap();
    Rig { phone: Arc::new(phone), audio, hook, display }
}

/// Presses and releases each key in turn.
pub fn dial(keys: &KeyCapture, digits: &str) {
    for c in digits.chars() {
        keys.press(KeyInput::Char(c));
        keys.release(KeyInput::Char(c));
    }
}

/// Polls `condition` for up to two seconds.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}
