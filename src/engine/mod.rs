mod dialer;
mod history;
mod keys;
mod language;
mod notify;
mod ring;

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::{Duration, Instant};
use log::{debug, info, warn};
use thread_priority::{set_current_thread_priority, ThreadPriority};
use crate::config::*;
use crate::error::{ConfigError, LanguageError};
use crate::lock;
use crate::phone::HookSensor;
use crate::sound::*;

pub use self::dialer::*;
pub use self::history::*;
pub use self::keys::*;
pub use self::language::*;
pub use self::notify::*;
pub use self::ring::*;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LineState {
    /// The handset is on the hook.
    Idle,
    /// The handset is lifted and no call is connected. Plays the dial tone until a number is dialed.
    Dialing,
    /// A dialed number was resolved and its sound queue is playing.
    ActiveCall,
    /// An incoming ring has taken over the line.
    ExternalRing,
}

/// Sound assets with a fixed role.
struct Tones {
    dial_tone: String,
    terminator: String,
    wrong_number: String,
    ringback: Option<String>,
    key_tone_prefix: String,
    ring_tone: String,
    ring_volume: f32,
}

impl Tones {
    fn from_config(config: &SoundConfig) -> Self {
        Self {
            dial_tone: asset_name(&config.dial_tone).to_owned(),
            terminator: asset_name(&config.terminator).to_owned(),
            wrong_number: asset_name(&config.wrong_number).to_owned(),
            ringback: config.ringback.as_deref().map(|name| asset_name(name).to_owned()),
            key_tone_prefix: config.key_tone_prefix.clone(),
            ring_tone: asset_name(&config.ring_tone).to_owned(),
            ring_volume: config.ring_volume,
        }
    }

    fn key_tone(&self, digit: char) -> String {
        format!("{}{}", self.key_tone_prefix, SoundLibrary::literal(&digit.to_string()))
    }
}

/// The telephone: hook and key handling, dialing, call audio and incoming rings.
///
/// One instance is shared by every thread for the lifetime of the process.
/// Only the polling loop calls `tick()`; the request layer uses
/// `set_language()`, `trigger_external_ring()` and `history()`.
pub struct Phone {
    /// Switchhook input.
    hook: Arc<dyn HookSensor>,
    /// Keys captured since the last tick.
    keys: Arc<KeyCapture>,
    /// Dialing state. Locked by the polling loop for the duration of a tick.
    line: Mutex<Dialer>,
    playback: Playback,
    history: HistoryLog,
    notifier: Arc<dyn NotificationSink>,
    tones: Tones,
    callers: CallerDirectory,
    /// Index of the selected `Language`.
    language: AtomicU8,
    /// While set, the polling loop leaves the line to the ring flow.
    ring_active: AtomicBool,
    /// Held by the polling loop while a tick is in progress.
    tick_lock: Mutex<()>,
    tick_interval: Duration,
    pickup_grace: Duration,
    ring_timeout: Option<Duration>,
    /// Set while hook reads are failing, so failures are only reported once.
    hook_failing: AtomicBool,
}

impl Phone {
    pub fn new(
        config: &PhoneConfig,
        library: Arc<SoundLibrary>,
        output: Arc<dyn AudioOutput>,
        hook: Arc<dyn HookSensor>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Result<Self, ConfigError> {
        let language = config.language()?;
        let tick_interval = config.tick_interval();
        let directory = ContactDirectory::new(&config.contacts);
        let callers = CallerDirectory::new(&config.incoming);

        let phone = Self {
            hook,
            keys: Arc::new(KeyCapture::new()),
            line: Mutex::new(Dialer::new(directory, config.dial_delay())),
            playback: Playback::new(library, output, tick_interval),
            history: Default::default(),
            notifier,
            tones: Tones::from_config(&config.sound),
            callers,
            language: AtomicU8::new(language.as_index()),
            ring_active: AtomicBool::new(false),
            tick_lock: Mutex::new(()),
            tick_interval,
            pickup_grace: Duration::from_millis(config.ring.pickup_grace_ms),
            ring_timeout: config.ring_timeout(),
            hook_failing: AtomicBool::new(false),
        };
        phone.report_missing_assets();
        Ok(phone)
    }

    /// Warns about configured sounds that aren't in the library.
    fn report_missing_assets(&self) {
        let library = self.playback.library();
        let mut missing: Vec<String> = Vec::new();
        let tones = &self.tones;
        for name in [&tones.dial_tone, &tones.terminator, &tones.wrong_number, &tones.ring_tone]
            .into_iter()
            .chain(tones.ringback.as_ref())
        {
            if !library.contains(name) {
                missing.push(name.clone());
            }
        }
        for digit in KEYPAD_CHARS.chars() {
            let key = tones.key_tone(digit);
            if !library.contains(&key) {
                missing.push(key);
            }
        }
        let line = lock(&self.line);
        let per_language = line.directory().sounds().chain(self.callers.sounds());
        for name in per_language {
            for lang in enum_iterator::all::<Language>() {
                let key = lang.asset_key(name);
                if !library.contains(&key) {
                    missing.push(key);
                }
            }
        }
        for key in missing {
            warn!("Missing sound asset: '{}'", key);
        }
        info!("Phone ready ({} contacts, {} incoming callers)", line.directory().len(), self.callers.len());
    }

    /// The key capture that keypad sources should feed.
    pub fn keys(&self) -> Arc<KeyCapture> {
        Arc::clone(&self.keys)
    }

    pub fn language(&self) -> Language {
        Language::from_index(self.language.load(Ordering::Acquire))
    }

    /// Switches the language used for contact and caller sounds.
    pub fn set_language(&self, code: &str) -> Result<Language, LanguageError> {
        let language = Language::from_code(code)?;
        self.language.store(language.as_index(), Ordering::Release);
        info!("Language set to {:?}", language);
        Ok(language)
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.history.snapshot()
    }

    #[inline]
    pub fn is_ringing(&self) -> bool {
        self.ring_active.load(Ordering::Acquire)
    }

    pub fn digits(&self) -> String {
        lock(&self.line).digits().to_owned()
    }

    pub fn is_call_active(&self) -> bool {
        lock(&self.line).is_call_active()
    }

    pub fn queued_sounds(&self) -> Vec<String> {
        self.playback.queued()
    }

    /// Runs the polling loop until `running` is cleared.
    pub fn run(&self, running: &AtomicBool) {
        if let Err(err) = set_current_thread_priority(ThreadPriority::Max) {
            warn!("Unable to raise polling thread priority: {:?}", err);
        }

        info!("Polling every {:?}", self.tick_interval);
        let mut state = LineState::Idle;
        while running.load(Ordering::Acquire) {
            let cycle_start = Instant::now();
            if let Some(next_state) = self.tick() {
                if next_state != state {
                    info!("{:?} --> {:?}", state, next_state);
                    state = next_state;
                }
            }
            if let Some(remaining) = self.tick_interval.checked_sub(cycle_start.elapsed()) {
                spin_sleep::sleep(remaining);
            }
        }

        self.playback.stop_all_and_clear_queue();
        info!("Polling stopped.");
    }

    /// Runs one cycle of the polling loop.
    pub fn tick(&self) -> Option<LineState> {
        self.tick_at(Instant::now())
    }

    /// Runs one cycle of the polling loop as if the current time were `now`.
    /// Returns `None` if the hook could not be read this cycle.
    pub fn tick_at(&self, now: Instant) -> Option<LineState> {
        if self.is_ringing() {
            return Some(LineState::ExternalRing)
        }
        let _tick = lock(&self.tick_lock);
        // A ring may have started while we waited for the lock
        if self.is_ringing() {
            return Some(LineState::ExternalRing)
        }

        match self.read_hook()? {
            true => Some(self.phone_up(now)),
            false => {
                self.phone_down();
                Some(LineState::Idle)
            }
        }
    }

    /// Reads the hook sensor, logging the first of a run of failed reads.
    fn read_hook(&self) -> Option<bool> {
        match self.hook.is_off_hook() {
            Ok(off_hook) => {
                if self.hook_failing.swap(false, Ordering::Relaxed) {
                    info!("Hook sensor recovered.");
                }
                Some(off_hook)
            },
            Err(err) => {
                if !self.hook_failing.swap(true, Ordering::Relaxed) {
                    warn!("Hook sensor read failed; retrying: {}", err);
                }
                None
            }
        }
    }

    /// Handset is on the hook: drop everything.
    fn phone_down(&self) {
        let had_digits = lock(&self.line).reset();
        self.playback.stop_all_and_clear_queue();
        self.keys.clear_pending();
        if had_digits {
            self.notifier.on_digits_changed("");
        }
    }

    /// Handset is lifted: take keys, resolve finished numbers, keep audio going.
    fn phone_up(&self, now: Instant) -> LineState {
        let mut line = lock(&self.line);
        self.handle_keys(&mut line);

        if line.is_call_active() {
            if !self.playback.is_playing() {
                if let Some(Err(err)) = self.playback.play_next_queued() {
                    warn!("{}", err);
                }
            }
            return LineState::ActiveCall
        }

        if line.check_timeout(self.keys.last_key_time(), now) {
            self.finish_dialing(&mut line);
            return if line.is_call_active() { LineState::ActiveCall } else { LineState::Dialing }
        }

        if line.digits().is_empty() && !self.playback.is_playing() {
            self.play_or_warn(&self.tones.dial_tone, false, FULL_VOLUME);
        }
        LineState::Dialing
    }

    /// Moves captured keys into the dialed number, playing a tone for each.
    fn handle_keys(&self, line: &mut Dialer) {
        let keys = self.keys.drain();
        if keys.is_empty() {
            return
        }
        if line.is_call_active() {
            debug!("Ignoring {} key(s) during call", keys.len());
            return
        }

        for key in keys {
            line.accumulate(key);
            info!("Host dialed '{}'", key);
            // Last key wins: cut off the previous tone
            self.playback.stop_all_and_clear_queue();
            self.play_or_warn(&self.tones.key_tone(key), false, FULL_VOLUME);
        }
        self.notifier.on_digits_changed(line.digits());
    }

    /// Resolves the dialed number and starts the call or the wrong-number tone.
    fn finish_dialing(&self, line: &mut Dialer) {
        let resolution = line.resolve();
        self.playback.stop_all_and_clear_queue();
        match resolution {
            Resolution::Contact { number, sound } => {
                let message = self.language().asset_key(&sound);
                if self.playback.library().contains(&message) {
                    info!("Calling: {} ({})", number, sound);
                    if let Some(ringback) = &self.tones.ringback {
                        self.play_or_warn(ringback, false, FULL_VOLUME);
                    }
                    self.playback.enqueue(message);
                    self.playback.enqueue(self.tones.terminator.as_str());
                    self.history.record(sound);
                } else {
                    warn!("No sound '{}' for {}; treating as a wrong number.", message, number);
                    line.reset();
                    self.wrong_number(number);
                }
            },
            Resolution::WrongNumber(number) => self.wrong_number(number),
        }
        self.notifier.on_digits_changed("");
    }

    fn wrong_number(&self, number: String) {
        info!("Wrong number: {}", number);
        self.play_or_warn(&self.tones.wrong_number, false, FULL_VOLUME);
        self.history.record(number);
    }

    /// Clears the line back to a fresh state without touching the hook.
    fn reset_line(&self) {
        self.phone_down();
    }

    fn play_or_warn(&self, key: &str, wait: bool, volume: f32) -> bool {
        match self.playback.play(key, wait, volume) {
            Ok(_) => true,
            Err(err) => {
                warn!("{}", err);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    const LATER: Duration = Duration::from_secs(4);

    #[test]
    fn on_hook_is_idle_and_silent() {
        let rig = rig();
        assert_eq!(rig.phone.tick(), Some(LineState::Idle));
        assert!(rig.audio.started().is_empty());
    }

    #[test]
    fn lifted_handset_loops_dial_tone() {
        let rig = rig();
        rig.hook.set_off_hook(true);
        assert_eq!(rig.phone.tick(), Some(LineState::Dialing));
        assert_eq!(rig.phone.tick(), Some(LineState::Dialing));
        assert_eq!(rig.audio.started(), ["dial"]);
        rig.audio.finish_all();
        rig.phone.tick();
        assert_eq!(rig.audio.started(), ["dial", "dial"]);
    }

    #[test]
    fn digits_play_key_tones_last_wins() {
        let rig = rig();
        rig.hook.set_off_hook(true);
        rig.phone.tick();
        dial(&rig.phone.keys(), "1*");
        assert_eq!(rig.phone.tick(), Some(LineState::Dialing));
        assert_eq!(rig.audio.started(), ["dial", "1", "*"]);
        assert_eq!(rig.audio.stop_count(), 2);
        assert_eq!(rig.phone.digits(), "1*");
        assert_eq!(rig.display.updates(), ["1*"]);
        // Dial tone stays off while a number is pending
        rig.audio.finish_all();
        rig.phone.tick();
        assert_eq!(rig.audio.started().len(), 3);
    }

    #[test]
    fn known_number_starts_call() {
        let rig = rig();
        rig.hook.set_off_hook(true);
        dial(&rig.phone.keys(), "110");
        rig.phone.tick();
        assert_eq!(rig.phone.tick_at(Instant::now() + LATER), Some(LineState::ActiveCall));

        assert!(rig.phone.is_call_active());
        assert_eq!(rig.phone.queued_sounds(), ["deu/police", "beep"]);
        assert_eq!(rig.audio.started().last().unwrap(), "ringback");
        assert_eq!(rig.history_labels(), ["police"]);
        assert_eq!(rig.display.updates(), ["110", ""]);
        assert!(rig.phone.digits().is_empty());
    }

    #[test]
    fn call_sounds_play_in_order() {
        let rig = rig();
        rig.hook.set_off_hook(true);
        dial(&rig.phone.keys(), "110");
        rig.phone.tick();
        rig.phone.tick_at(Instant::now() + LATER);

        // Ringback still playing
        rig.phone.tick();
        assert_eq!(rig.phone.queued_sounds().len(), 2);
        rig.audio.finish_all();
        assert_eq!(rig.phone.tick(), Some(LineState::ActiveCall));
        assert_eq!(rig.audio.started().last().unwrap(), "deu/police");
        rig.phone.tick();
        assert_eq!(rig.phone.queued_sounds(), ["beep"]);
        rig.audio.finish_all();
        rig.phone.tick();
        assert_eq!(rig.audio.started().last().unwrap(), "beep");
        rig.audio.finish_all();
        let before = rig.audio.started().len();
        assert_eq!(rig.phone.tick(), Some(LineState::ActiveCall));
        assert_eq!(rig.audio.started().len(), before);
    }

    #[test]
    fn unknown_number_plays_wrong_number_tone() {
        let rig = rig();
        rig.hook.set_off_hook(true);
        dial(&rig.phone.keys(), "99");
        rig.phone.tick();
        assert_eq!(rig.phone.tick_at(Instant::now() + LATER), Some(LineState::Dialing));

        assert!(!rig.phone.is_call_active());
        assert_eq!(rig.audio.started().last().unwrap(), "wrong");
        assert_eq!(rig.audio.started().iter().filter(|s| *s == "wrong").count(), 1);
        assert!(rig.phone.queued_sounds().is_empty());
        assert_eq!(rig.history_labels(), ["99"]);
        assert_eq!(rig.display.updates(), ["99", ""]);
    }

    #[test]
    fn number_resolves_exactly_once() {
        let rig = rig();
        rig.hook.set_off_hook(true);
        dial(&rig.phone.keys(), "12");
        rig.phone.tick();
        assert!(rig.phone.tick_at(Instant::now() + Duration::from_secs(1)).is_some());
        assert!(rig.history_labels().is_empty());
        for secs in 4..10 {
            rig.phone.tick_at(Instant::now() + Duration::from_secs(secs));
        }
        assert_eq!(rig.history_labels(), ["12"]);
    }

    #[test]
    fn keys_are_ignored_during_call() {
        let rig = rig();
        rig.hook.set_off_hook(true);
        dial(&rig.phone.keys(), "110");
        rig.phone.tick();
        rig.phone.tick_at(Instant::now() + LATER);
        let started = rig.audio.started().len();

        dial(&rig.phone.keys(), "5");
        rig.phone.tick();
        assert!(rig.phone.digits().is_empty());
        assert_eq!(rig.audio.started().len(), started);
        assert_eq!(rig.phone.queued_sounds().len(), 2);
    }

    #[test]
    fn hanging_up_resets_every_state() {
        for stage in 0..3 {
            let rig = rig();
            rig.hook.set_off_hook(true);
            match stage {
                // Dial tone only
                0 => { rig.phone.tick(); },
                // Mid-dial
                1 => {
                    dial(&rig.phone.keys(), "11");
                    rig.phone.tick();
                },
                // Active call
                _ => {
                    dial(&rig.phone.keys(), "110");
                    rig.phone.tick();
                    rig.phone.tick_at(Instant::now() + LATER);
                },
            }
            dial(&rig.phone.keys(), "7");
            rig.hook.set_off_hook(false);

            assert_eq!(rig.phone.tick(), Some(LineState::Idle));
            assert!(rig.phone.digits().is_empty());
            assert!(!rig.phone.is_call_active());
            assert!(rig.phone.queued_sounds().is_empty());
            assert!(rig.phone.keys().drain().is_empty());
            assert_eq!(rig.audio.playing_count(), 0);
        }
    }

    #[test]
    fn missing_contact_sound_degrades_to_wrong_number() {
        let rig = rig();
        rig.hook.set_off_hook(true);
        dial(&rig.phone.keys(), "555");
        rig.phone.tick();
        assert_eq!(rig.phone.tick_at(Instant::now() + LATER), Some(LineState::Dialing));
        assert!(!rig.phone.is_call_active());
        assert_eq!(rig.audio.started().last().unwrap(), "wrong");
        assert_eq!(rig.history_labels(), ["555"]);
    }

    #[test]
    fn language_selects_asset_directory() {
        let rig = rig();
        assert_eq!(rig.phone.set_language("en"), Ok(Language::English));
        assert!(rig.phone.set_language("xx").is_err());
        assert_eq!(rig.phone.language(), Language::English);

        rig.hook.set_off_hook(true);
        dial(&rig.phone.keys(), "110");
        rig.phone.tick();
        rig.phone.tick_at(Instant::now() + LATER);
        assert_eq!(rig.phone.queued_sounds(), ["eng/police", "beep"]);
    }

    #[test]
    fn failed_hook_read_is_retried() {
        let rig = rig();
        rig.hook.set_off_hook(true);
        dial(&rig.phone.keys(), "1");
        rig.hook.set_failing(true);
        assert_eq!(rig.phone.tick(), None);
        assert_eq!(rig.phone.tick(), None);
        assert!(rig.phone.digits().is_empty());

        rig.hook.set_failing(false);
        assert_eq!(rig.phone.tick(), Some(LineState::Dialing));
        assert_eq!(rig.phone.digits(), "1");
    }

    #[test]
    fn polling_loop_stops_when_told() {
        let rig = rig();
        let running = AtomicBool::new(true);
        let dialed = std::thread::scope(|s| {
            s.spawn(|| rig.phone.run(&running));
            rig.hook.set_off_hook(true);
            let dialed = wait_until(|| rig.audio.started().iter().any(|s| s == "dial"));
            running.store(false, Ordering::Release);
            dialed
        });
        assert!(dialed);
        assert_eq!(rig.audio.playing_count(), 0);
    }
}
