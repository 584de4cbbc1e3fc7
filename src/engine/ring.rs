use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use indexmap::IndexMap;
use log::{error, info, warn};
use crate::config::{asset_name, IncomingCallerConfig};
use crate::error::RingError;
use crate::lock;
use crate::sound::{PlaybackEnd, FULL_VOLUME};
use super::Phone;

/// A caller that can ring the phone.
#[derive(Clone, Debug, PartialEq)]
pub struct IncomingCaller {
    /// Per-language message asset.
    pub sound: String,
    pub volume: f32,
}

/// Callers that can ring the phone, keyed by caller ID.
#[derive(Clone, Debug, Default)]
pub struct CallerDirectory {
    callers: IndexMap<String, IncomingCaller>,
}

impl CallerDirectory {
    pub fn new<'a>(callers: impl IntoIterator<Item = (&'a String, &'a IncomingCallerConfig)>) -> Self {
        Self {
            callers: callers
                .into_iter()
                .map(|(id, caller)| (id.clone(), IncomingCaller {
                    sound: asset_name(&caller.sound).to_owned(),
                    volume: caller.volume,
                }))
                .collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&IncomingCaller> {
        self.callers.get(id)
    }

    pub fn sounds(&self) -> impl Iterator<Item = &str> {
        self.callers.values().map(|c| c.sound.as_str())
    }

    pub fn len(&self) -> usize {
        self.callers.len()
    }
}

/// How a ring ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RingOutcome {
    /// The handset was lifted. `hung_up` is set if it went back down during the message;
    /// the terminator plays either way.
    Answered { hung_up: bool },
    /// Nobody picked up before the ring timed out.
    Unanswered,
}

/// A ring running in the background.
pub struct RingHandle {
    caller: String,
    thread: JoinHandle<RingOutcome>,
}

impl RingHandle {
    pub fn caller(&self) -> &str {
        &self.caller
    }

    /// Waits for the ring to end. Returns `None` if the ring thread panicked.
    pub fn join(self) -> Option<RingOutcome> {
        match self.thread.join() {
            Ok(outcome) => Some(outcome),
            Err(_) => {
                error!("Ring thread for '{}' panicked", self.caller);
                None
            }
        }
    }
}

impl Phone {
    /// Starts ringing for `caller_id` in the background.
    ///
    /// Only one ring may run at a time; a second request is rejected
    /// without disturbing the first.
    pub fn trigger_external_ring(self: &Arc<Self>, caller_id: &str) -> Result<RingHandle, RingError> {
        let caller = self.callers
            .get(caller_id)
            .cloned()
            .ok_or_else(|| RingError::UnknownCaller(caller_id.to_owned()))?;

        if self.ring_active.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            warn!("Ring from '{}' rejected: already ringing", caller_id);
            return Err(RingError::ConcurrentRingConflict)
        }

        let phone = Arc::clone(self);
        let id = caller_id.to_owned();
        let spawned = thread::Builder::new()
            .name(format!("ring:{}", caller_id))
            .spawn(move || phone.ring(&id, &caller));

        match spawned {
            Ok(thread) => Ok(RingHandle { caller: caller_id.to_owned(), thread }),
            Err(err) => {
                self.ring_active.store(false, Ordering::Release);
                Err(RingError::Spawn(err.to_string()))
            }
        }
    }

    /// Runs an incoming ring from start to finish on the calling thread.
    fn ring(&self, caller_id: &str, caller: &IncomingCaller) -> RingOutcome {
        // Let an in-flight tick finish; later ticks see the ring flag and stand aside
        drop(lock(&self.tick_lock));

        info!("Incoming ring from '{}'", caller_id);
        self.reset_line();

        let stop_ringer = AtomicBool::new(false);
        let answered = thread::scope(|s| {
            s.spawn(|| self.ring_tone_loop(&stop_ringer));
            let answered = self.wait_for_pickup();
            stop_ringer.store(true, Ordering::Release);
            answered
        });

        let outcome = if answered {
            info!("Picked up ring from '{}'", caller_id);
            spin_sleep::sleep(self.pickup_grace);
            let hung_up = self.play_caller_message(caller);
            self.play_or_warn(&self.tones.terminator, true, FULL_VOLUME);
            RingOutcome::Answered { hung_up }
        } else {
            info!("Ring from '{}' went unanswered", caller_id);
            RingOutcome::Unanswered
        };

        self.history.record("ringing");
        self.history.record("end of message");
        self.reset_line();
        self.ring_active.store(false, Ordering::Release);
        outcome
    }

    /// Repeats the ring tone until told to stop.
    fn ring_tone_loop(&self, stop: &AtomicBool) {
        let mut available = true;
        while !stop.load(Ordering::Acquire) {
            if available && !self.playback.is_playing() {
                if let Err(err) = self.playback.play(&self.tones.ring_tone, false, self.tones.ring_volume) {
                    warn!("{}; ringing silently", err);
                    available = false;
                }
            }
            spin_sleep::sleep(self.tick_interval);
        }
        self.playback.stop();
    }

    /// Polls the hook until the handset is lifted. Returns `false` if the ring timed out.
    fn wait_for_pickup(&self) -> bool {
        let started = Instant::now();
        loop {
            if self.read_hook() == Some(true) {
                return true
            }
            if let Some(timeout) = self.ring_timeout {
                if started.elapsed() >= timeout {
                    return false
                }
            }
            spin_sleep::sleep(self.tick_interval);
        }
    }

    /// Plays the caller's message in the current language.
    /// Returns `true` if the handset was hung up before it finished.
    fn play_caller_message(&self, caller: &IncomingCaller) -> bool {
        let message = self.language().asset_key(&caller.sound);
        match self.playback.play_until(&message, caller.volume, || self.read_hook() == Some(false)) {
            Ok(PlaybackEnd::Finished) => false,
            Ok(PlaybackEnd::Interrupted) => {
                info!("Hung up during message '{}'", message);
                true
            },
            Err(err) => {
                warn!("{}; skipping message", err);
                false
            }
        }
    }
}
