use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use log::debug;
use crate::error::PlaybackError;
use crate::lock;
use super::{AudioOutput, PlaybackToken, SoundLibrary};

/// How a waited-on playback ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PlaybackEnd {
    /// The sound played to its end.
    Finished,
    /// The interrupt condition fired and the sound was stopped.
    Interrupted,
}

/// Owns the sound queue of an active call and the handle of the sound currently playing.
pub struct Playback {
    library: Arc<SoundLibrary>,
    output: Arc<dyn AudioOutput>,
    /// The playback started most recently, if any.
    current: Mutex<Option<PlaybackToken>>,
    /// Library keys waiting to be played in order.
    queue: Mutex<VecDeque<String>>,
    /// How often blocking playback checks for completion.
    poll_interval: Duration,
}

impl Playback {
    pub fn new(library: Arc<SoundLibrary>, output: Arc<dyn AudioOutput>, poll_interval: Duration) -> Self {
        Self {
            library,
            output,
            current: Default::default(),
            queue: Default::default(),
            poll_interval,
        }
    }

    pub fn library(&self) -> &SoundLibrary {
        &self.library
    }

    /// Starts playing a sound. With `wait` set, returns only once the sound has finished.
    pub fn play(&self, key: &str, wait: bool, volume: f32) -> Result<PlaybackToken, PlaybackError> {
        let token = self.start(key, volume)?;
        if wait {
            self.wait_for(token, || false);
        }
        Ok(token)
    }

    /// Plays a sound to completion, stopping it early as soon as `interrupt` returns `true`.
    pub fn play_until<F>(&self, key: &str, volume: f32, interrupt: F) -> Result<PlaybackEnd, PlaybackError>
    where F: FnMut() -> bool {
        let token = self.start(key, volume)?;
        Ok(self.wait_for(token, interrupt))
    }

    fn start(&self, key: &str, volume: f32) -> Result<PlaybackToken, PlaybackError> {
        let (found_key, sound) = self.library
            .find(key)
            .ok_or_else(|| PlaybackError::ResourceNotFound(key.to_owned()))?;
        debug!("Playing '{}' (volume {})", found_key, volume);
        let token = self.output.start(sound.render(found_key, volume))?;
        lock(&self.current).replace(token);
        Ok(token)
    }

    fn wait_for<F>(&self, token: PlaybackToken, mut interrupt: F) -> PlaybackEnd
    where F: FnMut() -> bool {
        while !self.output.is_finished(token) {
            if interrupt() {
                self.stop();
                return PlaybackEnd::Interrupted
            }
            spin_sleep::sleep(self.poll_interval);
        }
        PlaybackEnd::Finished
    }

    /// Indicates whether the most recently started sound is still playing.
    pub fn is_playing(&self) -> bool {
        let current = *lock(&self.current);
        current.map_or(false, |token| !self.output.is_finished(token))
    }

    /// Halts whatever is playing. The queue is left alone.
    pub fn stop(&self) {
        self.output.stop_all();
        lock(&self.current).take();
    }

    /// Halts whatever is playing and drops every queued sound.
    pub fn stop_all_and_clear_queue(&self) {
        lock(&self.queue).clear();
        self.stop();
    }

    pub fn enqueue(&self, key: impl Into<String>) {
        lock(&self.queue).push_back(key.into());
    }

    /// Starts the next queued sound without waiting for it.
    /// Returns `None` if the queue is empty.
    pub fn play_next_queued(&self) -> Option<Result<PlaybackToken, PlaybackError>> {
        let key = lock(&self.queue).pop_front()?;
        Some(self.play(&key, false, super::FULL_VOLUME))
    }

    pub fn queued(&self) -> Vec<String> {
        lock(&self.queue).iter().cloned().collect()
    }
}
