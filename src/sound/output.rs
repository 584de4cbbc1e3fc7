use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use log::trace;
use rodio::{OutputStreamHandle, Sink};
use rodio::buffer::SamplesBuffer;
use crate::error::PlaybackError;
use crate::lock;

/// Identifies one playback started on an `AudioOutput`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PlaybackToken(u64);

impl PlaybackToken {
    pub fn id(self) -> u64 {
        self.0
    }
}

/// Generates unique playback tokens for an output device.
#[derive(Default)]
pub struct TokenSource(AtomicU64);

impl TokenSource {
    pub fn next(&self) -> PlaybackToken {
        PlaybackToken(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

/// Interleaved 16-bit PCM ready to hand to an output device.
#[derive(Clone, Debug)]
pub struct PcmBuffer {
    /// Library key of the sound the buffer was rendered from.
    pub source: String,
    pub channels: u16,
    pub sample_rate: u32,
    pub samples: Vec<i16>,
}

/// A device that can play PCM buffers and be stopped at any time.
pub trait AudioOutput: Send + Sync {
    /// Starts playing the buffer and returns immediately.
    fn start(&self, buffer: PcmBuffer) -> Result<PlaybackToken, PlaybackError>;

    /// Indicates whether the playback identified by `token` has ended, either naturally or by being stopped.
    fn is_finished(&self, token: PlaybackToken) -> bool;

    /// Halts every playback in progress.
    fn stop_all(&self);
}

/// `AudioOutput` backed by rodio. Each playback gets its own sink.
pub struct RodioOutput {
    handle: OutputStreamHandle,
    sinks: Mutex<Vec<(PlaybackToken, Sink)>>,
    tokens: TokenSource,
}

impl RodioOutput {
    /// The `rodio::OutputStream` the handle came from must outlive this output.
    pub fn new(handle: OutputStreamHandle) -> Self {
        Self {
            handle,
            sinks: Default::default(),
            tokens: Default::default(),
        }
    }
}

impl AudioOutput for RodioOutput {
    fn start(&self, buffer: PcmBuffer) -> Result<PlaybackToken, PlaybackError> {
        let sink = Sink::try_new(&self.handle).map_err(|err| PlaybackError::Device(err.to_string()))?;
        let token = self.tokens.next();
        trace!("Starting '{}' as playback #{}", buffer.source, token.id());
        sink.append(SamplesBuffer::new(buffer.channels, buffer.sample_rate, buffer.samples));

        let mut sinks = lock(&self.sinks);
        sinks.retain(|(_, sink)| !sink.empty());
        sinks.push((token, sink));
        Ok(token)
    }

    fn is_finished(&self, token: PlaybackToken) -> bool {
        lock(&self.sinks)
            .iter()
            .find(|(t, _)| *t == token)
            .map_or(true, |(_, sink)| sink.empty())
    }

    fn stop_all(&self) {
        for (_, sink) in lock(&self.sinks).drain(..) {
            sink.stop();
        }
    }
}
