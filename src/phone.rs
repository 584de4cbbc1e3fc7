use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use crate::engine::KeyCapture;
use crate::error::HardwareError;

/// Digital input reporting the position of the handset.
pub trait HookSensor: Send + Sync {
    /// Reads whether the handset is lifted.
    fn is_off_hook(&self) -> Result<bool, HardwareError>;
}

/// A raw key signal from a keypad.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum KeyInput {
    /// A key that produces a character.
    Char(char),
    /// A key with no character (modifiers, function keys, ...).
    Special,
}

/// Source of key press/release signals. Signals are delivered to the capture
/// from the source's own thread, at arbitrary times relative to the polling loop.
pub trait KeySource {
    fn listen(&mut self, capture: Arc<KeyCapture>) -> Result<(), HardwareError>;
}

/// Hook sensor driven in software, for hosts without a switchhook.
#[derive(Default)]
pub struct VirtualSwitchhook {
    off_hook: AtomicBool,
}

impl VirtualSwitchhook {
    pub fn set_off_hook(&self, off_hook: bool) {
        self.off_hook.store(off_hook, Ordering::Release);
    }

    /// Flips the handset position and returns `true` if it is now off-hook.
    pub fn toggle(&self) -> bool {
        !self.off_hook.fetch_xor(true, Ordering::AcqRel)
    }
}

impl HookSensor for VirtualSwitchhook {
    fn is_off_hook(&self) -> Result<bool, HardwareError> {
        Ok(self.off_hook.load(Ordering::Acquire))
    }
}
