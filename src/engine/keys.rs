use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Instant;
use log::trace;
use crate::lock;
use crate::phone::KeyInput;

/// Turns raw press/release signals into an ordered queue of dialed characters.
///
/// Keys are debounced against auto-repeat: a character is queued when it is pressed
/// and cannot be queued again until it has been released.
pub struct KeyCapture {
    state: Mutex<KeyState>,
}

struct KeyState {
    /// Characters currently held down.
    held: HashSet<char>,
    /// Captured characters the polling loop hasn't consumed yet.
    pending: VecDeque<char>,
    /// Time of the last accepted press.
    last_key_time: Instant,
}

impl KeyCapture {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(KeyState {
                held: Default::default(),
                pending: Default::default(),
                last_key_time: Instant::now(),
            }),
        }
    }

    pub fn press(&self, key: KeyInput) {
        if let KeyInput::Char(c) = key {
            let mut state = lock(&self.state);
            if !state.held.insert(c) {
                return
            }
            state.pending.push_back(c);
            state.last_key_time = Instant::now();
            trace!("Key pressed: '{}'", c);
        }
    }

    pub fn release(&self, key: KeyInput) {
        if let KeyInput::Char(c) = key {
            if lock(&self.state).held.remove(&c) {
                trace!("Key released: '{}'", c);
            }
        }
    }

    /// Takes every pending character, oldest first.
    pub fn drain(&self) -> Vec<char> {
        lock(&self.state).pending.drain(..).collect()
    }

    /// Drops pending characters. Held keys stay held until released.
    pub fn clear_pending(&self) {
        lock(&self.state).pending.clear();
    }

    pub fn last_key_time(&self) -> Instant {
        lock(&self.state).last_key_time
    }

    pub fn is_held(&self, c: char) -> bool {
        lock(&self.state).held.contains(&c)
    }
}

impl Default for KeyCapture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use KeyInput::*;

    #[test]
    fn held_key_is_queued_once() {
        let keys = KeyCapture::new();
        keys.press(Char('5'));
        keys.press(Char('5'));
        keys.press(Char('5'));
        assert_eq!(keys.drain(), ['5']);
        assert!(keys.is_held('5'));
    }

    #[test]
    fn release_allows_pressing_again() {
        let keys = KeyCapture::new();
        keys.press(Char('1'));
        keys.release(Char('1'));
        keys.press(Char('1'));
        keys.press(Char('2'));
        assert_eq!(keys.drain(), ['1', '1', '2']);
        assert!(keys.drain().is_empty());
    }

    #[test]
    fn release_without_press_is_ignored() {
        let keys = KeyCapture::new();
        keys.release(Char('9'));
        assert!(!keys.is_held('9'));
        keys.press(Char('9'));
        assert_eq!(keys.drain(), ['9']);
    }

    #[test]
    fn special_keys_are_ignored() {
        let keys = KeyCapture::new();
        let before = keys.last_key_time();
        keys.press(Special);
        keys.release(Special);
        assert!(keys.drain().is_empty());
        assert_eq!(keys.last_key_time(), before);
    }

    #[test]
    fn accepted_press_updates_key_time() {
        let keys = KeyCapture::new();
        let before = keys.last_key_time();
        std::thread::sleep(std::time::Duration::from_millis(2));
        keys.press(Char('3'));
        assert!(keys.last_key_time() > before);
    }

    #[test]
    fn held_set_tracks_unmatched_presses() {
        // Interleaved presses and releases in an arbitrary order
        let keys = KeyCapture::new();
        let script = [
            (true, '1'), (true, '2'), (true, '1'), (false, '1'), (false, '3'),
            (true, '3'), (false, '2'), (true, '2'), (true, '2'), (false, '3'),
        ];
        let mut expected_held = HashSet::new();
        let mut expected_queue = Vec::new();
        for (pressed, c) in script {
            if pressed {
                keys.press(Char(c));
                if expected_held.insert(c) {
                    expected_queue.push(c);
                }
            } else {
                keys.release(Char(c));
                expected_held.remove(&c);
            }
            for probe in ['1', '2', '3'] {
                assert_eq!(keys.is_held(probe), expected_held.contains(&probe));
            }
        }
        assert_eq!(keys.drain(), expected_queue);
        assert_eq!(expected_queue, ['1', '2', '3', '2']);
    }

    #[test]
    fn clear_keeps_held_keys() {
        let keys = KeyCapture::new();
        keys.press(Char('7'));
        keys.clear_pending();
        assert!(keys.drain().is_empty());
        keys.press(Char('7'));
        assert!(keys.drain().is_empty());
    }

    #[test]
    fn concurrent_presses_are_all_captured() {
        let keys = std::sync::Arc::new(KeyCapture::new());
        let handles: Vec<_> = ['1', '2', '3', '4'].into_iter().map(|c| {
            let keys = std::sync::Arc::clone(&keys);
            std::thread::spawn(move || {
                for _ in 0..50 {
                    keys.press(Char(c));
                    keys.release(Char(c));
                }
            })
        }).collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let mut captured = keys.drain();
        assert_eq!(captured.len(), 200);
        captured.sort();
        captured.dedup();
        assert_eq!(captured, ['1', '2', '3', '4']);
    }
}
