use std::io::{self, BufRead};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use log::{info, warn};
use crate::engine::{KeyCapture, Phone};
use crate::error::HardwareError;
use crate::phone::{KeyInput, KeySource, VirtualSwitchhook};

/// A parsed console line.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Command<'a> {
    /// Each character is pressed and released in order.
    Keys(&'a str),
    ToggleHook,
    Ring(&'a str),
    Language(&'a str),
    History,
    Status,
    Quit,
}

impl<'a> Command<'a> {
    fn parse(line: &'a str) -> Option<Self> {
        let line = line.trim();
        let (word, arg) = match line.split_once(char::is_whitespace) {
            Some((word, arg)) => (word, arg.trim()),
            None => (line, ""),
        };
        Some(match word {
            "" => return None,
            "h" | "hook" => Command::ToggleHook,
            "ring" => Command::Ring(arg),
            "lang" => Command::Language(arg),
            "history" => Command::History,
            "status" => Command::Status,
            "quit" | "exit" => Command::Quit,
            _ => Command::Keys(line),
        })
    }
}

/// Drives the phone from stdin on hosts without the real hardware.
pub struct DevConsole {
    phone: Arc<Phone>,
    /// Present when the phone's hook is the virtual one.
    hook: Option<Arc<VirtualSwitchhook>>,
    running: Arc<AtomicBool>,
}

impl DevConsole {
    pub fn new(phone: Arc<Phone>, hook: Option<Arc<VirtualSwitchhook>>, running: Arc<AtomicBool>) -> Self {
        Self { phone, hook, running }
    }

    fn execute(&self, command: Command, capture: &KeyCapture) {
        match command {
            Command::Keys(keys) => {
                for c in keys.chars().filter(|c| !c.is_whitespace()) {
                    capture.press(KeyInput::Char(c));
                    capture.release(KeyInput::Char(c));
                }
            },
            Command::ToggleHook => match &self.hook {
                Some(hook) => {
                    let off_hook = hook.toggle();
                    info!("Handset {}", if off_hook { "lifted" } else { "replaced" });
                },
                None => warn!("The switchhook is wired to GPIO; lift the handset instead."),
            },
            Command::Ring(caller) => match self.phone.trigger_external_ring(caller) {
                Ok(ring) => info!("Ringing for '{}'", ring.caller()),
                Err(err) => warn!("{}", err),
            },
            Command::Language(code) => {
                if let Err(err) = self.phone.set_language(code) {
                    warn!("{}", err);
                }
            },
            Command::History => {
                let history = self.phone.history();
                if history.is_empty() {
                    info!("History is empty.");
                }
                for entry in history {
                    info!("  {}", entry);
                }
            },
            Command::Status => {
                let phone = &self.phone;
                info!("Language: {:?}", phone.language());
                if phone.is_ringing() {
                    info!("Line: ringing");
                } else if phone.is_call_active() {
                    info!("Line: in call, queued {:?}", phone.queued_sounds());
                } else {
                    info!("Line: dialed '{}'", phone.digits());
                }
            },
            Command::Quit => self.running.store(false, Ordering::Release),
        }
    }
}

impl KeySource for DevConsole {
    fn listen(&mut self, capture: Arc<KeyCapture>) -> Result<(), HardwareError> {
        info!("Console ready: digits dial, 'h' toggles the hook, 'ring <caller>', 'lang <code>', 'history', 'status', 'quit'.");
        for line in io::stdin().lock().lines() {
            let line = line.map_err(|err| HardwareError::Read(err.to_string()))?;
            if let Some(command) = Command::parse(&line) {
                let quit = command == Command::Quit;
                self.execute(command, &capture);
                if quit {
                    break
                }
            }
            if !self.running.load(Ordering::Acquire) {
                break
            }
        }
        Ok(())
    }
}
