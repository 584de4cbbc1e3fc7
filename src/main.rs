mod config;
mod console;
mod engine;
mod error;
#[cfg(feature = "rpi")]
mod gpio;
mod phone;
mod sound;
#[cfg(test)]
mod testing;

use std::env;
use std::error::Error;
use std::process;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use log::{error, info, warn, LevelFilter};
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};
use crate::config::*;
use crate::console::DevConsole;
use crate::engine::{LogNotifier, Phone};
use crate::phone::*;
use crate::sound::{RodioOutput, SoundLibrary};

const CONFIG_PATH: &str = "./res/telephone.toml";
const CONFIG_PATH_VAR: &str = "TELEPHONE_CONFIG";

/// Locks a mutex, taking the data as-is if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn main() {
    let config_path = env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| CONFIG_PATH.to_owned());
    let config = load_config(&config_path);
    init_logging(config.as_ref().ok().and_then(|config| config.log_level.as_deref()));

    let config = match config {
        Ok(config) => config,
        Err(err) => {
            error!("{}: {}", config_path, err);
            process::exit(1);
        }
    };
    info!("Config loaded from {}", config_path);

    if let Err(err) = run(config) {
        error!("{}", err);
        process::exit(1);
    }
}

fn init_logging(level: Option<&str>) {
    let level = match level.map(LevelFilter::from_str) {
        Some(Ok(level)) => level,
        Some(Err(_)) | None => LevelFilter::Info,
    };
    let log_config = ConfigBuilder::new()
        .set_thread_level(LevelFilter::Debug)
        .build();
    if let Err(err) = TermLogger::init(level, log_config, TerminalMode::Mixed, ColorChoice::Auto) {
        eprintln!("Unable to initialize logger: {}", err);
    }
}

fn run(config: PhoneConfig) -> Result<(), Box<dyn Error>> {
    let library = Arc::new(SoundLibrary::load(&config.sound.root)?);
    let (_stream, stream_handle) = rodio::OutputStream::try_default()?;
    let output = Arc::new(RodioOutput::new(stream_handle));

    #[cfg(feature = "rpi")]
    let gpio = match &config.gpio {
        Some(gpio_config) => Some((gpio::open_gpio()?, gpio_config)),
        None => {
            warn!("No [gpio] section; using the console switchhook.");
            None
        }
    };
    #[cfg(feature = "rpi")]
    let gpio_hook = match &gpio {
        Some((gpio, gpio_config)) => Some(Arc::new(gpio::GpioHookSensor::new(gpio, &gpio_config.hook)?) as Arc<dyn HookSensor>),
        None => None,
    };
    #[cfg(not(feature = "rpi"))]
    let gpio_hook: Option<Arc<dyn HookSensor>> = {
        if config.gpio.is_some() {
            warn!("Ignoring [gpio]: built without the rpi feature.");
        }
        None
    };
    let (hook, console_hook) = match gpio_hook {
        Some(hook) => (hook, None),
        None => {
            let hook = Arc::new(VirtualSwitchhook::default());
            (Arc::clone(&hook) as Arc<dyn HookSensor>, Some(hook))
        }
    };

    let phone = Arc::new(Phone::new(&config, library, output, hook, Arc::new(LogNotifier))?);

    #[cfg(feature = "rpi")]
    let _keypad = match gpio.as_ref().and_then(|(gpio, gpio_config)| Some((gpio, gpio_config.keypad.as_ref()?))) {
        Some((gpio, keypad_config)) => {
            let mut keypad = gpio::GpioKeypad::new(gpio, keypad_config)?;
            keypad.listen(phone.keys())?;
            Some(keypad)
        },
        None => None,
    };

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || {
            info!("Shutting down...");
            running.store(false, Ordering::Release);
        })?;
    }

    let poll_thread = {
        let phone = Arc::clone(&phone);
        let running = Arc::clone(&running);
        thread::Builder::new()
            .name("poll".into())
            .spawn(move || phone.run(&running))?
    };

    {
        let mut console = DevConsole::new(Arc::clone(&phone), console_hook, Arc::clone(&running));
        let keys = phone.keys();
        thread::Builder::new()
            .name("console".into())
            .spawn(move || {
                if let Err(err) = console.listen(keys) {
                    warn!("Console stopped: {}", err);
                }
            })?;
    }

    if poll_thread.join().is_err() {
        return Err("polling thread panicked".into())
    }
    Ok(())
}
