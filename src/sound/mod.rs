mod output;
mod pcm;
mod playback;

pub use self::output::*;
pub use self::pcm::*;
pub use self::playback::*;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use indexmap::IndexMap;
use log::{info, warn};
use rand::Rng;
use crate::error::SoundError;
use crate::lock;

/// Volume at which sounds play unmodified.
pub const FULL_VOLUME: f32 = 1.0;

/// A decoded sound asset.
#[derive(Clone, Debug)]
pub struct Sound {
    pub channels: u16,
    pub sample_rate: u32,
    pub samples: PcmSamples,
}

impl Sound {
    pub fn from_file(path: &Path) -> Result<Self, SoundError> {
        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        let samples = match (spec.sample_format, spec.bits_per_sample) {
            // hound hands out 8-bit WAV data already shifted to signed
            (hound::SampleFormat::Int, 8) => PcmSamples::U8(
                reader.samples::<i8>()
                    .map(|s| s.map(|s| (s as i16 + 128) as u8))
                    .collect::<Result<_, _>>()?
            ),
            (hound::SampleFormat::Int, 16) => PcmSamples::I16(reader.samples::<i16>().collect::<Result<_, _>>()?),
            (hound::SampleFormat::Int, 24) => PcmSamples::I32(
                reader.samples::<i32>()
                    .map(|s| s.map(|s| s << 8))
                    .collect::<Result<_, _>>()?
            ),
            (hound::SampleFormat::Int, 32) => PcmSamples::I32(reader.samples::<i32>().collect::<Result<_, _>>()?),
            (hound::SampleFormat::Float, 32) => PcmSamples::F32(reader.samples::<f32>().collect::<Result<_, _>>()?),
            (format, bits) => return Err(SoundError::UnsupportedFormat { bits, format }),
        };

        Ok(Self {
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            samples,
        })
    }

    /// Renders the sound as 16-bit PCM at the given volume.
    pub fn render(&self, source: &str, volume: f32) -> PcmBuffer {
        PcmBuffer {
            source: source.to_owned(),
            channels: self.channels,
            sample_rate: self.sample_rate,
            samples: self.samples.scaled(volume),
        }
    }
}

/// In-memory collection of the sound assets found under a root directory,
/// keyed by relative path without extension (e.g. `"deu/police"`).
pub struct SoundLibrary {
    root_path: PathBuf,
    sounds: IndexMap<String, Sound>,
    sound_glob_cache: Mutex<HashMap<String, Vec<usize>>>,
}

impl SoundLibrary {
    pub fn new(root_path: impl Into<PathBuf>) -> Self {
        Self {
            root_path: root_path.into(),
            sounds: IndexMap::new(),
            sound_glob_cache: Default::default(),
        }
    }

    /// Loads every WAV file under `root_path`. Files that fail to decode are skipped.
    pub fn load(root_path: impl Into<PathBuf>) -> Result<Self, SoundError> {
        let mut library = Self::new(root_path);
        library.load_sounds()?;
        Ok(library)
    }

    fn load_sounds(&mut self) -> Result<(), SoundError> {
        info!("Loading sound assets from {}...", self.root_path.display());
        match self.root_path.canonicalize() {
            Ok(root) => self.root_path = root,
            Err(err) => warn!("Unable to expand sound root {}: {}", self.root_path.display(), err),
        }
        self.sounds.clear();
        lock(&self.sound_glob_cache).clear();
        let root_pattern = glob::Pattern::escape(&self.root_path.to_string_lossy());
        let search_path = Path::new(&root_pattern).join("**").join("*.wav");
        for entry in glob::glob(&search_path.to_string_lossy())? {
            let path = match entry {
                Ok(path) => path,
                Err(err) => {
                    warn!("Unable to read sound path: {}", err);
                    continue
                }
            };
            let path = path.canonicalize().unwrap_or(path);
            let sound_key = match path.strip_prefix(&self.root_path) {
                Ok(rel) => rel.with_extension("").to_string_lossy().replace('\\', "/"),
                Err(_) => continue,
            };
            match Sound::from_file(&path) {
                Ok(sound) => {
                    self.sounds.insert(sound_key, sound);
                },
                Err(err) => warn!("Skipping sound '{}': {}", path.display(), err),
            }
        }
        info!("Total sounds loaded: {}", self.sounds.len());
        Ok(())
    }

    pub fn insert(&mut self, key: impl Into<String>, sound: Sound) {
        self.sounds.insert(key.into(), sound);
        lock(&self.sound_glob_cache).clear();
    }

    pub fn len(&self) -> usize {
        self.sounds.len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.find(key).is_some()
    }

    /// Escapes glob metacharacters so `key` only ever matches itself (key tones like `*` and `#`).
    pub fn literal(key: &str) -> String {
        let mut escaped = String::with_capacity(key.len());
        for c in key.chars() {
            match c {
                '*' | '?' | '[' | '{' | '}' => {
                    escaped.push('[');
                    escaped.push(c);
                    escaped.push(']');
                },
                _ => escaped.push(c),
            }
        }
        escaped
    }

    /// Looks up a sound by exact key, or picks a random sound matching `key` as a glob.
    pub fn find(&self, key: &str) -> Option<(&str, &Sound)> {
        if let Some((k, sound)) = self.sounds.get_key_value(key) {
            return Some((k.as_str(), sound))
        }

        let mut glob_cache = lock(&self.sound_glob_cache);
        if !glob_cache.contains_key(key) {
            let glob = match globset::GlobBuilder::new(key).literal_separator(true).build() {
                Ok(glob) => glob,
                Err(_) => return None,
            };
            let matcher = glob.compile_matcher();
            let glob_list: Vec<usize> = self.sounds.keys()
                .enumerate()
                .filter(|(_, k)| matcher.is_match(k.as_str()))
                .map(|(i, _)| i)
                .collect();
            if glob_list.is_empty() {
                return None
            }
            glob_cache.insert(key.to_owned(), glob_list);
        }

        let glob_list = glob_cache.get(key)?;
        let index = glob_list[rand::thread_rng().gen_range(0..glob_list.len())];
        self.sounds.get_index(index).map(|(k, sound)| (k.as_str(), sound))
    }
}
