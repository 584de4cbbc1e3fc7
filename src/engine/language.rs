use enum_iterator::{all, Sequence};
use crate::error::LanguageError;

/// Locale used to select the per-language sound asset directory.
#[derive(Sequence, Copy, Clone, Debug, PartialEq, Eq)]
pub enum Language {
    German,
    English,
}

impl Language {
    /// Two-letter code accepted by `Phone::set_language()`.
    pub fn code(self) -> &'static str {
        match self {
            Language::German => "de",
            Language::English => "en",
        }
    }

    /// Asset subdirectory holding sounds for this language.
    pub fn dir(self) -> &'static str {
        match self {
            Language::German => "deu",
            Language::English => "eng",
        }
    }

    pub fn from_code(code: &str) -> Result<Self, LanguageError> {
        let code = code.trim().to_ascii_lowercase();
        all::<Language>()
            .find(|lang| lang.code() == code)
            .ok_or(LanguageError::Unsupported(code))
    }

    /// Builds the library key of a per-language asset.
    pub fn asset_key(self, name: &str) -> String {
        format!("{}/{}", self.dir(), name)
    }

    pub(crate) fn as_index(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_index(index: u8) -> Self {
        all::<Language>().nth(index as usize).unwrap_or(Language::German)
    }
}

impl Default for Language {
    fn default() -> Self {
        Language::German
    }
}
