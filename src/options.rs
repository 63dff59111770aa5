//! Reader configuration.

use crate::crypto::KeyStore;
use crate::image::{ImageDecoder, PngDecoder};

use std::sync::Arc;

/// Options shared by all readers.
#[derive(Debug, Clone)]
pub struct Options {
    /// Preferred language as a two-letter code (`"en"`, `"ja"`, ...).
    ///
    /// `None` selects the file's default language, usually English.
    pub language: Option<String>,
    /// Keys for encrypted sections.
    pub keys: Arc<KeyStore>,
    /// Decoder used for embedded PNG images.
    pub png: Arc<dyn ImageDecoder>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            language: None,
            keys: Arc::new(KeyStore::new()),
            png: Arc::new(PngDecoder),
        }
    }
}

impl Options {
    pub fn with_language<S: Into<String>>(mut self, language: S) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_keys(mut self, keys: KeyStore) -> Self {
        self.keys = Arc::new(keys);
        self
    }

    /// The preferred language, lower-cased, if set.
    pub fn language(&self) -> Option<String> {
        self.language.as_ref().map(|l| l.to_ascii_lowercase())
    }
}
