//! Saved quotes and the cache-aside quote book in front of them.
//!
//! Reads go through the cache and fall back to the source. `confirm` writes
//! through to the source and the cache together; `reload` drops the cached
//! copy and re-reads it from the source.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::types::{Quote, QuoteId};

#[derive(Debug, thiserror::Error)]
pub enum QuoteError {
    #[error("failed to read quotes file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse quotes file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize quotes for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: toml::ser::Error,
    },
    #[error("failed to write quotes file at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("quote source unavailable: {message}")]
    Unavailable { message: String },
}

/// Where quotes are ultimately stored.
pub trait QuoteSource: Send + Sync {
    fn load(&self, id: &QuoteId) -> Result<Option<Quote>, QuoteError>;
    fn store(&self, quote: &Quote) -> Result<(), QuoteError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct QuotesFile {
    #[serde(default)]
    quotes: Vec<Quote>,
}

/// TOML file with a `[[quotes]]` array; re-read on every load.
#[derive(Debug, Clone)]
pub struct FileQuoteSource {
    path: PathBuf,
}

impl FileQuoteSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<QuotesFile, QuoteError> {
        let body = fs::read_to_string(&self.path).map_err(|source| QuoteError::Read {
            path: self.path.clone(),
            source,
        })?;
        toml::from_str(&body).map_err(|source| QuoteError::Parse {
            path: self.path.clone(),
            source,
        })
    }
}

impl QuoteSource for FileQuoteSource {
    fn load(&self, id: &QuoteId) -> Result<Option<Quote>, QuoteError> {
        let file = self.read_all()?;
        Ok(file.quotes.into_iter().find(|quote| &quote.id == id))
    }

    fn store(&self, quote: &Quote) -> Result<(), QuoteError> {
        let mut file = if self.path.exists() {
            self.read_all()?
        } else {
            QuotesFile::default()
        };
        match file.quotes.iter_mut().find(|existing| existing.id == quote.id) {
            Some(existing) => *existing = quote.clone(),
            None => file.quotes.push(quote.clone()),
        }

        let body = toml::to_string_pretty(&file).map_err(|source| QuoteError::Serialize {
            path: self.path.clone(),
            source,
        })?;
        fs::write(&self.path, body).map_err(|source| QuoteError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

#[derive(Debug, Default)]
pub struct MemoryQuoteSource {
    quotes: RwLock<HashMap<QuoteId, Quote>>,
}

impl MemoryQuoteSource {
    pub fn new(quotes: impl IntoIterator<Item = Quote>) -> Self {
        let quotes = quotes
            .into_iter()
            .map(|quote| (quote.id.clone(), quote))
            .collect();
        Self {
            quotes: RwLock::new(quotes),
        }
    }
}

impl QuoteSource for MemoryQuoteSource {
    fn load(&self, id: &QuoteId) -> Result<Option<Quote>, QuoteError> {
        Ok(self.quotes.read().get(id).cloned())
    }

    fn store(&self, quote: &Quote) -> Result<(), QuoteError> {
        self.quotes.write().insert(quote.id.clone(), quote.clone());
        Ok(())
    }
}

/// Cache-aside view over a [`QuoteSource`].
///
/// The planner and the wizard only read through it. `confirm` and `reload`
/// are library entry points for tools that edit quotes; neither binary
/// writes quotes back.
#[derive(Clone)]
pub struct QuoteBook {
    source: Arc<dyn QuoteSource>,
    cache: Arc<RwLock<HashMap<QuoteId, Quote>>>,
}

impl QuoteBook {
    pub fn new(source: Arc<dyn QuoteSource>) -> Self {
        Self {
            source,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn in_memory(quotes: impl IntoIterator<Item = Quote>) -> Self {
        Self::new(Arc::new(MemoryQuoteSource::new(quotes)))
    }

    pub fn get(&self, id: &QuoteId) -> Result<Option<Quote>, QuoteError> {
        if let Some(quote) = self.cache.read().get(id) {
            return Ok(Some(quote.clone()));
        }
        let loaded = self.source.load(id)?;
        if let Some(quote) = &loaded {
            debug!(quote_id = %id, "quote cache miss; populated from source");
            self.cache.write().insert(id.clone(), quote.clone());
        }
        Ok(loaded)
    }

    pub fn contains(&self, id: &QuoteId) -> Result<bool, QuoteError> {
        Ok(self.get(id)?.is_some())
    }

    /// Write-through: the source is updated first, the cache only on success.
    pub fn confirm(&self, quote: Quote) -> Result<(), QuoteError> {
        self.source.store(&quote)?;
        debug!(quote_id = %quote.id, "quote confirmed");
        self.cache.write().insert(quote.id.clone(), quote);
        Ok(())
    }

    pub fn reload(&self, id: &QuoteId) -> Result<Option<Quote>, QuoteError> {
        self.cache.write().remove(id);
        self.get(id)
    }

    pub fn cached_len(&self) -> usize {
        self.cache.read().len()
    }
}

impl std::fmt::Debug for QuoteBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuoteBook")
            .field("cached", &self.cached_len())
            .finish()
    }
}
