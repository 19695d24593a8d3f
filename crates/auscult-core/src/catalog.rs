//! Sound catalog: named, rate-ranged track entries
//!
//! The catalog is loaded once at startup from a line-oriented file. Each
//! line names a category, a device track number, a sound name, and an
//! inclusive rate range the track was recorded for:
//!
//! ```text
//! heart,112,normal,0,60
//! lung,183,coarse crackles,0,15
//! ```
//!
//! Tabs, semicolons and commas all separate fields; spaces inside a field
//! (free-text sound names) are folded to underscores before splitting, so
//! `coarse crackles` loads and matches as `coarse_crackles`. Malformed
//! lines are logged and skipped; the load carries on.

use std::fmt;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use thiserror::Error;

/// Errors that abort a catalog load outright.
///
/// Per-line problems are not errors: bad lines are logged and skipped.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// The catalog source could not be opened
    #[error("failed to open sound catalog {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },

    /// Reading from the catalog source failed mid-load
    #[error("failed to read sound catalog: {0}")]
    Read(#[from] std::io::Error),
}

/// Which body system a catalog entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundCategory {
    Heart,
    Lung,
    Pulse,
    General,
}

impl SoundCategory {
    /// Parse a catalog category field. Unknown names reject the line.
    fn from_field(s: &str) -> Option<Self> {
        match s {
            "heart" => Some(Self::Heart),
            "lung" => Some(Self::Lung),
            "pulse" => Some(Self::Pulse),
            "general" => Some(Self::General),
            _ => None,
        }
    }
}

impl fmt::Display for SoundCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Heart => write!(f, "heart"),
            Self::Lung => write!(f, "lung"),
            Self::Pulse => write!(f, "pulse"),
            Self::General => write!(f, "general"),
        }
    }
}

/// One loaded catalog entry. Immutable after load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundEntry {
    pub category: SoundCategory,
    /// Device track number the entry plays
    pub track: u16,
    /// Normalized sound name (interior spaces already folded to `_`)
    pub name: String,
    /// Inclusive lower rate bound
    pub low_limit: i32,
    /// Inclusive upper rate bound
    pub high_limit: i32,
}

/// Ordered sound catalog. Lookup is linear, first match wins, so load
/// order is part of the catalog's meaning.
#[derive(Debug, Default)]
pub struct SoundCatalog {
    entries: Vec<SoundEntry>,
    capacity: usize,
}

impl SoundCatalog {
    /// Load a catalog from a file path.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let file = std::fs::File::open(path).map_err(|e| CatalogError::Open {
            path: path.display().to_string(),
            source: e,
        })?;
        let catalog = Self::from_reader(file)?;
        log::info!(
            "loaded {} sound entries from {}",
            catalog.len(),
            path.display()
        );
        Ok(catalog)
    }

    /// Load a catalog from any line-oriented reader.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, CatalogError> {
        let mut lines = Vec::new();
        for line in BufReader::new(reader).lines() {
            lines.push(line?);
        }

        let mut catalog = SoundCatalog {
            entries: Vec::with_capacity(lines.len() + 1),
            capacity: lines.len() + 1,
        };

        for (lineno, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match parse_line(line) {
                Some(entry) => catalog.push(entry),
                None => {
                    log::warn!("catalog line {} rejected: \"{}\"", lineno + 1, line.trim());
                }
            }
        }
        Ok(catalog)
    }

    fn push(&mut self, entry: SoundEntry) {
        if self.entries.len() >= self.capacity {
            log::error!("too many tracks in sound catalog, dropping {:?}", entry);
            return;
        }
        self.entries.push(entry);
    }

    /// Find the track for `name` at `value` within `category`.
    ///
    /// Linear scan in load order; the first entry whose category and name
    /// match exactly and whose inclusive `[low, high]` range contains
    /// `value` wins. Callers keep their previous selection on `None`.
    pub fn select(&self, category: SoundCategory, name: &str, value: i32) -> Option<u16> {
        self.entries
            .iter()
            .find(|e| {
                e.category == category
                    && e.name == name
                    && e.low_limit <= value
                    && e.high_limit >= value
            })
            .map(|e| e.track)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in load order, for the debug-mode listing.
    pub fn entries(&self) -> impl Iterator<Item = &SoundEntry> {
        self.entries.iter()
    }
}

/// Parse one catalog line into an entry.
///
/// Separator punctuation becomes whitespace, interior spaces become
/// underscores, then the line must split into exactly five usable fields.
fn parse_line(line: &str) -> Option<SoundEntry> {
    let clean: String = line
        .chars()
        .map(|c| match c {
            '\t' | ';' | ',' => ' ',
            ' ' => '_',
            other => other,
        })
        .collect();

    let mut fields = clean.split_whitespace();
    let category = SoundCategory::from_field(fields.next()?)?;
    let track: u16 = fields.next()?.parse().ok()?;
    let name = fields.next()?.to_string();
    let low_limit: i32 = fields.next()?.parse().ok()?;
    let high_limit: i32 = fields.next()?.parse().ok()?;

    Some(SoundEntry {
        category,
        track,
        name,
        low_limit,
        high_limit,
    })
}
