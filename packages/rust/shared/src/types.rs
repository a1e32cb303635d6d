//! Domain types for the intermediate record.
//!
//! The record (`ranobe.json` plus a sibling `imgs/` directory) is the sole
//! contract between acquisition and assembly: it must be independently
//! loadable and must not assume any acquisition-side state.

use std::cmp::Ordering;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RanopressError, Result};

/// File name of the intermediate record inside the output directory.
pub const RECORD_FILE_NAME: &str = "ranobe.json";

// ---------------------------------------------------------------------------
// Book
// ---------------------------------------------------------------------------

/// The complete work being converted, with ordered chapters grouped into
/// volumes. Written once by acquisition, consumed read-only by assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    /// Canonical book identifier extracted from the input reference.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Original (untranslated) title.
    #[serde(default)]
    pub original_title: String,
    /// Description/summary text.
    #[serde(default)]
    pub description: String,
    /// Record-relative path to the downloaded cover (e.g. `imgs/cover.jpg`).
    #[serde(default)]
    pub cover_image: Option<String>,
    /// Chapters in source order.
    pub chapters: Vec<Chapter>,
}

impl Book {
    /// Serialize the book to `path` as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| RanopressError::record(format!("serialization failed: {e}")))?;
        std::fs::write(path, json).map_err(|e| RanopressError::io(path, e))?;
        Ok(())
    }

    /// Load a book from a record file written by [`Book::save`].
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RanopressError::record(format!(
                "no record file at {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path).map_err(|e| RanopressError::io(path, e))?;
        serde_json::from_str(&content).map_err(|e| {
            RanopressError::record(format!("invalid record {}: {e}", path.display()))
        })
    }
}

// ---------------------------------------------------------------------------
// Chapter / Attachment
// ---------------------------------------------------------------------------

/// A single chapter with normalized HTML content.
///
/// `content` holds canonical HTML whose image sources are all local
/// `imgs/...` paths; remote URLs never survive acquisition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub id: u64,
    /// Volume label. Free-form, numeric-sortable when possible.
    pub volume: String,
    /// Chapter number. Decimal so split chapters ("12.5") sort correctly.
    #[serde(rename = "chapter")]
    pub number: f64,
    pub name: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub content: String,
}

/// A remote binary asset (image) referenced by a chapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    /// Opaque identifier used by structured-content image nodes.
    /// Some payloads omit it; resolution then falls back to the filename stem.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub filename: String,
    pub url: String,
}

impl Attachment {
    /// The identifier structured-content image nodes are matched against:
    /// the explicit `id` when present, else the filename without extension.
    pub fn identifier(&self) -> &str {
        if let Some(id) = &self.id {
            return id;
        }
        self.filename
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(&self.filename)
    }
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

/// Sort key for volume labels: numeric labels order before non-numeric ones,
/// numerics by value and the rest lexically.
#[derive(Debug, Clone, PartialEq)]
pub enum VolumeKey {
    Number(f64),
    Label(String),
}

impl VolumeKey {
    pub fn parse(label: &str) -> Self {
        match label.trim().parse::<f64>() {
            Ok(n) => Self::Number(n),
            Err(_) => Self::Label(label.to_string()),
        }
    }
}

impl Eq for VolumeKey {}

impl Ord for VolumeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::Label(a), Self::Label(b)) => a.cmp(b),
            (Self::Number(_), Self::Label(_)) => Ordering::Less,
            (Self::Label(_), Self::Number(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for VolumeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
