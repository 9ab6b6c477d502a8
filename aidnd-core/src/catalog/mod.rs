//! Reference catalog of rules records (monsters, spells, conditions, ...).
//!
//! The catalog is read-only: a bundled SRD sample compiled into the crate, or
//! `<kind>.json` files loaded from a directory. Full record bodies that the
//! catalog only references are fetched through [`crate::cache::FetchCache`].

mod index;
mod normalize;

pub use index::{CatalogIndex, ScoredRecord, DEFAULT_FUZZY_THRESHOLD, DEFAULT_SEARCH_LIMIT};
pub use normalize::{fold, slugify};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors from catalog loading and lookup.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("No {kind} record matches {query:?}")]
    NotFound { kind: ResourceKind, query: String },

    #[error("Unknown resource kind: {0:?}")]
    UnknownKind(String),

    #[error("Invalid catalog record: {0}")]
    InvalidRecord(String),

    #[error("Invalid {kind} dataset: {reason}")]
    InvalidDataset { kind: ResourceKind, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Resource types exposed by the Open5e API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Monsters,
    Spells,
    Equipment,
    Backgrounds,
    Classes,
    Conditions,
    Documents,
    Feats,
    Planes,
    Races,
    Sections,
    SpellList,
}

impl ResourceKind {
    /// Path segment and dataset file stem.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Monsters => "monsters",
            ResourceKind::Spells => "spells",
            ResourceKind::Equipment => "equipment",
            ResourceKind::Backgrounds => "backgrounds",
            ResourceKind::Classes => "classes",
            ResourceKind::Conditions => "conditions",
            ResourceKind::Documents => "documents",
            ResourceKind::Feats => "feats",
            ResourceKind::Planes => "planes",
            ResourceKind::Races => "races",
            ResourceKind::Sections => "sections",
            ResourceKind::SpellList => "spelllist",
        }
    }

    pub fn all() -> [ResourceKind; 12] {
        [
            ResourceKind::Monsters,
            ResourceKind::Spells,
            ResourceKind::Equipment,
            ResourceKind::Backgrounds,
            ResourceKind::Classes,
            ResourceKind::Conditions,
            ResourceKind::Documents,
            ResourceKind::Feats,
            ResourceKind::Planes,
            ResourceKind::Races,
            ResourceKind::Sections,
            ResourceKind::SpellList,
        ]
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = CatalogError;

    /// Accepts plural or singular forms in any case ("Monster", "spell-list").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        let kind = match wanted.as_str() {
            "monster" | "monsters" => ResourceKind::Monsters,
            "spell" | "spells" => ResourceKind::Spells,
            "equipment" | "item" | "items" => ResourceKind::Equipment,
            "background" | "backgrounds" => ResourceKind::Backgrounds,
            "class" | "classes" => ResourceKind::Classes,
            "condition" | "conditions" => ResourceKind::Conditions,
            "document" | "documents" => ResourceKind::Documents,
            "feat" | "feats" => ResourceKind::Feats,
            "plane" | "planes" => ResourceKind::Planes,
            "race" | "races" => ResourceKind::Races,
            "section" | "sections" => ResourceKind::Sections,
            "spelllist" | "spelllists" => ResourceKind::SpellList,
            _ => return Err(CatalogError::UnknownKind(s.to_string())),
        };
        Ok(kind)
    }
}

/// One entry of the reference catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub kind: ResourceKind,
    /// Normalized stable identifier.
    pub slug: String,
    pub name: String,
    /// Slug of the source document (e.g. `wotc-srd`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    /// Short display fields (type, level, challenge rating, ...).
    #[serde(default)]
    pub summary: BTreeMap<String, String>,
    /// Full body, when the dataset carries it inline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Where the full body lives when it is not inline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl CatalogRecord {
    pub fn has_inline_body(&self) -> bool {
        self.body.is_some()
    }
}

/// A record as written in a dataset file: the kind comes from the file name
/// and the slug may be omitted.
#[derive(Debug, Deserialize)]
struct DatasetRecord {
    #[serde(default)]
    slug: Option<String>,
    name: String,
    #[serde(default, alias = "document__slug")]
    document: Option<String>,
    #[serde(default)]
    summary: BTreeMap<String, String>,
    #[serde(default)]
    body: Option<Value>,
    #[serde(default)]
    url: Option<String>,
}

impl DatasetRecord {
    fn into_record(self, kind: ResourceKind) -> Result<CatalogRecord, CatalogError> {
        let slug = slugify(self.slug.as_deref().unwrap_or(&self.name));
        if slug.is_empty() {
            return Err(CatalogError::InvalidRecord(format!(
                "{kind} record {:?} has no usable slug",
                self.name
            )));
        }
        Ok(CatalogRecord {
            kind,
            slug,
            name: self.name.trim().to_string(),
            document: self.document.map(|d| slugify(&d)).filter(|d| !d.is_empty()),
            summary: self.summary,
            body: self.body,
            url: self.url,
        })
    }
}

/// Parse one `<kind>.json` dataset (a JSON array of records).
pub(crate) fn parse_dataset(kind: ResourceKind, json: &str) -> Result<Vec<CatalogRecord>, CatalogError> {
    let raw: Vec<DatasetRecord> =
        serde_json::from_str(json).map_err(|e| CatalogError::InvalidDataset {
            kind,
            reason: e.to_string(),
        })?;
    raw.into_iter().map(|r| r.into_record(kind)).collect()
}
