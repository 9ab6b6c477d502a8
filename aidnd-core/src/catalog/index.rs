use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use super::normalize::{fold, slugify};
use super::{parse_dataset, CatalogError, CatalogRecord, ResourceKind};

/// Minimum similarity for a fuzzy match.
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.8;
/// Most results returned by a fuzzy search.
pub const DEFAULT_SEARCH_LIMIT: usize = 20;

const EXACT_SCORE: f64 = 1.0;
const PREFIX_SCORE: f64 = 0.95;
const SUBSTRING_SCORE: f64 = 0.9;

const BUNDLED: &[(ResourceKind, &str)] = &[
    (ResourceKind::Monsters, include_str!("../../data/catalog/monsters.json")),
    (ResourceKind::Spells, include_str!("../../data/catalog/spells.json")),
    (ResourceKind::Equipment, include_str!("../../data/catalog/equipment.json")),
    (ResourceKind::Backgrounds, include_str!("../../data/catalog/backgrounds.json")),
    (ResourceKind::Classes, include_str!("../../data/catalog/classes.json")),
    (ResourceKind::Conditions, include_str!("../../data/catalog/conditions.json")),
    (ResourceKind::Documents, include_str!("../../data/catalog/documents.json")),
    (ResourceKind::Feats, include_str!("../../data/catalog/feats.json")),
    (ResourceKind::Planes, include_str!("../../data/catalog/planes.json")),
    (ResourceKind::Races, include_str!("../../data/catalog/races.json")),
    (ResourceKind::Sections, include_str!("../../data/catalog/sections.json")),
    (ResourceKind::SpellList, include_str!("../../data/catalog/spelllist.json")),
];

/// A fuzzy search hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredRecord<'a> {
    pub record: &'a CatalogRecord,
    /// 1.0 exact, 0.95 prefix, 0.9 substring, otherwise Jaro-Winkler.
    pub score: f64,
}

#[derive(Debug, Clone, Default)]
struct Table {
    records: Vec<CatalogRecord>,
    /// Folded name and folded slug per record, for fuzzy matching.
    folded: Vec<(String, String)>,
    by_slug: HashMap<String, Vec<usize>>,
    by_name: HashMap<String, Vec<usize>>,
}

impl Table {
    fn insert(&mut self, record: CatalogRecord) {
        let existing = self.by_slug.get(&record.slug).and_then(|indices| {
            indices
                .iter()
                .copied()
                .find(|&i| self.records[i].document == record.document)
        });

        if let Some(index) = existing {
            // Same slug from the same document: the later record wins.
            let old_name = slugify(&self.records[index].name);
            if let Some(indices) = self.by_name.get_mut(&old_name) {
                indices.retain(|&i| i != index);
            }
            self.folded[index] = (fold(&record.name), fold(&record.slug));
            self.by_name
                .entry(slugify(&record.name))
                .or_default()
                .push(index);
            self.records[index] = record;
            return;
        }

        let index = self.records.len();
        self.folded.push((fold(&record.name), fold(&record.slug)));
        self.by_slug.entry(record.slug.clone()).or_default().push(index);
        self.by_name
            .entry(slugify(&record.name))
            .or_default()
            .push(index);
        self.records.push(record);
    }
}

/// In-memory index over catalog records, one table per resource kind.
#[derive(Debug, Clone)]
pub struct CatalogIndex {
    tables: HashMap<ResourceKind, Table>,
    threshold: f64,
    search_limit: usize,
}

impl Default for CatalogIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogIndex {
    /// An empty index.
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
            threshold: DEFAULT_FUZZY_THRESHOLD,
            search_limit: DEFAULT_SEARCH_LIMIT,
        }
    }

    /// The SRD sample compiled into this crate.
    pub fn bundled() -> Result<Self, CatalogError> {
        let mut index = Self::new();
        for (kind, json) in BUNDLED {
            for record in parse_dataset(*kind, json)? {
                index.insert(record);
            }
        }
        debug!(records = index.len(), "loaded bundled catalog");
        Ok(index)
    }

    /// Load every `<kind>.json` present in `dir`. Missing files are skipped.
    pub async fn load_dir(dir: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let dir = dir.as_ref();
        let mut index = Self::new();
        for kind in ResourceKind::all() {
            let path = dir.join(format!("{kind}.json"));
            let json = match tokio::fs::read_to_string(&path).await {
                Ok(json) => json,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            for record in parse_dataset(kind, &json)? {
                index.insert(record);
            }
        }
        info!(dir = %dir.display(), records = index.len(), "loaded catalog");
        Ok(index)
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn with_search_limit(mut self, limit: usize) -> Self {
        self.search_limit = limit.max(1);
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Add a record, normalizing its slug and document.
    pub fn insert(&mut self, mut record: CatalogRecord) {
        record.slug = slugify(&record.slug);
        record.document = record.document.map(|d| slugify(&d)).filter(|d| !d.is_empty());
        self.tables.entry(record.kind).or_default().insert(record);
    }

    /// Records of one kind, in load order.
    pub fn records(&self, kind: ResourceKind) -> &[CatalogRecord] {
        self.tables
            .get(&kind)
            .map(|t| t.records.as_slice())
            .unwrap_or(&[])
    }

    /// Total records across all kinds.
    pub fn len(&self) -> usize {
        self.tables.values().map(|t| t.records.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ranked matches for a free-text query, best first, at most the
    /// configured search limit. Blank queries match nothing.
    pub fn fuzzy_search(&self, kind: ResourceKind, query: &str) -> Vec<CatalogRecord> {
        self.fuzzy_search_scored(kind, query, self.search_limit)
            .into_iter()
            .map(|hit| hit.record.clone())
            .collect()
    }

    /// Like [`fuzzy_search`](Self::fuzzy_search) with scores and an explicit limit.
    pub fn fuzzy_search_scored(
        &self,
        kind: ResourceKind,
        query: &str,
        limit: usize,
    ) -> Vec<ScoredRecord<'_>> {
        let query = fold(query);
        let Some(table) = self.tables.get(&kind) else {
            return Vec::new();
        };
        if query.is_empty() {
            return Vec::new();
        }

        let mut hits: Vec<ScoredRecord<'_>> = table
            .records
            .iter()
            .zip(&table.folded)
            .filter_map(|(record, (name, slug))| {
                let score = similarity(&query, name).max(similarity(&query, slug));
                (score >= self.threshold).then_some(ScoredRecord { record, score })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.record.name.cmp(&b.record.name))
        });
        hits.truncate(limit);
        hits
    }

    /// Exact match on slug, then on display name, after normalization.
    /// Never falls back to partial matching.
    pub fn exact_lookup(&self, kind: ResourceKind, name_or_slug: &str) -> Result<&CatalogRecord, CatalogError> {
        self.exact_lookup_in(kind, name_or_slug, None)
    }

    /// Exact lookup that prefers the record from `prefer_document` when
    /// several documents publish the same slug.
    pub fn exact_lookup_in(
        &self,
        kind: ResourceKind,
        name_or_slug: &str,
        prefer_document: Option<&str>,
    ) -> Result<&CatalogRecord, CatalogError> {
        let not_found = || CatalogError::NotFound {
            kind,
            query: name_or_slug.to_string(),
        };

        let key = slugify(name_or_slug);
        let table = self.tables.get(&kind).ok_or_else(not_found)?;
        let candidates = table
            .by_slug
            .get(&key)
            .filter(|c| !c.is_empty())
            .or_else(|| table.by_name.get(&key).filter(|c| !c.is_empty()))
            .ok_or_else(not_found)?;

        let preferred = prefer_document.map(slugify).and_then(|doc| {
            candidates
                .iter()
                .copied()
                .find(|&i| table.records[i].document.as_deref() == Some(doc.as_str()))
        });

        let index = preferred.unwrap_or(candidates[0]);
        Ok(&table.records[index])
    }
}

/// Tiered similarity between two folded strings.
fn similarity(query: &str, target: &str) -> f64 {
    if target == query {
        EXACT_SCORE
    } else if target.starts_with(query) {
        PREFIX_SCORE
    } else if target.contains(query) {
        SUBSTRING_SCORE
    } else {
        strsim::jaro_winkler(query, target)
    }
}
