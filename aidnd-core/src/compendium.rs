//! Catalog lookup plus fetch-and-cache behind one handle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::cache::FetchCache;
use crate::catalog::{CatalogError, CatalogIndex, CatalogRecord, ResourceKind};
use crate::combatant::{Combatant, CombatantId};
use crate::error::{Error, Result};

/// A catalog record together with its full body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullRecord {
    pub record: CatalogRecord,
    pub body: Value,
    /// When the body was fetched; `None` for inline bodies.
    pub fetched_at: Option<DateTime<Utc>>,
}

/// The reference catalog and the record cache.
#[derive(Debug, Clone)]
pub struct Compendium {
    index: CatalogIndex,
    cache: FetchCache,
}

impl Compendium {
    pub fn new(index: CatalogIndex, cache: FetchCache) -> Self {
        Self { index, cache }
    }

    pub fn index(&self) -> &CatalogIndex {
        &self.index
    }

    pub fn cache(&self) -> &FetchCache {
        &self.cache
    }

    /// Exact match if there is one, otherwise the best fuzzy hit.
    pub fn resolve(&self, kind: ResourceKind, name_or_slug: &str) -> Result<&CatalogRecord> {
        if let Ok(record) = self.index.exact_lookup(kind, name_or_slug) {
            return Ok(record);
        }
        let best = self
            .index
            .fuzzy_search_scored(kind, name_or_slug, 1)
            .into_iter()
            .next()
            .ok_or_else(|| CatalogError::NotFound {
                kind,
                query: name_or_slug.to_string(),
            })?;
        debug!(kind = %kind, query = name_or_slug, slug = %best.record.slug, score = best.score, "fuzzy resolve");
        Ok(best.record)
    }

    /// The record's full body: inline if the catalog carries it, otherwise
    /// fetched once and cached.
    pub async fn full_record(&self, kind: ResourceKind, name_or_slug: &str) -> Result<FullRecord> {
        let record = self.resolve(kind, name_or_slug)?.clone();
        if let Some(body) = record.body.clone() {
            return Ok(FullRecord {
                record,
                body,
                fetched_at: None,
            });
        }

        let entry = self.cache.fetch_and_cache(kind, &record.slug).await?;
        Ok(FullRecord {
            record,
            body: entry.body.clone(),
            fetched_at: Some(entry.fetched_at),
        })
    }

    /// Build a combatant from a monster's full stat block.
    pub async fn monster_combatant(&self, id: impl Into<CombatantId>, name: &str) -> Result<Combatant> {
        let full = self.full_record(ResourceKind::Monsters, name).await?;
        Combatant::from_monster_record(id, &full.body).map_err(Error::from)
    }
}
