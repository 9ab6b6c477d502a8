//! Engine configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::attack::DownedDefenderPolicy;
use crate::cache::{CacheConfig, FetchCache, RecordFetcher, DEFAULT_FETCH_TIMEOUT};
use crate::catalog::{CatalogIndex, DEFAULT_FUZZY_THRESHOLD, DEFAULT_SEARCH_LIMIT};
use crate::combatant::TempHpPolicy;
use crate::compendium::Compendium;
use crate::error::{Error, Result};
use crate::persist::SnapshotStore;

/// Default Open5e API root.
pub const DEFAULT_OPEN5E_BASE_URL: &str = "https://api.open5e.com/v1";

/// Table rulings the engine applies where the rules leave room.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RulePolicy {
    pub temp_hp: TempHpPolicy,
    pub downed_defender: DownedDefenderPolicy,
}

/// Configuration for the engine's stores, catalog and remote source.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root for encounter snapshots (`<state_dir>/encounters`).
    pub state_dir: PathBuf,

    /// Directory for fetched records; memory only when unset.
    pub cache_dir: Option<PathBuf>,

    /// Load `<kind>.json` datasets from here instead of the bundled sample.
    pub catalog_dir: Option<PathBuf>,

    pub open5e_base_url: String,

    pub fetch_timeout: Duration,

    pub cache_max_age: Option<Duration>,

    pub fuzzy_threshold: f64,

    pub search_limit: usize,

    pub rules: RulePolicy,
}

impl EngineConfig {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            cache_dir: None,
            catalog_dir: None,
            open5e_base_url: DEFAULT_OPEN5E_BASE_URL.to_string(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            cache_max_age: None,
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
            search_limit: DEFAULT_SEARCH_LIMIT,
            rules: RulePolicy::default(),
        }
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn with_catalog_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.catalog_dir = Some(dir.into());
        self
    }

    pub fn with_open5e_base_url(mut self, url: impl Into<String>) -> Self {
        self.open5e_base_url = url.into();
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_cache_max_age(mut self, max_age: Duration) -> Self {
        self.cache_max_age = Some(max_age);
        self
    }

    pub fn with_fuzzy_threshold(mut self, threshold: f64) -> Self {
        self.fuzzy_threshold = threshold;
        self
    }

    pub fn with_search_limit(mut self, limit: usize) -> Self {
        self.search_limit = limit;
        self
    }

    pub fn with_rules(mut self, rules: RulePolicy) -> Self {
        self.rules = rules;
        self
    }

    /// Read configuration from environment variables.
    ///
    /// | variable | meaning |
    /// |---|---|
    /// | `AIDND_STATE_DIR` | state root (default `aidnd-state`) |
    /// | `AIDND_CACHE_DIR` | fetch cache dir (default `<state>/cache`) |
    /// | `AIDND_CATALOG_DIR` | dataset dir (default: bundled) |
    /// | `OPEN5E_BASE_URL` | Open5e API root |
    /// | `AIDND_FETCH_TIMEOUT_SECS` | per-fetch timeout |
    /// | `AIDND_CACHE_MAX_AGE_SECS` | cache entry lifetime |
    /// | `AIDND_FUZZY_THRESHOLD` | minimum fuzzy score, 0.0 to 1.0 |
    /// | `AIDND_TEMP_HP_POLICY` | `keep-higher` or `replace` |
    /// | `AIDND_DOWNED_POLICY` | `apply-damage` or `flag-only` |
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// [`EngineConfig::from_env`] over an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let state_dir = PathBuf::from(get("AIDND_STATE_DIR").unwrap_or_else(|| "aidnd-state".to_string()));
        let mut config = Self::new(&state_dir);
        config.cache_dir = Some(get("AIDND_CACHE_DIR").map_or_else(|| state_dir.join("cache"), PathBuf::from));
        config.catalog_dir = get("AIDND_CATALOG_DIR").map(PathBuf::from);

        if let Some(url) = get("OPEN5E_BASE_URL") {
            config.open5e_base_url = url;
        }
        if let Some(secs) = get("AIDND_FETCH_TIMEOUT_SECS") {
            let secs = parse_secs("AIDND_FETCH_TIMEOUT_SECS", &secs)?;
            if secs == 0 {
                return Err(Error::Config("AIDND_FETCH_TIMEOUT_SECS must be positive".to_string()));
            }
            config.fetch_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = get("AIDND_CACHE_MAX_AGE_SECS") {
            config.cache_max_age = Some(Duration::from_secs(parse_secs("AIDND_CACHE_MAX_AGE_SECS", &secs)?));
        }
        if let Some(threshold) = get("AIDND_FUZZY_THRESHOLD") {
            config.fuzzy_threshold = threshold
                .parse::<f64>()
                .ok()
                .filter(|t| (0.0..=1.0).contains(t))
                .ok_or_else(|| Error::Config(format!("AIDND_FUZZY_THRESHOLD must be 0.0 to 1.0, got {threshold:?}")))?;
        }
        if let Some(policy) = get("AIDND_TEMP_HP_POLICY") {
            config.rules.temp_hp = policy
                .parse()
                .map_err(|_| Error::Config(format!("unknown AIDND_TEMP_HP_POLICY {policy:?}")))?;
        }
        if let Some(policy) = get("AIDND_DOWNED_POLICY") {
            config.rules.downed_defender = policy
                .parse()
                .map_err(|_| Error::Config(format!("unknown AIDND_DOWNED_POLICY {policy:?}")))?;
        }

        Ok(config)
    }

    pub fn encounter_dir(&self) -> PathBuf {
        self.state_dir.join("encounters")
    }

    /// Open the snapshot store, clearing temp files left by crashed saves.
    pub async fn snapshot_store(&self) -> Result<SnapshotStore> {
        Ok(SnapshotStore::open(self.encounter_dir()).await?)
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            dir: self.cache_dir.clone(),
            timeout: self.fetch_timeout,
            max_age: self.cache_max_age,
        }
    }

    /// The configured dataset, or the bundled sample.
    pub async fn catalog_index(&self) -> Result<CatalogIndex> {
        let index = match &self.catalog_dir {
            Some(dir) => CatalogIndex::load_dir(dir).await?,
            None => CatalogIndex::bundled()?,
        };
        Ok(index
            .with_threshold(self.fuzzy_threshold)
            .with_search_limit(self.search_limit))
    }

    pub fn open5e_client(&self) -> Result<open5e::Open5e> {
        open5e::Open5e::with_config(&self.open5e_base_url, self.fetch_timeout)
            .map_err(|e| Error::Config(e.to_string()))
    }

    /// Catalog plus a fetch cache backed by `fetcher`.
    pub async fn compendium_with(&self, fetcher: Arc<dyn RecordFetcher>) -> Result<Compendium> {
        let index = self.catalog_index().await?;
        Ok(Compendium::new(index, FetchCache::new(fetcher, self.cache_config())))
    }

    /// Catalog plus a fetch cache backed by the Open5e API.
    pub async fn compendium(&self) -> Result<Compendium> {
        let client = self.open5e_client()?;
        self.compendium_with(Arc::new(client)).await
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("{key} must be a whole number of seconds, got {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.state_dir, PathBuf::from("aidnd-state"));
        assert_eq!(config.cache_dir, Some(PathBuf::from("aidnd-state").join("cache")));
        assert_eq!(config.catalog_dir, None);
        assert_eq!(config.open5e_base_url, DEFAULT_OPEN5E_BASE_URL);
        assert_eq!(config.fetch_timeout, Duration::from_secs(10));
        assert_eq!(config.fuzzy_threshold, 0.8);
        assert_eq!(config.rules, RulePolicy::default());
        assert_eq!(config.encounter_dir(), PathBuf::from("aidnd-state").join("encounters"));
    }

    #[test]
    fn test_overrides() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("AIDND_STATE_DIR", "/tmp/state"),
            ("AIDND_CACHE_DIR", "/tmp/cache"),
            ("AIDND_FETCH_TIMEOUT_SECS", "3"),
            ("AIDND_CACHE_MAX_AGE_SECS", "86400"),
            ("AIDND_FUZZY_THRESHOLD", "0.9"),
            ("AIDND_TEMP_HP_POLICY", "replace"),
            ("AIDND_DOWNED_POLICY", "flag-only"),
        ]))
        .unwrap();

        assert_eq!(config.state_dir, PathBuf::from("/tmp/state"));
        assert_eq!(config.cache_dir, Some(PathBuf::from("/tmp/cache")));
        assert_eq!(config.fetch_timeout, Duration::from_secs(3));
        assert_eq!(config.cache_max_age, Some(Duration::from_secs(86400)));
        assert_eq!(config.fuzzy_threshold, 0.9);
        assert_eq!(config.rules.temp_hp, TempHpPolicy::Replace);
        assert_eq!(config.rules.downed_defender, DownedDefenderPolicy::FlagOnly);

        let cache = config.cache_config();
        assert_eq!(cache.timeout, Duration::from_secs(3));
        assert_eq!(cache.max_age, Some(Duration::from_secs(86400)));
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        for vars in [
            [("AIDND_FETCH_TIMEOUT_SECS", "soon")],
            [("AIDND_FETCH_TIMEOUT_SECS", "0")],
            [("AIDND_FUZZY_THRESHOLD", "1.5")],
            [("AIDND_TEMP_HP_POLICY", "stack")],
            [("AIDND_DOWNED_POLICY", "overkill")],
        ] {
            assert!(
                matches!(EngineConfig::from_lookup(lookup(&vars)), Err(Error::Config(_))),
                "{vars:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_catalog_index_uses_settings() {
        let config = EngineConfig::new("state")
            .with_fuzzy_threshold(0.95)
            .with_search_limit(3);
        let index = config.catalog_index().await.unwrap();
        assert_eq!(index.threshold(), 0.95);
    }
}
