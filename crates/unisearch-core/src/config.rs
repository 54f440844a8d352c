//! Engine configuration.
//!
//! Read from TOML, with every field defaulted so an empty file selects the
//! in-memory reference engine:
//!
//! ```toml
//! backend = "elasticsearch"
//! id_field = "id"
//!
//! [elasticsearch]
//! url = "http://localhost:9200"
//! refresh = true
//! ```
//!
//! A handful of `UNISEARCH_*` environment variables override the file; see
//! [`EngineConfig::apply_env`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Closed set of supported backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// In-memory reference engine.
    #[default]
    #[serde(alias = "reference")]
    Memory,
    /// Elasticsearch over HTTP.
    #[serde(alias = "elastic")]
    Elasticsearch,
    /// Meilisearch over HTTP.
    #[serde(alias = "meili")]
    Meilisearch,
    /// Typesense over HTTP.
    Typesense,
}

impl BackendKind {
    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Elasticsearch => "elasticsearch",
            Self::Meilisearch => "meilisearch",
            Self::Typesense => "typesense",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "reference" => Ok(Self::Memory),
            "elasticsearch" | "elastic" => Ok(Self::Elasticsearch),
            "meilisearch" | "meili" => Ok(Self::Meilisearch),
            "typesense" => Ok(Self::Typesense),
            other => Err(Error::config(format!("unknown backend '{other}'"))),
        }
    }
}

/// Reference engine settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// JSON snapshot loaded on start and rewritten after every change.
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
}

/// Elasticsearch adapter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElasticsearchConfig {
    /// Cluster base URL.
    #[serde(default = "default_es_url")]
    pub url: String,

    /// Basic-auth user.
    #[serde(default)]
    pub username: Option<String>,

    /// Basic-auth password.
    #[serde(default)]
    pub password: Option<String>,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Refresh the index after every write, regardless of per-call options.
    #[serde(default)]
    pub refresh: bool,
}

fn default_es_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            url: default_es_url(),
            username: None,
            password: None,
            timeout_secs: default_timeout_secs(),
            refresh: false,
        }
    }
}

/// Meilisearch adapter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeilisearchConfig {
    /// Server base URL.
    #[serde(default = "default_meili_url")]
    pub url: String,

    /// API key sent as a bearer token.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_meili_url() -> String {
    "http://localhost:7700".to_string()
}

impl Default for MeilisearchConfig {
    fn default() -> Self {
        Self {
            url: default_meili_url(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Typesense adapter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypesenseConfig {
    /// Server base URL.
    #[serde(default = "default_typesense_url")]
    pub url: String,

    /// API key sent in `X-TYPESENSE-API-KEY`.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Prepended to every index name, so tenants can share one server.
    #[serde(default)]
    pub collection_prefix: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_typesense_url() -> String {
    "http://localhost:8108".to_string()
}

impl Default for TypesenseConfig {
    fn default() -> Self {
        Self {
            url: default_typesense_url(),
            api_key: None,
            collection_prefix: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Which engine the factory builds.
    #[serde(default)]
    pub backend: BackendKind,

    /// Top-level document field holding the id.
    #[serde(default = "default_id_field")]
    pub id_field: String,

    /// Page size for requests that do not set one.
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,

    /// Reference engine section.
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Elasticsearch section.
    #[serde(default)]
    pub elasticsearch: ElasticsearchConfig,

    /// Meilisearch section.
    #[serde(default)]
    pub meilisearch: MeilisearchConfig,

    /// Typesense section.
    #[serde(default)]
    pub typesense: TypesenseConfig,
}

fn default_id_field() -> String {
    "id".to_string()
}

fn default_page_size() -> usize {
    crate::criteria::DEFAULT_PAGE_SIZE
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            id_field: default_id_field(),
            default_page_size: default_page_size(),
            memory: MemoryConfig::default(),
            elasticsearch: ElasticsearchConfig::default(),
            meilisearch: MeilisearchConfig::default(),
            typesense: TypesenseConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        log::debug!("Loading engine config from {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|e| Error::io_with_path(e, path))?;
        Self::from_toml_str(&text)
    }

    /// Apply `UNISEARCH_*` overrides using `lookup` to read variables.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `UNISEARCH_BACKEND` | `backend` |
    /// | `UNISEARCH_ES_URL` | `elasticsearch.url` |
    /// | `UNISEARCH_MEILI_URL` | `meilisearch.url` |
    /// | `UNISEARCH_MEILI_KEY` | `meilisearch.api_key` |
    /// | `UNISEARCH_TYPESENSE_URL` | `typesense.url` |
    /// | `UNISEARCH_TYPESENSE_KEY` | `typesense.api_key` |
    /// | `UNISEARCH_SNAPSHOT` | `memory.snapshot_path` |
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(backend) = lookup("UNISEARCH_BACKEND") {
            self.backend = backend.parse()?;
        }
        if let Some(url) = lookup("UNISEARCH_ES_URL") {
            self.elasticsearch.url = url;
        }
        if let Some(url) = lookup("UNISEARCH_MEILI_URL") {
            self.meilisearch.url = url;
        }
        if let Some(key) = lookup("UNISEARCH_MEILI_KEY") {
            self.meilisearch.api_key = Some(key);
        }
        if let Some(url) = lookup("UNISEARCH_TYPESENSE_URL") {
            self.typesense.url = url;
        }
        if let Some(key) = lookup("UNISEARCH_TYPESENSE_KEY") {
            self.typesense.api_key = Some(key);
        }
        if let Some(path) = lookup("UNISEARCH_SNAPSHOT") {
            self.memory.snapshot_path = Some(PathBuf::from(path));
        }
        self.validate()?;
        Ok(self)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.id_field.is_empty() {
            return Err(Error::config("id_field must not be empty"));
        }
        if self.id_field.contains('.') {
            return Err(Error::config("id_field must be a top-level field name"));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_engine_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.backend, BackendKind::Memory);
        assert_eq!(config.id_field, "id");
        assert_eq!(config.default_page_size, 10);
        assert!(config.memory.snapshot_path.is_none());
        assert_eq!(config.elasticsearch.url, "http://localhost:9200");
        assert_eq!(config.meilisearch.timeout_secs, 30);
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(EngineConfig::from_toml_str("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_toml_sections() {
        let config = EngineConfig::from_toml_str(
            r#"
            backend = "elastic"
            id_field = "key"

            [elasticsearch]
            url = "http://es:9200"
            username = "elastic"
            refresh = true
            "#,
        )
        .unwrap();
        assert_eq!(config.backend, BackendKind::Elasticsearch);
        assert_eq!(config.id_field, "key");
        assert_eq!(config.elasticsearch.url, "http://es:9200");
        assert_eq!(config.elasticsearch.username.as_deref(), Some("elastic"));
        assert!(config.elasticsearch.refresh);
        assert_eq!(config.elasticsearch.timeout_secs, 30);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = EngineConfig::from_toml_str("backend = \"solr\"").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        let err = EngineConfig::from_toml_str("id_field = \"a.b\"").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unisearch.toml");
        std::fs::write(&path, "backend = \"meili\"\n[meilisearch]\napi_key = \"k\"\n").unwrap();
        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.backend, BackendKind::Meilisearch);
        assert_eq!(config.meilisearch.api_key.as_deref(), Some("k"));

        let err = EngineConfig::load(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn test_apply_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("UNISEARCH_BACKEND", "elasticsearch"),
            ("UNISEARCH_ES_URL", "http://other:9200"),
            ("UNISEARCH_SNAPSHOT", "/tmp/snap.json"),
        ]);
        let config = EngineConfig::default()
            .apply_env(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.backend, BackendKind::Elasticsearch);
        assert_eq!(config.elasticsearch.url, "http://other:9200");
        assert_eq!(
            config.memory.snapshot_path,
            Some(PathBuf::from("/tmp/snap.json"))
        );
        assert!(config.meilisearch.api_key.is_none());
    }

    #[test]
    fn test_typesense_section() {
        let config = EngineConfig::from_toml_str(
            r#"
            backend = "typesense"

            [typesense]
            api_key = "xyz"
            collection_prefix = "tenant_a_"
            "#,
        )
        .unwrap();
        assert_eq!(config.backend, BackendKind::Typesense);
        assert_eq!(config.typesense.url, "http://localhost:8108");
        assert_eq!(config.typesense.api_key.as_deref(), Some("xyz"));
        assert_eq!(config.typesense.collection_prefix, "tenant_a_");

        let config = config
            .apply_env(|key| (key == "UNISEARCH_TYPESENSE_URL").then(|| "http://ts:8108".to_string()))
            .unwrap();
        assert_eq!(config.typesense.url, "http://ts:8108");
    }

    #[test]
    fn test_apply_env_rejects_unknown_backend() {
        let err = EngineConfig::default()
            .apply_env(|key| (key == "UNISEARCH_BACKEND").then(|| "solr".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("solr"));
    }

    #[test]
    fn test_backend_kind_parse_and_display() {
        assert_eq!("reference".parse::<BackendKind>().unwrap(), BackendKind::Memory);
        assert_eq!("Elastic".parse::<BackendKind>().unwrap(), BackendKind::Elasticsearch);
        assert_eq!("meili".parse::<BackendKind>().unwrap(), BackendKind::Meilisearch);
        assert_eq!(BackendKind::Meilisearch.to_string(), "meilisearch");
        assert_eq!("typesense".parse::<BackendKind>().unwrap(), BackendKind::Typesense);
        assert!("solr".parse::<BackendKind>().is_err());
    }
}
