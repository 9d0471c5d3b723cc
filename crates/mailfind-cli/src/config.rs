//! Configuration for the mailfind CLI.
//!
//! Provides the [`MailfindConfig`] struct that loads from TOML files,
//! environment variables, and defaults using the `confyg` crate.
//!
//! # Loading Priority
//!
//! 1. Explicit `--config <path>` flag
//! 2. `MAILFIND_CONFIG` environment variable
//! 3. XDG default: `~/.config/mailfind/config.toml`
//! 4. Built-in defaults
//!
//! `MAILFIND_<SECTION>_<KEY>` environment variables are overlaid on top
//! (e.g., `MAILFIND_STORE_PATH`).

use std::path::PathBuf;

use confyg::{Confygery, env};
use mailfind_core::util::paths::{default_store_path, expand_path};
use mailfind_core::{Error, Result};
use mailfind_fts::SearchConfig;
use mailfind_query::HybridConfig;
use mailfind_vector::EmbeddingConfig;
use serde::{Deserialize, Serialize};

/// Prefix of every mailfind environment variable.
pub const ENV_PREFIX: &str = "MAILFIND";

// ============================================================================
// Configuration structs
// ============================================================================

/// Main configuration for the mailfind CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MailfindConfig {
    /// Where the index lives.
    pub store: StoreConfig,

    /// Full-text search settings.
    pub search: SearchConfig,

    /// Embedding backend selection and ingest tuning.
    pub embedding: EmbeddingConfig,

    /// Hybrid ranking settings.
    pub hybrid: HybridConfig,
}

/// Store location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the store file; `~` and `$VAR` are expanded.
    pub path: Option<String>,
}

impl StoreConfig {
    /// The configured store path, or the platform default.
    pub fn resolve_path(&self) -> Result<PathBuf> {
        match &self.path {
            Some(path) => expand_path(path),
            None => Ok(default_store_path()),
        }
    }
}

// ============================================================================
// Config loading
// ============================================================================

impl MailfindConfig {
    /// Load configuration from file, environment, and defaults.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder =
            Confygery::new().map_err(|e| Error::config(format!("config init: {e}")))?;

        if let Some(path) = Self::resolve_config_path(config_path)
            && path.exists()
        {
            tracing::debug!("Loading configuration from {}", path.display());
            builder
                .add_file(&path.to_string_lossy())
                .map_err(|e| Error::config(format!("config file: {e}")))?;
        }

        let mut env_opts = env::Options::with_top_level(ENV_PREFIX);
        env_opts.add_section("store");
        env_opts.add_section("search");
        env_opts.add_section("embedding");
        env_opts.add_section("hybrid");
        builder
            .add_env(env_opts)
            .map_err(|e| Error::config(format!("config env: {e}")))?;

        let config: Self = builder
            .build()
            .map_err(|e| Error::config(format!("config build: {e}")))?;

        Ok(config)
    }

    /// Resolve the config file path from explicit flag, env var, or XDG default.
    pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(PathBuf::from(path));
        }

        if let Ok(path) = std::env::var("MAILFIND_CONFIG") {
            return Some(PathBuf::from(path));
        }

        Self::default_config_path()
    }

    /// Return the XDG default config path.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("mailfind").join("config.toml"))
    }

    /// Serialize this config to a pretty-printed TOML string.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use mailfind_fts::QueryMode;
    use mailfind_query::FusionStrategy;
    use std::sync::{Mutex, MutexGuard};

    /// Serialises tests that read or write `MAILFIND_*` variables.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn env_lock() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// RAII guard for env var manipulation in tests.
    struct EnvGuard {
        key: String,
        prev: Option<String>,
    }

    impl EnvGuard {
        fn new(key: &str, value: &str) -> Self {
            let prev = std::env::var(key).ok();
            // SAFETY: callers hold ENV_LOCK.
            unsafe { std::env::set_var(key, value) };
            Self {
                key: key.to_string(),
                prev,
            }
        }

        fn remove(key: &str) -> Self {
            let prev = std::env::var(key).ok();
            // SAFETY: callers hold ENV_LOCK.
            unsafe { std::env::remove_var(key) };
            Self {
                key: key.to_string(),
                prev,
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            // SAFETY: callers hold ENV_LOCK until the guard drops.
            unsafe {
                if let Some(ref val) = self.prev {
                    std::env::set_var(&self.key, val);
                } else {
                    std::env::remove_var(&self.key);
                }
            }
        }
    }

    #[test]
    fn test_mailfind_config_default() {
        let config = MailfindConfig::default();
        assert!(config.store.path.is_none());
        assert_eq!(config.search.default_limit, 10);
        assert_eq!(config.embedding.backend, "auto");
        assert_eq!(config.hybrid.candidate_multiplier, 4);
        assert_eq!(config.hybrid.strategy, FusionStrategy::MinMax);
    }

    #[test]
    fn test_mailfind_config_from_toml() {
        let toml_str = r#"
            [store]
            path = "/data/mail.redb"

            [search]
            query_mode = "and"
            default_limit = 25

            [embedding]
            backend = "hash:128"
            timeout_ms = 5000

            [hybrid]
            lexical_weight = 0.7
            semantic_weight = 0.3

            [hybrid.strategy]
            kind = "reciprocal_rank"
            k = 30
        "#;

        let config: MailfindConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.store.path.as_deref(), Some("/data/mail.redb"));
        assert_eq!(config.search.query_mode, QueryMode::And);
        assert_eq!(config.search.default_limit, 25);
        assert_eq!(config.search.subject_boost, 2.0);
        assert_eq!(config.embedding.backend, "hash:128");
        assert_eq!(config.embedding.timeout_ms, 5000);
        assert_eq!(config.embedding.batch_size, 64);
        assert_eq!(config.hybrid.lexical_weight, 0.7);
        assert_eq!(
            config.hybrid.strategy,
            FusionStrategy::ReciprocalRank { k: 30 }
        );
    }

    #[test]
    fn test_mailfind_config_to_toml() {
        let config = MailfindConfig::default();
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("[search]"));
        assert!(toml_str.contains("[embedding]"));
        assert!(toml_str.contains("backend = \"auto\""));

        // Round-trip
        let parsed: MailfindConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.embedding.backend, config.embedding.backend);
        assert_eq!(parsed.search.default_limit, config.search.default_limit);
    }

    #[test]
    fn test_mailfind_config_load_from_file() {
        let _lock = env_lock();
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
                [store]
                path = "/tmp/loaded.redb"
                [embedding]
                backend = "hash"
            "#,
        )
        .unwrap();

        let config = MailfindConfig::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.store.path.as_deref(), Some("/tmp/loaded.redb"));
        assert_eq!(config.embedding.backend, "hash");
    }

    #[test]
    fn test_mailfind_config_load_defaults() {
        let _lock = env_lock();
        let config = MailfindConfig::load(Some("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.embedding.backend, "auto");
        assert_eq!(config.search.default_limit, 10);
    }

    #[test]
    fn test_mailfind_config_load_env_overlay() {
        let _lock = env_lock();
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
                [store]
                path = "/from/file.redb"
            "#,
        )
        .unwrap();

        // confyg passes env values as strings, so overlay a string field.
        let _guard = EnvGuard::new("MAILFIND_STORE_PATH", "/from/env.redb");
        let config = MailfindConfig::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.store.path.as_deref(), Some("/from/env.redb"));
    }

    #[test]
    fn test_resolve_config_path_explicit() {
        let path = MailfindConfig::resolve_config_path(Some("/explicit/config.toml"));
        assert_eq!(path, Some(PathBuf::from("/explicit/config.toml")));
    }

    #[test]
    fn test_resolve_config_path_env() {
        let _lock = env_lock();
        let _guard = EnvGuard::new("MAILFIND_CONFIG", "/env/config.toml");
        let path = MailfindConfig::resolve_config_path(None);
        assert_eq!(path, Some(PathBuf::from("/env/config.toml")));
    }

    #[test]
    fn test_resolve_config_path_default() {
        let _lock = env_lock();
        let _guard = EnvGuard::remove("MAILFIND_CONFIG");
        let path = MailfindConfig::resolve_config_path(None).unwrap();
        assert!(path.to_str().unwrap().contains("mailfind"));
        assert!(path.to_str().unwrap().ends_with("config.toml"));
    }

    #[test]
    fn test_store_path_resolution() {
        let config = StoreConfig {
            path: Some("/var/mail/index.redb".into()),
        };
        assert_eq!(
            config.resolve_path().unwrap(),
            PathBuf::from("/var/mail/index.redb")
        );

        let default = StoreConfig::default().resolve_path().unwrap();
        assert!(default.ends_with("mailfind.redb"));
    }
}
