//! `relaybot.toml` plus environment overrides.
//!
//! Every field has a default, so running without a config file is valid.
//! Environment variables win over the file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use relaybot_outreach::{RetryPolicy, WorkerConfig};
use relaybot_storage::{RootCandidate, StorageRootResolver, DEFAULT_FALLBACK_ROOT, DEFAULT_ROOT_CANDIDATES};
use serde::Deserialize;

pub(crate) const CONFIG_ENV: &str = "RELAYBOT_CONFIG";

pub(crate) const DEFAULT_TEMPLATE: &str = "thanks";
const DEFAULT_OUTREACH_TEXT: &str = "Спасибо, что выбрали нас! Если что-то нужно уточнить по товару или эксплуатации, \
пишите в этот чат, ответим оперативно. Хорошего дня и будем рады вашему следующему заказу.";

#[derive(Debug, thiserror::Error)]
pub(crate) enum ConfigError {
    #[error("cannot read config '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{var} must be a non-negative integer, got '{value}'")]
    InvalidEnv { var: &'static str, value: String },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct RelayConfig {
    pub storage: StorageSection,
    pub delivery: DeliverySection,
    pub titles: TitlesSection,
    pub marketplace: MarketplaceSection,
    /// Named message bodies with `{param}` placeholders.
    pub templates: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct StorageSection {
    /// Environment variables consulted in order for the storage root.
    pub candidates: Vec<String>,
    pub fallback: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        StorageSection {
            candidates: DEFAULT_ROOT_CANDIDATES.iter().map(|s| s.to_string()).collect(),
            fallback: PathBuf::from(DEFAULT_FALLBACK_ROOT),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct DeliverySection {
    pub retry_ceiling: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    pub backoff_jitter_ms: u64,
    pub min_interval_ms: u64,
    pub poll_interval_ms: u64,
    pub send_timeout_ms: u64,
}

impl Default for DeliverySection {
    fn default() -> Self {
        DeliverySection {
            retry_ceiling: 5,
            backoff_base_ms: 2_000,
            backoff_cap_ms: 600_000,
            backoff_jitter_ms: 1_000,
            min_interval_ms: 1_000,
            poll_interval_ms: 5_000,
            send_timeout_ms: 35_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct TitlesSection {
    pub ttl_secs: u64,
}

impl Default for TitlesSection {
    fn default() -> Self {
        TitlesSection {
            ttl_secs: 12 * 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct MarketplaceSection {
    pub base_url: String,
    pub client_id: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for MarketplaceSection {
    fn default() -> Self {
        MarketplaceSection {
            base_url: "https://api-seller.ozon.ru".to_string(),
            client_id: None,
            api_key: None,
            timeout_secs: 35,
        }
    }
}

impl RelayConfig {
    /// Load from `path`, else from `$RELAYBOT_CONFIG`, else defaults; then
    /// apply process environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = std::env::var(CONFIG_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);
        let mut config = match path.map(Path::to_path_buf).or(env_path) {
            Some(path) => Self::from_file(&path)?,
            None => RelayConfig::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        config.ensure_default_template();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let number = |var: &'static str| -> Result<Option<u64>, ConfigError> {
            match get(var) {
                None => Ok(None),
                Some(value) => value
                    .parse()
                    .map(Some)
                    .map_err(|_| ConfigError::InvalidEnv { var, value }),
            }
        };

        if let Some(ceiling) = number("RELAYBOT_RETRY_CEILING")? {
            self.delivery.retry_ceiling = u32::try_from(ceiling).unwrap_or(u32::MAX);
        }
        if let Some(ms) = number("RELAYBOT_MIN_INTERVAL_MS")? {
            self.delivery.min_interval_ms = ms;
        }
        if let Some(ms) = number("RELAYBOT_POLL_INTERVAL_MS")? {
            self.delivery.poll_interval_ms = ms;
        }
        if let Some(secs) = number("RELAYBOT_TITLE_TTL_SECS")? {
            self.titles.ttl_secs = secs;
        }

        if let Some(id) = get("OZON_CLIENT_ID").or_else(|| get("OZON_SELLER_CLIENT_ID")) {
            self.marketplace.client_id = Some(id);
        }
        if let Some(key) = get("OZON_API_KEY").or_else(|| get("OZON_SELLER_API_KEY")) {
            self.marketplace.api_key = Some(key);
        }
        if let Some(url) = get("OZON_API_BASE_URL") {
            self.marketplace.base_url = url;
        }
        if let Some(secs) = number("OZON_HTTP_TIMEOUT_S")? {
            self.marketplace.timeout_secs = secs;
        }
        Ok(())
    }

    fn ensure_default_template(&mut self) {
        self.templates
            .entry(DEFAULT_TEMPLATE.to_string())
            .or_insert_with(|| DEFAULT_OUTREACH_TEXT.to_string());
    }

    pub fn resolver(&self) -> StorageRootResolver {
        StorageRootResolver::new(
            self.storage
                .candidates
                .iter()
                .map(|var| RootCandidate::from_env(var))
                .collect(),
            self.storage.fallback.clone(),
        )
    }

    pub fn worker(&self) -> WorkerConfig {
        let d = &self.delivery;
        WorkerConfig {
            retry: RetryPolicy {
                ceiling: d.retry_ceiling,
                base: Duration::from_millis(d.backoff_base_ms),
                cap: Duration::from_millis(d.backoff_cap_ms),
                jitter: Duration::from_millis(d.backoff_jitter_ms),
            },
            min_interval: Duration::from_millis(d.min_interval_ms),
            poll_interval: Duration::from_millis(d.poll_interval_ms),
            send_timeout: Duration::from_millis(d.send_timeout_ms),
        }
    }

    pub fn title_ttl(&self) -> Duration {
        Duration::from_secs(self.titles.ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = RelayConfig::default();
        let worker = config.worker();
        assert_eq!(worker.retry.ceiling, 5);
        assert_eq!(worker.retry.base, Duration::from_secs(2));
        assert_eq!(worker.retry.cap, Duration::from_secs(600));
        assert_eq!(worker.min_interval, Duration::from_secs(1));
        assert_eq!(worker.poll_interval, Duration::from_secs(5));
        assert_eq!(worker.send_timeout, Duration::from_secs(35));
        assert_eq!(config.title_ttl(), Duration::from_secs(43_200));
        assert_eq!(config.storage.candidates[0], "STORAGE_DIR");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config: RelayConfig = toml::from_str(
            r#"
            [delivery]
            retry_ceiling = 2

            [templates]
            review = "Thanks for the review of {product}!"
            "#,
        )
        .unwrap();
        assert_eq!(config.delivery.retry_ceiling, 2);
        assert_eq!(config.delivery.min_interval_ms, 1_000);
        assert_eq!(config.templates.len(), 1);
    }

    #[test]
    fn unknown_keys_rejected() {
        let err = toml::from_str::<RelayConfig>("[delivery]\nretries = 3\n").unwrap_err();
        assert!(err.to_string().contains("retries"));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = RelayConfig::default();
        config
            .apply_env(env(&[
                ("RELAYBOT_RETRY_CEILING", "9"),
                ("RELAYBOT_MIN_INTERVAL_MS", " 250 "),
                ("OZON_SELLER_CLIENT_ID", "seller-1"),
                ("OZON_API_KEY", ""),
                ("OZON_SELLER_API_KEY", "key-2"),
            ]))
            .unwrap();
        assert_eq!(config.delivery.retry_ceiling, 9);
        assert_eq!(config.delivery.min_interval_ms, 250);
        assert_eq!(config.marketplace.client_id.as_deref(), Some("seller-1"));
        assert_eq!(config.marketplace.api_key.as_deref(), Some("key-2"));
    }

    #[test]
    fn primary_credential_wins_over_seller_alias() {
        let mut config = RelayConfig::default();
        config
            .apply_env(env(&[
                ("OZON_CLIENT_ID", "primary"),
                ("OZON_SELLER_CLIENT_ID", "alias"),
            ]))
            .unwrap();
        assert_eq!(config.marketplace.client_id.as_deref(), Some("primary"));
    }

    #[test]
    fn bad_numeric_env_is_an_error() {
        let mut config = RelayConfig::default();
        let err = config
            .apply_env(env(&[("RELAYBOT_POLL_INTERVAL_MS", "soon")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv {
                var: "RELAYBOT_POLL_INTERVAL_MS",
                ..
            }
        ));
    }

    #[test]
    fn default_template_is_always_available() {
        let mut config = RelayConfig::default();
        config.ensure_default_template();
        assert!(config.templates[DEFAULT_TEMPLATE].starts_with("Спасибо"));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = RelayConfig::from_file(Path::new("/nonexistent/relaybot.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
