//! Runtime configuration
//!
//! Environment variables (optionally from `.env`) plus an optional JSON file
//! named by `LEDGER_CONFIG` for the structured parts: routing tables,
//! templates and category rules.

use crate::classifier::{CategoryClassifier, CategoryRule, DEFAULT_CATEGORY};
use crate::engine::EngineSettings;
use crate::error::LedgerError;
use crate::models::Sender;
use crate::routing::{RoutingPolicy, RoutingStrategy};
use crate::templates::TemplateRegistry;
use crate::Result;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_STATE_TTL_SECS: u64 = 1800;
pub const DEFAULT_EXTERNAL_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone)]
pub struct Config {
    pub allowed_senders: HashSet<Sender>,
    pub routing: RoutingStrategy,
    pub templates: TemplateRegistry,
    pub category_rules: Vec<CategoryRule>,
    pub default_category: String,

    /// `None` keeps abandoned flows forever.
    pub state_ttl: Option<Duration>,
    pub external_timeout: Duration,

    /// Bridge endpoints; unset means in-memory sink / no uploads.
    pub sink_url: Option<String>,
    pub blob_url: Option<String>,

    pub port: u16,
}

/// Shape of the `LEDGER_CONFIG` file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    allowed_senders: Option<Vec<Sender>>,
    routing: Option<RoutingStrategy>,
    templates: Option<TemplateRegistry>,
    category_rules: Option<Vec<CategoryRule>>,
    default_category: Option<String>,
}

impl Config {
    /// Loads `.env` if present, then reads the process environment.
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let file = match var("LEDGER_CONFIG") {
            Some(path) => read_file_config(Path::new(&path))?,
            None => FileConfig::default(),
        };

        let mut allowed_senders: HashSet<Sender> = parse_csv(var("LEDGER_ALLOWED_SENDERS"))
            .into_iter()
            .map(Sender::from)
            .collect();
        if let Some(senders) = file.allowed_senders {
            allowed_senders.extend(senders);
        }
        if allowed_senders.is_empty() {
            return Err(LedgerError::Config(
                "LEDGER_ALLOWED_SENDERS (or allowed_senders in LEDGER_CONFIG) is required"
                    .to_string(),
            ));
        }

        let templates = match file.templates {
            Some(mut registry) => {
                registry.build_index()?;
                registry
            }
            None => TemplateRegistry::default(),
        };

        let category_rules = file
            .category_rules
            .unwrap_or_else(|| CategoryClassifier::default().rules().to_vec());

        let state_ttl = match parse_u64("LEDGER_STATE_TTL_SECS", var("LEDGER_STATE_TTL_SECS"))? {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => Some(Duration::from_secs(DEFAULT_STATE_TTL_SECS)),
        };

        let external_timeout = Duration::from_secs(
            parse_u64(
                "LEDGER_EXTERNAL_TIMEOUT_SECS",
                var("LEDGER_EXTERNAL_TIMEOUT_SECS"),
            )?
            .unwrap_or(DEFAULT_EXTERNAL_TIMEOUT_SECS)
            .max(1),
        );

        let port = match var("PORT").or_else(|| var("API_PORT")) {
            Some(raw) => raw
                .parse()
                .map_err(|_| LedgerError::Config(format!("invalid port: {}", raw)))?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            allowed_senders,
            routing: file.routing.unwrap_or_default(),
            templates,
            category_rules,
            default_category: file
                .default_category
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            state_ttl,
            external_timeout,
            sink_url: var("LEDGER_SINK_URL"),
            blob_url: var("LEDGER_BLOB_URL"),
            port,
        })
    }

    /// Validates the routing tables and assembles what the engine needs.
    pub fn engine_settings(&self) -> Result<EngineSettings> {
        Ok(EngineSettings {
            allowed_senders: self.allowed_senders.clone(),
            templates: self.templates.clone(),
            classifier: CategoryClassifier::new(
                self.category_rules.clone(),
                self.default_category.clone(),
            ),
            routing: RoutingPolicy::new(self.routing.clone())?,
            external_timeout: self.external_timeout,
        })
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw)
        .map_err(|e| LedgerError::Config(format!("invalid {}: {}", path.display(), e)))
}

fn parse_csv(raw: Option<String>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

fn parse_u64(key: &str, raw: Option<String>) -> Result<Option<u64>> {
    raw.map(|v| {
        v.parse()
            .map_err(|_| LedgerError::Config(format!("{} must be a whole number, got {}", key, v)))
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    fn write_config_file(name: &str, json: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}.json", name, uuid::Uuid::new_v4()));
        std::fs::write(&path, json).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let config =
            Config::from_lookup(lookup(&[("LEDGER_ALLOWED_SENDERS", "whatsapp:+1, +2")])).unwrap();

        assert!(config.allowed_senders.contains(&Sender::new("+1")));
        assert!(config.allowed_senders.contains(&Sender::new("+2")));
        assert_eq!(config.routing, RoutingStrategy::default());
        assert_eq!(config.state_ttl, Some(Duration::from_secs(1800)));
        assert_eq!(config.external_timeout, Duration::from_secs(15));
        assert_eq!(config.port, 5000);
        assert!(config.sink_url.is_none());
        assert_eq!(config.default_category, "Otros");
        assert!(config.engine_settings().is_ok());
    }

    #[test]
    fn test_allow_list_is_required() {
        let result = Config::from_lookup(lookup(&[("LEDGER_ALLOWED_SENDERS", " , ")]));
        assert!(matches!(result, Err(LedgerError::Config(_))));
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("LEDGER_ALLOWED_SENDERS", "+1"),
            ("LEDGER_STATE_TTL_SECS", "0"),
            ("LEDGER_EXTERNAL_TIMEOUT_SECS", "3"),
            ("LEDGER_SINK_URL", "http://bridge:9000"),
            ("API_PORT", "8081"),
        ]))
        .unwrap();

        assert_eq!(config.state_ttl, None);
        assert_eq!(config.external_timeout, Duration::from_secs(3));
        assert_eq!(config.sink_url.as_deref(), Some("http://bridge:9000"));
        assert_eq!(config.port, 8081);
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        let result = Config::from_lookup(lookup(&[
            ("LEDGER_ALLOWED_SENDERS", "+1"),
            ("LEDGER_STATE_TTL_SECS", "half an hour"),
        ]));
        assert!(matches!(result, Err(LedgerError::Config(_))));

        let result = Config::from_lookup(lookup(&[
            ("LEDGER_ALLOWED_SENDERS", "+1"),
            ("PORT", "http"),
        ]));
        assert!(matches!(result, Err(LedgerError::Config(_))));
    }

    #[test]
    fn test_file_config_sets_routing_and_rules() {
        let path = write_config_file(
            "ledger-routing",
            r#"{
                "allowed_senders": ["+9"],
                "routing": {
                    "strategy": "prefix_coded",
                    "table": [{"prefix": "CASA", "destination": "GASTOS_CASA"}]
                },
                "category_rules": [{"label": "Mascotas", "keywords": ["veterinario"]}],
                "default_category": "Varios"
            }"#,
        );

        let config = Config::from_lookup(lookup(&[
            ("LEDGER_ALLOWED_SENDERS", "+1"),
            ("LEDGER_CONFIG", path.to_str().unwrap()),
        ]))
        .unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.allowed_senders.len(), 2);
        assert!(matches!(config.routing, RoutingStrategy::PrefixCoded { .. }));

        let settings = config.engine_settings().unwrap();
        assert!(!settings.routing.is_form_driven());
        assert_eq!(settings.classifier.classify("veterinario 40€"), "Mascotas");
        assert_eq!(settings.classifier.classify("taxi"), "Varios");
    }

    #[test]
    fn test_file_templates_are_validated() {
        let path = write_config_file(
            "ledger-templates",
            r#"{
                "templates": {
                    "templates": [],
                    "commands": [{"token": "X", "kind": "form", "template": "MISSING"}]
                }
            }"#,
        );

        let result = Config::from_lookup(lookup(&[
            ("LEDGER_ALLOWED_SENDERS", "+1"),
            ("LEDGER_CONFIG", path.to_str().unwrap()),
        ]));
        std::fs::remove_file(&path).ok();

        assert!(matches!(result, Err(LedgerError::Config(_))));
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let result = Config::from_lookup(lookup(&[
            ("LEDGER_ALLOWED_SENDERS", "+1"),
            ("LEDGER_CONFIG", "/nonexistent/ledger.json"),
        ]));
        assert!(matches!(result, Err(LedgerError::Io(_))));
    }
}
