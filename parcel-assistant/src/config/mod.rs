//! Configuration du système
//!
//! Deux sources:
//! - un document JSON (preset embarqué ou fichier) pour les endpoints et le style
//! - l'environnement pour les clés d'API, toutes optionnelles

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use parcel_lookup::ServiceConfig;
use serde::{Deserialize, Serialize};

use crate::map::LayerStyle;

/// Modèle utilisé quand `OPENAI_MODEL` est absent
pub const DEFAULT_ASSISTANT_MODEL: &str = "gpt-4.1-mini";

/// Endpoint utilisé quand `OPENAI_BASE_URL` est absent
pub const DEFAULT_ASSISTANT_BASE_URL: &str = "https://api.openai.com";

/// Configuration principale
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Services de résolution et de recherche d'adresse
    pub services: ServiceConfig,

    /// Style des couches (parcelle, marqueur)
    #[serde(default)]
    pub style: LayerStyle,
}

impl Config {
    /// Charge une configuration depuis un fichier
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse config JSON")
    }

    /// Charge une configuration depuis un preset embarqué
    pub fn from_preset(preset: &str) -> Result<Self> {
        match preset {
            "nyc" => Self::load_embedded(include_str!("presets/nyc.json")),
            _ => anyhow::bail!("Unknown preset: {}. Use: nyc", preset),
        }
    }

    /// Nom de preset ou chemin vers un fichier JSON
    pub fn resolve(name_or_path: &str) -> Result<Self> {
        let path = Path::new(name_or_path);
        if path.extension().is_some_and(|ext| ext == "json") || path.exists() {
            Self::load(path)
        } else {
            Self::from_preset(name_or_path)
        }
    }

    fn load_embedded(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse embedded config")
    }
}

/// Clés et réglages lus dans l'environnement
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    /// Jeton du fond de carte (`MAP_ACCESS_TOKEN`)
    pub map_token: Option<String>,

    /// Clé de la recherche d'adresse (`PLACES_API_KEY`)
    pub places_key: Option<String>,

    /// Clé de l'assistant (`OPENAI_API_KEY`)
    pub assistant_key: Option<String>,

    /// Modèle de l'assistant (`OPENAI_MODEL`)
    pub assistant_model: String,

    /// Base de l'API de l'assistant (`OPENAI_BASE_URL`)
    pub assistant_base_url: String,

    /// Timeout client HTTP (`HTTP_TIMEOUT_SECS`); aucun par défaut
    pub request_timeout: Option<Duration>,
}

impl Credentials {
    /// Charge les réglages depuis les variables d'environnement
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Charge les réglages depuis une source de variables arbitraire
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Self {
            map_token: var("MAP_ACCESS_TOKEN"),
            places_key: var("PLACES_API_KEY"),
            assistant_key: var("OPENAI_API_KEY"),
            assistant_model: var("OPENAI_MODEL")
                .unwrap_or_else(|| DEFAULT_ASSISTANT_MODEL.to_string()),
            assistant_base_url: var("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_ASSISTANT_BASE_URL.to_string()),
            request_timeout: var("HTTP_TIMEOUT_SECS")
                .and_then(|s| s.trim().parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        }
    }

    /// Avertissements persistants pour les fonctionnalités désactivées
    pub fn notices(&self, services: &ServiceConfig) -> Vec<ConfigNotice> {
        let mut notices = Vec::new();
        let search_needs_key = services
            .search
            .as_ref()
            .is_some_and(|search| search.api_key_required);
        if search_needs_key && self.places_key.is_none() {
            notices.push(ConfigNotice {
                feature: "address search",
                variable: "PLACES_API_KEY",
            });
        }
        if self.map_token.is_none() {
            notices.push(ConfigNotice {
                feature: "map preview",
                variable: "MAP_ACCESS_TOKEN",
            });
        }
        if self.assistant_key.is_none() {
            notices.push(ConfigNotice {
                feature: "assistant",
                variable: "OPENAI_API_KEY",
            });
        }
        notices
    }
}

/// Fonctionnalité désactivée faute de configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigNotice {
    pub feature: &'static str,
    pub variable: &'static str,
}

impl std::fmt::Display for ConfigNotice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} disabled: set {} to enable it", self.feature, self.variable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn credentials(vars: &[(&str, &str)]) -> Credentials {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Credentials::from_lookup(|name| vars.get(name).cloned())
    }

    fn nyc() -> ServiceConfig {
        Config::from_preset("nyc").unwrap().services
    }

    #[test]
    fn test_nyc_preset_loads() {
        let config = Config::from_preset("nyc").unwrap();
        assert!(config.services.point.url.contains("{lat}"));
        assert_eq!(config.services.point.id_path, "properties.addendum.pad.bbl");
        assert!(config.services.geometry.url.contains("{id}"));
        assert!(config.services.search.is_some());
        assert_eq!(config.style.line_width, 2.0);
    }

    #[test]
    fn test_unknown_preset() {
        assert!(Config::from_preset("paris").is_err());
    }

    #[test]
    fn test_style_defaults_when_absent() {
        let json = r#"{
            "services": {
                "point": {"url": "http://x/r?lat={lat}&lon={lon}", "id_path": "properties.id"},
                "geometry": {"url": "http://x/g?id={id}"}
            }
        }"#;
        let path = std::env::temp_dir().join("parcel_assistant_config_test.json");
        std::fs::write(&path, json).unwrap();

        let config = Config::resolve(path.to_str().unwrap()).unwrap();
        assert!(config.services.search.is_none());
        assert_eq!(config.style, LayerStyle::default());

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_credentials_defaults() {
        let creds = credentials(&[]);
        assert_eq!(creds.assistant_model, DEFAULT_ASSISTANT_MODEL);
        assert_eq!(creds.assistant_base_url, DEFAULT_ASSISTANT_BASE_URL);
        assert!(creds.assistant_key.is_none());
        assert!(creds.request_timeout.is_none());
        assert_eq!(creds.notices(&nyc()).len(), 2);
    }

    #[test]
    fn test_credentials_from_vars() {
        let creds = credentials(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_MODEL", "gpt-test"),
            ("MAP_ACCESS_TOKEN", "pk.test"),
            ("HTTP_TIMEOUT_SECS", "20"),
            ("PLACES_API_KEY", "  "),
        ]);
        assert_eq!(creds.assistant_key.as_deref(), Some("sk-test"));
        assert_eq!(creds.assistant_model, "gpt-test");
        assert_eq!(creds.request_timeout, Some(Duration::from_secs(20)));
        assert!(creds.places_key.is_none());
        assert!(creds.notices(&nyc()).is_empty());
    }

    #[test]
    fn test_notice_message() {
        let creds = credentials(&[("MAP_ACCESS_TOKEN", "pk.test")]);
        let notices = creds.notices(&nyc());
        assert_eq!(notices.len(), 1);
        assert_eq!(
            notices[0].to_string(),
            "assistant disabled: set OPENAI_API_KEY to enable it"
        );
    }

    #[test]
    fn test_search_key_notice_when_required() {
        let mut services = nyc();
        if let Some(search) = services.search.as_mut() {
            search.api_key_required = true;
        }

        let creds = credentials(&[("MAP_ACCESS_TOKEN", "pk.test"), ("OPENAI_API_KEY", "sk")]);
        let notices = creds.notices(&services);
        assert_eq!(notices.len(), 1);
        assert_eq!(
            notices[0].to_string(),
            "address search disabled: set PLACES_API_KEY to enable it"
        );

        let creds = credentials(&[
            ("MAP_ACCESS_TOKEN", "pk.test"),
            ("OPENAI_API_KEY", "sk"),
            ("PLACES_API_KEY", "key"),
        ]);
        assert!(creds.notices(&services).is_empty());
    }
}
