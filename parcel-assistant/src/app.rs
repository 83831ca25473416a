//! Assemblage: configuration → services → coordinateur de carte + session
//!
//! Les fonctionnalités sans configuration sont désactivées, jamais fatales.

use std::sync::Arc;

use anyhow::{Context, Result};
use parcel_lookup::{build_client, http_place_search, http_resolver, Place, PlaceSearch};
use tracing::{info, warn};

use crate::config::{Config, ConfigNotice, Credentials};
use crate::conversation::{ConversationSession, ConversationTurn, OpenAiBackend};
use crate::map::{static_preview_url, MapCoordinator};

/// Application complète
pub struct App {
    pub config: Config,
    pub credentials: Credentials,
    pub map: MapCoordinator,
    places: Option<Arc<dyn PlaceSearch>>,
    session: Option<ConversationSession>,
}

impl App {
    pub fn new(config: Config, credentials: Credentials) -> Result<Self> {
        let client = build_client(credentials.request_timeout)
            .context("Failed to build HTTP client")?;

        let resolver = http_resolver(&client, &config.services)
            .context("Invalid parcel service configuration")?;
        let places = http_place_search(&client, &config.services, credentials.places_key.clone())
            .context("Invalid address search configuration")?;

        let session = match &credentials.assistant_key {
            Some(key) => {
                let backend = OpenAiBackend::new(
                    key.clone(),
                    credentials.assistant_base_url.clone(),
                    credentials.request_timeout,
                )
                .context("Failed to build assistant client")?;
                Some(ConversationSession::new(
                    Arc::new(backend),
                    credentials.assistant_model.clone(),
                ))
            }
            None => None,
        };

        info!(
            assistant = session.is_some(),
            address_search = places.is_some(),
            map_preview = credentials.map_token.is_some(),
            "Application ready"
        );

        Ok(Self {
            map: MapCoordinator::new(resolver),
            config,
            credentials,
            places,
            session,
        })
    }

    /// Avertissements de configuration à afficher en permanence
    pub fn notices(&self) -> Vec<ConfigNotice> {
        self.credentials.notices(&self.config.services)
    }

    /// Session de conversation, si l'assistant est configuré
    pub fn session(&self) -> Option<&ConversationSession> {
        self.session.as_ref()
    }

    /// Recherche une adresse; `None` si rien ne correspond ou si la recherche échoue
    pub async fn search_place(&self, text: &str) -> Result<Option<Place>> {
        let Some(places) = &self.places else {
            anyhow::bail!("Address search is not configured");
        };
        match places.search(text).await {
            Ok(place) => Ok(place),
            Err(e) => {
                warn!(text, error = %e, "Address search failed");
                Ok(None)
            }
        }
    }

    /// Recherche une adresse puis recentre la carte dessus
    pub async fn goto_address(&self, text: &str) -> Result<Option<Place>> {
        let Some(place) = self.search_place(text).await? else {
            return Ok(None);
        };
        self.map.select_place(&place).await;
        Ok(Some(place))
    }

    /// Envoie un message à l'assistant avec le contexte courant de la carte
    pub async fn ask(&self, prompt: &str) -> Result<ConversationTurn> {
        let Some(session) = &self.session else {
            anyhow::bail!("Assistant is not configured (set OPENAI_API_KEY)");
        };
        let context = self.map.context();
        Ok(session.send(prompt, context.as_ref()).await?)
    }

    /// URL d'aperçu statique de la carte courante
    pub fn preview_url(&self) -> Option<String> {
        let snapshot = self.map.snapshot();
        static_preview_url(
            &snapshot.frame(&self.config.style),
            self.credentials.map_token.as_deref(),
        )
    }
}
