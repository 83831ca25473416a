//! Types d'erreurs pour le crate parcel-lookup

use thiserror::Error;

/// Erreurs pouvant survenir lors d'une résolution de parcelle
#[derive(Debug, Error)]
pub enum LookupError {
    /// Erreur de transport HTTP (connexion, timeout, corps illisible)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Réponse non-2xx d'un service
    #[error("{service} service returned {status}")]
    Status { service: &'static str, status: u16 },

    /// Corps de réponse inexploitable
    #[error("Invalid response from {service}: {reason}")]
    InvalidResponse {
        service: &'static str,
        reason: String,
    },

    /// Coordonnées hors domaine WGS84
    #[error("Invalid coordinates: longitude {lon}, latitude {lat}")]
    InvalidCoordinates { lon: f64, lat: f64 },

    /// Identifiant de parcelle refusé avant la requête de géométrie
    #[error("Invalid parcel identifier: {0}")]
    InvalidIdentifier(String),

    /// Gabarit d'URL sans le paramètre attendu
    #[error("URL template {template:?} is missing placeholder {placeholder}")]
    Template {
        template: String,
        placeholder: &'static str,
    },

    /// Motif d'identifiant invalide dans la configuration
    #[error("Invalid identifier pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

impl LookupError {
    /// Crée une erreur de réponse invalide avec contexte
    pub fn invalid_response(service: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            service,
            reason: reason.into(),
        }
    }
}
