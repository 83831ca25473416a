//! # parcel-lookup
//!
//! Résolution d'un point géographique vers la géométrie de sa parcelle.
//!
//! ## Features
//!
//! - Résolution en deux étapes (point → identifiant → géométrie)
//! - Services HTTP décrits par gabarits d'URL, remplaçables via traits
//! - Séquencement des requêtes: un résultat dépassé n'est jamais publié
//! - Échecs des services dégradés en `NotFound`, jamais propagés
//! - Types `geojson` / `geo` pour l'interopérabilité
//!
//! ## Usage
//!
//! ```rust,ignore
//! use parcel_lookup::{http_resolver, build_client, LngLat, Resolution};
//!
//! let resolver = http_resolver(&build_client(None)?, &config.services)?;
//! let query = resolver.begin(LngLat::new(-73.935242, 40.730610)?);
//! if let Some(Resolution::Found(parcel)) = resolver.run(&query).await {
//!     println!("{}: {} features", parcel.id, parcel.feature_count());
//! }
//! ```

pub mod error;
pub mod resolver;
pub mod service;
pub mod types;

pub use error::LookupError;
pub use resolver::ParcelResolver;
pub use service::http::build_client;
pub use service::{GeometryLookup, PlaceSearch, PointLookup, ServiceConfig};
pub use types::{LngLat, ParcelGeometry, ParcelId, ParcelQuery, Place, Resolution};

use std::sync::Arc;

use reqwest::Client;
use tracing::warn;

use service::{HttpGeometryLookup, HttpPlaceSearch, HttpPointLookup};

/// Construit un résolveur branché sur les services HTTP configurés
pub fn http_resolver(
    client: &Client,
    config: &ServiceConfig,
) -> Result<ParcelResolver, LookupError> {
    let points = HttpPointLookup::new(client.clone(), config.point.clone())?;
    let geometries = HttpGeometryLookup::new(client.clone(), config.geometry.clone())?;
    Ok(ParcelResolver::new(Arc::new(points), Arc::new(geometries)))
}

/// Construit la recherche d'adresse, si un endpoint est configuré
///
/// `None` aussi quand le service exige une clé et qu'aucune n'est fournie.
pub fn http_place_search(
    client: &Client,
    config: &ServiceConfig,
    api_key: Option<String>,
) -> Result<Option<Arc<dyn PlaceSearch>>, LookupError> {
    let Some(search) = &config.search else {
        return Ok(None);
    };
    if search.api_key_required && api_key.is_none() {
        warn!("Address search requires an API key, disabled");
        return Ok(None);
    }
    let search = HttpPlaceSearch::new(client.clone(), search.clone(), api_key)?;
    Ok(Some(Arc::new(search)))
}
