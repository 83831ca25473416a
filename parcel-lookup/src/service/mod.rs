//! Services géographiques externes
//!
//! Trois collaborateurs, chacun derrière un trait pour pouvoir être
//! remplacé (tests, autre juridiction):
//! - [`PointLookup`]: point → identifiant de parcelle
//! - [`GeometryLookup`]: identifiant → géométrie de la parcelle
//! - [`PlaceSearch`]: texte libre → adresse géocodée

pub mod http;

use async_trait::async_trait;
use geojson::FeatureCollection;

use crate::{LngLat, LookupError, ParcelId, Place};

pub use http::{
    GeometryServiceConfig, HttpGeometryLookup, HttpPlaceSearch, HttpPointLookup,
    PlaceSearchConfig, PointServiceConfig, ServiceConfig,
};

/// Étape 1: recherche inverse d'un point
#[async_trait]
pub trait PointLookup: Send + Sync {
    /// `Ok(None)` si aucune correspondance ou si la correspondance n'a pas d'identifiant
    async fn parcel_id(&self, point: LngLat) -> Result<Option<ParcelId>, LookupError>;
}

/// Étape 2: géométrie filtrée par identifiant
#[async_trait]
pub trait GeometryLookup: Send + Sync {
    /// La collection peut être vide (identifiant connu mais sans géométrie)
    async fn parcel_geometry(&self, id: &ParcelId) -> Result<FeatureCollection, LookupError>;
}

/// Recherche d'adresse (géocodage direct)
#[async_trait]
pub trait PlaceSearch: Send + Sync {
    async fn search(&self, text: &str) -> Result<Option<Place>, LookupError>;
}
