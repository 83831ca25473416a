//! Vue de la carte (centre + zoom)

use parcel_lookup::LngLat;
use serde::{Deserialize, Serialize};

pub const MIN_ZOOM: f64 = 0.0;
pub const MAX_ZOOM: f64 = 22.0;

/// Zoom appliqué lors d'un recentrage sur une adresse
pub const RECENTER_ZOOM: f64 = 17.0;

/// Centre et zoom de la carte
///
/// Les valeurs sont toujours ramenées dans leur domaine: longitude
/// [-180, 180], latitude [-90, 90], zoom [0, 22].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    pub longitude: f64,
    pub latitude: f64,
    pub zoom: f64,
}

impl ViewState {
    /// Vue monde, au démarrage de la session
    pub const WORLD: ViewState = ViewState {
        longitude: 0.0,
        latitude: 20.0,
        zoom: 1.0,
    };

    /// Crée une vue bornée; une composante non finie reprend la valeur monde
    pub fn new(longitude: f64, latitude: f64, zoom: f64) -> Self {
        Self {
            longitude: bounded(longitude, -180.0, 180.0, Self::WORLD.longitude),
            latitude: bounded(latitude, -90.0, 90.0, Self::WORLD.latitude),
            zoom: bounded(zoom, MIN_ZOOM, MAX_ZOOM, Self::WORLD.zoom),
        }
    }

    /// Vue centrée sur un point
    pub fn centered_on(point: LngLat, zoom: f64) -> Self {
        Self::new(point.lon, point.lat, zoom)
    }

    pub fn center(&self) -> LngLat {
        LngLat {
            lon: self.longitude,
            lat: self.latitude,
        }
    }
}

impl Default for ViewState {
    fn default() -> Self {
        Self::WORLD
    }
}

fn bounded(value: f64, min: f64, max: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        fallback
    }
}
