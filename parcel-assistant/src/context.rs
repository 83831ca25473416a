//! Résumé textuel de la sélection courante, injecté dans les requêtes à l'assistant
//!
//! La sortie est déterministe: pour un même couple (marqueur, géométrie) la
//! chaîne produite est identique à l'octet près.

use std::fmt;

use parcel_lookup::types::scalar_to_string;
use parcel_lookup::{LngLat, ParcelGeometry};

/// Nombre de décimales des coordonnées
pub const COORDINATE_PRECISION: usize = 6;

/// Nombre maximal d'attributs repris de la première feature
pub const MAX_ATTRIBUTES: usize = 6;

/// Résumé de contexte, jamais vide
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSummary(String);

impl ContextSummary {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compile le résumé du marqueur et de la géométrie
///
/// Retourne `None` quand ni marqueur ni géométrie ne sont présents.
pub fn compile(
    marker: Option<&LngLat>,
    geometry: Option<&ParcelGeometry>,
) -> Option<ContextSummary> {
    if marker.is_none() && geometry.is_none() {
        return None;
    }

    let mut lines = Vec::new();

    if let Some(marker) = marker {
        lines.push(format!(
            "Selected location: latitude {:.prec$}, longitude {:.prec$}",
            marker.lat,
            marker.lon,
            prec = COORDINATE_PRECISION
        ));
    }

    if let Some(geometry) = geometry {
        lines.push(format!("Parcel: {}", geometry.id));
        lines.push(format!(
            "Parcel geometry type: {}",
            geometry.primary_geometry_type().unwrap_or("unknown")
        ));
        lines.push(format!("Feature count: {}", geometry.feature_count()));

        let attributes: Vec<String> = geometry
            .first_attributes()
            .into_iter()
            .flatten()
            .filter_map(|(key, value)| scalar_to_string(value).map(|v| format!("{}: {}", key, v)))
            .take(MAX_ATTRIBUTES)
            .collect();
        if !attributes.is_empty() {
            lines.push(format!("Attributes: {}", attributes.join(", ")));
        }
    }

    Some(ContextSummary(lines.join("\n")))
}
