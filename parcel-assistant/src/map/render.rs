//! Interface avec le moteur de rendu cartographique
//!
//! Le rendu lui-même appartient à la bibliothèque cartographique: on lui
//! passe l'état (vue, marqueur, parcelle, style) et elle remonte des
//! événements (déplacement, clic).

use parcel_lookup::{LngLat, ParcelGeometry};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{GestureTicket, ViewState};

/// Style des couches de la parcelle et du marqueur
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LayerStyle {
    /// Couleur de remplissage (#rrggbb)
    pub fill_color: String,
    /// Opacité du remplissage (0..1)
    pub fill_opacity: f64,
    /// Couleur du contour
    pub line_color: String,
    /// Épaisseur du contour (px)
    pub line_width: f64,
    /// Couleur du marqueur
    pub marker_color: String,
}

impl Default for LayerStyle {
    fn default() -> Self {
        Self {
            fill_color: "#2563eb".into(),
            fill_opacity: 0.3,
            line_color: "#1e40af".into(),
            line_width: 2.0,
            marker_color: "#ef4444".into(),
        }
    }
}

/// État transmis au moteur de rendu
#[derive(Debug, Clone, Copy)]
pub struct MapFrame<'a> {
    pub view: ViewState,
    pub marker: Option<LngLat>,
    pub parcel: Option<&'a ParcelGeometry>,
    pub style: &'a LayerStyle,
    /// À renvoyer avec les déplacements d'un geste commencé sur cette image
    pub gesture: GestureTicket,
}

/// Événements remontés par le moteur de rendu
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MapEvent {
    /// Déplacement ou zoom utilisateur, avec le jeton de l'image où le geste a commencé
    Move {
        view: ViewState,
        ticket: GestureTicket,
    },
    /// Clic sur la carte
    Click(LngLat),
}

/// Moteur de rendu
pub trait MapRenderer {
    fn render(&mut self, frame: &MapFrame<'_>);
}

/// Rendu textuel via `tracing`, utilisé par la CLI
#[derive(Debug, Default)]
pub struct TraceRenderer {
    frames: usize,
}

impl TraceRenderer {
    pub fn frames(&self) -> usize {
        self.frames
    }
}

impl MapRenderer for TraceRenderer {
    fn render(&mut self, frame: &MapFrame<'_>) {
        self.frames += 1;
        info!(
            lon = frame.view.longitude,
            lat = frame.view.latitude,
            zoom = frame.view.zoom,
            marker = ?frame.marker.map(|m| m.to_string()),
            parcel = ?frame.parcel.map(|p| p.id.to_string()),
            features = frame.parcel.map_or(0, |p| p.feature_count()),
            "Map frame"
        );
    }
}

/// URL d'aperçu statique de la vue (fond Mapbox), si un jeton est disponible
pub fn static_preview_url(frame: &MapFrame<'_>, token: Option<&str>) -> Option<String> {
    let token = token?;
    let view = frame.view;

    let overlay = frame
        .marker
        .map(|m| {
            format!(
                "pin-s+{}({:.6},{:.6})/",
                frame.style.marker_color.trim_start_matches('#'),
                m.lon,
                m.lat
            )
        })
        .unwrap_or_default();

    Some(format!(
        "https://api.mapbox.com/styles/v1/mapbox/streets-v12/static/{}{:.6},{:.6},{:.2}/640x400?access_token={}",
        overlay,
        view.longitude,
        view.latitude,
        view.zoom,
        urlencoding::encode(token)
    ))
}
