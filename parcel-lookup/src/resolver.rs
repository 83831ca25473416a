//! Résolution en deux étapes: point → identifiant → géométrie
//!
//! Chaque tentative suivie reçoit un numéro de séquence strictement
//! croissant. Une tentative dépassée par une plus récente est abandonnée
//! entre les étapes et son résultat n'est jamais publié: l'annulation se
//! fait au niveau de l'état applicatif, pas du transport.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::service::{GeometryLookup, PointLookup};
use crate::{LngLat, ParcelGeometry, ParcelQuery, Resolution};

/// Résolveur de parcelles
pub struct ParcelResolver {
    points: Arc<dyn PointLookup>,
    geometries: Arc<dyn GeometryLookup>,
    latest: AtomicU64,
}

impl ParcelResolver {
    pub fn new(points: Arc<dyn PointLookup>, geometries: Arc<dyn GeometryLookup>) -> Self {
        Self {
            points,
            geometries,
            latest: AtomicU64::new(0),
        }
    }

    /// Ouvre une nouvelle tentative; toutes les précédentes deviennent obsolètes
    pub fn begin(&self, point: LngLat) -> ParcelQuery {
        let request_id = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(request_id, point = %point, "Parcel query started");
        ParcelQuery { request_id, point }
    }

    /// Numéro de la dernière tentative ouverte (0 si aucune)
    pub fn latest_request(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }

    pub fn is_latest(&self, query: &ParcelQuery) -> bool {
        query.request_id == self.latest_request()
    }

    /// Résout un point sans suivi de séquence
    ///
    /// Les erreurs des services sont journalisées et rendues comme `NotFound`.
    pub async fn resolve(&self, point: LngLat) -> Resolution {
        self.lookup(point, None)
            .await
            .unwrap_or(Resolution::NotFound)
    }

    /// Exécute une tentative suivie
    ///
    /// Retourne `None` si la tentative a été dépassée: son résultat ne doit
    /// alors mettre à jour aucun état visible.
    pub async fn run(&self, query: &ParcelQuery) -> Option<Resolution> {
        let resolution = self.lookup(query.point, Some(query)).await?;
        if !self.is_latest(query) {
            debug!(request_id = query.request_id, "Discarding superseded parcel result");
            return None;
        }
        Some(resolution)
    }

    async fn lookup(&self, point: LngLat, query: Option<&ParcelQuery>) -> Option<Resolution> {
        let request_id = query.map(|q| q.request_id);

        // Étape 1: point → identifiant
        let id = match self.points.parcel_id(point).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                info!(?request_id, point = %point, "No parcel at point");
                return Some(Resolution::NotFound);
            }
            Err(e) => {
                warn!(?request_id, point = %point, error = %e, "Point lookup failed");
                return Some(Resolution::NotFound);
            }
        };

        if let Some(query) = query {
            if !self.is_latest(query) {
                debug!(
                    request_id = query.request_id,
                    id = %id,
                    "Superseded before geometry lookup"
                );
                return None;
            }
        }

        // Étape 2: identifiant → géométrie
        match self.geometries.parcel_geometry(&id).await {
            Ok(collection) if collection.features.is_empty() => {
                info!(?request_id, id = %id, "Identifier without geometry");
                Some(Resolution::NotFound)
            }
            Ok(collection) => {
                info!(
                    ?request_id,
                    id = %id,
                    features = collection.features.len(),
                    "Parcel resolved"
                );
                Some(Resolution::Found(ParcelGeometry::new(id, collection)))
            }
            Err(e) => {
                warn!(?request_id, id = %id, error = %e, "Geometry lookup failed");
                Some(Resolution::NotFound)
            }
        }
    }
}
