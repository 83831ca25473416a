//! Coordinateur de l'état de la carte
//!
//! Seul propriétaire de la vue, du marqueur et de la géométrie de parcelle.
//! Les dépendants lisent des instantanés et écrivent uniquement par les
//! méthodes ci-dessous; chaque écriture incrémente une révision publiée sur
//! un canal `watch` pour déclencher le rendu.
//!
//! Règles de synchronisation:
//! - un recentrage programmatique (sélection d'adresse) écrase immédiatement
//!   la vue et le marqueur;
//! - un geste utilisateur commencé avant ce recentrage et terminé après est
//!   ignoré; les gestes suivants reprennent la main. Chaque image transmise
//!   au rendu porte un [`GestureTicket`] que le rendu renvoie avec ses
//!   déplacements;
//! - seul le résultat de la dernière requête de parcelle est appliqué.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use parcel_lookup::{LngLat, ParcelGeometry, ParcelQuery, ParcelResolver, Place, Resolution};
use tokio::sync::watch;
use tracing::debug;

use super::{LayerStyle, MapEvent, MapFrame, ViewState, RECENTER_ZOOM};
use crate::context::{self, ContextSummary};

/// Instantané de l'état de la carte
#[derive(Debug, Clone)]
pub struct MapSnapshot {
    pub view: ViewState,
    pub marker: Option<LngLat>,
    pub parcel: Option<Arc<ParcelGeometry>>,
    /// Requête de parcelle en cours
    pub pending: Option<ParcelQuery>,
    /// Jeton des gestes commencés sur cet état
    pub gesture: GestureTicket,
    pub revision: u64,
}

impl MapSnapshot {
    pub fn frame<'a>(&'a self, style: &'a LayerStyle) -> MapFrame<'a> {
        MapFrame {
            view: self.view,
            marker: self.marker,
            parcel: self.parcel.as_deref(),
            style,
            gesture: self.gesture,
        }
    }

    /// Résumé de contexte pour l'assistant
    pub fn context(&self) -> Option<ContextSummary> {
        context::compile(self.marker.as_ref(), self.parcel.as_deref())
    }
}

/// Jeton remis au début d'un geste utilisateur
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GestureTicket {
    epoch: u64,
}

#[derive(Debug, Default)]
struct MapState {
    view: ViewState,
    marker: Option<LngLat>,
    parcel: Option<Arc<ParcelGeometry>>,
    pending: Option<ParcelQuery>,
    /// Incrémenté à chaque recentrage programmatique
    recenter_epoch: u64,
}

/// Coordinateur vue / marqueur / parcelle
pub struct MapCoordinator {
    state: Mutex<MapState>,
    resolver: ParcelResolver,
    revision: watch::Sender<u64>,
}

impl MapCoordinator {
    pub fn new(resolver: ParcelResolver) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            state: Mutex::new(MapState::default()),
            resolver,
            revision,
        }
    }

    /// Abonnement aux changements d'état (révision)
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn snapshot(&self) -> MapSnapshot {
        let state = self.lock();
        MapSnapshot {
            view: state.view,
            marker: state.marker,
            parcel: state.parcel.clone(),
            pending: state.pending,
            gesture: GestureTicket {
                epoch: state.recenter_epoch,
            },
            revision: *self.revision.borrow(),
        }
    }

    pub fn view(&self) -> ViewState {
        self.lock().view
    }

    pub fn marker(&self) -> Option<LngLat> {
        self.lock().marker
    }

    pub fn parcel(&self) -> Option<Arc<ParcelGeometry>> {
        self.lock().parcel.clone()
    }

    /// Résumé de contexte de l'état courant
    pub fn context(&self) -> Option<ContextSummary> {
        self.snapshot().context()
    }

    /// Déplacement continu: la dernière écriture gagne
    pub fn on_move(&self, view: ViewState) {
        self.lock().view = view;
        self.bump();
    }

    /// Début d'un geste dont la fin sera appliquée plus tard
    pub fn begin_gesture(&self) -> GestureTicket {
        GestureTicket {
            epoch: self.lock().recenter_epoch,
        }
    }

    /// Fin d'un geste; ignorée si un recentrage a eu lieu entre-temps
    pub fn finish_gesture(&self, ticket: GestureTicket, view: ViewState) -> bool {
        {
            let mut state = self.lock();
            if state.recenter_epoch != ticket.epoch {
                debug!(
                    ticket = ticket.epoch,
                    current = state.recenter_epoch,
                    "Gesture superseded by recenter"
                );
                return false;
            }
            state.view = view;
        }
        self.bump();
        true
    }

    /// Recentrage sur une adresse: vue et marqueur écrasés, nouvelle requête ouverte
    pub fn recenter(&self, place: &Place) -> ParcelQuery {
        let query = {
            let mut state = self.lock();
            state.view = ViewState::centered_on(place.location, RECENTER_ZOOM);
            state.marker = Some(place.location);
            state.recenter_epoch += 1;
            self.begin_query(&mut state, place.location)
        };
        debug!(label = %place.label, request_id = query.request_id, "Recentered on place");
        self.bump();
        query
    }

    /// Clic sur la carte: le marqueur bouge, la vue reste en place
    pub fn click(&self, point: LngLat) -> ParcelQuery {
        let query = {
            let mut state = self.lock();
            state.marker = Some(point);
            self.begin_query(&mut state, point)
        };
        self.bump();
        query
    }

    /// Efface marqueur et parcelle; une requête en cours ne sera pas appliquée
    pub fn clear_selection(&self) {
        {
            let mut state = self.lock();
            state.marker = None;
            state.parcel = None;
            state.pending = None;
        }
        self.bump();
    }

    /// Exécute une requête et applique son résultat si elle est toujours la dernière
    pub async fn resolve(&self, query: ParcelQuery) -> bool {
        let resolution = self.resolver.run(&query).await;
        self.commit(&query, resolution)
    }

    /// Sélection d'adresse complète (recentrage + résolution)
    pub async fn select_place(&self, place: &Place) -> bool {
        let query = self.recenter(place);
        self.resolve(query).await
    }

    /// Sélection par clic complète (marqueur + résolution)
    pub async fn select_point(&self, point: LngLat) -> bool {
        let query = self.click(point);
        self.resolve(query).await
    }

    /// Traite un événement remonté par le moteur de rendu
    pub async fn handle_event(&self, event: MapEvent) -> bool {
        match event {
            MapEvent::Move { view, ticket } => self.finish_gesture(ticket, view),
            MapEvent::Click(point) => self.select_point(point).await,
        }
    }

    fn begin_query(&self, state: &mut MapState, point: LngLat) -> ParcelQuery {
        let query = self.resolver.begin(point);
        state.parcel = None;
        state.pending = Some(query);
        query
    }

    fn commit(&self, query: &ParcelQuery, resolution: Option<Resolution>) -> bool {
        {
            let mut state = self.lock();
            let is_pending = state
                .pending
                .is_some_and(|pending| pending.request_id == query.request_id);
            let Some(resolution) = resolution.filter(|_| is_pending) else {
                debug!(request_id = query.request_id, "Stale parcel result ignored");
                return false;
            };
            state.pending = None;
            state.parcel = resolution.into_geometry().map(Arc::new);
        }
        self.bump();
        true
    }

    fn lock(&self) -> MutexGuard<'_, MapState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bump(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }
}
