//! # parcel-assistant
//!
//! Sélection d'un lieu (adresse ou clic), résolution de sa parcelle et
//! conversation avec un assistant alimenté par la sélection courante.
//!
//! ## Features
//!
//! - État de carte centralisé (vue, marqueur, parcelle) avec un seul point d'écriture
//! - Résolution de parcelle asynchrone, résultats dépassés ignorés
//! - Résumé de contexte déterministe injecté dans les requêtes
//! - Session de conversation sérialisée avec fenêtre d'historique bornée
//! - Export GeoJSON de la carte courante
//! - CLI simple
//!
//! ## Usage CLI
//!
//! ```bash
//! # Parcelle sous un point
//! parcel-assistant resolve --lat 40.730610 --lon -73.935242 --output parcel.geojson
//!
//! # Recherche d'adresse
//! parcel-assistant search "120 Broadway"
//!
//! # Conversation interactive
//! parcel-assistant chat --lat 40.730610 --lon -73.935242
//! ```

pub mod app;
pub mod config;
pub mod context;
pub mod conversation;
pub mod export;
pub mod map;

pub use app::App;
pub use config::{Config, Credentials};
pub use context::{compile, ContextSummary};
pub use conversation::{ConversationSession, SessionStatus};
pub use map::{MapCoordinator, ViewState};
