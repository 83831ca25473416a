//! Modules d'export

pub mod geojson;

pub use self::geojson::{export_frame, frame_collection};
