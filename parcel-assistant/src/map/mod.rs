//! État de la carte et interface de rendu

pub mod coordinator;
pub mod render;
pub mod view;

pub use coordinator::{GestureTicket, MapCoordinator, MapSnapshot};
pub use render::{static_preview_url, LayerStyle, MapEvent, MapFrame, MapRenderer, TraceRenderer};
pub use view::{ViewState, RECENTER_ZOOM};
