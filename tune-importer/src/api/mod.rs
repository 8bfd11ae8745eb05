//! HTTP and WebSocket handlers for tune-importer

pub mod health;
pub mod tracks;
pub mod ws;

pub use health::health_routes;
pub use tracks::track_routes;
pub use ws::ws_handler;
