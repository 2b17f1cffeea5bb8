//! HTTP and WebSocket front end for the price pipeline.

pub mod app;
pub mod error;
pub mod routes;
pub mod state;

pub use app::create_app;
pub use error::{AppError, AppResult};
pub use state::AppState;
