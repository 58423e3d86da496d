//! HTTP surface of the decompilation job service.
pub mod config;
pub mod error;
pub mod logging;
pub mod routes;
pub mod state;

pub use config::Args;
pub use error::{ApiError, ErrorResponse};
pub use routes::api_routes;
pub use state::AppState;
