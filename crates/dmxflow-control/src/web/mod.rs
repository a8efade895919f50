//! Web API
//!
//! REST facade for the browser console: show CRUD, direct channel control,
//! playback, settings. JSON in, JSON out, wrapped in an
//! `{success, data?, error?}` envelope; the error taxonomy maps onto
//! 400/404/409/500.

pub mod handlers;
pub mod routes;
pub mod server;

pub use handlers::{ApiError, ApiResponse};
pub use routes::build_router;
pub use server::WebServer;
