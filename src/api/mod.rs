pub mod handlers;
pub mod models;
pub mod webhook;

pub use handlers::AppState;
