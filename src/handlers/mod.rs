//! HTTP request handlers.

pub mod models;
pub mod predict;

pub use models::list_models;
pub use predict::predict;
