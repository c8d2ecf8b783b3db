pub mod caption;
pub mod compose;
pub mod config;
pub mod error;
pub mod models;
pub mod normalize;
pub mod postprocess;
pub mod routes;
pub mod upstream;

pub use routes::{build_router, AppState};
