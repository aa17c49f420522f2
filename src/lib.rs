pub mod app;
pub mod assets;
pub mod auth;
pub mod config;
pub mod delta;
pub mod errors;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod scheduler;
pub mod state;
pub mod stats;
pub mod ui;
pub mod warehouse;

pub use app::router;
pub use config::Settings;
pub use scheduler::{RefreshScheduler, Refresher};
pub use state::AppState;
