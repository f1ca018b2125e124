pub mod config;
pub mod logging;
pub mod routes;
pub mod state;

pub use config::{Config, ConfigError, Environment};
pub use logging::init_tracing;
pub use routes::create_router;
pub use state::AppState;
