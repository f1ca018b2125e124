use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Environment;

/// Install the global tracing subscriber.
///
/// `local` gets human-readable output at debug level, `dev` and `prod` emit
/// JSON lines at debug and info. `RUST_LOG` overrides the level.
pub fn init_tracing(env: Environment) {
    let default_level = match env {
        Environment::Local | Environment::Dev => "debug",
        Environment::Prod => "info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(filter);
    match env {
        Environment::Local => registry.with(tracing_subscriber::fmt::layer()).init(),
        Environment::Dev | Environment::Prod => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}
