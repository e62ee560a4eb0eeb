//! Logging setup (spec A.2), standing in for
//! `golem_common::tracing::init_tracing_with_default_env_filter` since that
//! crate's source isn't available here: an `EnvFilter` seeded from
//! `RUST_LOG` (defaulting to `info`) plus a `fmt` layer, switched to JSON
//! output outside local development.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub fn init(environment: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);

    if environment == "dev" {
        registry.with(fmt::layer()).init();
    } else {
        registry.with(fmt::layer().json()).init();
    }
}
