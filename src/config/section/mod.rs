//! Configuration section definitions.

mod build;
mod components;
mod development;
mod server;

pub use build::{BuildConfig, DEFAULT_ALLOWED_COMMANDS};
pub use components::ComponentsConfig;
pub use development::DevelopmentConfig;
pub use server::ServerConfig;
