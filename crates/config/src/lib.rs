pub mod loader;
pub mod schema;

pub use {
    loader::{discover_and_load, load_config},
    schema::GatewayConfig,
};
