pub mod catalog;
pub mod loader;
pub mod model;

pub use catalog::{ModelCatalog, ModelCatalogEntry};
pub use loader::ConfigLoader;
pub use model::{AppConfig, BedrockConfig, GatewayConfig, SlackConfig, StorageConfig};
