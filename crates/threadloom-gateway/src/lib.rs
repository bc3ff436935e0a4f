pub mod bootstrap;
pub mod router;
pub mod server;
pub mod state;

pub use server::GatewayServer;
pub use state::{AppState, SharedState};
