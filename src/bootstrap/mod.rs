mod gateway;
mod server;
mod state;

pub use gateway::{Gateway, GatewayConfig, ServerError};
pub use server::Server;
pub use state::LifecycleState;
