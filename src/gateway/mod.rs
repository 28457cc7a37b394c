pub mod server;

pub use server::{build_app, shutdown_signal, GatewayServer, ServerState};
