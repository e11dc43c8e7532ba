pub mod config;
mod http_layers;
pub mod metrics;
#[allow(clippy::module_inception)]
pub mod server;
pub(self) mod session;
pub mod state;
mod whatsnew_routes;

pub use config::ServerConfig;
pub use http_layers::*;
pub use server::{make_app, run_server};
pub(self) use whatsnew_routes::make_whatsnew_routes;
