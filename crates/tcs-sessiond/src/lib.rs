pub mod api;
pub mod baker;
pub mod config;
pub mod server;

pub use server::SessionDaemon;
