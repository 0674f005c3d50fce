pub mod client;
pub mod config;
pub mod input;

pub use client::{ConnectState, NetworkClient};
pub use config::ClientConfig;
pub use input::InputState;
