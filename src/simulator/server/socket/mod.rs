pub mod client;
pub mod protocol;
pub mod server;

pub use client::CfuClient;
pub use protocol::*;
pub use server::CfuServer;
