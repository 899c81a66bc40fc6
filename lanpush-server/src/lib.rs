//! lanpush server library: configuration plus the server assembly
//! that ties channels, router, and heartbeat together.

pub mod config;
pub mod server;
