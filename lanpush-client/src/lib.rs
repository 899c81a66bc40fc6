//! lanpush client library: a connected, registered pair of sessions
//! with a delivery stream for inbound messages.

pub mod client;

pub use client::PushClient;
