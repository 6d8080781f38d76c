//! The HAP IP transport: encrypted session framing, HTTP/1.1
//! request/response and event-frame parsing, and the IP client.

pub mod client;
pub mod connection;
pub mod event;
pub mod framing;
pub mod http;

pub use client::IpClient;
pub use connection::IpConnection;
pub use framing::SessionFramer;
