//! Library half of the node binary — kept separate from `main.rs` so
//! integration tests can drive the HTTP router and peer listener
//! directly, mirroring `mqtt-broker`'s `lib.rs` + `src/bin/server.rs`
//! split.

pub mod config;
pub mod http;
pub mod logging;
pub mod peer_listener;
