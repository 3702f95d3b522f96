//! # Hostile Peers
//!
//! Remotes that break framing or flood the connection. Malformed input
//! costs the peer its connection; only a command flood costs it the
//! address.

pub mod announcement_flood;
pub mod command_flood;
pub mod malformed_frames;
