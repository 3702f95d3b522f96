//! # Peer-Sync Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── harness.rs        # Scripted remote peer and chain fixtures
//! ├── integration/      # A node against scripted or real peers
//! └── exploits/         # Hostile peers
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p ps-tests
//! cargo test -p ps-tests integration::
//! cargo test -p ps-tests exploits::
//! ```

#![allow(dead_code)]

#[cfg(test)]
pub(crate) mod harness;

pub mod exploits;
pub mod integration;
