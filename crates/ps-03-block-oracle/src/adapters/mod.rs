//! Default port implementations.

pub mod merkle;

pub use merkle::MerkleValidator;
