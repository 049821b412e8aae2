//! Utility functions and helpers

pub mod certificates;
pub mod hashing;

pub use hashing::sha256_hex;
