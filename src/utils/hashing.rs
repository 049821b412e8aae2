//! Deterministic identifiers carried in request headers

use sha2::{Digest, Sha256};

/// Lower-case hex sha256 of `input`
pub fn sha256_hex(input: impl AsRef<[u8]>) -> String {
    hex::encode(Sha256::digest(input.as_ref()))
}

/// Identifies the canned response set for one operation: `path-METHOD-operationId`
pub fn mock_id(path: &str, method: &str, operation_id: &str) -> String {
    sha256_hex(format!("{}-{}-{}", path, method, operation_id))
}

/// Identifies an upstream service behind the validation proxy: `hostname:port`
pub fn service_id(hostname: &str, port: u32) -> String {
    sha256_hex(format!("{}:{}", hostname, port))
}

/// Identifies an operation within a validated service: `METHOD:path`
pub fn operation_id(method: &str, path: &str) -> String {
    sha256_hex(format!("{}:{}", method, path))
}
