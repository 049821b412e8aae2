use serde::{Deserialize, Serialize};

/// An upstream fronted by the validation proxy
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProxiedService {
    /// sha256 of `hostname:port`, sent to the validator as a request header
    pub id: String,
    pub cluster_name: String,
    pub hostname: String,
    pub port: u32,
}
