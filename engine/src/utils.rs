//! Utility functions

use serde::{Deserialize, Serialize};

/// Version information for the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
    pub profile: String,
    pub target: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("MODSYNC_GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("MODSYNC_BUILD_TIME").unwrap_or("unknown").to_string(),
        profile: option_env!("MODSYNC_BUILD_PROFILE").unwrap_or("unknown").to_string(),
        target: option_env!("MODSYNC_BUILD_TARGET").unwrap_or("unknown").to_string(),
    }
}

/// Generate a random UUID v4
pub fn generate_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Calculate SHA256 hash of data
pub fn sha256_hash(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    hex::encode(result)
}

/// Digest of a serializable value's canonical JSON form
pub fn json_digest<T: Serialize>(value: &T) -> String {
    // serde_json maps are ordered, so equal values hash equally
    let bytes = serde_json::to_vec(value).unwrap_or_default();
    sha256_hash(&bytes)
}

/// Hex encoding utilities
mod hex {
    const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";

    pub fn encode(data: impl AsRef<[u8]>) -> String {
        let data = data.as_ref();
        let mut result = String::with_capacity(data.len() * 2);
        for byte in data {
            result.push(HEX_CHARS[(byte >> 4) as usize] as char);
            result.push(HEX_CHARS[(byte & 0x0f) as usize] as char);
        }
        result
    }
}
