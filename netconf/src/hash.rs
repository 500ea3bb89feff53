// SPDX-License-Identifier: Apache-2.0
// Copyright Gameplane Authors

use crate::ConfigError;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt::Write;

/// Stable fingerprint of a plugin configuration.
///
/// The only contract: any change that produces a semantically different
/// service changes the fingerprint. The struct's serde rendering is the
/// normal form (field order is declaration order, so the output is stable
/// across runs).
pub fn config_hash<T: Serialize>(config: &T) -> Result<String, ConfigError> {
    let normalized =
        serde_json::to_string(config).map_err(|e| ConfigError::Fingerprint(e.to_string()))?;
    let digest = Sha256::digest(normalized.as_bytes());
    let mut out = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        // Writing to a String cannot fail.
        let _ = write!(out, "{byte:02x}");
    }
    Ok(out)
}
