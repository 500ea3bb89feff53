// SPDX-License-Identifier: Apache-2.0
// Copyright Gameplane Authors

use api::ApiError;
use netconf::ConfigError;
use portalloc::AllocError;
use thiserror::Error;

/// The plugin error taxonomy.
///
/// `Parameter` means the operator has to change the config; the host stops
/// retrying until it does. `Api` is transient and retried on the next
/// reconcile tick. `Internal` is logged and retried. Nothing here ever
/// panics the process.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("invalid parameter: {0}")]
    Parameter(String),
    #[error("api call failed: {0}")]
    Api(#[from] ApiError),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("not implemented by plugin {0}")]
    NotImplemented(&'static str),
}

impl From<ConfigError> for PluginError {
    fn from(err: ConfigError) -> Self {
        PluginError::Parameter(err.to_string())
    }
}

impl From<AllocError> for PluginError {
    fn from(err: AllocError) -> Self {
        // Exhaustion is structural: the operator enlarges the window or
        // adds load balancers.
        PluginError::Parameter(err.to_string())
    }
}

pub type PluginResult<T> = Result<T, PluginError>;
