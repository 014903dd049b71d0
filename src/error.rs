// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error types

use std::fmt;

/// Asset pipeline error type
///
/// Fetch and decode failures never cross the fetch boundary as `Err`; they are recorded on the
/// owning handle (see `ResourceHandle::last_error`) and surfaced through its state.
#[derive(Debug, Clone, PartialEq)]
pub enum AssetError {
    /// Network/platform fetch failed; recoverable while retries remain
    TransientFetchFailure { key: String, reason: String },

    /// Every scheduled retry failed; the handle is in `Error` until a manual retry
    ExhaustedRetries { key: String },

    /// Fetched bytes could not be turned into pixels
    DecodeFailure { key: String, reason: String },

    /// Configuration rejected by validation
    InvalidConfig(String),

    /// Configuration could not be parsed
    SerializationError(String),
}

impl AssetError {
    /// Key of the resource this error belongs to, if any
    pub fn key(&self) -> Option<&str> {
        match self {
            AssetError::TransientFetchFailure { key, .. }
            | AssetError::ExhaustedRetries { key }
            | AssetError::DecodeFailure { key, .. } => Some(key),
            AssetError::InvalidConfig(_) | AssetError::SerializationError(_) => None,
        }
    }

    /// Whether the retry path may still recover from this error
    pub fn is_transient(&self) -> bool {
        matches!(self, AssetError::TransientFetchFailure { .. })
    }
}

impl fmt::Display for AssetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetError::TransientFetchFailure { key, reason } => {
                write!(f, "Fetch failed for {key}: {reason}")
            }
            AssetError::ExhaustedRetries { key } => {
                write!(f, "Retries exhausted for {key}")
            }
            AssetError::DecodeFailure { key, reason } => {
                write!(f, "Decode failed for {key}: {reason}")
            }
            AssetError::InvalidConfig(msg) => write!(f, "Invalid config: {msg}"),
            AssetError::SerializationError(msg) => write!(f, "Serialization error: {msg}"),
        }
    }
}

impl std::error::Error for AssetError {}

impl From<serde_json::Error> for AssetError {
    fn from(err: serde_json::Error) -> Self {
        AssetError::SerializationError(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AssetError>;
