// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Error taxonomy for the queue engine.

use std::fmt::Display;

use thiserror::Error;

/// The error type returned by every queue operation.
///
/// Each variant corresponds to one of the error codes surfaced to callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("queue is locked by an active lease until {lock_expires_at}")]
    Locked { lock_expires_at: u64 },

    #[error("lease expired: {0}")]
    LockExpired(String),

    #[error("invalid lock id: {0}")]
    InvalidLockId(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store corrupt: {0}")]
    StoreCorrupt(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl QueueError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn locked(lock_expires_at: u64) -> Self {
        Self::Locked { lock_expires_at }
    }

    pub fn lock_expired(msg: impl Into<String>) -> Self {
        Self::LockExpired(msg.into())
    }

    pub fn invalid_lock_id(msg: impl Into<String>) -> Self {
        Self::InvalidLockId(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn store_corrupt(msg: impl Into<String>) -> Self {
        Self::StoreCorrupt(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// The stable error-code string surfaced to callers (§6 of the spec).
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "InvalidArgument",
            Self::Locked { .. } => "Locked",
            Self::LockExpired(_) => "LockExpired",
            Self::InvalidLockId(_) => "InvalidLockId",
            Self::NotFound(_) => "NotFound",
            Self::StoreCorrupt(_) => "StoreCorrupt",
            Self::Internal(_) => "Internal",
        }
    }

    /// Prefixes the error message with additional context, preserving the variant.
    pub fn wrap(self, context: impl Display) -> Self {
        match self {
            Self::InvalidArgument(m) => Self::InvalidArgument(format!("{}: {}", context, m)),
            Self::Locked { lock_expires_at } => Self::Locked { lock_expires_at },
            Self::LockExpired(m) => Self::LockExpired(format!("{}: {}", context, m)),
            Self::InvalidLockId(m) => Self::InvalidLockId(format!("{}: {}", context, m)),
            Self::NotFound(m) => Self::NotFound(format!("{}: {}", context, m)),
            Self::StoreCorrupt(m) => Self::StoreCorrupt(format!("{}: {}", context, m)),
            Self::Internal(m) => Self::Internal(format!("{}: {}", context, m)),
        }
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(format!("serialization error: {}", e))
    }
}

/// Adds context to a `Result<T, QueueError>` without discarding the variant/code.
///
/// Mirrors the grounding codebase's `ActorContext` trait for `ActorError`.
pub trait ErrorContext<T> {
    fn context(self, msg: impl Display) -> Result<T, QueueError>;
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T, QueueError>;
}

impl<T> ErrorContext<T> for Result<T, QueueError> {
    fn context(self, msg: impl Display) -> Result<T, QueueError> {
        self.map_err(|e| e.wrap(msg))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T, QueueError> {
        self.map_err(|e| e.wrap(f()))
    }
}

/// Adapts a foreign error into a `QueueError::Internal`, with context.
pub trait AsInternal<T> {
    fn internal(self, msg: impl Display) -> Result<T, QueueError>;
}

impl<T, E: Display> AsInternal<T> for Result<T, E> {
    fn internal(self, msg: impl Display) -> Result<T, QueueError> {
        self.map_err(|e| QueueError::Internal(format!("{}: {}", msg, e)))
    }
}
