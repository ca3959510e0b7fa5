//! Error types for the watchdog scheduler.
//!
//! This module provides error handling for scheduler and timer queue
//! operations with proper error classification.

use thiserror::Error;

/// Errors that can occur during watchdog operations.
#[derive(Debug, Clone, Error)]
pub enum WatchdogError {
    /// A task name was empty.
    #[error("Task name must not be empty")]
    EmptyTaskName,

    /// A timer queue entry with this name already exists.
    #[error("Timer entry already exists: {0}")]
    DuplicateEntry(String),

    /// No timer queue entry with this name exists.
    #[error("Unknown timer entry: {0}")]
    UnknownEntry(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl WatchdogError {
    /// Create a duplicate entry error.
    #[must_use]
    pub fn duplicate_entry(name: impl Into<String>) -> Self {
        Self::DuplicateEntry(name.into())
    }

    /// Create an unknown entry error.
    #[must_use]
    pub fn unknown_entry(name: impl Into<String>) -> Self {
        Self::UnknownEntry(name.into())
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration(reason.into())
    }
}

/// A specialized `Result` type for watchdog operations.
pub type WatchdogResult<T> = std::result::Result<T, WatchdogError>;
