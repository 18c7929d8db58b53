//! Domain-specific error types for vcprovision.
//!
//! This module defines `ProvisionError`, a `thiserror`-based enum with one
//! variant per failure kind of the provisioning workflow. Public API
//! functions return `Result<T, ProvisionError>` for programmatic error
//! handling, while the `InventoryClient` trait boundary uses `anyhow::Result`.
//! The provisioner classifies collaborator failures into the variant owned by
//! the step that failed.
//!
//! `ProvisionError` implements `Into<anyhow::Error>`, so the `?` operator
//! converts it automatically in `main`.

use std::io;

/// Formats an IO error kind into a human-readable message.
///
/// Provides consistent, user-friendly messages for common IO error kinds
/// (e.g., "I/O error: not found") instead of the OS-level messages
/// (e.g., "No such file or directory (os error 2)"). For unrecognized
/// error kinds, falls back to including the OS-level error message.
pub(crate) fn io_error_kind_message(err: &io::Error) -> String {
    match err.kind() {
        io::ErrorKind::NotFound => "I/O error: not found".to_string(),
        io::ErrorKind::PermissionDenied => "I/O error: permission denied".to_string(),
        io::ErrorKind::IsADirectory => "I/O error: is a directory".to_string(),
        _ => format!("I/O error: {}", err),
    }
}

/// Domain-specific error type for vcprovision.
///
/// Every variant except [`ProvisionError::NameCollision`] aborts the
/// workflow; see [`ProvisionError::is_fatal`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ProvisionError {
    /// Malformed endpoint URL, unreadable profile, or missing local file path.
    #[error("configuration error: {0}")]
    Config(String),

    /// Authentication or network failure against the management endpoint.
    #[error("connection error: {endpoint}: {message}")]
    Connection {
        /// Endpoint host the session was opened against (credentials stripped).
        endpoint: String,
        /// Failure reported by the client.
        message: String,
    },

    /// An inventory object is missing or ambiguous.
    #[error("{kind} not found: {message}")]
    NotFound {
        /// Inventory object kind (e.g., "datastore").
        kind: &'static str,
        /// Why the lookup failed.
        message: String,
    },

    /// The remote VM-create task failed; `message` is the remote error verbatim.
    #[error("task failed: {task}: {message}")]
    Task {
        /// Task description or identifier.
        task: String,
        /// Remote error message.
        message: String,
    },

    /// File transfer to the datastore failed.
    #[error("upload failed: {path}: {message}")]
    Upload {
        /// Local file being uploaded.
        path: String,
        /// Failure reported by the client.
        message: String,
    },

    /// A device-add mutation (or the device listing it depends on) was rejected.
    #[error("device error: {device}: {message}")]
    Device {
        /// Device being attached (e.g., "cdrom").
        device: String,
        /// Failure reported by the client or by controller lookup.
        message: String,
    },

    /// The requested persistent disk name matches an already-attached disk.
    #[error("can not create persistent disk with identical name to existing disk: {name}")]
    NameCollision {
        /// The colliding disk file name.
        name: String,
    },

    /// An I/O operation failed with contextual information.
    #[error("{context}: {message}")]
    Io {
        /// What was being done when the error occurred, usually a file path.
        context: String,
        /// Human-readable description derived from [`io_error_kind_message`].
        message: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl ProvisionError {
    /// Creates an `Io` variant with the `message` field derived from `source`.
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            message: io_error_kind_message(&source),
            source,
        }
    }

    /// Returns false for conditions that are logged and skipped rather than
    /// terminating the run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::NameCollision { .. })
    }
}
