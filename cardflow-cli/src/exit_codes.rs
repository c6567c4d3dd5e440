//! Exit codes following sysexits.h conventions.
//!
//! These codes let scripts tell a missing input apart from an unreachable
//! store or a record that cannot be staged.

use cardflow_core::{CardflowError, CatalogError, QueueError, StoreError};

/// General error (catch-all).
pub const GENERAL_ERROR: i32 = 1;

/// Command line usage error (invalid arguments).
/// Maps to EX_USAGE from sysexits.h.
pub const USAGE_ERROR: i32 = 64;

/// Data error (unknown or already staged record, undecodable image).
/// Maps to EX_DATAERR from sysexits.h.
pub const DATA_ERROR: i32 = 65;

/// Cannot open input (missing object or catalog snapshot).
/// Maps to EX_NOINPUT from sysexits.h.
pub const INPUT_ERROR: i32 = 66;

/// Service unavailable (object store, catalog, job queue).
/// Maps to EX_UNAVAILABLE from sysexits.h.
pub const UNAVAILABLE: i32 = 69;

/// I/O error (cannot write output).
/// Maps to EX_IOERR from sysexits.h.
pub const IO_ERROR: i32 = 74;

/// Represents an exit code with optional error context.
pub struct ExitCode {
    pub code: i32,
    pub message: Option<String>,
}

impl ExitCode {
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");

        let code = if message.starts_with("Failed to write") {
            IO_ERROR
        } else if message.starts_with("Failed to read") {
            INPUT_ERROR
        } else {
            err.chain()
                .find_map(|cause| {
                    if let Some(e) = cause.downcast_ref::<CardflowError>() {
                        Some(code_for(e))
                    } else if let Some(e) = cause.downcast_ref::<StoreError>() {
                        Some(store_code(e))
                    } else {
                        cause.downcast_ref::<CatalogError>().map(catalog_code)
                    }
                })
                .unwrap_or(GENERAL_ERROR)
        };

        Self {
            code,
            message: Some(message),
        }
    }
}

fn code_for(err: &CardflowError) -> i32 {
    match err {
        CardflowError::Store(e) => store_code(e),
        CardflowError::Catalog(e) => catalog_code(e),
        CardflowError::Queue(QueueError::Unavailable(_)) => UNAVAILABLE,
        CardflowError::Queue(QueueError::InvalidArgs(_)) => USAGE_ERROR,
        CardflowError::Decode(_) | CardflowError::Sku(_) => DATA_ERROR,
        CardflowError::Encode(_) => GENERAL_ERROR,
    }
}

fn store_code(err: &StoreError) -> i32 {
    match err {
        StoreError::NotFound(_) => INPUT_ERROR,
        StoreError::Unavailable(_) => UNAVAILABLE,
        StoreError::InvalidKey(_) => USAGE_ERROR,
        StoreError::Io(_) => IO_ERROR,
    }
}

fn catalog_code(err: &CatalogError) -> i32 {
    match err {
        CatalogError::NotFound(_) | CatalogError::SkuTaken(_) => DATA_ERROR,
        CatalogError::Unavailable(_) => UNAVAILABLE,
        CatalogError::Snapshot(_) => INPUT_ERROR,
    }
}
