// src/error.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fatal error kinds surfaced at process exit, one per recognized CLI/ingress
//! failure class. Each variant carries the exit code assigned to it.

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum GrazelleError {
    #[error("unrecognized option `{0}`")]
    UnknownOption(String),

    #[error("invalid value `{value}` for option `{option}`")]
    InvalidValue { option: String, value: String },

    #[error("missing argument for option `{0}`")]
    MissingValue(String),

    #[error("option `{0}` does not accept an argument")]
    ExtraneousValue(String),

    #[error("missing required option `{0}`")]
    MissingOption(String),

    #[error("incompatible option combination")]
    IncompatibleOptions,

    #[error("failed to open graph file {path}")]
    GraphFileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("truncated read from graph file {path}")]
    GraphFileRead { path: PathBuf },

    #[error("allocation failed ({context})")]
    AllocationFailed { context: String },

    #[error("failed to spawn worker thread")]
    ThreadSpawnFailed(#[source] std::io::Error),

    #[error("scheduling granularity too coarse for a graph this size")]
    SchedulingImpossible,
}

impl GrazelleError {
    /// Process exit code for this error, per the external interface's
    /// fixed exit-status table.
    pub fn exit_code(&self) -> i32 {
        match self {
            GrazelleError::UnknownOption(_) => 1,
            GrazelleError::InvalidValue { .. } => 2,
            GrazelleError::MissingValue(_) => 3,
            GrazelleError::ExtraneousValue(_) => 4,
            GrazelleError::MissingOption(_) => 5,
            GrazelleError::IncompatibleOptions => 6,
            GrazelleError::GraphFileOpen { .. } | GrazelleError::GraphFileRead { .. } => 255,
            GrazelleError::AllocationFailed { .. }
            | GrazelleError::ThreadSpawnFailed(_)
            | GrazelleError::SchedulingImpossible => 1,
        }
    }
}
