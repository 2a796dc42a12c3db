//! Build event types for JSON output.
//!
//! This module defines the stable JSON schema for machine-readable build output.
//! These events are emitted when using `--message-format=json`.
//!
//! # Event Types
//!
//! - `build-started`: The plan is about to execute
//! - `target-started`: A target was dispatched to the worker pool
//! - `target-artifact`: A target produced its artifact
//! - `target-failed`: The toolchain reported a failure for a target
//! - `build-finished`: Build completed (success or failure)
//!
//! # Stability
//!
//! New fields may be added, but existing fields should not be removed or renamed.

use std::path::PathBuf;

use serde::Serialize;

use crate::core::target::TargetKind;

/// A build event emitted during the build process.
///
/// Each event is serialized as a single JSON object per line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason")]
pub enum BuildEvent {
    /// Build started.
    #[serde(rename = "build-started")]
    BuildStarted {
        /// Number of targets in the plan
        target_count: usize,
        /// Worker pool size
        jobs: usize,
        /// Plan fingerprint
        fingerprint: String,
    },

    /// A target was dispatched.
    #[serde(rename = "target-started")]
    TargetStarted {
        target: String,
        kind: TargetKind,
        /// Number of source files being compiled
        sources: usize,
    },

    /// A target finished and its artifact was recorded.
    #[serde(rename = "target-artifact")]
    TargetArtifact {
        target: String,
        kind: TargetKind,
        /// Output file
        filename: PathBuf,
        /// Object files the output was made from
        objects: Vec<PathBuf>,
    },

    /// A toolchain step failed.
    #[serde(rename = "target-failed")]
    TargetFailed {
        target: String,
        /// Failed step (`compile`, `archive` or `link`)
        step: String,
        /// Toolchain output, unmodified
        message: String,
    },

    /// Build completed (success or failure).
    #[serde(rename = "build-finished")]
    BuildFinished {
        /// Whether the build succeeded
        success: bool,
        /// Total build duration in milliseconds
        duration_ms: u64,
        /// Number of targets built
        targets_built: usize,
    },
}

impl BuildEvent {
    /// Create a build started event.
    pub fn started(target_count: usize, jobs: usize, fingerprint: impl Into<String>) -> Self {
        BuildEvent::BuildStarted {
            target_count,
            jobs,
            fingerprint: fingerprint.into(),
        }
    }

    /// Create a build finished event.
    pub fn finished(success: bool, duration_ms: u64, targets_built: usize) -> Self {
        BuildEvent::BuildFinished {
            success,
            duration_ms,
            targets_built,
        }
    }

    /// Serialize this event to a JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
