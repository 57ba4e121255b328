//! Error taxonomy for the comparability core (spec §7).

use std::io;
use thiserror::Error;

/// Top-level error for every fallible operation exposed by this crate.
///
/// Mirrors the split the reference tool makes between conditions the caller
/// can recover from mid-trace and conditions that must terminate the run.
#[derive(Debug, Error)]
pub enum DynCompError {
    /// A programming-invariant violation: the tag arena, shadow memory, or
    /// a union-find structure observed state that should be unreachable.
    /// Always fatal.
    #[error("invariant violation: {0}")]
    Invariant(#[from] InvariantError),

    /// A host-framework failure: I/O opening or writing a trace file,
    /// missing helper tool functions, or a malformed variable catalog.
    /// Always fatal.
    #[error("host error: {0}")]
    Host(#[from] HostError),

    /// I/O failure while writing the declarations or values trace.
    #[error("trace I/O error: {0}")]
    Io(#[from] io::Error),
}

impl DynCompError {
    /// Whether this error is fatal and execution must stop (spec §7); every
    /// variant currently defined is fatal, but the predicate is kept
    /// explicit since guest-visible benign conditions are modeled as
    /// [`crate::emit::Rendering`] values rather than errors, not as a third
    /// error variant that could be mistakenly treated as recoverable here.
    pub const fn is_fatal(&self) -> bool {
        true
    }
}

/// Fatal invariant violations (spec §7, "Programming invariant violations").
#[derive(Debug, Error)]
pub enum InvariantError {
    /// The tag arena would grow past `MAX_REAL_TAG`.
    #[error("tag arena overflow: next tag {next} exceeds the real-tag ceiling")]
    ArenaOverflow {
        /// The tag value that would have been allocated.
        next: u32,
    },

    /// A guest address exceeded the configured shadow-memory address space.
    #[error("shadow memory address {addr:#x} exceeds the configured cap {cap:#x}")]
    ShadowAddressOverflow {
        /// The offending address.
        addr: u64,
        /// The configured cap.
        cap: u64,
    },

    /// `find` was asked to resolve the reserved "no tag" value, or a
    /// union-find node's `parent_index` pointed outside the live range.
    #[error("union-find corruption: {detail}")]
    UnionFindCorruption {
        /// Free-form diagnostic, e.g. which tag and which table.
        detail: String,
    },
}

/// Fatal host/environment failures (spec §7, "Host-framework errors").
#[derive(Debug, Error)]
pub enum HostError {
    /// A helper tool function the IR instrumentation pass depends on was
    /// not found at startup.
    #[error("missing helper tool function: {name}")]
    MissingHelper {
        /// The helper's symbolic name.
        name: &'static str,
    },

    /// The variable catalog referenced a program point, type, or variable
    /// that could not be resolved.
    #[error("malformed variable catalog: {detail}")]
    MalformedCatalog {
        /// Free-form diagnostic.
        detail: String,
    },

    /// Failed to open or create the output directory / trace file.
    #[error("could not open trace output {path}: {source}")]
    TraceOutput {
        /// Path that failed to open.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}
