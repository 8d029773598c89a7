//! # Error Types
//!
//! A single error enum covers every failure the terrain pipeline can report.
//! Extraction is all-or-nothing: any error abandons the current frame and the
//! previously published mesh stays in place.

use std::path::PathBuf;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TerrainError>;

/// Errors produced while configuring, seeding, sculpting or extracting terrain.
#[derive(Debug, thiserror::Error)]
pub enum TerrainError {
    /// A configuration value is outside its valid range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Host memory for a sample or triangle buffer could not be reserved
    #[error("failed to allocate {bytes} bytes of host memory for {what}")]
    HostAllocation {
        /// What the allocation was for
        what: &'static str,
        /// Requested size in bytes
        bytes: u64,
    },

    /// No GPU adapter matched the request
    #[error("no suitable GPU adapter: {0}")]
    AdapterUnavailable(String),

    /// The adapter refused to create a device
    #[error("failed to create GPU device: {0}")]
    DeviceRequest(String),

    /// A buffer would exceed what the device can bind as storage
    #[error("buffer '{name}' needs {requested} bytes but the device limit is {limit} bytes")]
    BufferTooLarge {
        /// Registry name of the buffer
        name: &'static str,
        /// Requested size in bytes
        requested: u64,
        /// Device limit in bytes
        limit: u64,
    },

    /// wgpu reported an out-of-memory or validation error during allocation
    #[error("GPU allocation of '{name}' failed: {message}")]
    GpuAllocation {
        /// Registry name of the buffer (or buffer set)
        name: &'static str,
        /// Message reported by the device
        message: String,
    },

    /// Mapping a staging buffer for readback failed
    #[error("failed to map buffer '{name}' for reading: {message}")]
    BufferMap {
        /// Registry name of the buffer
        name: &'static str,
        /// Message reported by wgpu
        message: String,
    },

    /// A named buffer was requested before it was created or after release
    #[error("buffer '{0}' is not allocated")]
    MissingBuffer(&'static str),

    /// A write would run past the end of a buffer
    #[error("write of {len} bytes at offset {offset} overruns buffer '{name}' ({size} bytes)")]
    BufferWriteOutOfBounds {
        /// Registry name of the buffer
        name: &'static str,
        /// Byte offset of the write
        offset: u64,
        /// Length of the write in bytes
        len: u64,
        /// Allocated size of the buffer in bytes
        size: u64,
    },

    /// Buffers sized for one resolution were used with data for another
    #[error("buffers allocated for {allocated} points cannot take {provided} points")]
    StaleBuffers {
        /// Point capacity of the live buffers
        allocated: usize,
        /// Points supplied by the caller
        provided: usize,
    },

    /// An extraction step ran before any buffers were allocated
    #[error("extraction buffers have not been allocated")]
    NotAllocated,

    /// More triangles were requested than the kernel produced
    #[error("requested {requested} triangles but only {available} were produced")]
    TriangleReadOutOfRange {
        /// Triangles requested
        requested: u32,
        /// Triangles available
        available: u32,
    },

    /// Configuration file could not be read
    #[error("failed to read config file {path:?}: {source}")]
    ConfigIo {
        /// Path that was read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Configuration JSON could not be parsed
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] serde_json::Error),
}
