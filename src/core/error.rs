//! Error types.
//!
//! Configuration and contract errors fail fast and propagate to the caller.
//! Metric functions never error; they return documented sentinels instead.

use thiserror::Error;

/// Violations of the region capability contract, or an unusable region config.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegionError {
    #[error("region expects input width {expected}, got {found}")]
    InputWidth { expected: usize, found: usize },

    #[error("region declared output width {expected} but produced {found}")]
    OutputWidth { expected: usize, found: usize },

    #[error("invalid region configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Malformed network description or stimulus.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NetworkError {
    #[error("adjacency must be {expected}x{expected}, got {rows}x{cols}")]
    DimensionMismatch {
        expected: usize,
        rows: usize,
        cols: usize,
    },

    #[error("edge {from} -> {to} references a node outside 0..{size}")]
    DanglingEdge { from: usize, to: usize, size: usize },

    #[error("virtual input {input} has an inbound edge from node {from}")]
    InputHasInbound { input: usize, from: usize },

    #[error("virtual output {output} has an outbound edge to node {to}")]
    OutputHasOutbound { output: usize, to: usize },

    #[error("region {region} has no inbound edge and can never be stimulated")]
    UnreachableRegion { region: usize },

    #[error("edge {from} -> {to} carries width {found}, node {to} expects {expected}")]
    WidthMismatch {
        from: usize,
        to: usize,
        expected: usize,
        found: usize,
    },

    #[error("network has {expected} virtual inputs, got {found} stimuli")]
    StimulusCount { expected: usize, found: usize },

    #[error("stimulus for input {input} has width {found}, expected {expected}")]
    StimulusWidth {
        input: usize,
        expected: usize,
        found: usize,
    },

    #[error("region node {node}: {source}")]
    Region {
        node: usize,
        #[source]
        source: RegionError,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AssemblyError {
    #[error("projection horizon must be positive")]
    ZeroHorizon,

    #[error("subset fraction {0} is outside [0, 1]")]
    FractionOutOfRange(f32),

    #[error("density {0} is outside [0, 1]")]
    DensityOutOfRange(f32),

    #[error(transparent)]
    Region(#[from] RegionError),

    #[error(transparent)]
    Network(#[from] NetworkError),
}

/// Failure of a single experiment. Sibling experiments are unaffected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExperimentError {
    #[error("invalid experiment: {0}")]
    InvalidSpec(&'static str),

    #[error("cancelled before step {step}")]
    Cancelled { step: usize },

    #[error("experiment panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Region(#[from] RegionError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Assembly(#[from] AssemblyError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid simulation config: {0}")]
    Invalid(&'static str),

    #[cfg(feature = "serde")]
    #[error("failed to parse simulation config: {0}")]
    Parse(#[from] serde_json::Error),
}
