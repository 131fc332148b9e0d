//! Error types

use std::io;

use thiserror::Error;

use crate::format::Format;

/// Configuration and topology errors reported by `prepare`
#[derive(Debug, Error)]
pub enum PrepareError {
    #[error("format mismatch in element '{elem}': {detail}")]
    FormatMismatch { elem: String, detail: String },

    #[error("unsupported format {format} in element '{elem}'")]
    UnsupportedFormat { elem: String, format: Format },

    #[error("failed to open '{uri}' for element '{elem}'")]
    Open {
        elem: String,
        uri: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to decode '{uri}' for element '{elem}': {detail}")]
    Decode {
        elem: String,
        uri: String,
        detail: String,
    },

    #[error("graph '{graph}' has no output element linked")]
    NoOutput { graph: String },

    #[error("cycle detected in graph '{graph}'")]
    Cycle { graph: String },

    #[error("link between incompatible ports {src} -> {dst}")]
    IncompatibleLink { src: String, dst: String },

    #[error("graph '{graph}' output format {format} is not valid")]
    InvalidOutputFormat { graph: String, format: Format },

    #[error("element '{elem}' failed to prepare in graph '{graph}'")]
    Element {
        graph: String,
        elem: String,
        #[source]
        source: Box<PrepareError>,
    },
}

/// Errors building an element from its descriptor
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CreateError {
    #[error("unknown element type '{0}'")]
    UnknownType(String),

    #[error("missing argument '{arg}' for element '{elem}'")]
    MissingArg { elem: String, arg: String },

    #[error("argument '{arg}' of element '{elem}' has the wrong type")]
    ArgType { elem: String, arg: String },

    #[error("{kind} element '{elem}' needs at least one {direction} port")]
    NoPorts {
        elem: String,
        kind: String,
        direction: String,
    },
}

/// Errors reading a persisted graph class
#[derive(Debug, Error)]
pub enum GraphClassError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("graph class document is not an object")]
    NotAnObject,

    #[error("missing or mistyped key '{0}'")]
    Key(&'static str),
}

/// Contract violations when adding a sub-source to a mixer
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MixerError {
    #[error("element '{0}' is not a source")]
    NotASource(String),

    #[error("element '{0}' has no output ports")]
    NoOutputPorts(String),

    #[error("element '{elem}' output format {found} does not match mixer format {expected}")]
    FormatMismatch {
        elem: String,
        expected: Format,
        found: Format,
    },
}

/// Errors raised while producing device buffers
#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Prepare(#[from] PrepareError),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("{0}")]
    Failed(String),

    #[error("source thread panicked: {0}")]
    Panicked(String),

    #[error("source thread has terminated")]
    Terminated,
}
