//! Error types for topology analysis, description handling, and the driver.
//!
//! Each layer has its own enum so callers can match on what they can act
//! on; [`Error`] wraps all of them for the binary and for session-level code.

use thiserror::Error;

use crate::driver::{Mode, Status, VariableKind};

/// Errors raised while building a pipe network.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    /// A pipe with this name was already registered.
    #[error("duplicate pipe name \"{0}\"")]
    DuplicatePipeName(String),

    /// A pipe, start node, or end node name was empty.
    #[error("pipe \"{pipe}\" has an empty {field}")]
    EmptyName { pipe: String, field: &'static str },
}

/// Errors raised while reading a network declaration file.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("cannot read network file \"{path}\": {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid network JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unsupported network format \"{found}\" (expected \"{expected}\")")]
    UnsupportedFormat {
        found: String,
        expected: &'static str,
    },

    #[error(transparent)]
    Topology(#[from] TopologyError),
}

/// Errors raised while writing or reading a model description.
#[derive(Error, Debug)]
pub enum DescriptionError {
    #[error("description I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML read error: {0}")]
    Read(#[from] quick_xml::Error),

    #[error("XML attribute error: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("<{element}> is missing attribute \"{attribute}\"")]
    MissingAttribute {
        element: String,
        attribute: &'static str,
    },

    #[error("<{element}> attribute \"{attribute}\" has invalid value \"{value}\"")]
    InvalidAttribute {
        element: String,
        attribute: &'static str,
        value: String,
    },

    #[error("document has no <fmiModelDescription> root")]
    MissingRoot,
}

/// Errors raised by the co-simulation protocol driver.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    /// A data, clock, or step operation was attempted without a live instance.
    #[error("{operation}: component is not instantiated")]
    Unbound { operation: &'static str },

    /// The variable name is not in the variable table.
    #[error("unknown variable \"{0}\"")]
    UnknownVariable(String),

    /// The variable exists but is not of the type the accessor handles.
    #[error("variable \"{name}\" is not of kind {}", .expected.as_str())]
    KindMismatch { name: String, expected: VariableKind },

    /// The operation is not permitted in the driver's current mode.
    #[error("{operation}: illegal call sequence in mode {mode}")]
    IllegalCall {
        operation: &'static str,
        mode: Mode,
    },

    /// The component returned a non-success status.
    #[error("{function} returned {status}")]
    ExternalStatus {
        function: &'static str,
        status: Status,
    },

    /// Number of names and values passed to a setter disagree.
    #[error("{operation}: {names} variable names but {values} values")]
    LengthMismatch {
        operation: &'static str,
        names: usize,
        values: usize,
    },

    /// The component returned a null instance.
    #[error("instantiation of \"{0}\" failed")]
    InstantiationFailed(String),

    /// The shared library or one of its symbols could not be loaded.
    #[error("cannot load component library: {0}")]
    Load(String),
}

/// Top-level error for session runs and the command line.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Description(#[from] DescriptionError),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for crate operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_pipe_display() {
        let err = TopologyError::DuplicatePipeName("p1".to_string());
        assert_eq!(err.to_string(), "duplicate pipe name \"p1\"");
    }

    #[test]
    fn external_status_names_function() {
        let err = DriverError::ExternalStatus {
            function: "fmi3DoStep",
            status: Status::Discard,
        };
        assert_eq!(err.to_string(), "fmi3DoStep returned Discard");
    }

    #[test]
    fn kind_mismatch_names_expected_kind() {
        let err = DriverError::KindMismatch {
            name: "A_Clock".to_string(),
            expected: VariableKind::Int32,
        };
        assert_eq!(err.to_string(), "variable \"A_Clock\" is not of kind int32");
    }

    #[test]
    fn driver_error_lifts_into_crate_error() {
        let err: Error = DriverError::UnknownVariable("x".to_string()).into();
        assert!(err.to_string().contains("unknown variable \"x\""));
    }
}
