//! Pipe network analysis and FMI 3.0 co-simulation driving.
//!
//! A pipe network declaration is turned into a [`network::Topology`], the
//! topology into a [`description::ModelDescription`] with clocked integer
//! signals, and the description drives a component through
//! [`driver::Fmi3Driver`] and [`session::Session`].

pub mod config;
/// Model description emission, XML writing and reading.
pub mod description;
/// Co-simulation protocol state machine and ABI backends.
pub mod driver;
pub mod error;
pub mod io {
    pub mod export;
}
pub mod network;
pub mod session;

pub use error::{Error, Result};

/// Numeric handle of a variable within one component.
pub type ValueReference = u32;
