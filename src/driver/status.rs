//! Component status codes and how the driver reacts to them.

use std::fmt;

use serde::Deserialize;
use tracing::warn;

use crate::error::DriverError;

/// Status returned by every component call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Warning,
    Discard,
    Error,
    Fatal,
}

impl Status {
    /// Decodes a raw status code. Unknown codes decode as `Fatal`.
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => Status::Ok,
            1 => Status::Warning,
            2 => Status::Discard,
            3 => Status::Error,
            _ => Status::Fatal,
        }
    }

    /// Raw status code.
    pub fn to_raw(self) -> i32 {
        match self {
            Status::Ok => 0,
            Status::Warning => 1,
            Status::Discard => 2,
            Status::Error => 3,
            Status::Fatal => 4,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Ok => "OK",
            Status::Warning => "Warning",
            Status::Discard => "Discard",
            Status::Error => "Error",
            Status::Fatal => "Fatal",
        };
        f.write_str(name)
    }
}

/// Which component statuses fail a driver call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusPolicy {
    /// Anything other than `Ok` fails the call.
    #[default]
    Strict,
    /// `Warning` is logged and the call succeeds.
    TolerateWarnings,
}

impl StatusPolicy {
    /// Maps a component status to the driver's result for `function`.
    ///
    /// # Errors
    ///
    /// Returns `DriverError::ExternalStatus` when the policy rejects `status`.
    pub fn check(self, function: &'static str, status: Status) -> Result<(), DriverError> {
        match (self, status) {
            (_, Status::Ok) => Ok(()),
            (StatusPolicy::TolerateWarnings, Status::Warning) => {
                warn!(function, "component returned Warning");
                Ok(())
            }
            _ => Err(DriverError::ExternalStatus { function, status }),
        }
    }
}

/// Outcome of a teardown call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStatus {
    /// The component call was made and succeeded.
    Done,
    /// Nothing to tear down; no component call was made.
    AlreadyDone,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_codes_decode() {
        assert_eq!(Status::from_raw(0), Status::Ok);
        assert_eq!(Status::from_raw(2), Status::Discard);
        assert_eq!(Status::from_raw(42), Status::Fatal);
        assert_eq!(Status::Error.to_raw(), 3);
    }

    #[test]
    fn strict_rejects_warning() {
        let err = StatusPolicy::Strict.check("fmi3DoStep", Status::Warning);
        assert_eq!(
            err,
            Err(DriverError::ExternalStatus {
                function: "fmi3DoStep",
                status: Status::Warning
            })
        );
    }

    #[test]
    fn tolerant_accepts_warning_only() {
        let policy = StatusPolicy::TolerateWarnings;
        assert!(policy.check("fmi3DoStep", Status::Warning).is_ok());
        assert!(policy.check("fmi3DoStep", Status::Discard).is_err());
        assert!(policy.check("fmi3DoStep", Status::Fatal).is_err());
    }
}
