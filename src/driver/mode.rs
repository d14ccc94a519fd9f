//! Driver modes and the operations permitted in each.

use std::fmt;

/// Lifecycle mode of a driven component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Uninstantiated,
    Instantiated,
    InitializationMode,
    StepMode,
    EventMode,
    Terminated,
    Freed,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Uninstantiated => "Uninstantiated",
            Mode::Instantiated => "Instantiated",
            Mode::InitializationMode => "InitializationMode",
            Mode::StepMode => "StepMode",
            Mode::EventMode => "EventMode",
            Mode::Terminated => "Terminated",
            Mode::Freed => "Freed",
        };
        f.write_str(name)
    }
}

/// An ABI call the driver can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Instantiate,
    EnterInitializationMode,
    ExitInitializationMode,
    SetInt32,
    GetInt32,
    SetClock,
    GetClock,
    EnterEventMode,
    UpdateDiscreteStates,
    EnterStepMode,
    DoStep,
    Terminate,
}

impl Operation {
    /// Exported function name of the operation.
    pub fn function(self) -> &'static str {
        match self {
            Operation::Instantiate => "fmi3InstantiateCoSimulation",
            Operation::EnterInitializationMode => "fmi3EnterInitializationMode",
            Operation::ExitInitializationMode => "fmi3ExitInitializationMode",
            Operation::SetInt32 => "fmi3SetInt32",
            Operation::GetInt32 => "fmi3GetInt32",
            Operation::SetClock => "fmi3SetClock",
            Operation::GetClock => "fmi3GetClock",
            Operation::EnterEventMode => "fmi3EnterEventMode",
            Operation::UpdateDiscreteStates => "fmi3UpdateDiscreteStates",
            Operation::EnterStepMode => "fmi3EnterStepMode",
            Operation::DoStep => "fmi3DoStep",
            Operation::Terminate => "fmi3Terminate",
        }
    }

    /// Returns `true` if the operation may be issued in `mode`.
    pub fn allowed_in(self, mode: Mode) -> bool {
        use Mode::*;
        match self {
            Operation::Instantiate => mode == Uninstantiated,
            Operation::EnterInitializationMode => mode == Instantiated,
            Operation::ExitInitializationMode => mode == InitializationMode,
            Operation::SetInt32
            | Operation::GetInt32
            | Operation::SetClock
            | Operation::GetClock => matches!(mode, StepMode | EventMode),
            Operation::EnterEventMode => mode == StepMode,
            Operation::UpdateDiscreteStates | Operation::EnterStepMode => mode == EventMode,
            Operation::DoStep => mode == StepMode,
            Operation::Terminate => matches!(mode, StepMode | EventMode),
        }
    }

    /// Mode reached after the operation succeeds.
    pub fn next_mode(self, current: Mode) -> Mode {
        match self {
            Operation::Instantiate => Mode::Instantiated,
            Operation::EnterInitializationMode => Mode::InitializationMode,
            Operation::ExitInitializationMode | Operation::EnterStepMode => Mode::StepMode,
            Operation::EnterEventMode => Mode::EventMode,
            Operation::Terminate => Mode::Terminated,
            _ => current,
        }
    }
}
