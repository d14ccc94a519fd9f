//! Co-simulation protocol driver.
//!
//! [`Fmi3Driver`] owns one component instance and sequences calls against
//! it. Every call is checked in the same order before anything reaches the
//! component:
//!
//! 1. a live instance exists ([`DriverError::Unbound`]);
//! 2. the call is legal in the current [`Mode`] ([`DriverError::IllegalCall`]);
//! 3. every variable name resolves to a variable of the accessor's type
//!    ([`DriverError::UnknownVariable`], [`DriverError::KindMismatch`]);
//! 4. names and values have the same length ([`DriverError::LengthMismatch`]).
//!
//! The component's status is then judged by the driver's [`StatusPolicy`].
//! A rejected status leaves the mode unchanged, so teardown stays possible.

pub mod abi;
pub mod library;
pub mod mode;
pub mod scripted;
pub mod status;
pub mod variables;

use tracing::{debug, info, warn};

pub use abi::{CoSimulationAbi, DiscreteStatesUpdate, InstantiateArgs, StepOutcome};
pub use library::{LibraryInstance, SharedLibrary};
pub(crate) use library::fmu_binary_path;
pub use mode::{Mode, Operation};
pub use scripted::{CallLog, ScriptedComponent, ScriptedInstance};
pub use status::{Status, StatusPolicy, TeardownStatus};
pub use variables::{VariableEntry, VariableKind, VariableTable};

use crate::error::DriverError;

/// Arguments for [`Fmi3Driver::instantiate`].
#[derive(Debug, Clone, PartialEq)]
pub struct InstantiateOptions {
    pub instance_name: String,
    pub instantiation_token: String,
    /// Resource directory handed to the component, if any.
    pub resource_path: Option<String>,
    pub visible: bool,
    pub logging_on: bool,
    pub event_mode_used: bool,
    pub early_return_allowed: bool,
    /// Names of variables the component must expose during intermediate
    /// updates.
    pub required_intermediate_variables: Vec<String>,
}

impl InstantiateOptions {
    /// Options for a clocked, event-mode co-simulation of `instance_name`.
    pub fn new(instance_name: &str, instantiation_token: &str) -> Self {
        Self {
            instance_name: instance_name.to_string(),
            instantiation_token: instantiation_token.to_string(),
            resource_path: None,
            visible: false,
            logging_on: false,
            event_mode_used: true,
            early_return_allowed: true,
            required_intermediate_variables: Vec::new(),
        }
    }
}

/// State machine over one co-simulation component.
pub struct Fmi3Driver<B: CoSimulationAbi> {
    backend: B,
    instance: Option<B::Instance>,
    variables: VariableTable,
    mode: Mode,
    policy: StatusPolicy,
    instance_name: String,
}

impl<B: CoSimulationAbi> Fmi3Driver<B> {
    /// Creates an uninstantiated driver over `backend`.
    pub fn new(backend: B, variables: VariableTable) -> Self {
        Self {
            backend,
            instance: None,
            variables,
            mode: Mode::Uninstantiated,
            policy: StatusPolicy::default(),
            instance_name: String::new(),
        }
    }

    /// Sets how component statuses are judged.
    pub fn with_status_policy(mut self, policy: StatusPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn status_policy(&self) -> StatusPolicy {
        self.policy
    }

    pub fn variables(&self) -> &VariableTable {
        &self.variables
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns `true` while the driver holds a component instance.
    pub fn is_instantiated(&self) -> bool {
        self.instance.is_some()
    }

    /// Version string reported by the component. Needs no instance.
    pub fn version(&self) -> String {
        self.backend.get_version()
    }

    /// Checks instance presence then mode, and lends out the parts a call needs.
    fn bind(
        &mut self,
        operation: Operation,
    ) -> Result<(&mut B, &mut B::Instance, &VariableTable), DriverError> {
        let Some(instance) = self.instance.as_mut() else {
            return Err(DriverError::Unbound {
                operation: operation.function(),
            });
        };
        if !operation.allowed_in(self.mode) {
            return Err(DriverError::IllegalCall {
                operation: operation.function(),
                mode: self.mode,
            });
        }
        Ok((&mut self.backend, instance, &self.variables))
    }

    /// Applies the status policy and, on success, the mode transition.
    fn finish(&mut self, operation: Operation, status: Status) -> Result<(), DriverError> {
        self.policy.check(operation.function(), status)?;
        let next = operation.next_mode(self.mode);
        if next != self.mode {
            debug!(instance = %self.instance_name, from = %self.mode, to = %next, "mode change");
            self.mode = next;
        }
        Ok(())
    }

    /// Creates the component instance.
    ///
    /// # Errors
    ///
    /// Returns `IllegalCall` unless the driver is uninstantiated,
    /// `UnknownVariable` for an unresolvable required intermediate variable,
    /// and `InstantiationFailed` when the component returns no instance.
    pub fn instantiate(&mut self, options: &InstantiateOptions) -> Result<(), DriverError> {
        let operation = Operation::Instantiate;
        if !operation.allowed_in(self.mode) {
            return Err(DriverError::IllegalCall {
                operation: operation.function(),
                mode: self.mode,
            });
        }
        let required = self
            .variables
            .resolve(&options.required_intermediate_variables)?;

        let args = InstantiateArgs {
            instance_name: &options.instance_name,
            instantiation_token: &options.instantiation_token,
            resource_path: options.resource_path.as_deref(),
            visible: options.visible,
            logging_on: options.logging_on,
            event_mode_used: options.event_mode_used,
            early_return_allowed: options.early_return_allowed,
            required_intermediate_variables: &required,
        };
        let instance = self
            .backend
            .instantiate(&args)
            .ok_or_else(|| DriverError::InstantiationFailed(options.instance_name.clone()))?;

        self.instance = Some(instance);
        self.instance_name = options.instance_name.clone();
        self.mode = Mode::Instantiated;
        info!(instance = %self.instance_name, "component instantiated");
        Ok(())
    }

    /// Enters initialization mode.
    ///
    /// # Errors
    ///
    /// Fails with `Unbound`, `IllegalCall`, or `ExternalStatus`.
    pub fn enter_initialization_mode(
        &mut self,
        tolerance: Option<f64>,
        start_time: f64,
        stop_time: Option<f64>,
    ) -> Result<(), DriverError> {
        let operation = Operation::EnterInitializationMode;
        let (backend, instance, _) = self.bind(operation)?;
        let status = backend.enter_initialization_mode(instance, tolerance, start_time, stop_time);
        self.finish(operation, status)
    }

    /// Leaves initialization mode for step mode.
    ///
    /// # Errors
    ///
    /// Fails with `Unbound`, `IllegalCall`, or `ExternalStatus`.
    pub fn exit_initialization_mode(&mut self) -> Result<(), DriverError> {
        let operation = Operation::ExitInitializationMode;
        let (backend, instance, _) = self.bind(operation)?;
        let status = backend.exit_initialization_mode(instance);
        self.finish(operation, status)
    }

    /// Writes `Int32` values by variable name.
    ///
    /// # Errors
    ///
    /// Fails with `Unbound`, `IllegalCall`, `UnknownVariable`,
    /// `KindMismatch`, `LengthMismatch`, or `ExternalStatus`. Nothing is
    /// written unless every name resolves to an `Int32` signal.
    pub fn set_int32<S: AsRef<str>>(
        &mut self,
        names: &[S],
        values: &[i32],
    ) -> Result<(), DriverError> {
        let operation = Operation::SetInt32;
        let (backend, instance, variables) = self.bind(operation)?;
        let references = variables.resolve_kind(names, VariableKind::Int32)?;
        check_lengths(operation, names.len(), values.len())?;
        let status = backend.set_int32(instance, &references, values);
        self.finish(operation, status)
    }

    /// Reads `Int32` values by variable name.
    ///
    /// # Errors
    ///
    /// Fails with `Unbound`, `IllegalCall`, `UnknownVariable`,
    /// `KindMismatch`, or `ExternalStatus`.
    pub fn get_int32<S: AsRef<str>>(&mut self, names: &[S]) -> Result<Vec<i32>, DriverError> {
        let operation = Operation::GetInt32;
        let (backend, instance, variables) = self.bind(operation)?;
        let references = variables.resolve_kind(names, VariableKind::Int32)?;
        let mut values = vec![0; references.len()];
        let status = backend.get_int32(instance, &references, &mut values);
        self.finish(operation, status)?;
        Ok(values)
    }

    /// Activates clocks by variable name.
    ///
    /// # Errors
    ///
    /// Fails with `Unbound`, `IllegalCall`, `UnknownVariable`,
    /// `KindMismatch`, `LengthMismatch`, or `ExternalStatus`.
    pub fn set_clock<S: AsRef<str>>(
        &mut self,
        names: &[S],
        values: &[bool],
    ) -> Result<(), DriverError> {
        let operation = Operation::SetClock;
        let (backend, instance, variables) = self.bind(operation)?;
        let references = variables.resolve_kind(names, VariableKind::Clock)?;
        check_lengths(operation, names.len(), values.len())?;
        let status = backend.set_clock(instance, &references, values);
        self.finish(operation, status)
    }

    /// Reads clock activation states by variable name.
    ///
    /// # Errors
    ///
    /// Fails with `Unbound`, `IllegalCall`, `UnknownVariable`,
    /// `KindMismatch`, or `ExternalStatus`.
    pub fn get_clock<S: AsRef<str>>(&mut self, names: &[S]) -> Result<Vec<bool>, DriverError> {
        let operation = Operation::GetClock;
        let (backend, instance, variables) = self.bind(operation)?;
        let references = variables.resolve_kind(names, VariableKind::Clock)?;
        let mut values = vec![false; references.len()];
        let status = backend.get_clock(instance, &references, &mut values);
        self.finish(operation, status)?;
        Ok(values)
    }

    /// Switches from step mode to event mode.
    ///
    /// # Errors
    ///
    /// Fails with `Unbound`, `IllegalCall`, or `ExternalStatus`.
    pub fn enter_event_mode(
        &mut self,
        step_event: bool,
        state_event: bool,
        roots_found: &[i32],
        time_event: bool,
    ) -> Result<(), DriverError> {
        let operation = Operation::EnterEventMode;
        let (backend, instance, _) = self.bind(operation)?;
        let status =
            backend.enter_event_mode(instance, step_event, state_event, roots_found, time_event);
        self.finish(operation, status)
    }

    /// Lets the component recompute its discrete state.
    ///
    /// # Errors
    ///
    /// Fails with `Unbound`, `IllegalCall`, or `ExternalStatus`.
    pub fn update_discrete_states(&mut self) -> Result<DiscreteStatesUpdate, DriverError> {
        let operation = Operation::UpdateDiscreteStates;
        let (backend, instance, _) = self.bind(operation)?;
        let (status, update) = backend.update_discrete_states(instance);
        self.finish(operation, status)?;
        Ok(update)
    }

    /// Switches from event mode back to step mode.
    ///
    /// # Errors
    ///
    /// Fails with `Unbound`, `IllegalCall`, or `ExternalStatus`.
    pub fn enter_step_mode(&mut self) -> Result<(), DriverError> {
        let operation = Operation::EnterStepMode;
        let (backend, instance, _) = self.bind(operation)?;
        let status = backend.enter_step_mode(instance);
        self.finish(operation, status)
    }

    /// Advances the component by up to `step_size` from `current_time`.
    ///
    /// # Errors
    ///
    /// Fails with `Unbound`, `IllegalCall`, or `ExternalStatus`.
    pub fn do_step(
        &mut self,
        current_time: f64,
        step_size: f64,
        no_prior_state_set: bool,
    ) -> Result<StepOutcome, DriverError> {
        let operation = Operation::DoStep;
        let (backend, instance, _) = self.bind(operation)?;
        let (status, outcome) =
            backend.do_step(instance, current_time, step_size, no_prior_state_set);
        self.finish(operation, status)?;
        Ok(outcome)
    }

    /// Ends the simulation run.
    ///
    /// Returns [`TeardownStatus::AlreadyDone`] without calling the component
    /// when there is nothing to terminate: never instantiated, already
    /// terminated, or freed.
    ///
    /// # Errors
    ///
    /// Fails with `IllegalCall` from `Instantiated` or `InitializationMode`,
    /// and with `ExternalStatus` if the component rejects the call.
    pub fn terminate(&mut self) -> Result<TeardownStatus, DriverError> {
        if self.instance.is_none()
            || matches!(
                self.mode,
                Mode::Uninstantiated | Mode::Terminated | Mode::Freed
            )
        {
            return Ok(TeardownStatus::AlreadyDone);
        }
        let operation = Operation::Terminate;
        let (backend, instance, _) = self.bind(operation)?;
        let status = backend.terminate(instance);
        self.finish(operation, status)?;
        info!(instance = %self.instance_name, "component terminated");
        Ok(TeardownStatus::Done)
    }

    /// Releases the component instance. Valid in any mode.
    pub fn free(&mut self) -> TeardownStatus {
        let Some(instance) = self.instance.take() else {
            if self.mode != Mode::Uninstantiated {
                self.mode = Mode::Freed;
            }
            return TeardownStatus::AlreadyDone;
        };
        self.backend.free_instance(instance);
        self.mode = Mode::Freed;
        debug!(instance = %self.instance_name, "component freed");
        TeardownStatus::Done
    }
}

fn check_lengths(operation: Operation, names: usize, values: usize) -> Result<(), DriverError> {
    if names == values {
        Ok(())
    } else {
        Err(DriverError::LengthMismatch {
            operation: operation.function(),
            names,
            values,
        })
    }
}

impl<B: CoSimulationAbi> Drop for Fmi3Driver<B> {
    fn drop(&mut self) {
        if matches!(self.mode, Mode::StepMode | Mode::EventMode) {
            if let Err(err) = self.terminate() {
                warn!(instance = %self.instance_name, %err, "terminate on drop failed");
            }
        }
        self.free();
    }
}
