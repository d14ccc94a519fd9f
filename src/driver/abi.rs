//! The co-simulation call surface the driver sequences.
//!
//! A backend maps each method onto one component function. Backends do
//! no sequencing and no name resolution; the driver does both before
//! calling in.

use super::status::Status;
use crate::ValueReference;

/// Arguments of `fmi3InstantiateCoSimulation`.
#[derive(Debug, Clone, Copy)]
pub struct InstantiateArgs<'a> {
    pub instance_name: &'a str,
    pub instantiation_token: &'a str,
    pub resource_path: Option<&'a str>,
    pub visible: bool,
    pub logging_on: bool,
    pub event_mode_used: bool,
    pub early_return_allowed: bool,
    pub required_intermediate_variables: &'a [ValueReference],
}

/// Flags reported by `fmi3UpdateDiscreteStates`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DiscreteStatesUpdate {
    /// Another update is needed before leaving event mode.
    pub discrete_states_need_update: bool,
    pub terminate_simulation: bool,
    pub nominals_of_continuous_states_changed: bool,
    pub values_of_continuous_states_changed: bool,
    /// Time of the next scheduled event, if one is defined.
    pub next_event_time: Option<f64>,
}

/// Flags reported by `fmi3DoStep`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StepOutcome {
    /// The component needs event mode before the next step.
    pub event_handling_needed: bool,
    pub terminate_simulation: bool,
    /// The step stopped before `current + step`.
    pub early_return: bool,
    /// Time the component actually reached.
    pub last_successful_time: f64,
}

/// Typed co-simulation call surface.
///
/// `Instance` is the backend's handle to one live component. The driver
/// holds at most one and gives it up to [`free_instance`], so an instance
/// is freed at most once.
///
/// [`free_instance`]: CoSimulationAbi::free_instance
pub trait CoSimulationAbi {
    type Instance;

    /// Version string the component implements.
    fn get_version(&self) -> String;

    /// Creates an instance, or `None` if the component refused.
    fn instantiate(&mut self, args: &InstantiateArgs<'_>) -> Option<Self::Instance>;

    fn free_instance(&mut self, instance: Self::Instance);

    fn enter_initialization_mode(
        &mut self,
        instance: &mut Self::Instance,
        tolerance: Option<f64>,
        start_time: f64,
        stop_time: Option<f64>,
    ) -> Status;

    fn exit_initialization_mode(&mut self, instance: &mut Self::Instance) -> Status;

    fn enter_event_mode(
        &mut self,
        instance: &mut Self::Instance,
        step_event: bool,
        state_event: bool,
        roots_found: &[i32],
        time_event: bool,
    ) -> Status;

    fn update_discrete_states(
        &mut self,
        instance: &mut Self::Instance,
    ) -> (Status, DiscreteStatesUpdate);

    fn enter_step_mode(&mut self, instance: &mut Self::Instance) -> Status;

    fn do_step(
        &mut self,
        instance: &mut Self::Instance,
        current_communication_point: f64,
        communication_step_size: f64,
        no_set_state_prior_to_current_point: bool,
    ) -> (Status, StepOutcome);

    fn terminate(&mut self, instance: &mut Self::Instance) -> Status;

    fn set_int32(
        &mut self,
        instance: &mut Self::Instance,
        references: &[ValueReference],
        values: &[i32],
    ) -> Status;

    fn get_int32(
        &mut self,
        instance: &mut Self::Instance,
        references: &[ValueReference],
        values: &mut [i32],
    ) -> Status;

    fn set_clock(
        &mut self,
        instance: &mut Self::Instance,
        references: &[ValueReference],
        values: &[bool],
    ) -> Status;

    fn get_clock(
        &mut self,
        instance: &mut Self::Instance,
        references: &[ValueReference],
        values: &mut [bool],
    ) -> Status;
}
