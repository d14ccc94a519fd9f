//! In-process pipeline component for dry runs and tests.
//!
//! [`ScriptedComponent`] behaves like a deterministic pipeline component
//! built from a model description: a value written to an input and
//! announced by activating the input's clock is delivered, after a
//! transport delay, to every output that depends on that input. The delay
//! is uniform unless per-path pipe delays are taken from a topology. Every
//! call is recorded in a shared [`CallLog`], and any function can be
//! scripted to answer with a fixed status.
//!
//! # Example
//!
//! ```ignore
//! let component = ScriptedComponent::from_description(&description)
//!     .with_transport_delay(0.5)
//!     .fail_with("fmi3DoStep", Status::Discard);
//! let log = component.call_log();
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use super::abi::{CoSimulationAbi, DiscreteStatesUpdate, InstantiateArgs, StepOutcome};
use super::status::Status;
use crate::ValueReference;
use crate::description::{Causality, ModelDescription};
use crate::network::Topology;

/// Time tolerance used until the importer supplies one.
pub const DEFAULT_TOLERANCE: f64 = 1e-9;

/// Version string reported by the scripted component.
pub const SCRIPTED_VERSION: &str = "3.0-beta.1";

/// Shared record of the component functions called, in call order.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<&'static str>>>);

impl CallLog {
    fn record(&self, function: &'static str) {
        if let Ok(mut calls) = self.0.lock() {
            calls.push(function);
        }
    }

    /// Snapshot of all recorded calls.
    pub fn calls(&self) -> Vec<&'static str> {
        self.0.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of recorded calls to `function`.
    pub fn count(&self, function: &str) -> usize {
        self.calls().iter().filter(|&&f| f == function).count()
    }

    pub fn is_empty(&self) -> bool {
        self.calls().is_empty()
    }
}

#[derive(Debug, Clone)]
struct InputPort {
    signal: ValueReference,
    clock: ValueReference,
}

#[derive(Debug, Clone)]
struct OutputPort {
    signal: ValueReference,
    clock: ValueReference,
    dependencies: Vec<ValueReference>,
}

/// A value in transit to an output.
#[derive(Debug, Clone, Copy)]
struct Delivery {
    time: f64,
    signal: ValueReference,
    clock: ValueReference,
    value: i32,
}

/// Runtime state of one scripted instance.
#[derive(Debug)]
pub struct ScriptedInstance {
    name: String,
    time: f64,
    tolerance: f64,
    values: HashMap<ValueReference, i32>,
    clocks: HashMap<ValueReference, bool>,
    /// Sorted by delivery time; equal times keep insertion order.
    in_transit: Vec<Delivery>,
}

impl ScriptedInstance {
    /// Instance name given at instantiation.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current internal time.
    pub fn time(&self) -> f64 {
        self.time
    }

    fn next_event_time(&self) -> Option<f64> {
        self.in_transit.first().map(|d| d.time)
    }
}

/// Deterministic in-process pipeline component.
#[derive(Debug, Clone)]
pub struct ScriptedComponent {
    instantiation_token: String,
    inputs: Vec<InputPort>,
    outputs: Vec<OutputPort>,
    relay_clock: Option<ValueReference>,
    transport_delay: f64,
    /// Delay per (output, input) pair; overrides `transport_delay`.
    path_delays: HashMap<(ValueReference, ValueReference), f64>,
    failures: HashMap<&'static str, Status>,
    log: CallLog,
}

impl ScriptedComponent {
    /// Builds a component exposing the ports declared in `description`.
    pub fn from_description(description: &ModelDescription) -> Self {
        let inputs = description
            .signals()
            .filter(|s| s.causality == Causality::Input)
            .map(|s| InputPort {
                signal: s.value_reference,
                clock: s.clock,
            })
            .collect();
        let outputs = description
            .signals()
            .filter(|s| s.causality == Causality::Output)
            .map(|s| OutputPort {
                signal: s.value_reference,
                clock: s.clock,
                dependencies: description
                    .dependencies_of(s.value_reference)
                    .map(<[ValueReference]>::to_vec)
                    .unwrap_or_default(),
            })
            .collect();

        Self {
            instantiation_token: description.header.instantiation_token.clone(),
            inputs,
            outputs,
            relay_clock: description.relay_clock().map(|c| c.value_reference),
            transport_delay: 0.0,
            path_delays: HashMap::new(),
            failures: HashMap::new(),
            log: CallLog::default(),
        }
    }

    /// Sets the delay between an input event and its delivery.
    pub fn with_transport_delay(mut self, delay: f64) -> Self {
        self.transport_delay = delay.max(0.0);
        self
    }

    /// Delays each delivery by the summed pipe delays between its input and
    /// output in `topology`, instead of the uniform transport delay.
    pub fn with_pipe_delays(mut self, topology: &Topology) -> Self {
        for output in topology.outputs() {
            let Some(signal) = output.output_reference() else {
                continue;
            };
            for (input, delay) in topology.upstream_delays(output.name()).unwrap_or_default() {
                self.path_delays.insert((signal, input), delay.max(0.0));
            }
        }
        self
    }

    fn delay_between(&self, output: ValueReference, input: ValueReference) -> f64 {
        self.path_delays
            .get(&(output, input))
            .copied()
            .unwrap_or(self.transport_delay)
    }

    /// Makes every call to `function` answer with `status`.
    ///
    /// A non-`Ok` status on `fmi3InstantiateCoSimulation` makes
    /// instantiation return no instance. A `Warning` on `fmi3DoStep` still
    /// performs the step.
    pub fn fail_with(mut self, function: &'static str, status: Status) -> Self {
        self.failures.insert(function, status);
        self
    }

    /// Handle to the shared call log.
    pub fn call_log(&self) -> CallLog {
        self.log.clone()
    }

    /// Records the call and returns the scripted status, if any.
    fn enter(&self, function: &'static str) -> Option<Status> {
        self.log.record(function);
        self.failures.get(function).copied()
    }

    fn is_input_signal(&self, reference: ValueReference) -> bool {
        self.inputs.iter().any(|p| p.signal == reference)
    }

    fn is_input_clock(&self, reference: ValueReference) -> bool {
        self.inputs.iter().any(|p| p.clock == reference)
    }

    fn is_signal(&self, reference: ValueReference) -> bool {
        self.is_input_signal(reference) || self.outputs.iter().any(|p| p.signal == reference)
    }

    fn is_clock(&self, reference: ValueReference) -> bool {
        self.is_input_clock(reference)
            || self.outputs.iter().any(|p| p.clock == reference)
            || self.relay_clock == Some(reference)
    }
}

impl CoSimulationAbi for ScriptedComponent {
    type Instance = ScriptedInstance;

    fn get_version(&self) -> String {
        self.log.record("fmi3GetVersion");
        SCRIPTED_VERSION.to_string()
    }

    fn instantiate(&mut self, args: &InstantiateArgs<'_>) -> Option<ScriptedInstance> {
        if let Some(status) = self.enter("fmi3InstantiateCoSimulation") {
            if status != Status::Ok {
                return None;
            }
        }
        if args.instantiation_token != self.instantiation_token {
            debug!(token = args.instantiation_token, "wrong instantiation token");
            return None;
        }
        if !args.event_mode_used || !args.early_return_allowed {
            debug!("importer must support event mode and early return");
            return None;
        }

        let mut clocks: HashMap<ValueReference, bool> = HashMap::new();
        for port in &self.inputs {
            clocks.insert(port.clock, false);
        }
        for port in &self.outputs {
            clocks.insert(port.clock, false);
        }
        if let Some(relay) = self.relay_clock {
            clocks.insert(relay, false);
        }

        Some(ScriptedInstance {
            name: args.instance_name.to_string(),
            time: 0.0,
            tolerance: DEFAULT_TOLERANCE,
            values: HashMap::new(),
            clocks,
            in_transit: Vec::new(),
        })
    }

    fn free_instance(&mut self, instance: ScriptedInstance) {
        self.log.record("fmi3FreeInstance");
        debug!(instance = instance.name(), "scripted instance freed");
    }

    fn enter_initialization_mode(
        &mut self,
        instance: &mut ScriptedInstance,
        tolerance: Option<f64>,
        start_time: f64,
        _stop_time: Option<f64>,
    ) -> Status {
        if let Some(status) = self.enter("fmi3EnterInitializationMode") {
            return status;
        }
        instance.time = start_time;
        if let Some(tolerance) = tolerance {
            instance.tolerance = tolerance;
        }
        Status::Ok
    }

    fn exit_initialization_mode(&mut self, _instance: &mut ScriptedInstance) -> Status {
        self.enter("fmi3ExitInitializationMode").unwrap_or(Status::Ok)
    }

    fn enter_event_mode(
        &mut self,
        instance: &mut ScriptedInstance,
        _step_event: bool,
        _state_event: bool,
        _roots_found: &[i32],
        time_event: bool,
    ) -> Status {
        if let Some(status) = self.enter("fmi3EnterEventMode") {
            return status;
        }
        if time_event {
            let horizon = instance.time + instance.tolerance;
            let due = instance.in_transit.partition_point(|d| d.time <= horizon);
            for delivery in instance.in_transit.drain(..due) {
                instance.values.insert(delivery.signal, delivery.value);
                instance.clocks.insert(delivery.clock, true);
            }
        }
        Status::Ok
    }

    fn update_discrete_states(
        &mut self,
        instance: &mut ScriptedInstance,
    ) -> (Status, DiscreteStatesUpdate) {
        if let Some(status) = self.enter("fmi3UpdateDiscreteStates") {
            return (status, DiscreteStatesUpdate::default());
        }

        for input in &self.inputs {
            if !instance.clocks.get(&input.clock).copied().unwrap_or(false) {
                continue;
            }
            let value = instance.values.get(&input.signal).copied().unwrap_or(0);
            for output in self
                .outputs
                .iter()
                .filter(|o| o.dependencies.contains(&input.signal))
            {
                let delivery = Delivery {
                    time: instance.time + self.delay_between(output.signal, input.signal),
                    signal: output.signal,
                    clock: output.clock,
                    value,
                };
                let at = instance
                    .in_transit
                    .partition_point(|d| d.time <= delivery.time);
                instance.in_transit.insert(at, delivery);
                debug!(
                    input = input.signal,
                    output = output.signal,
                    value,
                    at = delivery.time,
                    "value in transit"
                );
            }
        }

        for active in instance.clocks.values_mut() {
            *active = false;
        }

        (
            Status::Ok,
            DiscreteStatesUpdate {
                next_event_time: instance.next_event_time(),
                ..DiscreteStatesUpdate::default()
            },
        )
    }

    fn enter_step_mode(&mut self, _instance: &mut ScriptedInstance) -> Status {
        self.enter("fmi3EnterStepMode").unwrap_or(Status::Ok)
    }

    fn do_step(
        &mut self,
        instance: &mut ScriptedInstance,
        current_communication_point: f64,
        communication_step_size: f64,
        _no_set_state_prior_to_current_point: bool,
    ) -> (Status, StepOutcome) {
        let scripted = self.enter("fmi3DoStep");
        if let Some(status) = scripted.filter(|&s| s != Status::Warning) {
            return (status, StepOutcome::default());
        }

        let tolerance = instance.tolerance;
        if (instance.time - current_communication_point).abs() > tolerance {
            debug!(
                requested = current_communication_point,
                internal = instance.time,
                "communication point does not match internal time"
            );
            return (
                Status::Discard,
                StepOutcome {
                    last_successful_time: instance.time,
                    ..StepOutcome::default()
                },
            );
        }

        let target = current_communication_point + communication_step_size;
        let outcome = match instance.next_event_time() {
            Some(next) if next < target - tolerance => {
                instance.time = next.max(current_communication_point);
                StepOutcome {
                    event_handling_needed: true,
                    early_return: true,
                    last_successful_time: instance.time,
                    ..StepOutcome::default()
                }
            }
            Some(next) if (next - target).abs() <= tolerance => {
                instance.time = target;
                StepOutcome {
                    event_handling_needed: true,
                    last_successful_time: target,
                    ..StepOutcome::default()
                }
            }
            _ => {
                instance.time = target;
                StepOutcome {
                    last_successful_time: target,
                    ..StepOutcome::default()
                }
            }
        };
        (scripted.unwrap_or(Status::Ok), outcome)
    }

    fn terminate(&mut self, _instance: &mut ScriptedInstance) -> Status {
        self.enter("fmi3Terminate").unwrap_or(Status::Ok)
    }

    fn set_int32(
        &mut self,
        instance: &mut ScriptedInstance,
        references: &[ValueReference],
        values: &[i32],
    ) -> Status {
        if let Some(status) = self.enter("fmi3SetInt32") {
            return status;
        }
        if references.len() != values.len()
            || !references.iter().all(|&r| self.is_input_signal(r))
        {
            return Status::Error;
        }
        for (&reference, &value) in references.iter().zip(values) {
            instance.values.insert(reference, value);
        }
        Status::Ok
    }

    fn get_int32(
        &mut self,
        instance: &mut ScriptedInstance,
        references: &[ValueReference],
        values: &mut [i32],
    ) -> Status {
        if let Some(status) = self.enter("fmi3GetInt32") {
            return status;
        }
        if references.len() != values.len() || !references.iter().all(|&r| self.is_signal(r)) {
            return Status::Error;
        }
        for (reference, slot) in references.iter().zip(values.iter_mut()) {
            *slot = instance.values.get(reference).copied().unwrap_or(0);
        }
        Status::Ok
    }

    fn set_clock(
        &mut self,
        instance: &mut ScriptedInstance,
        references: &[ValueReference],
        values: &[bool],
    ) -> Status {
        if let Some(status) = self.enter("fmi3SetClock") {
            return status;
        }
        if references.len() != values.len()
            || !references.iter().all(|&r| self.is_input_clock(r))
        {
            return Status::Error;
        }
        // Only the component deactivates clocks.
        if values.iter().any(|&active| !active) {
            return Status::Error;
        }
        for &reference in references {
            instance.clocks.insert(reference, true);
        }
        Status::Ok
    }

    fn get_clock(
        &mut self,
        instance: &mut ScriptedInstance,
        references: &[ValueReference],
        values: &mut [bool],
    ) -> Status {
        if let Some(status) = self.enter("fmi3GetClock") {
            return status;
        }
        if references.len() != values.len() || !references.iter().all(|&r| self.is_clock(r)) {
            return Status::Error;
        }
        for (reference, slot) in references.iter().zip(values.iter_mut()) {
            *slot = instance.clocks.get(reference).copied().unwrap_or(false);
        }
        Status::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::description::{DescriptionHeader, emit};
    use crate::network::{TopologyBuilder, Transport};

    fn component(delay: f64) -> ScriptedComponent {
        let mut builder = TopologyBuilder::new();
        builder
            .register_pipe("p", "src", "dst", Transport::default())
            .expect("register");
        let desc = emit(&builder.classify_and_allocate(), &DescriptionHeader::default());
        ScriptedComponent::from_description(&desc).with_transport_delay(delay)
    }

    fn instance(component: &mut ScriptedComponent) -> ScriptedInstance {
        let token = DescriptionHeader::default().instantiation_token;
        component
            .instantiate(&InstantiateArgs {
                instance_name: "pipe",
                instantiation_token: &token,
                resource_path: None,
                visible: false,
                logging_on: false,
                event_mode_used: true,
                early_return_allowed: true,
                required_intermediate_variables: &[],
            })
            .expect("instance")
    }

    #[test]
    fn pipe_delays_override_uniform_delay() {
        let mut builder = TopologyBuilder::new();
        for (name, start, end, delay) in [("a", "src", "mid", 0.25), ("b", "mid", "dst", 0.5)] {
            builder
                .register_pipe(name, start, end, Transport { delay, ..Transport::default() })
                .expect("register");
        }
        let topology = builder.classify_and_allocate();
        let desc = emit(&topology, &DescriptionHeader::default());
        let mut c = ScriptedComponent::from_description(&desc)
            .with_transport_delay(3.0)
            .with_pipe_delays(&topology);
        let mut i = instance(&mut c);

        assert_eq!(c.set_int32(&mut i, &[1001], &[9]), Status::Ok);
        assert_eq!(c.set_clock(&mut i, &[1002], &[true]), Status::Ok);
        let (_, update) = c.update_discrete_states(&mut i);
        assert_eq!(update.next_event_time, Some(0.75));
    }

    #[test]
    fn value_arrives_after_delay() {
        let mut c = component(0.5);
        let mut i = instance(&mut c);
        assert_eq!(c.set_int32(&mut i, &[1001], &[7]), Status::Ok);
        assert_eq!(c.set_clock(&mut i, &[1002], &[true]), Status::Ok);
        let (_, update) = c.update_discrete_states(&mut i);
        assert_eq!(update.next_event_time, Some(0.5));

        let (_, step) = c.do_step(&mut i, 0.0, 1.0, true);
        assert!(step.event_handling_needed && step.early_return);
        assert_eq!(step.last_successful_time, 0.5);

        c.enter_event_mode(&mut i, false, false, &[], true);
        let mut clock = [false];
        c.get_clock(&mut i, &[2002], &mut clock);
        let mut value = [0];
        c.get_int32(&mut i, &[2001], &mut value);
        assert_eq!((clock[0], value[0]), (true, 7));
    }

    #[test]
    fn wrong_token_refuses_instance() {
        let mut c = component(0.0);
        let args = InstantiateArgs {
            instance_name: "pipe",
            instantiation_token: "{nope}",
            resource_path: None,
            visible: false,
            logging_on: false,
            event_mode_used: true,
            early_return_allowed: true,
            required_intermediate_variables: &[],
        };
        assert!(c.instantiate(&args).is_none());
    }

    #[test]
    fn importer_may_not_deactivate_clocks() {
        let mut c = component(0.0);
        let mut i = instance(&mut c);
        assert_eq!(c.set_clock(&mut i, &[1002], &[false]), Status::Error);
    }

    #[test]
    fn mismatched_communication_point_is_discarded() {
        let mut c = component(0.0);
        let mut i = instance(&mut c);
        let (status, _) = c.do_step(&mut i, 3.0, 1.0, true);
        assert_eq!(status, Status::Discard);
    }

    #[test]
    fn scripted_failure_is_returned_and_logged() {
        let mut c = component(0.0).fail_with("fmi3Terminate", Status::Error);
        let log = c.call_log();
        let mut i = instance(&mut c);
        assert_eq!(c.terminate(&mut i), Status::Error);
        assert_eq!(
            log.calls(),
            vec!["fmi3InstantiateCoSimulation", "fmi3Terminate"]
        );
    }
}
