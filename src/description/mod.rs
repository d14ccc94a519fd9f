//! Model description emitted from a topology.
//!
//! The description lists one clocked `Int32` signal per input and output
//! node, one dependency entry per output, and a synthetic relay clock when
//! the network routes through intermediate nodes. [`xml`] renders it as an
//! FMI 3.0 `fmiModelDescription` document and reads such documents back.

pub mod xml;

use std::fmt;

use serde::Deserialize;

use crate::ValueReference;
use crate::network::Topology;

/// Value reference of the relay clock.
pub const RELAY_CLOCK_REFERENCE: ValueReference = 999;
/// Name of the relay clock.
pub const RELAY_CLOCK_NAME: &str = "__DUMMY";
/// Suffix appended to a node name to name its clock.
pub const CLOCK_SUFFIX: &str = "_Clock";

/// Direction of a variable as seen from the component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Causality {
    Input,
    Output,
}

impl Causality {
    /// Attribute spelling used in model descriptions.
    pub fn as_str(self) -> &'static str {
        match self {
            Causality::Input => "input",
            Causality::Output => "output",
        }
    }

    /// Parses the attribute spelling.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "input" => Some(Causality::Input),
            "output" => Some(Causality::Output),
            _ => None,
        }
    }
}

impl fmt::Display for Causality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A discrete `Int32` signal driven by a triggered clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    pub name: String,
    pub value_reference: ValueReference,
    pub causality: Causality,
    /// Reference of the clock that fires when the signal changes.
    pub clock: ValueReference,
}

/// A triggered (non-periodic) clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clock {
    pub name: String,
    pub value_reference: ValueReference,
    pub causality: Causality,
}

/// One entry of the `ModelVariables` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelVariable {
    Int32(Signal),
    Clock(Clock),
}

impl ModelVariable {
    /// Variable name.
    pub fn name(&self) -> &str {
        match self {
            ModelVariable::Int32(s) => &s.name,
            ModelVariable::Clock(c) => &c.name,
        }
    }

    /// Variable value reference.
    pub fn value_reference(&self) -> ValueReference {
        match self {
            ModelVariable::Int32(s) => s.value_reference,
            ModelVariable::Clock(c) => c.value_reference,
        }
    }

    /// Variable causality.
    pub fn causality(&self) -> Causality {
        match self {
            ModelVariable::Int32(s) => s.causality,
            ModelVariable::Clock(c) => c.causality,
        }
    }
}

/// Static data dependency of one output on a set of inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDependency {
    pub value_reference: ValueReference,
    pub dependencies: Vec<ValueReference>,
}

/// Root attributes of the description document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DescriptionHeader {
    /// FMI standard version string.
    pub fmi_version: String,
    /// Human-readable model name.
    pub model_name: String,
    /// Identifier of the co-simulation binary.
    pub model_identifier: String,
    /// Token the importer passes back on instantiation.
    pub instantiation_token: String,
}

impl Default for DescriptionHeader {
    fn default() -> Self {
        Self {
            fmi_version: "3.0-beta.1".to_string(),
            model_name: "Pipeline_configurable".to_string(),
            model_identifier: "Pipeline_configurable".to_string(),
            instantiation_token: "{e1059e19-5a7b-4dd8-8ee3-6ce4fd3e0cf8}".to_string(),
        }
    }
}

/// Co-simulation capability flags. Fixed for clocked signal relays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub can_handle_variable_communication_step_size: bool,
    pub can_return_early_after_intermediate_update: bool,
    pub has_event_mode: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            can_handle_variable_communication_step_size: true,
            can_return_early_after_intermediate_update: true,
            has_event_mode: true,
        }
    }
}

/// A complete model description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDescription {
    pub header: DescriptionHeader,
    pub capabilities: Capabilities,
    /// Variables in document order.
    pub variables: Vec<ModelVariable>,
    /// Output dependencies in document order.
    pub outputs: Vec<OutputDependency>,
}

impl ModelDescription {
    /// Signals in document order.
    pub fn signals(&self) -> impl Iterator<Item = &Signal> {
        self.variables.iter().filter_map(|v| match v {
            ModelVariable::Int32(s) => Some(s),
            ModelVariable::Clock(_) => None,
        })
    }

    /// Clocks in document order, including the relay clock.
    pub fn clocks(&self) -> impl Iterator<Item = &Clock> {
        self.variables.iter().filter_map(|v| match v {
            ModelVariable::Clock(c) => Some(c),
            ModelVariable::Int32(_) => None,
        })
    }

    /// The relay clock, if the network has relay nodes.
    pub fn relay_clock(&self) -> Option<&Clock> {
        self.clocks()
            .find(|c| c.value_reference == RELAY_CLOCK_REFERENCE && c.name == RELAY_CLOCK_NAME)
    }

    /// Dependency list of the output with the given reference.
    pub fn dependencies_of(&self, output: ValueReference) -> Option<&[ValueReference]> {
        self.outputs
            .iter()
            .find(|o| o.value_reference == output)
            .map(|o| o.dependencies.as_slice())
    }
}

/// Builds the model description for a frozen topology.
///
/// Inputs come first, then outputs, each as a signal followed by its clock;
/// the relay clock closes the variable list when relay nodes exist.
pub fn emit(topology: &Topology, header: &DescriptionHeader) -> ModelDescription {
    let mut variables = Vec::new();
    let mut outputs = Vec::new();

    for node in topology.inputs() {
        if let Some(reference) = node.input_reference() {
            push_signal(&mut variables, node.name(), reference, Causality::Input);
        }
    }

    for node in topology.outputs() {
        let Some(reference) = node.output_reference() else {
            continue;
        };
        push_signal(&mut variables, node.name(), reference, Causality::Output);
        outputs.push(OutputDependency {
            value_reference: reference,
            dependencies: topology
                .resolve_dependencies(node.name())
                .unwrap_or_default(),
        });
    }

    if topology.has_relay() {
        variables.push(ModelVariable::Clock(Clock {
            name: RELAY_CLOCK_NAME.to_string(),
            value_reference: RELAY_CLOCK_REFERENCE,
            causality: Causality::Output,
        }));
    }

    ModelDescription {
        header: header.clone(),
        capabilities: Capabilities::default(),
        variables,
        outputs,
    }
}

fn push_signal(
    variables: &mut Vec<ModelVariable>,
    name: &str,
    reference: ValueReference,
    causality: Causality,
) {
    variables.push(ModelVariable::Int32(Signal {
        name: name.to_string(),
        value_reference: reference,
        causality,
        clock: reference + 1,
    }));
    variables.push(ModelVariable::Clock(Clock {
        name: format!("{name}{CLOCK_SUFFIX}"),
        value_reference: reference + 1,
        causality,
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{TopologyBuilder, Transport};

    fn topology(pipes: &[(&str, &str, &str)]) -> Topology {
        let mut builder = TopologyBuilder::new();
        for (name, start, end) in pipes {
            builder
                .register_pipe(name, start, end, Transport::default())
                .expect("pipe should register");
        }
        builder.classify_and_allocate()
    }

    #[test]
    fn straight_pipes_have_no_relay_clock() {
        let desc = emit(
            &topology(&[("p1", "a", "x"), ("p2", "b", "y")]),
            &DescriptionHeader::default(),
        );
        assert!(desc.relay_clock().is_none());
        assert_eq!(desc.dependencies_of(2001), Some(&[1001][..]));
        assert_eq!(desc.dependencies_of(2003), Some(&[1003][..]));
    }

    #[test]
    fn chain_emits_signals_clocks_and_relay() {
        let desc = emit(
            &topology(&[("p1", "A", "B"), ("p2", "B", "C")]),
            &DescriptionHeader::default(),
        );
        let signals: Vec<_> = desc
            .signals()
            .map(|s| (s.value_reference, s.causality, s.clock))
            .collect();
        assert_eq!(
            signals,
            vec![(1001, Causality::Input, 1002), (2001, Causality::Output, 2002)]
        );
        let relay = desc.relay_clock().expect("relay clock present");
        assert_eq!(relay.causality, Causality::Output);
        assert_eq!(desc.clocks().filter(|c| c.value_reference == 999).count(), 1);
        assert_eq!(desc.dependencies_of(2001), Some(&[1001][..]));
    }

    #[test]
    fn clock_names_carry_suffix() {
        let desc = emit(&topology(&[("p", "src", "dst")]), &DescriptionHeader::default());
        let names: Vec<_> = desc.variables.iter().map(ModelVariable::name).collect();
        assert_eq!(names, vec!["src", "src_Clock", "dst", "dst_Clock"]);
    }

    #[test]
    fn empty_network_yields_empty_description() {
        let desc = emit(
            &TopologyBuilder::new().classify_and_allocate(),
            &DescriptionHeader::default(),
        );
        assert!(desc.variables.is_empty());
        assert!(desc.outputs.is_empty());
    }
}
